use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub dispatch: DispatchConfig,
}

/// How long a ride may wait for a driver, and which drivers hear about it.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub timeout: Duration,
    pub sweep_interval: Duration,
    pub max_rebroadcasts: u32,
    pub match_vehicle_type: bool,
    pub radius_km: Option<f64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            sweep_interval: Duration::from_millis(1000),
            max_rebroadcasts: 1,
            match_vehicle_type: false,
            radius_km: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )));
            }
        };

        let radius_km = match env::var("DISPATCH_RADIUS_KM") {
            Ok(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|err| AppError::Internal(format!("invalid DISPATCH_RADIUS_KM: {err}")))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: non_zero(
                "EVENT_BUFFER_SIZE",
                parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            )?,
            dispatch: DispatchConfig {
                timeout: Duration::from_secs(parse_or_default("DISPATCH_TIMEOUT_SECS", 45)?),
                sweep_interval: Duration::from_millis(parse_or_default(
                    "DISPATCH_SWEEP_INTERVAL_MS",
                    1000,
                )?),
                max_rebroadcasts: parse_or_default("DISPATCH_MAX_REBROADCASTS", 1)?,
                match_vehicle_type: parse_or_default("DISPATCH_MATCH_VEHICLE", false)?,
                radius_km,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

/// Channel capacities of zero make tokio panic on construction.
fn non_zero(key: &str, value: usize) -> Result<usize, AppError> {
    if value == 0 {
        return Err(AppError::Internal(format!("{key} must be greater than 0")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::non_zero;
    use crate::error::AppError;

    #[test]
    fn zero_buffer_size_is_refused() {
        let err = non_zero("EVENT_BUFFER_SIZE", 0).unwrap_err();
        assert!(matches!(err, AppError::Internal(message) if message.contains("EVENT_BUFFER_SIZE")));
        assert_eq!(non_zero("EVENT_BUFFER_SIZE", 1024).unwrap(), 1024);
    }
}
