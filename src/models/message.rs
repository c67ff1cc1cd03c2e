use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::{LocationSample, Who};
use crate::models::ride::{Ride, RideStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Assigned,
    Rejected,
    Cancelled,
    Completed,
    Expired,
}

/// Everything the server pushes over a socket, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    LocationUpdate {
        ride_id: Uuid,
        lat: f64,
        lng: f64,
        who: Who,
        at: DateTime<Utc>,
    },
    RideUpdated {
        ride: Ride,
    },
    RideAdded {
        ride: Ride,
    },
    RideRemoved {
        ride_id: Uuid,
        reason: RemovalReason,
    },
    RideRequest {
        ride: Ride,
    },
    RideStatusUpdate {
        ride_id: Uuid,
        status: RideStatus,
        driver_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    DriverLocation {
        driver_id: Uuid,
        lat: f64,
        lng: f64,
        at: DateTime<Utc>,
    },
    SosAlert {
        ride_id: Uuid,
        raised_by: Uuid,
        at: DateTime<Utc>,
    },
    Subscribed {
        ride_id: Uuid,
    },
    Unsubscribed {
        ride_id: Uuid,
    },
    Pong,
    Error {
        message: String,
    },
}

impl From<&LocationSample> for PushMessage {
    fn from(sample: &LocationSample) -> Self {
        PushMessage::LocationUpdate {
            ride_id: sample.ride_id,
            lat: sample.lat,
            lng: sample.lng,
            who: sample.who,
            at: sample.at,
        }
    }
}

impl PushMessage {
    pub fn status_update(ride: &Ride) -> Self {
        PushMessage::RideStatusUpdate {
            ride_id: ride.id,
            status: ride.status,
            driver_id: ride.driver_id,
            at: ride.updated_at,
        }
    }
}

/// Messages a connected client may send. Anything else is rejected at the
/// socket boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeRide {
        ride_id: Uuid,
    },
    UnsubscribeRide {
        ride_id: Uuid,
    },
    LocationUpdate {
        ride_id: Uuid,
        lat: f64,
        lng: f64,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    DriverLocation {
        lat: f64,
        lng: f64,
    },
    Ping,
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|err| AppError::BadRequest(format!("unrecognized message: {err}")))
    }
}
