use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::engine::lifecycle::expire_ride;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::caller::{Caller, Role};
use crate::models::driver::DriverPresence;
use crate::models::message::{PushMessage, RemovalReason};
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;

/// Decides whether an available driver should hear about a ride. Every
/// configured filter must admit the driver.
pub trait CandidateFilter: Send + Sync {
    fn admits(&self, driver: &DriverPresence, ride: &Ride) -> bool;
}

pub struct SameVehicleType;

impl CandidateFilter for SameVehicleType {
    fn admits(&self, driver: &DriverPresence, ride: &Ride) -> bool {
        driver.vehicle_type == ride.vehicle_type
    }
}

/// Drivers with no known location are never within the radius.
pub struct WithinRadius {
    pub km: f64,
}

impl CandidateFilter for WithinRadius {
    fn admits(&self, driver: &DriverPresence, ride: &Ride) -> bool {
        driver
            .last_known_location
            .is_some_and(|location| haversine_km(&location, &ride.pickup.location) <= self.km)
    }
}

#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub ride_id: Uuid,
    /// Nearest first.
    pub candidates: Vec<Uuid>,
    pub rejected: HashSet<Uuid>,
    pub broadcast_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub rebroadcasts: u32,
}

pub struct Dispatcher {
    matches: DashMap<Uuid, PendingMatch>,
    filters: Vec<Box<dyn CandidateFilter>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        let mut filters: Vec<Box<dyn CandidateFilter>> = Vec::new();
        if config.match_vehicle_type {
            filters.push(Box::new(SameVehicleType));
        }
        if let Some(km) = config.radius_km {
            filters.push(Box::new(WithinRadius { km }));
        }

        Self {
            matches: DashMap::new(),
            filters,
            config,
        }
    }

    pub fn with_filter(mut self, filter: impl CandidateFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn pending_match(&self, ride_id: Uuid) -> Option<PendingMatch> {
        self.matches.get(&ride_id).map(|entry| entry.value().clone())
    }

    pub fn pending_count(&self) -> usize {
        self.matches.len()
    }

    fn admits(&self, driver: &DriverPresence, ride: &Ride) -> bool {
        self.filters.iter().all(|filter| filter.admits(driver, ride))
    }

    fn deadline(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.config.timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(45));
        from + timeout
    }
}

fn select_candidates(state: &AppState, ride: &Ride, rejected: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut eligible: Vec<(Uuid, Option<f64>)> = state
        .store
        .presences()
        .into_iter()
        .filter(|driver| {
            driver.is_available
                && !rejected.contains(&driver.driver_id)
                && state.store.active_ride_of_driver(driver.driver_id).is_none()
                && state.dispatch.admits(driver, ride)
        })
        .map(|driver| {
            let distance = driver
                .last_known_location
                .map(|location| haversine_km(&location, &ride.pickup.location));
            (driver.driver_id, distance)
        })
        .collect();

    eligible.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    eligible.into_iter().map(|(driver_id, _)| driver_id).collect()
}

fn refresh_pending_gauge(state: &AppState) {
    state
        .metrics
        .pending_matches
        .set(state.dispatch.matches.len() as i64);
}

/// Offers a freshly created ride to every eligible driver.
pub fn broadcast(state: &AppState, ride: &Ride) -> Vec<Uuid> {
    let now = Utc::now();
    let candidates = select_candidates(state, ride, &HashSet::new());

    state.dispatch.matches.insert(
        ride.id,
        PendingMatch {
            ride_id: ride.id,
            candidates: candidates.clone(),
            rejected: HashSet::new(),
            broadcast_at: now,
            expires_at: state.dispatch.deadline(now),
            rebroadcasts: 0,
        },
    );
    refresh_pending_gauge(state);

    for driver_id in &candidates {
        state
            .hub
            .send_to_user(*driver_id, PushMessage::RideRequest { ride: ride.clone() });
    }
    state
        .hub
        .send_to_admins(PushMessage::RideAdded { ride: ride.clone() });

    if candidates.is_empty() {
        warn!(ride_id = %ride.id, "no eligible drivers; ride stays pending until timeout");
    } else {
        info!(ride_id = %ride.id, candidates = candidates.len(), "ride offered to drivers");
    }

    candidates
}

fn rebroadcast(state: &AppState, ride: &Ride) -> Vec<Uuid> {
    let now = Utc::now();
    let rejected = state
        .dispatch
        .matches
        .get(&ride.id)
        .map(|entry| entry.rejected.clone())
        .unwrap_or_default();
    let candidates = select_candidates(state, ride, &rejected);

    if let Some(mut pending) = state.dispatch.matches.get_mut(&ride.id) {
        pending.candidates = candidates.clone();
        pending.broadcast_at = now;
        pending.expires_at = state.dispatch.deadline(now);
        pending.rebroadcasts += 1;
    }

    for driver_id in &candidates {
        state
            .hub
            .send_to_user(*driver_id, PushMessage::RideRequest { ride: ride.clone() });
    }

    info!(ride_id = %ride.id, candidates = candidates.len(), "ride re-offered after timeout");
    candidates
}

/// Consumes the match after the controller bound `ride.driver_id`; every
/// other candidate loses the offer.
pub fn on_accept(state: &AppState, ride: &Ride) {
    let Some((_, pending)) = state.dispatch.matches.remove(&ride.id) else {
        return;
    };
    refresh_pending_gauge(state);

    for driver_id in pending
        .candidates
        .iter()
        .filter(|driver_id| Some(**driver_id) != ride.driver_id)
    {
        state.hub.send_to_user(
            *driver_id,
            PushMessage::RideRemoved {
                ride_id: ride.id,
                reason: RemovalReason::Assigned,
            },
        );
    }
}

pub fn on_reject(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    if caller.role != Role::Driver {
        return Err(AppError::Unauthorized(
            "only drivers can reject ride requests".to_string(),
        ));
    }

    let ride = state.store.ride(ride_id)?;
    if ride.status != RideStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "ride {ride_id} is {}, only pending rides can be rejected",
            ride.status
        )));
    }

    let remaining = {
        let now = Utc::now();
        let mut pending = state
            .dispatch
            .matches
            .entry(ride_id)
            .or_insert_with(|| PendingMatch {
                ride_id,
                candidates: Vec::new(),
                rejected: HashSet::new(),
                broadcast_at: now,
                expires_at: state.dispatch.deadline(now),
                rebroadcasts: 0,
            });
        pending.candidates.retain(|driver_id| *driver_id != caller.id);
        pending.rejected.insert(caller.id);
        pending.candidates.len()
    };
    // An accept racing this reject may have consumed the match already.
    let still_pending = state
        .store
        .ride(ride_id)
        .is_ok_and(|current| current.status == RideStatus::Pending);
    if !still_pending {
        state.dispatch.matches.remove(&ride_id);
    }
    refresh_pending_gauge(state);

    state.hub.send_to_user(
        caller.id,
        PushMessage::RideRemoved {
            ride_id,
            reason: RemovalReason::Rejected,
        },
    );

    if remaining == 0 {
        info!(ride_id = %ride_id, "every candidate rejected; waiting for timeout or cancellation");
    }
    Ok(ride)
}

/// Drops the match without resolution and tells the candidates.
pub fn withdraw(state: &AppState, ride_id: Uuid, reason: RemovalReason) {
    let Some((_, pending)) = state.dispatch.matches.remove(&ride_id) else {
        return;
    };
    refresh_pending_gauge(state);

    for driver_id in pending.candidates {
        state
            .hub
            .send_to_user(driver_id, PushMessage::RideRemoved { ride_id, reason });
    }
}

/// Pending rides a driver could accept right now, oldest request first.
pub fn pending_for(state: &AppState, driver_id: Uuid) -> Vec<Ride> {
    let Some(presence) = state.store.presence(driver_id) else {
        return Vec::new();
    };
    if !presence.is_available || state.store.active_ride_of_driver(driver_id).is_some() {
        return Vec::new();
    }

    let mut rides = state.store.rides(&|ride| {
        ride.status == RideStatus::Pending
            && !state
                .dispatch
                .matches
                .get(&ride.id)
                .is_some_and(|pending| pending.rejected.contains(&driver_id))
            && state.dispatch.admits(&presence, ride)
    });
    rides.sort_by_key(|ride| ride.requested_at);
    rides
}

/// Handles matches whose deadline passed before `now`: re-offer while the
/// rebroadcast allowance lasts, then expire the ride.
pub fn sweep_expired(state: &AppState, now: DateTime<Utc>) -> usize {
    let expired: Vec<(Uuid, u32)> = state
        .dispatch
        .matches
        .iter()
        .filter(|entry| entry.expires_at <= now)
        .map(|entry| (entry.ride_id, entry.rebroadcasts))
        .collect();

    for (ride_id, rebroadcasts) in &expired {
        let ride = match state.store.ride(*ride_id) {
            Ok(ride) if ride.status == RideStatus::Pending => ride,
            _ => {
                state.dispatch.matches.remove(ride_id);
                continue;
            }
        };

        if *rebroadcasts < state.dispatch.config.max_rebroadcasts {
            rebroadcast(state, &ride);
        } else if let Err(err) = expire_ride(state, *ride_id) {
            warn!(ride_id = %ride_id, error = %err, "failed to expire ride");
        }
    }

    refresh_pending_gauge(state);
    expired.len()
}

pub async fn run_dispatch_sweeper(state: Arc<AppState>) {
    let period = state.dispatch.config.sweep_interval;
    if period.is_zero() {
        error!("dispatch sweeper disabled: sweep interval is zero");
        return;
    }

    info!(
        timeout_secs = state.dispatch.config.timeout.as_secs(),
        max_rebroadcasts = state.dispatch.config.max_rebroadcasts,
        "dispatch sweeper started"
    );

    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let handled = sweep_expired(&state, Utc::now());
        if handled > 0 {
            info!(handled, "expired ride requests handled");
        }
    }
}
