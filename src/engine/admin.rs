use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AppError;
use crate::models::caller::Caller;
use crate::models::driver::DriverPresence;
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub total_rides: usize,
    pub rides_by_status: BTreeMap<String, usize>,
    pub active_rides: usize,
    pub pending_rides: usize,
    pub drivers_online: usize,
    pub drivers_available: usize,
    pub open_sos: usize,
    pub revenue: f64,
    pub co2_saved_kg: f64,
    pub eco_points_awarded: u64,
}

pub fn require_admin(caller: &Caller) -> Result<(), AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized("admin role required".to_string()));
    }
    Ok(())
}

pub fn stats(state: &AppState) -> AdminStats {
    let rides = state.store.rides(&|_| true);
    let drivers = state.store.presences();

    let mut rides_by_status = BTreeMap::new();
    for status in [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::InProgress,
        RideStatus::Completed,
        RideStatus::Cancelled,
    ] {
        rides_by_status.insert(status.to_string(), 0);
    }

    let mut stats = AdminStats {
        total_rides: rides.len(),
        rides_by_status,
        active_rides: 0,
        pending_rides: 0,
        drivers_online: drivers.len(),
        drivers_available: drivers.iter().filter(|driver| driver.is_available).count(),
        open_sos: 0,
        revenue: 0.0,
        co2_saved_kg: 0.0,
        eco_points_awarded: 0,
    };

    for ride in &rides {
        *stats
            .rides_by_status
            .entry(ride.status.to_string())
            .or_insert(0) += 1;

        if ride.is_active() {
            stats.active_rides += 1;
            if ride.status == RideStatus::Pending {
                stats.pending_rides += 1;
            }
            if ride.sos_raised_at.is_some() {
                stats.open_sos += 1;
            }
        }

        if ride.status == RideStatus::Completed {
            stats.revenue += ride.actual_fare.unwrap_or(ride.estimated_fare);
            stats.co2_saved_kg += ride.co2_saved_kg.unwrap_or(0.0);
            stats.eco_points_awarded += u64::from(ride.eco_points_earned.unwrap_or(0));
        }
    }

    stats.revenue = (stats.revenue * 100.0).round() / 100.0;
    stats.co2_saved_kg = (stats.co2_saved_kg * 100.0).round() / 100.0;
    stats
}

/// Every non-terminal ride, oldest request first.
pub fn active_rides(state: &AppState) -> Vec<Ride> {
    let mut rides = state.store.rides(&|ride| ride.is_active());
    rides.sort_by_key(|ride| ride.requested_at);
    rides
}

pub fn drivers(state: &AppState) -> Vec<DriverPresence> {
    let mut drivers = state.store.presences();
    drivers.sort_by_key(|driver| driver.driver_id);
    drivers
}
