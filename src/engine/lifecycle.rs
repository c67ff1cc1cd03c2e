use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::dispatch;
use crate::engine::fare::{eco_metrics, estimate};
use crate::error::AppError;
use crate::models::caller::{Caller, Role};
use crate::models::message::{PushMessage, RemovalReason};
use crate::models::ride::{Place, Ride, RideStatus, VehicleType};
use crate::state::AppState;

pub const NO_DRIVER_FOUND: &str = "no_driver_found";

#[derive(Debug, Clone)]
pub struct NewRide {
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: VehicleType,
    pub female_driver_preferred: bool,
}

fn record(state: &AppState, transition: &str, result: &Result<Ride, AppError>) {
    state.metrics.record_transition(transition, result.is_ok());
    if let Err(err) = result {
        info!(transition, error = %err, "ride transition refused");
    }
}

fn advance(ride: &mut Ride, next: RideStatus, now: DateTime<Utc>) -> Result<(), AppError> {
    if !ride.status.can_transition_to(next) {
        return Err(AppError::InvalidState(format!(
            "ride {} cannot move from {} to {next}",
            ride.id, ride.status
        )));
    }
    ride.status = next;
    ride.updated_at = now;
    Ok(())
}

fn reject_terminal(ride: &Ride) -> Result<(), AppError> {
    if ride.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "ride {} is {} and can no longer change",
            ride.id, ride.status
        )));
    }
    Ok(())
}

fn require_bound_driver(ride: &Ride, caller: &Caller) -> Result<(), AppError> {
    match ride.driver_id {
        None => Err(AppError::InvalidState(format!(
            "ride {} has no driver assigned",
            ride.id
        ))),
        Some(driver_id) if driver_id != caller.id => Err(AppError::Unauthorized(format!(
            "driver {} is not assigned to ride {}",
            caller.id, ride.id
        ))),
        Some(_) => Ok(()),
    }
}

/// Pushes the new state of a ride to both parties and the admin stream.
fn announce(state: &AppState, ride: &Ride, previous_driver: Option<Uuid>) {
    let update = PushMessage::RideUpdated { ride: ride.clone() };
    state.hub.send_to_user(ride.rider_id, update.clone());
    if let Some(driver_id) = ride.driver_id.or(previous_driver) {
        state.hub.send_to_user(driver_id, update);
    }
    state.hub.send_to_admins(PushMessage::status_update(ride));

    if ride.status.is_terminal() {
        let reason = match ride.status {
            RideStatus::Completed => RemovalReason::Completed,
            _ => RemovalReason::Cancelled,
        };
        state.hub.send_to_admins(PushMessage::RideRemoved {
            ride_id: ride.id,
            reason,
        });
        state.locations.close_ride(ride.id);
        state.metrics.active_rides.dec();
    }
}

pub fn create_ride(state: &AppState, caller: &Caller, request: NewRide) -> Result<Ride, AppError> {
    let result = create_checked(state, caller, request);
    record(state, "create", &result);
    result
}

fn create_checked(state: &AppState, caller: &Caller, request: NewRide) -> Result<Ride, AppError> {
    if caller.role != Role::Rider {
        return Err(AppError::Unauthorized("only riders can request rides".to_string()));
    }

    for place in [&request.pickup, &request.dropoff] {
        place.location.validate()?;
        if place.label.trim().is_empty() {
            return Err(AppError::BadRequest("place label cannot be empty".to_string()));
        }
    }

    let quote = estimate(
        &request.pickup.location,
        &request.dropoff.location,
        Some(request.vehicle_type),
        request.female_driver_preferred,
    );

    let now = Utc::now();
    let ride = Ride {
        id: Uuid::new_v4(),
        status: RideStatus::Pending,
        rider_id: caller.id,
        driver_id: None,
        pickup: request.pickup,
        dropoff: request.dropoff,
        vehicle_type: request.vehicle_type,
        female_driver_preferred: request.female_driver_preferred,
        distance_km: quote.distance_km,
        estimated_fare: quote.estimated_fare,
        actual_fare: None,
        co2_saved_kg: None,
        eco_points_earned: None,
        requested_at: now,
        accepted_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancelled_by: None,
        cancel_reason: None,
        sos_raised_at: None,
        sos_raised_by: None,
        updated_at: now,
        version: 0,
    };

    let ride = state.store.insert_ride(ride)?;
    state.metrics.active_rides.inc();

    info!(
        ride_id = %ride.id,
        rider_id = %ride.rider_id,
        vehicle_type = ride.vehicle_type.as_str(),
        estimated_fare = ride.estimated_fare,
        "ride requested"
    );

    dispatch::broadcast(state, &ride);
    Ok(ride)
}

pub fn get_ride(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    let ride = state.store.ride(ride_id)?;
    let visible = caller.is_admin()
        || ride.is_party(caller.id)
        || (caller.role == Role::Driver && ride.status == RideStatus::Pending);

    if !visible {
        return Err(AppError::Unauthorized(format!(
            "caller {} may not view ride {ride_id}",
            caller.id
        )));
    }
    Ok(ride)
}

/// The caller's own rides, newest first. Admins see every ride.
pub fn list_rides(state: &AppState, caller: &Caller) -> Vec<Ride> {
    let mut rides = match caller.role {
        Role::Admin => state.store.rides(&|_| true),
        Role::Rider => state.store.rides(&|ride| ride.rider_id == caller.id),
        Role::Driver => state
            .store
            .rides(&|ride| ride.driver_id == Some(caller.id) || ride.cancelled_by == Some(caller.id)),
    };
    rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
    rides
}

pub fn accept_ride(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    let result = accept_checked(state, caller, ride_id);
    record(state, "accept", &result);
    result
}

fn accept_checked(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    if caller.role != Role::Driver {
        return Err(AppError::Unauthorized("only drivers can accept rides".to_string()));
    }

    let presence = state
        .store
        .presence(caller.id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} has no presence", caller.id)))?;
    if !presence.is_available {
        return Err(AppError::InvalidState(format!(
            "driver {} is not available",
            caller.id
        )));
    }

    let now = Utc::now();
    let ride = state.store.update_ride(ride_id, &mut |ride| {
        if ride.status != RideStatus::Pending {
            if ride.driver_id.is_some() {
                return Err(AppError::AlreadyAssigned(ride.id));
            }
            return Err(AppError::InvalidState(format!(
                "ride {} is {}, only pending rides can be accepted",
                ride.id, ride.status
            )));
        }
        advance(ride, RideStatus::Accepted, now)?;
        ride.driver_id = Some(caller.id);
        ride.accepted_at = Some(now);
        Ok(())
    })?;

    let waited = (now - ride.requested_at).num_milliseconds().max(0) as f64 / 1000.0;
    state
        .metrics
        .accept_latency_seconds
        .with_label_values(&[ride.vehicle_type.as_str()])
        .observe(waited);

    info!(ride_id = %ride.id, driver_id = %caller.id, "ride accepted");

    dispatch::on_accept(state, &ride);
    announce(state, &ride, None);
    Ok(ride)
}

pub fn start_ride(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    let now = Utc::now();
    let result = state.store.update_ride(ride_id, &mut |ride| {
        reject_terminal(ride)?;
        require_bound_driver(ride, caller)?;
        advance(ride, RideStatus::InProgress, now)?;
        ride.started_at = Some(now);
        Ok(())
    });
    record(state, "start", &result);

    let ride = result?;
    info!(ride_id = %ride.id, driver_id = %caller.id, "ride started");
    announce(state, &ride, None);
    Ok(ride)
}

pub fn complete_ride(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    actual_fare: Option<f64>,
) -> Result<Ride, AppError> {
    if let Some(fare) = actual_fare {
        if !fare.is_finite() || fare < 0.0 {
            let result = Err(AppError::BadRequest(format!(
                "actual fare must be a non-negative number, got {fare}"
            )));
            record(state, "complete", &result);
            return result;
        }
    }

    let now = Utc::now();
    let result = state.store.update_ride(ride_id, &mut |ride| {
        reject_terminal(ride)?;
        require_bound_driver(ride, caller)?;
        advance(ride, RideStatus::Completed, now)?;

        let (co2_saved_kg, eco_points) = eco_metrics(ride.distance_km, Some(ride.vehicle_type));
        ride.actual_fare = Some(actual_fare.unwrap_or(ride.estimated_fare));
        ride.co2_saved_kg = Some(co2_saved_kg);
        ride.eco_points_earned = Some(eco_points);
        ride.completed_at = Some(now);
        Ok(())
    });
    record(state, "complete", &result);

    let ride = result?;
    info!(
        ride_id = %ride.id,
        driver_id = %caller.id,
        actual_fare = ?ride.actual_fare,
        eco_points = ?ride.eco_points_earned,
        "ride completed"
    );
    announce(state, &ride, None);
    Ok(ride)
}

pub fn cancel_ride(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    reason: Option<String>,
) -> Result<Ride, AppError> {
    let now = Utc::now();
    let mut previous_driver = None;
    let result = state.store.update_ride(ride_id, &mut |ride| {
        reject_terminal(ride)?;
        if !caller.is_admin() && !ride.is_party(caller.id) {
            return Err(AppError::Unauthorized(format!(
                "caller {} is not a party of ride {}",
                caller.id, ride.id
            )));
        }
        advance(ride, RideStatus::Cancelled, now)?;
        previous_driver = ride.driver_id.take();
        ride.cancelled_at = Some(now);
        ride.cancelled_by = Some(caller.id);
        ride.cancel_reason = reason.clone();
        Ok(())
    });
    record(state, "cancel", &result);

    let ride = result?;
    info!(
        ride_id = %ride.id,
        cancelled_by = %caller.id,
        reason = ride.cancel_reason.as_deref().unwrap_or(""),
        "ride cancelled"
    );
    dispatch::withdraw(state, ride.id, RemovalReason::Cancelled);
    announce(state, &ride, previous_driver);
    Ok(ride)
}

/// Flags the ride for operator attention. The status is left alone.
pub fn raise_sos(state: &AppState, caller: &Caller, ride_id: Uuid) -> Result<Ride, AppError> {
    let now = Utc::now();
    let result = state.store.update_ride(ride_id, &mut |ride| {
        reject_terminal(ride)?;
        if !ride.is_party(caller.id) {
            return Err(AppError::Unauthorized(format!(
                "caller {} is not a party of ride {}",
                caller.id, ride.id
            )));
        }
        ride.sos_raised_at = Some(now);
        ride.sos_raised_by = Some(caller.id);
        ride.updated_at = now;
        Ok(())
    });
    record(state, "sos", &result);

    let ride = result?;
    warn!(ride_id = %ride.id, raised_by = %caller.id, status = %ride.status, "sos raised");
    state.hub.send_to_admins(PushMessage::SosAlert {
        ride_id: ride.id,
        raised_by: caller.id,
        at: now,
    });
    Ok(ride)
}

/// Cancels a ride nobody accepted in time. A ride that left `pending` in the
/// meantime is reported as an invalid state and left alone.
pub fn expire_ride(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    let now = Utc::now();
    let result = state.store.update_ride(ride_id, &mut |ride| {
        if ride.status != RideStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "ride {} is {} and cannot expire",
                ride.id, ride.status
            )));
        }
        advance(ride, RideStatus::Cancelled, now)?;
        ride.cancelled_at = Some(now);
        ride.cancel_reason = Some(NO_DRIVER_FOUND.to_string());
        Ok(())
    });
    record(state, "expire", &result);

    let ride = result?;
    info!(ride_id = %ride.id, "ride expired without a driver");
    dispatch::withdraw(state, ride.id, RemovalReason::Expired);
    announce(state, &ride, None);
    Ok(ride)
}
