use chrono::Utc;
use tracing::info;

use crate::error::AppError;
use crate::models::caller::{Caller, Role};
use crate::models::driver::{DriverPresence, GeoPoint};
use crate::models::message::PushMessage;
use crate::models::ride::VehicleType;
use crate::state::AppState;

fn require_driver(caller: &Caller) -> Result<(), AppError> {
    if caller.role != Role::Driver {
        return Err(AppError::Unauthorized(
            "only drivers have a presence".to_string(),
        ));
    }
    Ok(())
}

/// Toggles the caller's availability. The first call must name the vehicle.
pub fn set_availability(
    state: &AppState,
    caller: &Caller,
    is_available: bool,
    vehicle_type: Option<VehicleType>,
    location: Option<GeoPoint>,
) -> Result<DriverPresence, AppError> {
    require_driver(caller)?;
    if let Some(point) = &location {
        point.validate()?;
    }

    let now = Utc::now();
    let presence = match state.store.presence(caller.id) {
        Some(_) => state.store.update_presence(caller.id, &mut |presence| {
            presence.is_available = is_available;
            if let Some(vehicle) = vehicle_type {
                presence.vehicle_type = vehicle;
            }
            if location.is_some() {
                presence.last_known_location = location;
            }
            presence.updated_at = now;
        })?,
        None => {
            let vehicle_type = vehicle_type.ok_or_else(|| {
                AppError::BadRequest("vehicle_type is required when going online".to_string())
            })?;
            state.store.upsert_presence(DriverPresence {
                driver_id: caller.id,
                is_available,
                last_known_location: location,
                vehicle_type,
                updated_at: now,
            })
        }
    };

    info!(
        driver_id = %caller.id,
        is_available = presence.is_available,
        vehicle_type = presence.vehicle_type.as_str(),
        "driver availability changed"
    );
    announce_location(state, &presence);
    Ok(presence)
}

/// Moves the caller on the admin live map.
pub fn update_location(
    state: &AppState,
    caller: &Caller,
    point: GeoPoint,
) -> Result<DriverPresence, AppError> {
    require_driver(caller)?;
    point.validate()?;

    let now = Utc::now();
    let presence = state.store.update_presence(caller.id, &mut |presence| {
        presence.last_known_location = Some(point);
        presence.updated_at = now;
    })?;

    announce_location(state, &presence);
    Ok(presence)
}

fn announce_location(state: &AppState, presence: &DriverPresence) {
    if let Some(location) = presence.last_known_location {
        state.hub.send_to_admins(PushMessage::DriverLocation {
            driver_id: presence.driver_id,
            lat: location.lat,
            lng: location.lng,
            at: presence.updated_at,
        });
    }
}
