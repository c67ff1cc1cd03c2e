use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::{dispatch, presence};
use crate::error::AppError;
use crate::models::caller::{Caller, Role};
use crate::models::driver::{DriverPresence, GeoPoint};
use crate::models::ride::{Ride, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/availability", put(update_availability))
        .route("/driver/location", put(update_location))
        .route("/driver/pending-rides", get(pending_rides))
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<DriverPresence>, AppError> {
    let vehicle_type = match payload.vehicle_type.as_deref() {
        Some(raw) => Some(
            VehicleType::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown vehicle type: {raw}")))?,
        ),
        None => None,
    };

    let presence = presence::set_availability(
        &state,
        &caller,
        payload.is_available,
        vehicle_type,
        payload.location,
    )?;
    Ok(Json(presence))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<DriverPresence>, AppError> {
    Ok(Json(presence::update_location(
        &state,
        &caller,
        payload.location,
    )?))
}

async fn pending_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Ride>>, AppError> {
    if caller.role != Role::Driver {
        return Err(AppError::Unauthorized(
            "only drivers have pending ride offers".to_string(),
        ));
    }
    Ok(Json(dispatch::pending_for(&state, caller.id)))
}
