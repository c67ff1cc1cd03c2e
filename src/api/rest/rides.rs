use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatch;
use crate::engine::fare::{self, Estimate};
use crate::engine::lifecycle::{self, NewRide};
use crate::engine::location::{self, PublishOutcome};
use crate::error::AppError;
use crate::models::caller::Caller;
use crate::models::driver::GeoPoint;
use crate::models::location::LocationSample;
use crate::models::ride::{Place, Ride, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(create_ride).get(list_rides))
        .route("/rides/estimate", post(estimate_fare))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride))
        .route("/rides/:id/reject", post(reject_ride))
        .route("/rides/:id/start", post(start_ride))
        .route("/rides/:id/complete", post(complete_ride))
        .route("/rides/:id/cancel", post(cancel_ride))
        .route("/rides/:id/sos", post(raise_sos))
        .route("/rides/:id/locations", get(ride_locations))
        .route("/rides/:id/location", post(publish_location))
}

#[derive(Deserialize)]
pub struct CreateRideRequest {
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: String,
    #[serde(default)]
    pub female_driver_preferred: bool,
}

#[derive(Deserialize)]
pub struct EstimateRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub female_driver_preferred: bool,
}

#[derive(Default, Deserialize)]
pub struct CompleteRideRequest {
    pub actual_fare: Option<f64>,
}

#[derive(Default, Deserialize)]
pub struct CancelRideRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct LocationAck {
    pub ride_id: Uuid,
    pub applied: bool,
}

/// An empty body means every field was omitted. Anything else must parse.
fn optional_json<T>(body: &[u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| AppError::BadRequest(format!("invalid request body: {err}")))
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let vehicle_type = VehicleType::parse(&payload.vehicle_type).ok_or_else(|| {
        AppError::BadRequest(format!("unknown vehicle type: {}", payload.vehicle_type))
    })?;

    let ride = lifecycle::create_ride(
        &state,
        &caller,
        NewRide {
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            vehicle_type,
            female_driver_preferred: payload.female_driver_preferred,
        },
    )?;

    Ok((StatusCode::CREATED, Json(ride)))
}

async fn list_rides(State(state): State<Arc<AppState>>, caller: Caller) -> Json<Vec<Ride>> {
    Json(lifecycle::list_rides(&state, &caller))
}

/// Quotes a trip without creating anything. Vehicle names outside the fleet
/// are priced at the default tier.
async fn estimate_fare(Json(payload): Json<EstimateRequest>) -> Result<Json<Estimate>, AppError> {
    payload.pickup.validate()?;
    payload.dropoff.validate()?;

    let vehicle = payload.vehicle_type.as_deref().and_then(VehicleType::parse);
    Ok(Json(fare::estimate(
        &payload.pickup,
        &payload.dropoff,
        vehicle,
        payload.female_driver_preferred,
    )))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::get_ride(&state, &caller, id)?))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::accept_ride(&state, &caller, id)?))
}

async fn reject_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(dispatch::on_reject(&state, &caller, id)?))
}

async fn start_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::start_ride(&state, &caller, id)?))
}

async fn complete_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Ride>, AppError> {
    let payload: CompleteRideRequest = optional_json(&body)?;
    Ok(Json(lifecycle::complete_ride(
        &state,
        &caller,
        id,
        payload.actual_fare,
    )?))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Ride>, AppError> {
    let payload: CancelRideRequest = optional_json(&body)?;
    Ok(Json(lifecycle::cancel_ride(
        &state,
        &caller,
        id,
        payload.reason,
    )?))
}

async fn raise_sos(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(lifecycle::raise_sos(&state, &caller, id)?))
}

async fn ride_locations(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LocationSample>>, AppError> {
    Ok(Json(location::latest_locations(&state, &caller, id)?))
}

async fn publish_location(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationRequest>,
) -> Result<Json<LocationAck>, AppError> {
    let outcome = location::publish_location(
        &state,
        &caller,
        id,
        GeoPoint::new(payload.lat, payload.lng),
        payload.at,
        None,
    )?;

    Ok(Json(LocationAck {
        ride_id: id,
        applied: outcome == PublishOutcome::Applied,
    }))
}
