use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::admin::{self, AdminStats};
use crate::error::AppError;
use crate::models::caller::Caller;
use crate::models::driver::DriverPresence;
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/active-rides", get(active_rides))
        .route("/admin/drivers", get(drivers))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<AdminStats>, AppError> {
    admin::require_admin(&caller)?;
    Ok(Json(admin::stats(&state)))
}

async fn active_rides(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Ride>>, AppError> {
    admin::require_admin(&caller)?;
    Ok(Json(admin::active_rides(&state)))
}

async fn drivers(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<DriverPresence>>, AppError> {
    admin::require_admin(&caller)?;
    Ok(Json(admin::drivers(&state)))
}
