use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::caller::{Caller, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Browsers cannot set headers on a websocket upgrade, so the identity may
/// also arrive as query parameters.
#[derive(Debug, Default, Deserialize)]
struct IdentityQuery {
    user_id: Option<String>,
    role: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        let query = Query::<IdentityQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let raw_id = header(USER_ID_HEADER)
            .or(query.user_id)
            .ok_or_else(|| AppError::Unauthenticated(format!("{USER_ID_HEADER} is required")))?;
        let raw_role = header(USER_ROLE_HEADER)
            .or(query.role)
            .ok_or_else(|| AppError::Unauthenticated(format!("{USER_ROLE_HEADER} is required")))?;

        let id = Uuid::parse_str(raw_id.trim())
            .map_err(|err| AppError::Unauthenticated(format!("invalid user id: {err}")))?;
        let role = Role::parse(&raw_role)
            .ok_or_else(|| AppError::Unauthenticated(format!("unknown role: {raw_role}")))?;

        Ok(Caller { id, role })
    }
}
