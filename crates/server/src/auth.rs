use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use connecthub_core::domain::user::UserId;

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller vouched for by the upstream gateway. Rejects with 401 otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub correlation_id: String,
}

/// Context for routes open to anonymous visitors. `user_id` is only set for trusted callers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<UserId>,
    pub correlation_id: String,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);

        if !state.auth.accepts_gateway_secret(header(parts, GATEWAY_SECRET_HEADER)) {
            return Err(ApiError::unauthorized("gateway secret mismatch", correlation_id));
        }
        let Some(user_id) = header(parts, USER_ID_HEADER) else {
            return Err(ApiError::unauthorized("missing x-user-id header", correlation_id));
        };

        Ok(Self { user_id: UserId::from(user_id), correlation_id })
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        let trusted = state.auth.accepts_gateway_secret(header(parts, GATEWAY_SECRET_HEADER));
        let user_id = header(parts, USER_ID_HEADER).filter(|_| trusted).map(UserId::from);

        Ok(Self { user_id, correlation_id })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn correlation_id(parts: &Parts) -> String {
    header(parts, REQUEST_ID_HEADER)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
