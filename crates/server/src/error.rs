use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use connecthub_core::errors::{ApplicationError, InterfaceError};

/// Body returned for every failed API call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiError {
    /// Missing caller identity or a gateway secret mismatch.
    Unauthorized { reason: String, correlation_id: String },
    Interface(InterfaceError),
}

impl ApiError {
    pub fn unauthorized(reason: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Unauthorized { reason: reason.into(), correlation_id: correlation_id.into() }
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Interface(InterfaceError::bad_request(message, correlation_id))
    }

    pub fn not_found(
        entity: &'static str,
        id: impl Into<String>,
        correlation_id: &str,
    ) -> Self {
        Self::from_application(ApplicationError::not_found(entity, id), correlation_id)
    }

    pub fn from_application(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self::Interface(error.into().into_interface(correlation_id))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Interface(InterfaceError::BadRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::Interface(InterfaceError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Interface(InterfaceError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            Self::Interface(InterfaceError::Conflict { .. }) => StatusCode::CONFLICT,
            Self::Interface(InterfaceError::ServiceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Interface(InterfaceError::Internal { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::Unauthorized { correlation_id, .. } => ErrorBody {
                error: "Authentication is required.".to_owned(),
                correlation_id: correlation_id.clone(),
            },
            Self::Interface(interface) => ErrorBody {
                error: interface.user_message(),
                correlation_id: interface.correlation_id().to_owned(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();

        match &self {
            Self::Unauthorized { reason, .. } => warn!(
                event_name = "api.request.unauthorized",
                correlation_id = %body.correlation_id,
                reason = %reason,
                "request rejected without a trusted caller"
            ),
            Self::Interface(interface) if status.is_server_error() => error!(
                event_name = "api.request.failed",
                correlation_id = %body.correlation_id,
                status = status.as_u16(),
                error = %interface,
                "request failed"
            ),
            Self::Interface(interface) => warn!(
                event_name = "api.request.refused",
                correlation_id = %body.correlation_id,
                status = status.as_u16(),
                error = %interface,
                "request refused"
            ),
        }

        (status, Json(body)).into_response()
    }
}

/// Attaches the request's correlation id while lifting lower-layer errors into `ApiError`.
pub trait ApiResultExt<T> {
    fn or_api(self, correlation_id: &str) -> Result<T, ApiError>;
}

impl<T, E> ApiResultExt<T> for Result<T, E>
where
    E: Into<ApplicationError>,
{
    fn or_api(self, correlation_id: &str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::from_application(error, correlation_id))
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use connecthub_core::domain::quote::QuoteStatus;
    use connecthub_core::errors::{ApplicationError, DomainError};
    use connecthub_db::repositories::RepositoryError;

    use super::{ApiError, ApiResultExt};

    #[test]
    fn repository_failures_map_onto_http_statuses() {
        let cases = [
            (RepositoryError::not_found("business", "biz-1"), StatusCode::NOT_FOUND),
            (RepositoryError::Forbidden("not yours".to_owned()), StatusCode::FORBIDDEN),
            (RepositoryError::Conflict("order exists".to_owned()), StatusCode::CONFLICT),
            (RepositoryError::Decode("bad row".to_owned()), StatusCode::SERVICE_UNAVAILABLE),
            (
                RepositoryError::Domain(DomainError::InvalidQuoteTransition {
                    from: QuoteStatus::Rejected,
                    to: QuoteStatus::Quoted,
                }),
                StatusCode::CONFLICT,
            ),
        ];

        for (error, expected) in cases {
            let mapped = Err::<(), _>(error).or_api("req-1").expect_err("error");
            assert_eq!(mapped.status(), expected);
            assert_eq!(mapped.body().correlation_id, "req-1");
        }
    }

    #[test]
    fn backend_detail_stays_out_of_the_body() {
        let error = ApiError::from_application(
            ApplicationError::Persistence("disk I/O error at page 42".to_owned()),
            "req-2",
        );

        assert!(!error.body().error.contains("page 42"));
        assert_eq!(error.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unauthorized_is_401() {
        let error = ApiError::unauthorized("missing x-user-id", "req-3");
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.body().correlation_id, "req-3");
    }
}
