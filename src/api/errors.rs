//! API Error Handling
//!
//! Structured error responses with HTTP status codes derived from the core
//! error taxonomy, tagged with the request id.

use crate::{
    engine::GameError,
    errors::{ErrorCategory, RgsError},
    ledger::LedgerError,
    rng::RngError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// NOT_FOUND, BAD_REQUEST, INSUFFICIENT_BALANCE, ...
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    InsufficientBalance(String),
    InternalError(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
}

impl ApiErrorKind {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiErrorKind::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m.as_str()),
            ApiErrorKind::BadRequest(m) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", m.as_str()),
            ApiErrorKind::Forbidden(m) => (StatusCode::FORBIDDEN, "FORBIDDEN", m.as_str()),
            ApiErrorKind::Conflict(m) => (StatusCode::CONFLICT, "INVALID_STATE", m.as_str()),
            ApiErrorKind::InsufficientBalance(m) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE", m.as_str())
            }
            ApiErrorKind::InternalError(m) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", m.as_str()),
            ApiErrorKind::ServiceUnavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", m.as_str())
            }
            ApiErrorKind::GatewayTimeout(m) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", m.as_str()),
        }
    }
}

impl ApiError {
    fn new(request_id: String, kind: ApiErrorKind) -> Self {
        Self {
            kind,
            request_id,
            details: None,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::NotFound(message))
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::BadRequest(message))
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::InternalError(message))
    }

    pub fn gateway_timeout(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::GatewayTimeout(message))
    }

    pub fn status(&self) -> StatusCode {
        self.kind.parts().0
    }

    /// Map a core error onto a status code by category, with the few
    /// variants that deserve a more specific answer picked out first.
    pub fn from_core(request_id: String, err: RgsError) -> Self {
        let message = err.to_string();
        let category = err.category();
        let kind = match &err {
            RgsError::Game(
                GameError::SessionNotFound(_) | GameError::GameNotFound(_) | GameError::CycleNotFound(_),
            )
            | RgsError::Ledger(LedgerError::PlayerNotFound(_))
            | RgsError::Game(GameError::Ledger(LedgerError::PlayerNotFound(_))) => {
                ApiErrorKind::NotFound(message)
            }
            RgsError::Access(_)
            | RgsError::Game(GameError::Access(_))
            | RgsError::Game(GameError::GameDisabled(_)) => ApiErrorKind::Forbidden(message),
            RgsError::Game(GameError::InsufficientBalance { .. })
            | RgsError::Ledger(LedgerError::InsufficientFunds { .. }) => {
                ApiErrorKind::InsufficientBalance(message)
            }
            RgsError::Rng(RngError::EntropyUnavailable(_))
            | RgsError::Game(GameError::OutcomeGeneration {
                source: RngError::EntropyUnavailable(_),
                ..
            }) => ApiErrorKind::ServiceUnavailable(message),
            _ => match category {
                ErrorCategory::Validation => ApiErrorKind::BadRequest(message),
                ErrorCategory::Resource => ApiErrorKind::InsufficientBalance(message),
                ErrorCategory::State => ApiErrorKind::Conflict(message),
                ErrorCategory::Integrity | ErrorCategory::System => {
                    ApiErrorKind::InternalError(message)
                }
            },
        };
        Self {
            kind,
            request_id,
            details: Some(json!({ "category": category })),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (status, code, message) = self.kind.parts();
        write!(f, "[{}] {} {}: {}", self.request_id, status.as_u16(), code, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.kind.parts();
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                details: self.details,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::money::Money;
    use crate::common::traits::AccessDenied;

    fn status_of(err: impl Into<RgsError>) -> StatusCode {
        ApiError::from_core("req-1".to_string(), err.into()).status()
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            status_of(GameError::SessionNotFound("s".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(GameError::InvalidWager("1".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(GameError::InsufficientBalance {
                available: Money::new(0, "USD"),
                requested: Money::new(100, "USD"),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(GameError::Access(AccessDenied::PlayerDisabled("p".into()))),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(GameError::DuplicateCycle("c".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(GameError::OutcomeTampered("c".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(GameError::OutcomeGeneration {
                cycle_id: "c".into(),
                source: RngError::EntropyUnavailable("gone".into()),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(LedgerError::PlayerNotFound("p".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_display_carries_request_id() {
        let err = ApiError::bad_request("req-9".to_string(), "bad amount".to_string());
        assert_eq!(err.to_string(), "[req-9] 400 BAD_REQUEST: bad amount");
    }
}
