use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Conflict {
    #[display(fmt = "Already checked in today")]
    DuplicateCheckIn,
    #[display(fmt = "No active check-in found for today")]
    NoOpenSession,
    #[display(fmt = "Email already registered")]
    EmailTaken,
    #[display(fmt = "User id already exists")]
    UserIdTaken,
}

/// Every failure a request can end in. Messages are safe to show to callers.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum AppError {
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "Invalid credentials")]
    InvalidCredentials,
    #[display(fmt = "Token expired")]
    TokenExpired,
    #[display(fmt = "Invalid token")]
    TokenInvalid,
    /// Wrong network, wrong role or inactive account; deliberately indistinguishable.
    #[display(fmt = "Access denied")]
    Unauthorized,
    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),
    #[display(fmt = "{}", _0)]
    Conflict(Conflict),
    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::TokenExpired | AppError::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": self.to_string()
        }))
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(kind) => AppError::Conflict(kind),
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "Storage failure");
                AppError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(AppError::validation("bad ip").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Conflict(Conflict::DuplicateCheckIn).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn denial_message_is_generic() {
        assert_eq!(AppError::Unauthorized.to_string(), "Access denied");
        assert_eq!(AppError::NotFound("User").to_string(), "User not found");
    }

    #[test]
    fn backend_failures_become_internal() {
        let err: AppError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err, AppError::Internal);
    }
}
