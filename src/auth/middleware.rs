use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use chrono::Utc;
use tracing::debug;

use crate::auth::auth::{AuthUser, bearer_token};
use crate::error::AppError;
use crate::state::AppState;

/// Rejects requests without a valid bearer token and stores the verified
/// identity in the request extensions for `AuthUser` to pick up.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let state = match req.app_data::<Data<AppState>>() {
        Some(state) => state.clone(),
        None => return Ok(req.into_response(AppError::Internal.error_response())),
    };

    let verified = bearer_token(req.headers())
        .and_then(|token| state.tokens.verify(token, Utc::now()));

    let claims = match verified {
        Ok(claims) => claims,
        Err(e) => {
            debug!(path = %req.path(), error = %e, "Rejected bearer token");
            return Ok(req.into_response(e.error_response()));
        }
    };

    req.extensions_mut().insert(AuthUser::from(claims));

    next.call(req).await
}
