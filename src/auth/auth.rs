use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, http::header::HeaderMap, web::Data,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::future::{Ready, ready};

use crate::{error::AppError, model::role::Role, models::Claims, state::AppState};

/// Identity proven by a verified bearer token. Never built from request fields.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            user_id: claims.sub,
            role: claims.role,
            jti: claims.jti,
            expires_at,
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::TokenInvalid)
}

/// Verifies the request's bearer token against `state` at the current time.
pub fn authenticate(req: &HttpRequest, state: &AppState) -> Result<AuthUser, AppError> {
    let token = bearer_token(req.headers())?;
    let claims = state.tokens.verify(token, Utc::now())?;
    Ok(claims.into())
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by `auth_middleware` on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let state = match req.app_data::<Data<AppState>>() {
            Some(s) => s,
            None => return ready(Err(AppError::Internal.into())),
        };

        ready(authenticate(req, state).map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn extracts_bearer_token() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn missing_or_foreign_scheme_is_invalid() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(req.headers()).unwrap_err(), AppError::TokenInvalid);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()).unwrap_err(), AppError::TokenInvalid);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer "))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()).unwrap_err(), AppError::TokenInvalid);
    }
}
