use actix_web::{HttpResponse, web};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        auth::AuthUser,
        password::{hash_password, validate_new_password, verify_dummy, verify_password},
    },
    error::AppError,
    models::{
        ForgotPasswordReq, LoginReqDto, LoginResponse, MessageResponse, ResetPasswordReq,
        UserResponse,
    },
    state::AppState,
    store::UserPatch,
};

/// Login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Missing user id or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(state, body), fields(user_id = %body.user_id))]
pub async fn login(
    body: web::Json<LoginReqDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    let user_id = body.user_id.trim();
    if user_id.is_empty() || body.password.is_empty() {
        return Err(AppError::validation("User id and password are required"));
    }

    let user = match state.store.find_user(user_id).await? {
        Some(user) if user.is_active() => user,
        Some(_) => {
            verify_dummy(&body.password);
            info!("Invalid credentials: account inactive");
            return Err(AppError::InvalidCredentials);
        }
        None => {
            verify_dummy(&body.password);
            info!("Invalid credentials: user not found");
            return Err(AppError::InvalidCredentials);
        }
    };

    debug!("Verifying password");
    if !verify_password(&body.password, &user.password_hash) {
        info!("Invalid credentials: password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let issued = state.tokens.issue(&user, Utc::now())?;
    info!(role = %user.role, jti = %issued.claims.jti, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        success: true,
        token: issued.token,
        user,
    }))
}

/// Verify the bearer token and return its user
#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "Token is valid", body = UserResponse),
        (status = 401, description = "Token expired or invalid")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn verify(auth: AuthUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    match state.store.find_user(&auth.user_id).await? {
        Some(user) if user.is_active() && user.role == auth.role => {
            Ok(HttpResponse::Ok().json(UserResponse {
                success: true,
                user,
            }))
        }
        _ => {
            warn!(user_id = %auth.user_id, "Token outlived its account");
            Err(AppError::TokenInvalid)
        }
    }
}

/// Logout; revokes the presented token only
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Token expired or invalid")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(auth: AuthUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.tokens.revoke(&auth.jti, auth.expires_at).await?;
    info!(user_id = %auth.user_id, jti = %auth.jti, "Logged out");
    Ok(HttpResponse::NoContent().finish())
}

/// Request a password reset; the token is delivered out of band
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordReq,
    responses(
        (status = 200, description = "Reset instructions sent", body = MessageResponse),
        (status = 404, description = "User not found")
    ),
    tag = "Auth"
)]
pub async fn forgot_password(
    body: web::Json<ForgotPasswordReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = match state.store.find_user(body.user_id.trim()).await? {
        Some(user) if user.is_active() => user,
        _ => return Err(AppError::NotFound("User")),
    };

    let now = Utc::now();
    let token = format!(
        "{}{}",
        Uuid::new_v4().to_simple(),
        Uuid::new_v4().to_simple()
    );
    let expires_at = now + state.reset_token_ttl;
    state
        .store
        .insert_reset_token(&token, &user.id, expires_at)
        .await?;
    state.notifier.password_reset(&user, &token, expires_at).await;

    info!(user_id = %user.id, "Password reset issued");
    Ok(HttpResponse::Ok().json(MessageResponse::ok(
        "Password reset instructions have been sent",
    )))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordReq,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Weak password or unusable token")
    ),
    tag = "Auth"
)]
pub async fn reset_password(
    body: web::Json<ResetPasswordReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    validate_new_password(&body.new_password)?;

    let user_id = state
        .store
        .consume_reset_token(body.token.trim(), Utc::now())
        .await?
        .ok_or_else(|| AppError::validation("Reset token is invalid or expired"))?;

    let patch = UserPatch {
        password_hash: Some(hash_password(&body.new_password)?),
        ..UserPatch::default()
    };
    state
        .store
        .update_user(&user_id, patch)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    info!(%user_id, "Password reset completed");
    Ok(HttpResponse::Ok().json(MessageResponse::ok("Password updated")))
}
