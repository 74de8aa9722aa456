use actix_web::{HttpResponse, web};
use tracing::debug;

use crate::{
    access::{allowlist::NetworkGate, client_ip::ClientIp, gate::Action},
    auth::auth::AuthUser,
    error::AppError,
    models::AccessResponse,
    state::AppState,
};

/// Whether the caller could check in from where they are right now
#[utoipa::path(
    get,
    path = "/api/check-access",
    responses(
        (status = 200, description = "Network standing of the caller", body = AccessResponse),
        (status = 401, description = "Token expired or invalid"),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Access"
)]
pub async fn check_access(
    auth: AuthUser,
    ClientIp(source): ClientIp,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let admission = state.access.admit(&auth, Action::CheckAccess, source).await?;

    let (has_access, on_wifi) = match source {
        Some(ip) => (
            state
                .allowlist
                .check(admission.user(), auth.role, ip, NetworkGate::Registration)
                .await?,
            state.allowlist.on_office_network(ip).await?,
        ),
        None => (false, false),
    };

    debug!(user_id = %auth.user_id, source = ?source, has_access, on_wifi, "Access checked");
    Ok(HttpResponse::Ok().json(AccessResponse {
        has_access,
        on_wifi,
    }))
}
