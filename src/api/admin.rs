use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{
    access::gate::Action,
    attendance::{engine::parse_date, reconcile::DayOutcome},
    auth::auth::AuthUser,
    error::AppError,
    model::shift_policy::ShiftPolicy,
    models::{AddIpReq, AllowlistResponse, DashboardResponse, ReconcileReq, ReportQuery},
    state::AppState,
};

/// Add an address to the office network allowlist
#[utoipa::path(
    post,
    path = "/api/admin/add-ip",
    request_body = AddIpReq,
    responses(
        (status = 200, description = "Allowlist after the insert", body = AllowlistResponse),
        (status = 400, description = "Invalid IP address", body = Object, example = json!({
            "success": false,
            "message": "Invalid IP address: 300.1.1.1"
        })),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn add_ip(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<AddIpReq>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageAllowlist, None).await?;
    let snapshot = state.allowlist.add_ip(&body.ip).await?;

    Ok(HttpResponse::Ok().json(AllowlistResponse {
        success: true,
        message: "IP added to allowlist".to_string(),
        allowed_ips: snapshot.allowed_ips,
        count: snapshot.count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/allowlist",
    responses(
        (status = 200, description = "Current allowlist", body = AllowlistResponse),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_ips(auth: AuthUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageAllowlist, None).await?;
    let snapshot = state.allowlist.snapshot().await?;

    Ok(HttpResponse::Ok().json(AllowlistResponse {
        success: true,
        message: format!("{} allowed IPs", snapshot.count),
        allowed_ips: snapshot.allowed_ips,
        count: snapshot.count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/shift-policy",
    responses(
        (status = 200, description = "Active shift policy", body = ShiftPolicy),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_shift_policy(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ReadShiftPolicy, None).await?;
    let policy = state.store.shift_policy().await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": policy })))
}

/// Replace the shift policy; applies to check-ins from now on
#[utoipa::path(
    put,
    path = "/api/admin/shift-policy",
    request_body = ShiftPolicy,
    responses(
        (status = 200, description = "Policy saved", body = ShiftPolicy),
        (status = 400, description = "Invalid policy"),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn put_shift_policy(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<ShiftPolicy>,
) -> Result<HttpResponse, AppError> {
    state
        .access
        .admit(&auth, Action::ConfigureShiftPolicy, None)
        .await?;
    let policy = body.into_inner();
    policy.validate().map_err(AppError::Validation)?;

    state.store.save_shift_policy(&policy).await?;
    info!(
        by = %auth.user_id,
        start = %policy.start_time,
        grace = policy.grace_minutes,
        expected_hours = policy.expected_hours,
        "Shift policy updated"
    );
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": policy })))
}

#[utoipa::path(
    get,
    path = "/api/admin/dashboard/stats",
    params(ReportQuery),
    responses(
        (status = 200, description = "Head counts of the day", body = DashboardResponse),
        (status = 400, description = "Malformed date"),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn dashboard_stats(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ViewDashboard, None).await?;
    let date = match query.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state.attendance.local_date(Utc::now()),
    };
    let data = state.attendance.day_stats(date).await?;

    Ok(HttpResponse::Ok().json(DashboardResponse {
        success: true,
        data,
    }))
}

/// Materialise absences for one past day
#[utoipa::path(
    post,
    path = "/api/admin/reconcile",
    request_body = ReconcileReq,
    responses(
        (status = 200, description = "Day reconciled or already done", body = Object, example = json!({
            "success": true,
            "message": "Reconciled 2026-01-05",
            "inserted": 3
        })),
        (status = 400, description = "Date is not in the past"),
        (status = 403, description = "Access denied"),
        (status = 500, description = "Some absences could not be recorded; retried next run")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn reconcile(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<ReconcileReq>,
) -> Result<HttpResponse, AppError> {
    state
        .access
        .admit(&auth, Action::RunReconciliation, None)
        .await?;
    let now = Utc::now();
    let date = match body.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state
            .reconciler
            .yesterday(now)
            .ok_or_else(|| AppError::validation("No previous day"))?,
    };

    let (message, inserted) = match state.reconciler.reconcile_day(date, now).await? {
        DayOutcome::Reconciled { inserted } => (format!("Reconciled {}", date), inserted),
        DayOutcome::AlreadyDone => (format!("{} was already reconciled", date), 0),
        DayOutcome::NotAWorkday => (format!("{} is not a workday", date), 0),
    };
    info!(by = %auth.user_id, %date, inserted, "Manual reconciliation");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
        "inserted": inserted
    })))
}
