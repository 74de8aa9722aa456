use actix_web::{HttpResponse, web};
use chrono::Utc;

use crate::{
    access::{client_ip::ClientIp, gate::Action},
    attendance::engine::parse_date,
    auth::auth::AuthUser,
    error::AppError,
    models::{
        MonthQuery, MonthlyAttendanceResponse, RecentQuery, RecordListResponse, RecordResponse,
        ReportQuery,
    },
    state::AppState,
};

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = RecordResponse),
        (status = 401, description = "Token expired or invalid"),
        (status = 403, description = "Access denied", body = Object, example = json!({
            "success": false,
            "message": "Access denied"
        })),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "success": false,
            "message": "Already checked in today"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    ClientIp(source): ClientIp,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let admission = state.access.admit(&auth, Action::CheckIn, source).await?;
    let record = state.attendance.check_in(&admission, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(RecordResponse {
        success: true,
        message: "Checked in successfully".to_string(),
        data: record,
    }))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = RecordResponse),
        (status = 401, description = "Token expired or invalid"),
        (status = 403, description = "Access denied"),
        (status = 409, description = "No active check-in found for today", body = Object, example = json!({
            "success": false,
            "message": "No active check-in found for today"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    ClientIp(source): ClientIp,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let admission = state.access.admit(&auth, Action::CheckOut, source).await?;
    let record = state.attendance.check_out(&admission, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(RecordResponse {
        success: true,
        message: "Checked out successfully".to_string(),
        data: record,
    }))
}

/// All records of one day
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(ReportQuery),
    responses(
        (status = 200, description = "Records of the day", body = RecordListResponse),
        (status = 400, description = "Malformed date"),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn report(
    auth: AuthUser,
    query: web::Query<ReportQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .access
        .admit(&auth, Action::ReadAttendanceReport, None)
        .await?;

    let date = match query.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state.attendance.local_date(Utc::now()),
    };
    let data = state.attendance.report(date).await?;

    Ok(HttpResponse::Ok().json(RecordListResponse {
        success: true,
        data,
    }))
}

/// Most recent records across all users
#[utoipa::path(
    get,
    path = "/api/attendance/recent",
    params(RecentQuery),
    responses(
        (status = 200, description = "Most recent first", body = RecordListResponse),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn recent(
    auth: AuthUser,
    query: web::Query<RecentQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .access
        .admit(&auth, Action::ReadAttendanceReport, None)
        .await?;
    let data = state.attendance.recent(query.limit).await?;

    Ok(HttpResponse::Ok().json(RecordListResponse {
        success: true,
        data,
    }))
}

/// The caller's own month
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(MonthQuery),
    responses(
        (status = 200, description = "Records and totals", body = MonthlyAttendanceResponse),
        (status = 400, description = "Malformed month"),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn me(
    auth: AuthUser,
    query: web::Query<MonthQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let admission = state
        .access
        .admit(&auth, Action::ReadOwnAttendance, None)
        .await?;
    let (year, month) = state
        .attendance
        .resolve_month(query.month.as_deref(), Utc::now())?;
    let data = state
        .attendance
        .month(&admission.user().id, year, month)
        .await?;

    Ok(HttpResponse::Ok().json(MonthlyAttendanceResponse {
        success: true,
        data,
    }))
}
