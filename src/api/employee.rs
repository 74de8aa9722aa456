use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    access::{allowlist::normalize_ips, gate::Action},
    auth::{
        auth::AuthUser,
        password::{hash_password, validate_new_password},
    },
    error::AppError,
    model::{
        role::Role,
        user::{User, UserStatus},
    },
    models::{MonthQuery, MonthlyAttendanceResponse, UserResponse},
    state::AppState,
    store::{NewUser, UserPatch, UserQuery},
};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployee {
    #[schema(example = "EMP-002")]
    pub id: String,
    #[schema(example = "Jane Doe")]
    pub display_name: String,
    #[schema(example = "jane@company.com", format = "email")]
    pub email: String,
    #[schema(example = "initial-pass")]
    pub password: String,
    /// Defaults to `employee`.
    pub role: Option<Role>,
    #[schema(example = "Engineer")]
    pub designation: Option<String>,
    #[schema(example = "General")]
    pub department: Option<String>,
    pub mobile: Option<String>,
    #[serde(rename = "allowedIPs", default)]
    #[schema(example = json!(["10.0.0.5"]))]
    pub allowed_ips: Vec<String>,
    #[schema(example = 1200.0)]
    pub daily_wage: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmployee {
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Sets a new password directly.
    pub password: Option<String>,
    pub role: Option<Role>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub mobile: Option<String>,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Option<Vec<String>>,
    pub status: Option<UserStatus>,
    pub daily_wage: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    /// Matches id, name, email or designation.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeListResponse {
    pub success: bool,
    pub data: Vec<User>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: u64,
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_lowercase())
        }
        _ => Err(AppError::validation(format!("Invalid email address: {}", email))),
    }
}

fn validate_wage(wage: f64) -> Result<f64, AppError> {
    if wage.is_finite() && wage >= 0.0 {
        Ok(wage)
    } else {
        Err(AppError::validation("dailyWage must be a non-negative number"))
    }
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Admin accounts are out of reach of anyone without `ManageAdmins`.
async fn guard_admin_account(
    state: &AppState,
    auth: &AuthUser,
    touches_admin: bool,
) -> Result<(), AppError> {
    if touches_admin {
        state.access.admit(auth, Action::ManageAdmins, None).await?;
    }
    Ok(())
}

async fn existing(state: &AppState, id: &str) -> Result<User, AppError> {
    state
        .store
        .find_user(id)
        .await?
        .ok_or(AppError::NotFound("Employee"))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/admin/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = UserResponse),
        (status = 400, description = "Invalid field"),
        (status = 403, description = "Access denied, or a custodian creating an admin"),
        (status = 409, description = "User id or email already taken")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    state: web::Data<AppState>,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageEmployees, None).await?;
    let payload = payload.into_inner();
    let role = payload.role.unwrap_or(Role::Employee);
    guard_admin_account(&state, &auth, role == Role::Admin).await?;

    validate_new_password(&payload.password)?;
    let new_user = NewUser {
        id: required("id", &payload.id)?,
        display_name: required("displayName", &payload.display_name)?,
        email: validate_email(&payload.email)?,
        password_hash: hash_password(&payload.password)?,
        role,
        designation: payload.designation.unwrap_or_else(|| "Employee".to_string()),
        department: payload.department.unwrap_or_else(|| "General".to_string()),
        mobile: payload.mobile.filter(|m| !m.trim().is_empty()),
        allowed_ips: normalize_ips(&payload.allowed_ips)?,
        daily_wage: validate_wage(payload.daily_wage.unwrap_or(0.0))?,
        created_at: Utc::now(),
    };

    let user = state.store.insert_user(new_user).await?;
    info!(by = %auth.user_id, user_id = %user.id, role = %user.role, "Employee created");

    Ok(HttpResponse::Created().json(UserResponse {
        success: true,
        user,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 403, description = "Access denied")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<EmployeeQuery>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageEmployees, None).await?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1).saturating_mul(per_page);

    let result = state
        .store
        .list_users(&UserQuery {
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            role: query.role,
            status: query.status,
            limit: per_page,
            offset,
        })
        .await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        success: true,
        data: result.users,
        page,
        per_page,
        total: result.total,
    }))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/admin/employees/{id}",
    params(("id", Path, description = "User id")),
    responses(
        (status = 200, description = "Employee found", body = UserResponse),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageEmployees, None).await?;
    let user = existing(&state, &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        success: true,
        user,
    }))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/admin/employees/{id}",
    params(("id", Path, description = "User id")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = UserResponse),
        (status = 400, description = "Invalid field"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Email already taken")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateEmployee>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageEmployees, None).await?;
    let id = path.into_inner();
    let body = body.into_inner();
    let target = existing(&state, &id).await?;
    guard_admin_account(
        &state,
        &auth,
        target.role == Role::Admin || body.role == Some(Role::Admin),
    )
    .await?;

    let password_hash = match &body.password {
        Some(password) => {
            validate_new_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let patch = UserPatch {
        display_name: body
            .display_name
            .as_deref()
            .map(|v| required("displayName", v))
            .transpose()?,
        email: body.email.as_deref().map(validate_email).transpose()?,
        password_hash,
        role: body.role,
        designation: body.designation,
        department: body.department,
        mobile: body.mobile,
        allowed_ips: body
            .allowed_ips
            .as_deref()
            .map(normalize_ips)
            .transpose()?,
        status: body.status,
        daily_wage: body.daily_wage.map(validate_wage).transpose()?,
    };

    let user = state
        .store
        .update_user(&id, patch)
        .await?
        .ok_or(AppError::NotFound("Employee"))?;
    info!(by = %auth.user_id, user_id = %user.id, "Employee updated");

    Ok(HttpResponse::Ok().json(UserResponse {
        success: true,
        user,
    }))
}

/// Deactivate Employee; records are kept
#[utoipa::path(
    delete,
    path = "/api/admin/employees/{id}",
    params(("id", Path, description = "User id")),
    responses(
        (status = 200, description = "Employee deactivated", body = UserResponse),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    state.access.admit(&auth, Action::ManageEmployees, None).await?;
    let id = path.into_inner();
    let target = existing(&state, &id).await?;
    guard_admin_account(&state, &auth, target.role == Role::Admin).await?;

    let patch = UserPatch {
        status: Some(UserStatus::Inactive),
        ..UserPatch::default()
    };
    let user = state
        .store
        .update_user(&id, patch)
        .await?
        .ok_or(AppError::NotFound("Employee"))?;
    info!(by = %auth.user_id, user_id = %user.id, "Employee deactivated");

    Ok(HttpResponse::Ok().json(UserResponse {
        success: true,
        user,
    }))
}

/// Monthly attendance of one employee
#[utoipa::path(
    get,
    path = "/api/admin/employees/{id}/attendance",
    params(("id", Path, description = "User id"), MonthQuery),
    responses(
        (status = 200, description = "Records and totals", body = MonthlyAttendanceResponse),
        (status = 400, description = "Malformed month"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn employee_attendance(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> Result<HttpResponse, AppError> {
    state
        .access
        .admit(&auth, Action::ReadAttendanceReport, None)
        .await?;
    let id = path.into_inner();
    if state.store.find_user(&id).await?.is_none() {
        return Err(AppError::NotFound("Employee"));
    }

    let (year, month) = state
        .attendance
        .resolve_month(query.month.as_deref(), Utc::now())?;
    let data = state.attendance.month(&id, year, month).await?;

    Ok(HttpResponse::Ok().json(MonthlyAttendanceResponse {
        success: true,
        data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(validate_email(" Jane@Company.com ").unwrap(), "jane@company.com");
        assert!(validate_email("jane").is_err());
        assert!(validate_email("@company.com").is_err());
        assert!(validate_email("jane@localhost").is_err());
    }

    #[test]
    fn wage_must_be_non_negative() {
        assert!(validate_wage(-1.0).is_err());
        assert!(validate_wage(f64::NAN).is_err());
        assert_eq!(validate_wage(0.0).unwrap(), 0.0);
    }

    #[test]
    fn create_payload_defaults() {
        let payload: CreateEmployee = serde_json::from_str(
            r#"{"id": "EMP-9", "displayName": "N", "email": "n@x.io", "password": "longenough"}"#,
        )
        .unwrap();
        assert!(payload.allowed_ips.is_empty());
        assert!(payload.role.is_none());
    }
}
