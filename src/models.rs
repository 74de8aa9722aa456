use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::model::{
    attendance::{AttendanceRecord, AttendanceTotals},
    role::Role,
    user::User,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// user id
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

// ---------- auth ----------

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginReqDto {
    #[schema(example = "EMP-001")]
    pub user_id: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordReq {
    #[schema(example = "EMP-001")]
    pub user_id: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordReq {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ---------- access ----------

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    /// The caller could register attendance from this address right now.
    pub has_access: bool,
    /// The address belongs to the office network.
    pub on_wifi: bool,
}

// ---------- attendance ----------

#[derive(Serialize, ToSchema)]
pub struct RecordResponse {
    pub success: bool,
    pub message: String,
    pub data: AttendanceRecord,
}

#[derive(Serialize, ToSchema)]
pub struct RecordListResponse {
    pub success: bool,
    pub data: Vec<AttendanceRecord>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    /// Day to report on, `YYYY-MM-DD`; defaults to today.
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentQuery {
    /// Number of records, 1 to 100; defaults to 10.
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthQuery {
    /// Month to summarise, `YYYY-MM`; defaults to the current month.
    pub month: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAttendance {
    #[schema(example = "2026-01")]
    pub month: String,
    pub records: Vec<AttendanceRecord>,
    pub totals: AttendanceTotals,
}

#[derive(Serialize, ToSchema)]
pub struct MonthlyAttendanceResponse {
    pub success: bool,
    pub data: MonthlyAttendance,
}

// ---------- admin ----------

#[derive(Deserialize, ToSchema)]
pub struct AddIpReq {
    #[schema(example = "192.168.1.10")]
    pub ip: String,
}

#[derive(Serialize, ToSchema)]
pub struct AllowlistResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[schema(example = "2026-01-05")]
    pub date: String,
    pub total_employees: u32,
    pub present: u32,
    pub late: u32,
    pub absent: u32,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub success: bool,
    pub data: DashboardStats,
}

#[derive(Deserialize, ToSchema)]
pub struct ReconcileReq {
    /// Past day to reconcile, `YYYY-MM-DD`; defaults to yesterday.
    #[schema(example = "2026-01-05")]
    pub date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_uses_camel_case() {
        let req: LoginReqDto =
            serde_json::from_str(r#"{"userId": "EMP-001", "password": "pw"}"#).unwrap();
        assert_eq!(req.user_id, "EMP-001");
    }

    #[test]
    fn access_response_field_names() {
        let body = serde_json::to_value(AccessResponse {
            has_access: true,
            on_wifi: false,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"hasAccess": true, "onWifi": false}));
    }
}
