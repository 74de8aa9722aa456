use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::role::Role;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": "EMP-001",
        "displayName": "John Doe",
        "email": "john.doe@company.com",
        "role": "employee",
        "designation": "Engineer",
        "department": "General",
        "mobile": "+8801712345678",
        "allowedIPs": ["10.0.0.5"],
        "status": "active",
        "dailyWage": 1200.0,
        "createdAt": "2026-01-01T09:00:00Z"
    })
)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[schema(read_only)]
    pub password_hash: String,
    pub role: Role,
    pub designation: String,
    pub department: String,
    #[schema(nullable = true)]
    pub mobile: Option<String>,
    /// Device bindings: the only source IPs this user may register attendance from.
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
    pub status: UserStatus,
    pub daily_wage: f64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}
