use crate::access::allowlist::AllowlistSnapshot;
use crate::api::employee::{CreateEmployee, EmployeeListResponse, UpdateEmployee};
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus, AttendanceTotals},
    role::Role,
    shift_policy::ShiftPolicy,
    user::{User, UserStatus},
};
use crate::models::{
    AccessResponse, AddIpReq, AllowlistResponse, DashboardResponse, DashboardStats,
    ForgotPasswordReq, LoginReqDto, LoginResponse, MessageResponse, MonthlyAttendance,
    MonthlyAttendanceResponse, ReconcileReq, RecordListResponse, RecordResponse,
    ResetPasswordReq, UserResponse,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "WiFi Attendance API",
        version = "1.0.0",
        description = r#"
## Office network attendance

Employees check in and out from registered devices on the office network;
administrators and custodians manage people, the network allowlist and the
shift policy.

### Security
Every endpoint except login and password reset needs a **JWT Bearer** token.
Check-in additionally requires the request to come from an allowlisted
address, and for employees from one of their own registered devices.

### Response Format
Successful bodies carry `"success": true`; failures are
`{"success": false, "message": "..."}`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::verify,
        crate::auth::handlers::logout,
        crate::auth::handlers::forgot_password,
        crate::auth::handlers::reset_password,

        crate::api::access::check_access,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::report,
        crate::api::attendance::recent,
        crate::api::attendance::me,

        crate::api::admin::add_ip,
        crate::api::admin::list_ips,
        crate::api::admin::get_shift_policy,
        crate::api::admin::put_shift_policy,
        crate::api::admin::dashboard_stats,
        crate::api::admin::reconcile,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::employee_attendance
    ),
    components(
        schemas(
            Role,
            User,
            UserStatus,
            AttendanceRecord,
            AttendanceStatus,
            AttendanceTotals,
            ShiftPolicy,
            AllowlistSnapshot,
            LoginReqDto,
            LoginResponse,
            UserResponse,
            ForgotPasswordReq,
            ResetPasswordReq,
            MessageResponse,
            AccessResponse,
            RecordResponse,
            RecordListResponse,
            MonthlyAttendance,
            MonthlyAttendanceResponse,
            AddIpReq,
            AllowlistResponse,
            DashboardStats,
            DashboardResponse,
            ReconcileReq,
            CreateEmployee,
            UpdateEmployee,
            EmployeeListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token and password APIs"),
        (name = "Access", description = "Network standing of the caller"),
        (name = "Attendance", description = "Check-in, check-out and reports"),
        (name = "Admin", description = "Allowlist, shift policy, dashboard and reconciliation"),
        (name = "Employee", description = "Employee management APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
