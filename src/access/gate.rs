use derive_more::Display;

use super::allowlist::NetworkGate;
use crate::model::role::Role;

/// Everything a caller can ask the service to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Action {
    #[display(fmt = "check-in")]
    CheckIn,
    #[display(fmt = "check-out")]
    CheckOut,
    #[display(fmt = "read-own-attendance")]
    ReadOwnAttendance,
    #[display(fmt = "check-access")]
    CheckAccess,
    #[display(fmt = "read-attendance-report")]
    ReadAttendanceReport,
    #[display(fmt = "view-dashboard")]
    ViewDashboard,
    #[display(fmt = "manage-employees")]
    ManageEmployees,
    /// Creating, editing or deactivating an admin account, or promoting to admin.
    #[display(fmt = "manage-admins")]
    ManageAdmins,
    #[display(fmt = "manage-allowlist")]
    ManageAllowlist,
    #[display(fmt = "read-shift-policy")]
    ReadShiftPolicy,
    #[display(fmt = "configure-shift-policy")]
    ConfigureShiftPolicy,
    #[display(fmt = "run-reconciliation")]
    RunReconciliation,
}

impl Action {
    pub fn network_gate(self) -> NetworkGate {
        match self {
            Action::CheckIn => NetworkGate::Registration,
            _ => NetworkGate::Open,
        }
    }
}

/// Static capability table. Admin may do everything. Custodian may do all but
/// policy configuration and admin accounts; employee only self-service.
pub fn authorize(role: Role, action: Action) -> bool {
    match role {
        Role::Admin => true,
        Role::Custodian => !matches!(
            action,
            Action::ConfigureShiftPolicy | Action::ManageAdmins
        ),
        Role::Employee => matches!(
            action,
            Action::CheckIn | Action::CheckOut | Action::ReadOwnAttendance | Action::CheckAccess
        ),
    }
}
