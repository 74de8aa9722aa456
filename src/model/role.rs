use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Custodian,
    Employee,
}

impl Role {
    /// Admins and custodians operate from the office network and manage the system.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Custodian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_and_prints_lowercase_names() {
        assert_eq!(Role::from_str("custodian").unwrap(), Role::Custodian);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Employee.as_ref(), "employee");
        assert!(Role::from_str("hr").is_err());
    }

    #[test]
    fn staff_roles() {
        assert!(Role::Admin.is_staff());
        assert!(Role::Custodian.is_staff());
        assert!(!Role::Employee.is_staff());
    }
}
