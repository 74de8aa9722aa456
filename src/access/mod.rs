//! Admission pipeline: a verified token, the role capability table and the
//! network allowlists must all agree before any state is touched.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::warn;

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::user::User;
use crate::store::Store;

pub mod allowlist;
pub mod client_ip;
pub mod gate;

use allowlist::{IpAllowlist, NetworkGate};
use gate::Action;

/// Proof that `user` passed every check for `action`.
#[derive(Debug, Clone)]
pub struct Admission {
    user: User,
    action: Action,
}

impl Admission {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn action(&self) -> Action {
        self.action
    }

    #[cfg(test)]
    pub fn granted(user: User, action: Action) -> Self {
        Self { user, action }
    }
}

#[derive(Clone)]
pub struct AccessControl {
    store: Arc<dyn Store>,
    allowlist: IpAllowlist,
}

impl AccessControl {
    pub fn new(store: Arc<dyn Store>, allowlist: IpAllowlist) -> Self {
        Self { store, allowlist }
    }

    /// Every failure collapses to `AppError::Unauthorized`; the reason is only logged.
    pub async fn admit(
        &self,
        auth: &AuthUser,
        action: Action,
        source: Option<IpAddr>,
    ) -> Result<Admission, AppError> {
        if !gate::authorize(auth.role, action) {
            warn!(user_id = %auth.user_id, role = %auth.role, %action, "Denied: role");
            return Err(AppError::Unauthorized);
        }

        let user = match self.store.find_user(&auth.user_id).await? {
            Some(user) if user.is_active() && user.role == auth.role => user,
            _ => {
                warn!(user_id = %auth.user_id, %action, "Denied: account inactive or changed");
                return Err(AppError::Unauthorized);
            }
        };

        let gate = action.network_gate();
        if gate != NetworkGate::Open {
            let authorized = match source {
                Some(ip) => self.allowlist.check(&user, auth.role, ip, gate).await?,
                None => false,
            };
            if !authorized {
                warn!(user_id = %auth.user_id, source = ?source, %action, "Denied: network");
                return Err(AppError::Unauthorized);
            }
        }

        Ok(Admission { user, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::model::user::UserStatus;
    use crate::store::{MemoryStore, NewUser, UserPatch};
    use chrono::Utc;

    async fn setup(role: Role, bound: &[&str]) -> (AccessControl, Arc<MemoryStore>, AuthUser) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(NewUser {
                id: "U1".into(),
                display_name: "Una".into(),
                email: "una@example.com".into(),
                password_hash: "x".into(),
                role,
                designation: "Engineer".into(),
                department: "General".into(),
                mobile: None,
                allowed_ips: bound.iter().map(|s| s.to_string()).collect(),
                daily_wage: 100.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store.add_global_ip("10.0.0.5").await.unwrap();
        store.add_global_ip("10.0.0.9").await.unwrap();
        let dyn_store: Arc<dyn Store> = store.clone();
        let access = AccessControl::new(dyn_store.clone(), IpAllowlist::new(dyn_store));
        let auth = AuthUser {
            user_id: "U1".into(),
            role,
            jti: "j".into(),
            expires_at: Utc::now(),
        };
        (access, store, auth)
    }

    fn ip(s: &str) -> Option<IpAddr> {
        s.parse().ok()
    }

    #[actix_web::test]
    async fn employee_check_in_requires_bound_device() {
        let (access, _, auth) = setup(Role::Employee, &["10.0.0.5"]).await;
        assert!(access.admit(&auth, Action::CheckIn, ip("10.0.0.5")).await.is_ok());
        assert_eq!(
            access.admit(&auth, Action::CheckIn, ip("10.0.0.9")).await.unwrap_err(),
            AppError::Unauthorized
        );
        assert_eq!(
            access.admit(&auth, Action::CheckIn, None).await.unwrap_err(),
            AppError::Unauthorized
        );
    }

    #[actix_web::test]
    async fn role_gate_runs_before_anything_else() {
        let (access, _, auth) = setup(Role::Employee, &["10.0.0.5"]).await;
        let err = access
            .admit(&auth, Action::ManageAllowlist, ip("10.0.0.5"))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Unauthorized);
    }

    #[actix_web::test]
    async fn deactivated_account_is_denied_with_a_live_token() {
        let (access, store, auth) = setup(Role::Admin, &[]).await;
        store
            .update_user(
                "U1",
                UserPatch {
                    status: Some(UserStatus::Inactive),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap();
        let err = access.admit(&auth, Action::ViewDashboard, None).await.unwrap_err();
        assert_eq!(err, AppError::Unauthorized);
    }

    #[actix_web::test]
    async fn role_change_invalidates_outstanding_tokens() {
        let (access, store, auth) = setup(Role::Admin, &[]).await;
        store
            .update_user(
                "U1",
                UserPatch {
                    role: Some(Role::Employee),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(access.admit(&auth, Action::ManageEmployees, None).await.is_err());
    }

    #[actix_web::test]
    async fn admission_carries_user_and_action() {
        let (access, _, auth) = setup(Role::Custodian, &[]).await;
        let admission = access
            .admit(&auth, Action::CheckIn, ip("10.0.0.9"))
            .await
            .unwrap();
        assert_eq!(admission.user().id, "U1");
        assert_eq!(admission.action(), Action::CheckIn);
    }
}
