use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::access::{AccessControl, allowlist::IpAllowlist};
use crate::attendance::{AttendanceEngine, Reconciler};
use crate::auth::{jwt::TokenManager, revocation::RevocationList};
use crate::auth::password::{hash_password, prime_dummy_hash, validate_new_password};
use crate::config::Config;
use crate::error::AppError;
use crate::model::role::Role;
use crate::store::{NewUser, Store};
use crate::utils::notifier::Notifier;

/// Everything handlers share, registered once as `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenManager,
    pub access: AccessControl,
    pub allowlist: IpAllowlist,
    pub attendance: AttendanceEngine,
    pub reconciler: Reconciler,
    pub notifier: Arc<dyn Notifier>,
    pub reset_token_ttl: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        let offset = config.utc_offset();
        let token_ttl = Duration::seconds(config.token_ttl);
        let revocations = RevocationList::new(
            store.clone(),
            std::time::Duration::from_secs(config.token_ttl as u64),
        );
        let allowlist = IpAllowlist::new(store.clone());

        Self {
            tokens: TokenManager::new(&config.jwt_secret, token_ttl, revocations),
            access: AccessControl::new(store.clone(), allowlist.clone()),
            allowlist,
            attendance: AttendanceEngine::new(store.clone(), offset),
            reconciler: Reconciler::new(store.clone(), offset, config.reconcile_lookback_days),
            notifier,
            reset_token_ttl: Duration::seconds(config.reset_token_ttl),
            store,
        }
    }

    /// Seeds the office network and the first admin, then loads the token
    /// deny-list. Must finish before any request is served. Safe to run on
    /// every boot.
    pub async fn bootstrap(&self, config: &Config) -> Result<(), AppError> {
        for ip in &config.office_network_ips {
            self.allowlist.add_ip(ip).await?;
        }

        if let Some(admin) = &config.bootstrap_admin {
            if self.store.find_user(&admin.id).await?.is_none() {
                validate_new_password(&admin.password)?;
                self.store
                    .insert_user(NewUser {
                        id: admin.id.clone(),
                        display_name: "Administrator".to_string(),
                        email: admin.email.trim().to_lowercase(),
                        password_hash: hash_password(&admin.password)?,
                        role: Role::Admin,
                        designation: "Administrator".to_string(),
                        department: "Management".to_string(),
                        mobile: None,
                        allowed_ips: Vec::new(),
                        daily_wage: 0.0,
                        created_at: Utc::now(),
                    })
                    .await?;
                info!(user_id = %admin.id, "Bootstrap admin created");
            }
        }

        self.tokens
            .revocations()
            .warmup(Utc::now())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to warm up token deny-list");
                AppError::Internal
            })?;
        prime_dummy_hash();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::auth::AuthUser;
    use crate::config::BootstrapAdmin;
    use crate::store::MemoryStore;
    use crate::utils::notifier::LogNotifier;
    use std::collections::HashMap;

    #[actix_web::test]
    async fn bootstrap_is_idempotent() {
        let vars: HashMap<&str, &str> = [
            ("JWT_SECRET", "secret"),
            ("OFFICE_NETWORK_IPS", "10.0.0.1, 10.0.0.2,10.0.0.1"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        config.bootstrap_admin = Some(BootstrapAdmin {
            id: "ADMIN".into(),
            email: "Admin@Example.com".into(),
            password: "change-me-now".into(),
        });

        let state = AppState::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier), &config);
        state.bootstrap(&config).await.unwrap();
        state.bootstrap(&config).await.unwrap();

        assert_eq!(state.allowlist.snapshot().await.unwrap().count, 2);
        let admin = state.store.find_user("ADMIN").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.email, "admin@example.com");
    }

    #[actix_web::test]
    async fn bootstrap_loads_logouts_from_before_a_restart() {
        let vars: HashMap<&str, &str> = [("JWT_SECRET", "secret")].into_iter().collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(NewUser {
                id: "EMP-1".into(),
                display_name: "Emp".into(),
                email: "emp@example.com".into(),
                password_hash: "x".into(),
                role: Role::Employee,
                designation: "Engineer".into(),
                department: "General".into(),
                mobile: None,
                allowed_ips: Vec::new(),
                daily_wage: 100.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let before = AppState::new(store.clone(), Arc::new(LogNotifier), &config);
        let issued = before.tokens.issue(&user, Utc::now()).unwrap();
        let session = AuthUser::from(issued.claims.clone());
        before
            .tokens
            .revoke(&session.jti, session.expires_at)
            .await
            .unwrap();

        let restarted = AppState::new(store, Arc::new(LogNotifier), &config);
        restarted.bootstrap(&config).await.unwrap();
        assert_eq!(
            restarted.tokens.verify(&issued.token, Utc::now()).unwrap_err(),
            AppError::TokenInvalid
        );
    }
}
