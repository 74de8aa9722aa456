use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::info;

use crate::error::AppError;
use crate::store::Store;

/// Deny-list of logged-out token ids. The store is the record; the cache
/// answers lookups synchronously and forgets entries once no token could
/// still be alive.
#[derive(Clone)]
pub struct RevocationList {
    cache: Cache<String, DateTime<Utc>>,
    store: Arc<dyn Store>,
}

impl RevocationList {
    pub fn new(store: Arc<dyn Store>, token_ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(token_ttl).build(),
            store,
        }
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.cache.contains_key(jti)
    }

    pub async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        self.store.revoke_token(jti, expires_at).await?;
        self.cache.insert(jti.to_string(), expires_at).await;
        Ok(())
    }

    /// Loads every still-relevant revocation from the store.
    pub async fn warmup(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let revoked = self
            .store
            .revoked_tokens(now)
            .await
            .map_err(|e| anyhow::anyhow!("loading revoked tokens failed: {:?}", e))?;

        let futures: Vec<_> = revoked
            .iter()
            .map(|(jti, exp)| self.cache.insert(jti.clone(), *exp))
            .collect();
        futures::future::join_all(futures).await;

        info!(count = revoked.len(), "Token deny-list warmup complete");
        Ok(revoked.len())
    }
}
