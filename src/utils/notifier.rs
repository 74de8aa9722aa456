use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::model::user::User;

/// Out-of-band delivery of messages that must not travel in HTTP responses.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn password_reset(&self, user: &User, token: &str, expires_at: DateTime<Utc>);
}

/// Writes notifications to the `notify` log target, where a mail relay or an
/// operator picks them up.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn password_reset(&self, user: &User, token: &str, expires_at: DateTime<Utc>) {
        info!(
            target: "notify",
            user_id = %user.id,
            email = %user.email,
            reset_token = token,
            %expires_at,
            "Password reset requested"
        );
    }
}
