use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use uuid::Uuid;

use super::revocation::RevocationList;
use crate::{error::AppError, model::user::User, models::Claims};

pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and verifies bearer tokens. Tokens are self-contained HS256 JWTs;
/// logout revokes through the shared deny-list.
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    revocations: RevocationList,
}

impl TokenManager {
    pub fn new(secret: &str, ttl: Duration, revocations: RevocationList) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is judged against the caller's clock in `verify`
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            revocations,
        }
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedToken, AppError> {
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, user_id = %user.id, "Token signing failed");
            AppError::Internal
        })?;

        Ok(IssuedToken { token, claims })
    }

    /// Valid iff the signature checks, `now < exp` and the token was not revoked.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::TokenInvalid,
            })?;

        if now.timestamp() >= claims.exp {
            return Err(AppError::TokenExpired);
        }
        if self.revocations.is_revoked(&claims.jti) {
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Ends one session; other tokens of the same user stay valid.
    pub async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        self.revocations.revoke(jti, expires_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{role::Role, user::UserStatus};
    use crate::store::{MemoryStore, Store};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn manager(secret: &str) -> TokenManager {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let revocations = RevocationList::new(store, std::time::Duration::from_secs(86400));
        TokenManager::new(secret, Duration::hours(24), revocations)
    }

    fn user() -> User {
        User {
            id: "EMP-001".into(),
            display_name: "John".into(),
            email: "john@example.com".into(),
            password_hash: String::new(),
            role: Role::Employee,
            designation: "Engineer".into(),
            department: "General".into(),
            mobile: None,
            allowed_ips: vec![],
            status: UserStatus::Active,
            daily_wage: 0.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_carries_identity_and_role() {
        let tokens = manager("secret");
        let now = Utc::now();
        let issued = tokens.issue(&user(), now).unwrap();
        let claims = tokens.verify(&issued.token, now).unwrap();
        assert_eq!(claims.sub, "EMP-001");
        assert_eq!(claims.role, Role::Employee);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn expires_exactly_after_the_validity_window() {
        let tokens = manager("secret");
        let t = Utc::now();
        let issued = tokens.issue(&user(), t).unwrap();
        assert!(tokens.verify(&issued.token, t + Duration::hours(24) - Duration::seconds(1)).is_ok());
        assert_eq!(
            tokens.verify(&issued.token, t + Duration::hours(24)).unwrap_err(),
            AppError::TokenExpired
        );
        assert_eq!(
            tokens
                .verify(&issued.token, t + Duration::hours(24) + Duration::seconds(1))
                .unwrap_err(),
            AppError::TokenExpired
        );
    }

    #[test]
    fn foreign_or_tampered_tokens_are_invalid() {
        let now = Utc::now();
        let issued = manager("secret").issue(&user(), now).unwrap();
        assert_eq!(
            manager("other").verify(&issued.token, now).unwrap_err(),
            AppError::TokenInvalid
        );
        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert_eq!(
            manager("secret").verify(&tampered, now).unwrap_err(),
            AppError::TokenInvalid
        );
        assert_eq!(
            manager("secret").verify("garbage", now).unwrap_err(),
            AppError::TokenInvalid
        );
    }

    #[actix_web::test]
    async fn revocation_only_affects_the_revoked_session() {
        let tokens = manager("secret");
        let now = Utc::now();
        let first = tokens.issue(&user(), now).unwrap();
        let second = tokens.issue(&user(), now).unwrap();
        let expires_at = Utc.timestamp_opt(first.claims.exp, 0).unwrap();
        tokens.revoke(&first.claims.jti, expires_at).await.unwrap();
        assert_eq!(tokens.verify(&first.token, now).unwrap_err(), AppError::TokenInvalid);
        assert!(tokens.verify(&second.token, now).is_ok());
    }
}
