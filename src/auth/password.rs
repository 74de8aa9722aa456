use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash of a throwaway password, checked when a login names no usable account.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password(&Uuid::new_v4().to_simple().to_string()).unwrap_or_default());

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            AppError::Internal
        })
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

/// Runs a full verification that can never succeed.
pub fn verify_dummy(password: &str) -> bool {
    verify_password(password, &DUMMY_HASH);
    false
}

/// Builds the dummy hash ahead of the first failed login.
pub fn prime_dummy_hash() {
    Lazy::force(&DUMMY_HASH);
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn dummy_verification_runs_argon2_and_fails() {
        prime_dummy_hash();
        assert!(PasswordHash::new(&DUMMY_HASH).is_ok());
        assert!(!verify_dummy("anything"));
        assert!(!verify_dummy(""));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("long enough").is_ok());
    }
}
