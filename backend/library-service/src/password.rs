//! Password hashing and verification using Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use error_types::{ServiceError, ServiceResult};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Well-formed hash with the default parameters that no password matches
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$bGlicmFyeS1kdW1teS1zYQ$\
                          BwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSY";

/// Hash a password with Argon2id and a random salt
///
/// Returns a PHC-formatted string safe for storage.
pub fn hash_password(password: &str) -> ServiceResult<String> {
    validate_password(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServiceError::internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();

    Ok(password_hash)
}

/// Constant-time check of `password` against a stored PHC hash
pub fn verify_password(password: &str, password_hash: &str) -> ServiceResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| ServiceError::internal(anyhow::anyhow!("invalid password hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ServiceError::internal(anyhow::anyhow!(
            "password verification failed: {e}"
        ))),
    }
}

/// Spend the same Argon2 work as a real check when there is no stored hash
pub fn verify_dummy(password: &str) {
    let _ = verify_password(password, DUMMY_HASH);
}

pub fn validate_password(password: &str) -> ServiceResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ServiceError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ServiceError::bad_request(format!(
            "password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
