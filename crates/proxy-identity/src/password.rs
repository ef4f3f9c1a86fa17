use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{IdentityError, Result};

/// Length bound from §4.2 Register: "password length 8-72". 72 also happens
/// to be bcrypt's historical input limit; kept for both adapters even though
/// this crate hashes with Argon2.
const MIN_LEN: usize = 8;
const MAX_LEN: usize = 72;

pub fn validate_length(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return Err(IdentityError::MalformedInput(format!(
            "password must be {MIN_LEN}-{MAX_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash(password: &str) -> Result<String> {
    validate_length(password)?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| IdentityError::MalformedInput(format!("could not hash password: {e}")))
}

pub fn verify(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrips() {
        let hashed = hash("correct horse battery staple").unwrap();
        assert!(verify("correct horse battery staple", &hashed));
        assert!(!verify("wrong password", &hashed));
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(validate_length("short").is_err());
        assert!(validate_length(&"x".repeat(73)).is_err());
        assert!(validate_length(&"x".repeat(8)).is_ok());
    }
}
