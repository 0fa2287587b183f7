//! Password hashing
//!
//! Argon2id with the crate's default parameters and a random salt per hash,
//! stored as a PHC string (`$argon2id$v=19$...`).

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext password into a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

/// Check a plaintext password against a stored PHC string.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id_and_salted() {
        let first = hash_password("123456").unwrap();
        let second = hash_password("123456").unwrap();

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains("123456"));
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("old-secret").unwrap();
        assert!(verify_password("old-secret", &hash).unwrap());
        assert!(!verify_password("new-secret", &hash).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash() {
        assert!(verify_password("anything", "pbkdf2:sha256:50000$abc").is_err());
    }

    #[test]
    fn test_unicode_password() {
        let hash = hash_password("密码测试").unwrap();
        assert!(verify_password("密码测试", &hash).unwrap());
    }
}
