use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::Serialize;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PasswordIssue {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    MissingLetter,
    MissingDigit,
}

impl PasswordIssue {
    pub fn message(&self) -> String {
        match self {
            Self::TooShort { min, actual } => {
                format!("Password must be at least {min} characters (currently {actual})")
            }
            Self::TooLong { max, actual } => {
                format!("Password must be at most {max} characters (currently {actual})")
            }
            Self::MissingLetter => "Password must contain at least one letter".into(),
            Self::MissingDigit => "Password must contain at least one digit".into(),
        }
    }
}

pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(config: Argon2Config) -> Result<Self> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Argon2Config::default())
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("Password verification failed: {e}")),
        }
    }
}

pub fn validate_password(password: &str) -> Vec<PasswordIssue> {
    let mut issues = Vec::new();
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        issues.push(PasswordIssue::TooShort {
            min: MIN_PASSWORD_LENGTH,
            actual: length,
        });
    }
    if length > MAX_PASSWORD_LENGTH {
        issues.push(PasswordIssue::TooLong {
            max: MAX_PASSWORD_LENGTH,
            actual: length,
        });
    }
    if !password.chars().any(char::is_alphabetic) {
        issues.push(PasswordIssue::MissingLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push(PasswordIssue::MissingDigit);
    }
    issues
}

/// Hashing is CPU-bound; keep it off the async workers.
pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || PasswordHasher::with_defaults()?.hash(&password))
        .await
        .map_err(|e| anyhow!("Hashing task failed: {e}"))?
}

pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || PasswordHasher::with_defaults()?.verify(&password, &hash))
        .await
        .map_err(|e| anyhow!("Verification task failed: {e}"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::with_defaults().unwrap();
        let hash = hasher.hash("correct horse 1").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse 1", &hash).unwrap());
        assert!(!hasher.verify("wrong horse 1", &hash).unwrap());
        assert!(hasher.verify("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("abcdefg1").is_empty());
        assert_eq!(
            validate_password("abc1"),
            vec![PasswordIssue::TooShort { min: 8, actual: 4 }]
        );
        assert_eq!(validate_password("abcdefgh"), vec![PasswordIssue::MissingDigit]);
        assert_eq!(validate_password("12345678"), vec![PasswordIssue::MissingLetter]);
    }
}
