use std::collections::HashSet;
use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use thiserror::Error;

const DECOY_PASSWORD: &str = "decoy-password-never-matches";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("weak password: {}", .0.join("; "))]
    Weak(Vec<String>),
    #[error("hash error: {0}")]
    Hash(String),
    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Complexity rules checked before anything is hashed or stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub min_unique_chars: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            min_unique_chars: 1,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        }
    }
}

impl PasswordPolicy {
    /// Reports every violated rule at once.
    pub fn check(&self, plain: &str) -> Result<(), PasswordError> {
        let mut reasons = Vec::new();
        if plain.chars().count() < self.min_length {
            reasons.push(format!(
                "must be at least {} characters long",
                self.min_length
            ));
        }
        if self.require_digit && !plain.chars().any(|c| c.is_ascii_digit()) {
            reasons.push("must contain a digit".to_string());
        }
        if self.require_lowercase && !plain.chars().any(char::is_lowercase) {
            reasons.push("must contain a lowercase letter".to_string());
        }
        if self.require_uppercase && !plain.chars().any(char::is_uppercase) {
            reasons.push("must contain an uppercase letter".to_string());
        }
        if self.require_non_alphanumeric && plain.chars().all(char::is_alphanumeric) {
            reasons.push("must contain a non-alphanumeric character".to_string());
        }
        let unique: HashSet<char> = plain.chars().collect();
        if unique.len() < self.min_unique_chars {
            reasons.push(format!(
                "must use at least {} distinct characters",
                self.min_unique_chars
            ));
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(PasswordError::Weak(reasons))
        }
    }
}

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    #[cfg(test)]
    pub(crate) fn cheap() -> Self {
        Self {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Salted one-way hashing. All Argon2 work runs on the blocking pool.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    policy: PasswordPolicy,
    decoy: Arc<OnceCell<String>>,
}

impl PasswordHasher {
    pub fn new(cost: HashCost, policy: PasswordPolicy) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params),
            policy,
            decoy: Arc::new(OnceCell::new()),
        })
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Checks the policy, then hashes with a fresh random salt.
    pub async fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        self.policy.check(plain)?;
        let argon2 = self.argon2.clone();
        let plain = plain.to_string();
        tokio::task::spawn_blocking(move || hash_with(&argon2, &plain))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    pub async fn verify(&self, plain: &str, hash: &str) -> Result<bool, PasswordError> {
        let argon2 = self.argon2.clone();
        let plain = plain.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || verify_with(&argon2, &plain, &hash))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// Spends one verification on a decoy hash so that a login for an unknown
    /// account costs as much as one with a wrong password.
    pub async fn verify_dummy(&self, plain: &str) -> Result<(), PasswordError> {
        let argon2 = self.argon2.clone();
        let decoy = Arc::clone(&self.decoy);
        let plain = plain.to_string();
        tokio::task::spawn_blocking(move || {
            let hash = decoy.get_or_try_init(|| hash_with(&argon2, DECOY_PASSWORD))?;
            verify_with(&argon2, &plain, hash).map(|_| ())
        })
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
    }
}

fn hash_with(argon2: &Argon2<'static>, plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plain.as_bytes(), &salt)
        .map(|p| p.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

fn verify_with(argon2: &Argon2<'static>, plain: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::Hash(e.to_string()))?;
    match argon2.verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Hash(e.to_string())),
    }
}
