//! PIN hashing and verification.
//!
//! PINs are hashed with Argon2id into a PHC string with a random salt.
//! Verification re-derives the hash with the parameters embedded in the
//! stored string and compares in constant time.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;

use crate::error::{WalletError, WalletResult};

/// PIN format and hashing cost.
#[derive(Debug, Clone)]
pub struct PinConfig {
    /// Minimum number of digits.
    pub min_length: usize,
    /// Maximum number of digits.
    pub max_length: usize,
    /// Argon2 memory cost in KiB.
    pub memory_kib: u32,
    /// Argon2 iteration count.
    pub iterations: u32,
    /// Argon2 lanes.
    pub parallelism: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            min_length: 4,
            max_length: 12,
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl PinConfig {
    /// Cheap hashing parameters for tests and local runs.
    pub fn low_cost() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST.max(256),
            iterations: 1,
            parallelism: 1,
            ..Self::default()
        }
    }
}

/// Hashes and verifies wallet PINs.
#[derive(Clone)]
pub struct PinHasher {
    config: PinConfig,
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PinHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinHasher").field("config", &self.config).finish()
    }
}

impl PinHasher {
    pub fn new(config: PinConfig) -> WalletResult<Self> {
        if config.min_length == 0 || config.min_length > config.max_length {
            return Err(WalletError::InvalidInput(format!(
                "invalid PIN length bounds {}..={}",
                config.min_length, config.max_length
            )));
        }
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| WalletError::Internal(format!("argon2 params: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            config,
        })
    }

    /// Check that `pin` is an all-digit string within the configured length.
    pub fn validate(&self, pin: &str) -> WalletResult<()> {
        let len = pin.chars().count();
        if len < self.config.min_length || len > self.config.max_length {
            return Err(WalletError::InvalidInput(format!(
                "PIN must have between {} and {} digits",
                self.config.min_length, self.config.max_length
            )));
        }
        if !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(WalletError::InvalidInput("PIN must contain only digits".into()));
        }
        Ok(())
    }

    /// Validate and hash a PIN into a PHC string.
    pub fn hash(&self, pin: &str) -> WalletResult<String> {
        self.validate(pin)?;
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(pin.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| WalletError::Internal(format!("PIN hashing failed: {}", e)))
    }

    /// Compare a candidate against a stored hash. Fails with `InvalidPin` on mismatch.
    pub fn verify(&self, candidate: &str, stored: &str) -> WalletResult<()> {
        let parsed = PasswordHash::new(stored)
            .map_err(|e| WalletError::Internal(format!("stored PIN hash is malformed: {}", e)))?;
        match self.argon2.verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(WalletError::InvalidPin),
            Err(e) => Err(WalletError::Internal(format!("PIN verification failed: {}", e))),
        }
    }
}
