//! One-way digests for passwords and tokens (Argon2id, PHC string format).

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::warn;

use super::CredentialError;
use crate::config::SecurityConfig;

/// Argon2id hasher carrying the configured work factor.
///
/// Verification always uses the parameters embedded in the stored digest, so
/// changing the configured cost never invalidates existing digests.
#[derive(Clone)]
pub struct Hasher {
    argon2: Argon2<'static>,
}

impl Hasher {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, CredentialError> {
        let params = if config.min_cost {
            Params::new(
                Params::MIN_M_COST,
                Params::MIN_T_COST,
                Params::MIN_P_COST,
                None,
            )
        } else {
            Params::new(
                config.argon2_memory_cost_kib,
                config.argon2_time_cost,
                config.argon2_parallelism,
                None, // output length (use default)
            )
        }
        .map_err(|e| CredentialError::InvalidConfig(format!("Invalid Argon2 params: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a secret with a fresh random salt.
    pub fn digest(&self, plaintext: &str) -> Result<String, CredentialError> {
        if plaintext.is_empty() {
            return Err(CredentialError::InvalidInput(
                "cannot digest an empty secret".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2.hash_password(plaintext.as_bytes(), &salt)?;

        Ok(hash.to_string())
    }

    /// Check a secret against a stored digest.
    ///
    /// An absent digest is a normal miss. The final comparison is constant
    /// time (argon2 compares outputs with `subtle`).
    #[must_use]
    pub fn verify(&self, digest: Option<&str>, plaintext: &str) -> bool {
        let Some(digest) = digest else {
            return false;
        };

        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Stored digest is not a valid PHC string");
                return false;
            }
        };

        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}
