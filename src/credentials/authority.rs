use chrono::{DateTime, Utc};
use tracing::debug;

use super::digest::Hasher;
use super::record::{CredentialRecord, TokenPurpose};
use super::token::{PlainToken, new_token};
use super::CredentialError;
use crate::config::{MIN_TOKEN_BYTES, SecurityConfig};

/// Hashes passwords, mints tokens and checks presented secrets against the
/// digests of a [`CredentialRecord`].
///
/// Cheap to clone; the service moves clones onto the blocking pool.
#[derive(Clone)]
pub struct CredentialAuthority {
    hasher: Hasher,
    token_bytes: usize,
    /// Digest of a discarded random token, checked when no account matches.
    decoy_digest: String,
}

impl CredentialAuthority {
    pub fn new(config: &SecurityConfig) -> Result<Self, CredentialError> {
        if config.token_bytes < MIN_TOKEN_BYTES {
            return Err(CredentialError::InvalidConfig(format!(
                "token_bytes must be at least {MIN_TOKEN_BYTES}"
            )));
        }

        let hasher = Hasher::from_config(config)?;
        let decoy_digest = hasher.digest(new_token(config.token_bytes).as_str())?;

        Ok(Self {
            hasher,
            token_bytes: config.token_bytes,
            decoy_digest,
        })
    }

    pub fn hash_password(&self, plaintext: &str) -> Result<String, CredentialError> {
        self.hasher.digest(plaintext)
    }

    #[must_use]
    pub fn verify(&self, digest: Option<&str>, plaintext: &str) -> bool {
        self.hasher.verify(digest, plaintext)
    }

    /// Spend one verification's worth of work for a lookup that found no
    /// credential, then report a miss.
    #[must_use]
    pub fn verify_absent(&self, plaintext: &str) -> bool {
        let _ = self.hasher.verify(Some(&self.decoy_digest), plaintext);
        false
    }

    #[must_use]
    pub fn new_token(&self) -> PlainToken {
        new_token(self.token_bytes)
    }

    /// Mint an activation token together with its digest.
    pub fn issue_activation_credential(&self) -> Result<(PlainToken, String), CredentialError> {
        let token = self.new_token();
        let digest = self.hasher.digest(token.as_str())?;
        Ok((token, digest))
    }

    /// Build the credential record of a new account: password digest and
    /// activation digest are set together, the account starts inactive.
    pub fn enroll(&self, password: &str) -> Result<(CredentialRecord, PlainToken), CredentialError> {
        let password_digest = self.hash_password(password)?;
        let (activation_token, activation_digest) = self.issue_activation_credential()?;

        let record = CredentialRecord {
            password_digest,
            remember_digest: None,
            activation_digest,
            activated: false,
            activated_at: None,
        };

        Ok((record, activation_token))
    }

    /// Start a persistent session: store a fresh token's digest and return
    /// the plaintext token for the client.
    pub fn remember(&self, record: &mut CredentialRecord) -> Result<PlainToken, CredentialError> {
        let token = self.new_token();
        record.remember_digest = Some(self.hasher.digest(token.as_str())?);
        Ok(token)
    }

    #[must_use]
    pub fn authenticated(
        &self,
        record: &CredentialRecord,
        purpose: TokenPurpose,
        token: &str,
    ) -> bool {
        let matched = self.hasher.verify(record.digest_for(purpose), token);
        debug!(purpose = purpose.as_str(), matched, "Token checked");
        matched
    }

    /// Drop the remember digest. Calling it on a record without one is fine.
    pub fn forget(&self, record: &mut CredentialRecord) {
        record.remember_digest = None;
    }

    /// Mark the record activated at `now`.
    ///
    /// Returns `false` and leaves the record untouched when it was already
    /// activated, so `activated_at` is fixed by the first call.
    pub fn activate(&self, record: &mut CredentialRecord, now: DateTime<Utc>) -> bool {
        if record.activated {
            return false;
        }

        record.activated = true;
        record.activated_at = Some(now);
        true
    }
}
