use chrono::{DateTime, Utc};

/// Which stored digest a presented token is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Remember,
    Activation,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remember => "remember",
            Self::Activation => "activation",
        }
    }
}

/// Authentication state of one user. Holds digests only, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub password_digest: String,
    pub remember_digest: Option<String>,
    pub activation_digest: String,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    #[must_use]
    pub fn digest_for(&self, purpose: TokenPurpose) -> Option<&str> {
        match purpose {
            TokenPurpose::Remember => self.remember_digest.as_deref(),
            TokenPurpose::Activation => Some(self.activation_digest.as_str()),
        }
    }
}
