use thiserror::Error;

/// Errors raised by the credential authority.
///
/// A failed verification is never an error: it is a plain `false`.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Hashing failed: {0}")]
    Hashing(String),

    #[error("Invalid credential config: {0}")]
    InvalidConfig(String),
}

impl From<argon2::password_hash::Error> for CredentialError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Hashing(err.to_string())
    }
}
