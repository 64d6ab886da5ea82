//! Credential & token authority.
//!
//! Password digests, remember tokens and activation tokens. Plaintext secrets
//! only live in memory while being issued or checked.

mod authority;
mod digest;
mod error;
mod record;
mod token;

pub use authority::CredentialAuthority;
pub use digest::Hasher;
pub use error::CredentialError;
pub use record::{CredentialRecord, TokenPurpose};
pub use token::{PlainToken, new_token};
