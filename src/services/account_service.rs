//! Domain service for account registration, login sessions and activation.

use thiserror::Error;

use crate::credentials::{CredentialError, PlainToken};
use crate::db::User;
use crate::validation::FieldError;

/// Errors specific to account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account not found")]
    NotFound,

    #[error("Validation failed: {}", join_messages(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("Invalid email/password combination")]
    InvalidCredentials,

    #[error("Account not activated")]
    NotActivated,

    #[error("Invalid activation link")]
    InvalidActivation,

    #[error("Account already activated")]
    AlreadyActivated,

    #[error("Account was modified concurrently, reload and retry")]
    Conflict,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Account view without any digest.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub activated: bool,
    pub activated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for Account {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            activated: user.credentials.activated,
            activated_at: user.credentials.activated_at.map(|at| at.to_rfc3339()),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: Option<String>,
}

/// Profile edit. `password: None` keeps the current password.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

/// Domain service trait for accounts.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Validates, stores a new inactive account and sends its activation
    /// email.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::ValidationFailed`] with every field error found.
    async fn register(&self, account: NewAccount) -> Result<Account, AccountError>;

    /// Applies a profile edit through the same validation pipeline.
    async fn update_account(&self, id: i32, update: AccountUpdate)
    -> Result<Account, AccountError>;

    /// Checks email and password.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] for an unknown email or a
    /// wrong password, [`AccountError::NotActivated`] before activation.
    async fn log_in(&self, email: &str, password: &str) -> Result<Account, AccountError>;

    /// Starts a persistent session and returns the token for the client.
    async fn remember(&self, id: i32) -> Result<PlainToken, AccountError>;

    /// Resolves a persistent-session cookie to its account.
    async fn authenticate_remembered(
        &self,
        id: i32,
        token: &str,
    ) -> Result<Option<Account>, AccountError>;

    /// Ends the persistent session. Idempotent.
    async fn forget(&self, id: i32) -> Result<(), AccountError>;

    /// Consumes an activation link.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidActivation`] for an unknown email or a
    /// wrong token, [`AccountError::AlreadyActivated`] on a repeated call.
    async fn activate(&self, email: &str, token: &str) -> Result<Account, AccountError>;

    async fn get_account(&self, id: i32) -> Result<Account, AccountError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError>;
}
