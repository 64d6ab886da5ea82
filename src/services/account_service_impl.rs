//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

use crate::credentials::{CredentialAuthority, CredentialError, PlainToken, TokenPurpose};
use crate::db::{InsertOutcome, NewUser, Store, UpdateOutcome, User, UserChanges};
use crate::mail::{Mailer, UserIdentity};
use crate::services::account_service::{
    Account, AccountError, AccountService, AccountUpdate, NewAccount,
};
use crate::validation::{
    FieldError, normalize_email, validate_email, validate_name, validate_password,
    validate_password_confirmation,
};

pub struct SeaOrmAccountService {
    store: Store,
    authority: CredentialAuthority,
    mailer: Arc<dyn Mailer>,
}

impl SeaOrmAccountService {
    #[must_use]
    pub fn new(store: Store, authority: CredentialAuthority, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            authority,
            mailer,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Run Argon2 work off the async runtime.
    async fn with_authority<T, F>(&self, f: F) -> Result<T, AccountError>
    where
        F: FnOnce(&CredentialAuthority) -> Result<T, CredentialError> + Send + 'static,
        T: Send + 'static,
    {
        let authority = self.authority.clone();
        let result = task::spawn_blocking(move || f(&authority))
            .await
            .map_err(|e| AccountError::Internal(format!("Credential task panicked: {e}")))?;

        Ok(result?)
    }

    async fn load(&self, id: i32) -> Result<User, AccountError> {
        self.store.get_user(id).await?.ok_or(AccountError::NotFound)
    }

    async fn dispatch_activation(&self, user: &User, token: &PlainToken) {
        let identity = UserIdentity {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        };

        if let Err(e) = self.mailer.send_activation_email(&identity, token).await {
            warn!(user_id = user.id, error = %e, "Failed to send activation email");
        }
    }

    async fn write(
        &self,
        user: &User,
        changes: UserChanges,
    ) -> Result<Account, AccountError> {
        match self
            .store
            .update_user(user.id, user.lock_version, changes)
            .await?
        {
            UpdateOutcome::Updated => Ok(self.load(user.id).await?.into()),
            UpdateOutcome::Stale => Err(AccountError::Conflict),
            UpdateOutcome::DuplicateEmail => {
                Err(AccountError::ValidationFailed(vec![FieldError::taken("email")]))
            }
        }
    }

    /// Activation steps after the account row was read. A row changed since
    /// that read is reported as `AlreadyActivated` or `Conflict`.
    async fn activate_loaded(&self, user: User, token: &str) -> Result<Account, AccountError> {
        let credentials = user.credentials.clone();
        let token = token.to_string();
        let matched = self
            .with_authority(move |authority| {
                Ok(authority.authenticated(&credentials, TokenPurpose::Activation, &token))
            })
            .await?;

        if !matched {
            info!(user_id = user.id, "Rejected activation: token mismatch");
            return Err(AccountError::InvalidActivation);
        }

        let mut credentials = user.credentials.clone();
        if !self.authority.activate(&mut credentials, Utc::now()) {
            return Err(AccountError::AlreadyActivated);
        }

        let activated_at = credentials
            .activated_at
            .ok_or_else(|| AccountError::Internal("activation left no timestamp".to_string()))?;

        if !self
            .store
            .activate_user(user.id, user.lock_version, activated_at)
            .await?
        {
            let current = self.load(user.id).await?;
            return Err(if current.credentials.activated {
                AccountError::AlreadyActivated
            } else {
                AccountError::Conflict
            });
        }

        metrics::counter!("accounts_activated_total").increment(1);
        info!(user_id = user.id, "Activated account");

        Ok(self.load(user.id).await?.into())
    }
}

fn has_field(errors: &[FieldError], field: &str) -> bool {
    errors.iter().any(|e| e.field == field)
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn register(&self, account: NewAccount) -> Result<Account, AccountError> {
        let mut errors = validate_name(&account.name);
        errors.extend(validate_email(&account.email));
        errors.extend(validate_password(Some(&account.password)));
        errors.extend(validate_password_confirmation(
            &account.password,
            account.password_confirmation.as_deref(),
        ));

        let email = normalize_email(&account.email);

        if !has_field(&errors, "email") && self.store.email_taken(&email, None).await? {
            errors.push(FieldError::taken("email"));
        }

        if !errors.is_empty() {
            return Err(AccountError::ValidationFailed(errors));
        }

        let password = account.password;
        let (credentials, activation_token) = self
            .with_authority(move |authority| authority.enroll(&password))
            .await?;

        let new_user = NewUser {
            name: account.name,
            email,
            credentials,
        };

        let user = match self.store.insert_user(new_user).await? {
            InsertOutcome::Created(user) => user,
            InsertOutcome::DuplicateEmail => {
                return Err(AccountError::ValidationFailed(vec![FieldError::taken(
                    "email",
                )]));
            }
        };

        metrics::counter!("accounts_registered_total").increment(1);
        info!(user_id = user.id, "Registered account");

        self.dispatch_activation(&user, &activation_token).await;

        Ok(user.into())
    }

    async fn update_account(
        &self,
        id: i32,
        update: AccountUpdate,
    ) -> Result<Account, AccountError> {
        let user = self.load(id).await?;

        let mut errors = Vec::new();
        if let Some(name) = &update.name {
            errors.extend(validate_name(name));
        }

        let email = update.email.as_deref().map(|raw| {
            errors.extend(validate_email(raw));
            normalize_email(raw)
        });

        errors.extend(validate_password(update.password.as_deref()));
        if let Some(password) = &update.password {
            errors.extend(validate_password_confirmation(
                password,
                update.password_confirmation.as_deref(),
            ));
        }

        if let Some(email) = &email
            && !has_field(&errors, "email")
            && *email != user.email
            && self.store.email_taken(email, Some(id)).await?
        {
            errors.push(FieldError::taken("email"));
        }

        if !errors.is_empty() {
            return Err(AccountError::ValidationFailed(errors));
        }

        let password_digest = match update.password {
            Some(password) => Some(
                self.with_authority(move |authority| authority.hash_password(&password))
                    .await?,
            ),
            None => None,
        };

        let changes = UserChanges {
            name: update.name,
            email,
            password_digest,
            remember_digest: None,
        };

        let account = self.write(&user, changes).await?;
        info!(user_id = id, "Updated account");
        Ok(account)
    }

    async fn log_in(&self, email: &str, password: &str) -> Result<Account, AccountError> {
        let email = normalize_email(email);

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            // same Argon2 work as a real check, so the miss is not faster
            let password = password.to_string();
            self.with_authority(move |authority| Ok(authority.verify_absent(&password)))
                .await?;
            metrics::counter!("login_failures_total", "reason" => "unknown_email").increment(1);
            return Err(AccountError::InvalidCredentials);
        };

        let digest = user.credentials.password_digest.clone();
        let password = password.to_string();
        let valid = self
            .with_authority(move |authority| Ok(authority.verify(Some(&digest), &password)))
            .await?;

        if !valid {
            metrics::counter!("login_failures_total", "reason" => "wrong_password").increment(1);
            info!(user_id = user.id, "Rejected login: wrong password");
            return Err(AccountError::InvalidCredentials);
        }

        if !user.credentials.activated {
            metrics::counter!("login_failures_total", "reason" => "not_activated").increment(1);
            return Err(AccountError::NotActivated);
        }

        Ok(user.into())
    }

    async fn remember(&self, id: i32) -> Result<PlainToken, AccountError> {
        let user = self.load(id).await?;

        let mut credentials = user.credentials.clone();
        let (token, credentials) = self
            .with_authority(move |authority| {
                let token = authority.remember(&mut credentials)?;
                Ok((token, credentials))
            })
            .await?;

        let changes = UserChanges {
            remember_digest: Some(credentials.remember_digest),
            ..UserChanges::default()
        };
        self.write(&user, changes).await?;

        info!(user_id = id, "Started persistent session");
        Ok(token)
    }

    async fn authenticate_remembered(
        &self,
        id: i32,
        token: &str,
    ) -> Result<Option<Account>, AccountError> {
        let Some(user) = self.store.get_user(id).await? else {
            return Ok(None);
        };

        let credentials = user.credentials.clone();
        let token = token.to_string();
        let matched = self
            .with_authority(move |authority| {
                Ok(authority.authenticated(&credentials, TokenPurpose::Remember, &token))
            })
            .await?;

        Ok(matched.then(|| user.into()))
    }

    async fn forget(&self, id: i32) -> Result<(), AccountError> {
        let user = self.load(id).await?;

        if user.credentials.remember_digest.is_none() {
            return Ok(());
        }

        let mut credentials = user.credentials.clone();
        self.authority.forget(&mut credentials);

        let changes = UserChanges {
            remember_digest: Some(credentials.remember_digest),
            ..UserChanges::default()
        };
        self.write(&user, changes).await?;

        info!(user_id = id, "Ended persistent session");
        Ok(())
    }

    async fn activate(&self, email: &str, token: &str) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        let user = self
            .store
            .get_user_by_email(&email)
            .await?
            .ok_or(AccountError::InvalidActivation)?;

        self.activate_loaded(user, token).await
    }

    async fn get_account(&self, id: i32) -> Result<Account, AccountError> {
        Ok(self.load(id).await?.into())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError> {
        let email = normalize_email(email);
        Ok(self
            .store
            .get_user_by_email(&email)
            .await?
            .map(Account::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mail::OutboxMailer;

    async fn spawn_service() -> (SeaOrmAccountService, Arc<OutboxMailer>) {
        let db_path = std::env::temp_dir()
            .join(format!("latchkey-service-test-{}.db", uuid::Uuid::new_v4()));

        let mut config = Config::default();
        config.general.database_path = format!("sqlite:{}", db_path.display());
        config.security.min_cost = true;

        let outbox = Arc::new(OutboxMailer::new(config.mail.clone()));
        let service = crate::build_account_service(&config, outbox.clone())
            .await
            .unwrap();
        (service, outbox)
    }

    async fn register(
        service: &SeaOrmAccountService,
        outbox: &OutboxMailer,
        email: &str,
    ) -> (User, String) {
        let account = service
            .register(NewAccount {
                name: "Race User".to_string(),
                email: email.to_string(),
                password: "secret1".to_string(),
                password_confirmation: Some("secret1".to_string()),
            })
            .await
            .unwrap();

        let token = outbox
            .last_to(email)
            .await
            .unwrap()
            .token()
            .unwrap()
            .to_string();

        (service.load(account.id).await.unwrap(), token)
    }

    /// Another writer bumps the row version behind the snapshot.
    async fn rename_behind(service: &SeaOrmAccountService, snapshot: &User) {
        let outcome = service
            .store
            .update_user(
                snapshot.id,
                snapshot.lock_version,
                UserChanges {
                    name: Some("Other Writer".to_string()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);
    }

    #[tokio::test]
    async fn test_stale_write_is_conflict() {
        let (service, outbox) = spawn_service().await;
        let (stale, _) = register(&service, &outbox, "stale@example.com").await;

        rename_behind(&service, &stale).await;

        let result = service
            .write(
                &stale,
                UserChanges {
                    name: Some("Late Writer".to_string()),
                    ..UserChanges::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AccountError::Conflict)));

        let current = service.load(stale.id).await.unwrap();
        assert_eq!(current.name, "Other Writer");
        assert_eq!(current.lock_version, stale.lock_version + 1);
    }

    #[tokio::test]
    async fn test_activate_on_changed_row_is_conflict() {
        let (service, outbox) = spawn_service().await;
        let (stale, token) = register(&service, &outbox, "moved@example.com").await;

        rename_behind(&service, &stale).await;

        let result = service.activate_loaded(stale.clone(), &token).await;
        assert!(matches!(result, Err(AccountError::Conflict)));

        let current = service.load(stale.id).await.unwrap();
        assert!(!current.credentials.activated);
        assert!(current.credentials.activated_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_activation_is_already_activated() {
        let (service, outbox) = spawn_service().await;
        let (stale, token) = register(&service, &outbox, "twice@example.com").await;

        let first = service.activate("twice@example.com", &token).await.unwrap();
        assert!(first.activated);

        // the second request read the row before the first one committed
        let result = service.activate_loaded(stale.clone(), &token).await;
        assert!(matches!(result, Err(AccountError::AlreadyActivated)));

        let current = service.load(stale.id).await.unwrap();
        assert!(current.credentials.activated);
        assert_eq!(Account::from(current).activated_at, first.activated_at);
    }
}
