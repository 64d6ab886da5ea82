//! Integration tests for the account lifecycle: registration, activation,
//! login, persistent sessions and profile edits.

use std::sync::Arc;

use latchkey::config::Config;
use latchkey::credentials::{CredentialAuthority, PlainToken};
use latchkey::mail::{Mailer, OutboxMailer, UserIdentity};
use latchkey::services::{
    AccountError, AccountService, AccountUpdate, NewAccount, SeaOrmAccountService,
};

async fn spawn_accounts() -> (SeaOrmAccountService, Arc<OutboxMailer>, Config) {
    let db_path =
        std::env::temp_dir().join(format!("latchkey-account-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.security.min_cost = true;

    let outbox = Arc::new(OutboxMailer::new(config.mail.clone()));
    let accounts = latchkey::build_account_service(&config, outbox.clone())
        .await
        .expect("Failed to build account service");

    (accounts, outbox, config)
}

struct UnreachableMailer;

#[async_trait::async_trait]
impl Mailer for UnreachableMailer {
    async fn send_activation_email(
        &self,
        _user: &UserIdentity,
        _token: &PlainToken,
    ) -> anyhow::Result<()> {
        anyhow::bail!("smtp relay unreachable")
    }
}

fn new_account(email: &str, password: &str) -> NewAccount {
    NewAccount {
        name: "Example User".to_string(),
        email: email.to_string(),
        password: password.to_string(),
        password_confirmation: Some(password.to_string()),
    }
}

async fn activation_token(outbox: &OutboxMailer, email: &str) -> String {
    outbox
        .last_to(email)
        .await
        .expect("no activation email sent")
        .token()
        .expect("activation link without token")
        .to_string()
}

fn field_errors(err: AccountError) -> Vec<(String, String)> {
    match err {
        AccountError::ValidationFailed(errors) => errors
            .into_iter()
            .map(|e| (e.field.to_string(), e.message))
            .collect(),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let (accounts, outbox, config) = spawn_accounts().await;

    let account = accounts
        .register(new_account("user@example.com", "secret1"))
        .await
        .unwrap();
    assert!(!account.activated);
    assert!(account.activated_at.is_none());

    let stored = accounts
        .store()
        .get_user(account.id)
        .await
        .unwrap()
        .unwrap();
    let authority = CredentialAuthority::new(&config.security).unwrap();
    assert!(authority.verify(Some(&stored.credentials.password_digest), "secret1"));
    assert!(!authority.verify(Some(&stored.credentials.password_digest), "secret2"));

    // password is right, but the account is not activated yet
    assert!(matches!(
        accounts.log_in("user@example.com", "secret1").await,
        Err(AccountError::NotActivated)
    ));

    let token = activation_token(&outbox, "user@example.com").await;
    let activated = accounts.activate("user@example.com", &token).await.unwrap();
    assert!(activated.activated);

    let logged_in = accounts.log_in("user@example.com", "secret1").await.unwrap();
    assert_eq!(logged_in.id, account.id);
    assert!(matches!(
        accounts.log_in("user@example.com", "secret2").await,
        Err(AccountError::InvalidCredentials)
    ));

    let remember_token = accounts.remember(account.id).await.unwrap();
    let remembered = accounts
        .authenticate_remembered(account.id, remember_token.as_str())
        .await
        .unwrap();
    assert_eq!(remembered.map(|a| a.id), Some(account.id));

    accounts.forget(account.id).await.unwrap();
    assert!(
        accounts
            .authenticate_remembered(account.id, remember_token.as_str())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_plaintext_tokens_are_not_persisted() {
    let (accounts, outbox, _) = spawn_accounts().await;

    let account = accounts
        .register(new_account("digest@example.com", "secret1"))
        .await
        .unwrap();
    let activation = activation_token(&outbox, "digest@example.com").await;
    let remember = accounts.remember(account.id).await.unwrap();

    let stored = accounts
        .store()
        .get_user(account.id)
        .await
        .unwrap()
        .unwrap();
    let credentials = stored.credentials;

    assert_ne!(credentials.activation_digest, activation);
    assert!(!credentials.activation_digest.contains(&activation));
    let remember_digest = credentials.remember_digest.unwrap();
    assert!(!remember_digest.contains(remember.as_str()));
    assert!(!credentials.password_digest.contains("secret1"));
}

#[tokio::test]
async fn test_email_is_normalized() {
    let (accounts, outbox, _) = spawn_accounts().await;

    let account = accounts
        .register(new_account("Foo@Bar.COM", "secret1"))
        .await
        .unwrap();
    assert_eq!(account.email, "foo@bar.com");

    let found = accounts.find_by_email("foo@bar.com").await.unwrap().unwrap();
    assert_eq!(found.id, account.id);
    let found = accounts.find_by_email("FOO@bar.com").await.unwrap().unwrap();
    assert_eq!(found.id, account.id);

    // the activation email goes to the normalized address
    let token = activation_token(&outbox, "foo@bar.com").await;
    accounts.activate("Foo@Bar.com", &token).await.unwrap();

    let logged_in = accounts.log_in("FOO@BAR.COM", "secret1").await.unwrap();
    assert_eq!(logged_in.id, account.id);
}

#[tokio::test]
async fn test_duplicate_email_ignores_case() {
    let (accounts, _, _) = spawn_accounts().await;

    accounts
        .register(new_account("taken@example.com", "secret1"))
        .await
        .unwrap();

    let err = accounts
        .register(new_account("TAKEN@example.com", "secret1"))
        .await
        .unwrap_err();

    assert_eq!(
        field_errors(err),
        vec![("email".to_string(), "has already been taken".to_string())]
    );
}

#[tokio::test]
async fn test_registration_collects_field_errors() {
    let (accounts, outbox, _) = spawn_accounts().await;

    let err = accounts
        .register(NewAccount {
            name: "  ".to_string(),
            email: "user_at_example.org".to_string(),
            password: "short".to_string(),
            password_confirmation: Some("different".to_string()),
        })
        .await
        .unwrap_err();

    let fields: Vec<String> = field_errors(err).into_iter().map(|(f, _)| f).collect();
    assert_eq!(
        fields,
        vec!["name", "email", "password", "password_confirmation"]
    );
    assert!(outbox.sent().await.is_empty());
}

#[tokio::test]
async fn test_activation_happens_once() {
    let (accounts, outbox, _) = spawn_accounts().await;

    accounts
        .register(new_account("once@example.com", "secret1"))
        .await
        .unwrap();
    let token = activation_token(&outbox, "once@example.com").await;

    let first = accounts.activate("once@example.com", &token).await.unwrap();
    let activated_at = first.activated_at.clone();
    assert!(activated_at.is_some());

    assert!(matches!(
        accounts.activate("once@example.com", &token).await,
        Err(AccountError::AlreadyActivated)
    ));

    let current = accounts
        .find_by_email("once@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(current.activated);
    assert_eq!(current.activated_at, activated_at);
}

#[tokio::test]
async fn test_invalid_activation_links() {
    let (accounts, _, _) = spawn_accounts().await;

    accounts
        .register(new_account("pending@example.com", "secret1"))
        .await
        .unwrap();

    assert!(matches!(
        accounts.activate("pending@example.com", "wrong-token").await,
        Err(AccountError::InvalidActivation)
    ));
    assert!(matches!(
        accounts.activate("nobody@example.com", "wrong-token").await,
        Err(AccountError::InvalidActivation)
    ));

    let account = accounts
        .find_by_email("pending@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(!account.activated);
}

#[tokio::test]
async fn test_remember_rotates_token() {
    let (accounts, _, _) = spawn_accounts().await;

    let account = accounts
        .register(new_account("rotate@example.com", "secret1"))
        .await
        .unwrap();

    let first = accounts.remember(account.id).await.unwrap();
    let second = accounts.remember(account.id).await.unwrap();
    assert_ne!(first, second);

    assert!(
        accounts
            .authenticate_remembered(account.id, first.as_str())
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        accounts
            .authenticate_remembered(account.id, second.as_str())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_forget_is_idempotent() {
    let (accounts, _, _) = spawn_accounts().await;

    let account = accounts
        .register(new_account("forget@example.com", "secret1"))
        .await
        .unwrap();

    accounts.forget(account.id).await.unwrap();
    accounts.forget(account.id).await.unwrap();

    assert!(
        accounts
            .authenticate_remembered(account.id, "any-token")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_account() {
    let (accounts, _, _) = spawn_accounts().await;

    assert!(matches!(
        accounts.get_account(4242).await,
        Err(AccountError::NotFound)
    ));
    assert!(matches!(
        accounts.remember(4242).await,
        Err(AccountError::NotFound)
    ));
    assert!(
        accounts
            .authenticate_remembered(4242, "token")
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        accounts.log_in("ghost@example.com", "secret1").await,
        Err(AccountError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_update_account() {
    let (accounts, outbox, _) = spawn_accounts().await;

    let account = accounts
        .register(new_account("edit@example.com", "secret1"))
        .await
        .unwrap();
    accounts
        .register(new_account("other@example.com", "secret1"))
        .await
        .unwrap();
    let token = activation_token(&outbox, "edit@example.com").await;
    accounts.activate("edit@example.com", &token).await.unwrap();

    // name only, password unchanged
    let renamed = accounts
        .update_account(
            account.id,
            AccountUpdate {
                name: Some("Renamed User".to_string()),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Renamed User");
    accounts.log_in("edit@example.com", "secret1").await.unwrap();

    // new email (normalized) and password
    let moved = accounts
        .update_account(
            account.id,
            AccountUpdate {
                email: Some("Moved@Example.com".to_string()),
                password: Some("secret9".to_string()),
                password_confirmation: Some("secret9".to_string()),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.email, "moved@example.com");
    assert!(matches!(
        accounts.log_in("moved@example.com", "secret1").await,
        Err(AccountError::InvalidCredentials)
    ));
    accounts.log_in("moved@example.com", "secret9").await.unwrap();

    // someone else's address
    let err = accounts
        .update_account(
            account.id,
            AccountUpdate {
                email: Some("OTHER@example.com".to_string()),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        field_errors(err),
        vec![("email".to_string(), "has already been taken".to_string())]
    );

    // too short a password
    let err = accounts
        .update_account(
            account.id,
            AccountUpdate {
                password: Some("abc".to_string()),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(field_errors(err)[0].0, "password");
}

#[tokio::test]
async fn test_registration_survives_mail_failure() {
    let db_path =
        std::env::temp_dir().join(format!("latchkey-account-test-{}.db", uuid::Uuid::new_v4()));
    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.security.min_cost = true;

    let accounts = latchkey::build_account_service(&config, Arc::new(UnreachableMailer))
        .await
        .unwrap();

    let account = accounts
        .register(new_account("offline@example.com", "secret1"))
        .await
        .unwrap();
    assert!(!account.activated);

    let stored = accounts
        .store()
        .get_user(account.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.email, "offline@example.com");
    assert!(!stored.credentials.activated);
    assert!(stored.credentials.activated_at.is_none());
    assert!(matches!(
        accounts.log_in("offline@example.com", "secret1").await,
        Err(AccountError::NotActivated)
    ));
}
