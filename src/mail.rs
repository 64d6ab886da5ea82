//! Activation mail dispatch.
//!
//! Delivery is fire-and-forget for callers: a failed send is logged by the
//! account service and never undoes the registration.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{DeliveryMethod, MailConfig};
use crate::credentials::PlainToken;

pub const ACTIVATION_SUBJECT: &str = "Account activation";

/// Who an email is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i32,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationEmail {
    pub from: String,
    pub to: String,
    pub name: String,
    pub subject: String,
    pub link: String,
}

impl ActivationEmail {
    #[must_use]
    pub fn compose(config: &MailConfig, user: &UserIdentity, token: &PlainToken) -> Self {
        Self {
            from: config.from.clone(),
            to: user.email.clone(),
            name: user.name.clone(),
            subject: ACTIVATION_SUBJECT.to_string(),
            link: activation_link(&config.base_url, token, &user.email),
        }
    }

    /// Token embedded in the link.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        let (_, rest) = self.link.split_once("/account_activations/")?;
        let (token, _) = rest.split_once("/edit")?;
        Some(token)
    }
}

#[must_use]
pub fn activation_link(base_url: &str, token: &PlainToken, email: &str) -> String {
    format!(
        "{}/account_activations/{}/edit?email={}",
        base_url.trim_end_matches('/'),
        token.as_str(),
        urlencoding::encode(email)
    )
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation_email(
        &self,
        user: &UserIdentity,
        token: &PlainToken,
    ) -> anyhow::Result<()>;
}

/// Writes activation emails to stdout.
pub struct ConsoleMailer {
    config: MailConfig,
}

impl ConsoleMailer {
    #[must_use]
    pub const fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send_activation_email(
        &self,
        user: &UserIdentity,
        token: &PlainToken,
    ) -> anyhow::Result<()> {
        let email = ActivationEmail::compose(&self.config, user, token);

        println!("From: {}", email.from);
        println!("To: {} <{}>", email.name, email.to);
        println!("Subject: {}", email.subject);
        println!();
        println!("Activate your account: {}", email.link);

        Ok(())
    }
}

/// Records that a message went out without the link (it carries the token).
pub struct LogMailer {
    config: MailConfig,
}

impl LogMailer {
    #[must_use]
    pub const fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_activation_email(
        &self,
        user: &UserIdentity,
        token: &PlainToken,
    ) -> anyhow::Result<()> {
        let email = ActivationEmail::compose(&self.config, user, token);
        info!(
            user_id = user.id,
            to = %email.to,
            subject = %email.subject,
            "Activation email dispatched"
        );
        Ok(())
    }
}

/// Keeps sent emails in memory.
pub struct OutboxMailer {
    config: MailConfig,
    sent: Mutex<Vec<ActivationEmail>>,
}

impl OutboxMailer {
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent(&self) -> Vec<ActivationEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn last_to(&self, email: &str) -> Option<ActivationEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == email)
            .cloned()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_activation_email(
        &self,
        user: &UserIdentity,
        token: &PlainToken,
    ) -> anyhow::Result<()> {
        let email = ActivationEmail::compose(&self.config, user, token);
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[must_use]
pub fn mailer_from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.delivery {
        DeliveryMethod::Console => Arc::new(ConsoleMailer::new(config.clone())),
        DeliveryMethod::Log => Arc::new(LogMailer::new(config.clone())),
    }
}
