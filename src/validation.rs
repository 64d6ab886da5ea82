//! Field validations for account data.
//!
//! Each rule is a pure function returning the field errors it found; callers
//! collect them before touching the store.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub const EMAIL_MAX_LENGTH: usize = 40;
pub const PASSWORD_MIN_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn blank(field: &'static str) -> Self {
        Self::new(field, "can't be blank")
    }

    #[must_use]
    pub fn taken(field: &'static str) -> Self {
        Self::new(field, "has already been taken")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = self.field.chars();
        if let Some(first) = chars.next() {
            write!(f, "{}{}", first.to_ascii_uppercase(), chars.as_str().replace('_', " "))?;
        }
        write!(f, " {}", self.message)
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\A[A-Za-z0-9_+\-.]+@[a-z0-9\-.]+\.[a-z]+\z").expect("Invalid regex")
    })
}

/// Lower-case an email address so lookups and uniqueness ignore case.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

#[must_use]
pub fn validate_name(name: &str) -> Vec<FieldError> {
    if name.trim().is_empty() {
        return vec![FieldError::blank("name")];
    }
    Vec::new()
}

#[must_use]
pub fn validate_email(email: &str) -> Vec<FieldError> {
    if email.trim().is_empty() {
        return vec![FieldError::blank("email")];
    }

    let mut errors = Vec::new();

    if email.chars().count() > EMAIL_MAX_LENGTH {
        errors.push(FieldError::new(
            "email",
            format!("is too long (maximum is {EMAIL_MAX_LENGTH} characters)"),
        ));
    }

    if !email_regex().is_match(email) {
        errors.push(FieldError::new("email", "is invalid"));
    }

    errors
}

/// `None` means "unchanged" and passes; a supplied password must be
/// non-blank and long enough.
#[must_use]
pub fn validate_password(password: Option<&str>) -> Vec<FieldError> {
    let Some(password) = password else {
        return Vec::new();
    };

    if password.trim().is_empty() {
        return vec![FieldError::blank("password")];
    }

    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return vec![FieldError::new(
            "password",
            format!("is too short (minimum is {PASSWORD_MIN_LENGTH} characters)"),
        )];
    }

    Vec::new()
}

#[must_use]
pub fn validate_password_confirmation(password: &str, confirmation: Option<&str>) -> Vec<FieldError> {
    match confirmation {
        Some(confirmation) if confirmation != password => vec![FieldError::new(
            "password_confirmation",
            "doesn't match Password",
        )],
        _ => Vec::new(),
    }
}
