//! Identity lifecycle model.
//!
//! # Responsibility
//! - Define the `Session` value owned by `SessionGate` and passed to consumers.
//! - Validate credentials locally before any identity-provider call.
//!
//! # Invariants
//! - `identity` is `Some` iff `state == SessionState::Authenticated`.
//! - Passwords never appear in `Debug` output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

use super::validation::ValidationError;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const MIN_PASSWORD_CHARS: usize = 6;

/// Backend-assigned identity of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Identity lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Anonymous,
    /// Sign-up submitted; waiting for the user to confirm their email.
    PendingVerification,
    Authenticated,
    /// Last credential attempt failed irrecoverably.
    Error,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::PendingVerification => "pending_verification",
            Self::Authenticated => "authenticated",
            Self::Error => "error",
        }
    }
}

/// Snapshot of the identity lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    identity: Option<UserId>,
    pending_email: Option<String>,
    last_error: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            identity: None,
            pending_email: None,
            last_error: None,
        }
    }

    pub fn pending_verification(email: impl Into<String>) -> Self {
        Self {
            state: SessionState::PendingVerification,
            identity: None,
            pending_email: Some(email.into()),
            last_error: None,
        }
    }

    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            state: SessionState::Authenticated,
            identity: Some(user_id),
            pending_email: None,
            last_error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: SessionState::Error,
            identity: None,
            pending_email: None,
            last_error: Some(message.into()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Returns the owning identity when authenticated.
    pub fn user_id(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    /// Email awaiting confirmation while in `PendingVerification`.
    pub fn pending_email(&self) -> Option<&str> {
        self.pending_email.as_deref()
    }

    /// Message of the auth failure that moved the session to `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Sign-in or sign-up credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Required for sign-up only.
    pub full_name: Option<String>,
}

impl Credentials {
    pub fn sign_in(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name: None,
        }
    }

    pub fn sign_up(
        email: impl Into<String>,
        password: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name: Some(full_name.into()),
        }
    }

    /// Validates fields required by sign-in.
    pub fn validate_sign_in(&self) -> Result<(), ValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingField("email"));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(ValidationError::InvalidField {
                field: "email",
                reason: "must look like name@example.com",
            });
        }
        if self.password.trim().is_empty() {
            return Err(ValidationError::MissingField("password"));
        }
        Ok(())
    }

    /// Validates fields required by sign-up, including password length.
    pub fn validate_sign_up(&self) -> Result<(), ValidationError> {
        let full_name = self.full_name.as_deref().map(str::trim).unwrap_or("");
        if full_name.is_empty() {
            return Err(ValidationError::MissingField("full_name"));
        }
        self.validate_sign_in()?;
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ValidationError::InvalidField {
                field: "password",
                reason: "must be at least 6 characters",
            });
        }
        Ok(())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Credentials, Session, SessionState, UserId};
    use crate::model::validation::ValidationError;

    #[test]
    fn identity_only_present_when_authenticated() {
        assert!(Session::anonymous().user_id().is_none());
        assert!(Session::pending_verification("a@b.co").user_id().is_none());
        assert!(Session::error("bad").user_id().is_none());

        let session = Session::authenticated(UserId::new("u-1"));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.user_id().map(UserId::as_str), Some("u-1"));
    }

    #[test]
    fn sign_up_requires_name_and_six_char_password() {
        let missing_name = Credentials::sign_up("a@b.co", "secret1", " ");
        assert_eq!(
            missing_name.validate_sign_up(),
            Err(ValidationError::MissingField("full_name"))
        );

        let short = Credentials::sign_up("a@b.co", "12345", "Ann");
        assert!(matches!(
            short.validate_sign_up(),
            Err(ValidationError::InvalidField { field: "password", .. })
        ));

        Credentials::sign_up("a@b.co", "123456", "Ann")
            .validate_sign_up()
            .expect("valid sign-up credentials");
    }

    #[test]
    fn malformed_email_is_rejected() {
        let creds = Credentials::sign_in("not-an-email", "pw");
        assert!(matches!(
            creds.validate_sign_in(),
            Err(ValidationError::InvalidField { field: "email", .. })
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = Credentials::sign_in("a@b.co", "hunter22");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter22"));
    }
}
