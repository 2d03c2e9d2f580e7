//! Identity provider contract driving the session lifecycle.
//!
//! # Invariants
//! - `sign_up` reports whether email confirmation is required before a session.
//! - `current_session` is the only way to observe out-of-band confirmation.

use crate::model::session::{Credentials, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

pub type AuthResult<T> = Result<T, AuthError>;

/// Credential or identity-provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    /// Account exists but its email has not been confirmed yet.
    EmailNotConfirmed,
    AlreadyRegistered,
    Unavailable(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid email or password"),
            Self::EmailNotConfirmed => write!(f, "email address has not been confirmed"),
            Self::AlreadyRegistered => write!(f, "an account with this email already exists"),
            Self::Unavailable(message) => write!(f, "identity provider unavailable: {message}"),
        }
    }
}

impl Error for AuthError {}

/// Result of a successful sign-up submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account is usable immediately; a session exists.
    Confirmed(UserId),
    /// Provider sent a confirmation email; no session yet.
    ConfirmationRequired,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<SignUpOutcome>;
    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<UserId>;
    /// Returns the identity of the currently valid session, if any.
    async fn current_session(&self) -> AuthResult<Option<UserId>>;
    async fn sign_out(&self) -> AuthResult<()>;
}

struct Account {
    user_id: UserId,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<String, Account>,
    current: Option<UserId>,
}

/// In-process identity provider with optional email confirmation.
pub struct InMemoryIdentityProvider {
    require_confirmation: bool,
    state: Mutex<IdentityState>,
}

impl InMemoryIdentityProvider {
    pub fn new(require_confirmation: bool) -> Self {
        Self {
            require_confirmation,
            state: Mutex::new(IdentityState::default()),
        }
    }

    /// Simulates the user following the confirmation link.
    ///
    /// The link lands in the app with a fresh session, so the confirmed user
    /// becomes the current session. Returns `false` for unknown emails.
    pub fn confirm_email(&self, email: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(account) = state.accounts.get_mut(&normalize_email(email)) else {
            return false;
        };
        account.confirmed = true;
        let user_id = account.user_id.clone();
        state.current = Some(user_id);
        true
    }

    /// Registers a confirmed account without a session.
    pub fn seed_account(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId::new(Uuid::new_v4().to_string());
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.accounts.insert(
            normalize_email(email),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
                confirmed: true,
            },
        );
        user_id
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<SignUpOutcome> {
        let email = normalize_email(&credentials.email);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.accounts.contains_key(&email) {
            return Err(AuthError::AlreadyRegistered);
        }

        let user_id = UserId::new(Uuid::new_v4().to_string());
        let confirmed = !self.require_confirmation;
        state.accounts.insert(
            email,
            Account {
                user_id: user_id.clone(),
                password: credentials.password.clone(),
                confirmed,
            },
        );

        if confirmed {
            state.current = Some(user_id.clone());
            Ok(SignUpOutcome::Confirmed(user_id))
        } else {
            Ok(SignUpOutcome::ConfirmationRequired)
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<UserId> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let account = state
            .accounts
            .get(&normalize_email(&credentials.email))
            .filter(|account| account.password == credentials.password)
            .ok_or(AuthError::InvalidCredentials)?;
        if !account.confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }
        let user_id = account.user_id.clone();
        state.current = Some(user_id.clone());
        Ok(user_id)
    }

    async fn current_session(&self) -> AuthResult<Option<UserId>> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current = None;
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
