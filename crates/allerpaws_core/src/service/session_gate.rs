//! Identity lifecycle state machine and sole reconciliation trigger.
//!
//! # Responsibility
//! - Own the `Session` value and publish every change to observers.
//! - Drive sign-up, sign-in, confirmation detection and sign-out.
//! - Request exactly one reconciliation per entry into `Authenticated`.
//! - Run that reconciliation on a detached task so dropping the caller's
//!   future never cancels a create mid-flight.
//!
//! # Invariants
//! - Only this type writes the session; others receive copies.
//! - Credential failures move to `Error` without touching the draft store.
//! - Observer-initiated reconciliation goes through the shared `Reconciler`,
//!   so duplicate requests collapse onto its in-flight guard.

use crate::model::session::{Credentials, Session, SessionState, UserId};
use crate::model::validation::ValidationError;
use crate::remote::identity::{AuthError, IdentityProvider, SignUpOutcome};
use crate::service::reconciler::{ReconcileError, ReconcileResult, Reconciler};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Rejected locally; no provider call was made and state is unchanged.
    Validation(ValidationError),
    Auth(AuthError),
}

impl Display for GateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Auth(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Auth(err) => Some(err),
        }
    }
}

impl From<ValidationError> for GateError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<AuthError> for GateError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

/// Session after an operation, plus the reconciliation it triggered.
#[derive(Debug)]
pub struct Transition {
    pub session: Session,
    /// `Some` only when the operation entered `Authenticated`.
    pub reconcile: Option<ReconcileResult>,
}

impl Transition {
    fn unchanged(session: Session) -> Self {
        Self {
            session,
            reconcile: None,
        }
    }
}

pub struct SessionGate {
    identity: Arc<dyn IdentityProvider>,
    reconciler: Arc<Reconciler>,
    session: watch::Sender<Session>,
}

impl SessionGate {
    /// Creates a gate in the `Anonymous` state.
    pub fn new(identity: Arc<dyn IdentityProvider>, reconciler: Arc<Reconciler>) -> Self {
        let (session, _) = watch::channel(Session::anonymous());
        Self {
            identity,
            reconciler,
            session,
        }
    }

    /// Current session value.
    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Observes every session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Submits sign-up credentials.
    ///
    /// - Provider requires confirmation => `PendingVerification`.
    /// - Provider confirms immediately => `Authenticated` + reconciliation.
    pub async fn sign_up(&self, credentials: &Credentials) -> GateResult<Transition> {
        credentials.validate_sign_up()?;

        match self.identity.sign_up(credentials).await {
            Ok(SignUpOutcome::ConfirmationRequired) => {
                let session = Session::pending_verification(credentials.email.trim());
                self.publish(session.clone());
                Ok(Transition::unchanged(session))
            }
            Ok(SignUpOutcome::Confirmed(user_id)) => Ok(self.enter_authenticated(user_id).await),
            Err(err) => Err(self.fail("sign_up", err)),
        }
    }

    /// Signs in with existing credentials.
    pub async fn sign_in(&self, credentials: &Credentials) -> GateResult<Transition> {
        credentials.validate_sign_in()?;

        match self.identity.sign_in(credentials).await {
            Ok(user_id) => Ok(self.enter_authenticated(user_id).await),
            Err(err) => Err(self.fail("sign_in", err)),
        }
    }

    /// Checks the provider for a valid session, e.g. after the user returns
    /// from the confirmation link or on app start.
    pub async fn detect_session(&self) -> GateResult<Transition> {
        let current = match self.identity.current_session().await {
            Ok(current) => current,
            Err(err) => {
                warn!(
                    "event=session_detect module=session_gate status=error error={err}"
                );
                return Err(err.into());
            }
        };

        let was_authenticated = self.session.borrow().is_authenticated();
        match current {
            Some(user_id) => Ok(self.enter_authenticated(user_id).await),
            None if was_authenticated => {
                self.publish(Session::anonymous());
                Ok(Transition::unchanged(self.session()))
            }
            None => Ok(Transition::unchanged(self.session())),
        }
    }

    /// Ends the session; the stored draft, if any, stays in place.
    pub async fn sign_out(&self) -> GateResult<Session> {
        self.identity.sign_out().await?;
        self.publish(Session::anonymous());
        Ok(self.session())
    }

    /// Leaves the `Error` state so the user can retry.
    pub fn reset(&self) -> Session {
        let state = self.session.borrow().state();
        if state == SessionState::Error {
            self.publish(Session::anonymous());
        }
        self.session()
    }

    /// Asks the shared reconciler to flush for the current session.
    ///
    /// Used by observers and opportunistic retry points (app foreground,
    /// protected navigation, explicit retry).
    pub async fn request_reconcile(&self) -> ReconcileResult {
        let session = self.session();
        self.reconciler.flush(&session).await
    }

    async fn enter_authenticated(&self, user_id: UserId) -> Transition {
        let already = {
            let current = self.session.borrow();
            current.is_authenticated() && current.user_id() == Some(&user_id)
        };
        if already {
            return Transition::unchanged(self.session());
        }

        let session = Session::authenticated(user_id);
        self.publish(session.clone());
        let reconcile = self
            .reconciler
            .spawn_flush(session.clone())
            .await
            .unwrap_or_else(|err| {
                warn!("event=reconcile module=session_gate status=error error={err}");
                Err(ReconcileError::TaskFailed(err.to_string()))
            });
        Transition {
            session,
            reconcile: Some(reconcile),
        }
    }

    fn fail(&self, operation: &'static str, err: AuthError) -> GateError {
        warn!(
            "event=auth module=session_gate status=error operation={operation} error={err}"
        );
        let state = self.session.borrow().state();
        match &err {
            AuthError::Unavailable(_) => {}
            AuthError::EmailNotConfirmed => {
                if state != SessionState::PendingVerification {
                    self.publish(Session::error(err.to_string()));
                }
            }
            AuthError::InvalidCredentials | AuthError::AlreadyRegistered => {
                self.publish(Session::error(err.to_string()));
            }
        }
        GateError::Auth(err)
    }

    fn publish(&self, next: Session) {
        let previous = self.session.send_replace(next);
        let current = self.session.borrow();
        if previous.state() != current.state() {
            info!(
                "event=session_transition module=session_gate status=ok from={} to={}",
                previous.state().as_str(),
                current.state().as_str()
            );
        }
    }
}
