//! Authenticated-session state and identity provider mediation.
//!
//! # Responsibility
//! - Mirror the provider's session into local state and fan transitions out
//!   to subscribers.
//! - Run sign-up/log-in/log-out, recording failures in `last_error`.
//!
//! # Invariants
//! - A too-short sign-up password never reaches the provider.
//! - Provider failures never change the session.
//! - `last_error` is only cleared by `clear_error`.

use crate::identity::{
    IdentityError, IdentityProvider, SessionHandle, SessionListener, SessionListenerId,
};
use crate::model::validation::{validate_password, ValidationError};
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback receiving the session after every transition.
pub type SessionSubscriber = Arc<dyn Fn(Option<&SessionHandle>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    SignUp,
    LogIn,
    LogOut,
}

impl AuthOperation {
    fn label(self) -> &'static str {
        match self {
            Self::SignUp => "Sign up",
            Self::LogIn => "Log in",
            Self::LogOut => "Sign out",
        }
    }

    fn event(self) -> &'static str {
        match self {
            Self::SignUp => "sign_up",
            Self::LogIn => "log_in",
            Self::LogOut => "log_out",
        }
    }
}

/// Failure of a session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Rejected locally before contacting the provider.
    Validation(ValidationError),
    /// Rejected by the provider.
    Auth {
        operation: AuthOperation,
        source: IdentityError,
    },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Auth { operation, source } => {
                write!(f, "{} error: {}", operation.label(), source)
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Auth { source, .. } => Some(source),
        }
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<SessionHandle>,
    last_error: Option<String>,
}

type Subscribers = Mutex<BTreeMap<SubscriberId, SessionSubscriber>>;

/// Session facade over one identity provider.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<Mutex<SessionState>>,
    subscribers: Arc<Subscribers>,
    next_subscriber_id: AtomicU64,
    provider_listener: SessionListenerId,
    min_password_chars: usize,
}

impl SessionManager {
    /// Subscribes to `provider`; its cached session is mirrored immediately.
    pub fn new(provider: Arc<dyn IdentityProvider>, min_password_chars: usize) -> Self {
        let state = Arc::new(Mutex::new(SessionState::default()));
        let subscribers: Arc<Subscribers> = Arc::new(Mutex::new(BTreeMap::new()));

        let listener: SessionListener = {
            let state = Arc::clone(&state);
            let subscribers = Arc::clone(&subscribers);
            Arc::new(move |session: Option<SessionHandle>| {
                lock(&state).current = session.clone();
                let targets = lock(&subscribers).values().cloned().collect::<Vec<_>>();
                for subscriber in targets {
                    subscriber(session.as_ref());
                }
            })
        };
        let provider_listener = provider.on_session_change(listener);

        Self {
            provider,
            state,
            subscribers,
            next_subscriber_id: AtomicU64::new(1),
            provider_listener,
            min_password_chars,
        }
    }

    /// Registers a transition callback and fires it with the current session.
    pub fn subscribe(&self, subscriber: SessionSubscriber) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).insert(id, Arc::clone(&subscriber));
        let current = self.current_session();
        subscriber(current.as_ref());
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        lock(&self.subscribers).remove(&id).is_some()
    }

    /// Creates an account; the session changes through the provider callback.
    ///
    /// # Errors
    /// - `Validation` when the password is shorter than the configured
    ///   minimum; the provider is not contacted.
    /// - `Auth` when the provider rejects the request.
    ///
    /// Every error is also recorded in `last_error`.
    pub fn sign_up(&self, username: &str, email: &str, password: &str) -> Result<(), SessionError> {
        if let Err(err) = validate_password(password, self.min_password_chars) {
            warn!("event=sign_up module=session status=rejected reason=password_too_short");
            return Err(self.record(SessionError::Validation(err)));
        }

        info!(
            "event=sign_up module=session status=start username_chars={}",
            username.trim().chars().count()
        );
        self.run(AuthOperation::SignUp, || {
            self.provider.create_account(email, password).map(|_| ())
        })
    }

    pub fn log_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.run(AuthOperation::LogIn, || {
            self.provider.sign_in(email, password).map(|_| ())
        })
    }

    /// Signs out; failures are reported only and keep the session.
    pub fn log_out(&self) -> Result<(), SessionError> {
        self.run(AuthOperation::LogOut, || self.provider.sign_out())
    }

    pub fn current_session(&self) -> Option<SessionHandle> {
        lock(&self.state).current.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        lock(&self.state).current.is_some()
    }

    /// Human-readable message of the most recent failure.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    /// Clears `last_error`; callers do this before starting a new attempt.
    pub fn clear_error(&self) {
        lock(&self.state).last_error = None;
    }

    fn run(
        &self,
        operation: AuthOperation,
        call: impl FnOnce() -> Result<(), IdentityError>,
    ) -> Result<(), SessionError> {
        match call() {
            Ok(()) => {
                info!("event={} module=session status=ok", operation.event());
                Ok(())
            }
            Err(source) => {
                warn!(
                    "event={} module=session status=error error_code={}",
                    operation.event(),
                    source.code.as_str()
                );
                Err(self.record(SessionError::Auth { operation, source }))
            }
        }
    }

    fn record(&self, err: SessionError) -> SessionError {
        lock(&self.state).last_error = Some(err.to_string());
        err
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.provider.remove_session_listener(self.provider_listener);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
