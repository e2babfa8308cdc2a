//! Identity provider collaborator contracts.
//!
//! # Responsibility
//! - Define the account/session interface consumed by `SessionManager`.
//! - Provide a local provider storing argon2-hashed credentials in SQLite.
//!
//! # Invariants
//! - Registering a session listener fires it once with the cached session.
//! - Successful `create_account` / `sign_in` / `sign_out` transition the
//!   session and notify listeners before returning.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod local_provider;

pub use local_provider::LocalIdentityProvider;

/// Provider-issued proof of an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Stable user id used to scope user-owned collections.
    pub user_id: String,
    pub email: String,
}

/// Callback invoked with the new session on every transition.
pub type SessionListener = Arc<dyn Fn(Option<SessionHandle>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionListenerId(pub u64);

/// Stable failure classes reported by identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorCode {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    WrongPassword,
    UserNotFound,
    Internal,
}

impl IdentityErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailAlreadyInUse => "email_already_in_use",
            Self::InvalidEmail => "invalid_email",
            Self::WeakPassword => "weak_password",
            Self::WrongPassword => "wrong_password",
            Self::UserNotFound => "user_not_found",
            Self::Internal => "internal",
        }
    }
}

/// Provider rejection with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityError {
    pub code: IdentityErrorCode,
    pub message: String,
}

impl IdentityError {
    pub fn new(code: IdentityErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Display) -> Self {
        Self::new(IdentityErrorCode::Internal, message.to_string())
    }
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for IdentityError {}

/// External identity provider as seen by the session manager.
pub trait IdentityProvider: Send + Sync {
    fn create_account(&self, email: &str, password: &str) -> Result<SessionHandle, IdentityError>;
    fn sign_in(&self, email: &str, password: &str) -> Result<SessionHandle, IdentityError>;
    fn sign_out(&self) -> Result<(), IdentityError>;
    fn current_session(&self) -> Option<SessionHandle>;
    /// Registers a transition listener and fires it with the cached session.
    fn on_session_change(&self, listener: SessionListener) -> SessionListenerId;
    fn remove_session_listener(&self, id: SessionListenerId) -> bool;
}
