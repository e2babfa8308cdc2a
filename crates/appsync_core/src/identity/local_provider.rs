//! Local email/password identity provider.
//!
//! # Responsibility
//! - Create accounts and verify credentials against the `accounts` table.
//! - Hold the process session and notify listeners on transitions.
//!
//! # Invariants
//! - Passwords are stored only as argon2 PHC strings.
//! - Emails are matched case-insensitively after trimming.
//! - Listeners are called outside internal locks.

use crate::db::SharedConnection;
use crate::identity::{
    IdentityError, IdentityErrorCode, IdentityProvider, SessionHandle, SessionListener,
    SessionListenerId,
};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const MIN_PROVIDER_PASSWORD_CHARS: usize = 6;

/// Identity provider backed by the local SQLite database.
pub struct LocalIdentityProvider {
    conn: SharedConnection,
    hasher_params: Params,
    session: Mutex<Option<SessionHandle>>,
    listeners: Mutex<BTreeMap<SessionListenerId, SessionListener>>,
    next_listener_id: AtomicU64,
}

impl LocalIdentityProvider {
    /// Creates a provider using default argon2 cost parameters.
    pub fn new(conn: SharedConnection) -> Self {
        Self::with_params(conn, Params::default())
    }

    /// Creates a provider with explicit argon2 cost parameters.
    pub fn with_params(conn: SharedConnection, hasher_params: Params) -> Self {
        Self {
            conn,
            hasher_params,
            session: Mutex::new(None),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            self.hasher_params.clone(),
        )
    }

    fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let salt =
            SaltString::encode_b64(Uuid::new_v4().as_bytes()).map_err(IdentityError::internal)?;
        self.hasher()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(IdentityError::internal)
    }

    fn verify_password(&self, stored_hash: &str, password: &str) -> Result<bool, IdentityError> {
        let parsed = PasswordHash::new(stored_hash).map_err(IdentityError::internal)?;
        Ok(self
            .hasher()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, IdentityError> {
        self.conn
            .lock()
            .map_err(|_| IdentityError::internal("connection lock poisoned"))
    }

    fn transition(&self, next: Option<SessionHandle>) {
        match self.session.lock() {
            Ok(mut session) => *session = next.clone(),
            Err(_) => {
                warn!("event=session_transition module=identity status=error error=session_lock_poisoned");
                return;
            }
        }

        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect::<Vec<_>>(),
            Err(_) => {
                warn!("event=session_transition module=identity status=error error=listener_lock_poisoned");
                return;
            }
        };
        info!(
            "event=session_transition module=identity status=ok signed_in={} listeners={}",
            next.is_some(),
            listeners.len()
        );
        for listener in listeners {
            listener(next.clone());
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn create_account(&self, email: &str, password: &str) -> Result<SessionHandle, IdentityError> {
        let email = email.trim();
        if !EMAIL_RE.is_match(email) {
            return Err(IdentityError::new(
                IdentityErrorCode::InvalidEmail,
                "The email address is badly formatted.",
            ));
        }
        if password.chars().count() < MIN_PROVIDER_PASSWORD_CHARS {
            return Err(IdentityError::new(
                IdentityErrorCode::WeakPassword,
                "The password must be 6 characters long or more.",
            ));
        }

        let password_hash = self.hash_password(password)?;
        let user_id = Uuid::new_v4().simple().to_string();
        {
            let conn = self.lock_conn()?;
            let exists: i64 = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1);",
                    [email],
                    |row| row.get(0),
                )
                .map_err(IdentityError::internal)?;
            if exists == 1 {
                return Err(IdentityError::new(
                    IdentityErrorCode::EmailAlreadyInUse,
                    "The email address is already in use by another account.",
                ));
            }
            conn.execute(
                "INSERT INTO accounts (user_id, email, password_hash) VALUES (?1, ?2, ?3);",
                params![user_id.as_str(), email, password_hash.as_str()],
            )
            .map_err(IdentityError::internal)?;
        }

        info!("event=account_create module=identity status=ok");
        let session = SessionHandle {
            user_id,
            email: email.to_string(),
        };
        self.transition(Some(session.clone()));
        Ok(session)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<SessionHandle, IdentityError> {
        let email = email.trim();
        let account = {
            let conn = self.lock_conn()?;
            conn.query_row(
                "SELECT user_id, email, password_hash FROM accounts WHERE email = ?1;",
                [email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(IdentityError::internal)?
        };

        let Some((user_id, stored_email, password_hash)) = account else {
            return Err(IdentityError::new(
                IdentityErrorCode::UserNotFound,
                "There is no user record corresponding to this identifier.",
            ));
        };
        if !self.verify_password(&password_hash, password)? {
            return Err(IdentityError::new(
                IdentityErrorCode::WrongPassword,
                "The password is invalid or the user does not have a password.",
            ));
        }

        let session = SessionHandle {
            user_id,
            email: stored_email,
        };
        self.transition(Some(session.clone()));
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), IdentityError> {
        self.transition(None);
        Ok(())
    }

    fn current_session(&self) -> Option<SessionHandle> {
        self.session
            .lock()
            .map(|session| session.clone())
            .unwrap_or(None)
    }

    fn on_session_change(&self, listener: SessionListener) -> SessionListenerId {
        let id = SessionListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, listener.clone());
        }
        listener(self.current_session());
        id
    }

    fn remove_session_listener(&self, id: SessionListenerId) -> bool {
        self.listeners
            .lock()
            .map(|mut listeners| listeners.remove(&id).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::LocalIdentityProvider;
    use crate::db::open_db_in_memory;
    use crate::identity::{IdentityErrorCode, IdentityProvider, SessionHandle, SessionListener};
    use argon2::Params;
    use std::sync::{Arc, Mutex};

    fn provider() -> LocalIdentityProvider {
        let conn = Arc::new(Mutex::new(open_db_in_memory().unwrap()));
        LocalIdentityProvider::with_params(conn, Params::new(8, 1, 1, None).unwrap())
    }

    #[test]
    fn create_account_signs_in_and_notifies() {
        let provider = provider();
        let seen: Arc<Mutex<Vec<Option<SessionHandle>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: SessionListener = Arc::new(move |session| sink.lock().unwrap().push(session));
        provider.on_session_change(listener);

        let session = provider
            .create_account("a@example.com", "longenough1")
            .unwrap();
        assert_eq!(provider.current_session(), Some(session.clone()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_none());
        assert_eq!(seen[1], Some(session));
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let provider = provider();
        provider
            .create_account("a@example.com", "longenough1")
            .unwrap();
        let err = provider
            .create_account("A@Example.com", "longenough1")
            .unwrap_err();
        assert_eq!(err.code, IdentityErrorCode::EmailAlreadyInUse);
    }

    #[test]
    fn malformed_email_is_rejected() {
        let err = provider()
            .create_account("not-an-email", "longenough1")
            .unwrap_err();
        assert_eq!(err.code, IdentityErrorCode::InvalidEmail);
    }

    #[test]
    fn sign_in_checks_password_and_existence() {
        let provider = provider();
        let created = provider
            .create_account("a@example.com", "longenough1")
            .unwrap();
        provider.sign_out().unwrap();
        assert!(provider.current_session().is_none());

        let wrong = provider.sign_in("a@example.com", "nope-nope").unwrap_err();
        assert_eq!(wrong.code, IdentityErrorCode::WrongPassword);
        let missing = provider
            .sign_in("b@example.com", "longenough1")
            .unwrap_err();
        assert_eq!(missing.code, IdentityErrorCode::UserNotFound);
        assert!(provider.current_session().is_none());

        let session = provider.sign_in(" a@example.com ", "longenough1").unwrap();
        assert_eq!(session.user_id, created.user_id);
    }

    #[test]
    fn removed_listener_is_not_called_again() {
        let provider = provider();
        let calls = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&calls);
        let id = provider.on_session_change(Arc::new(move |_| *sink.lock().unwrap() += 1));
        assert!(provider.remove_session_listener(id));
        provider
            .create_account("a@example.com", "longenough1")
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
