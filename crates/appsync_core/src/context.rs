//! Process-wide application context.
//!
//! # Responsibility
//! - Build the local backend, identity provider and both services once, and
//!   hand shared references to every consumer.
//! - Gate user-scoped subscriptions on the current session.
//! - Release user-scoped subscriptions whenever the signed-in user changes.
//!
//! # Invariants
//! - One context per process lifetime; consumers never build their own
//!   services.
//! - `shutdown` (also run on drop) leaves no subscription open.
//! - Folder and folder-note lists never outlive the session that opened them.

use crate::config::{AppConfig, DatabaseLocation};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::identity::{IdentityProvider, LocalIdentityProvider};
use crate::identity::SessionHandle;
use crate::service::session_manager::{SessionError, SessionManager};
use crate::service::sync_service::{
    DocumentSyncService, ListSlot, SubscriptionHandle, SubscriptionTarget, SyncError,
};
use crate::store::{DocumentStore, SqliteDocumentStore};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
pub enum ContextError {
    Db(DbError),
    Config(String),
    /// A user-scoped operation was requested while logged out.
    NotSignedIn,
    Session(SessionError),
    Sync(SyncError),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(message) => write!(f, "invalid configuration: {message}"),
            Self::NotSignedIn => write!(f, "no signed-in user"),
            Self::Session(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Session(err) => Some(err),
            Self::Sync(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<SessionError> for ContextError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<SyncError> for ContextError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

/// Explicitly constructed owner of all long-lived services.
pub struct AppContext {
    session: SessionManager,
    sync: Arc<DocumentSyncService>,
}

impl AppContext {
    /// Opens the local database and wires the default collaborators.
    pub fn open(config: AppConfig) -> Result<Self, ContextError> {
        let hasher_params = config.hasher.params().map_err(ContextError::Config)?;
        let conn = match &config.database {
            DatabaseLocation::InMemory => open_db_in_memory()?,
            DatabaseLocation::File(path) => open_db(path)?,
        };
        let shared = Arc::new(Mutex::new(conn));
        let store = Arc::new(SqliteDocumentStore::with_shared(Arc::clone(&shared)));
        let provider = Arc::new(LocalIdentityProvider::with_params(shared, hasher_params));

        info!(
            "event=context_open module=context status=ok database={}",
            match config.database {
                DatabaseLocation::InMemory => "memory",
                DatabaseLocation::File(_) => "file",
            }
        );
        Ok(Self::from_parts(store, provider, config.min_password_chars))
    }

    /// Wires caller-supplied collaborators.
    pub fn from_parts(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
        min_password_chars: usize,
    ) -> Self {
        let session = SessionManager::new(provider, min_password_chars);
        let sync = Arc::new(DocumentSyncService::new(store));

        let watched = Arc::clone(&sync);
        let last_user: Mutex<Option<String>> = Mutex::new(None);
        session.subscribe(Arc::new(move |current: Option<&SessionHandle>| {
            let user_id = current.map(|session| session.user_id.clone());
            let changed = {
                let mut last_user = last_user.lock().unwrap_or_else(PoisonError::into_inner);
                let changed = *last_user != user_id;
                *last_user = user_id;
                changed
            };
            if changed {
                release_user_scoped(&watched);
            }
        }));

        Self { session, sync }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn sync(&self) -> &DocumentSyncService {
        &self.sync
    }

    /// Opens the folders subscription for the signed-in user.
    ///
    /// # Errors
    /// - `NotSignedIn` while logged out.
    /// - `Sync(SlotBusy)` when a folders subscription is already open.
    pub fn open_user_folders(&self) -> Result<SubscriptionHandle, ContextError> {
        let session = self
            .session
            .current_session()
            .ok_or(ContextError::NotSignedIn)?;
        Ok(self.sync.open_folders(&session.user_id)?)
    }

    /// Logs out; the previous user's folder subscriptions close on the
    /// session transition.
    ///
    /// # Errors
    /// - `Session` when the provider rejects sign-out. Subscriptions and the
    ///   session are left untouched.
    pub fn log_out(&self) -> Result<(), ContextError> {
        self.session.log_out()?;
        Ok(())
    }

    /// Closes every outstanding subscription; safe to call more than once.
    pub fn shutdown(&self) {
        let open = self.sync.open_handles().len();
        if open == 0 {
            return;
        }
        self.sync.close_all();
        info!("event=context_shutdown module=context status=ok closed_subscriptions={open}");
    }
}

/// Closes the folders subscription and any folder-notes subscription.
///
/// Top-level notes are not owned by a user and stay open.
fn release_user_scoped(sync: &DocumentSyncService) {
    let mut handles = Vec::new();
    if let Some(handle) = sync.handle_for(ListSlot::Folders) {
        handles.push(handle);
    }
    if let Some(handle) = sync.handle_for(ListSlot::Notes) {
        let folder_scoped = sync.subscription_status(handle).is_some_and(|status| {
            matches!(status.target, SubscriptionTarget::FolderNotes { .. })
        });
        if folder_scoped {
            handles.push(handle);
        }
    }

    for handle in handles {
        match sync.close(handle) {
            Ok(()) => info!(
                "event=session_scope_release module=context status=ok handle={handle}"
            ),
            Err(err) => warn!(
                "event=session_scope_release module=context status=error handle={handle} error={err}"
            ),
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
