//! Core domain logic for AppSync notes.
//!
//! Entity models, the document store and identity provider contracts with
//! their local SQLite implementations, and the session/sync services that
//! sit between UI state and those collaborators.

pub mod config;
pub mod context;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{AppConfig, DatabaseLocation, HasherConfig, DEFAULT_MIN_PASSWORD_CHARS};
pub use context::{AppContext, ContextError};
pub use identity::{
    IdentityError, IdentityErrorCode, IdentityProvider, LocalIdentityProvider, SessionHandle,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::document::{
    CollectionPath, Document, DocumentId, DocumentSnapshot, FieldValue, ParsedRecord, SkipReason,
};
pub use model::folder::Folder;
pub use model::note::Note;
pub use model::validation::{FolderDraft, NoteDraft, ValidationError};
pub use service::observable::ObservableList;
pub use service::session_manager::{AuthOperation, SessionError, SessionManager};
pub use service::sync_service::{
    DocumentSyncService, ListSlot, MutationError, MutationKind, SubscriptionHandle,
    SubscriptionState, SubscriptionStatus, SubscriptionTarget, SyncError,
};
pub use store::{DocumentStore, Query, SqliteDocumentStore, StoreError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
