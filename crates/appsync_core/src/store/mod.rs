//! Document store collaborator contracts.
//!
//! # Responsibility
//! - Define the narrow interface the sync service consumes: live queries plus
//!   add/set/delete by collection.
//! - Provide a local SQLite-backed implementation.
//!
//! # Invariants
//! - A registered listener receives its first snapshot during `listen`.
//! - Every committed write to a collection re-delivers a full snapshot to each
//!   listener whose query targets that collection.
//! - Listeners are invoked outside internal locks.

use crate::db::DbError;
use crate::model::document::{CollectionPath, Document, DocumentId, DocumentSnapshot};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod query;
pub mod sqlite_store;

pub use query::{FieldFilter, OrderBy, Query, SortDirection};
pub use sqlite_store::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Callback receiving every snapshot (or delivery failure) of one live query.
pub type SnapshotListener = Arc<dyn Fn(StoreResult<Vec<DocumentSnapshot>>) + Send + Sync>;

/// Registration id of one live query listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl Display for ListenerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document store failure.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// A stored row could not be decoded into a document.
    Decode {
        collection: String,
        doc_id: DocumentId,
        message: String,
    },
    /// Fields could not be encoded for storage.
    Encode(String),
    /// The backend is not reachable or its state is unusable.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Decode {
                collection,
                doc_id,
                message,
            } => write!(f, "cannot decode document `{collection}/{doc_id}`: {message}"),
            Self::Encode(message) => write!(f, "cannot encode document fields: {message}"),
            Self::Unavailable(message) => write!(f, "document store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Remote document database as seen by the sync service.
pub trait DocumentStore: Send + Sync {
    /// Registers a live query; the first snapshot is delivered before return.
    fn listen(&self, query: Query, listener: SnapshotListener) -> StoreResult<ListenerId>;
    /// Removes a live query. Returns `false` when the id was unknown.
    fn unlisten(&self, id: ListenerId) -> bool;
    /// One-shot read of the documents matching `query`.
    fn fetch(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>>;
    /// Creates a document with a store-assigned id.
    fn add_document(&self, collection: &CollectionPath, fields: Document)
        -> StoreResult<DocumentId>;
    /// Replaces every field of the document, creating it when missing.
    fn set_document(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Document,
    ) -> StoreResult<()>;
    /// Deletes a document; deleting an unknown id succeeds.
    fn delete_document(&self, collection: &CollectionPath, id: &str) -> StoreResult<()>;
}
