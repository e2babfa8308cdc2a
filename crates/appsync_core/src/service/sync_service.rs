//! Document sync service.
//!
//! # Responsibility
//! - Own live subscriptions to note and folder collections and mirror each
//!   delivered snapshot into an observable list.
//! - Issue create/update/delete requests against the same collections.
//!
//! # Invariants
//! - At most one open subscription per list slot; callers close the previous
//!   handle before opening another for the same slot.
//! - Each snapshot replaces the list wholesale. Malformed documents are
//!   skipped individually and never fail the snapshot.
//! - Mutations never touch the lists directly; the next snapshot does.
//! - Backend failures are logged at the callback site and also returned.

use crate::model::document::{CollectionPath, DocumentId, DocumentSnapshot, ParsedRecord};
use crate::model::folder::{Folder, FOLDER_OWNER_FIELD};
use crate::model::note::{Note, NOTE_TIMESTAMP_FIELD};
use crate::model::validation::ValidationError;
use crate::service::observable::ObservableList;
use crate::store::{
    DocumentStore, ListenerId, Query, SnapshotListener, SortDirection, StoreError, StoreResult,
};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Caller-held token for one open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Numeric form for callers across the FFI boundary.
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Display for SubscriptionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Local list a subscription writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListSlot {
    Notes,
    Folders,
}

impl ListSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Folders => "folders",
        }
    }
}

/// Logical collection a subscription streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTarget {
    TopLevelNotes,
    FolderNotes { folder_id: DocumentId },
    UserFolders { user_id: String },
}

impl SubscriptionTarget {
    pub fn slot(&self) -> ListSlot {
        match self {
            Self::TopLevelNotes | Self::FolderNotes { .. } => ListSlot::Notes,
            Self::UserFolders { .. } => ListSlot::Folders,
        }
    }

    fn query(&self) -> Result<Query, ValidationError> {
        let query = match self {
            Self::TopLevelNotes => Query::collection(CollectionPath::notes())
                .order_by(NOTE_TIMESTAMP_FIELD, SortDirection::Ascending),
            Self::FolderNotes { folder_id } => {
                Query::collection(CollectionPath::folder_notes(folder_id)?)
                    .order_by(NOTE_TIMESTAMP_FIELD, SortDirection::Ascending)
            }
            Self::UserFolders { user_id } => Query::collection(CollectionPath::folders())
                .where_equals(FOLDER_OWNER_FIELD, user_id.as_str()),
        };
        Ok(query)
    }
}

/// Lifecycle of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Streaming,
    /// Last delivery failed; the listener stays registered.
    Error,
}

/// Observability view of one open subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub target: SubscriptionTarget,
    pub state: SubscriptionState,
    pub snapshots_received: u64,
    /// Documents dropped from the latest snapshot because they did not parse.
    pub skipped_last_snapshot: usize,
}

/// Failure opening or closing a subscription.
#[derive(Debug)]
pub enum SyncError {
    SlotBusy {
        slot: ListSlot,
        open_handle: SubscriptionHandle,
    },
    UnknownHandle(SubscriptionHandle),
    InvalidTarget(ValidationError),
    Store(StoreError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlotBusy { slot, open_handle } => write!(
                f,
                "{} list already has open subscription {open_handle}; close it first",
                slot.as_str()
            ),
            Self::UnknownHandle(handle) => write!(f, "subscription {handle} is not open"),
            Self::InvalidTarget(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTarget(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for SyncError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidTarget(value)
    }
}

/// Mutation kinds, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    AddNote,
    UpdateNote,
    DeleteNote,
    AddFolder,
    DeleteFolder,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddNote => "add_note",
            Self::UpdateNote => "update_note",
            Self::DeleteNote => "delete_note",
            Self::AddFolder => "add_folder",
            Self::DeleteFolder => "delete_folder",
        }
    }
}

/// Failure of a create/update/delete request.
#[derive(Debug)]
pub enum MutationError {
    /// The record has no backend id yet, so it cannot be addressed.
    MissingId(MutationKind),
    /// Folder creation without an owning user.
    MissingOwner,
    InvalidTarget(ValidationError),
    Store {
        kind: MutationKind,
        source: StoreError,
    },
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId(kind) => write!(f, "{} requires a persisted id", kind.as_str()),
            Self::MissingOwner => write!(f, "add_folder requires a user id"),
            Self::InvalidTarget(err) => write!(f, "{err}"),
            Self::Store { kind, source } => write!(f, "{} failed: {source}", kind.as_str()),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTarget(err) => Some(err),
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}

struct OpenSubscription {
    listener_id: Option<ListenerId>,
    status: SubscriptionStatus,
}

#[derive(Default)]
struct Registry {
    next_handle: u64,
    open: BTreeMap<SubscriptionHandle, OpenSubscription>,
    slots: BTreeMap<ListSlot, SubscriptionHandle>,
}

/// Mediator between the remote document store and local list state.
pub struct DocumentSyncService {
    store: Arc<dyn DocumentStore>,
    notes: Arc<ObservableList<Note>>,
    folders: Arc<ObservableList<Folder>>,
    registry: Arc<Mutex<Registry>>,
}

impl DocumentSyncService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            notes: Arc::new(ObservableList::new()),
            folders: Arc::new(ObservableList::new()),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Read-only notes list, fed by the open notes subscription.
    pub fn notes(&self) -> &ObservableList<Note> {
        &self.notes
    }

    /// Read-only folders list, fed by the open folders subscription.
    pub fn folders(&self) -> &ObservableList<Folder> {
        &self.folders
    }

    /// Streams the top-level notes collection ordered by timestamp.
    pub fn open_notes(&self) -> Result<SubscriptionHandle, SyncError> {
        self.open(SubscriptionTarget::TopLevelNotes)
    }

    /// Streams one folder's notes ordered by timestamp.
    pub fn open_folder_notes(&self, folder: &Folder) -> Result<SubscriptionHandle, SyncError> {
        self.open(SubscriptionTarget::FolderNotes {
            folder_id: folder.id.clone(),
        })
    }

    /// Streams the folders owned by `user_id`.
    pub fn open_folders(&self, user_id: &str) -> Result<SubscriptionHandle, SyncError> {
        self.open(SubscriptionTarget::UserFolders {
            user_id: user_id.to_string(),
        })
    }

    /// Opens a subscription for `target`.
    ///
    /// # Errors
    /// - `SlotBusy` when the target's list already has an open handle.
    /// - `InvalidTarget` for an unaddressable folder id.
    /// - `Store` when the backend refuses the listener.
    pub fn open(&self, target: SubscriptionTarget) -> Result<SubscriptionHandle, SyncError> {
        let query = target.query()?;
        let slot = target.slot();
        let handle = {
            let mut registry = self.lock_registry();
            if let Some(open_handle) = registry.slots.get(&slot) {
                return Err(SyncError::SlotBusy {
                    slot,
                    open_handle: *open_handle,
                });
            }
            registry.next_handle += 1;
            let handle = SubscriptionHandle(registry.next_handle);
            registry.open.insert(
                handle,
                OpenSubscription {
                    listener_id: None,
                    status: SubscriptionStatus {
                        target: target.clone(),
                        state: SubscriptionState::Subscribing,
                        snapshots_received: 0,
                        skipped_last_snapshot: 0,
                    },
                },
            );
            registry.slots.insert(slot, handle);
            handle
        };

        let listener = match slot {
            ListSlot::Notes => snapshot_listener(
                handle,
                Arc::clone(&self.registry),
                Arc::clone(&self.notes),
                Note::from_document,
            ),
            ListSlot::Folders => snapshot_listener(
                handle,
                Arc::clone(&self.registry),
                Arc::clone(&self.folders),
                Folder::from_document,
            ),
        };

        match self.store.listen(query, listener) {
            Ok(listener_id) => {
                let closed_meanwhile = {
                    let mut registry = self.lock_registry();
                    match registry.open.get_mut(&handle) {
                        Some(open) => {
                            open.listener_id = Some(listener_id);
                            false
                        }
                        None => true,
                    }
                };
                if closed_meanwhile {
                    self.store.unlisten(listener_id);
                }
                info!(
                    "event=subscription_open module=sync status=ok handle={} slot={}",
                    handle,
                    slot.as_str()
                );
                Ok(handle)
            }
            Err(err) => {
                {
                    let mut registry = self.lock_registry();
                    registry.open.remove(&handle);
                    if registry.slots.get(&slot) == Some(&handle) {
                        registry.slots.remove(&slot);
                    }
                }
                error!(
                    "event=subscription_open module=sync status=error handle={} slot={} error={}",
                    handle,
                    slot.as_str(),
                    err
                );
                Err(SyncError::Store(err))
            }
        }
    }

    /// Tears down one subscription and clears the list it fed.
    pub fn close(&self, handle: SubscriptionHandle) -> Result<(), SyncError> {
        let (listener_id, slot) = {
            let mut registry = self.lock_registry();
            let Some(open) = registry.open.remove(&handle) else {
                return Err(SyncError::UnknownHandle(handle));
            };
            let slot = open.status.target.slot();
            if registry.slots.get(&slot) == Some(&handle) {
                registry.slots.remove(&slot);
            }
            (open.listener_id, slot)
        };

        if let Some(listener_id) = listener_id {
            self.store.unlisten(listener_id);
        }
        match slot {
            ListSlot::Notes => self.notes.replace(Vec::new()).notify(),
            ListSlot::Folders => self.folders.replace(Vec::new()).notify(),
        }
        info!(
            "event=subscription_close module=sync status=ok handle={} slot={}",
            handle,
            slot.as_str()
        );
        Ok(())
    }

    /// Closes every outstanding subscription.
    pub fn close_all(&self) {
        for handle in self.open_handles() {
            // Already-closed handles are fine here.
            let _ = self.close(handle);
        }
    }

    pub fn open_handles(&self) -> Vec<SubscriptionHandle> {
        self.lock_registry().open.keys().copied().collect()
    }

    /// Handle currently feeding `slot`, if any.
    pub fn handle_for(&self, slot: ListSlot) -> Option<SubscriptionHandle> {
        self.lock_registry().slots.get(&slot).copied()
    }

    /// Returns `Unsubscribed` for closed or unknown handles.
    pub fn subscription_state(&self, handle: SubscriptionHandle) -> SubscriptionState {
        self.lock_registry()
            .open
            .get(&handle)
            .map_or(SubscriptionState::Unsubscribed, |open| open.status.state)
    }

    pub fn subscription_status(&self, handle: SubscriptionHandle) -> Option<SubscriptionStatus> {
        self.lock_registry()
            .open
            .get(&handle)
            .map(|open| open.status.clone())
    }

    /// Creates a top-level note stamped with the current time.
    pub fn add_note(&self, title: &str, content: &str) -> Result<DocumentId, MutationError> {
        self.add_note_to(CollectionPath::notes(), title, content)
    }

    /// Creates a note inside `folder`'s notes sub-collection.
    pub fn add_note_in_folder(
        &self,
        title: &str,
        content: &str,
        folder: &Folder,
    ) -> Result<DocumentId, MutationError> {
        let collection = folder_notes_path(folder)?;
        self.add_note_to(collection, title, content)
    }

    /// Overwrites every stored field of a top-level note.
    pub fn update_note(&self, note: &Note) -> Result<(), MutationError> {
        self.update_note_at(CollectionPath::notes(), note)
    }

    pub fn update_note_in_folder(&self, note: &Note, folder: &Folder) -> Result<(), MutationError> {
        let collection = folder_notes_path(folder)?;
        self.update_note_at(collection, note)
    }

    /// Deletes a top-level note; unknown ids are not an error.
    pub fn delete_note(&self, note: &Note) -> Result<(), MutationError> {
        self.delete_at(MutationKind::DeleteNote, CollectionPath::notes(), &note.id)
    }

    pub fn delete_note_in_folder(&self, note: &Note, folder: &Folder) -> Result<(), MutationError> {
        let collection = folder_notes_path(folder)?;
        self.delete_at(MutationKind::DeleteNote, collection, &note.id)
    }

    /// Creates a folder owned by `user_id`.
    pub fn add_folder(&self, name: &str, user_id: &str) -> Result<DocumentId, MutationError> {
        if user_id.is_empty() {
            return Err(MutationError::MissingOwner);
        }
        let collection = CollectionPath::folders();
        let fields = Folder::new(DocumentId::new(), name).to_document(user_id);
        let result = self.store.add_document(&collection, fields);
        let doc_id = result.as_ref().ok().cloned();
        finish_mutation(MutationKind::AddFolder, &collection, doc_id.as_deref(), result)
    }

    /// Deletes the folder document; its notes sub-collection is left as is.
    pub fn delete_folder(&self, folder: &Folder) -> Result<(), MutationError> {
        self.delete_at(MutationKind::DeleteFolder, CollectionPath::folders(), &folder.id)
    }

    fn add_note_to(
        &self,
        collection: CollectionPath,
        title: &str,
        content: &str,
    ) -> Result<DocumentId, MutationError> {
        let note = Note::draft(title, content);
        let result = self.store.add_document(&collection, note.to_document());
        let doc_id = result.as_ref().ok().cloned();
        finish_mutation(MutationKind::AddNote, &collection, doc_id.as_deref(), result)
    }

    fn update_note_at(&self, collection: CollectionPath, note: &Note) -> Result<(), MutationError> {
        if !note.is_persisted() {
            return Err(MutationError::MissingId(MutationKind::UpdateNote));
        }
        let result = self
            .store
            .set_document(&collection, &note.id, note.to_document());
        finish_mutation(MutationKind::UpdateNote, &collection, Some(&note.id), result)
    }

    fn delete_at(
        &self,
        kind: MutationKind,
        collection: CollectionPath,
        id: &str,
    ) -> Result<(), MutationError> {
        if id.is_empty() {
            return Err(MutationError::MissingId(kind));
        }
        let result = self.store.delete_document(&collection, id);
        finish_mutation(kind, &collection, Some(id), result)
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn folder_notes_path(folder: &Folder) -> Result<CollectionPath, MutationError> {
    CollectionPath::folder_notes(&folder.id).map_err(MutationError::InvalidTarget)
}

fn finish_mutation<T>(
    kind: MutationKind,
    collection: &CollectionPath,
    doc_id: Option<&str>,
    result: StoreResult<T>,
) -> Result<T, MutationError> {
    match &result {
        Ok(_) => info!(
            "event=mutation module=sync op={} status=ok collection={} doc_id={}",
            kind.as_str(),
            collection,
            doc_id.unwrap_or("-")
        ),
        Err(err) => error!(
            "event=mutation module=sync op={} status=error collection={} doc_id={} error={}",
            kind.as_str(),
            collection,
            doc_id.unwrap_or("-"),
            err
        ),
    }
    result.map_err(|source| MutationError::Store { kind, source })
}

fn snapshot_listener<T>(
    handle: SubscriptionHandle,
    registry: Arc<Mutex<Registry>>,
    list: Arc<ObservableList<T>>,
    parse: fn(&DocumentSnapshot) -> ParsedRecord<T>,
) -> SnapshotListener
where
    T: Send + Sync + 'static,
{
    Arc::new(move |snapshot: StoreResult<Vec<DocumentSnapshot>>| {
        let change = {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(open) = registry.open.get_mut(&handle) else {
                return;
            };

            match snapshot {
                Ok(documents) => {
                    let mut records = Vec::with_capacity(documents.len());
                    let mut skipped = 0;
                    for document in &documents {
                        match parse(document) {
                            ParsedRecord::Parsed(record) => records.push(record),
                            ParsedRecord::Skipped {
                                document_id,
                                reason,
                            } => {
                                skipped += 1;
                                warn!(
                                    "event=record_skipped module=sync handle={} doc_id={} reason={}",
                                    handle, document_id, reason
                                );
                            }
                        }
                    }
                    open.status.state = SubscriptionState::Streaming;
                    open.status.snapshots_received += 1;
                    open.status.skipped_last_snapshot = skipped;
                    list.replace(records)
                }
                Err(err) => {
                    open.status.state = SubscriptionState::Error;
                    warn!(
                        "event=snapshot_delivery module=sync status=error handle={} error={}",
                        handle, err
                    );
                    return;
                }
            }
        };
        change.notify();
    })
}
