use appsync_core::db::open_db_in_memory;
use appsync_core::model::document::now_epoch_ms;
use appsync_core::store::{ListenerId, SnapshotListener, StoreResult};
use appsync_core::{
    CollectionPath, Document, DocumentId, DocumentSnapshot, DocumentStore, DocumentSyncService,
    FieldValue, Folder, ListSlot, MutationError, MutationKind, Note, Query, SqliteDocumentStore,
    StoreError, SubscriptionState, SyncError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn local_service() -> (Arc<SqliteDocumentStore>, DocumentSyncService) {
    let store = Arc::new(SqliteDocumentStore::new(open_db_in_memory().unwrap()));
    let service = DocumentSyncService::new(store.clone());
    (store, service)
}

fn stored_note(id: &str, title: &str, timestamp_ms: i64) -> Document {
    Note::new(id, title, format!("{title} body"), timestamp_ms).to_document()
}

#[test]
fn added_note_appears_exactly_once_with_current_timestamp() {
    let (_store, service) = local_service();
    let handle = service.open_notes().unwrap();
    assert_eq!(service.subscription_state(handle), SubscriptionState::Streaming);
    assert!(service.notes().is_empty());

    let before = now_epoch_ms();
    let id = service.add_note("T", "C").unwrap();

    let notes = service.notes().current();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, id);
    assert_eq!(notes[0].title, "T");
    assert_eq!(notes[0].content, "C");
    assert!(notes[0].timestamp_ms >= before);
}

#[test]
fn malformed_document_is_skipped_without_failing_snapshot() {
    let (store, service) = local_service();
    let notes = CollectionPath::notes();
    store
        .set_document(&notes, "good", stored_note("good", "kept", 1_000))
        .unwrap();
    let mut missing_content = Document::new();
    missing_content.insert("title".to_string(), FieldValue::from("orphan"));
    missing_content.insert("timestamp".to_string(), FieldValue::Timestamp(2_000));
    store
        .set_document(&notes, "bad", missing_content)
        .unwrap();

    let handle = service.open_notes().unwrap();

    let current = service.notes().current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, "good");
    let status = service.subscription_status(handle).unwrap();
    assert_eq!(status.state, SubscriptionState::Streaming);
    assert_eq!(status.skipped_last_snapshot, 1);
}

#[test]
fn undecodable_stored_row_does_not_hide_valid_notes() {
    let conn = Arc::new(Mutex::new(open_db_in_memory().unwrap()));
    let store = Arc::new(SqliteDocumentStore::with_shared(conn.clone()));
    let service = DocumentSyncService::new(store.clone());
    store
        .set_document(&CollectionPath::notes(), "good", stored_note("good", "kept", 1_000))
        .unwrap();
    conn.lock()
        .unwrap()
        .execute(
            r#"INSERT INTO documents (collection, doc_id, fields_json)
               VALUES ('notes', 'future', '{"title":{"kind":"array","value":["x"]}}');"#,
            [],
        )
        .unwrap();

    let handle = service.open_notes().unwrap();

    assert_eq!(service.subscription_state(handle), SubscriptionState::Streaming);
    let notes = service.notes().current();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, "good");
}

#[test]
fn update_keeps_id_and_never_duplicates() {
    let (_store, service) = local_service();
    service.open_notes().unwrap();
    let id = service.add_note("draft", "first").unwrap();

    let original = service.notes().current()[0].clone();
    let edited = original.with_edits("final", "second");
    service.update_note(&edited).unwrap();

    let notes = service.notes().current();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, id);
    assert_eq!(notes[0].title, "final");
    assert_eq!(notes[0].content, "second");
    assert_eq!(notes[0].timestamp_ms, original.timestamp_ms);
}

#[test]
fn update_without_persisted_id_is_rejected() {
    let (_store, service) = local_service();
    let err = service.update_note(&Note::draft("x", "y")).unwrap_err();
    assert!(matches!(err, MutationError::MissingId(MutationKind::UpdateNote)));
}

#[test]
fn delete_removes_note_and_unknown_ids_succeed() {
    let (_store, service) = local_service();
    service.open_notes().unwrap();
    service.add_note("keep", "k").unwrap();
    let doomed_id = service.add_note("drop", "d").unwrap();
    let doomed = service
        .notes()
        .current()
        .iter()
        .find(|note| note.id == doomed_id)
        .cloned()
        .unwrap();

    service.delete_note(&doomed).unwrap();
    let notes = service.notes().current();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "keep");

    service.delete_note(&doomed).unwrap();
    service
        .delete_folder(&Folder::new("never-existed", "ghost"))
        .unwrap();
}

#[test]
fn switching_folders_shows_only_the_new_folders_notes_in_order() {
    let (store, service) = local_service();
    let folder_a = Folder::new("folder-a", "A");
    let folder_b = Folder::new("folder-b", "B");
    let path_a = CollectionPath::folder_notes(&folder_a.id).unwrap();
    let path_b = CollectionPath::folder_notes(&folder_b.id).unwrap();
    store
        .set_document(&path_a, "a1", stored_note("a1", "alpha", 500))
        .unwrap();
    store
        .set_document(&path_b, "b2", stored_note("b2", "later", 3_000))
        .unwrap();
    store
        .set_document(&path_b, "b1", stored_note("b1", "earlier", 1_000))
        .unwrap();

    let handle_a = service.open_folder_notes(&folder_a).unwrap();
    assert_eq!(service.notes().len(), 1);
    service.close(handle_a).unwrap();
    assert!(service.notes().is_empty());
    assert_eq!(service.subscription_state(handle_a), SubscriptionState::Unsubscribed);

    service.open_folder_notes(&folder_b).unwrap();
    let titles = service
        .notes()
        .current()
        .iter()
        .map(|note| note.title.clone())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["earlier", "later"]);

    // Writes into the closed folder no longer reach the list.
    service.add_note_in_folder("stray", "s", &folder_a).unwrap();
    assert_eq!(service.notes().len(), 2);
    assert_eq!(store.active_listener_count(), 1);
}

#[test]
fn opening_second_subscription_for_same_list_is_rejected() {
    let (_store, service) = local_service();
    let first = service.open_notes().unwrap();

    let err = service
        .open_folder_notes(&Folder::new("f1", "Work"))
        .unwrap_err();
    match err {
        SyncError::SlotBusy { slot, open_handle } => {
            assert_eq!(slot, ListSlot::Notes);
            assert_eq!(open_handle, first);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The folders list is independent.
    service.open_folders("user-1").unwrap();
    assert_eq!(service.open_handles().len(), 2);
}

#[test]
fn folders_are_scoped_to_their_owner() {
    let (_store, service) = local_service();
    service.add_folder("Mine", "user-1").unwrap();
    service.add_folder("Theirs", "user-2").unwrap();

    service.open_folders("user-1").unwrap();
    let folders = service.folders().current();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, "Mine");

    service.add_folder("Also mine", "user-1").unwrap();
    assert_eq!(service.folders().len(), 2);

    let err = service.add_folder("Nobody's", "").unwrap_err();
    assert!(matches!(err, MutationError::MissingOwner));
}

#[test]
fn invalid_folder_id_is_rejected_before_listening() {
    let (store, service) = local_service();
    let err = service
        .open_folder_notes(&Folder::new("a/b", "nested"))
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidTarget(_)));
    assert!(service.handle_for(ListSlot::Notes).is_none());
    assert_eq!(store.active_listener_count(), 0);
}

#[test]
fn observers_see_each_replacement_once() {
    let (_store, service) = local_service();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    service.notes().observe(Arc::new(move |items: &Arc<Vec<Note>>, version| {
        sink.lock().unwrap().push((items.len(), version));
    }));

    let handle = service.open_notes().unwrap();
    service.add_note("one", "1").unwrap();
    service.close(handle).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(0, 1), (1, 2), (0, 3)]);
}

#[test]
fn closing_unknown_handle_fails() {
    let (_store, service) = local_service();
    let handle = service.open_notes().unwrap();
    service.close(handle).unwrap();

    let err = service.close(handle).unwrap_err();
    assert!(matches!(err, SyncError::UnknownHandle(h) if h == handle));
}

/// Store whose listeners receive a delivery failure and whose writes fail.
#[derive(Default)]
struct UnreachableStore {
    listens: AtomicUsize,
    listeners: Mutex<Vec<SnapshotListener>>,
}

impl UnreachableStore {
    fn redeliver_empty(&self) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(Ok(Vec::new()));
        }
    }
}

impl DocumentStore for UnreachableStore {
    fn listen(&self, _query: Query, listener: SnapshotListener) -> StoreResult<ListenerId> {
        let id = self.listens.fetch_add(1, Ordering::SeqCst) as u64;
        self.listeners.lock().unwrap().push(listener.clone());
        listener(Err(StoreError::Unavailable("offline".to_string())));
        Ok(ListenerId(id))
    }

    fn unlisten(&self, _id: ListenerId) -> bool {
        true
    }

    fn fetch(&self, _query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        Err(StoreError::Unavailable("offline".to_string()))
    }

    fn add_document(&self, _collection: &CollectionPath, _fields: Document) -> StoreResult<DocumentId> {
        Err(StoreError::Unavailable("offline".to_string()))
    }

    fn set_document(
        &self,
        _collection: &CollectionPath,
        _id: &str,
        _fields: Document,
    ) -> StoreResult<()> {
        Err(StoreError::Unavailable("offline".to_string()))
    }

    fn delete_document(&self, _collection: &CollectionPath, _id: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("offline".to_string()))
    }
}

#[test]
fn delivery_failure_marks_subscription_errored_and_keeps_list() {
    let store = Arc::new(UnreachableStore::default());
    let service = DocumentSyncService::new(store.clone());

    let handle = service.open_notes().unwrap();
    assert_eq!(service.subscription_state(handle), SubscriptionState::Error);
    assert!(service.notes().is_empty());
    assert_eq!(service.notes().version(), 0);

    // A later successful delivery recovers the stream.
    store.redeliver_empty();
    assert_eq!(service.subscription_state(handle), SubscriptionState::Streaming);
    assert_eq!(service.notes().version(), 1);
}

#[test]
fn backend_write_failures_are_returned() {
    let service = DocumentSyncService::new(Arc::new(UnreachableStore::default()));

    let err = service.add_note("T", "C").unwrap_err();
    match err {
        MutationError::Store { kind, source } => {
            assert_eq!(kind, MutationKind::AddNote);
            assert!(matches!(source, StoreError::Unavailable(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    let persisted = Note::new("n1", "T", "C", 1);
    assert!(matches!(
        service.update_note(&persisted).unwrap_err(),
        MutationError::Store {
            kind: MutationKind::UpdateNote,
            ..
        }
    ));
    assert!(matches!(
        service.delete_folder(&Folder::new("f1", "Work")).unwrap_err(),
        MutationError::Store {
            kind: MutationKind::DeleteFolder,
            ..
        }
    ));
}
