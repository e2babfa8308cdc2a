//! SQLite-backed local document store.
//!
//! # Responsibility
//! - Persist documents as JSON field maps keyed by `(collection, doc_id)`.
//! - Evaluate live queries and fan snapshots out to registered listeners.
//!
//! # Invariants
//! - Writes commit before any listener is notified.
//! - A stored row that cannot be decoded is left out of its snapshot; the
//!   other documents are still delivered.
//! - Listener callbacks never run while the connection or listener lock is
//!   held, so a callback may read or write this store again.

use crate::db::SharedConnection;
use crate::model::document::{CollectionPath, Document, DocumentId, DocumentSnapshot};
use crate::store::{
    DocumentStore, ListenerId, Query, SnapshotListener, StoreError, StoreResult,
};
use log::{debug, warn};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Clone)]
struct RegisteredListener {
    query: Query,
    listener: SnapshotListener,
}

/// Local document store over one shared SQLite connection.
pub struct SqliteDocumentStore {
    conn: SharedConnection,
    listeners: Mutex<BTreeMap<ListenerId, RegisteredListener>>,
    next_listener_id: AtomicU64,
}

impl SqliteDocumentStore {
    /// Wraps a migrated connection owned only by this store.
    pub fn new(conn: Connection) -> Self {
        Self::with_shared(Arc::new(Mutex::new(conn)))
    }

    /// Uses a migrated connection shared with other local collaborators.
    pub fn with_shared(conn: SharedConnection) -> Self {
        Self {
            conn,
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Number of live queries currently registered.
    pub fn active_listener_count(&self) -> usize {
        self.lock_listeners()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn lock_listeners(
        &self,
    ) -> StoreResult<MutexGuard<'_, BTreeMap<ListenerId, RegisteredListener>>> {
        self.listeners
            .lock()
            .map_err(|_| StoreError::Unavailable("listener lock poisoned".to_string()))
    }

    fn load_collection(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT doc_id, fields_json
             FROM documents
             WHERE collection = ?1;",
        )?;
        let mut rows = stmt.query([collection.as_str()])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let doc_id: String = row.get("doc_id")?;
            let raw: String = row.get("fields_json")?;
            match serde_json::from_str::<Document>(&raw) {
                Ok(fields) => documents.push(DocumentSnapshot::new(doc_id, fields)),
                Err(err) => {
                    let err = StoreError::Decode {
                        collection: collection.to_string(),
                        doc_id,
                        message: err.to_string(),
                    };
                    warn!("event=document_decode module=store status=skipped error={err}");
                }
            }
        }
        Ok(documents)
    }

    fn notify(&self, collection: &CollectionPath) {
        let targets = match self.lock_listeners() {
            Ok(listeners) => listeners
                .iter()
                .filter(|(_, entry)| &entry.query.collection == collection)
                .map(|(id, entry)| (*id, entry.clone()))
                .collect::<Vec<_>>(),
            Err(err) => {
                warn!(
                    "event=snapshot_fanout module=store status=error collection={} error={}",
                    collection, err
                );
                return;
            }
        };

        for (id, entry) in targets {
            self.deliver(id, &entry);
        }
    }

    fn deliver(&self, id: ListenerId, entry: &RegisteredListener) {
        let snapshot = self.fetch(&entry.query);
        match &snapshot {
            Ok(documents) => debug!(
                "event=snapshot_deliver module=store status=ok listener_id={} collection={} documents={}",
                id,
                entry.query.collection,
                documents.len()
            ),
            Err(err) => warn!(
                "event=snapshot_deliver module=store status=error listener_id={} collection={} error={}",
                id, entry.query.collection, err
            ),
        }
        (entry.listener)(snapshot);
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn listen(&self, query: Query, listener: SnapshotListener) -> StoreResult<ListenerId> {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let entry = RegisteredListener { query, listener };
        self.lock_listeners()?.insert(id, entry.clone());
        debug!(
            "event=listener_register module=store status=ok listener_id={} collection={}",
            id, entry.query.collection
        );
        self.deliver(id, &entry);
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        let removed = self
            .lock_listeners()
            .map(|mut listeners| listeners.remove(&id).is_some())
            .unwrap_or(false);
        debug!(
            "event=listener_remove module=store status={} listener_id={}",
            if removed { "ok" } else { "unknown" },
            id
        );
        removed
    }

    fn fetch(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        let documents = self.load_collection(&query.collection)?;
        Ok(query.apply(documents))
    }

    fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> StoreResult<DocumentId> {
        let id = Uuid::new_v4().to_string();
        let encoded = encode_fields(&fields)?;
        self.lock_conn()?.execute(
            "INSERT INTO documents (collection, doc_id, fields_json)
             VALUES (?1, ?2, ?3);",
            params![collection.as_str(), id.as_str(), encoded],
        )?;
        debug!(
            "event=store_write module=store op=add status=ok collection={} doc_id={}",
            collection, id
        );
        self.notify(collection);
        Ok(id)
    }

    fn set_document(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Document,
    ) -> StoreResult<()> {
        let encoded = encode_fields(&fields)?;
        self.lock_conn()?.execute(
            "INSERT INTO documents (collection, doc_id, fields_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (collection, doc_id) DO UPDATE SET
                fields_json = excluded.fields_json,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![collection.as_str(), id, encoded],
        )?;
        debug!(
            "event=store_write module=store op=set status=ok collection={} doc_id={}",
            collection, id
        );
        self.notify(collection);
        Ok(())
    }

    fn delete_document(&self, collection: &CollectionPath, id: &str) -> StoreResult<()> {
        let changed = self.lock_conn()?.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
            params![collection.as_str(), id],
        )?;
        debug!(
            "event=store_write module=store op=delete status=ok collection={} doc_id={} changed={}",
            collection, id, changed
        );
        if changed > 0 {
            self.notify(collection);
        }
        Ok(())
    }
}

fn encode_fields(fields: &Document) -> StoreResult<String> {
    serde_json::to_string(fields).map_err(|err| StoreError::Encode(err.to_string()))
}
