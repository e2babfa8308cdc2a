//! Note record.
//!
//! # Responsibility
//! - Carry title/content/timestamp for one note and its backend id.
//! - Convert between `Note` and the backend document shape.
//!
//! # Invariants
//! - `id` is empty only before the first persist.
//! - `to_document()` always writes every field; updates are full overwrites.

use crate::model::document::{
    now_epoch_ms, Document, DocumentId, DocumentSnapshot, FieldValue, ParsedRecord, SkipReason,
};
use serde::{Deserialize, Serialize};

pub const NOTE_TITLE_FIELD: &str = "title";
pub const NOTE_CONTENT_FIELD: &str = "content";
pub const NOTE_TIMESTAMP_FIELD: &str = "timestamp";

/// One note as mirrored from a notes collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Backend document id; empty before the first persist.
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    /// Creation (or last top-level edit) time, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl Note {
    pub fn new(
        id: impl Into<DocumentId>,
        title: impl Into<String>,
        content: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            timestamp_ms,
        }
    }

    /// Creates an unsaved note stamped with the current time.
    pub fn draft(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(DocumentId::new(), title, content, now_epoch_ms())
    }

    /// Parses one snapshot document.
    ///
    /// Requires `title` and `content` strings and a `timestamp` value.
    pub fn from_document(document: &DocumentSnapshot) -> ParsedRecord<Self> {
        ParsedRecord::from_result(&document.id, Self::parse_fields(document))
    }

    fn parse_fields(document: &DocumentSnapshot) -> Result<Self, SkipReason> {
        let title = document.require_str(NOTE_TITLE_FIELD)?;
        let content = document.require_str(NOTE_CONTENT_FIELD)?;
        let timestamp_ms = document.require_timestamp(NOTE_TIMESTAMP_FIELD)?;
        Ok(Self::new(document.id.clone(), title, content, timestamp_ms))
    }

    /// Serializes the stored fields; the id is the document key, not a field.
    pub fn to_document(&self) -> Document {
        Document::from([
            (
                NOTE_TITLE_FIELD.to_string(),
                FieldValue::String(self.title.clone()),
            ),
            (
                NOTE_CONTENT_FIELD.to_string(),
                FieldValue::String(self.content.clone()),
            ),
            (
                NOTE_TIMESTAMP_FIELD.to_string(),
                FieldValue::Timestamp(self.timestamp_ms),
            ),
        ])
    }

    /// Returns an edited copy that keeps id and original timestamp.
    pub fn with_edits(&self, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(self.id.clone(), title, content, self.timestamp_ms)
    }

    /// Returns an edited copy that keeps id and refreshes the timestamp.
    pub fn touched(&self, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(self.id.clone(), title, content, now_epoch_ms())
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Plain-text payload handed to the platform share sheet.
    pub fn share_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.content)
    }
}
