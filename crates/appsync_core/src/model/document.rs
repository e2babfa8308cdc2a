//! Generic field-to-value document representation shared with the backend.
//!
//! # Invariants
//! - `CollectionPath` values are only built through typed constructors.
//! - Timestamps are Unix epoch milliseconds.

use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Backend-assigned opaque document identifier.
///
/// Empty only for records that were never persisted.
pub type DocumentId = String;

/// Field-to-value mapping of one stored document.
pub type Document = BTreeMap<String, FieldValue>;

const NOTES_COLLECTION: &str = "notes";
const FOLDERS_COLLECTION: &str = "folders";

/// Value of one document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    /// Backend-native point in time, Unix epoch milliseconds.
    Timestamp(i64),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp_ms(&self) -> Option<i64> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Short kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Total order used by ordered queries.
    ///
    /// Kinds rank `null < bool < number < timestamp < string`; integers and
    /// doubles compare numerically with each other.
    pub fn order_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(a), Self::Double(b)) => (*a as f64).total_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One document as delivered inside a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub fields: Document,
}

impl DocumentSnapshot {
    pub fn new(id: impl Into<DocumentId>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub(crate) fn require_str(&self, field: &'static str) -> Result<&str, SkipReason> {
        match self.fields.get(field) {
            None => Err(SkipReason::MissingField(field)),
            Some(value) => value.as_str().ok_or(SkipReason::WrongType {
                field,
                expected: "string",
                found: value.kind_name(),
            }),
        }
    }

    pub(crate) fn require_timestamp(&self, field: &'static str) -> Result<i64, SkipReason> {
        match self.fields.get(field) {
            None => Err(SkipReason::MissingField(field)),
            Some(value) => value.as_timestamp_ms().ok_or(SkipReason::WrongType {
                field,
                expected: "timestamp",
                found: value.kind_name(),
            }),
        }
    }
}

/// Addressing unit for queries and mutations.
///
/// Known shapes: `notes`, `folders`, `folders/{folderId}/notes`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Flat top-level notes collection.
    pub fn notes() -> Self {
        Self(NOTES_COLLECTION.to_string())
    }

    /// User-owned folders collection.
    pub fn folders() -> Self {
        Self(FOLDERS_COLLECTION.to_string())
    }

    /// Notes sub-collection nested under one folder document.
    pub fn folder_notes(folder_id: &str) -> Result<Self, ValidationError> {
        if folder_id.trim().is_empty() || folder_id.contains('/') {
            return Err(ValidationError::InvalidCollectionPath(format!(
                "{FOLDERS_COLLECTION}/{folder_id}/{NOTES_COLLECTION}"
            )));
        }
        Ok(Self(format!(
            "{FOLDERS_COLLECTION}/{folder_id}/{NOTES_COLLECTION}"
        )))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why one document could not be parsed into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
            Self::WrongType {
                field,
                expected,
                found,
            } => write!(f, "field `{field}` expected {expected}, found {found}"),
        }
    }
}

/// Outcome of parsing one document into a typed record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord<T> {
    Parsed(T),
    Skipped {
        document_id: DocumentId,
        reason: SkipReason,
    },
}

impl<T> ParsedRecord<T> {
    pub(crate) fn from_result(document_id: &str, result: Result<T, SkipReason>) -> Self {
        match result {
            Ok(record) => Self::Parsed(record),
            Err(reason) => Self::Skipped {
                document_id: document_id.to_string(),
                reason,
            },
        }
    }

    pub fn into_record(self) -> Option<T> {
        match self {
            Self::Parsed(record) => Some(record),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{CollectionPath, FieldValue};
    use std::cmp::Ordering;

    #[test]
    fn folder_notes_path_nests_under_folder() {
        let path = CollectionPath::folder_notes("f1").expect("valid folder id");
        assert_eq!(path.as_str(), "folders/f1/notes");
    }

    #[test]
    fn folder_notes_path_rejects_blank_or_nested_ids() {
        assert!(CollectionPath::folder_notes("  ").is_err());
        assert!(CollectionPath::folder_notes("a/b").is_err());
    }

    #[test]
    fn order_cmp_ranks_kinds_before_values() {
        assert_eq!(
            FieldValue::Timestamp(5).order_cmp(&FieldValue::from("a")),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Integer(2).order_cmp(&FieldValue::Double(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            FieldValue::Null.order_cmp(&FieldValue::Bool(false)),
            Ordering::Less
        );
    }

    #[test]
    fn field_value_json_shape_is_tagged() {
        let encoded = serde_json::to_string(&FieldValue::Timestamp(42)).expect("encode");
        assert_eq!(encoded, r#"{"kind":"timestamp","value":42}"#);
    }
}
