//! Folder record.
//!
//! The owning user id lives only in the stored document (`uid`), never on
//! the local record; ownership is enforced by the fetch filter.

use crate::model::document::{
    Document, DocumentId, DocumentSnapshot, FieldValue, ParsedRecord, SkipReason,
};
use serde::{Deserialize, Serialize};

pub const FOLDER_NAME_FIELD: &str = "name";
pub const FOLDER_OWNER_FIELD: &str = "uid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: DocumentId,
    pub name: String,
}

impl Folder {
    pub fn new(id: impl Into<DocumentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Parses one snapshot document; only `name` is required.
    pub fn from_document(document: &DocumentSnapshot) -> ParsedRecord<Self> {
        let parsed: Result<Self, SkipReason> = document
            .require_str(FOLDER_NAME_FIELD)
            .map(|name| Self::new(document.id.clone(), name));
        ParsedRecord::from_result(&document.id, parsed)
    }

    /// Serializes the stored fields tagged with the owning user id.
    pub fn to_document(&self, owner_uid: &str) -> Document {
        Document::from([
            (
                FOLDER_NAME_FIELD.to_string(),
                FieldValue::String(self.name.clone()),
            ),
            (
                FOLDER_OWNER_FIELD.to_string(),
                FieldValue::String(owner_uid.to_string()),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::Folder;
    use crate::model::document::{DocumentSnapshot, FieldValue};

    #[test]
    fn document_carries_owner_but_record_does_not() {
        let fields = Folder::new("", "Work").to_document("user-1");
        assert_eq!(fields.get("uid"), Some(&FieldValue::from("user-1")));

        let parsed = Folder::from_document(&DocumentSnapshot::new("f1", fields))
            .into_record()
            .expect("folder should parse");
        assert_eq!(parsed, Folder::new("f1", "Work"));
    }

    #[test]
    fn name_of_wrong_kind_is_skipped() {
        let mut fields = Folder::new("", "Work").to_document("user-1");
        fields.insert("name".to_string(), FieldValue::Integer(3));
        assert!(Folder::from_document(&DocumentSnapshot::new("f1", fields)).is_skipped());
    }
}
