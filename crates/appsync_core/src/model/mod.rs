//! Entity models and the generic document representation.
//!
//! # Responsibility
//! - Define `Note` and `Folder` records used by services and the UI bridge.
//! - Parse records from, and serialize them to, backend documents.
//!
//! # Invariants
//! - Parsing never fails a whole snapshot: one bad document yields one
//!   `ParsedRecord::Skipped`.
//! - Records are immutable values; edits produce a new value with the same id.

pub mod document;
pub mod folder;
pub mod note;
pub mod validation;
