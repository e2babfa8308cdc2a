//! Local precondition checks that never reach the backend.
//!
//! The sync service itself does not validate; callers (UI bridge) run these
//! drafts before invoking a mutation.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Local precondition failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    PasswordTooShort { min_chars: usize },
    BlankField(&'static str),
    InvalidCollectionPath(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PasswordTooShort { min_chars } => {
                write!(f, "Password must be at least {min_chars} characters.")
            }
            Self::BlankField(field) => write!(f, "{field} must not be empty."),
            Self::InvalidCollectionPath(path) => write!(f, "invalid collection path `{path}`"),
        }
    }
}

impl Error for ValidationError {}

/// User input for a new or edited note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Requires non-empty title and content.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::BlankField("title"));
        }
        if self.content.is_empty() {
            return Err(ValidationError::BlankField("content"));
        }
        Ok(())
    }
}

/// User input for a new folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderDraft {
    pub name: String,
}

impl FolderDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::BlankField("name"));
        }
        Ok(())
    }
}

/// Checks the sign-up password length in characters.
pub fn validate_password(password: &str, min_chars: usize) -> Result<(), ValidationError> {
    if password.chars().count() < min_chars {
        return Err(ValidationError::PasswordTooShort { min_chars });
    }
    Ok(())
}
