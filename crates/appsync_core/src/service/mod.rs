//! Use-case services between UI state and the backend collaborators.
//!
//! # Responsibility
//! - `SessionManager`: authenticated-session state over the identity provider.
//! - `DocumentSyncService`: live list mirrors and mutations over the
//!   document store.
//!
//! # Invariants
//! - Views never write the mirrored lists; all mutation goes through the
//!   services so the backend stays the single source of truth.

pub mod observable;
pub mod session_manager;
pub mod sync_service;
