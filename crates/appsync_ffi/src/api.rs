//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose session, subscription and note/folder use-cases to Dart via FRB.
//! - Apply caller-side input checks before reaching the core services.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every call goes through one process-wide `AppContext`.
//! - Failures come back as envelopes with `ok = false` and a message.

use appsync_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AppConfig, AppContext, Folder, FolderDraft, Note, NoteDraft, SubscriptionHandle,
};
use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;

const DB_FILE_NAME: &str = "appsync.sqlite3";
const DB_PATH_ENV: &str = "APPSYNC_DB_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static CONTEXT: OnceLock<Result<AppContext, String>> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Created document id, when the action created one.
    pub id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: None,
            message: message.into(),
        }
    }

    fn created(message: impl Into<String>, id: String) -> Self {
        Self {
            ok: true,
            id: Some(id),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            message: message.into(),
        }
    }
}

/// Response envelope for opening a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    pub ok: bool,
    /// Handle to pass back to `subscription_close`.
    pub handle: Option<u64>,
    pub message: String,
}

impl SubscriptionResponse {
    fn opened(handle: SubscriptionHandle) -> Self {
        Self {
            ok: true,
            handle: Some(handle.raw()),
            message: format!("subscription {handle} open"),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            handle: None,
            message: message.into(),
        }
    }
}

/// Signed-in user as shown by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserItem {
    pub user_id: String,
    pub email: String,
}

/// One row of the notes list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteItem {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
}

impl From<&Note> for NoteItem {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            timestamp_ms: note.timestamp_ms,
        }
    }
}

impl From<NoteItem> for Note {
    fn from(item: NoteItem) -> Self {
        Note::new(item.id, item.title, item.content, item.timestamp_ms)
    }
}

/// One row of the folders list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderItem {
    pub id: String,
    pub name: String,
}

/// Creates an account and signs in.
///
/// # FFI contract
/// - Sync call, DB-backed; password hashing may take tens of milliseconds.
/// - On failure the same message is also kept for `auth_last_error`.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_sign_up(username: String, email: String, password: String) -> ActionResponse {
    with_context(|ctx| match ctx.session().sign_up(&username, &email, &password) {
        Ok(()) => ActionResponse::success("signed up"),
        Err(err) => ActionResponse::failure(err.to_string()),
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn auth_log_in(email: String, password: String) -> ActionResponse {
    with_context(|ctx| match ctx.session().log_in(&email, &password) {
        Ok(()) => ActionResponse::success("logged in"),
        Err(err) => ActionResponse::failure(err.to_string()),
    })
}

/// Signs out; folder subscriptions of the previous user close with it.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_log_out() -> ActionResponse {
    with_context(|ctx| match ctx.log_out() {
        Ok(()) => ActionResponse::success("logged out"),
        Err(err) => ActionResponse::failure(err.to_string()),
    })
}

/// Returns the signed-in user, `None` while logged out.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_current_user() -> Option<UserItem> {
    context().ok()?.session().current_session().map(|session| UserItem {
        user_id: session.user_id,
        email: session.email,
    })
}

/// Most recent auth failure message; empty string when none.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_last_error() -> String {
    match context() {
        Ok(ctx) => ctx.session().last_error().unwrap_or_default(),
        Err(err) => err,
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn auth_clear_error() {
    if let Ok(ctx) = context() {
        ctx.session().clear_error();
    }
}

/// Opens the notes subscription: top-level notes, or one folder's notes
/// when `folder_id` is set.
///
/// # FFI contract
/// - Fails while another notes subscription is open; close it first.
#[flutter_rust_bridge::frb(sync)]
pub fn notes_open(folder_id: Option<String>) -> SubscriptionResponse {
    let ctx = match context() {
        Ok(ctx) => ctx,
        Err(err) => return SubscriptionResponse::failure(err),
    };
    let result = match folder_id {
        Some(folder_id) => ctx.sync().open_folder_notes(&Folder::new(folder_id, "")),
        None => ctx.sync().open_notes(),
    };
    match result {
        Ok(handle) => SubscriptionResponse::opened(handle),
        Err(err) => SubscriptionResponse::failure(err.to_string()),
    }
}

/// Opens the folders subscription for the signed-in user.
#[flutter_rust_bridge::frb(sync)]
pub fn folders_open() -> SubscriptionResponse {
    let ctx = match context() {
        Ok(ctx) => ctx,
        Err(err) => return SubscriptionResponse::failure(err),
    };
    match ctx.open_user_folders() {
        Ok(handle) => SubscriptionResponse::opened(handle),
        Err(err) => SubscriptionResponse::failure(err.to_string()),
    }
}

/// Closes a subscription and clears the list it fed.
#[flutter_rust_bridge::frb(sync)]
pub fn subscription_close(handle: u64) -> ActionResponse {
    with_context(
        |ctx| match ctx.sync().close(SubscriptionHandle::from_raw(handle)) {
            Ok(()) => ActionResponse::success("subscription closed"),
            Err(err) => ActionResponse::failure(err.to_string()),
        },
    )
}

/// Current notes list, ordered by timestamp ascending.
#[flutter_rust_bridge::frb(sync)]
pub fn notes_list() -> Vec<NoteItem> {
    match context() {
        Ok(ctx) => ctx.sync().notes().current().iter().map(NoteItem::from).collect(),
        Err(_) => Vec::new(),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn folders_list() -> Vec<FolderItem> {
    match context() {
        Ok(ctx) => ctx
            .sync()
            .folders()
            .current()
            .iter()
            .map(|folder| FolderItem {
                id: folder.id.clone(),
                name: folder.name.clone(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Creates a note, top-level or inside `folder_id`.
///
/// # FFI contract
/// - Empty title or content is rejected before reaching the store.
/// - The list updates through the open subscription, not this response.
#[flutter_rust_bridge::frb(sync)]
pub fn note_add(title: String, content: String, folder_id: Option<String>) -> ActionResponse {
    if let Err(err) = NoteDraft::new(title.as_str(), content.as_str()).validate() {
        return ActionResponse::failure(err.to_string());
    }
    with_context(|ctx| {
        let result = match folder_id {
            Some(folder_id) => {
                ctx.sync()
                    .add_note_in_folder(&title, &content, &Folder::new(folder_id, ""))
            }
            None => ctx.sync().add_note(&title, &content),
        };
        match result {
            Ok(id) => ActionResponse::created("note created", id),
            Err(err) => ActionResponse::failure(err.to_string()),
        }
    })
}

/// Saves edits to `note`.
///
/// Top-level edits refresh the timestamp; folder edits keep it.
#[flutter_rust_bridge::frb(sync)]
pub fn note_update(
    note: NoteItem,
    title: String,
    content: String,
    folder_id: Option<String>,
) -> ActionResponse {
    if let Err(err) = NoteDraft::new(title.as_str(), content.as_str()).validate() {
        return ActionResponse::failure(err.to_string());
    }
    let note = Note::from(note);
    with_context(|ctx| {
        let result = match folder_id {
            Some(folder_id) => ctx.sync().update_note_in_folder(
                &note.with_edits(title.as_str(), content.as_str()),
                &Folder::new(folder_id, ""),
            ),
            None => ctx
                .sync()
                .update_note(&note.touched(title.as_str(), content.as_str())),
        };
        match result {
            Ok(()) => ActionResponse::success("note updated"),
            Err(err) => ActionResponse::failure(err.to_string()),
        }
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_delete(note_id: String, folder_id: Option<String>) -> ActionResponse {
    with_context(|ctx| {
        let note = Note::new(note_id, "", "", 0);
        let result = match folder_id {
            Some(folder_id) => ctx
                .sync()
                .delete_note_in_folder(&note, &Folder::new(folder_id, "")),
            None => ctx.sync().delete_note(&note),
        };
        match result {
            Ok(()) => ActionResponse::success("note deleted"),
            Err(err) => ActionResponse::failure(err.to_string()),
        }
    })
}

/// Text handed to the platform share sheet.
#[flutter_rust_bridge::frb(sync)]
pub fn note_share_text(note: NoteItem) -> String {
    Note::from(note).share_text()
}

/// Creates a folder owned by the signed-in user.
#[flutter_rust_bridge::frb(sync)]
pub fn folder_add(name: String) -> ActionResponse {
    if let Err(err) = FolderDraft::new(name.as_str()).validate() {
        return ActionResponse::failure(err.to_string());
    }
    with_context(|ctx| {
        let Some(session) = ctx.session().current_session() else {
            return ActionResponse::failure("no signed-in user");
        };
        match ctx.sync().add_folder(&name, &session.user_id) {
            Ok(id) => ActionResponse::created("folder created", id),
            Err(err) => ActionResponse::failure(err.to_string()),
        }
    })
}

/// Deletes the folder document; its notes are left in place.
#[flutter_rust_bridge::frb(sync)]
pub fn folder_delete(folder_id: String) -> ActionResponse {
    with_context(
        |ctx| match ctx.sync().delete_folder(&Folder::new(folder_id, "")) {
            Ok(()) => ActionResponse::success("folder deleted"),
            Err(err) => ActionResponse::failure(err.to_string()),
        },
    )
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn context() -> Result<&'static AppContext, String> {
    CONTEXT
        .get_or_init(|| {
            let db_path = resolve_db_path();
            AppContext::open(AppConfig::file(db_path)).map_err(|err| {
                warn!("event=context_open module=ffi status=error error={err}");
                format!("app context init failed: {err}")
            })
        })
        .as_ref()
        .map_err(Clone::clone)
}

fn with_context(f: impl FnOnce(&AppContext) -> ActionResponse) -> ActionResponse {
    match context() {
        Ok(ctx) => f(ctx),
        Err(err) => ActionResponse::failure(err),
    }
}
