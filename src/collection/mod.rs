//! Note collection access and the query resolver.
//!
//! The pipeline never touches the collection file directly; it goes through
//! the [`NoteStore`] trait so tests (and other storage backends) can supply
//! their own notes.
//!
//! * [`NoteStore`]: search + note lookup, object-safe and `Send + Sync`.
//! * [`AnkiCollection`]: read-only reader for the SQLite collection file.
//! * [`resolve_field_values`]: search expression + field name → values.
//! * [`search`]: the search-expression grammar and its SQL compiler.

pub mod search;
pub mod sqlite;

pub use search::{parse as parse_search, CardState, Node, SearchError, SearchTerm};
pub use sqlite::AnkiCollection;

use thiserror::Error;

/// Row id of a note.
pub type NoteId = i64;

// ---------------------------------------------------------------------------
// CollectionError
// ---------------------------------------------------------------------------

/// Errors raised while reading notes.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The collection file does not exist.
    #[error("collection not found: {0}")]
    NotFound(String),

    /// The file is SQLite but not a collection layout this reader knows.
    #[error("unsupported collection schema: {0}")]
    UnsupportedSchema(String),

    /// The search expression did not parse.
    #[error("invalid search: {0}")]
    Search(#[from] SearchError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("note {0} not found")]
    NoteNotFound(NoteId),

    /// A matched note's type has no field with the requested name.
    #[error("field {field:?} does not exist on note type {notetype:?}")]
    UnknownField { field: String, notetype: String },

    /// A previous panic poisoned the connection lock.
    #[error("collection lock poisoned")]
    Poisoned,
}

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

/// A note with its type name and ordered `(field name, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: NoteId,
    pub notetype: String,
    pub fields: Vec<(String, String)>,
}

impl Note {
    /// Value of the field called exactly `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

// ---------------------------------------------------------------------------
// NoteStore trait
// ---------------------------------------------------------------------------

/// Read access to a collection of notes.
///
/// Implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn NoteStore>` with the pipeline task.  Calls may block; async
/// callers should run them on `spawn_blocking`.
pub trait NoteStore: Send + Sync {
    /// Ids of every note with at least one card matching `query`, ordered by
    /// the first matching card.
    fn search_notes(&self, query: &str) -> Result<Vec<NoteId>, CollectionError>;

    /// Load a single note.
    fn note(&self, id: NoteId) -> Result<Note, CollectionError>;
}

// Compile-time assertion: Box<dyn NoteStore> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn NoteStore>) {}
};

// ---------------------------------------------------------------------------
// Query resolver
// ---------------------------------------------------------------------------

/// Resolve `query` and read `field` from every matching note, in order.
///
/// No matches is not an error: the result is simply empty.  A matched note
/// whose type lacks `field` aborts with [`CollectionError::UnknownField`].
pub fn resolve_field_values(
    store: &dyn NoteStore,
    query: &str,
    field: &str,
) -> Result<Vec<String>, CollectionError> {
    let ids = store.search_notes(query)?;
    log::debug!("collection: {:?} matched {} notes", query, ids.len());

    ids.into_iter()
        .map(|id| {
            let note = store.note(id)?;
            note.field(field)
                .map(str::to_string)
                .ok_or_else(|| CollectionError::UnknownField {
                    field: field.to_string(),
                    notetype: note.notetype.clone(),
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MockNoteStore  (test-only)
// ---------------------------------------------------------------------------

/// In-memory [`NoteStore`] for unit tests.
///
/// Every query returns all notes in insertion order, except the literal
/// query `"none"`, which matches nothing.
#[cfg(test)]
pub struct MockNoteStore {
    notes: Vec<Note>,
}

#[cfg(test)]
impl MockNoteStore {
    /// Notes of type `"Basic"` with a single field called `field`.
    pub fn with_field(field: &str, values: &[&str]) -> Self {
        let notes = values
            .iter()
            .enumerate()
            .map(|(i, value)| Note {
                id: i as NoteId + 1,
                notetype: "Basic".into(),
                fields: vec![(field.to_string(), value.to_string())],
            })
            .collect();
        Self { notes }
    }
}

#[cfg(test)]
impl NoteStore for MockNoteStore {
    fn search_notes(&self, query: &str) -> Result<Vec<NoteId>, CollectionError> {
        if query == "none" {
            return Ok(Vec::new());
        }
        Ok(self.notes.iter().map(|n| n.id).collect())
    }

    fn note(&self, id: NoteId) -> Result<Note, CollectionError> {
        self.notes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or(CollectionError::NoteNotFound(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
