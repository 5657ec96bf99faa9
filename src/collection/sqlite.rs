//! Read-only reader for the flashcard collection's SQLite file.
//!
//! Only the modern layout is supported: `notes`, `cards`, `decks`,
//! `notetypes` and `fields`.  Note fields are stored in `notes.flds` joined
//! by `\x1f`; their names live in `fields` keyed by `(ntid, ord)`.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::functions::FunctionFlags;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};

use super::search::{self, FieldMap, SqlWriter};
use super::{CollectionError, Note, NoteId, NoteStore};

/// Separator between field values in `notes.flds`.
const FIELD_SEPARATOR: char = '\x1f';

/// A collection file opened for reading.
///
/// rusqlite's `Connection` is not `Sync`, so it lives behind a `Mutex`.
pub struct AnkiCollection {
    conn: Mutex<Connection>,
}

impl AnkiCollection {
    /// Open the collection at `path` without write access.
    pub fn open(path: &Path) -> Result<Self, CollectionError> {
        if !path.is_file() {
            return Err(CollectionError::NotFound(path.display().to_string()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        log::info!("collection: opened {}", path.display());
        Self::from_connection(conn)
    }

    /// Wrap an existing connection after checking its layout.
    pub fn from_connection(conn: Connection) -> Result<Self, CollectionError> {
        let has_notetypes: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'notetypes'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if has_notetypes.is_none() {
            return Err(CollectionError::UnsupportedSchema(
                "missing notetypes table".into(),
            ));
        }

        conn.create_scalar_function(
            "field_at",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let flds: String = ctx.get(0)?;
                let ord: i64 = ctx.get(1)?;
                let value = split_fields(&flds)
                    .nth(usize::try_from(ord).unwrap_or(usize::MAX))
                    .unwrap_or_default()
                    .to_string();
                Ok(value)
            },
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CollectionError>,
    ) -> Result<T, CollectionError> {
        let conn = self.conn.lock().map_err(|_| CollectionError::Poisoned)?;
        f(&conn)
    }
}

fn split_fields(flds: &str) -> impl Iterator<Item = &str> {
    flds.split(FIELD_SEPARATOR)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Every field name in the collection, lower-cased, with the note types and
/// ordinals that use it.
fn load_field_map(conn: &Connection) -> Result<FieldMap, CollectionError> {
    let mut stmt = conn.prepare("SELECT ntid, ord, name FROM fields")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut map = FieldMap::new();
    for row in rows {
        let (ntid, ord, name) = row?;
        map.entry(name.to_lowercase()).or_default().push((ntid, ord));
    }
    Ok(map)
}

impl NoteStore for AnkiCollection {
    fn search_notes(&self, query: &str) -> Result<Vec<NoteId>, CollectionError> {
        let node = search::parse(query)?;

        self.with_conn(|conn| {
            let fields = load_field_map(conn)?;
            let (condition, params) = SqlWriter::new(&fields, now_ms()).write(&node);
            let sql = format!(
                "SELECT n.id FROM cards c JOIN notes n ON n.id = c.nid \
                 WHERE {condition} GROUP BY n.id ORDER BY MIN(c.id)"
            );
            log::debug!("collection: search sql={sql} params={}", params.len());

            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_from_iter(params), |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    fn note(&self, id: NoteId) -> Result<Note, CollectionError> {
        self.with_conn(|conn| {
            let row: Option<(i64, String, String)> = conn
                .query_row(
                    "SELECT n.mid, n.flds, nt.name FROM notes n \
                     JOIN notetypes nt ON nt.id = n.mid WHERE n.id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let (mid, flds, notetype) = row.ok_or(CollectionError::NoteNotFound(id))?;

            let mut stmt = conn.prepare("SELECT name FROM fields WHERE ntid = ?1 ORDER BY ord")?;
            let names = stmt
                .query_map([mid], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let fields = names
                .into_iter()
                .zip(split_fields(&flds).map(str::to_string))
                .collect();

            Ok(Note {
                id,
                notetype,
                fields,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
