pub mod comments;
pub mod models;
pub mod transcripts;
pub mod urls;


use anyhow::{anyhow, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use models::*;

/// SQLite expression producing the ISO-8601 UTC timestamps stored in every table.
pub(crate) const NOW_ISO: &str = "STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL lets the CLI read while the pipeline process writes
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            -- Intake: one row per submitted source URL
            CREATE TABLE IF NOT EXISTS urls (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                url              TEXT NOT NULL UNIQUE,
                is_downloaded    INTEGER NOT NULL DEFAULT 0,
                media_path       TEXT,
                create_time      INTEGER,
                description      TEXT,
                author_handle    TEXT,
                author_signature TEXT,
                created_at       TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
                updated_at       TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now'))
            );

            CREATE TRIGGER IF NOT EXISTS trg_urls_updated_at
            AFTER UPDATE ON urls
            FOR EACH ROW
            BEGIN
                UPDATE urls
                   SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')
                 WHERE id = NEW.id;
            END;

            CREATE INDEX IF NOT EXISTS idx_urls_is_downloaded ON urls(is_downloaded);

            -- Conversion + speech-to-text, 1:1 with urls
            CREATE TABLE IF NOT EXISTS transcripts (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                url_id           INTEGER NOT NULL UNIQUE,
                is_converted     INTEGER NOT NULL DEFAULT 0,
                audio_path       TEXT,
                is_transcribed   INTEGER NOT NULL DEFAULT 0,
                transcript_text  TEXT,
                created_at       TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
                updated_at       TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
                FOREIGN KEY (url_id) REFERENCES urls(id) ON DELETE CASCADE
            );

            CREATE TRIGGER IF NOT EXISTS trg_transcripts_updated_at
            AFTER UPDATE ON transcripts
            FOR EACH ROW
            BEGIN
                UPDATE transcripts
                   SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')
                 WHERE id = NEW.id;
            END;

            CREATE INDEX IF NOT EXISTS idx_transcripts_converted ON transcripts(is_converted);
            CREATE INDEX IF NOT EXISTS idx_transcripts_transcribed ON transcripts(is_transcribed);

            -- Prompt + generated comment + posting, 1:1 with urls
            CREATE TABLE IF NOT EXISTS comments (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                url_id           INTEGER NOT NULL UNIQUE,
                prompt_text      TEXT,
                llm_comment      TEXT,
                is_generated     INTEGER NOT NULL DEFAULT 0,
                is_posted        INTEGER NOT NULL DEFAULT 0,
                posted_by        TEXT,
                posted_at        TEXT,
                created_at       TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
                updated_at       TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
                FOREIGN KEY (url_id) REFERENCES urls(id) ON DELETE CASCADE
            );

            CREATE TRIGGER IF NOT EXISTS trg_comments_updated_at
            AFTER UPDATE ON comments
            FOR EACH ROW
            BEGIN
                UPDATE comments
                   SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')
                 WHERE id = NEW.id;
            END;

            CREATE INDEX IF NOT EXISTS idx_comments_posted ON comments(is_posted);
            "#,
        )?;
        Ok(())
    }
}

/// Build an `AND <column> NOT IN (?, ?, ...)` clause for keys a sweep has
/// already given up on. Returns an empty clause for an empty set.
pub(crate) fn skip_clause(column: &str, skip: &HashSet<i64>) -> (String, Vec<i64>) {
    if skip.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut ids: Vec<i64> = skip.iter().copied().collect();
    ids.sort_unstable();
    let placeholders = vec!["?"; ids.len()].join(", ");
    (format!(" AND {} NOT IN ({})", column, placeholders), ids)
}

/// Read a creation epoch column. Only genuine numbers count; anything else
/// (text, blobs, NULL) is treated as absent rather than coerced.
pub(crate) fn numeric_epoch(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    })
}

pub(crate) fn flag(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) == 1)
}
