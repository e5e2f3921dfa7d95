use super::models::{CommentContext, CommentRecord};
use super::{flag, Database, NOW_ISO};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

const COMMENT_COLUMNS: &str = "c.id, c.url_id, c.prompt_text, c.llm_comment, c.is_generated, \
     c.is_posted, c.posted_by, c.posted_at, c.created_at, c.updated_at";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get(0)?,
        intake_id: row.get(1)?,
        prompt_text: row.get(2)?,
        llm_comment: row.get(3)?,
        generated: flag(row, 4)?,
        posted: flag(row, 5)?,
        posted_by: row.get(6)?,
        posted_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    /// Create the comment row for an intake record if needed and return its id.
    pub fn ensure_comment(&self, intake_id: i64) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO comments (url_id) VALUES (?)",
            params![intake_id],
        )?;
        let id = conn.query_row(
            "SELECT id FROM comments WHERE url_id = ?",
            params![intake_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn update_prompt(&self, intake_id: i64, prompt_text: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE comments SET prompt_text = ? WHERE url_id = ?",
            params![prompt_text, intake_id],
        )?;
        Ok(())
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM comments c WHERE c.id = ?", COMMENT_COLUMNS);
        let record = conn
            .query_row(&sql, params![id], comment_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn get_comment_by_intake(&self, intake_id: i64) -> Result<Option<CommentRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM comments c WHERE c.url_id = ?", COMMENT_COLUMNS);
        let record = conn
            .query_row(&sql, params![intake_id], comment_from_row)
            .optional()?;
        Ok(record)
    }

    /// Comment plus source URL and the local files it owns.
    pub fn get_comment_context(&self, id: i64) -> Result<Option<CommentContext>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"
            SELECT {}, u.url, u.media_path, t.audio_path
            FROM comments c
            JOIN urls u ON u.id = c.url_id
            LEFT JOIN transcripts t ON t.url_id = c.url_id
            WHERE c.id = ?
            "#,
            COMMENT_COLUMNS
        );
        let context = conn
            .query_row(&sql, params![id], |row| {
                Ok(CommentContext {
                    comment: comment_from_row(row)?,
                    url: row.get(10)?,
                    media_path: row.get(11)?,
                    audio_path: row.get(12)?,
                })
            })
            .optional()?;
        Ok(context)
    }

    pub fn update_llm_comment(&self, id: i64, llm_comment: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE comments SET llm_comment = ?, is_generated = 1 WHERE id = ?",
            params![llm_comment, id],
        )?;
        Ok(())
    }

    /// Mark a comment posted. Posting again re-stamps actor and time.
    /// Returns false when no comment has this id.
    pub fn mark_posted(&self, id: i64, posted_by: Option<&str>) -> Result<bool> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE comments SET is_posted = 1, posted_at = {}, posted_by = ? WHERE id = ?",
            NOW_ISO
        );
        let changes = conn.execute(&sql, params![posted_by, id])?;
        Ok(changes > 0)
    }
}
