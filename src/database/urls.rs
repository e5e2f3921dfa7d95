use super::{flag, numeric_epoch, skip_clause, Database};
use super::models::{DownloadedMedia, InsertOutcome, IntakeRecord, PendingDownload, QueueRow};
use anyhow::Result;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashSet;

impl Database {
    // =========================================================================
    // Intake
    // =========================================================================

    /// Insert a URL unless it is already known. Duplicates are a no-op.
    pub fn insert_url(&self, url: &str) -> Result<InsertOutcome> {
        let conn = self.lock()?;
        let changes = conn.execute("INSERT OR IGNORE INTO urls (url) VALUES (?)", params![url])?;
        if changes > 0 {
            Ok(InsertOutcome::Inserted(conn.last_insert_rowid()))
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    pub fn get_intake(&self, id: i64) -> Result<Option<IntakeRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT id, url, is_downloaded, media_path, create_time, description,
                       author_handle, author_signature, created_at, updated_at
                FROM urls
                WHERE id = ?
                "#,
                params![id],
                |row| {
                    Ok(IntakeRecord {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        downloaded: flag(row, 2)?,
                        media_path: row.get(3)?,
                        create_time: numeric_epoch(row, 4)?,
                        description: row.get(5)?,
                        author_handle: row.get(6)?,
                        author_signature: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Administrative removal; transcript and comment rows go with it.
    pub fn delete_intake(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let changes = conn.execute("DELETE FROM urls WHERE id = ?", params![id])?;
        Ok(changes > 0)
    }

    // =========================================================================
    // Download stage
    // =========================================================================

    /// Oldest intake record that has not been downloaded yet.
    pub fn next_pending_download(&self, skip: &HashSet<i64>) -> Result<Option<PendingDownload>> {
        let (clause, ids) = skip_clause("id", skip);
        let sql = format!(
            "SELECT id, url FROM urls WHERE is_downloaded = 0{} ORDER BY id ASC LIMIT 1",
            clause
        );
        let conn = self.lock()?;
        let row = conn
            .query_row(&sql, params_from_iter(ids.iter()), |row| {
                Ok(PendingDownload {
                    intake_id: row.get(0)?,
                    url: row.get(1)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Record a finished download. Safe to apply more than once.
    pub fn mark_downloaded(&self, id: i64, media: &DownloadedMedia) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            UPDATE urls
               SET is_downloaded = 1,
                   media_path = ?,
                   create_time = ?,
                   description = ?,
                   author_handle = ?,
                   author_signature = ?
             WHERE id = ?
            "#,
            params![
                media.local_path,
                media.created_epoch,
                non_empty(&media.description),
                non_empty(&media.author_handle),
                non_empty(&media.author_signature),
                id
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Queue listing
    // =========================================================================

    /// Every intake record whose comment has not been posted, oldest first.
    pub fn list_unposted(&self, limit: Option<usize>) -> Result<Vec<QueueRow>> {
        let mut sql = String::from(
            r#"
            SELECT u.id, c.id, u.url, u.is_downloaded, t.is_converted, t.is_transcribed,
                   c.prompt_text, c.llm_comment
            FROM urls u
            LEFT JOIN transcripts t ON t.url_id = u.id
            LEFT JOIN comments c ON c.url_id = u.id
            WHERE c.id IS NULL OR c.is_posted = 0
            ORDER BY u.id ASC
            "#,
        );
        if let Some(limit) = limit.filter(|l| *l > 0) {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QueueRow {
                    intake_id: row.get(0)?,
                    comment_id: row.get(1)?,
                    url: row.get(2)?,
                    downloaded: flag(row, 3)?,
                    converted: flag(row, 4)?,
                    transcribed: flag(row, 5)?,
                    prompt_text: row.get(6)?,
                    llm_comment: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
