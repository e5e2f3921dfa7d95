use super::{flag, numeric_epoch, skip_clause, Database};
use super::models::{PendingConversion, PendingTranscription, TranscriptRecord};
use anyhow::Result;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashSet;

impl Database {
    /// Create the transcript row for an intake record if it does not exist yet.
    pub fn ensure_transcript(&self, intake_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO transcripts (url_id) VALUES (?)",
            params![intake_id],
        )?;
        Ok(())
    }

    pub fn get_transcript(&self, intake_id: i64) -> Result<Option<TranscriptRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT id, url_id, is_converted, audio_path, is_transcribed,
                       transcript_text, created_at, updated_at
                FROM transcripts
                WHERE url_id = ?
                "#,
                params![intake_id],
                |row| {
                    Ok(TranscriptRecord {
                        id: row.get(0)?,
                        intake_id: row.get(1)?,
                        converted: flag(row, 2)?,
                        audio_path: row.get(3)?,
                        transcribed: flag(row, 4)?,
                        transcript_text: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // =========================================================================
    // Convert stage
    // =========================================================================

    /// Oldest downloaded record with no transcript row yet, or one not converted.
    pub fn next_pending_conversion(&self, skip: &HashSet<i64>) -> Result<Option<PendingConversion>> {
        let (clause, ids) = skip_clause("u.id", skip);
        let sql = format!(
            r#"
            SELECT u.id, u.media_path, t.id
            FROM urls u
            LEFT JOIN transcripts t ON t.url_id = u.id
            WHERE u.is_downloaded = 1
              AND u.media_path IS NOT NULL
              AND (t.id IS NULL OR t.is_converted = 0){}
            ORDER BY u.id ASC
            LIMIT 1
            "#,
            clause
        );
        let conn = self.lock()?;
        let row = conn
            .query_row(&sql, params_from_iter(ids.iter()), |row| {
                Ok(PendingConversion {
                    intake_id: row.get(0)?,
                    media_path: row.get(1)?,
                    transcript_id: row.get(2)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn mark_converted(&self, intake_id: i64, audio_path: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE transcripts SET is_converted = 1, audio_path = ? WHERE url_id = ?",
            params![audio_path, intake_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Transcribe stage
    // =========================================================================

    /// Oldest converted transcript that has not been transcribed, with the
    /// source metadata the prompt needs.
    pub fn next_pending_transcription(
        &self,
        skip: &HashSet<i64>,
    ) -> Result<Option<PendingTranscription>> {
        let (clause, ids) = skip_clause("t.url_id", skip);
        let sql = format!(
            r#"
            SELECT t.url_id, t.audio_path, u.url, u.description, u.author_handle,
                   u.author_signature, u.create_time, u.created_at
            FROM transcripts t
            JOIN urls u ON u.id = t.url_id
            WHERE t.is_converted = 1
              AND t.audio_path IS NOT NULL
              AND t.is_transcribed = 0{}
            ORDER BY t.id ASC
            LIMIT 1
            "#,
            clause
        );
        let conn = self.lock()?;
        let row = conn
            .query_row(&sql, params_from_iter(ids.iter()), |row| {
                Ok(PendingTranscription {
                    intake_id: row.get(0)?,
                    audio_path: row.get(1)?,
                    url: row.get(2)?,
                    description: row.get(3)?,
                    author_handle: row.get(4)?,
                    author_signature: row.get(5)?,
                    create_time: numeric_epoch(row, 6)?,
                    created_at: row.get(7)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn mark_transcribed(&self, intake_id: i64, transcript_text: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE transcripts SET is_transcribed = 1, transcript_text = ? WHERE url_id = ?",
            params![transcript_text, intake_id],
        )?;
        Ok(())
    }
}
