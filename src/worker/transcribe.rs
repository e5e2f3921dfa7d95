use super::{Stage, StageKind, WorkItem};
use crate::database::{Database, PendingTranscription};
use crate::services::{notify_best_effort, Notifier, NotifyEvent, PromptRenderer, Transcriber};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

impl WorkItem for PendingTranscription {
    fn key(&self) -> i64 {
        self.intake_id
    }

    fn describe(&self) -> String {
        self.audio_path.clone()
    }
}

/// Transcribes converted audio and prepares the comment prompt.
pub struct TranscribeStage {
    db: Arc<Database>,
    transcriber: Arc<dyn Transcriber>,
    prompts: Arc<PromptRenderer>,
    notifier: Arc<dyn Notifier>,
}

impl TranscribeStage {
    pub fn new(
        db: Arc<Database>,
        transcriber: Arc<dyn Transcriber>,
        prompts: Arc<PromptRenderer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            transcriber,
            prompts,
            notifier,
        }
    }
}

#[async_trait]
impl Stage for TranscribeStage {
    type Item = PendingTranscription;

    fn kind(&self) -> StageKind {
        StageKind::Transcribe
    }

    fn next_eligible(&self, skip: &HashSet<i64>) -> Result<Option<PendingTranscription>> {
        self.db.next_pending_transcription(skip)
    }

    async fn process(&self, item: PendingTranscription) -> Result<()> {
        let transcript = self
            .transcriber
            .transcribe(Path::new(&item.audio_path))
            .await?;

        // The prompt is written before the transcribed flag so a row only
        // leaves this stage once its comment row is ready.
        let comment_id = self.db.ensure_comment(item.intake_id)?;
        let prompt = self.prompts.render(&prompt_vars(&item, &transcript));
        self.db.update_prompt(item.intake_id, &prompt)?;
        self.db.mark_transcribed(item.intake_id, &transcript)?;

        log::info!("Transcribed intake {} (comment {})", item.intake_id, comment_id);

        notify_best_effort(
            self.notifier.as_ref(),
            NotifyEvent::PromptReady {
                id: comment_id,
                url: item.url.clone(),
                prompt_text: prompt,
            },
        )
        .await;
        Ok(())
    }
}

/// Variables available to the prompt template.
pub fn prompt_vars(item: &PendingTranscription, transcript: &str) -> HashMap<&'static str, String> {
    let or_empty = |v: &Option<String>| v.clone().unwrap_or_default();
    HashMap::from([
        (
            "uploader_username",
            item.author_handle
                .clone()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        ),
        ("profile_signature", or_empty(&item.author_signature)),
        ("created_iso", created_iso(item.create_time, &item.created_at)),
        ("text", or_empty(&item.description)),
        ("transcript", transcript.to_string()),
    ])
}

/// ISO-8601 creation time: the source epoch when present, otherwise the
/// stored record timestamp, otherwise empty.
pub fn created_iso(create_time: Option<i64>, created_at: &str) -> String {
    create_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| created_at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_iso_from_epoch() {
        assert_eq!(
            created_iso(Some(1_700_000_000), "2024-01-01T00:00:00.000Z"),
            "2023-11-14T22:13:20.000Z"
        );
    }

    #[test]
    fn test_created_iso_falls_back_to_record_timestamp() {
        assert_eq!(
            created_iso(None, "2024-01-01T00:00:00.000Z"),
            "2024-01-01T00:00:00.000Z"
        );
        assert_eq!(created_iso(None, ""), "");
    }

    #[test]
    fn test_prompt_vars_defaults() {
        let item = PendingTranscription {
            intake_id: 1,
            audio_path: "/a.wav".to_string(),
            url: "https://example.com/v/1".to_string(),
            description: None,
            author_handle: None,
            author_signature: None,
            create_time: None,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
        };
        let vars = prompt_vars(&item, "hello");
        assert_eq!(vars["uploader_username"], "unknown");
        assert_eq!(vars["profile_signature"], "");
        assert_eq!(vars["text"], "");
        assert_eq!(vars["transcript"], "hello");
        assert_eq!(vars["created_iso"], "2024-01-01T00:00:00.000Z");
    }
}
