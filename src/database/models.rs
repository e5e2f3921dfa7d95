use serde::{Deserialize, Serialize};

/// Intake record: one submitted source URL and its downloaded asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub id: i64,
    pub url: String,
    pub downloaded: bool,
    pub media_path: Option<String>,
    /// Creation time reported by the source, in epoch seconds.
    pub create_time: Option<i64>,
    pub description: Option<String>,
    pub author_handle: Option<String>,
    pub author_signature: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: i64,
    pub intake_id: i64,
    pub converted: bool,
    pub audio_path: Option<String>,
    pub transcribed: bool,
    pub transcript_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: i64,
    pub intake_id: i64,
    pub prompt_text: Option<String>,
    pub llm_comment: Option<String>,
    pub generated: bool,
    pub posted: bool,
    pub posted_by: Option<String>,
    pub posted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// What the download stage writes back onto an intake record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadedMedia {
    pub local_path: String,
    pub description: Option<String>,
    pub author_handle: Option<String>,
    pub author_signature: Option<String>,
    pub created_epoch: Option<i64>,
}

/// Result of an insert-or-ignore on the unique URL column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub intake_id: i64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConversion {
    pub intake_id: i64,
    pub media_path: String,
    pub transcript_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTranscription {
    pub intake_id: i64,
    pub audio_path: String,
    pub url: String,
    pub description: Option<String>,
    pub author_handle: Option<String>,
    pub author_signature: Option<String>,
    pub create_time: Option<i64>,
    pub created_at: String,
}

/// A comment joined with the paths the post stage cleans up.
#[derive(Debug, Clone)]
pub struct CommentContext {
    pub comment: CommentRecord,
    pub url: String,
    pub media_path: Option<String>,
    pub audio_path: Option<String>,
}

/// One unfinished intake record with its stage flags.
#[derive(Debug, Clone)]
pub struct QueueRow {
    pub intake_id: i64,
    pub comment_id: Option<i64>,
    pub url: String,
    pub downloaded: bool,
    pub converted: bool,
    pub transcribed: bool,
    pub prompt_text: Option<String>,
    pub llm_comment: Option<String>,
}
