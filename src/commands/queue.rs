use super::require_id;
use crate::database::{Database, InsertOutcome, QueueRow};
use crate::error::AppError;
use serde::Serialize;
use url::Url;

// ============================================================================
// Intake
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueStatus {
    Accepted,
    Duplicate,
    Invalid,
}

/// Per-URL result of an enqueue request.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueOutcome {
    pub url: String,
    pub status: EnqueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Queue one or more source URLs. Each entry gets its own outcome; a
/// malformed entry or a failed insert does not reject the rest of the batch.
pub fn enqueue_urls(db: &Database, urls: &[String]) -> Result<Vec<EnqueueOutcome>, AppError> {
    if urls.is_empty() {
        return Err(AppError::Validation("No URLs provided".to_string()));
    }

    let mut outcomes = Vec::with_capacity(urls.len());
    for raw in urls {
        let url = raw.trim();
        if let Err(reason) = validate_url(url) {
            log::warn!("Rejected URL {:?}: {}", url, reason);
            outcomes.push(EnqueueOutcome {
                url: url.to_string(),
                status: EnqueueStatus::Invalid,
                id: None,
                reason: Some(reason),
            });
            continue;
        }

        let outcome = match db.insert_url(url) {
            Ok(InsertOutcome::Inserted(id)) => {
                log::info!("Queued {} as intake {}", url, id);
                EnqueueOutcome {
                    url: url.to_string(),
                    status: EnqueueStatus::Accepted,
                    id: Some(id),
                    reason: None,
                }
            }
            Ok(InsertOutcome::Duplicate) => EnqueueOutcome {
                url: url.to_string(),
                status: EnqueueStatus::Duplicate,
                id: None,
                reason: Some("already queued".to_string()),
            },
            // A store failure only costs this entry its slot in the batch
            Err(e) => {
                log::error!("Failed to queue {}: {:#}", url, e);
                EnqueueOutcome {
                    url: url.to_string(),
                    status: EnqueueStatus::Invalid,
                    id: None,
                    reason: Some(format!("could not be stored: {:#}", e)),
                }
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

pub(crate) fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("empty URL".to_string());
    }
    let parsed = Url::parse(url).map_err(|e| format!("malformed URL: {}", e))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        "http" | "https" => Err("URL has no host".to_string()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

// ============================================================================
// Queue listing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    PromptReady,
    LlmReady,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub intake_id: i64,
    pub comment_id: Option<i64>,
    pub url: String,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<QueueDetail>,
}

/// Stage flags and texts, only filled in verbose listings.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDetail {
    pub downloaded: bool,
    pub converted: bool,
    pub transcribed: bool,
    pub prompt_text: Option<String>,
    pub llm_comment: Option<String>,
}

fn present(text: &Option<String>) -> bool {
    text.as_deref().is_some_and(|t| !t.trim().is_empty())
}

fn status_of(row: &QueueRow) -> QueueStatus {
    if present(&row.llm_comment) {
        QueueStatus::LlmReady
    } else if present(&row.prompt_text) {
        QueueStatus::PromptReady
    } else {
        QueueStatus::Pending
    }
}

/// Unposted items in intake order. A `limit` of zero means no limit.
pub fn list_queue(
    db: &Database,
    limit: Option<usize>,
    verbose: bool,
) -> Result<Vec<QueueEntry>, AppError> {
    let rows = db.list_unposted(limit)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let status = status_of(&row);
            let detail = verbose.then(|| QueueDetail {
                downloaded: row.downloaded,
                converted: row.converted,
                transcribed: row.transcribed,
                prompt_text: row.prompt_text.clone(),
                llm_comment: row.llm_comment.clone(),
            });
            QueueEntry {
                intake_id: row.intake_id,
                comment_id: row.comment_id,
                url: row.url,
                status,
                detail,
            }
        })
        .collect())
}

/// Administrative removal of an intake record and its dependents.
pub fn remove_intake(db: &Database, intake_id: i64) -> Result<(), AppError> {
    require_id(intake_id, "Intake")?;
    if !db.delete_intake(intake_id)? {
        return Err(AppError::NotFound(format!("Intake {}", intake_id)));
    }
    log::info!("Removed intake {}", intake_id);
    Ok(())
}
