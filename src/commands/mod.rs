//! Externally triggered operations: intake, queue listing, direct fetch,
//! comment generation and posting. Every command returns `AppError` so the
//! caller gets a machine-readable reason.

pub mod comments;
pub mod media;
pub mod queue;

pub use comments::{generate_comment, mark_posted, GeneratedComment, PostedComment};
pub use media::fetch_media;
pub use queue::{
    enqueue_urls, list_queue, remove_intake, EnqueueOutcome, EnqueueStatus, QueueEntry,
    QueueStatus,
};

use crate::error::AppError;

/// Ids handed in by callers must be positive before the store is queried.
pub(crate) fn require_id(id: i64, what: &str) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::Validation(format!("{} id must be positive", what)));
    }
    Ok(())
}
