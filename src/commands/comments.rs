use super::require_id;
use crate::database::Database;
use crate::error::AppError;
use crate::services::cleanup::cleanup_media_files;
use crate::services::{notify_best_effort, NotifyEvent, Services};
use serde::Serialize;

// ============================================================================
// Generate
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedComment {
    pub id: i64,
    pub url: String,
    pub llm_comment: String,
}

/// Turn a comment's prompt into generated text. The generator is never
/// called unless the prompt is already present.
pub async fn generate_comment(
    db: &Database,
    services: &Services,
    comment_id: i64,
) -> Result<GeneratedComment, AppError> {
    require_id(comment_id, "Comment")?;

    let context = db
        .get_comment_context(comment_id)?
        .ok_or_else(|| AppError::NotFound(format!("Comment {}", comment_id)))?;

    let prompt = context
        .comment
        .prompt_text
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::NotReady(format!("Comment {} has no prompt yet", comment_id)))?;

    log::info!("Generating comment {} ({})", comment_id, context.url);
    let llm_comment = services
        .generator
        .generate(prompt)
        .await
        .map_err(AppError::collaborator)?;

    db.update_llm_comment(comment_id, &llm_comment)?;

    notify_best_effort(
        services.notifier.as_ref(),
        NotifyEvent::CommentReady {
            id: comment_id,
            url: context.url.clone(),
            llm_comment: llm_comment.clone(),
        },
    )
    .await;

    Ok(GeneratedComment {
        id: comment_id,
        url: context.url,
        llm_comment,
    })
}

// ============================================================================
// Post
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PostedComment {
    pub id: i64,
    pub url: String,
    pub posted_by: Option<String>,
    /// Local files removed during cleanup.
    pub files_removed: usize,
}

/// Mark a comment posted and release its local media. Posting twice simply
/// re-stamps the actor and time. Cleanup problems never fail the call.
pub async fn mark_posted(
    db: &Database,
    comment_id: i64,
    actor: Option<&str>,
) -> Result<PostedComment, AppError> {
    require_id(comment_id, "Comment")?;
    let actor = actor.map(str::trim).filter(|a| !a.is_empty());

    let context = db
        .get_comment_context(comment_id)?
        .ok_or_else(|| AppError::NotFound(format!("Comment {}", comment_id)))?;

    if !db.mark_posted(comment_id, actor)? {
        return Err(AppError::NotFound(format!("Comment {}", comment_id)));
    }
    log::info!(
        "Comment {} marked posted by {}",
        comment_id,
        actor.unwrap_or("unknown")
    );

    let files_removed = cleanup_media_files(&[
        context.media_path.as_deref(),
        context.audio_path.as_deref(),
    ])
    .await;

    Ok(PostedComment {
        id: comment_id,
        url: context.url,
        posted_by: actor.map(str::to_string),
        files_removed,
    })
}
