//! External collaborators the pipeline calls.
//!
//! Each collaborator sits behind a trait so stages can be driven by any
//! implementation; the shipped ones talk HTTP or spawn processes.

pub mod cleanup;
pub mod converter;
pub mod downloader;
pub mod notifier;
pub mod prompt;
pub mod transcriber;

use crate::config::Config;
use crate::database::DownloadedMedia;
use crate::ollama::OllamaClient;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use converter::FfmpegConverter;
pub use downloader::HttpDownloader;
pub use notifier::WebhookNotifier;
pub use prompt::PromptRenderer;
pub use transcriber::SpeechToTextClient;

/// URL -> local media file plus source metadata.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<DownloadedMedia>;
}

/// Media file -> audio file.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    async fn convert(&self, input: &Path) -> Result<PathBuf>;
}

/// Audio file -> transcript text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// Prompt -> generated comment.
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Outbound notification. Callers go through [`notify_best_effort`].
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotifyEvent) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NotifyEvent {
    PromptReady {
        id: i64,
        url: String,
        prompt_text: String,
    },
    CommentReady {
        id: i64,
        url: String,
        llm_comment: String,
    },
}

impl NotifyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyEvent::PromptReady { .. } => "prompt",
            NotifyEvent::CommentReady { .. } => "comment",
        }
    }
}

/// Send a notification, logging instead of returning any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, event: NotifyEvent) {
    if let Err(e) = notifier.notify(&event).await {
        log::error!("[Notification] Failed to notify {}: {:#}", event.kind(), e);
    }
}

/// Bundle of collaborators shared by the stages and the command surface.
#[derive(Clone)]
pub struct Services {
    pub downloader: Arc<dyn Downloader>,
    pub converter: Arc<dyn MediaConverter>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn CommentGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub prompts: Arc<PromptRenderer>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            downloader: Arc::new(HttpDownloader::new(
                &config.downloader.api_url,
                config.video_dir(),
            )?),
            converter: Arc::new(FfmpegConverter::new(&config.ffmpeg_path, config.audio_dir())),
            transcriber: Arc::new(SpeechToTextClient::new(config.transcription.clone())?),
            generator: Arc::new(OllamaClient::new(&config.llm.base_url, &config.llm.model)),
            notifier: Arc::new(WebhookNotifier::new(config.notify_url.clone())),
            prompts: Arc::new(PromptRenderer::load(&config.prompt_file())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &NotifyEvent) -> Result<()> {
            anyhow::bail!("bot offline")
        }
    }

    #[test]
    fn test_notify_event_payload_shape() {
        let event = NotifyEvent::PromptReady {
            id: 3,
            url: "https://example.com/v/3".to_string(),
            prompt_text: "hello".to_string(),
        };
        assert_eq!(event.kind(), "prompt");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["prompt_text"], "hello");
        assert!(json.get("PromptReady").is_none());
    }

    #[tokio::test]
    async fn test_notify_best_effort_swallows_errors() {
        let event = NotifyEvent::CommentReady {
            id: 1,
            url: "u".to_string(),
            llm_comment: "c".to_string(),
        };
        // Must return normally even though the notifier fails
        notify_best_effort(&FailingNotifier, event).await;
    }
}
