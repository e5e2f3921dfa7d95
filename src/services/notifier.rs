use super::{Notifier, NotifyEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Posts pipeline events to `{base_url}/notify/<kind>` (the chat bot's webhook).
pub struct WebhookNotifier {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl WebhookNotifier {
    /// `None` disables delivery entirely.
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotifyEvent) -> Result<()> {
        let Some(base_url) = &self.base_url else {
            return Ok(());
        };
        let url = format!("{}/notify/{}", base_url, event.kind());

        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .context("Error calling bot webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        let notifier = WebhookNotifier::new(None);
        let event = NotifyEvent::PromptReady {
            id: 1,
            url: "u".to_string(),
            prompt_text: "p".to_string(),
        };
        assert!(notifier.notify(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_posts_comment_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify/comment"))
            .and(body_json(json!({ "id": 5, "url": "https://example.com/v/5", "llm_comment": "nice" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Some(format!("{}/", server.uri())));
        let event = NotifyEvent::CommentReady {
            id: 5,
            url: "https://example.com/v/5".to_string(),
            llm_comment: "nice".to_string(),
        };
        notifier.notify(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Some(server.uri()));
        let event = NotifyEvent::PromptReady {
            id: 1,
            url: "u".to_string(),
            prompt_text: "p".to_string(),
        };
        assert!(notifier.notify(&event).await.is_err());
    }
}
