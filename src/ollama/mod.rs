//! Ollama integration for comment generation
//!
//! Calls the Ollama REST API to turn a rendered prompt into a comment.

use crate::services::CommentGenerator;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama client for making API calls
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Generate a completion from Ollama
    pub async fn generate_raw(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: system.map(|s| s.to_string()),
            stream: false,
            options: Some(GenerateOptions {
                temperature: 0.7,
                num_predict: 512,
            }),
        };

        log::info!(
            "Sending request to Ollama: model={}, prompt_len={}",
            self.model,
            prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to call Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Ollama returned {}: {}", status, body);
        }

        let result: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        log::info!(
            "Ollama response received: {} chars, eval_duration={:?}ms",
            result.response.len(),
            result.eval_duration.map(|d| d / 1_000_000)
        );

        Ok(result.response)
    }
}

#[async_trait]
impl CommentGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            bail!("Prompt text is empty");
        }
        let text = self.generate_raw(prompt, None).await?;
        Ok(text.trim().to_string())
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_duration: Option<u64>,
}
