use super::Transcriber;
use crate::config::TranscriptionConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Speech-to-text over a multipart HTTP API (ElevenLabs-compatible).
pub struct SpeechToTextClient {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

#[derive(Debug, Deserialize)]
struct SpeechToTextResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Word {
    #[serde(default)]
    pub word: Option<String>,
    /// Older responses use `text` for the token.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "speaker_id")]
    pub speaker: Option<Value>,
}

impl SpeechToTextClient {
    pub fn new(config: TranscriptionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(900))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Transcriber for SpeechToTextClient {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        if !audio.exists() {
            bail!("Audio file not found: {:?}", audio);
        }

        let bytes = tokio::fs::read(audio)
            .await
            .with_context(|| format!("Failed to read audio file {:?}", audio))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model_id", self.config.model_id.clone())
            .text("diarize", self.config.diarize.to_string());
        if let Some(lang) = self.config.language_code.as_ref().filter(|l| !l.is_empty()) {
            form = form.text("language_code", lang.clone());
        }

        let mut request = self
            .client
            .post(&self.config.base_url)
            .header("Accept", "application/json")
            .multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.header("xi-api-key", key);
        }

        log::info!(
            "Sending transcription request: model={}, file={:?}",
            self.config.model_id,
            audio
        );

        let response = request
            .send()
            .await
            .context("Failed to call transcription service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Transcription request failed ({}): {}", status, body);
        }

        let data: SpeechToTextResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        let text = data
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .context("Transcription response missing text")?;

        if !self.config.diarize {
            return Ok(text);
        }
        Ok(merge_speakers(&data.words).unwrap_or(text))
    }
}

/// Regroup diarized words into one `Speaker N: ...` line per speaker.
///
/// Returns `None` when there are no words or at most one distinct speaker,
/// in which case the plain transcript text should be used.
pub fn merge_speakers(words: &[Word]) -> Option<String> {
    let labelled: Vec<(SpeakerKey, &str)> = words
        .iter()
        .filter_map(|w| {
            let token = w.word.as_deref().or(w.text.as_deref())?;
            Some((SpeakerKey::from_value(w.speaker.as_ref()), token))
        })
        .collect();

    let distinct: BTreeSet<SpeakerKey> = words
        .iter()
        .filter(|w| w.speaker.as_ref().is_some_and(|s| !s.is_null()))
        .map(|w| SpeakerKey::from_value(w.speaker.as_ref()))
        .collect();
    if labelled.is_empty() || distinct.len() <= 1 {
        return None;
    }

    let mut by_speaker: BTreeMap<SpeakerKey, Vec<&str>> = BTreeMap::new();
    for (key, token) in labelled {
        by_speaker.entry(key).or_default().push(token);
    }

    // Tokens may already carry their own spacing, so collapse before tidying
    let (spaces, before_punct) = spacing_patterns();
    let lines: Vec<String> = by_speaker
        .into_iter()
        .map(|(key, tokens)| {
            let joined = spaces.replace_all(&tokens.join(" "), " ").to_string();
            let text = before_punct.replace_all(&joined, "$1").trim().to_string();
            format!("Speaker {}: {}", key.label, text)
        })
        .collect();
    Some(lines.join("\n"))
}

fn spacing_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"\s+").expect("whitespace pattern is valid"),
            Regex::new(r"\s+([,.!?;:])").expect("punctuation pattern is valid"),
        )
    })
}

/// Speakers sort numerically when their ids are numbers (or end in one,
/// like `speaker_1`), otherwise by label. Words without a speaker count
/// as speaker 0.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SpeakerKey {
    number: Option<i64>,
    label: String,
}

impl SpeakerKey {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => Self {
                number: n.as_i64(),
                label: n.to_string(),
            },
            Some(Value::String(s)) => {
                let digits: String = s
                    .chars()
                    .rev()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                let number = digits.parse::<i64>().ok();
                Self {
                    number,
                    label: number.map(|n| n.to_string()).unwrap_or_else(|| s.clone()),
                }
            }
            _ => Self {
                number: Some(0),
                label: "0".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn word(token: &str, speaker: Value) -> Word {
        Word {
            word: Some(token.to_string()),
            text: None,
            speaker: Some(speaker),
        }
    }

    #[test]
    fn test_single_speaker_keeps_plain_text() {
        let words = vec![word("hello", json!(0)), word("there", json!(0))];
        assert_eq!(merge_speakers(&words), None);
        assert_eq!(merge_speakers(&[]), None);
    }

    #[test]
    fn test_multiple_speakers_grouped_in_order() {
        let words = vec![
            word("hi", json!(1)),
            word("hello", json!(0)),
            word(",", json!(0)),
            word("friend", json!(0)),
            word("!", json!(1)),
        ];
        assert_eq!(
            merge_speakers(&words).unwrap(),
            "Speaker 0: hello, friend\nSpeaker 1: hi!"
        );
    }

    #[test]
    fn test_string_speaker_ids_sort_numerically() {
        let words = vec![
            word("ten", json!("speaker_10")),
            word("two", json!("speaker_2")),
        ];
        assert_eq!(
            merge_speakers(&words).unwrap(),
            "Speaker 2: two\nSpeaker 10: ten"
        );
    }

    #[test]
    fn test_merge_tidies_spacing_on_repeated_calls() {
        let words = vec![
            word("  so ", json!(0)),
            word("yes", json!(1)),
            word(" ?", json!(1)),
            word("fine", json!(0)),
        ];
        let expected = "Speaker 0: so fine\nSpeaker 1: yes?";
        assert_eq!(merge_speakers(&words).unwrap(), expected);
        assert_eq!(merge_speakers(&words).unwrap(), expected);
    }

    fn config(base_url: String, diarize: bool) -> TranscriptionConfig {
        TranscriptionConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            model_id: "scribe_v1".to_string(),
            language_code: None,
            diarize,
        }
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        let audio = temp.path().join("clip.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        Mock::given(method("POST"))
            .and(path("/v1/speech-to-text"))
            .and(header("xi-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "  hello world  ",
                "words": [{ "word": "hello", "speaker": 0 }, { "word": "world", "speaker": 0 }]
            })))
            .mount(&server)
            .await;

        let client =
            SpeechToTextClient::new(config(format!("{}/v1/speech-to-text", server.uri()), true))
                .unwrap();
        assert_eq!(client.transcribe(&audio).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_transcribe_non_success_fails() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        let audio = temp.path().join("clip.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = SpeechToTextClient::new(config(server.uri(), false)).unwrap();
        let err = client.transcribe(&audio).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_transcribe_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let client =
            SpeechToTextClient::new(config("http://127.0.0.1:9".to_string(), false)).unwrap();
        assert!(client.transcribe(&temp.path().join("none.wav")).await.is_err());
    }
}
