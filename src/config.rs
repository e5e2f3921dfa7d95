//! Runtime configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables (process environment first, then a `.env` file in the data
//! directory). `main.rs` picks the file with `--config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_JOB_INTERVAL_MS: u64 = 10_000;
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database_path: Option<PathBuf>,
    pub video_dir: Option<PathBuf>,
    pub audio_dir: Option<PathBuf>,
    pub prompt_file: Option<PathBuf>,
    /// Poll interval shared by the download, convert and transcribe stages.
    pub job_interval_ms: u64,
    pub ffmpeg_path: String,
    pub downloader: DownloaderConfig,
    pub transcription: TranscriptionConfig,
    pub llm: LlmConfig,
    /// Base URL of the notification webhook; `None` disables notifications.
    pub notify_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Metadata resolver queried as `GET {api_url}?url=<source url>`.
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model_id: String,
    /// `None` lets the service auto-detect the language.
    pub language_code: Option<String>,
    pub diarize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: None,
            video_dir: None,
            audio_dir: None,
            prompt_file: None,
            job_interval_ms: DEFAULT_JOB_INTERVAL_MS,
            ffmpeg_path: "ffmpeg".to_string(),
            downloader: DownloaderConfig::default(),
            transcription: TranscriptionConfig::default(),
            llm: LlmConfig::default(),
            notify_url: None,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/resolve".to_string(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1/speech-to-text".to_string(),
            api_key: None,
            model_id: "scribe_v1".to_string(),
            language_code: None,
            diarize: true,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("clipscribe"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Config {
    /// Load configuration from `path`, or from `<data dir>/config.yaml` when
    /// no path is given. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = default_data_dir().join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        let data_dir = config.data_dir.clone();
        config.apply_env(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| load_env_value(&data_dir, key))
        });
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        log::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply environment overrides using `lookup` for each known key.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = lookup("DOWNLOAD_JOB_INTERVAL_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.job_interval_ms = ms,
                _ => log::warn!("Ignoring invalid DOWNLOAD_JOB_INTERVAL_MS={:?}", ms),
            }
        }
        if let Some(v) = lookup("DOWNLOADER_API_URL") {
            self.downloader.api_url = v;
        }
        if let Some(v) = lookup("FFMPEG_PATH") {
            self.ffmpeg_path = v;
        }
        if let Some(v) = lookup("TRANSCRIPTION_BASE_URL") {
            self.transcription.base_url = v;
        }
        if let Some(v) = lookup("TRANSCRIPTION_API_KEY") {
            self.transcription.api_key = Some(v);
        }
        if let Some(v) = lookup("TRANSCRIPTION_MODEL_ID") {
            self.transcription.model_id = v;
        }
        if let Some(v) = lookup("TRANSCRIPTION_LANGUAGE_CODE") {
            self.transcription.language_code = Some(v);
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("NOTIFY_URL") {
            self.notify_url = Some(v);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("clipscribe.db"))
    }

    pub fn video_dir(&self) -> PathBuf {
        self.video_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("video"))
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.audio_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("audio"))
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.prompt_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("prompts.yaml"))
    }

    pub fn job_interval(&self) -> Duration {
        Duration::from_millis(self.job_interval_ms.max(1))
    }

    /// Create the data, video and audio directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.video_dir(), self.audio_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        if let Some(parent) = self.database_path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Load a value from the .env file in `dir` by key name
pub fn load_env_value(dir: &Path, key: &str) -> Option<String> {
    let env_path = dir.join(".env");
    let prefix = format!("{}=", key);
    let content = std::fs::read_to_string(&env_path).ok()?;
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(&prefix) {
            let value = rest.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.job_interval_ms, 10_000);
        assert_eq!(config.job_interval(), Duration::from_secs(10));
        assert!(config.notify_url.is_none());
        assert!(config.transcription.diarize);
    }

    #[test]
    fn test_paths_resolve_against_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/srv/clips"),
            ..Config::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/srv/clips/clipscribe.db"));
        assert_eq!(config.video_dir(), PathBuf::from("/srv/clips/video"));
        assert_eq!(config.audio_dir(), PathBuf::from("/srv/clips/audio"));
        assert_eq!(config.prompt_file(), PathBuf::from("/srv/clips/prompts.yaml"));
    }

    #[test]
    fn test_from_yaml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "data_dir: /tmp/clips\njob_interval_ms: 2500\nllm:\n  model: qwen2.5:7b\nnotify_url: http://bot:3100\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.job_interval_ms, 2500);
        assert_eq!(config.llm.model, "qwen2.5:7b");
        // Unspecified nested keys keep their defaults
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.notify_url.as_deref(), Some("http://bot:3100"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOWNLOAD_JOB_INTERVAL_MS", "500"),
            ("TRANSCRIPTION_API_KEY", "secret"),
            ("NOTIFY_URL", "http://localhost:3100"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.job_interval_ms, 500);
        assert_eq!(config.transcription.api_key.as_deref(), Some("secret"));
        assert_eq!(config.notify_url.as_deref(), Some("http://localhost:3100"));
    }

    #[test]
    fn test_invalid_interval_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|k| (k == "DOWNLOAD_JOB_INTERVAL_MS").then(|| "soon".to_string()));
        assert_eq!(config.job_interval_ms, DEFAULT_JOB_INTERVAL_MS);
    }

    #[test]
    fn test_load_env_value() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".env"),
            "# comment\nLLM_MODEL=\"mistral\"\nEMPTY=\n",
        )
        .unwrap();
        assert_eq!(load_env_value(temp.path(), "LLM_MODEL").as_deref(), Some("mistral"));
        assert_eq!(load_env_value(temp.path(), "EMPTY"), None);
        assert_eq!(load_env_value(temp.path(), "MISSING"), None);
    }
}
