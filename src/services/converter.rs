use super::MediaConverter;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Extracts a 16-bit PCM stereo WAV track with ffmpeg.
pub struct FfmpegConverter {
    ffmpeg_path: String,
    audio_dir: PathBuf,
}

impl FfmpegConverter {
    pub fn new(ffmpeg_path: &str, audio_dir: PathBuf) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            audio_dir,
        }
    }

    /// `<audio_dir>/<input stem>.wav`
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        self.audio_dir.join(format!("{}.wav", stem))
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf> {
        if !input.exists() {
            bail!("Source file not found: {:?}", input);
        }
        let output = self.output_path(input);

        log::info!("Running ffmpeg: {:?} -> {:?}", input, output);

        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.ffmpeg_path))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            bail!("ffmpeg exited with {}: {}", result.status, tail);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_uses_input_stem() {
        let converter = FfmpegConverter::new("ffmpeg", PathBuf::from("/data/audio"));
        assert_eq!(
            converter.output_path(Path::new("/data/video/alice_42.mp4")),
            PathBuf::from("/data/audio/alice_42.wav")
        );
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_spawning() {
        let temp = TempDir::new().unwrap();
        let converter = FfmpegConverter::new("/nonexistent/ffmpeg", temp.path().to_path_buf());
        let err = converter
            .convert(&temp.path().join("missing.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Source file not found"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("clip.mp4");
        std::fs::write(&input, b"not really a video").unwrap();

        let converter = FfmpegConverter::new("/nonexistent/ffmpeg", temp.path().to_path_buf());
        assert!(converter.convert(&input).await.is_err());
    }
}
