use super::Downloader;
use crate::database::DownloadedMedia;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const MAX_ATTEMPTS: usize = 3;

/// Resolves source metadata through an HTTP resolver and streams the media
/// file to `video_dir`.
///
/// The resolver is queried as `GET {api_url}?url=<source>` and must answer
/// `{ "status": "success", "result": { ... } }` where `result` carries
/// `id`, `desc`, `createTime`, `author { uniqueId, username, signature }`
/// and `video.downloadAddr`.
pub struct HttpDownloader {
    client: reqwest::Client,
    api_url: String,
    video_dir: PathBuf,
    backoff: Vec<Duration>,
}

impl HttpDownloader {
    pub fn new(api_url: &str, video_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            video_dir,
            backoff: vec![Duration::from_secs(2), Duration::from_secs(8)],
        })
    }

    /// Override the delays slept between failed attempts.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    async fn resolve(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("url", url)])
            .send()
            .await
            .context("Failed to reach metadata resolver")?;

        if !response.status().is_success() {
            bail!("Metadata resolver returned {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse metadata response")?;

        if body.get("status").and_then(Value::as_str) != Some("success") {
            bail!("Failed to retrieve video metadata");
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| anyhow!("Metadata response missing result"))
    }

    /// Download with streaming, removing partial files and retrying with backoff
    async fn download_with_retry(&self, source: &str, file_path: &Path) -> Result<u64> {
        for attempt in 0..MAX_ATTEMPTS {
            match self.try_download(source, file_path).await {
                Ok(size) => return Ok(size),
                Err(e) => {
                    let _ = tokio::fs::remove_file(file_path).await;

                    if attempt + 1 < MAX_ATTEMPTS {
                        let delay = self.backoff.get(attempt).copied().unwrap_or_default();
                        log::warn!(
                            "Download attempt {} failed, retrying in {:?}: {:#}",
                            attempt + 1,
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        return Err(e.context(format!(
                            "Download failed after {} attempts",
                            MAX_ATTEMPTS
                        )));
                    }
                }
            }
        }
        bail!("Download failed after {} attempts", MAX_ATTEMPTS)
    }

    /// Single download attempt with Content-Length validation
    async fn try_download(&self, source: &str, file_path: &Path) -> Result<u64> {
        log::info!("Downloading to: {:?}", file_path);

        let response = self
            .client
            .get(source)
            .send()
            .await
            .context("Failed to start download")?;

        if !response.status().is_success() {
            bail!("Unable to download video (status {})", response.status());
        }

        let content_length = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(file_path)
            .await
            .with_context(|| format!("Failed to create file {:?}", file_path))?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading download stream")?;
            file.write_all(&chunk).await.context("Failed to write chunk")?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await.context("Failed to flush file")?;

        if let Some(expected) = content_length {
            if downloaded != expected {
                bail!(
                    "Download incomplete: got {} bytes, expected {}",
                    downloaded,
                    expected
                );
            }
        }

        log::info!("Download complete: {} bytes", downloaded);
        Ok(downloaded)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<DownloadedMedia> {
        let info = self.resolve(url).await?;
        let source = resolve_download_url(&info)
            .ok_or_else(|| anyhow!("Download URL was not included in the metadata response"))?;

        let meta = metadata_from_info(&info);
        let handle = meta.author_handle.clone().unwrap_or_else(|| "unknown".to_string());
        let video_id = match info.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let file_name = format!("{}_{}.mp4", safe_file_stem(&handle), safe_file_stem(&video_id));
        let file_path = self.video_dir.join(file_name);

        self.download_with_retry(&source, &file_path).await?;

        Ok(DownloadedMedia {
            local_path: file_path.to_string_lossy().to_string(),
            ..meta
        })
    }
}

/// Pull description, author and creation epoch out of a metadata document.
///
/// The author handle prefers the unique id over the display username, and
/// the creation time is only kept when it is an actual JSON number.
pub fn metadata_from_info(info: &Value) -> DownloadedMedia {
    let text = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    };
    let author = info.get("author");

    DownloadedMedia {
        local_path: String::new(),
        description: text(info.get("desc")),
        author_handle: text(author.and_then(|a| a.get("uniqueId")))
            .or_else(|| text(author.and_then(|a| a.get("username")))),
        author_signature: text(author.and_then(|a| a.get("signature"))),
        created_epoch: numeric_epoch(info.get("createTime")),
    }
}

fn numeric_epoch(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        _ => None,
    }
}

/// `video.downloadAddr` may be a string, an object with `url`, or an array of either.
pub fn resolve_download_url(info: &Value) -> Option<String> {
    let addr = info.get("video")?.get("downloadAddr")?;
    let first = match addr {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match first {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn safe_file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_metadata_prefers_unique_id() {
        let info = json!({
            "desc": "a clip",
            "createTime": 1700000000,
            "author": { "uniqueId": "handle", "username": "Display Name", "signature": "bio" }
        });
        let meta = metadata_from_info(&info);
        assert_eq!(meta.author_handle.as_deref(), Some("handle"));
        assert_eq!(meta.author_signature.as_deref(), Some("bio"));
        assert_eq!(meta.description.as_deref(), Some("a clip"));
        assert_eq!(meta.created_epoch, Some(1_700_000_000));
    }

    #[test]
    fn test_metadata_falls_back_to_username() {
        let info = json!({ "author": { "username": "someone" } });
        assert_eq!(metadata_from_info(&info).author_handle.as_deref(), Some("someone"));
    }

    #[test]
    fn test_non_numeric_create_time_is_absent() {
        for value in [json!("1700000000"), json!(null), json!(true), json!({})] {
            let info = json!({ "createTime": value });
            assert_eq!(metadata_from_info(&info).created_epoch, None);
        }
        let info = json!({});
        assert_eq!(metadata_from_info(&info).created_epoch, None);
    }

    #[test]
    fn test_resolve_download_url_shapes() {
        let plain = json!({ "video": { "downloadAddr": "https://cdn/x.mp4" } });
        let object = json!({ "video": { "downloadAddr": { "url": "https://cdn/y.mp4" } } });
        let array = json!({ "video": { "downloadAddr": [{ "url": "https://cdn/z.mp4" }, "b"] } });
        let missing = json!({ "video": {} });

        assert_eq!(resolve_download_url(&plain).as_deref(), Some("https://cdn/x.mp4"));
        assert_eq!(resolve_download_url(&object).as_deref(), Some("https://cdn/y.mp4"));
        assert_eq!(resolve_download_url(&array).as_deref(), Some("https://cdn/z.mp4"));
        assert_eq!(resolve_download_url(&missing), None);
    }

    #[test]
    fn test_safe_file_stem() {
        assert_eq!(safe_file_stem("user.name/../x"), "user_name____x");
    }

    #[tokio::test]
    async fn test_download_writes_file_and_metadata() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/resolve"))
            .and(query_param("url", "https://example.com/v/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "result": {
                    "id": "42",
                    "desc": "hello",
                    "createTime": 1700000000,
                    "author": { "uniqueId": "alice", "signature": "sig" },
                    "video": { "downloadAddr": format!("{}/media/42.mp4", server.uri()) }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/42.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
            .mount(&server)
            .await;

        let downloader = HttpDownloader::new(
            &format!("{}/resolve", server.uri()),
            temp.path().to_path_buf(),
        )
        .unwrap()
        .with_backoff(vec![]);

        let media = downloader.download("https://example.com/v/1").await.unwrap();
        assert!(media.local_path.ends_with("alice_42.mp4"));
        assert_eq!(std::fs::read(&media.local_path).unwrap(), b"mp4-bytes");
        assert_eq!(media.author_handle.as_deref(), Some("alice"));
        assert_eq!(media.created_epoch, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_download_fails_when_resolver_rejects() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "error" })))
            .mount(&server)
            .await;

        let downloader = HttpDownloader::new(
            &format!("{}/resolve", server.uri()),
            temp.path().to_path_buf(),
        )
        .unwrap();

        assert!(downloader.download("https://example.com/v/404").await.is_err());
    }

    #[tokio::test]
    async fn test_download_retries_and_cleans_partial_file() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "result": {
                    "id": 7,
                    "video": { "downloadAddr": format!("{}/media/7.mp4", server.uri()) }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/7.mp4"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let downloader = HttpDownloader::new(
            &format!("{}/resolve", server.uri()),
            temp.path().to_path_buf(),
        )
        .unwrap()
        .with_backoff(vec![Duration::ZERO, Duration::ZERO]);

        let err = downloader.download("https://example.com/v/7").await.unwrap_err();
        assert!(format!("{:#}", err).contains("after 3 attempts"));
        assert!(!temp.path().join("unknown_7.mp4").exists());
    }
}
