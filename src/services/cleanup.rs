//! Removal of local media once an item has been posted.

use anyhow::Result;
use std::io::ErrorKind;
use std::path::Path;

/// Delete `path`. A file that is already gone is not an error: it logs a
/// warning and returns `Ok(false)`.
pub async fn delete_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::info!("Deleted media file {:?}", path);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("Media file already removed {:?}", path);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Best-effort cleanup of every present path. Failures are logged, never
/// returned. Returns how many files were actually deleted.
pub async fn cleanup_media_files(paths: &[Option<&str>]) -> usize {
    let mut deleted = 0;
    for path in paths.iter().flatten().filter(|p| !p.is_empty()) {
        match delete_if_exists(Path::new(path)).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => log::error!("Failed to delete media file {:?}: {:#}", path, e),
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_delete_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        assert!(delete_if_exists(&path).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.wav");
        assert!(!delete_if_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_counts_only_deleted_files() {
        let temp = TempDir::new().unwrap();
        let video = temp.path().join("a.mp4");
        std::fs::write(&video, b"v").unwrap();
        let missing = temp.path().join("a.wav");

        let deleted = cleanup_media_files(&[
            Some(video.to_str().unwrap()),
            Some(missing.to_str().unwrap()),
            None,
        ])
        .await;
        assert_eq!(deleted, 1);
        assert!(!video.exists());
    }
}
