use super::{Stage, StageKind, WorkItem};
use crate::database::{Database, PendingDownload};
use crate::services::Downloader;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

impl WorkItem for PendingDownload {
    fn key(&self) -> i64 {
        self.intake_id
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Fetches every intake record that has not been downloaded yet.
pub struct DownloadStage {
    db: Arc<Database>,
    downloader: Arc<dyn Downloader>,
}

impl DownloadStage {
    pub fn new(db: Arc<Database>, downloader: Arc<dyn Downloader>) -> Self {
        Self { db, downloader }
    }
}

#[async_trait]
impl Stage for DownloadStage {
    type Item = PendingDownload;

    fn kind(&self) -> StageKind {
        StageKind::Download
    }

    fn next_eligible(&self, skip: &HashSet<i64>) -> Result<Option<PendingDownload>> {
        self.db.next_pending_download(skip)
    }

    async fn process(&self, item: PendingDownload) -> Result<()> {
        let media = self.downloader.download(&item.url).await?;
        self.db.mark_downloaded(item.intake_id, &media)?;
        log::info!("Downloaded {} -> {}", item.url, media.local_path);
        Ok(())
    }
}
