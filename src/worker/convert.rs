use super::{Stage, StageKind, WorkItem};
use crate::database::{Database, PendingConversion};
use crate::services::MediaConverter;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

impl WorkItem for PendingConversion {
    fn key(&self) -> i64 {
        self.intake_id
    }

    fn describe(&self) -> String {
        self.media_path.clone()
    }
}

/// Extracts audio from downloaded media.
pub struct ConvertStage {
    db: Arc<Database>,
    converter: Arc<dyn MediaConverter>,
}

impl ConvertStage {
    pub fn new(db: Arc<Database>, converter: Arc<dyn MediaConverter>) -> Self {
        Self { db, converter }
    }
}

#[async_trait]
impl Stage for ConvertStage {
    type Item = PendingConversion;

    fn kind(&self) -> StageKind {
        StageKind::Convert
    }

    fn next_eligible(&self, skip: &HashSet<i64>) -> Result<Option<PendingConversion>> {
        self.db.next_pending_conversion(skip)
    }

    async fn process(&self, item: PendingConversion) -> Result<()> {
        if item.transcript_id.is_none() {
            self.db.ensure_transcript(item.intake_id)?;
        }
        let audio_path = self.converter.convert(Path::new(&item.media_path)).await?;
        let audio_path = audio_path.to_string_lossy();
        self.db.mark_converted(item.intake_id, &audio_path)?;
        log::info!("Converted {} -> {}", item.media_path, audio_path);
        Ok(())
    }
}
