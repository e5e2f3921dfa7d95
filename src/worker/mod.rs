//! Polling scheduler for the automatic pipeline stages.
//!
//! Each polled stage (download, convert, transcribe) runs its own interval
//! loop. On every tick a sweep pulls the next eligible row, processes it, and
//! repeats until nothing eligible is left. Stages only coordinate through the
//! flags stored in the database.

pub mod convert;
pub mod download;
pub mod transcribe;

use crate::database::Database;
use crate::services::Services;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub use convert::ConvertStage;
pub use download::DownloadStage;
pub use transcribe::TranscribeStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Download,
    Convert,
    Transcribe,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Convert => write!(f, "convert"),
            Self::Transcribe => write!(f, "transcribe"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Idle,
    Running,
}

/// A row a stage can act on.
pub trait WorkItem {
    /// Intake id; identifies the row across sweeps.
    fn key(&self) -> i64;
    /// Human context for log lines (URL or file path).
    fn describe(&self) -> String;
}

/// One polled pipeline stage: an eligibility query plus a processor.
#[async_trait]
pub trait Stage: Send + Sync {
    type Item: WorkItem + Send;

    fn kind(&self) -> StageKind;

    /// Oldest eligible row whose key is not in `skip`.
    fn next_eligible(&self, skip: &HashSet<i64>) -> Result<Option<Self::Item>>;

    /// Run the collaborator call and write the stage's completion flag.
    async fn process(&self, item: Self::Item) -> Result<()>;
}

/// Outcome counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub failed: usize,
    /// Key that came back as eligible after being processed, ending the sweep.
    pub repeated: Option<i64>,
}

impl SweepReport {
    pub fn attempts(&self) -> usize {
        self.processed + self.failed
    }
}

/// Per-stage idle/running table shared by every stage loop.
#[derive(Debug, Default)]
pub struct Scheduler {
    stages: Mutex<HashMap<StageKind, StageState>>,
}

/// Holds a stage in `Running`; dropping it returns the stage to `Idle`.
pub struct SweepGuard<'a> {
    scheduler: &'a Scheduler,
    kind: StageKind,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.set_state(self.kind, StageState::Idle);
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: StageKind) -> StageState {
        let stages = self.stages.lock().unwrap_or_else(|p| p.into_inner());
        stages.get(&kind).copied().unwrap_or_default()
    }

    fn set_state(&self, kind: StageKind, state: StageState) {
        let mut stages = self.stages.lock().unwrap_or_else(|p| p.into_inner());
        stages.insert(kind, state);
    }

    /// Move `kind` from idle to running. `None` if a sweep is already running.
    pub fn try_begin(&self, kind: StageKind) -> Option<SweepGuard<'_>> {
        let mut stages = self.stages.lock().unwrap_or_else(|p| p.into_inner());
        let state = stages.entry(kind).or_default();
        if *state == StageState::Running {
            return None;
        }
        *state = StageState::Running;
        Some(SweepGuard {
            scheduler: self,
            kind,
        })
    }

    /// Run one sweep of `stage`. Returns `None` when a sweep of the same
    /// stage is already in progress.
    ///
    /// A failed row is excluded from the rest of the sweep so the next row
    /// in FIFO order still gets its turn. A row that succeeded but is
    /// returned again ends the sweep instead of spinning on it.
    pub async fn sweep<S: Stage>(&self, stage: &S) -> Option<SweepReport> {
        let kind = stage.kind();
        let Some(_guard) = self.try_begin(kind) else {
            log::debug!("{} sweep already running, skipping tick", kind);
            return None;
        };

        let mut report = SweepReport::default();
        let mut seen: HashSet<i64> = HashSet::new();
        let mut failed: HashSet<i64> = HashSet::new();

        loop {
            let item = match stage.next_eligible(&failed) {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    log::error!("{} stage: failed to query next eligible row: {:#}", kind, e);
                    break;
                }
            };

            let key = item.key();
            if !seen.insert(key) {
                log::warn!(
                    "{} stage: intake {} is still eligible after processing, ending sweep",
                    kind,
                    key
                );
                report.repeated = Some(key);
                break;
            }

            let context = item.describe();
            match stage.process(item).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    log::error!(
                        "{} stage failed for intake {} ({}): {:#}",
                        kind,
                        key,
                        context,
                        e
                    );
                    failed.insert(key);
                    report.failed += 1;
                }
            }
        }

        if report.attempts() > 0 {
            log::info!(
                "{} sweep finished: {} processed, {} failed",
                kind,
                report.processed,
                report.failed
            );
        }
        Some(report)
    }
}

/// Drive `stage` on a fixed interval until `cancel` fires. The first tick is
/// immediate. Each tick spawns a sweep; ticks that land while a sweep is
/// still running are rejected by the scheduler's state table. On cancel no
/// new sweep starts, and the loop returns only after in-flight sweeps finish.
pub fn spawn_stage<S>(
    scheduler: Arc<Scheduler>,
    stage: Arc<S>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: Stage + 'static,
{
    tokio::spawn(async move {
        let kind = stage.kind();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweeps: JoinSet<Option<SweepReport>> = JoinSet::new();
        log::info!("{} stage scheduled every {:?}", kind, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let scheduler = scheduler.clone();
                    let stage = stage.clone();
                    sweeps.spawn(async move { scheduler.sweep(stage.as_ref()).await });
                }
                Some(done) = sweeps.join_next(), if !sweeps.is_empty() => {
                    if let Err(e) = done {
                        log::error!("{} sweep task failed: {}", kind, e);
                    }
                }
            }
        }

        if !sweeps.is_empty() {
            log::info!("{} stage waiting for {} in-flight sweep(s)", kind, sweeps.len());
        }
        while let Some(done) = sweeps.join_next().await {
            if let Err(e) = done {
                log::error!("{} sweep task failed: {}", kind, e);
            }
        }
        log::info!("{} stage stopped", kind);
    })
}

/// Owns the three polled stages and the scheduler they share.
pub struct PipelineWorker {
    scheduler: Arc<Scheduler>,
    download: Arc<DownloadStage>,
    convert: Arc<ConvertStage>,
    transcribe: Arc<TranscribeStage>,
    interval: Duration,
}

impl PipelineWorker {
    pub fn new(db: Arc<Database>, services: &Services, interval: Duration) -> Self {
        Self {
            scheduler: Arc::new(Scheduler::new()),
            download: Arc::new(DownloadStage::new(db.clone(), services.downloader.clone())),
            convert: Arc::new(ConvertStage::new(db.clone(), services.converter.clone())),
            transcribe: Arc::new(TranscribeStage::new(
                db,
                services.transcriber.clone(),
                services.prompts.clone(),
                services.notifier.clone(),
            )),
            interval,
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    /// Start every stage loop and wait until they all stop.
    pub async fn run(&self, cancel: CancellationToken) {
        log::info!("Pipeline worker started");

        let handles = vec![
            spawn_stage(
                self.scheduler.clone(),
                self.download.clone(),
                self.interval,
                cancel.clone(),
            ),
            spawn_stage(
                self.scheduler.clone(),
                self.convert.clone(),
                self.interval,
                cancel.clone(),
            ),
            spawn_stage(
                self.scheduler.clone(),
                self.transcribe.clone(),
                self.interval,
                cancel.clone(),
            ),
        ];

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Stage loop ended abnormally: {}", e);
            }
        }

        log::info!("Pipeline worker stopped");
    }
}
