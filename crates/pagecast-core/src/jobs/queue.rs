//! Job queue: submission, dispatch, cancellation.
//!
//! Each submission runs as one spawned task guarded by a cancellation
//! token. Units of work (pages, audio steps) are tracked on a unit board
//! keyed by job id, so cancellation and activity listings use an
//! explicit index instead of inspecting task internals.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::progress::{ProgressStore, StatusSnapshot};
use super::{audio, document, JobKind, JobRequest};
use crate::config::PipelineConfig;
use crate::error::JobError;
use crate::services::{
    DocumentStore, GenerationService, ObjectStorage, ResultsSink, SpeechService,
};

/// Injected handles for every external collaborator a job can touch.
#[derive(Clone)]
pub struct Services {
    pub generation: Arc<dyn GenerationService>,
    pub speech: Arc<dyn SpeechService>,
    pub documents: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub sink: Arc<dyn ResultsSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    Queued,
    Running,
}

/// One queued or in-flight unit of work, as listed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveUnit {
    pub job_id: String,
    pub unit: String,
    pub phase: UnitPhase,
}

#[derive(Debug)]
struct UnitEntry {
    unit: String,
    phase: UnitPhase,
}

/// Structured index of pending/in-flight units, keyed by job id.
#[derive(Clone, Default)]
pub struct UnitBoard {
    inner: Arc<RwLock<HashMap<String, Vec<UnitEntry>>>>,
}

impl UnitBoard {
    /// Register units for a job as queued.
    pub async fn enqueue(&self, job_id: &str, units: impl IntoIterator<Item = String>) {
        let mut board = self.inner.write().await;
        let entries = board.entry(job_id.to_string()).or_default();
        for unit in units {
            entries.push(UnitEntry {
                unit,
                phase: UnitPhase::Queued,
            });
        }
    }

    /// Mark one unit as running.
    pub async fn start(&self, job_id: &str, unit: &str) {
        let mut board = self.inner.write().await;
        if let Some(entries) = board.get_mut(job_id) {
            if let Some(entry) = entries.iter_mut().find(|e| e.unit == unit) {
                entry.phase = UnitPhase::Running;
            }
        }
    }

    /// Remove one finished unit.
    pub async fn finish(&self, job_id: &str, unit: &str) {
        let mut board = self.inner.write().await;
        if let Some(entries) = board.get_mut(job_id) {
            entries.retain(|e| e.unit != unit);
            if entries.is_empty() {
                board.remove(job_id);
            }
        }
    }

    /// Remove every unit belonging to a job, returning how many were
    /// still queued or running. Unknown job ids yield zero.
    pub async fn cancel_job(&self, job_id: &str) -> usize {
        let mut board = self.inner.write().await;
        board.remove(job_id).map(|entries| entries.len()).unwrap_or(0)
    }

    /// How many units a job still has outstanding.
    pub async fn outstanding(&self, job_id: &str) -> usize {
        let board = self.inner.read().await;
        board.get(job_id).map(|e| e.len()).unwrap_or(0)
    }

    pub async fn active_units(&self) -> Vec<ActiveUnit> {
        let board = self.inner.read().await;
        let mut units: Vec<ActiveUnit> = board
            .iter()
            .flat_map(|(job_id, entries)| {
                entries.iter().map(|entry| ActiveUnit {
                    job_id: job_id.clone(),
                    unit: entry.unit.clone(),
                    phase: entry.phase,
                })
            })
            .collect();
        units.sort_by(|a, b| (&a.job_id, &a.unit).cmp(&(&b.job_id, &b.unit)));
        units
    }
}

/// Everything a job runner needs, cloned into its task.
#[derive(Clone)]
pub struct JobContext {
    pub services: Services,
    pub pipeline: PipelineConfig,
    pub progress: ProgressStore,
    pub board: UnitBoard,
}

/// The in-process job queue.
#[derive(Clone)]
pub struct JobQueue {
    context: JobContext,
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl JobQueue {
    pub fn new(services: Services, pipeline: PipelineConfig) -> Self {
        Self {
            context: JobContext {
                services,
                pipeline,
                progress: ProgressStore::new(),
                board: UnitBoard::default(),
            },
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.context.progress
    }

    pub fn board(&self) -> &UnitBoard {
        &self.context.board
    }

    /// Read-side monitor over this queue's progress store and unit board.
    pub fn monitor(&self) -> super::monitor::JobMonitor {
        super::monitor::JobMonitor::new(
            self.context.progress.clone(),
            self.context.board.clone(),
            self.context.pipeline.inter_page_delay,
        )
    }

    /// Validate and enqueue a job. Invalid submissions are rejected
    /// synchronously; valid ones run on a spawned task and report their
    /// outcome through the progress store.
    pub async fn submit(&self, request: JobRequest) -> Result<String, JobError> {
        let kind = request.validate()?;
        let job_id = request.job_id.clone();

        self.context.progress.create(&job_id).await;
        self.context
            .board
            .enqueue(&job_id, unit_labels(kind, &request))
            .await;

        let token = CancellationToken::new();
        {
            let mut tokens = self.tokens.write().await;
            tokens.insert(job_id.clone(), token.clone());
        }

        info!(job_id = %job_id, kind = ?kind, "job submitted");

        let context = self.context.clone();
        let tokens = Arc::clone(&self.tokens);
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    warn!(job_id = %task_job_id, "job cancelled while running");
                    context.progress.fail(&task_job_id, JobError::Cancelled).await;
                }
                _ = run_job(&context, kind, request) => {}
            }
            context.board.cancel_job(&task_job_id).await;
            let mut tokens = tokens.write().await;
            tokens.remove(&task_job_id);
        });

        Ok(job_id)
    }

    /// Cancel a job: stop its task, drop its queued units, and mark it
    /// FAILURE(cancelled) unless it already finished. Returns the number
    /// of units terminated; an unknown job id returns zero.
    pub async fn cancel(&self, job_id: &str) -> usize {
        let token = {
            let mut tokens = self.tokens.write().await;
            tokens.remove(job_id)
        };

        let terminated = self.context.board.cancel_job(job_id).await;

        match token {
            Some(token) => {
                token.cancel();
                if !self.context.progress.is_terminal(job_id).await {
                    self.context
                        .progress
                        .fail(job_id, JobError::Cancelled)
                        .await;
                }
                info!(job_id, terminated, "job cancelled");
            }
            None => {
                info!(job_id, "cancel requested for unknown job");
            }
        }
        terminated
    }

    pub async fn status(&self, job_id: &str) -> Option<StatusSnapshot> {
        self.context.progress.snapshot(job_id).await
    }

    pub async fn list_active(&self) -> Vec<ActiveUnit> {
        self.context.board.active_units().await
    }

    /// Background sweeper that expires finished jobs past the retention
    /// window. Runs until the handle is aborted.
    pub fn spawn_retention_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let progress = self.context.progress.clone();
        let retention = self.context.pipeline.retention;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tick.tick().await;
                progress.sweep_expired(retention).await;
            }
        })
    }
}

async fn run_job(context: &JobContext, kind: JobKind, request: JobRequest) {
    match kind {
        JobKind::DocumentAnalysis => document::run(context, request).await,
        JobKind::AudioGeneration | JobKind::ReadingAudioGeneration => {
            audio::run(context, request, kind).await
        }
    }
}

/// Units registered at submission time: one per effective page for
/// analysis jobs, one synthesis unit for audio jobs (pages are not
/// known until the stored text is fetched).
fn unit_labels(kind: JobKind, request: &JobRequest) -> Vec<String> {
    match kind {
        JobKind::DocumentAnalysis => {
            if request.pages.is_empty() {
                vec!["text".to_string()]
            } else {
                request
                    .effective_pages()
                    .iter()
                    .map(|(n, _)| format!("page-{n}"))
                    .collect()
            }
        }
        JobKind::AudioGeneration | JobKind::ReadingAudioGeneration => vec!["audio".to_string()],
    }
}
