//! Job state tracking.
//!
//! The progress store is the single source of truth for job state. Jobs
//! write to it through the orchestrator; status queries read snapshots.
//! Terminal states are immutable: once a job reaches SUCCESS or FAILURE
//! no further writes take effect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::JobOutput;
use crate::error::JobError;

/// Lifecycle state of a job.
///
/// `Progress::current` is fractional because audio jobs report per-page
/// progress between two whole steps, e.g. `2.5 / 4`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobState {
    Pending,
    Progress {
        current: f64,
        total: u32,
        status: String,
    },
    Success {
        result: JobOutput,
    },
    Failure {
        error: JobError,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success { .. } | JobState::Failure { .. })
    }
}

/// What a status query returns. Always well-formed, even for jobs the
/// store has never heard of (the caller maps `None` to an unknown-job
/// response).
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub job_id: String,
    #[serde(flatten)]
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TrackedJob {
    state: JobState,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Shared in-memory job state store.
#[derive(Clone, Default)]
pub struct ProgressStore {
    inner: Arc<RwLock<HashMap<String, TrackedJob>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly submitted job as PENDING.
    pub async fn create(&self, job_id: &str) {
        let mut jobs = self.inner.write().await;
        jobs.insert(
            job_id.to_string(),
            TrackedJob {
                state: JobState::Pending,
                updated_at: Utc::now(),
                completed_at: None,
            },
        );
    }

    /// Publish a progress update. Ignored for unknown or terminal jobs.
    pub async fn report(&self, job_id: &str, current: f64, total: u32, status: &str) {
        let mut jobs = self.inner.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        if job.state.is_terminal() {
            warn!(job_id, "progress update for a finished job ignored");
            return;
        }
        debug!(job_id, current, total, status, "progress");
        job.state = JobState::Progress {
            current,
            total,
            status: status.to_string(),
        };
        job.updated_at = Utc::now();
    }

    /// Transition a job to SUCCESS. Ignored if already terminal.
    pub async fn complete(&self, job_id: &str, result: JobOutput) {
        self.finish(job_id, JobState::Success { result }).await;
    }

    /// Transition a job to FAILURE. Ignored if already terminal.
    pub async fn fail(&self, job_id: &str, error: JobError) {
        self.finish(job_id, JobState::Failure { error }).await;
    }

    async fn finish(&self, job_id: &str, terminal: JobState) {
        let mut jobs = self.inner.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            warn!(job_id, "terminal transition for unknown job ignored");
            return;
        };
        if job.state.is_terminal() {
            warn!(job_id, "job already finished, transition ignored");
            return;
        }
        let now = Utc::now();
        job.state = terminal;
        job.updated_at = now;
        job.completed_at = Some(now);
    }

    pub async fn snapshot(&self, job_id: &str) -> Option<StatusSnapshot> {
        let jobs = self.inner.read().await;
        jobs.get(job_id).map(|job| to_snapshot(job_id, job))
    }

    pub async fn all_snapshots(&self) -> Vec<StatusSnapshot> {
        let jobs = self.inner.read().await;
        jobs.iter().map(|(id, job)| to_snapshot(id, job)).collect()
    }

    /// Whether the job has reached SUCCESS or FAILURE.
    pub async fn is_terminal(&self, job_id: &str) -> bool {
        let jobs = self.inner.read().await;
        jobs.get(job_id).is_some_and(|job| job.state.is_terminal())
    }

    /// Drop finished jobs older than the retention window. Returns how
    /// many were removed.
    pub async fn sweep_expired(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut jobs = self.inner.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.completed_at {
            Some(done) => done > cutoff,
            None => true,
        });
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "expired finished jobs swept");
        }
        removed
    }
}

fn to_snapshot(job_id: &str, job: &TrackedJob) -> StatusSnapshot {
    let progress_percent = match &job.state {
        JobState::Pending => Some(0.0),
        JobState::Progress { current, total, .. } => {
            if *total == 0 {
                None
            } else {
                Some((current / *total as f64 * 100.0).clamp(0.0, 100.0))
            }
        }
        JobState::Success { .. } => Some(100.0),
        JobState::Failure { .. } => None,
    };
    StatusSnapshot {
        job_id: job_id.to_string(),
        state: job.state.clone(),
        progress_percent,
        updated_at: job.updated_at,
    }
}
