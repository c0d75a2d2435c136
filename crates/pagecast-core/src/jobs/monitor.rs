//! Read-side monitoring over the job queue.
//!
//! The monitor only reads: progress reports, queue-wide statistics, and
//! completion estimates. Mutation (submission, cancellation) stays on
//! the queue itself.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::progress::{JobState, ProgressStore};
use super::queue::UnitBoard;

/// Assumed wall time to analyze or narrate one page, used for
/// completion estimates.
const SECONDS_PER_PAGE: f64 = 30.0;

/// Progress of one job as reported to callers. Always well-formed:
/// unknown job ids yield `state == "unknown"` rather than an error.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgressReport {
    pub job_id: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    pub outstanding_units: usize,
}

/// Queue-wide counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStatistics {
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub active_units: usize,
}

/// Rough time-to-completion estimate for a running job.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionEstimate {
    pub job_id: String,
    pub units_remaining: f64,
    pub estimated_seconds: u64,
    pub estimated_completion: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JobMonitor {
    progress: ProgressStore,
    board: UnitBoard,
    inter_unit_delay: Duration,
}

impl JobMonitor {
    pub fn new(progress: ProgressStore, board: UnitBoard, inter_unit_delay: Duration) -> Self {
        Self {
            progress,
            board,
            inter_unit_delay,
        }
    }

    /// Report one job's progress.
    pub async fn job_progress(&self, job_id: &str) -> JobProgressReport {
        let outstanding_units = self.board.outstanding(job_id).await;
        let Some(snapshot) = self.progress.snapshot(job_id).await else {
            return JobProgressReport {
                job_id: job_id.to_string(),
                state: "unknown".to_string(),
                current: None,
                total: None,
                status: None,
                progress_percent: None,
                outstanding_units,
            };
        };

        let (state, current, total, status) = match &snapshot.state {
            JobState::Pending => ("pending", None, None, None),
            JobState::Progress {
                current,
                total,
                status,
            } => ("progress", Some(*current), Some(*total), Some(status.clone())),
            JobState::Success { .. } => ("success", None, None, None),
            JobState::Failure { error } => ("failure", None, None, Some(error.to_string())),
        };

        JobProgressReport {
            job_id: job_id.to_string(),
            state: state.to_string(),
            current,
            total,
            status,
            progress_percent: snapshot.progress_percent,
            outstanding_units,
        }
    }

    /// Counts across every job the store still remembers.
    pub async fn statistics(&self) -> QueueStatistics {
        let mut stats = QueueStatistics {
            active_units: self.board.active_units().await.len(),
            ..Default::default()
        };
        for snapshot in self.progress.all_snapshots().await {
            match snapshot.state {
                JobState::Pending => stats.pending += 1,
                JobState::Progress { .. } => stats.in_progress += 1,
                JobState::Success { .. } => stats.succeeded += 1,
                JobState::Failure { .. } => stats.failed += 1,
            }
        }
        stats
    }

    /// Estimate when a running job will finish, assuming a fixed cost
    /// per remaining unit plus the configured pacing delay. Terminal and
    /// unknown jobs have no estimate.
    pub async fn estimate_completion(&self, job_id: &str) -> Option<CompletionEstimate> {
        let snapshot = self.progress.snapshot(job_id).await?;
        let (current, total) = match snapshot.state {
            JobState::Progress { current, total, .. } => (current, total),
            JobState::Pending => (0.0, self.board.outstanding(job_id).await as u32),
            _ => return None,
        };
        if total == 0 {
            return None;
        }

        let units_remaining = (total as f64 - current).max(0.0);
        let per_unit = SECONDS_PER_PAGE + self.inter_unit_delay.as_secs_f64();
        let estimated_seconds = (units_remaining * per_unit).ceil() as u64;

        Some(CompletionEstimate {
            job_id: job_id.to_string(),
            units_remaining,
            estimated_seconds,
            estimated_completion: Utc::now() + chrono::Duration::seconds(estimated_seconds as i64),
        })
    }
}
