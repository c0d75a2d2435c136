//! Job submission types and the orchestration runtime.

pub mod audio;
pub mod document;
pub mod monitor;
pub mod progress;
pub mod queue;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::JobError;
use crate::script::ScriptStyle;

/// Largest explicit page selection a job may request.
pub const MAX_SELECTED_PAGES: usize = 30;
/// Largest document the pipeline accepts, in pages.
pub const MAX_DOCUMENT_PAGES: usize = 500;

/// What kind of work a submission asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Per-page vision analysis plus a whole-document summary.
    DocumentAnalysis,
    /// Narrated audio generated from a stored document's analysis.
    AudioGeneration,
    /// Verbatim read-aloud audio of the stored text, no script step.
    ReadingAudioGeneration,
}

/// One unit of document input: a rendered page image, or its extracted
/// text when no image is available.
#[derive(Debug, Clone, Default)]
pub struct PageInput {
    pub image: Option<Bytes>,
    pub text: Option<String>,
}

impl PageInput {
    pub fn from_image(image: Bytes) -> Self {
        Self {
            image: Some(image),
            text: None,
        }
    }
}

/// A job submission.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub job_id: String,
    pub user_id: String,
    pub kind: Option<JobKind>,
    /// Ordered page inputs for document analysis
    pub pages: Vec<PageInput>,
    /// Whole-document text used when no pages could be rendered
    pub fallback_text: Option<String>,
    /// 1-based page numbers to process instead of the full set
    pub selected_pages: Option<Vec<u32>>,
    pub file_type: Option<String>,
    /// Stored document reference, required for audio jobs
    pub document_id: Option<String>,
    /// Narrator voice override for single-speaker audio
    pub voice: Option<String>,
    pub audio_style: Option<ScriptStyle>,
}

impl JobRequest {
    /// Reject malformed submissions before any work starts.
    pub fn validate(&self) -> Result<JobKind, JobError> {
        if self.job_id.trim().is_empty() {
            return Err(JobError::InvalidInput("missing job_id".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(JobError::InvalidInput("missing user_id".into()));
        }
        let kind = self
            .kind
            .ok_or_else(|| JobError::InvalidInput("missing job kind".into()))?;

        match kind {
            JobKind::DocumentAnalysis => {
                let has_fallback = self
                    .fallback_text
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty());
                if self.pages.is_empty() && !has_fallback {
                    return Err(JobError::InvalidInput(
                        "no pages or fallback text provided".into(),
                    ));
                }
                if self.pages.len() > MAX_DOCUMENT_PAGES {
                    return Err(JobError::InvalidInput(format!(
                        "document has {} pages, limit is {MAX_DOCUMENT_PAGES}",
                        self.pages.len()
                    )));
                }
                if let Some(selection) = &self.selected_pages {
                    if selection.len() > MAX_SELECTED_PAGES {
                        return Err(JobError::InvalidInput(format!(
                            "page selection has {} pages, limit is {MAX_SELECTED_PAGES}",
                            selection.len()
                        )));
                    }
                    for &page in selection {
                        if page == 0 || page as usize > self.pages.len() {
                            return Err(JobError::InvalidInput(format!(
                                "selected page {page} is out of range"
                            )));
                        }
                    }
                }
            }
            JobKind::AudioGeneration | JobKind::ReadingAudioGeneration => {
                if self
                    .document_id
                    .as_deref()
                    .is_none_or(|id| id.trim().is_empty())
                {
                    return Err(JobError::InvalidInput("missing document_id".into()));
                }
            }
        }
        Ok(kind)
    }

    /// The pages to process: the explicit selection when present,
    /// otherwise all pages, each paired with its 1-based page number.
    pub fn effective_pages(&self) -> Vec<(u32, &PageInput)> {
        match &self.selected_pages {
            Some(selection) => selection
                .iter()
                .filter_map(|&n| self.pages.get(n as usize - 1).map(|p| (n, p)))
                .collect(),
            None => self
                .pages
                .iter()
                .enumerate()
                .map(|(i, p)| (i as u32 + 1, p))
                .collect(),
        }
    }
}

/// Final result of a successful job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum JobOutput {
    Document(DocumentReport),
    Audio(AudioArtifact),
}

/// Aggregated document-analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Per-page analysis sections joined with page markers
    pub content: String,
    pub summary: String,
    pub elevator_pitch: String,
    pub pages_processed: u32,
}

/// Produced narration audio, by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub storage_path: String,
    pub pages_processed: u32,
    pub style: ScriptStyle,
}

/// Inter-unit pacing for sequential processing.
///
/// Sleeps between consecutive units but never after the last one, and
/// counts every pause it applies (including zero-duration ones, so tests
/// can assert pacing without waiting).
pub struct Pacer {
    delay: Duration,
    applied: AtomicUsize,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            applied: AtomicUsize::new(0),
        }
    }

    /// Pause after finishing unit `completed` of `total` (both counts,
    /// not indices). No pause after the final unit.
    pub async fn between_units(&self, completed: usize, total: usize) {
        if completed >= total {
            return;
        }
        self.applied.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            debug!(completed, total, "pacing before next unit");
            tokio::time::sleep(self.delay).await;
        }
    }

    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(kind: JobKind) -> JobRequest {
        JobRequest {
            job_id: "job-1".into(),
            user_id: "user-1".into(),
            kind: Some(kind),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_missing_identifiers() {
        let mut req = base_request(JobKind::DocumentAnalysis);
        req.job_id.clear();
        assert!(matches!(req.validate(), Err(JobError::InvalidInput(_))));

        let mut req = base_request(JobKind::DocumentAnalysis);
        req.user_id = "  ".into();
        assert!(matches!(req.validate(), Err(JobError::InvalidInput(_))));
    }

    #[test]
    fn document_job_needs_pages_or_fallback_text() {
        let req = base_request(JobKind::DocumentAnalysis);
        assert!(req.validate().is_err());

        let mut req = base_request(JobKind::DocumentAnalysis);
        req.fallback_text = Some("extracted text".into());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn enforces_page_limits() {
        let mut req = base_request(JobKind::DocumentAnalysis);
        req.pages = vec![PageInput::default(); MAX_DOCUMENT_PAGES + 1];
        assert!(req.validate().is_err());

        let mut req = base_request(JobKind::DocumentAnalysis);
        req.pages = vec![PageInput::default(); 40];
        req.selected_pages = Some((1..=31).collect());
        assert!(req.validate().is_err());

        let mut req = base_request(JobKind::DocumentAnalysis);
        req.pages = vec![PageInput::default(); 5];
        req.selected_pages = Some(vec![2, 6]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn audio_job_needs_document_id() {
        let req = base_request(JobKind::AudioGeneration);
        assert!(req.validate().is_err());

        let mut req = base_request(JobKind::ReadingAudioGeneration);
        req.document_id = Some("doc-9".into());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn selection_controls_effective_pages() {
        let mut req = base_request(JobKind::DocumentAnalysis);
        req.pages = vec![PageInput::default(); 4];
        req.selected_pages = Some(vec![3, 1]);
        let pages = req.effective_pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].0, 3);
        assert_eq!(pages[1].0, 1);

        req.selected_pages = None;
        let all: Vec<u32> = req.effective_pages().iter().map(|(n, _)| *n).collect();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn pacer_never_pauses_after_the_last_unit() {
        let pacer = Pacer::new(Duration::ZERO);
        let total = 4;
        for done in 1..=total {
            pacer.between_units(done, total).await;
        }
        assert_eq!(pacer.applied(), total - 1);
    }

    #[tokio::test]
    async fn single_unit_needs_no_pacing() {
        let pacer = Pacer::new(Duration::ZERO);
        pacer.between_units(1, 1).await;
        assert_eq!(pacer.applied(), 0);
    }
}
