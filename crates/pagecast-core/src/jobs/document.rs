//! Document-analysis job.
//!
//! Pages are analyzed strictly in order, one generation call in flight
//! at a time, with a pacing delay between pages. A failed page becomes
//! an inline marker in the aggregated report rather than aborting the
//! batch; the job itself only fails on errors that escape the whole
//! pipeline. The finished report is delivered to the results sink
//! best-effort before the job is marked SUCCESS.

use tracing::{error, info, warn};

use super::progress::ProgressStore;
use super::queue::JobContext;
use super::{DocumentReport, JobOutput, JobRequest, Pacer};
use crate::analyze::{self, PageOutcome};
use crate::error::JobError;
use crate::services::JobDelivery;

pub(crate) async fn run(context: &JobContext, request: JobRequest) {
    let job_id = request.job_id.clone();
    match execute(context, &request).await {
        Ok(report) => {
            deliver(context, &request, Ok(&report)).await;
            context
                .progress
                .complete(&job_id, JobOutput::Document(report))
                .await;
        }
        Err(err) => {
            error!(job_id = %job_id, error = %err, "document job failed");
            deliver(context, &request, Err(&err)).await;
            context.progress.fail(&job_id, err).await;
        }
    }
}

async fn execute(context: &JobContext, request: &JobRequest) -> Result<DocumentReport, JobError> {
    let job_id = &request.job_id;
    let pages = request.effective_pages();
    let pacer = Pacer::new(context.pipeline.inter_page_delay);
    let generation = context.services.generation.as_ref();
    let timeout = context.pipeline.generation_timeout;

    let mut outcomes: Vec<PageOutcome> = Vec::new();

    if pages.is_empty() {
        // Unrenderable document: analyze the extracted text as one page.
        let text = request
            .fallback_text
            .as_deref()
            .ok_or_else(|| JobError::InvalidInput("no pages or fallback text provided".into()))?;
        report_progress(&context.progress, job_id, 0.0, 1, "analyzing document text").await;
        context.board.start(job_id, "text").await;
        outcomes.push(analyze::analyze_text(generation, 1, text, timeout).await);
        context.board.finish(job_id, "text").await;
    } else {
        let total = pages.len() as u32;
        for (i, (page_number, page)) in pages.iter().enumerate() {
            let unit = format!("page-{page_number}");
            report_progress(
                &context.progress,
                job_id,
                i as f64,
                total,
                &format!("analyzing page {page_number}"),
            )
            .await;
            context.board.start(job_id, &unit).await;

            let outcome = match (&page.image, &page.text) {
                (Some(image), _) => {
                    analyze::analyze_page(generation, *page_number, total, image, timeout).await
                }
                (None, Some(text)) => {
                    analyze::analyze_text(generation, *page_number, text, timeout).await
                }
                (None, None) => PageOutcome::Failed {
                    page_number: *page_number,
                    error: "page has no image or text".to_string(),
                },
            };
            outcomes.push(outcome);

            context.board.finish(job_id, &unit).await;
            pacer.between_units(i + 1, pages.len()).await;
        }
    }

    let pages_processed = outcomes.len() as u32;
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if failed > 0 {
        warn!(job_id = %job_id, failed, pages = pages_processed, "some pages failed analysis");
    }

    let content = outcomes
        .iter()
        .map(PageOutcome::to_section)
        .collect::<Vec<_>>()
        .join("\n\n");

    report_progress(
        &context.progress,
        job_id,
        pages_processed as f64,
        pages_processed,
        "generating document summary",
    )
    .await;

    let summary = analyze::summarize_document(
        generation,
        &content,
        pages_processed as usize,
        context.pipeline.summary_timeout,
    )
    .await;

    info!(job_id = %job_id, pages = pages_processed, failed, "document analysis complete");

    Ok(DocumentReport {
        content,
        summary: summary.summary,
        elevator_pitch: summary.elevator_pitch,
        pages_processed,
    })
}

async fn report_progress(progress: &ProgressStore, job_id: &str, current: f64, total: u32, status: &str) {
    progress.report(job_id, current, total, status).await;
}

/// Best-effort delivery of the final outcome. A sink failure is logged
/// and never changes the job's own result.
async fn deliver(context: &JobContext, request: &JobRequest, result: Result<&DocumentReport, &JobError>) {
    let delivery = match result {
        Ok(report) => JobDelivery {
            job_id: request.job_id.clone(),
            user_id: request.user_id.clone(),
            status: "completed".to_string(),
            content: Some(report.content.clone()),
            summary: Some(report.summary.clone()),
            elevator_pitch: Some(report.elevator_pitch.clone()),
            error: None,
        },
        Err(err) => JobDelivery {
            job_id: request.job_id.clone(),
            user_id: request.user_id.clone(),
            status: "failed".to_string(),
            content: None,
            summary: None,
            elevator_pitch: None,
            error: Some(err.to_string()),
        },
    };

    if let Err(err) = context.services.sink.deliver(&delivery).await {
        warn!(job_id = %request.job_id, error = %err, "result delivery failed");
    }
}
