//! Page analysis and document summarization.
//!
//! Page analysis is unit-isolated: a failed generation call produces a
//! [`PageOutcome::Failed`] that the document job renders as an inline
//! marker, never an error that aborts the job. Summarization likewise
//! always produces something usable, degrading from structured JSON to
//! truncated prose to a generic fallback.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::{GenerationError, GenerationRequest, GenerationService, PromptPart};

const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert document analyst. You receive one page \
     of a document at a time and produce a thorough, readable analysis of that page: its key \
     points, arguments, data, and how it fits the document so far. Write flowing prose, not \
     bullet fragments.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert document analyst. You receive the full \
     per-page analysis of a document and produce a structured summary of the whole document.";

/// Result of analyzing one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Analyzed { page_number: u32, analysis: String },
    Failed { page_number: u32, error: String },
}

impl PageOutcome {
    pub fn page_number(&self) -> u32 {
        match self {
            PageOutcome::Analyzed { page_number, .. } => *page_number,
            PageOutcome::Failed { page_number, .. } => *page_number,
        }
    }

    /// Render the outcome as a section of the aggregated document text.
    /// Failures become inline markers so the surrounding pages survive.
    pub fn to_section(&self) -> String {
        match self {
            PageOutcome::Analyzed {
                page_number,
                analysis,
            } => format!("Page {page_number} Analysis\n{analysis}"),
            PageOutcome::Failed { page_number, error } => {
                format!("Page {page_number} Analysis\n[Analysis failed: {error}]")
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageOutcome::Failed { .. })
    }
}

/// Structured document summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub summary: String,
    pub elevator_pitch: String,
}

/// Analyze one page image. Never returns an error; any failure is folded
/// into the outcome.
pub async fn analyze_page(
    generation: &dyn GenerationService,
    page_number: u32,
    total_pages: u32,
    image: &Bytes,
    timeout: Duration,
) -> PageOutcome {
    let prompt = format!(
        "Analyze page {page_number} of {total_pages}. Cover the page's main content, any \
         figures or tables, and notable details a listener should hear about."
    );
    let request = GenerationRequest {
        system: Some(ANALYSIS_SYSTEM_PROMPT.to_string()),
        parts: vec![PromptPart::Text(prompt), PromptPart::PngImage(image.clone())],
        max_output_tokens: 1500,
        temperature: Some(0.3),
        timeout,
    };
    run_page_analysis(generation, page_number, request).await
}

/// Analyze extracted text in place of a page image. Used when a document
/// arrives with no renderable pages.
pub async fn analyze_text(
    generation: &dyn GenerationService,
    page_number: u32,
    text: &str,
    timeout: Duration,
) -> PageOutcome {
    let prompt = format!(
        "Analyze the following document text. Cover its main content, structure, and notable \
         details a listener should hear about.\n\n{text}"
    );
    let request = GenerationRequest {
        system: Some(ANALYSIS_SYSTEM_PROMPT.to_string()),
        parts: vec![PromptPart::Text(prompt)],
        max_output_tokens: 1500,
        temperature: Some(0.3),
        timeout,
    };
    run_page_analysis(generation, page_number, request).await
}

async fn run_page_analysis(
    generation: &dyn GenerationService,
    page_number: u32,
    request: GenerationRequest,
) -> PageOutcome {
    match generation.complete(request).await {
        Ok(analysis) => PageOutcome::Analyzed {
            page_number,
            analysis,
        },
        Err(err) => {
            warn!(page_number, error = %err, "page analysis failed");
            PageOutcome::Failed {
                page_number,
                error: describe(&err),
            }
        }
    }
}

/// Produce the whole-document summary from the aggregated analysis text.
///
/// Asks for a JSON object with `summary` and `elevator_pitch` fields and
/// extracts the first JSON object found in the response. A response that
/// is not parseable falls back to truncated prose; a failed call falls
/// back to a generic page-count summary. Never returns an error.
pub async fn summarize_document(
    generation: &dyn GenerationService,
    aggregated: &str,
    page_count: usize,
    timeout: Duration,
) -> DocumentSummary {
    let prompt = format!(
        "Based on the per-page analysis below, respond with a JSON object containing exactly \
         two string fields: \"summary\" (a thorough summary of the whole document) and \
         \"elevator_pitch\" (two or three sentences a narrator could open with). Respond with \
         only the JSON object.\n\n{aggregated}"
    );
    let request = GenerationRequest {
        system: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
        parts: vec![PromptPart::Text(prompt)],
        max_output_tokens: 1200,
        temperature: Some(0.3),
        timeout,
    };

    match generation.complete(request).await {
        Ok(response) => parse_summary_response(&response),
        Err(err) => {
            warn!(error = %err, "summary generation failed, using fallback");
            generic_summary(page_count)
        }
    }
}

/// Extract the structured summary from a model response, tolerating
/// surrounding prose or code fences.
fn parse_summary_response(response: &str) -> DocumentSummary {
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            if let Ok(parsed) = serde_json::from_str::<DocumentSummary>(&response[start..=end]) {
                if !parsed.summary.trim().is_empty() {
                    return parsed;
                }
            }
        }
    }

    // Not JSON: treat the response itself as the summary, truncated.
    DocumentSummary {
        summary: truncate_chars(response.trim(), 300),
        elevator_pitch: truncate_chars(response.trim(), 200),
    }
}

fn generic_summary(page_count: usize) -> DocumentSummary {
    let pages = if page_count == 1 { "page" } else { "pages" };
    DocumentSummary {
        summary: format!(
            "This document contains {page_count} analyzed {pages}. A detailed summary could \
             not be produced."
        ),
        elevator_pitch: format!("An analyzed document of {page_count} {pages}."),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn describe(err: &GenerationError) -> String {
    match err {
        GenerationError::Timeout => "generation timed out".to_string(),
        GenerationError::RateLimited => "generation rate limited".to_string(),
        GenerationError::EmptyResponse => "generation returned no content".to_string(),
        GenerationError::Service(msg) => msg.clone(),
    }
}
