//! Audio narration jobs.
//!
//! One unified state machine covers both narration styles and the
//! read-aloud variant: fetch the stored text, derive pages, produce
//! per-page audio sequentially, then upload the concatenated artifact
//! and point the document record at it. Unlike document analysis, audio
//! jobs are all-or-nothing: any failed page fails the job and no partial
//! artifact is uploaded.
//!
//! Progress runs over four steps; step 3 advances fractionally per page,
//! so a five-page job reports 2.0, 2.2, 2.4 and so on.

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use tracing::{error, info};

use super::progress::ProgressStore;
use super::queue::JobContext;
use super::{AudioArtifact, JobKind, JobOutput, JobRequest, Pacer};
use crate::error::JobError;
use crate::pages::{self, ParsedPage};
use crate::script::{self, ScriptError, ScriptStyle};
use crate::services::{DialogueVoices, SpeechError, StoreError, VoiceSelection};
use crate::speech::{sanitize, synth};

const TOTAL_STEPS: u32 = 4;

pub(crate) async fn run(context: &JobContext, request: JobRequest, kind: JobKind) {
    let job_id = request.job_id.clone();
    context.board.start(&job_id, "audio").await;
    let result = execute(context, &request, kind).await;
    context.board.finish(&job_id, "audio").await;

    match result {
        Ok(artifact) => {
            context
                .progress
                .complete(&job_id, JobOutput::Audio(artifact))
                .await;
        }
        Err(err) => {
            error!(job_id = %job_id, error = %err, "audio job failed");
            context.progress.fail(&job_id, err).await;
        }
    }
}

async fn execute(
    context: &JobContext,
    request: &JobRequest,
    kind: JobKind,
) -> Result<AudioArtifact, JobError> {
    let job_id = &request.job_id;
    let progress = &context.progress;
    let document_id = request
        .document_id
        .as_deref()
        .ok_or_else(|| JobError::InvalidInput("missing document_id".into()))?;

    progress.report(job_id, 0.0, TOTAL_STEPS, "fetching document text").await;
    let source = fetch_source(context, document_id).await?;

    progress.report(job_id, 1.0, TOTAL_STEPS, "deriving pages").await;
    let pages = pages::parse_pages(&source);
    if pages.is_empty() {
        return Err(JobError::InvalidInput(
            "document has no usable text".into(),
        ));
    }

    let style = match kind {
        JobKind::ReadingAudioGeneration => ScriptStyle::SingleSpeaker,
        _ => request.audio_style.unwrap_or(ScriptStyle::SingleSpeaker),
    };
    let voice = VoiceSelection::named(
        request
            .voice
            .clone()
            .unwrap_or_else(|| context.pipeline.default_voice.clone()),
    );

    let total_pages = pages.len();
    let pacer = Pacer::new(context.pipeline.inter_page_delay);
    let mut buffers: Vec<Bytes> = Vec::with_capacity(total_pages);

    for (i, page) in pages.iter().enumerate() {
        let current = 2.0 + i as f64 / total_pages as f64;
        progress
            .report(
                job_id,
                current,
                TOTAL_STEPS,
                &format!("narrating page {} of {total_pages}", i + 1),
            )
            .await;

        let audio = narrate_page(context, kind, style, &voice, page, i, total_pages).await?;
        buffers.push(audio);
        pacer.between_units(i + 1, total_pages).await;
    }

    let mut combined = BytesMut::new();
    for buffer in &buffers {
        combined.extend_from_slice(buffer);
    }
    if combined.is_empty() {
        return Err(JobError::UnitFailure(
            "synthesis produced no audio".into(),
        ));
    }

    progress.report(job_id, 3.0, TOTAL_STEPS, "uploading audio").await;
    let tag = match kind {
        JobKind::ReadingAudioGeneration => "reading",
        _ => style.tag(),
    };
    let path = format!("audio/{document_id}-{tag}-{}.mp3", Utc::now().timestamp());
    let storage_path = context
        .services
        .storage
        .upload(&path, combined.freeze(), "audio/mpeg")
        .await
        .map_err(store_error)?;

    update_document(context, kind, document_id, &storage_path).await?;

    finish_progress(progress, job_id).await;
    info!(job_id = %job_id, pages = total_pages, path = %storage_path, "audio narration complete");

    Ok(AudioArtifact {
        storage_path,
        pages_processed: total_pages as u32,
        style,
    })
}

/// Prefer the full analyzed content, fall back to the summary. Absence
/// of both is a job failure.
async fn fetch_source(context: &JobContext, document_id: &str) -> Result<String, JobError> {
    let record = context
        .services
        .documents
        .get_document(document_id)
        .await
        .map_err(store_error)?;

    record
        .content
        .filter(|c| !c.trim().is_empty())
        .or(record.summary.filter(|s| !s.trim().is_empty()))
        .ok_or_else(|| JobError::InvalidInput("document has no usable text".into()))
}

#[allow(clippy::too_many_arguments)]
async fn narrate_page(
    context: &JobContext,
    kind: JobKind,
    style: ScriptStyle,
    voice: &VoiceSelection,
    page: &ParsedPage,
    index: usize,
    total_pages: usize,
) -> Result<Bytes, JobError> {
    let speech = context.services.speech.as_ref();
    let page_number = index + 1;

    if kind == JobKind::ReadingAudioGeneration {
        // Read-aloud: no script step, the stored text itself is spoken.
        let text = sanitize::sanitize(&page.content);
        if text.is_empty() {
            return Err(JobError::UnitFailure(format!(
                "page {page_number} has no speakable text"
            )));
        }
        return synth::synthesize_single(speech, &text, voice)
            .await
            .map_err(|e| speech_error(e, page_number));
    }

    let label = format!("page {page_number} of {total_pages}");
    let raw_script = script::generate_script(
        context.services.generation.as_ref(),
        &page.content,
        style,
        &label,
        context.pipeline.inter_chunk_delay,
        context.pipeline.generation_timeout,
    )
    .await
    .map_err(script_error)?;

    match style {
        ScriptStyle::SingleSpeaker => {
            let text = sanitize::sanitize(&raw_script);
            if text.is_empty() {
                return Err(JobError::UnitFailure(format!(
                    "page {page_number} script was empty after cleanup"
                )));
            }
            synth::synthesize_single(speech, &text, voice)
                .await
                .map_err(|e| speech_error(e, page_number))
        }
        ScriptStyle::TwoSpeakerPodcast => {
            let text = sanitize::sanitize_preserving_speakers(&raw_script);
            if text.is_empty() {
                return Err(JobError::UnitFailure(format!(
                    "page {page_number} script was empty after cleanup"
                )));
            }
            synth::synthesize_dialogue(speech, &text, &DialogueVoices::default())
                .await
                .map_err(|e| speech_error(e, page_number))
        }
    }
}

async fn update_document(
    context: &JobContext,
    kind: JobKind,
    document_id: &str,
    storage_path: &str,
) -> Result<(), JobError> {
    let mut update = crate::services::DocumentUpdate::default();
    match kind {
        JobKind::ReadingAudioGeneration => {
            update.reading_companion_audio_url = Some(storage_path.to_string());
        }
        _ => {
            update.summary_audio_url = Some(storage_path.to_string());
        }
    }
    context
        .services
        .documents
        .update_document(document_id, update)
        .await
        .map_err(store_error)
}

async fn finish_progress(progress: &ProgressStore, job_id: &str) {
    progress
        .report(job_id, TOTAL_STEPS as f64, TOTAL_STEPS, "audio ready")
        .await;
}

fn store_error(err: StoreError) -> JobError {
    match err {
        StoreError::NotFound(id) => JobError::InvalidInput(format!("document not found: {id}")),
        StoreError::Service(msg) => JobError::ServiceUnavailable(msg),
    }
}

fn speech_error(err: SpeechError, page_number: usize) -> JobError {
    match err {
        SpeechError::EmptyAudio => JobError::UnitFailure(format!(
            "synthesis produced no audio for page {page_number}"
        )),
        SpeechError::Unsupported => {
            JobError::ServiceUnavailable("synthesis mode not supported".into())
        }
        SpeechError::Service(msg) => JobError::ServiceUnavailable(msg),
    }
}

fn script_error(err: ScriptError) -> JobError {
    match err {
        ScriptError::Chunk { .. } => JobError::UnitFailure(err.to_string()),
        ScriptError::Generation(msg) => JobError::ServiceUnavailable(msg),
    }
}
