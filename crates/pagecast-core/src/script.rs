//! Narration script generation.
//!
//! Turns analyzed page text into a spoken script, either a single
//! narrator or a two-host dialogue. Sources within the segmenter's
//! maximum chunk size go through one generation call; longer sources
//! are segmented and scripted chunk by chunk, sequentially, with a
//! pacing delay between calls so a burst of chunks does not trip
//! provider rate limits. A failed chunk fails the whole script; partial
//! scripts are never returned.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunking::{self, SegmentOptions};
use crate::services::{GenerationRequest, GenerationService, PromptPart};

/// Narration delivery style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStyle {
    SingleSpeaker,
    TwoSpeakerPodcast,
}

impl ScriptStyle {
    /// Short tag used in artifact paths and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            ScriptStyle::SingleSpeaker => "single",
            ScriptStyle::TwoSpeakerPodcast => "podcast",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    #[error("script generation failed: {0}")]
    Generation(String),
    #[error("script generation failed for chunk {index} of {total}: {message}")]
    Chunk {
        /// 1-based chunk position
        index: usize,
        total: usize,
        message: String,
    },
}

const SINGLE_SPEAKER_SYSTEM: &str = "You write narration scripts for audio versions of analyzed \
     documents. Produce flowing spoken prose for a single narrator. No headings, no markdown, \
     no speaker labels, no stage directions. Write out abbreviations and numbers as words where \
     a narrator would.";

const PODCAST_SYSTEM: &str = "You write two-host podcast scripts discussing analyzed documents. \
     Host A leads and host B reacts and asks questions. Every line of dialogue starts with \
     'A: ' or 'B: '. No headings, no markdown, no stage directions.";

/// Generate a narration script for one stretch of source text.
///
/// `context_label` describes what the source is, e.g. `page 2 of 7`,
/// and is woven into the prompt so multi-page narrations flow.
pub async fn generate_script(
    generation: &dyn GenerationService,
    source: &str,
    style: ScriptStyle,
    context_label: &str,
    inter_chunk_delay: Duration,
    timeout: Duration,
) -> Result<String, ScriptError> {
    let opts = SegmentOptions::default();
    if chunking::count_words(source) <= opts.max_size {
        return script_call(generation, source, style, context_label, None, timeout).await;
    }

    let chunks = chunking::segment(source, &opts);
    let total = chunks.len();
    info!(chunks = total, style = style.tag(), "scripting long source in chunks");

    let mut parts = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let position = Some((i + 1, total));
        let part = script_call(generation, &chunk.text, style, context_label, position, timeout)
            .await
            .map_err(|err| match err {
                ScriptError::Generation(message) => ScriptError::Chunk {
                    index: i + 1,
                    total,
                    message,
                },
                other => other,
            })?;
        parts.push(part);

        if i + 1 < total && !inter_chunk_delay.is_zero() {
            debug!(chunk = i + 1, "pacing before next chunk");
            tokio::time::sleep(inter_chunk_delay).await;
        }
    }

    Ok(parts.join("\n\n"))
}

async fn script_call(
    generation: &dyn GenerationService,
    source: &str,
    style: ScriptStyle,
    context_label: &str,
    position: Option<(usize, usize)>,
    timeout: Duration,
) -> Result<String, ScriptError> {
    let system = match style {
        ScriptStyle::SingleSpeaker => SINGLE_SPEAKER_SYSTEM,
        ScriptStyle::TwoSpeakerPodcast => PODCAST_SYSTEM,
    };

    let framing = match position {
        Some((index, total)) => format!(
            "This is part {index} of {total} of {context_label}; continue seamlessly from the \
             previous part without re-introducing the document."
        ),
        None => format!("This covers {context_label}."),
    };

    let prompt = format!(
        "Write the script for the following analyzed content. {framing}\n\n{source}"
    );

    let request = GenerationRequest {
        system: Some(system.to_string()),
        parts: vec![PromptPart::Text(prompt)],
        max_output_tokens: 2000,
        temperature: Some(0.7),
        timeout,
    };

    generation
        .complete(request)
        .await
        .map_err(|e| ScriptError::Generation(e.to_string()))
}
