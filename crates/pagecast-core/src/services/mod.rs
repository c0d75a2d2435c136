//! External service ports.
//!
//! Every remote collaborator the pipeline touches sits behind one of
//! these traits so jobs receive injected handles instead of reaching for
//! process-global clients. Production adapters live in the submodules;
//! tests substitute in-memory fakes.

pub mod google;
pub mod openai;
pub mod supabase;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::speech::turns::SpeakerTurn;

/// One part of a multimodal prompt.
#[derive(Debug, Clone)]
pub enum PromptPart {
    Text(String),
    /// PNG-encoded page image
    PngImage(Bytes),
}

/// A single generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub parts: Vec<PromptPart>,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,
    #[error("generation rate limited")]
    RateLimited,
    #[error("generation returned no content")]
    EmptyResponse,
    #[error("generation service error: {0}")]
    Service(String),
}

/// Text/vision generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Concrete voice for single-speaker synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSelection {
    pub name: String,
    pub language_code: String,
}

impl VoiceSelection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_code: "en-US".to_string(),
        }
    }
}

/// Voice pair for dialogue synthesis fallback, one per speaker.
#[derive(Debug, Clone)]
pub struct DialogueVoices {
    pub speaker_a: VoiceSelection,
    pub speaker_b: VoiceSelection,
}

impl Default for DialogueVoices {
    fn default() -> Self {
        Self {
            speaker_a: VoiceSelection::named("en-US-Studio-Q"),
            speaker_b: VoiceSelection::named("en-US-Studio-O"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeechError {
    /// The backend does not offer the requested synthesis mode.
    #[error("synthesis mode not supported")]
    Unsupported,
    #[error("synthesis produced no audio")]
    EmptyAudio,
    #[error("speech service error: {0}")]
    Service(String),
}

/// Speech synthesis backend.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesize one stretch of text with a single voice.
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<Bytes, SpeechError>;

    /// Synthesize a whole dialogue in one call, if the backend supports
    /// native multi-speaker synthesis. Backends without that mode return
    /// [`SpeechError::Unsupported`] and the caller falls back to
    /// per-turn synthesis.
    async fn synthesize_dialogue(
        &self,
        turns: &[SpeakerTurn],
        voices: &DialogueVoices,
    ) -> Result<Bytes, SpeechError>;
}

/// A document row as the pipeline sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub content: Option<String>,
    pub summary: Option<String>,
}

/// Partial update to a document row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_companion_audio_url: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Service(String),
}

/// Document metadata store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, document_id: &str) -> Result<DocumentRecord, StoreError>;
    async fn update_document(
        &self,
        document_id: &str,
        update: DocumentUpdate,
    ) -> Result<(), StoreError>;
}

/// Blob storage for produced audio artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `data` at `path`, returning the stored object's path.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str)
        -> Result<String, StoreError>;
}

/// Outcome payload pushed to interested callers when a job finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDelivery {
    pub job_id: String,
    pub user_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevator_pitch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Best-effort result delivery. Failures are logged by the caller and
/// never affect job state.
#[async_trait]
pub trait ResultsSink: Send + Sync {
    async fn deliver(&self, delivery: &JobDelivery) -> anyhow::Result<()>;
}
