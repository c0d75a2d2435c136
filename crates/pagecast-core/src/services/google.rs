//! Google Cloud Text-to-Speech adapter.
//!
//! Single-voice synthesis goes through the stable `v1` endpoint.
//! Dialogue synthesis uses the `v1beta1` multi-speaker markup endpoint,
//! which only supports the dedicated multi-speaker studio voice; when
//! that endpoint rejects the request the caller falls back to per-turn
//! single-voice synthesis.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{DialogueVoices, SpeechError, SpeechService, VoiceSelection};
use crate::config::Config;
use crate::speech::turns::{Speaker, SpeakerTurn};

const DEFAULT_BASE: &str = "https://texttospeech.googleapis.com";
const MULTI_SPEAKER_VOICE: &str = "en-US-Studio-MultiSpeaker";

pub struct GoogleSpeech {
    http: reqwest::Client,
    api_key: String,
    base: String,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

impl GoogleSpeech {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.google_tts_api_key.clone(),
            base: DEFAULT_BASE.to_string(),
        }
    }

    async fn post_synthesize(
        &self,
        api_version: &str,
        body: serde_json::Value,
    ) -> Result<Bytes, SpeechError> {
        let url = format!(
            "{}/{}/text:synthesize?key={}",
            self.base, api_version, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Service(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SpeechError::Unsupported);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SpeechError::Service(format!(
                "synthesis request failed ({status}): {detail}"
            )));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Service(e.to_string()))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content)
            .map_err(|e| SpeechError::Service(format!("invalid audio payload: {e}")))?;

        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(Bytes::from(audio))
    }
}

#[async_trait]
impl SpeechService for GoogleSpeech {
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<Bytes, SpeechError> {
        debug!(voice = %voice.name, bytes = text.len(), "single-voice synthesis");
        let body = json!({
            "input": { "text": text },
            "voice": {
                "languageCode": voice.language_code,
                "name": voice.name,
                "ssmlGender": ssml_gender(&voice.name),
            },
            "audioConfig": { "audioEncoding": "MP3" },
        });
        self.post_synthesize("v1", body).await
    }

    async fn synthesize_dialogue(
        &self,
        turns: &[SpeakerTurn],
        _voices: &DialogueVoices,
    ) -> Result<Bytes, SpeechError> {
        debug!(turns = turns.len(), "multi-speaker synthesis");
        let markup_turns: Vec<serde_json::Value> = turns
            .iter()
            .map(|turn| {
                json!({
                    "text": turn.text,
                    // The beta endpoint names its speakers R and S.
                    "speaker": match turn.speaker {
                        Speaker::A => "R",
                        Speaker::B => "S",
                    },
                })
            })
            .collect();

        let body = json!({
            "input": { "multiSpeakerMarkup": { "turns": markup_turns } },
            "voice": {
                "languageCode": "en-US",
                "name": MULTI_SPEAKER_VOICE,
            },
            "audioConfig": { "audioEncoding": "MP3" },
        });
        self.post_synthesize("v1beta1", body).await
    }
}

fn ssml_gender(voice_name: &str) -> &'static str {
    if voice_name == "en-US-Studio-Q" {
        "MALE"
    } else {
        "FEMALE"
    }
}
