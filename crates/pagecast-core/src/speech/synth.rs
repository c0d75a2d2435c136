//! Script-to-audio orchestration.
//!
//! Backends cap request payloads at a few kilobytes, so long scripts are
//! synthesized in byte-bounded pieces and the resulting audio segments
//! concatenated. MP3 frames are self-delimiting, so concatenation of
//! segments produced with the same encoding settings plays back as one
//! continuous stream.

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use super::sanitize::split_text_by_bytes;
use super::turns::{self, Speaker, SpeakerTurn};
use crate::services::{DialogueVoices, SpeechError, SpeechService, VoiceSelection};

/// Byte cap for one synthesis request's input text.
pub const MAX_REQUEST_BYTES: usize = 5000;

// Gap spliced between turns in the per-turn fallback path. Zero-length
// for now; TODO: replace with a real encoded silence frame matching the
// output encoding.
const TURN_GAP: &[u8] = &[];

/// Synthesize one narrator reading `text`.
///
/// The text is split into byte-bounded pieces, synthesized sequentially,
/// and concatenated. Producing no audio at all is a hard failure.
pub async fn synthesize_single(
    speech: &dyn SpeechService,
    text: &str,
    voice: &VoiceSelection,
) -> Result<Bytes, SpeechError> {
    let mut audio = BytesMut::new();
    for piece in split_text_by_bytes(text, MAX_REQUEST_BYTES) {
        if piece.trim().is_empty() {
            continue;
        }
        let segment = speech.synthesize(&piece, voice).await?;
        audio.extend_from_slice(&segment);
    }

    if audio.is_empty() {
        return Err(SpeechError::EmptyAudio);
    }
    Ok(audio.freeze())
}

/// Synthesize a two-speaker script.
///
/// Prefers the backend's native multi-speaker mode, batching turns so
/// each request stays under the byte cap. When the backend rejects
/// dialogue synthesis for any reason, falls back to synthesizing each
/// turn with its speaker's own voice and concatenating. A script with no
/// parseable speaker turns is narrated whole by speaker A's voice.
pub async fn synthesize_dialogue(
    speech: &dyn SpeechService,
    script: &str,
    voices: &DialogueVoices,
) -> Result<Bytes, SpeechError> {
    let turns = turns::parse_turns(script);
    if turns.is_empty() {
        debug!("script has no speaker turns, narrating with a single voice");
        return synthesize_single(speech, script, &voices.speaker_a).await;
    }

    match synthesize_native_dialogue(speech, &turns, voices).await {
        Ok(audio) => Ok(audio),
        Err(err) => {
            warn!(error = %err, "multi-speaker synthesis unavailable, falling back to per-turn voices");
            synthesize_turns_individually(speech, &turns, voices).await
        }
    }
}

async fn synthesize_native_dialogue(
    speech: &dyn SpeechService,
    turns: &[SpeakerTurn],
    voices: &DialogueVoices,
) -> Result<Bytes, SpeechError> {
    let mut audio = BytesMut::new();
    for batch in batch_turns_by_bytes(turns, MAX_REQUEST_BYTES) {
        let segment = speech.synthesize_dialogue(&batch, voices).await?;
        audio.extend_from_slice(&segment);
    }
    if audio.is_empty() {
        return Err(SpeechError::EmptyAudio);
    }
    Ok(audio.freeze())
}

async fn synthesize_turns_individually(
    speech: &dyn SpeechService,
    turns: &[SpeakerTurn],
    voices: &DialogueVoices,
) -> Result<Bytes, SpeechError> {
    let mut audio = BytesMut::new();
    for (i, turn) in turns.iter().enumerate() {
        if i > 0 {
            audio.extend_from_slice(TURN_GAP);
        }
        let voice = match turn.speaker {
            Speaker::A => &voices.speaker_a,
            Speaker::B => &voices.speaker_b,
        };
        for piece in split_text_by_bytes(&turn.text, MAX_REQUEST_BYTES) {
            if piece.trim().is_empty() {
                continue;
            }
            let segment = speech.synthesize(&piece, voice).await?;
            audio.extend_from_slice(&segment);
        }
    }

    if audio.is_empty() {
        return Err(SpeechError::EmptyAudio);
    }
    Ok(audio.freeze())
}

/// Group consecutive turns so each batch's total text stays under
/// `max_bytes`. A single turn larger than the cap has its text split
/// across same-speaker turns.
fn batch_turns_by_bytes(turns: &[SpeakerTurn], max_bytes: usize) -> Vec<Vec<SpeakerTurn>> {
    let mut batches = Vec::new();
    let mut current: Vec<SpeakerTurn> = Vec::new();
    let mut current_bytes = 0usize;

    for turn in turns {
        let pieces = split_text_by_bytes(&turn.text, max_bytes);
        for piece in pieces {
            let piece_bytes = piece.len();
            if current_bytes + piece_bytes > max_bytes && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_bytes = 0;
            }
            current.push(SpeakerTurn {
                speaker: turn.speaker,
                text: piece,
            });
            current_bytes += piece_bytes;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakeSpeech {
        single_calls: AtomicUsize,
        dialogue_calls: AtomicUsize,
        dialogue_supported: bool,
    }

    impl FakeSpeech {
        fn new(dialogue_supported: bool) -> Self {
            Self {
                single_calls: AtomicUsize::new(0),
                dialogue_calls: AtomicUsize::new(0),
                dialogue_supported,
            }
        }
    }

    #[async_trait]
    impl SpeechService for FakeSpeech {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceSelection,
        ) -> Result<Bytes, SpeechError> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"AUDIO"))
        }

        async fn synthesize_dialogue(
            &self,
            _turns: &[SpeakerTurn],
            _voices: &DialogueVoices,
        ) -> Result<Bytes, SpeechError> {
            self.dialogue_calls.fetch_add(1, Ordering::SeqCst);
            if self.dialogue_supported {
                Ok(Bytes::from_static(b"DIALOGUE"))
            } else {
                Err(SpeechError::Unsupported)
            }
        }
    }

    #[tokio::test]
    async fn single_voice_concatenates_pieces() {
        let speech = FakeSpeech::new(true);
        let text = "word ".repeat(2000); // ~10 KB, forces multiple pieces
        let audio = synthesize_single(&speech, &text, &VoiceSelection::named("v")).await.unwrap();
        assert!(speech.single_calls.load(Ordering::SeqCst) >= 2);
        assert!(audio.len() >= 10);
    }

    #[tokio::test]
    async fn dialogue_prefers_native_mode() {
        let speech = FakeSpeech::new(true);
        let script = "A: Hello.\nB: Hi there.";
        let audio = synthesize_dialogue(&speech, script, &DialogueVoices::default()).await.unwrap();
        assert_eq!(speech.dialogue_calls.load(Ordering::SeqCst), 1);
        assert_eq!(speech.single_calls.load(Ordering::SeqCst), 0);
        assert_eq!(&audio[..], b"DIALOGUE");
    }

    #[tokio::test]
    async fn dialogue_falls_back_to_per_turn_voices() {
        let speech = FakeSpeech::new(false);
        let script = "A: Hello.\nB: Hi there.\nA: Welcome.";
        let audio = synthesize_dialogue(&speech, script, &DialogueVoices::default()).await.unwrap();
        assert_eq!(speech.dialogue_calls.load(Ordering::SeqCst), 1);
        assert_eq!(speech.single_calls.load(Ordering::SeqCst), 3);
        assert!(!audio.is_empty());
    }

    #[tokio::test]
    async fn unattributed_script_uses_single_voice() {
        let speech = FakeSpeech::new(true);
        let script = "Plain narration with no speaker labels at all.";
        let audio = synthesize_dialogue(&speech, script, &DialogueVoices::default()).await.unwrap();
        assert_eq!(speech.dialogue_calls.load(Ordering::SeqCst), 0);
        assert_eq!(speech.single_calls.load(Ordering::SeqCst), 1);
        assert!(!audio.is_empty());
    }

    #[test]
    fn batching_keeps_each_batch_under_the_cap() {
        let turns = vec![
            SpeakerTurn { speaker: Speaker::A, text: "x".repeat(3000) },
            SpeakerTurn { speaker: Speaker::B, text: "y".repeat(3000) },
            SpeakerTurn { speaker: Speaker::A, text: "z".repeat(3000) },
        ];
        let batches = batch_turns_by_bytes(&turns, 5000);
        assert!(batches.len() >= 2);
        for batch in &batches {
            let total: usize = batch.iter().map(|t| t.text.len()).sum();
            assert!(total <= 5000);
        }
    }

    #[test]
    fn oversized_turn_is_split_within_batches() {
        let turns = vec![SpeakerTurn { speaker: Speaker::A, text: "x".repeat(12000) }];
        let batches = batch_turns_by_bytes(&turns, 5000);
        let pieces: usize = batches.iter().map(|b| b.len()).sum();
        assert!(pieces >= 3);
        for batch in &batches {
            for turn in batch {
                assert_eq!(turn.speaker, Speaker::A);
                assert!(turn.text.len() <= 5000);
            }
        }
    }
}
