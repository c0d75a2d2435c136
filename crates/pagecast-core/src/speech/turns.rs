//! Speaker-turn parsing for two-voice scripts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TURN_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(A|B):\s*(.*)$").unwrap());

/// A dialogue participant. `A` hosts, `B` responds; the synthesis layer
/// maps each to a concrete voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    A,
    B,
}

/// One attributed utterance in a dialogue script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Parse a two-speaker script into ordered turns.
///
/// A line starting with `A:` or `B:` opens a new turn. Non-blank lines
/// that do not start a turn continue the currently open one; lines
/// before the first attribution are dropped. Blank lines are skipped.
pub fn parse_turns(script: &str) -> Vec<SpeakerTurn> {
    let mut turns: Vec<SpeakerTurn> = Vec::new();

    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = TURN_START.captures(line) {
            let speaker = match &caps[1] {
                "A" => Speaker::A,
                _ => Speaker::B,
            };
            turns.push(SpeakerTurn {
                speaker,
                text: caps[2].trim().to_string(),
            });
        } else if let Some(turn) = turns.last_mut() {
            if !turn.text.is_empty() {
                turn.text.push(' ');
            }
            turn.text.push_str(line);
        }
    }

    turns.retain(|t| !t.text.is_empty());
    turns
}
