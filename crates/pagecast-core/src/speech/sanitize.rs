//! Text cleanup for speech synthesis.
//!
//! Narration scripts and stored analysis text carry artifacts that read
//! badly aloud: URLs, citation markers, bibliography sections, markdown
//! syntax. This module strips those and re-flows overlong sentences into
//! pieces a synthesis voice can pace naturally.

use std::sync::LazyLock;

use regex::Regex;

/// Sentences longer than this (in characters) get re-split.
const MAX_SENTENCE_CHARS: usize = 200;
/// Hard word-wrap width used when a long sentence has no clause breaks.
const WRAP_CHARS: usize = 150;

static PAREN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*https?://[^)]*\)").unwrap());
static BARE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s)]+").unwrap());
static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
static BIBLIOGRAPHY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bbibliography:.*").unwrap());
static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#+\s?").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[-*+]\s+").unwrap());
static NUMBERED_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\d+\.\s+").unwrap());
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^>\s?").unwrap());
static SENTENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^.!?]*[.!?]+").unwrap());
static SPEAKER_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(A|B):").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static MULTI_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean text for single-voice synthesis.
///
/// Strips non-spoken artifacts, then re-flows any sentence longer than
/// 200 characters at clause boundaries (or a hard word wrap when none
/// exist). Empty input stays empty.
pub fn sanitize(text: &str) -> String {
    let stripped = strip_artifacts(text);
    if stripped.trim().is_empty() {
        return String::new();
    }

    let mut pieces = Vec::new();
    for sentence in split_sentences(&stripped) {
        reflow_sentence(&sentence, true, &mut pieces);
    }
    normalize(&pieces.join(" "))
}

/// Clean dialogue text while keeping speaker attributions intact.
///
/// Lines beginning with `A:` or `B:` pass through verbatim so the turn
/// parser downstream still sees them. Other lines get the same cleanup
/// as [`sanitize`], except colons are never treated as clause breaks
/// (they could be mistaken for attributions).
pub fn sanitize_preserving_speakers(text: &str) -> String {
    let stripped = strip_artifacts(text);
    if stripped.trim().is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    for line in stripped.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if SPEAKER_LINE.is_match(trimmed) {
            lines.push(trimmed.to_string());
        } else {
            let mut pieces = Vec::new();
            for sentence in split_sentences(trimmed) {
                reflow_sentence(&sentence, false, &mut pieces);
            }
            if !pieces.is_empty() {
                lines.push(pieces.join(" "));
            }
        }
    }
    normalize(&lines.join("\n"))
}

/// Split text into pieces no larger than `max_bytes` bytes each,
/// without splitting inside a UTF-8 character. Synthesis backends cap
/// request payloads by byte size, not character count.
pub fn split_text_by_bytes(text: &str, max_bytes: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > max_bytes && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn strip_artifacts(text: &str) -> String {
    let mut s = PAREN_URL.replace_all(text, "").into_owned();
    s = BARE_URL.replace_all(&s, "").into_owned();
    s = CITATION.replace_all(&s, "").into_owned();
    s = BIBLIOGRAPHY.replace_all(&s, "").into_owned();
    s = FENCED_CODE.replace_all(&s, "").into_owned();
    s = INLINE_CODE.replace_all(&s, "$1").into_owned();
    s = HEADING.replace_all(&s, "").into_owned();
    s = BOLD.replace_all(&s, "$1").into_owned();
    s = ITALIC.replace_all(&s, "$1").into_owned();
    s = LIST_MARKER.replace_all(&s, "").into_owned();
    s = NUMBERED_LIST.replace_all(&s, "").into_owned();
    s = BLOCKQUOTE.replace_all(&s, "").into_owned();
    s
}

/// Split into sentences, keeping terminal punctuation attached. A
/// trailing fragment with no terminator is kept as its own sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut last_end = 0;
    for m in SENTENCE.find_iter(text) {
        let s = m.as_str().trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
        last_end = m.end();
    }
    let tail = text[last_end..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

/// Re-flow one sentence into speakable pieces.
///
/// Sentences within the length cap pass through. Longer ones split in
/// clause-delimiter preference order (comma, semicolon, then colon when
/// allowed), each part re-terminated with a period. With no delimiter at
/// all, the sentence is word-wrapped.
fn reflow_sentence(sentence: &str, allow_colon: bool, out: &mut Vec<String>) {
    let mut delimiters: Vec<&str> = vec![", ", "; "];
    if allow_colon && !SPEAKER_LINE.is_match(sentence) {
        delimiters.push(": ");
    }
    reflow_at(sentence, &delimiters, out);
}

/// Split at the first delimiter kind present, then re-flow each part
/// against the remaining delimiters. Every emitted piece fits the
/// sentence cap, so a second pass leaves the output unchanged.
fn reflow_at(sentence: &str, delimiters: &[&str], out: &mut Vec<String>) {
    if sentence.chars().count() <= MAX_SENTENCE_CHARS {
        out.push(sentence.to_string());
        return;
    }

    for (i, delim) in delimiters.iter().enumerate() {
        if sentence.contains(delim) {
            for part in sentence.split(delim) {
                let part = part.trim().trim_end_matches(['.', ',', ';', ':']);
                if !part.is_empty() {
                    reflow_at(&format!("{part}."), &delimiters[i + 1..], out);
                }
            }
            return;
        }
    }

    out.extend(wrap_words(sentence, WRAP_CHARS));
}

/// Word-wrap into pieces of at most `max_chars` characters (a single
/// overlong word still becomes its own piece). Each piece is
/// re-terminated with a period so the voice pauses between them.
fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        if current_chars > 0 && current_chars + 1 + word_chars > max_chars {
            push_terminated(&mut out, &current);
            current.clear();
            current_chars = 0;
        }
        if current_chars > 0 {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(word);
        current_chars += word_chars;
    }
    push_terminated(&mut out, &current);
    out
}

fn push_terminated(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim_end_matches(['.', ',', ';', ':']);
    if !piece.is_empty() {
        out.push(format!("{piece}."));
    }
}

fn normalize(text: &str) -> String {
    let s = MULTI_SPACE.replace_all(text, " ");
    let s = MULTI_NEWLINE.replace_all(&s, "\n\n");
    s.trim().to_string()
}
