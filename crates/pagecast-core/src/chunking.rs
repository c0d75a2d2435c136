//! Content-aware text segmentation.
//!
//! Splits long text into word-count-bounded chunks for generation calls
//! with input-size limits. Chunks prefer natural boundaries (section
//! breaks, paragraph breaks, sentence endings) and adjacent chunks share
//! a configurable word overlap so downstream generation keeps cross-chunk
//! context.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rough estimate of characters per word, used to size scan windows.
const CHARS_PER_WORD: usize = 6;

static TRIPLE_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").unwrap());
static DOUBLE_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([.!?]+)\s+").unwrap());

/// A size-bounded slice of source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub word_count: usize,
    /// Byte offset of the chunk's scan window start in the source
    pub start_offset: usize,
    /// Byte offset one past the chunk's end in the source
    pub end_offset: usize,
    /// Whether the chunk ends on a detected natural boundary
    pub is_natural_boundary: bool,
}

/// Segmentation bounds, in words.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    pub target_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub overlap_words: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            target_size: 3000,
            min_size: 1000,
            max_size: 4000,
            overlap_words: 100,
        }
    }
}

/// Count whitespace-delimited words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `content` into bounded chunks.
///
/// Greedily extends each chunk from its start offset, committing at the
/// first natural break that keeps the word count within
/// `[min_size, max_size]`. When no break qualifies, a break is forced at
/// the last sentence or paragraph boundary inside a `max_size *
/// CHARS_PER_WORD` window, or hard-truncated at that window. The cursor
/// always advances at least one character per iteration, so segmentation
/// terminates on any input.
///
/// Empty or whitespace-only input yields no chunks. Every chunk except
/// possibly the final one satisfies the word-count bounds.
pub fn segment(content: &str, opts: &SegmentOptions) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let breaks = natural_breaks(content);
    let break_set: BTreeSet<usize> = breaks.iter().copied().collect();

    let mut chunks = Vec::new();
    let mut cursor = 0usize;
    let mut chunk_id = 1usize;

    while cursor < content.len() {
        let window_end = cursor.saturating_add(opts.target_size * CHARS_PER_WORD);

        // Prefer the first natural break that lands within the bounds. A
        // window holding only sub-minimum candidates goes through the
        // forced-break path so mid-document chunks keep the lower bound.
        let mut natural_end = None;
        for &b in break_set.range((cursor + 1)..=window_end.min(content.len())) {
            let words = count_words(&content[cursor..b]);
            if words >= opts.min_size && words <= opts.max_size {
                natural_end = Some(b);
                break;
            }
        }

        let end = match natural_end {
            Some(b) => b,
            None => forced_break(content, cursor, opts),
        };

        let text = content[cursor..end].trim();
        let word_count = count_words(text);

        if !text.is_empty() {
            chunks.push(Chunk {
                id: format!("chunk-{chunk_id}"),
                text: text.to_string(),
                word_count,
                start_offset: cursor,
                end_offset: end,
                is_natural_boundary: break_set.contains(&end) || end == content.len(),
            });
            chunk_id += 1;
        }

        // Retain the trailing overlap words as the start of the next scan
        // window, re-locating that text in the source so no characters are
        // duplicated or lost by approximation. Sub-minimum chunks (the
        // document tail) take no overlap, otherwise the tail would be
        // re-emitted shrinking by a word each iteration.
        let mut next = end;
        if opts.overlap_words > 0
            && word_count >= opts.min_size
            && end < content.len()
            && !text.is_empty()
        {
            let words: Vec<&str> = text.split_whitespace().collect();
            let tail_start = words.len().saturating_sub(opts.overlap_words);
            let overlap_text = words[tail_start..].join(" ");
            if !overlap_text.is_empty() {
                if let Some(pos) = content[cursor..end].rfind(&overlap_text) {
                    next = cursor + pos;
                }
            }
        }

        // Forward-progress guard: never regress or stall the cursor.
        if next <= cursor {
            next = ceil_char_boundary(content, cursor + 1);
        }
        cursor = next;
    }

    chunks
}

/// Force a break when no natural boundary fits: prefer the last sentence
/// break inside a generous window, then the last paragraph break, then
/// hard-truncate at the window edge. A boundary that would leave a
/// sub-minimum chunk is passed over in favor of the window edge.
fn forced_break(content: &str, cursor: usize, opts: &SegmentOptions) -> usize {
    let mut window_end = floor_char_boundary(content, cursor + opts.max_size * CHARS_PER_WORD);
    if window_end <= cursor {
        window_end = content.len();
    }

    let slice = &content[cursor..window_end];
    let last_sentence = slice.rfind(". ").map(|i| cursor + i + 1);
    let last_paragraph = slice.rfind("\n\n").map(|i| cursor + i + 2);

    let end = match (last_sentence, last_paragraph) {
        (Some(s), Some(p)) => {
            if s > p {
                s
            } else {
                p
            }
        }
        (Some(s), None) => s,
        (None, Some(p)) => p,
        (None, None) => window_end,
    };

    if end <= cursor || count_words(&content[cursor..end]) < opts.min_size {
        window_end
    } else {
        end
    }
}

/// Find natural break candidates, in ascending byte-offset order:
/// major section breaks, paragraph breaks, and sentence endings that do
/// not look like abbreviations.
fn natural_breaks(text: &str) -> Vec<usize> {
    let mut breaks: BTreeSet<usize> = BTreeSet::new();

    for m in TRIPLE_NEWLINE.find_iter(text) {
        breaks.insert(m.start());
    }
    for m in DOUBLE_NEWLINE.find_iter(text) {
        breaks.insert(m.start());
    }

    for caps in SENTENCE_END.captures_iter(text) {
        let punct = caps.get(1).unwrap();
        let whole = caps.get(0).unwrap();

        // Skip likely abbreviations: the preceding text already ends in a
        // period, or the following token is an uppercase run.
        let before_start = floor_char_boundary(text, whole.start().saturating_sub(10));
        let before = text[before_start..whole.start()].trim_end();
        if before.ends_with('.') {
            continue;
        }
        let following = text[whole.end()..].split_whitespace().next().unwrap_or("");
        if following.len() >= 2 && following.chars().all(|c| c.is_ascii_uppercase()) {
            continue;
        }

        breaks.insert(punct.end());
    }

    breaks.into_iter().collect()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text(paragraphs: usize) -> String {
        let mut out = String::new();
        for i in 0..paragraphs {
            out.push_str(&format!(
                "Paragraph number {i} opens with a clear statement of purpose. \
                 It continues with supporting detail that carries the argument forward. \
                 Finally it closes with a short conclusion for the section.\n\n"
            ));
        }
        out
    }

    fn small_opts() -> SegmentOptions {
        SegmentOptions {
            target_size: 60,
            min_size: 20,
            max_size: 80,
            overlap_words: 5,
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(segment("", &SegmentOptions::default()).is_empty());
        assert!(segment("   \n\n  ", &SegmentOptions::default()).is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk() {
        let chunks = segment("One short sentence.", &small_opts());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "One short sentence.");
        assert_eq!(chunks[0].id, "chunk-1");
    }

    #[test]
    fn bounds_hold_for_all_but_last_chunk() {
        let text = sample_text(30);
        let opts = small_opts();
        let chunks = segment(&text, &opts);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.word_count >= opts.min_size && chunk.word_count <= opts.max_size,
                "chunk {} has {} words",
                chunk.id,
                chunk.word_count
            );
        }
    }

    #[test]
    fn chunks_cover_the_whole_source() {
        let text = sample_text(25);
        let chunks = segment(&text, &small_opts());

        // Every character position must fall within at least one chunk's
        // [start_offset, end_offset) span.
        let mut covered_to = 0usize;
        for chunk in &chunks {
            assert!(chunk.start_offset <= covered_to);
            covered_to = covered_to.max(chunk.end_offset);
        }
        assert!(covered_to >= text.trim_end().len());
    }

    #[test]
    fn adjacent_chunks_share_overlap_words() {
        let text = sample_text(30);
        let opts = small_opts();
        let chunks = segment(&text, &opts);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_offset < pair[0].end_offset,
                "expected overlap between {} and {}",
                pair[0].id,
                pair[1].id
            );
        }
    }

    #[test]
    fn forces_break_when_no_paragraphs_exist() {
        // One giant run of sentences with no paragraph breaks.
        let text = "The quick brown fox jumps over the lazy dog near the river bank. ".repeat(200);
        let chunks = segment(&text, &small_opts());
        assert!(chunks.len() > 1);
    }

    #[test]
    fn early_break_does_not_produce_tiny_mid_chunk() {
        // A short opening sentence, then a long unbroken run. Committing
        // at the opening boundary would leave a chunk far below the
        // minimum.
        let text = format!("Short opening line ends here. {}", "filler ".repeat(400));
        let opts = small_opts();
        let chunks = segment(&text, &opts);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.word_count >= opts.min_size,
                "chunk {} has {} words",
                chunk.id,
                chunk.word_count
            );
        }
    }

    #[test]
    fn terminates_on_pathological_input() {
        // No sentence or paragraph boundaries at all.
        let text = "word ".repeat(500);
        let chunks = segment(&text, &small_opts());
        assert!(!chunks.is_empty());
    }

    #[test]
    fn multibyte_input_never_splits_characters() {
        let text = "Ünïcödé wörds ärrïvé hëré ïn ä stëädy strëäm. ".repeat(100);
        let chunks = segment(&text, &small_opts());
        for chunk in chunks {
            assert!(!chunk.text.is_empty());
        }
    }
}
