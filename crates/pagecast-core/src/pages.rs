//! Page-marker parsing for stored document content.
//!
//! Analysis results are stored as one flat text blob with `Page N`
//! headings separating the per-page sections. Audio jobs parse that blob
//! back into pages so narration can be produced page by page.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)Page\s+(\d+)\s*(?:Analysis|:|-\s*|\.\s*|$)").unwrap());

/// One page section recovered from stored content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPage {
    pub page_number: u32,
    pub content: String,
    /// First line of the section, used for logging and progress labels
    pub title: String,
}

/// Split stored document content into per-page sections.
///
/// A marker opens a new section at its match position; the first marker
/// also claims any preamble before it. Content with no markers at all
/// becomes a single page titled `Document Content`.
pub fn parse_pages(content: &str) -> Vec<ParsedPage> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let markers: Vec<(usize, u32)> = PAGE_MARKER
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse::<u32>().ok()?;
            Some((whole.start(), number))
        })
        .collect();

    if markers.is_empty() {
        return vec![ParsedPage {
            page_number: 1,
            content: trimmed.to_string(),
            title: "Document Content".to_string(),
        }];
    }

    let mut pages = Vec::with_capacity(markers.len());
    for (i, &(start, number)) in markers.iter().enumerate() {
        // The first section absorbs any preamble before its marker.
        let section_start = if i == 0 { 0 } else { start };
        let section_end = markers
            .get(i + 1)
            .map(|&(next, _)| next)
            .unwrap_or(content.len());

        let section = content[section_start..section_end].trim();
        if section.is_empty() {
            continue;
        }

        let title = section.lines().next().unwrap_or("").trim().to_string();
        pages.push(ParsedPage {
            page_number: number,
            content: section.to_string(),
            title,
        });
    }

    if pages.is_empty() {
        return vec![ParsedPage {
            page_number: 1,
            content: trimmed.to_string(),
            title: "Document Content".to_string(),
        }];
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarked_content_is_a_single_page() {
        let pages = parse_pages("Just a plain summary with no markers.");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].title, "Document Content");
    }

    #[test]
    fn empty_content_yields_no_pages() {
        assert!(parse_pages("   \n  ").is_empty());
    }

    #[test]
    fn splits_on_analysis_markers() {
        let content = "Page 1 Analysis\nFirst page body.\n\nPage 2 Analysis\nSecond page body.";
        let pages = parse_pages(content);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert!(pages[0].content.contains("First page body."));
        assert_eq!(pages[1].page_number, 2);
        assert!(pages[1].content.contains("Second page body."));
    }

    #[test]
    fn accepts_colon_and_dash_marker_forms() {
        let content = "page 3: intro text\nBody three.\nPage 4 - follow-up\nBody four.";
        let pages = parse_pages(content);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 3);
        assert_eq!(pages[1].page_number, 4);
    }

    #[test]
    fn first_section_absorbs_preamble() {
        let content = "Overview preamble.\nPage 1 Analysis\nBody.\nPage 2 Analysis\nMore.";
        let pages = parse_pages(content);
        assert_eq!(pages.len(), 2);
        assert!(pages[0].content.starts_with("Overview preamble."));
    }

    #[test]
    fn title_is_the_first_line_of_the_section() {
        let content = "Page 1 Analysis\nBody text here.";
        let pages = parse_pages(content);
        assert_eq!(pages[0].title, "Page 1 Analysis");
    }

    #[test]
    fn bare_page_number_at_line_end_is_a_marker() {
        let content = "Page 1\nAlpha.\nPage 2\nBeta.";
        let pages = parse_pages(content);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_number, 2);
    }
}
