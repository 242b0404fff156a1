//! Quote extraction for grounding claims in source text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::types::SourceId;

/// Sentences shorter than this are not worth quoting.
const MIN_QUOTE_CHARS: usize = 15;

/// Method tag recorded on claims created from a quote.
pub const GROUNDING_METHOD: &str = "FRONT";

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("invalid regex"));

static NUMERIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("invalid regex"));

static CITATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\d,]+\]|\(\d{4}\)").expect("invalid regex"));

/// A quotable sentence from a source snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Position of the sentence in the snippet, counting skipped ones
    pub index: usize,
    pub text: String,
    pub length: usize,
    pub has_numeric: bool,
    /// `[1,2]`-style reference or a `(2024)` year marker
    pub has_citation: bool,
}

/// Quotes extracted from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteExtraction {
    pub source_id: SourceId,
    pub url: String,
    pub title: String,
    pub credibility: f64,
    pub quotes: Vec<Quote>,
}

/// Split text after sentence-ending punctuation that is followed by whitespace.
///
/// The punctuation stays with its sentence; the whitespace run is dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        // the terminator is a single ASCII byte
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Extract quotable sentences from a snippet.
pub fn extract_quotes(snippet: &str) -> Vec<Quote> {
    split_sentences(snippet)
        .into_iter()
        .enumerate()
        .filter_map(|(index, sentence)| {
            let text = sentence.trim();
            let length = text.chars().count();
            if length < MIN_QUOTE_CHARS {
                return None;
            }
            Some(Quote {
                index,
                text: text.to_string(),
                length,
                has_numeric: NUMERIC_PATTERN.is_match(text),
                has_citation: CITATION_PATTERN.is_match(text),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One two. Three four!  Five? Six"),
            vec!["One two.", "Three four!", "Five?", "Six"]
        );
        assert_eq!(split_sentences("Version 2.1 shipped."), vec!["Version 2.1 shipped."]);
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn test_split_keeps_terminator_and_drops_whitespace_run() {
        assert_eq!(
            split_sentences("Réacteur prêt. \n\t Ça marche?\u{a0}Oui"),
            vec!["Réacteur prêt.", "Ça marche?", "Oui"]
        );
        assert_eq!(split_sentences("Done. "), vec!["Done."]);
        assert_eq!(split_sentences("e.g.this stays"), vec!["e.g.this stays"]);
    }

    #[test]
    fn test_extract_quotes_flags() {
        let snippet = "Short one. The reactor produced 59 MJ of energy [3,4]. \
                       Results were confirmed by Smith (2022). Ok.";
        let quotes = extract_quotes(snippet);

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].index, 1);
        assert!(quotes[0].has_numeric);
        assert!(quotes[0].has_citation);

        assert_eq!(quotes[1].text, "Results were confirmed by Smith (2022).");
        assert!(quotes[1].has_citation);
        assert_eq!(quotes[1].length, quotes[1].text.len());
    }

    #[test]
    fn test_plain_sentence_has_no_flags() {
        let quotes = extract_quotes("Plasma confinement improved considerably.");
        assert_eq!(quotes.len(), 1);
        assert!(!quotes[0].has_numeric);
        assert!(!quotes[0].has_citation);
    }
}
