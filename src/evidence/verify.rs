//! Search-augmented claim verification.
//!
//! Each atomic fact of a claim is checked against the knowledge base (other
//! claims that share its key terms) and, when one is supplied, an external
//! search collaborator. The search collaborator is optional and fallible: a
//! failure counts as zero hits and verification carries on in KB-only mode.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::types::{round3, ClaimId, SourceId, VerificationMethod, VerificationRecord};
use crate::error::Result;

/// One result returned by an external search collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// External evidence search collaborator.
pub trait EvidenceSearch {
    /// Search for evidence about a claim text.
    fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    /// Whether this collaborator can return results at all.
    ///
    /// Verification through a collaborator that reports `false` is recorded
    /// as KB-only.
    fn is_available(&self) -> bool {
        true
    }
}

/// Null-object search collaborator: never returns anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSearch;

impl EvidenceSearch for NoSearch {
    fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }

    fn is_available(&self) -> bool {
        false
    }
}

impl<F> EvidenceSearch for F
where
    F: Fn(&str) -> Result<Vec<SearchHit>>,
{
    fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self(query)
    }
}

static KEY_TERM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("invalid regex"));

/// Build an FTS5 `MATCH` expression from the key terms of a text.
///
/// Uses the first 8 words of three or more letters, OR-joined. Returns `None`
/// when the text has no usable terms.
pub fn fts_terms(text: &str) -> Option<String> {
    let terms: Vec<String> = KEY_TERM_PATTERN
        .find_iter(text)
        .take(8)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Build an FTS5 `MATCH` expression that hits any whitespace-separated word
/// of `query`.
///
/// Each word is quoted, so FTS operators and punctuation in the query are
/// searched for literally. Returns `None` for a blank query.
pub fn fts_any_word(query: &str) -> Option<String> {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| format!("\"{}\"", w.replace('"', "\"\"")))
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" OR "))
    }
}

/// Outcome class for one verified atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomVerdict {
    /// No evidence at all
    Unverified,
    /// Two or more external hits
    ExternallyVerified,
    /// Two or more corroborating claims in the knowledge base
    KbCorroborated,
    /// Some evidence, but not enough for either of the above
    WeaklySupported,
}

impl AtomVerdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::ExternallyVerified | Self::KbCorroborated)
    }
}

/// Score an atom from its KB and external hit counts.
pub fn score_atom(kb_hits: usize, external_hits: usize) -> (f64, AtomVerdict) {
    let support = kb_hits + external_hits;
    let (score, verdict) = if support == 0 {
        (0.3, AtomVerdict::Unverified)
    } else if external_hits >= 2 {
        (
            (0.6 + external_hits as f64 * 0.1 + kb_hits as f64 * 0.05).min(0.95),
            AtomVerdict::ExternallyVerified,
        )
    } else if kb_hits >= 2 {
        (
            (0.5 + kb_hits as f64 * 0.08).min(0.85),
            AtomVerdict::KbCorroborated,
        )
    } else {
        (0.4 + support as f64 * 0.1, AtomVerdict::WeaklySupported)
    };
    (round3(score), verdict)
}

/// Another claim in the knowledge base that corroborates an atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbEvidence {
    pub claim_id: ClaimId,
    pub text: String,
    pub confidence: f64,
}

/// External evidence registered as a source during verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvidence {
    pub source_id: SourceId,
    pub url: String,
    pub snippet: String,
}

/// Verification outcome for a single atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomResult {
    pub atom_id: ClaimId,
    pub atom: String,
    pub score: f64,
    pub verdict: AtomVerdict,
    pub kb_evidence: Vec<KbEvidence>,
    pub web_evidence: Vec<WebEvidence>,
}

/// Verification outcome for a whole claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub claim_id: ClaimId,
    pub claim_text: String,
    /// 0.6 * mean atom score + 0.4 * min atom score
    pub factuality_score: f64,
    pub avg_atom_score: f64,
    pub min_atom_score: f64,
    pub verified_atoms: usize,
    pub total_atoms: usize,
    pub atom_results: Vec<AtomResult>,
    pub method: VerificationMethod,
}

impl VerificationReport {
    /// Aggregate atom results into a report.
    pub fn aggregate(
        claim_id: ClaimId,
        claim_text: impl Into<String>,
        atom_results: Vec<AtomResult>,
        method: VerificationMethod,
    ) -> Self {
        let (avg, min) = if atom_results.is_empty() {
            (0.3, 0.3)
        } else {
            let n = atom_results.len() as f64;
            let avg = atom_results.iter().map(|r| r.score).sum::<f64>() / n;
            let min = atom_results
                .iter()
                .map(|r| r.score)
                .fold(f64::INFINITY, f64::min);
            (avg, min)
        };
        let verified_atoms = atom_results
            .iter()
            .filter(|r| r.verdict.is_verified())
            .count();

        Self {
            claim_id,
            claim_text: claim_text.into(),
            factuality_score: round3(avg * 0.6 + min * 0.4),
            avg_atom_score: round3(avg),
            min_atom_score: round3(min),
            verified_atoms,
            total_atoms: atom_results.len(),
            atom_results,
            method,
        }
    }

    /// Metadata record persisted on the claim.
    pub fn record(&self) -> VerificationRecord {
        VerificationRecord {
            avg_score: self.avg_atom_score,
            min_score: self.min_atom_score,
            verified_atoms: self.verified_atoms,
            total_atoms: self.total_atoms,
            method: self.method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_fts_terms() {
        assert_eq!(
            fts_terms("The JET tokamak set a 69 MJ record!").as_deref(),
            Some("the OR jet OR tokamak OR set OR record")
        );
        assert_eq!(fts_terms("a 1 b 22"), None);

        let long = "alpha beta gamma delta epsilon zeta theta iota kappa lambda";
        assert_eq!(fts_terms(long).unwrap().split(" OR ").count(), 8);
    }

    #[test]
    fn test_fts_any_word_quotes_each_word() {
        assert_eq!(
            fts_any_word("  tokamak   AND \"plasma\"  ").as_deref(),
            Some(r#""tokamak" OR "AND" OR """plasma"""#)
        );
        assert_eq!(fts_any_word(" \t "), None);
    }

    #[test]
    fn test_score_atom() {
        assert_eq!(score_atom(0, 0), (0.3, AtomVerdict::Unverified));
        assert_eq!(score_atom(1, 2), (0.85, AtomVerdict::ExternallyVerified));
        assert_eq!(score_atom(5, 4), (0.95, AtomVerdict::ExternallyVerified));
        assert_eq!(score_atom(3, 0), (0.74, AtomVerdict::KbCorroborated));
        assert_eq!(score_atom(10, 1), (0.85, AtomVerdict::KbCorroborated));
        assert_eq!(score_atom(1, 1), (0.6, AtomVerdict::WeaklySupported));
        assert_eq!(score_atom(0, 1), (0.5, AtomVerdict::WeaklySupported));
    }

    #[test]
    fn test_aggregate_report() {
        let atom = |score, verdict| AtomResult {
            atom_id: ClaimId(1),
            atom: "a".into(),
            score,
            verdict,
            kb_evidence: vec![],
            web_evidence: vec![],
        };
        let report = VerificationReport::aggregate(
            ClaimId(1),
            "claim",
            vec![
                atom(0.85, AtomVerdict::ExternallyVerified),
                atom(0.3, AtomVerdict::Unverified),
            ],
            VerificationMethod::SafeSearch,
        );
        assert_eq!(report.avg_atom_score, 0.575);
        assert_eq!(report.min_atom_score, 0.3);
        assert_eq!(report.factuality_score, 0.465);
        assert_eq!(report.verified_atoms, 1);
        assert_eq!(report.record().total_atoms, 2);
    }

    #[test]
    fn test_closure_and_null_collaborators() {
        let failing = |_: &str| -> Result<Vec<SearchHit>> { Err(Error::external_search("timeout")) };
        assert!(failing.search("x").is_err());
        assert!(failing.is_available());

        assert!(NoSearch.search("x").unwrap().is_empty());
        assert!(!NoSearch.is_available());
    }
}
