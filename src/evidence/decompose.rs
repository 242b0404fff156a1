//! Claim complexity analysis and heuristic decomposition into atomic claims.
//!
//! A compound claim ("X rose 30%; it also did Y") is harder to grade than the
//! facts it bundles. The decomposer scores how compound a claim looks and,
//! past a threshold, splits it on semicolons and on `and` boundaries that
//! introduce a new capitalized clause.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::config::DecompositionConfig;
use crate::error::Error;

static CONJUNCTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(and|also|additionally|furthermore|moreover)\b").expect("invalid regex")
});

static RELATIVE_CLAUSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(which|that|where|when|while|whereas)\b").expect("invalid regex")
});

static SENTENCE_BREAK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s").expect("invalid regex"));

static NUMERIC_UNIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.?\d*\s*(%|°|MW|GW|km|m\b|kg|ton|year|eV|keV|MeV)").expect("invalid regex")
});

static SEMICOLON_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*;\s*").expect("invalid regex"));

// The capital letter is matched (not consumed into either side) so the split
// point is the start of the following clause.
static AND_CLAUSE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",?\s+and\s+([A-Z])").expect("invalid regex"));

/// How a claim should be decomposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMethod {
    /// Complexity-gated heuristic split
    #[default]
    Auto,
    /// Same gate and split as `Auto`, requested explicitly
    Heuristic,
    /// Never split; marks the claim singleton
    None,
}

impl FromStr for DecompositionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "heuristic" => Ok(Self::Heuristic),
            "none" => Ok(Self::None),
            other => Err(Error::MalformedInput(format!(
                "unknown decomposition method: {other}"
            ))),
        }
    }
}

/// Text features behind the complexity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimComplexity {
    /// Weighted score, rounded to 2 decimals
    pub score: f64,
    pub conjunctions: usize,
    pub semicolons: usize,
    pub relative_clauses: usize,
    pub sentences: usize,
    pub numerics: usize,
    pub word_count: usize,
    pub needs_decomposition: bool,
}

impl ClaimComplexity {
    /// Human-readable list of the features that contributed to the score.
    pub fn active_features(&self) -> Vec<&'static str> {
        let mut features = Vec::new();
        if self.conjunctions > 0 {
            features.push("conjunctions");
        }
        if self.semicolons > 0 {
            features.push("semicolons");
        }
        if self.relative_clauses > 0 {
            features.push("relative_clauses");
        }
        if self.sentences > 1 {
            features.push("multi_sentence");
        }
        if self.numerics > 1 {
            features.push("multi_numeric");
        }
        if self.word_count > 25 {
            features.push("long");
        }
        features
    }
}

/// Result of planning a decomposition.
#[derive(Debug, Clone, PartialEq)]
pub enum DecompositionPlan {
    /// Keep the claim whole
    Singleton,
    /// Split into these atomic texts (always two or more)
    Split(Vec<String>),
}

/// Heuristic claim decomposer.
#[derive(Debug, Clone)]
pub struct ClaimDecomposer {
    /// Complexity score a claim must exceed to be split
    pub threshold: f64,
    /// Fragments with fewer words are discarded
    pub min_fragment_words: usize,
}

impl Default for ClaimDecomposer {
    fn default() -> Self {
        Self::from_config(&DecompositionConfig::default())
    }
}

impl ClaimDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DecompositionConfig) -> Self {
        Self {
            threshold: config.threshold,
            min_fragment_words: config.min_fragment_words,
        }
    }

    /// Score how compound a claim is.
    pub fn complexity(&self, text: &str) -> ClaimComplexity {
        let word_count = text.split_whitespace().count();
        let conjunctions = CONJUNCTION_PATTERN.find_iter(text).count();
        let semicolons = text.matches(';').count();
        let relative_clauses = RELATIVE_CLAUSE_PATTERN.find_iter(text).count();
        let sentences = SENTENCE_BREAK_PATTERN.find_iter(text).count() + 1;
        let numerics = NUMERIC_UNIT_PATTERN.find_iter(text).count();

        let raw = conjunctions as f64 * 1.0
            + semicolons as f64 * 1.5
            + relative_clauses as f64 * 0.8
            + sentences.saturating_sub(1) as f64 * 1.2
            + numerics.saturating_sub(1) as f64 * 0.7
            + ((word_count as f64 - 25.0) / 20.0).max(0.0) * 0.5;
        let score = (raw * 100.0).round() / 100.0;

        ClaimComplexity {
            score,
            conjunctions,
            semicolons,
            relative_clauses,
            sentences,
            numerics,
            word_count,
            needs_decomposition: score > self.threshold,
        }
    }

    /// Split text into candidate atomic claims.
    ///
    /// Splits on semicolons, then on `and` joining a capitalized clause, and
    /// drops fragments shorter than `min_fragment_words`.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();

        for segment in SEMICOLON_SPLIT.split(text) {
            let segment = segment.trim().trim_end_matches('.');
            if segment.is_empty() {
                continue;
            }

            let mut start = 0;
            for caps in AND_CLAUSE_BOUNDARY.captures_iter(segment) {
                let (Some(whole), Some(capital)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                parts.push(segment[start..whole.start()].to_string());
                start = capital.start();
            }
            parts.push(segment[start..].to_string());
        }

        parts
            .into_iter()
            .map(|p| p.trim().trim_end_matches('.').to_string())
            .filter(|p| !p.is_empty())
            .filter(|p| p.split_whitespace().count() >= self.min_fragment_words)
            .collect()
    }

    /// Decide whether and how a claim should be split.
    pub fn plan(&self, text: &str, method: DecompositionMethod) -> DecompositionPlan {
        if method == DecompositionMethod::None || text.trim().is_empty() {
            return DecompositionPlan::Singleton;
        }

        if !self.complexity(text).needs_decomposition {
            return DecompositionPlan::Singleton;
        }

        let parts = self.split(text);
        if parts.len() <= 1 {
            DecompositionPlan::Singleton
        } else {
            DecompositionPlan::Split(parts)
        }
    }
}
