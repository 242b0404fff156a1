//! Evaluation loop state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationId(pub i64);

impl std::fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an evaluation. Only `Evaluating` may transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    #[default]
    Evaluating,
    Converged,
    Failed,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evaluating => "evaluating",
            Self::Converged => "converged",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "converged" => Self::Converged,
            "failed" => Self::Failed,
            _ => Self::Evaluating,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Evaluating)
    }
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stopping rules for an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceCriteria {
    pub min_confidence: f64,
    pub max_gaps: usize,
    pub max_contradictions: usize,
    /// A confidence delta below this counts as no progress
    pub marginal_gain_threshold: f64,
    /// Consecutive no-progress rounds before the plateau stop fires
    pub marginal_gain_patience: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            max_gaps: 2,
            max_contradictions: 0,
            marginal_gain_threshold: 0.02,
            marginal_gain_patience: 2,
        }
    }
}

/// Per-key overrides applied on top of the default criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaOverride {
    pub min_confidence: Option<f64>,
    pub max_gaps: Option<usize>,
    pub max_contradictions: Option<usize>,
    pub marginal_gain_threshold: Option<f64>,
    pub marginal_gain_patience: Option<usize>,
}

impl CriteriaOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_confidence(mut self, value: f64) -> Self {
        self.min_confidence = Some(value);
        self
    }

    pub fn max_gaps(mut self, value: usize) -> Self {
        self.max_gaps = Some(value);
        self
    }

    pub fn max_contradictions(mut self, value: usize) -> Self {
        self.max_contradictions = Some(value);
        self
    }

    pub fn marginal_gain_threshold(mut self, value: f64) -> Self {
        self.marginal_gain_threshold = Some(value);
        self
    }

    pub fn marginal_gain_patience(mut self, value: usize) -> Self {
        self.marginal_gain_patience = Some(value);
        self
    }

    /// Overlay the set keys onto `base`.
    pub fn apply(&self, base: &ConvergenceCriteria) -> ConvergenceCriteria {
        ConvergenceCriteria {
            min_confidence: self.min_confidence.unwrap_or(base.min_confidence),
            max_gaps: self.max_gaps.unwrap_or(base.max_gaps),
            max_contradictions: self.max_contradictions.unwrap_or(base.max_contradictions),
            marginal_gain_threshold: self
                .marginal_gain_threshold
                .unwrap_or(base.marginal_gain_threshold),
            marginal_gain_patience: self
                .marginal_gain_patience
                .unwrap_or(base.marginal_gain_patience),
        }
    }
}

/// One recorded confidence observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub confidence: f64,
    /// Change against the previous entry (against 0 for the first)
    pub delta: f64,
}

/// Beta posterior over the payoff of investigating one gap topic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapPosterior {
    pub alpha: f64,
    pub beta: f64,
    pub attempts: u32,
    pub total_gain: f64,
}

impl Default for GapPosterior {
    /// Uniform Beta(1, 1) prior.
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            attempts: 0,
            total_gain: 0.0,
        }
    }
}

impl GapPosterior {
    /// Posterior mean, alpha / (alpha + beta).
    pub fn expected_value(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Record the confidence gain observed after investigating the topic.
    ///
    /// A gain at or above `threshold` is a success.
    pub fn observe(&mut self, gain: f64, threshold: f64) {
        self.attempts += 1;
        self.total_gain += gain;
        if gain >= threshold {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }
}

/// Convergence tracker for one research entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    /// Entity this evaluation tracks
    pub parent_id: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: EvaluationStatus,
    pub confidence: f64,
    pub gaps: Vec<String>,
    pub contradictions: Vec<String>,
    pub criteria: ConvergenceCriteria,
    pub confidence_history: Vec<HistoryEntry>,
    pub gap_posteriors: BTreeMap<String, GapPosterior>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    /// A fresh evaluation at iteration 1 with no observations.
    pub fn new(
        parent_id: impl Into<String>,
        max_iterations: u32,
        criteria: ConvergenceCriteria,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EvaluationId(0),
            parent_id: parent_id.into(),
            iteration: 1,
            max_iterations,
            status: EvaluationStatus::Evaluating,
            confidence: 0.0,
            gaps: Vec::new(),
            contradictions: Vec::new(),
            criteria,
            confidence_history: Vec::new(),
            gap_posteriors: BTreeMap::new(),
            decision: None,
            rationale: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial update applied by `update_evaluation`. Unset fields are untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationUpdate {
    pub confidence: Option<f64>,
    pub gaps: Option<Vec<String>>,
    pub contradictions: Option<Vec<String>>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub status: Option<EvaluationStatus>,
    pub iteration: Option<u32>,
    /// Topic -> confidence gain observed by investigating it
    pub gap_results: BTreeMap<String, f64>,
}

impl EvaluationUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn gaps<I, S>(mut self, gaps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gaps = Some(gaps.into_iter().map(Into::into).collect());
        self
    }

    pub fn contradictions<I, S>(mut self, contradictions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contradictions = Some(contradictions.into_iter().map(Into::into).collect());
        self
    }

    pub fn decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn status(mut self, status: EvaluationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn gap_result(mut self, topic: impl Into<String>, gain: f64) -> Self {
        self.gap_results.insert(topic.into(), gain);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Outcome of a convergence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceVerdict {
    pub converged: bool,
    pub reason: String,
    /// Stopped by a rule other than the standard criteria
    pub forced: bool,
    pub marginal_gain_stop: bool,
    pub confidence: f64,
    pub gaps: Vec<String>,
    pub contradictions: Vec<String>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub confidence_history: Vec<HistoryEntry>,
}

/// A gap topic chosen by Thompson sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapSelection {
    pub topic: String,
    /// The Beta draw this topic was ranked by
    pub thompson_score: f64,
    pub alpha: f64,
    pub beta: f64,
    pub attempts: u32,
    pub total_gain: f64,
    pub expected_value: f64,
}
