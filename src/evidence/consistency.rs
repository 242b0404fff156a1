//! Self-consistency grading.
//!
//! Re-runs the grading decision tree several times over noisy copies of a
//! claim's evidence tally and takes a majority vote. The spread of the votes
//! becomes part of the confidence: a claim whose grade flips under small
//! perturbations is penalized relative to one that never does.
//!
//! Perturbations per trial:
//! - Gaussian noise on the confidence of contested / ungraded outcomes
//! - Gaussian noise on the mean supporting credibility (clamped to [0, 1])
//! - a -1 / 0 / +1 jitter on the supporting-source count (floored at 1)
//!
//! Only the tally is perturbed; source links are never touched.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use super::grader::{contested_confidence, grade_support, EvidenceTally, UNGRADED_CONFIDENCE};
use super::types::{round3, EvidenceGrade, GradeCount, Grading, SelfConsistencyRecord};
use crate::config::SelfConsistencyConfig;
use crate::error::{Error, Result};

/// Aggregated outcome of a self-consistency run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyOutcome {
    /// Majority grade with the agreement-weighted confidence
    pub majority: Grading,
    /// Fraction of samples that voted for the majority grade
    pub agreement: f64,
    /// Vote counts in the order grades were first drawn
    pub distribution: Vec<GradeCount>,
    /// Mean confidence of the samples that agreed with the majority
    pub agreeing_confidence: f64,
    /// (min, max) of all sampled confidences
    pub confidence_range: (f64, f64),
    pub n_samples: usize,
}

impl ConsistencyOutcome {
    /// Metadata record persisted on the claim.
    pub fn record(&self) -> SelfConsistencyRecord {
        SelfConsistencyRecord {
            n_samples: self.n_samples,
            grade_distribution: self.distribution.clone(),
            agreement: round3(self.agreement),
            confidence_range: (
                round3(self.confidence_range.0),
                round3(self.confidence_range.1),
            ),
        }
    }
}

/// Majority-vote a set of sampled gradings.
///
/// Ties go to the grade that was drawn first. Returns `None` for no samples.
pub fn aggregate(samples: &[Grading]) -> Option<ConsistencyOutcome> {
    if samples.is_empty() {
        return None;
    }

    let mut distribution: Vec<GradeCount> = Vec::new();
    for sample in samples {
        match distribution.iter_mut().find(|c| c.grade == sample.grade) {
            Some(entry) => entry.count += 1,
            None => distribution.push(GradeCount {
                grade: sample.grade,
                count: 1,
            }),
        }
    }

    let max_count = distribution.iter().map(|c| c.count).max().unwrap_or(0);
    let majority_grade = distribution
        .iter()
        .find(|c| c.count == max_count)
        .map(|c| c.grade)
        .unwrap_or(EvidenceGrade::Ungraded);

    let agreement = max_count as f64 / samples.len() as f64;
    let agreeing: Vec<f64> = samples
        .iter()
        .filter(|s| s.grade == majority_grade)
        .map(|s| s.confidence)
        .collect();
    let agreeing_confidence = agreeing.iter().sum::<f64>() / agreeing.len() as f64;

    let (min, max) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.confidence), hi.max(s.confidence))
    });

    Some(ConsistencyOutcome {
        majority: Grading::new(
            majority_grade,
            round3(agreeing_confidence * (0.8 + 0.2 * agreement)),
        ),
        agreement,
        distribution,
        agreeing_confidence,
        confidence_range: (min, max),
        n_samples: samples.len(),
    })
}

/// Grader that samples the decision tree under input noise.
#[derive(Debug, Clone)]
pub struct SelfConsistencyGrader {
    confidence_noise: Normal<f64>,
    credibility_noise: Normal<f64>,
    count_jitter: WeightedIndex<f64>,
    default_samples: usize,
}

impl SelfConsistencyGrader {
    pub fn from_config(config: &SelfConsistencyConfig) -> Result<Self> {
        let confidence_noise = Normal::new(0.0, config.confidence_sigma)
            .map_err(|e| Error::Config(format!("confidence_sigma: {e}")))?;
        let credibility_noise = Normal::new(0.0, config.credibility_sigma)
            .map_err(|e| Error::Config(format!("credibility_sigma: {e}")))?;
        let count_jitter = WeightedIndex::new(config.jitter_weights)
            .map_err(|e| Error::Config(format!("jitter_weights: {e}")))?;

        Ok(Self {
            confidence_noise,
            credibility_noise,
            count_jitter,
            default_samples: config.n_samples,
        })
    }

    /// Number of samples used when the caller does not specify one.
    pub fn default_samples(&self) -> usize {
        self.default_samples
    }

    /// Draw one perturbed grading of `tally`.
    pub fn sample<R: Rng + ?Sized>(&self, tally: &EvidenceTally, rng: &mut R) -> Grading {
        let grading = if tally.supporting > 0 && tally.contradicting > 0 {
            Grading::new(
                EvidenceGrade::Contested,
                contested_confidence(tally.supporting, tally.contradicting)
                    + self.confidence_noise.sample(rng),
            )
        } else if tally.supporting == 0 {
            Grading::new(
                EvidenceGrade::Ungraded,
                UNGRADED_CONFIDENCE + self.confidence_noise.sample(rng),
            )
        } else {
            let avg_credibility = (tally.avg_support_credibility
                + self.credibility_noise.sample(rng))
            .clamp(0.0, 1.0);
            // index 0/1/2 -> -1/0/+1
            let jitter = self.count_jitter.sample(rng) as i64 - 1;
            let effective = (tally.supporting as i64 + jitter).max(1) as usize;
            grade_support(effective, avg_credibility)
        };

        Grading::new(grading.grade, grading.confidence.clamp(0.0, 1.0))
    }

    /// Sample `n_samples` gradings and aggregate them.
    pub fn grade<R: Rng + ?Sized>(
        &self,
        tally: &EvidenceTally,
        n_samples: usize,
        rng: &mut R,
    ) -> Result<ConsistencyOutcome> {
        let samples: Vec<Grading> = (0..n_samples).map(|_| self.sample(tally, rng)).collect();
        aggregate(&samples)
            .ok_or_else(|| Error::MalformedInput("n_samples must be at least 1".to_string()))
    }
}
