//! Engine configuration.
//!
//! Everything tunable about grading, decomposition, convergence and decay lives
//! in [`EngineConfig`]. The domain credibility table is compiled in and is not
//! part of the runtime configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::evaluation::ConvergenceCriteria;

/// Claim decomposition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Complexity score a claim must exceed to be split
    pub threshold: f64,
    /// Fragments with fewer words are dropped when splitting
    pub min_fragment_words: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            threshold: 1.5,
            min_fragment_words: 3,
        }
    }
}

/// Self-consistency sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfConsistencyConfig {
    /// Samples drawn when the caller does not specify a count
    pub n_samples: usize,
    /// Std-dev of the noise added to contested / ungraded confidence
    pub confidence_sigma: f64,
    /// Std-dev of the noise added to mean supporting credibility
    pub credibility_sigma: f64,
    /// Weights of the -1 / 0 / +1 jitter on the supporting count
    pub jitter_weights: [f64; 3],
}

impl Default for SelfConsistencyConfig {
    fn default() -> Self {
        Self {
            n_samples: 5,
            confidence_sigma: 0.08,
            credibility_sigma: 0.06,
            jitter_weights: [0.2, 0.6, 0.2],
        }
    }
}

/// Time-based confidence decay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Age in days after which a claim starts to decay
    pub days_threshold: i64,
    /// Fractional loss per elapsed period
    pub decay_rate: f64,
    /// Confidence never decays below this value
    pub floor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            days_threshold: 30,
            decay_rate: 0.02,
            floor: 0.1,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub decomposition: DecompositionConfig,
    pub self_consistency: SelfConsistencyConfig,
    /// Criteria applied to new evaluations before caller overrides
    pub convergence: ConvergenceCriteria,
    pub decay: DecayConfig,
    /// Fixed RNG seed for reproducible sampling (entropy when unset)
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Fewer samples and looser convergence, for quick interactive passes.
    pub fn fast() -> Self {
        Self {
            self_consistency: SelfConsistencyConfig {
                n_samples: 3,
                ..Default::default()
            },
            convergence: ConvergenceCriteria {
                min_confidence: 0.6,
                max_gaps: 3,
                marginal_gain_threshold: 0.03,
                marginal_gain_patience: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// More samples and stricter convergence.
    pub fn thorough() -> Self {
        Self {
            decomposition: DecompositionConfig {
                threshold: 1.0,
                ..Default::default()
            },
            self_consistency: SelfConsistencyConfig {
                n_samples: 11,
                ..Default::default()
            },
            convergence: ConvergenceCriteria {
                min_confidence: 0.8,
                max_gaps: 1,
                marginal_gain_threshold: 0.01,
                marginal_gain_patience: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Use a fixed RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse and validate a JSON configuration. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let sc = &self.self_consistency;
        if sc.n_samples == 0 {
            return Err(Error::Config("self_consistency.n_samples must be >= 1".into()));
        }
        if !(sc.confidence_sigma >= 0.0) || !(sc.credibility_sigma >= 0.0) {
            return Err(Error::Config("self_consistency sigmas must be non-negative".into()));
        }
        if sc.jitter_weights.iter().any(|w| !(*w >= 0.0))
            || sc.jitter_weights.iter().sum::<f64>() <= 0.0
        {
            return Err(Error::Config(
                "self_consistency.jitter_weights must be non-negative with a positive sum".into(),
            ));
        }

        if self.decomposition.threshold < 0.0 {
            return Err(Error::Config("decomposition.threshold must be non-negative".into()));
        }

        let cc = &self.convergence;
        if cc.marginal_gain_patience == 0 {
            return Err(Error::Config("convergence.marginal_gain_patience must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&cc.min_confidence) {
            return Err(Error::Config("convergence.min_confidence must be in [0, 1]".into()));
        }

        let decay = &self.decay;
        if !(0.0..=1.0).contains(&decay.decay_rate) || !(0.0..=1.0).contains(&decay.floor) {
            return Err(Error::Config("decay rate and floor must be in [0, 1]".into()));
        }
        Ok(())
    }
}
