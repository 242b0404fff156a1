//! Thompson-sampling bandit over knowledge-gap topics.
//!
//! Each gap topic carries a Beta(alpha, beta) posterior over "investigating
//! this topic raises confidence by at least the marginal-gain threshold".
//! Selection draws once from every eligible posterior and ranks topics by the
//! draw, so repeated calls over the same state explore different orderings.

use rand::Rng;
use rand_distr::{Beta, Distribution};
use tracing::{debug, warn};

use super::types::{Evaluation, GapPosterior, GapSelection};

/// Parameters are floored here before sampling.
const MIN_SHAPE: f64 = 0.01;

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Seed uniform priors for topics not yet tracked. Returns how many were added.
///
/// Existing posteriors are never reset.
pub fn register<I, S>(ev: &mut Evaluation, topics: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut added = 0;
    for topic in topics {
        let topic = topic.into();
        if !ev.gap_posteriors.contains_key(&topic) {
            ev.gap_posteriors.insert(topic, GapPosterior::default());
            added += 1;
        }
    }
    added
}

/// Draw one Thompson sample from a posterior.
///
/// `exploration_bonus` is added to beta before sampling. Falls back to the
/// posterior mean when the parameters cannot form a Beta distribution.
pub fn draw<R: Rng + ?Sized>(posterior: &GapPosterior, exploration_bonus: f64, rng: &mut R) -> f64 {
    let alpha = posterior.alpha.max(MIN_SHAPE);
    let beta = (posterior.beta + exploration_bonus).max(MIN_SHAPE);
    match Beta::new(alpha, beta) {
        Ok(dist) => {
            let x: f64 = dist.sample(rng);
            if x.is_finite() {
                x
            } else {
                alpha / (alpha + beta)
            }
        }
        Err(e) => {
            warn!(alpha, beta, error = %e, "Unusable Beta parameters, using posterior mean");
            alpha / (alpha + beta)
        }
    }
}

/// Pick up to `n` gap topics to investigate next.
///
/// Only topics in the evaluation's current gap list are eligible; topics
/// without a posterior are sampled from the uniform prior.
pub fn select<R: Rng + ?Sized>(
    ev: &Evaluation,
    n: usize,
    exploration_bonus: f64,
    rng: &mut R,
) -> Vec<GapSelection> {
    let mut scored: Vec<GapSelection> = ev
        .gaps
        .iter()
        .map(|topic| {
            let posterior = ev.gap_posteriors.get(topic).copied().unwrap_or_default();
            let score = draw(&posterior, exploration_bonus, rng);
            GapSelection {
                topic: topic.clone(),
                thompson_score: round4(score),
                alpha: posterior.alpha,
                beta: posterior.beta,
                attempts: posterior.attempts,
                total_gain: posterior.total_gain,
                expected_value: round4(posterior.expected_value()),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.thompson_score.total_cmp(&a.thompson_score));
    scored.truncate(n);

    debug!(
        evaluation = %ev.id,
        eligible = ev.gaps.len(),
        selected = scored.len(),
        "Selected gap topics"
    );
    scored
}
