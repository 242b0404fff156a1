//! Convergence rules for the evaluation loop.
//!
//! Checked in priority order:
//!
//! 1. **Hard stop**: `iteration >= max_iterations`.
//! 2. **Plateau**: the last `patience` confidence deltas are all below the
//!    marginal-gain threshold, and the standard criteria are not already met.
//! 3. **Standard**: gaps, contradictions and confidence within bounds.

use chrono::Utc;
use tracing::{debug, warn};

use super::types::{ConvergenceVerdict, Evaluation, EvaluationUpdate, HistoryEntry};

/// Append a confidence observation to the history and make it current.
///
/// The delta is taken against the last history entry, or 0 when the history
/// is empty.
pub fn record_confidence(ev: &mut Evaluation, confidence: f64) {
    let previous = ev
        .confidence_history
        .last()
        .map(|h| h.confidence)
        .unwrap_or(0.0);
    ev.confidence_history.push(HistoryEntry {
        iteration: ev.iteration,
        confidence,
        delta: confidence - previous,
    });
    ev.confidence = confidence;
}

/// Apply a partial update. Returns `false` when nothing was written.
///
/// Terminal evaluations are frozen: any update is refused.
pub fn apply_update(ev: &mut Evaluation, update: EvaluationUpdate) -> bool {
    if update.is_empty() {
        return false;
    }
    if ev.is_terminal() {
        warn!(
            evaluation = %ev.id,
            status = %ev.status,
            "Ignoring update to terminal evaluation"
        );
        return false;
    }

    // History is stamped with the iteration in effect before this update.
    if let Some(confidence) = update.confidence {
        record_confidence(ev, confidence);
    }
    if let Some(gaps) = update.gaps {
        ev.gaps = gaps;
    }
    if let Some(contradictions) = update.contradictions {
        ev.contradictions = contradictions;
    }
    if let Some(decision) = update.decision {
        ev.decision = Some(decision);
    }
    if let Some(rationale) = update.rationale {
        ev.rationale = Some(rationale);
    }
    if let Some(status) = update.status {
        ev.status = status;
    }
    if let Some(iteration) = update.iteration {
        ev.iteration = iteration;
    }

    let threshold = ev.criteria.marginal_gain_threshold;
    for (topic, gain) in update.gap_results {
        let posterior = ev.gap_posteriors.entry(topic.clone()).or_default();
        posterior.observe(gain, threshold);
        debug!(
            evaluation = %ev.id,
            topic = %topic,
            gain,
            alpha = posterior.alpha,
            beta = posterior.beta,
            "Updated gap posterior"
        );
    }

    ev.updated_at = Utc::now();
    true
}

/// The trailing deltas if they form a plateau under the evaluation's criteria.
pub fn plateau_deltas(ev: &Evaluation) -> Option<Vec<f64>> {
    let patience = ev.criteria.marginal_gain_patience;
    let history = &ev.confidence_history;
    if patience == 0 || history.len() < patience {
        return None;
    }

    let recent: Vec<f64> = history[history.len() - patience..]
        .iter()
        .map(|h| h.delta)
        .collect();
    let flat = recent
        .iter()
        .all(|d| d.abs() < ev.criteria.marginal_gain_threshold);
    flat.then_some(recent)
}

/// Standard criteria that are not met, in reporting order.
pub fn unmet_criteria(ev: &Evaluation) -> Vec<String> {
    let c = &ev.criteria;
    let mut reasons = Vec::new();
    if ev.confidence < c.min_confidence {
        reasons.push(format!(
            "confidence {:.2} < {}",
            ev.confidence, c.min_confidence
        ));
    }
    if ev.gaps.len() > c.max_gaps {
        reasons.push(format!("gaps {} > {}", ev.gaps.len(), c.max_gaps));
    }
    if ev.contradictions.len() > c.max_contradictions {
        reasons.push(format!(
            "contradictions {} > {}",
            ev.contradictions.len(),
            c.max_contradictions
        ));
    }
    reasons
}

/// The deltas exactly as recorded, e.g. `[0.0, 0.010000000000000009]`.
fn format_deltas(deltas: &[f64]) -> String {
    let parts: Vec<String> = deltas.iter().map(|d| format!("{d:?}")).collect();
    format!("[{}]", parts.join(", "))
}

/// Evaluate the stopping rules.
pub fn check(ev: &Evaluation) -> ConvergenceVerdict {
    let verdict = |converged, reason: String, forced, marginal_gain_stop| ConvergenceVerdict {
        converged,
        reason,
        forced,
        marginal_gain_stop,
        confidence: ev.confidence,
        gaps: ev.gaps.clone(),
        contradictions: ev.contradictions.clone(),
        iteration: ev.iteration,
        max_iterations: ev.max_iterations,
        confidence_history: ev.confidence_history.clone(),
    };

    if ev.iteration >= ev.max_iterations {
        return verdict(true, "max_iterations_reached".to_string(), true, false);
    }

    let unmet = unmet_criteria(ev);
    if !unmet.is_empty() {
        if let Some(deltas) = plateau_deltas(ev) {
            let reason = format!(
                "marginal_gain_plateau: last {} deltas {} all < {}",
                deltas.len(),
                format_deltas(&deltas),
                ev.criteria.marginal_gain_threshold
            );
            return verdict(true, reason, true, true);
        }
        return verdict(false, unmet.join("; "), false, false);
    }

    verdict(true, "all criteria met".to_string(), false, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::types::{ConvergenceCriteria, EvaluationStatus};
    use pretty_assertions::assert_eq;

    fn evaluation(max_iterations: u32) -> Evaluation {
        Evaluation::new("entity", max_iterations, ConvergenceCriteria::default())
    }

    #[test]
    fn test_history_deltas_chain_from_last_entry() {
        let mut ev = evaluation(5);
        record_confidence(&mut ev, 0.4);
        ev.iteration = 2;
        record_confidence(&mut ev, 0.55);

        let deltas: Vec<f64> = ev.confidence_history.iter().map(|h| h.delta).collect();
        assert_eq!(deltas[0], 0.4);
        assert!((deltas[1] - 0.15).abs() < 1e-12);
        assert_eq!(ev.confidence_history[1].iteration, 2);
        assert_eq!(ev.confidence, 0.55);
    }

    #[test]
    fn test_hard_stop_beats_failing_criteria() {
        let mut ev = evaluation(3);
        ev.iteration = 3;
        ev.confidence = 0.1;
        ev.gaps = vec!["a".into(), "b".into(), "c".into()];

        let v = check(&ev);
        assert!(v.converged);
        assert!(v.forced);
        assert!(!v.marginal_gain_stop);
        assert_eq!(v.reason, "max_iterations_reached");
    }

    #[test]
    fn test_plateau_stop_when_criteria_unmet() {
        let mut ev = evaluation(10);
        for c in [0.48, 0.49, 0.5] {
            record_confidence(&mut ev, c);
        }

        let v = check(&ev);
        assert!(v.converged);
        assert!(v.forced);
        assert!(v.marginal_gain_stop);
        assert_eq!(
            v.reason,
            format!(
                "marginal_gain_plateau: last 2 deltas [{:?}, {:?}] all < 0.02",
                0.49 - 0.48,
                0.5 - 0.49
            )
        );
    }

    #[test]
    fn test_plateau_reason_lists_raw_deltas() {
        let mut ev = evaluation(10);
        for c in [0.5, 0.5, 0.5078125] {
            record_confidence(&mut ev, c);
        }

        let v = check(&ev);
        assert!(v.marginal_gain_stop);
        assert_eq!(
            v.reason,
            "marginal_gain_plateau: last 2 deltas [0.0, 0.0078125] all < 0.02"
        );
    }

    #[test]
    fn test_plateau_ignored_when_criteria_met() {
        let mut ev = evaluation(10);
        for c in [0.8, 0.81, 0.82] {
            record_confidence(&mut ev, c);
        }

        let v = check(&ev);
        assert!(v.converged);
        assert!(!v.forced);
        assert!(!v.marginal_gain_stop);
        assert_eq!(v.reason, "all criteria met");
    }

    #[test]
    fn test_unmet_reasons_joined() {
        let mut ev = evaluation(10);
        record_confidence(&mut ev, 0.5);
        ev.gaps = vec!["a".into(), "b".into(), "c".into()];
        ev.contradictions = vec!["x".into()];

        let v = check(&ev);
        assert!(!v.converged);
        assert_eq!(
            v.reason,
            "confidence 0.50 < 0.7; gaps 3 > 2; contradictions 1 > 0"
        );
    }

    #[test]
    fn test_large_swing_is_not_plateau() {
        let mut ev = evaluation(10);
        for c in [0.3, 0.5, 0.31] {
            record_confidence(&mut ev, c);
        }
        assert!(plateau_deltas(&ev).is_none());
        assert!(!check(&ev).converged);
    }

    #[test]
    fn test_apply_update_and_gap_feedback() {
        let mut ev = evaluation(5);
        let applied = apply_update(
            &mut ev,
            EvaluationUpdate::new()
                .confidence(0.6)
                .gaps(["topicA", "topicB"])
                .iteration(2)
                .gap_result("topicA", 0.05)
                .gap_result("topicB", 0.01),
        );
        assert!(applied);
        assert_eq!(ev.confidence_history[0].iteration, 1);
        assert_eq!(ev.iteration, 2);

        let a = ev.gap_posteriors["topicA"];
        assert_eq!((a.alpha, a.beta, a.attempts), (2.0, 1.0, 1));
        assert_eq!(a.total_gain, 0.05);
        let b = ev.gap_posteriors["topicB"];
        assert_eq!((b.alpha, b.beta), (1.0, 2.0));
    }

    #[test]
    fn test_terminal_evaluation_is_frozen() {
        let mut ev = evaluation(5);
        assert!(apply_update(
            &mut ev,
            EvaluationUpdate::new().status(EvaluationStatus::Converged)
        ));

        let before = ev.clone();
        assert!(!apply_update(
            &mut ev,
            EvaluationUpdate::new()
                .status(EvaluationStatus::Evaluating)
                .confidence(0.9)
        ));
        assert_eq!(ev, before);
    }
}
