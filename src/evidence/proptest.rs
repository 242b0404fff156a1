//! Property-based tests for grading, rollup and the evaluation loop.
//!
//! Invariants covered:
//!
//! - Grading is deterministic and confidence stays in [0, 1]
//! - Contested exactly when both support and contradiction are present
//! - Rollup grades follow the factscore thresholds
//! - Self-consistency agreement and confidence bounds
//! - Beta posteriors move in the direction of the observation
//! - The iteration cap always wins a convergence check

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::SelfConsistencyConfig;
    use crate::evaluation::{check, draw, ConvergenceCriteria, Evaluation, GapPosterior};
    use crate::evidence::analysis::{decay_periods, decayed_confidence};
    use crate::evidence::grader::{grade_sources, EvidenceTally};
    use crate::evidence::rollup::{grade_for_factscore, rollup};
    use crate::evidence::consistency::{aggregate, SelfConsistencyGrader};
    use crate::evidence::types::{EvidenceGrade, Grading, LinkedSource, Relationship, SourceId};

    fn relationship() -> impl Strategy<Value = Relationship> {
        prop_oneof![
            Just(Relationship::Supports),
            Just(Relationship::Confirms),
            Just(Relationship::Contradicts),
            Just(Relationship::Refutes),
            Just(Relationship::Other("mentions".to_string())),
        ]
    }

    fn linked_sources() -> impl Strategy<Value = Vec<LinkedSource>> {
        prop::collection::vec((0.0f64..=1.0, relationship()), 0..12).prop_map(|links| {
            links
                .into_iter()
                .enumerate()
                .map(|(i, (cred, rel))| LinkedSource::new(SourceId(i as i64 + 1), cred, rel))
                .collect()
        })
    }

    fn grade() -> impl Strategy<Value = EvidenceGrade> {
        prop_oneof![
            Just(EvidenceGrade::Strong),
            Just(EvidenceGrade::Moderate),
            Just(EvidenceGrade::Weak),
            Just(EvidenceGrade::Contested),
            Just(EvidenceGrade::Ungraded),
        ]
    }

    fn gradings(min: usize) -> impl Strategy<Value = Vec<Grading>> {
        prop::collection::vec(
            (grade(), 0.0f64..=1.0).prop_map(|(g, c)| Grading::new(g, c)),
            min..20,
        )
    }

    // =========================================================================
    // Grading
    // =========================================================================

    proptest! {
        #[test]
        fn grading_is_deterministic_and_bounded(links in linked_sources()) {
            let first = grade_sources(&links);
            let second = grade_sources(&links);
            prop_assert_eq!(first, second);
            prop_assert!((0.0..=1.0).contains(&first.confidence));
        }

        #[test]
        fn contested_iff_mixed_evidence(links in linked_sources()) {
            let tally = EvidenceTally::from_sources(&links);
            let grading = grade_sources(&links);
            let mixed = tally.supporting > 0 && tally.contradicting > 0;
            prop_assert_eq!(grading.grade == EvidenceGrade::Contested, mixed);
            if tally.supporting == 0 {
                prop_assert_eq!(grading.grade, EvidenceGrade::Ungraded);
            }
        }

        /// Link order never matters.
        #[test]
        fn grading_ignores_link_order(links in linked_sources()) {
            let mut reversed = links.clone();
            reversed.reverse();
            let a = grade_sources(&links);
            let b = grade_sources(&reversed);
            prop_assert_eq!(a.grade, b.grade);
            prop_assert!((a.confidence - b.confidence).abs() < 1e-9);
        }
    }

    // =========================================================================
    // Rollup
    // =========================================================================

    proptest! {
        #[test]
        fn rollup_grade_follows_factscore(children in gradings(1)) {
            let result = rollup(&children).unwrap();
            let supported = children.iter().filter(|c| c.grade.is_supported()).count();

            prop_assert_eq!(result.record.supported_count, supported);
            prop_assert_eq!(result.record.atomic_count, children.len());
            prop_assert!((0.0..=1.0).contains(&result.record.factscore));
            prop_assert!((0.0..=1.0).contains(&result.grading.confidence));
            prop_assert_eq!(
                result.grading.grade,
                grade_for_factscore(supported as f64 / children.len() as f64)
            );
        }
    }

    // =========================================================================
    // Self-consistency
    // =========================================================================

    proptest! {
        #[test]
        fn agreement_is_bounded(samples in gradings(1)) {
            let out = aggregate(&samples).unwrap();
            let distinct = out.distribution.len() as f64;

            prop_assert!(out.agreement <= 1.0);
            prop_assert!(out.agreement >= 1.0 / distinct - 1e-12);
            prop_assert_eq!(
                out.distribution.iter().map(|c| c.count).sum::<usize>(),
                samples.len()
            );
        }

        /// The majority confidence never exceeds the agreeing mean (up to rounding).
        #[test]
        fn majority_confidence_discounted(samples in gradings(1)) {
            let out = aggregate(&samples).unwrap();
            prop_assert!(out.majority.confidence <= out.agreeing_confidence + 5e-4);
            prop_assert!(out.confidence_range.0 <= out.confidence_range.1);
        }

        #[test]
        fn sampled_confidences_stay_in_range(
            links in linked_sources(),
            seed in any::<u64>(),
            n in 1usize..15
        ) {
            let grader =
                SelfConsistencyGrader::from_config(&SelfConsistencyConfig::default()).unwrap();
            let tally = EvidenceTally::from_sources(&links);
            let mut rng = StdRng::seed_from_u64(seed);
            let out = grader.grade(&tally, n, &mut rng).unwrap();

            prop_assert_eq!(out.n_samples, n);
            prop_assert!(out.confidence_range.0 >= 0.0);
            prop_assert!(out.confidence_range.1 <= 1.0);
        }
    }

    // =========================================================================
    // Decay
    // =========================================================================

    proptest! {
        #[test]
        fn decay_never_raises_confidence(
            confidence in 0.1f64..=1.0,
            age in 0i64..2000,
            threshold in 1i64..120
        ) {
            let periods = decay_periods(age.max(threshold), threshold);
            prop_assert!(periods >= 1);
            let decayed = decayed_confidence(confidence, periods, 0.02, 0.1);
            prop_assert!(decayed <= confidence + 5e-4);
            prop_assert!(decayed >= 0.1);
        }
    }

    // =========================================================================
    // Evaluation loop
    // =========================================================================

    fn posterior() -> impl Strategy<Value = GapPosterior> {
        (0.5f64..50.0, 0.5f64..50.0).prop_map(|(alpha, beta)| GapPosterior {
            alpha,
            beta,
            ..GapPosterior::default()
        })
    }

    proptest! {
        #[test]
        fn observation_moves_expected_value(p in posterior(), gain in -1.0f64..1.0) {
            let before = p.expected_value();
            let mut after = p;
            after.observe(gain, 0.02);

            prop_assert_eq!(after.attempts, p.attempts + 1);
            prop_assert!((after.alpha + after.beta - (p.alpha + p.beta) - 1.0).abs() < 1e-9);
            if gain >= 0.02 {
                prop_assert!(after.expected_value() > before);
            } else {
                prop_assert!(after.expected_value() < before);
            }
            prop_assert!((0.0..=1.0).contains(&after.expected_value()));
        }

        #[test]
        fn thompson_draw_is_a_probability(
            p in posterior(),
            bonus in 0.0f64..5.0,
            seed in any::<u64>()
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let x = draw(&p, bonus, &mut rng);
            prop_assert!((0.0..=1.0).contains(&x));
        }

        #[test]
        fn iteration_cap_wins(
            max_iterations in 1u32..20,
            extra in 0u32..5,
            confidence in 0.0f64..=1.0,
            gaps in 0usize..6
        ) {
            let mut ev = Evaluation::new("entity", max_iterations, ConvergenceCriteria::default());
            ev.iteration = max_iterations + extra;
            ev.confidence = confidence;
            ev.gaps = (0..gaps).map(|i| format!("gap-{i}")).collect();

            let verdict = check(&ev);
            prop_assert!(verdict.converged);
            prop_assert!(verdict.forced);
            prop_assert!(!verdict.marginal_gain_stop);
            prop_assert_eq!(verdict.reason, "max_iterations_reached");
        }
    }
}
