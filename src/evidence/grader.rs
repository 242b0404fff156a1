//! Deterministic evidence grading.
//!
//! The grader maps the sources linked to a claim onto an [`EvidenceGrade`] and
//! a scalar confidence. The same decision tree is reused by the
//! self-consistency grader with perturbed inputs, so it is exposed both over
//! linked sources ([`grade_sources`]) and over the raw tallies
//! ([`grade_tally`]).

use super::types::{round3, EvidenceGrade, Grading, LinkedSource};

/// Supporting and contradicting evidence counted from a claim's links.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvidenceTally {
    /// Number of supporting sources (`supports` / `confirms`)
    pub supporting: usize,
    /// Number of contradicting sources (`contradicts` / `refutes`)
    pub contradicting: usize,
    /// Mean credibility of the supporting sources (0 when there are none)
    pub avg_support_credibility: f64,
}

impl EvidenceTally {
    /// Partition linked sources; relationships that are neither supporting nor
    /// contradicting are ignored.
    pub fn from_sources(sources: &[LinkedSource]) -> Self {
        let supporting: Vec<f64> = sources
            .iter()
            .filter(|s| s.relationship.is_supporting())
            .map(|s| s.credibility)
            .collect();
        let contradicting = sources
            .iter()
            .filter(|s| s.relationship.is_contradicting())
            .count();

        let avg_support_credibility = if supporting.is_empty() {
            0.0
        } else {
            supporting.iter().sum::<f64>() / supporting.len() as f64
        };

        Self {
            supporting: supporting.len(),
            contradicting,
            avg_support_credibility,
        }
    }
}

/// Confidence of a contested claim given its support/contradiction split.
pub fn contested_confidence(supporting: usize, contradicting: usize) -> f64 {
    0.2 + 0.3 * (supporting as f64 / (supporting + contradicting) as f64)
}

/// Confidence assigned when no source supports the claim.
pub const UNGRADED_CONFIDENCE: f64 = 0.3;

/// Grade a claim supported by `supporting` sources of mean credibility
/// `avg_credibility`, with no contradicting sources.
pub fn grade_support(supporting: usize, avg_credibility: f64) -> Grading {
    let n = supporting as f64;
    if supporting >= 3 && avg_credibility >= 0.7 {
        Grading::new(
            EvidenceGrade::Strong,
            (0.7 + 0.05 * n + 0.1 * avg_credibility).min(0.95),
        )
    } else if supporting >= 2 && avg_credibility >= 0.5 {
        Grading::new(
            EvidenceGrade::Moderate,
            // Large source counts would otherwise push this past 1.
            (0.5 + 0.05 * n + 0.1 * avg_credibility).min(1.0),
        )
    } else {
        Grading::new(EvidenceGrade::Weak, 0.3 + 0.15 * avg_credibility)
    }
}

/// Run the full decision tree over a tally. Confidence is unrounded.
pub fn grade_tally(tally: &EvidenceTally) -> Grading {
    if tally.supporting > 0 && tally.contradicting > 0 {
        Grading::new(
            EvidenceGrade::Contested,
            contested_confidence(tally.supporting, tally.contradicting),
        )
    } else if tally.supporting == 0 {
        // Contradicting-only claims are ungraded rather than refuted.
        Grading::new(EvidenceGrade::Ungraded, UNGRADED_CONFIDENCE)
    } else {
        grade_support(tally.supporting, tally.avg_support_credibility)
    }
}

/// Grade a claim from its linked sources, rounding confidence to 3 decimals.
pub fn grade_sources(sources: &[LinkedSource]) -> Grading {
    let grading = grade_tally(&EvidenceTally::from_sources(sources));
    Grading::new(grading.grade, round3(grading.confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::types::{Relationship, SourceId};

    fn linked(creds: &[(f64, &str)]) -> Vec<LinkedSource> {
        creds
            .iter()
            .enumerate()
            .map(|(i, (c, r))| LinkedSource::new(SourceId(i as i64 + 1), *c, Relationship::parse(r)))
            .collect()
    }

    #[test]
    fn test_strong_grade() {
        let g = grade_sources(&linked(&[(0.8, "supports"), (0.75, "supports"), (0.9, "confirms")]));
        assert_eq!(g.grade, EvidenceGrade::Strong);
        // 0.7 + 0.15 + 0.1 * 0.8167
        assert!((g.confidence - 0.932).abs() < 1e-9);
    }

    #[test]
    fn test_strong_confidence_capped() {
        let sources: Vec<(f64, &str)> = vec![(0.95, "supports"); 6];
        let g = grade_sources(&linked(&sources));
        assert_eq!(g.grade, EvidenceGrade::Strong);
        assert_eq!(g.confidence, 0.95);
    }

    #[test]
    fn test_moderate_grade() {
        let g = grade_sources(&linked(&[(0.6, "supports"), (0.6, "supports")]));
        assert_eq!(g.grade, EvidenceGrade::Moderate);
        assert!((g.confidence - 0.66).abs() < 1e-9);
    }

    #[test]
    fn test_three_low_credibility_sources_are_moderate() {
        let g = grade_sources(&linked(&[(0.6, "supports"), (0.6, "supports"), (0.6, "supports")]));
        assert_eq!(g.grade, EvidenceGrade::Moderate);
    }

    #[test]
    fn test_weak_grade() {
        let g = grade_sources(&linked(&[(0.4, "supports")]));
        assert_eq!(g.grade, EvidenceGrade::Weak);
        assert!((g.confidence - 0.36).abs() < 1e-9);
    }

    #[test]
    fn test_contested_grade() {
        let g = grade_sources(&linked(&[(0.6, "supports"), (0.9, "contradicts")]));
        assert_eq!(g.grade, EvidenceGrade::Contested);
        assert!((g.confidence - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_contradicting_only_is_ungraded() {
        let g = grade_sources(&linked(&[(0.9, "refutes"), (0.9, "contradicts")]));
        assert_eq!(g.grade, EvidenceGrade::Ungraded);
        assert_eq!(g.confidence, 0.3);
    }

    #[test]
    fn test_unknown_relationships_ignored() {
        let g = grade_sources(&linked(&[(0.9, "mentions")]));
        assert_eq!(g.grade, EvidenceGrade::Ungraded);

        let g = grade_sources(&linked(&[(0.9, "mentions"), (0.5, "supports")]));
        assert_eq!(g.grade, EvidenceGrade::Weak);
    }

    #[test]
    fn test_no_sources() {
        let g = grade_sources(&[]);
        assert_eq!(g, Grading::new(EvidenceGrade::Ungraded, 0.3));
    }
}
