//! FActScore-style rollup of atomic claim grades into their composite parent.
//!
//! factscore = supported atoms / total atoms, where an atom is supported when
//! its grade is strong or moderate. The parent's grade is a threshold on the
//! factscore and its confidence blends the factscore with the mean atom
//! confidence.

use super::types::{round3, EvidenceGrade, Grading, RollupRecord};

/// Composite grade and the figures it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rollup {
    pub grading: Grading,
    pub record: RollupRecord,
}

/// Map a factscore onto a composite grade.
pub fn grade_for_factscore(factscore: f64) -> EvidenceGrade {
    if factscore >= 0.9 {
        EvidenceGrade::Strong
    } else if factscore >= 0.6 {
        EvidenceGrade::Moderate
    } else if factscore >= 0.3 {
        EvidenceGrade::Weak
    } else {
        EvidenceGrade::Contested
    }
}

/// Roll up the `(grade, confidence)` of each atomic child.
///
/// Returns `None` when there are no children to roll up.
pub fn rollup(children: &[Grading]) -> Option<Rollup> {
    if children.is_empty() {
        return None;
    }

    let total = children.len();
    let supported = children.iter().filter(|c| c.grade.is_supported()).count();
    let factscore = supported as f64 / total as f64;
    let avg_child_confidence = children.iter().map(|c| c.confidence).sum::<f64>() / total as f64;

    Some(Rollup {
        grading: Grading::new(
            grade_for_factscore(factscore),
            round3(0.6 * factscore + 0.4 * avg_child_confidence),
        ),
        record: RollupRecord {
            factscore: round3(factscore),
            atomic_count: total,
            supported_count: supported,
        },
    })
}
