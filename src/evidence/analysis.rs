//! Evidence analysis over the whole knowledge base: contradiction reports,
//! corroboration scores, prior-research lookup and time-based confidence
//! decay.

use serde::{Deserialize, Serialize};

use super::types::{round3, Claim, ClaimId, EvidenceGrade, Relationship, SourceId};

/// A claim linked to a contradicting source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub claim_id: ClaimId,
    pub claim_text: String,
    pub entity_id: Option<String>,
    pub evidence_grade: EvidenceGrade,
    pub confidence: f64,
    pub relationship: Relationship,
    pub source_id: SourceId,
    pub url: String,
    pub source_title: String,
    pub credibility: f64,
}

/// Raw supporting / contradicting aggregates for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub claim_id: ClaimId,
    pub claim_text: String,
    pub entity_id: Option<String>,
    pub evidence_grade: EvidenceGrade,
    pub confidence: f64,
    pub supporting: usize,
    pub contradicting: usize,
    /// Mean credibility of supporting sources, 0 when there are none
    pub avg_support_credibility: f64,
    /// Mean credibility of contradicting sources, 0 when there are none
    pub avg_contradict_credibility: f64,
}

/// Corroboration report for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corroboration {
    pub claim_id: ClaimId,
    pub claim_text: String,
    pub entity_id: Option<String>,
    pub evidence_grade: EvidenceGrade,
    pub confidence: f64,
    pub supporting_sources: usize,
    pub contradicting_sources: usize,
    /// Credibility-weighted net support in [-1, 1]
    pub corroboration_score: f64,
}

impl From<LinkSummary> for Corroboration {
    fn from(s: LinkSummary) -> Self {
        Self {
            corroboration_score: corroboration_score(
                s.supporting,
                s.avg_support_credibility,
                s.contradicting,
                s.avg_contradict_credibility,
            ),
            claim_id: s.claim_id,
            claim_text: s.claim_text,
            entity_id: s.entity_id,
            evidence_grade: s.evidence_grade,
            confidence: s.confidence,
            supporting_sources: s.supporting,
            contradicting_sources: s.contradicting,
        }
    }
}

/// Net credibility-weighted support; 0 for an unlinked claim.
pub fn corroboration_score(
    supporting: usize,
    avg_support: f64,
    contradicting: usize,
    avg_contradict: f64,
) -> f64 {
    let total = supporting + contradicting;
    if total == 0 {
        return 0.0;
    }
    round3(
        (supporting as f64 * avg_support - contradicting as f64 * avg_contradict) / total as f64,
    )
}

/// Earlier claims relevant to a new research query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorResearch {
    pub query: String,
    /// Active claims at or above the confidence floor, most confident first
    pub claims: Vec<Claim>,
}

/// A claim whose confidence was lowered by decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayedClaim {
    pub claim_id: ClaimId,
    /// First 80 characters of the claim text
    pub claim_text: String,
    pub old_confidence: f64,
    pub new_confidence: f64,
    pub age_days: i64,
}

/// Number of decay periods elapsed for a claim `age_days` old.
///
/// A claim exactly at the threshold has decayed one period. `threshold` must
/// be positive.
pub fn decay_periods(age_days: i64, threshold: i64) -> i32 {
    ((age_days - threshold).max(0) / threshold + 1) as i32
}

/// Confidence after `periods` of geometric decay, floored and rounded.
pub fn decayed_confidence(confidence: f64, periods: i32, rate: f64, floor: f64) -> f64 {
    round3(confidence * (1.0 - rate).powi(periods)).max(floor)
}
