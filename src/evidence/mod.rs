//! Evidence grading for research claims.
//!
//! The pieces here are pure functions over claim and source data; the engine
//! wires them to a store and fires them on every write.
//!
//! ## Pipeline
//!
//! 1. **Credibility**: a source URL is mapped to a trust score once, when the
//!    source is registered (exact domain, then TLD, then suffix, then 0.5).
//! 2. **Grading**: the linked sources of a claim are partitioned into
//!    supporting and contradicting sets and run through a fixed decision tree
//!    (contested, ungraded, strong, moderate, weak).
//! 3. **Decomposition**: compound claims above a complexity threshold are
//!    split into atomic children, each graded on its own.
//! 4. **Rollup**: the fraction of supported atoms (the factscore) becomes the
//!    composite's grade; confidence blends it with mean atom confidence.
//! 5. **Self-consistency**: the decision tree is resampled under input noise
//!    and majority-voted, penalizing grades that flip easily.
//! 6. **Verification**: atoms are checked against the knowledge base and an
//!    optional external search collaborator.
//!
//! ## Example
//!
//! ```rust
//! use evidence_core::evidence::{grade_sources, EvidenceGrade, LinkedSource, Relationship, SourceId};
//!
//! let sources = vec![
//!     LinkedSource::new(SourceId(1), 0.8, Relationship::Supports),
//!     LinkedSource::new(SourceId(2), 0.75, Relationship::Supports),
//!     LinkedSource::new(SourceId(3), 0.9, Relationship::Confirms),
//! ];
//! let grading = grade_sources(&sources);
//! assert_eq!(grading.grade, EvidenceGrade::Strong);
//! ```

pub mod analysis;
pub mod consistency;
pub mod credibility;
pub mod decompose;
pub mod grader;
pub mod quotes;
pub mod rollup;
pub mod types;
pub mod verify;

#[cfg(test)]
mod proptest;

// Re-exports for convenience
pub use analysis::{
    corroboration_score, decay_periods, decayed_confidence, Contradiction, Corroboration,
    DecayedClaim, LinkSummary, PriorResearch,
};
pub use consistency::{aggregate, ConsistencyOutcome, SelfConsistencyGrader};
pub use credibility::{normalize_domain, score_domain, score_url};
pub use decompose::{ClaimComplexity, ClaimDecomposer, DecompositionMethod, DecompositionPlan};
pub use grader::{grade_sources, grade_tally, EvidenceTally};
pub use quotes::{extract_quotes, Quote, QuoteExtraction};
pub use rollup::{rollup, Rollup};
pub use types::{
    Claim, ClaimId, ClaimMetadata, ClaimQuery, ClaimStatus, ClaimType, EvidenceGrade, GradeCount,
    Grading, GroundingRecord, LinkedSource, Relationship, RollupRecord, SelfConsistencyRecord,
    Source, SourceId, VerificationMethod, VerificationRecord,
};
pub use verify::{
    fts_any_word, fts_terms, score_atom, AtomResult, AtomVerdict, EvidenceSearch, KbEvidence, NoSearch,
    SearchHit, VerificationReport, WebEvidence,
};
