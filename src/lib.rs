//! # evidence-core
//!
//! Evidence grading and convergence control for research knowledge bases
//! shared by many agents.
//!
//! ## Core Components
//!
//! - **Evidence**: Source credibility, claim grading, decomposition into
//!   atomic claims, FActScore rollup, self-consistency and verification
//! - **Evaluation**: Per-entity convergence tracking with marginal-gain
//!   stopping and a Thompson-sampling gap bandit
//! - **Store**: SQLite persistence for sources, claims, links and evaluations
//! - **Engine**: The caller-facing API that wires grading to every write
//!
//! ## Example
//!
//! ```rust
//! use evidence_core::{CriteriaOverride, EngineConfig, EvaluationUpdate, KnowledgeEngine};
//!
//! let engine = KnowledgeEngine::in_memory(EngineConfig::default()).unwrap();
//! let eval = engine.add_evaluation("fusion", 10, CriteriaOverride::new()).unwrap();
//!
//! engine
//!     .update_evaluation(eval, EvaluationUpdate::new().confidence(0.82).iteration(2))
//!     .unwrap();
//!
//! let verdict = engine.check_convergence(eval).unwrap();
//! assert!(verdict.converged);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod evidence;
pub mod store;

// Re-exports for convenience
pub use config::{DecayConfig, DecompositionConfig, EngineConfig, SelfConsistencyConfig};
pub use engine::{KnowledgeEngine, SourceInput};
pub use error::{Error, Result};
pub use evaluation::{
    ConvergenceCriteria, ConvergenceVerdict, CriteriaOverride, Evaluation, EvaluationId,
    EvaluationStatus, EvaluationUpdate, GapPosterior, GapSelection, HistoryEntry,
};
pub use evidence::{
    Claim, ClaimId, ClaimMetadata, ClaimQuery, ClaimStatus, ClaimType, Contradiction,
    Corroboration, DecayedClaim, DecompositionMethod, EvidenceGrade, EvidenceSearch, Grading,
    NoSearch, PriorResearch, QuoteExtraction, Relationship, SearchHit, Source, SourceId,
    VerificationReport,
};
pub use store::{ClaimStore, SqliteKnowledgeStore};
