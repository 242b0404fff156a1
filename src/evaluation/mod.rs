//! Per-entity evaluation loop with marginal-gain stopping and a
//! Thompson-sampling gap bandit.
//!
//! An [`Evaluation`] tracks one research entity across iterations: its current
//! confidence, the open gaps and contradictions, a confidence history, and a
//! Beta posterior per gap topic. Status moves one way only, from `evaluating`
//! to `converged` or `failed`; once terminal the record is frozen as an audit
//! trail.
//!
//! The functions here operate on an in-memory [`Evaluation`]; the engine loads
//! and persists it around each call.

pub mod bandit;
pub mod convergence;
pub mod types;

pub use bandit::{draw, register, select};
pub use convergence::{apply_update, check, plateau_deltas, record_confidence, unmet_criteria};
pub use types::{
    ConvergenceCriteria, ConvergenceVerdict, CriteriaOverride, Evaluation, EvaluationId,
    EvaluationStatus, EvaluationUpdate, GapPosterior, GapSelection, HistoryEntry,
};
