//! Persistence for sources, claims, links and evaluations.
//!
//! The engine talks to storage only through [`ClaimStore`]. The store is a
//! plain record keeper: it never grades, scores or cascades. Those decisions
//! live in the engine, which wraps every public operation in
//! [`ClaimStore::transaction`] so derived writes commit together.

pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::evaluation::{Evaluation, EvaluationId};
use crate::evidence::{
    Claim, ClaimId, ClaimMetadata, ClaimQuery, ClaimStatus, ClaimType, Contradiction, Grading,
    LinkSummary, LinkedSource, Relationship, Source, SourceId,
};

pub use sqlite::SqliteKnowledgeStore;

/// A source ready to be inserted. Domain and credibility are already scored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSource {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub snippet: String,
    pub credibility: f64,
    pub source_type: String,
    pub metadata: HashMap<String, Value>,
}

/// A claim ready to be inserted. It starts ungraded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClaim {
    pub text: String,
    pub entity_id: Option<String>,
    pub claim_type: ClaimType,
    pub parent_claim_id: Option<ClaimId>,
    pub metadata: ClaimMetadata,
}

impl NewClaim {
    /// An active singleton claim.
    pub fn singleton(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity_id: None,
            claim_type: ClaimType::Singleton,
            parent_claim_id: None,
            metadata: ClaimMetadata::default(),
        }
    }

    pub fn with_entity(mut self, entity_id: Option<String>) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn with_metadata(mut self, metadata: ClaimMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Storage collaborator for the grading engine.
pub trait ClaimStore {
    // ==================== Sources ====================

    fn insert_source(&self, source: &NewSource) -> Result<SourceId>;

    fn find_source_by_url(&self, url: &str) -> Result<Option<SourceId>>;

    /// Refresh display fields of an existing source. Credibility is untouched.
    fn refresh_source(&self, id: SourceId, title: &str, snippet: &str) -> Result<()>;

    fn get_source(&self, id: SourceId) -> Result<Option<Source>>;

    /// Sources at or above `min_credibility`, most credible first. With an
    /// entity, only sources linked to that entity's claims.
    fn list_sources(&self, entity_id: Option<&str>, min_credibility: f64) -> Result<Vec<Source>>;

    // ==================== Claims ====================

    fn insert_claim(&self, claim: &NewClaim) -> Result<ClaimId>;

    fn get_claim(&self, id: ClaimId) -> Result<Option<Claim>>;

    /// Claims matching the query, highest confidence first.
    fn list_claims(&self, query: &ClaimQuery) -> Result<Vec<Claim>>;

    fn update_claim_grade(&self, id: ClaimId, grading: Grading) -> Result<()>;

    /// Set confidence without touching the grade.
    fn update_claim_confidence(&self, id: ClaimId, confidence: f64) -> Result<()>;

    /// Additively merge a metadata patch into the claim's metadata.
    fn merge_claim_metadata(&self, id: ClaimId, patch: ClaimMetadata) -> Result<()>;

    fn set_claim_type(&self, id: ClaimId, claim_type: ClaimType) -> Result<()>;

    /// Returns `false` when the claim does not exist.
    fn set_claim_status(&self, id: ClaimId, status: ClaimStatus) -> Result<bool>;

    /// Insert an atomic child of `parent` carrying copies of `inherited` links.
    fn create_atomic_claim(
        &self,
        parent: ClaimId,
        text: &str,
        entity_id: Option<&str>,
        inherited: &[LinkedSource],
    ) -> Result<ClaimId>;

    /// Atomic children of `parent`, ordered by id.
    fn get_children(&self, parent: ClaimId) -> Result<Vec<Claim>>;

    /// Full-text search over claim text, excluding one claim.
    fn search_claims(&self, fts_query: &str, exclude: ClaimId, limit: usize) -> Result<Vec<Claim>>;

    /// Active claims matching `fts_query` with confidence at or above
    /// `min_confidence`, most confident first.
    fn prior_claims(
        &self,
        fts_query: &str,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Claim>>;

    /// Active claims created before `cutoff`.
    fn active_claims_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Claim>>;

    // ==================== Links ====================

    /// Link a source to a claim. Returns `false` if the pair already exists.
    fn link_source(
        &self,
        claim: ClaimId,
        source: SourceId,
        relationship: &Relationship,
    ) -> Result<bool>;

    /// Returns `false` if there was no such link.
    fn unlink_source(&self, claim: ClaimId, source: SourceId) -> Result<bool>;

    fn get_claim_sources(&self, claim: ClaimId) -> Result<Vec<LinkedSource>>;

    /// Contradicting links, most credible source first.
    fn contradictions(&self, entity_id: Option<&str>) -> Result<Vec<Contradiction>>;

    /// Per-claim link aggregates, most supported claim first.
    fn link_summaries(&self, entity_id: Option<&str>) -> Result<Vec<LinkSummary>>;

    // ==================== Evaluations ====================

    fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<EvaluationId>;

    fn get_evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>>;

    /// Persist every mutable field of an existing evaluation.
    fn save_evaluation(&self, evaluation: &Evaluation) -> Result<()>;

    /// Evaluations of one entity, newest first.
    fn evaluations_for(&self, parent_id: &str) -> Result<Vec<Evaluation>>;

    // ==================== Transactions ====================

    /// Run `f` atomically: all of its writes commit, or none do. Nestable.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T>;
}
