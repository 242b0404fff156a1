//! Claim, source and evidence operations.

use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use super::cascade::PostWriteQueue;
use super::{preview, KnowledgeEngine};
use crate::error::{Error, Result};
use crate::evidence::credibility::UNKNOWN_DOMAIN;
use crate::evidence::quotes::GROUNDING_METHOD;
use crate::evidence::{
    decay_periods, decayed_confidence, fts_any_word, fts_terms, normalize_domain, score_atom, score_url,
    AtomResult, Claim, ClaimId, ClaimMetadata, ClaimQuery, ClaimStatus, ClaimType,
    ConsistencyOutcome, Contradiction, Corroboration, DecayedClaim, DecompositionMethod,
    DecompositionPlan, EvidenceSearch, EvidenceTally, Grading, GroundingRecord, KbEvidence,
    PriorResearch, QuoteExtraction, Relationship, Source, SourceId, VerificationMethod, VerificationReport,
    WebEvidence,
};
use crate::store::{ClaimStore, NewClaim, NewSource};

/// Other claims consulted per atom during verification.
const KB_EVIDENCE_LIMIT: usize = 10;

/// Prior claims returned per research query.
const PRIOR_CLAIM_LIMIT: usize = 20;

/// `source_type` of sources registered from search hits.
const VERIFICATION_SOURCE_TYPE: &str = "web_verification";

/// A source to register with [`KnowledgeEngine::add_source`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInput {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub source_type: String,
    pub metadata: HashMap<String, Value>,
}

impl SourceInput {
    /// A `web` source with no title or snippet.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            snippet: String::new(),
            source_type: "web".to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl<S: ClaimStore> KnowledgeEngine<S> {
    // ==================== Registration ====================

    /// Register a source, scoring its credibility once.
    ///
    /// Re-adding a known URL returns the existing id. A non-empty title
    /// refreshes the display fields; credibility never changes.
    #[instrument(skip(self, input), fields(url = %input.url))]
    pub fn add_source(&self, input: SourceInput) -> Result<SourceId> {
        if input.url.trim().is_empty() {
            return Err(Error::MalformedInput("source url is empty".to_string()));
        }

        self.store.transaction(|store| {
            if let Some(id) = store.find_source_by_url(&input.url)? {
                if !input.title.is_empty() {
                    store.refresh_source(id, &input.title, &input.snippet)?;
                    debug!(source = %id, "Refreshed existing source");
                }
                return Ok(id);
            }

            let domain =
                normalize_domain(&input.url).unwrap_or_else(|| UNKNOWN_DOMAIN.to_string());
            let credibility = score_url(&input.url);
            let id = store.insert_source(&NewSource {
                url: input.url,
                title: input.title,
                domain,
                snippet: input.snippet,
                credibility,
                source_type: input.source_type,
                metadata: input.metadata,
            })?;

            debug!(source = %id, credibility, "Registered source");
            Ok(id)
        })
    }

    /// Add an active singleton claim supported by `source_ids`, and grade it.
    #[instrument(skip(self, text, source_ids, metadata))]
    pub fn add_claim(
        &self,
        text: &str,
        entity_id: Option<&str>,
        source_ids: &[SourceId],
        metadata: ClaimMetadata,
    ) -> Result<ClaimId> {
        if text.trim().is_empty() {
            return Err(Error::MalformedInput("claim text is empty".to_string()));
        }

        self.store.transaction(|store| {
            for &source in source_ids {
                self.require_source(source)?;
            }

            let id = store.insert_claim(
                &NewClaim::singleton(text)
                    .with_entity(entity_id.map(str::to_string))
                    .with_metadata(metadata),
            )?;
            for &source in source_ids {
                store.link_source(id, source, &Relationship::Supports)?;
            }

            let claim = self.require_claim(id)?;
            let mut queue = PostWriteQueue::new();
            let grading = self.regrade(&claim, &mut queue)?;
            self.drain(queue)?;

            info!(claim = %id, grade = %grading.grade, "Added claim");
            Ok(id)
        })
    }

    /// Link a source to a claim and re-grade it.
    ///
    /// Returns `false` for an existing pair; nothing is written then.
    #[instrument(skip(self))]
    pub fn add_claim_source(
        &self,
        claim_id: ClaimId,
        source_id: SourceId,
        relationship: Relationship,
    ) -> Result<bool> {
        self.store.transaction(|store| {
            let claim = self.require_claim(claim_id)?;
            self.require_source(source_id)?;

            if !store.link_source(claim_id, source_id, &relationship)? {
                return Ok(false);
            }

            let mut queue = PostWriteQueue::new();
            self.regrade(&claim, &mut queue)?;
            self.drain(queue)?;
            Ok(true)
        })
    }

    /// Unlink a source from a claim and re-grade it.
    #[instrument(skip(self))]
    pub fn remove_claim_source(&self, claim_id: ClaimId, source_id: SourceId) -> Result<bool> {
        self.store.transaction(|store| {
            let claim = self.require_claim(claim_id)?;
            if !store.unlink_source(claim_id, source_id)? {
                return Ok(false);
            }

            let mut queue = PostWriteQueue::new();
            self.regrade(&claim, &mut queue)?;
            self.drain(queue)?;
            Ok(true)
        })
    }

    // ==================== Grading ====================

    /// Re-grade a claim from its linked sources.
    #[instrument(skip(self))]
    pub fn grade_claim(&self, id: ClaimId) -> Result<Grading> {
        self.store.transaction(|_| {
            let claim = self.require_claim(id)?;
            let mut queue = PostWriteQueue::new();
            let grading = self.regrade(&claim, &mut queue)?;
            self.drain(queue)?;
            Ok(grading)
        })
    }

    /// Split a compound claim into graded atomic children.
    ///
    /// Returns the atom ids. Decomposition happens once: a claim that already
    /// has children returns them unchanged. A missing claim yields no atoms.
    #[instrument(skip(self))]
    pub fn decompose_claim(
        &self,
        id: ClaimId,
        method: DecompositionMethod,
    ) -> Result<Vec<ClaimId>> {
        self.store.transaction(|store| {
            let Some(claim) = store.get_claim(id)? else {
                debug!("Claim not found, nothing to decompose");
                return Ok(Vec::new());
            };

            let existing = store.get_children(id)?;
            if !existing.is_empty() {
                return Ok(existing.into_iter().map(|c| c.id).collect());
            }
            // atoms stay atoms: nesting stops at one level
            if claim.is_atomic() {
                return Ok(Vec::new());
            }

            let parts = match self.decomposer.plan(&claim.text, method) {
                DecompositionPlan::Singleton => {
                    store.set_claim_type(id, ClaimType::Singleton)?;
                    return Ok(Vec::new());
                }
                DecompositionPlan::Split(parts) => parts,
            };

            store.set_claim_type(id, ClaimType::Composite)?;
            let inherited = store.get_claim_sources(id)?;

            let mut queue = PostWriteQueue::new();
            let mut atoms = Vec::with_capacity(parts.len());
            for part in &parts {
                let atom_id =
                    store.create_atomic_claim(id, part, claim.entity_id.as_deref(), &inherited)?;
                let atom = self.require_claim(atom_id)?;
                self.regrade(&atom, &mut queue)?;
                atoms.push(atom_id);
            }
            self.drain(queue)?;

            info!(
                claim = %id,
                atoms = atoms.len(),
                inherited_links = inherited.len(),
                "Decomposed claim"
            );
            Ok(atoms)
        })
    }

    /// Grade a claim by majority vote over noisy re-runs of the grader.
    ///
    /// `n_samples` defaults to the configured sample count. The majority
    /// grade overwrites the deterministic one.
    #[instrument(skip(self))]
    pub fn grade_claim_sc(
        &self,
        id: ClaimId,
        n_samples: Option<usize>,
    ) -> Result<ConsistencyOutcome> {
        let n_samples = n_samples.unwrap_or_else(|| self.consistency.default_samples());

        self.store.transaction(|store| {
            let claim = self.require_claim(id)?;
            let tally = EvidenceTally::from_sources(&store.get_claim_sources(id)?);
            let outcome = self.with_rng(|rng| self.consistency.grade(&tally, n_samples, rng))??;

            let mut queue = PostWriteQueue::new();
            self.write_grade(&claim, outcome.majority, &mut queue)?;
            store.merge_claim_metadata(
                id,
                ClaimMetadata {
                    self_consistency: Some(outcome.record()),
                    ..Default::default()
                },
            )?;
            self.drain(queue)?;

            info!(
                claim = %id,
                grade = %outcome.majority.grade,
                confidence = outcome.majority.confidence,
                agreement = outcome.agreement,
                "Self-consistency grading complete"
            );
            Ok(outcome)
        })
    }

    // ==================== Verification ====================

    /// Check each atomic fact of a claim against the knowledge base and an
    /// external search collaborator.
    ///
    /// The resulting factuality score becomes the claim's confidence. Search
    /// failures degrade to knowledge-base-only evidence.
    #[instrument(skip(self, search))]
    pub fn verify_claim(
        &self,
        id: ClaimId,
        search: &dyn EvidenceSearch,
    ) -> Result<VerificationReport> {
        let method = if search.is_available() {
            VerificationMethod::SafeSearch
        } else {
            VerificationMethod::KbOnly
        };

        self.store.transaction(|store| {
            let claim = self.require_claim(id)?;
            let mut atoms = store.get_children(id)?;
            if atoms.is_empty() {
                atoms.push(claim.clone());
            }

            let mut queue = PostWriteQueue::new();
            let mut results = Vec::with_capacity(atoms.len());
            for atom in &atoms {
                results.push(self.verify_atom(atom, search, &mut queue)?);
            }
            self.drain(queue)?;

            let report = VerificationReport::aggregate(id, preview(&claim.text, 120), results, method);
            store.update_claim_confidence(id, report.factuality_score)?;
            store.merge_claim_metadata(
                id,
                ClaimMetadata {
                    verification: Some(report.record()),
                    ..Default::default()
                },
            )?;

            info!(
                claim = %id,
                factuality = report.factuality_score,
                verified = report.verified_atoms,
                atoms = report.total_atoms,
                method = %method,
                "Verified claim"
            );
            Ok(report)
        })
    }

    fn verify_atom(
        &self,
        atom: &Claim,
        search: &dyn EvidenceSearch,
        queue: &mut PostWriteQueue,
    ) -> Result<AtomResult> {
        let kb_evidence: Vec<KbEvidence> = match fts_terms(&atom.text) {
            Some(query) => self
                .store
                .search_claims(&query, atom.id, KB_EVIDENCE_LIMIT)?
                .into_iter()
                .map(|c| KbEvidence {
                    claim_id: c.id,
                    text: preview(&c.text, 200),
                    confidence: c.confidence,
                })
                .collect(),
            None => Vec::new(),
        };

        let hits = search.search(&atom.text).unwrap_or_else(|e| {
            warn!(claim = %atom.id, error = %e, "Evidence search failed, using knowledge base only");
            Vec::new()
        });

        let mut web_evidence = Vec::with_capacity(hits.len());
        let mut linked = false;
        for hit in hits {
            if hit.url.trim().is_empty() {
                warn!(claim = %atom.id, "Skipping search hit without a url");
                continue;
            }
            let source_id = self.add_source(
                SourceInput::new(hit.url.clone())
                    .title(hit.title)
                    .snippet(hit.snippet.clone())
                    .source_type(VERIFICATION_SOURCE_TYPE),
            )?;
            linked |= self
                .store
                .link_source(atom.id, source_id, &Relationship::Supports)?;
            web_evidence.push(WebEvidence {
                source_id,
                url: hit.url,
                snippet: preview(&hit.snippet, 200),
            });
        }
        if linked {
            self.regrade(atom, queue)?;
        }

        let (score, verdict) = score_atom(kb_evidence.len(), web_evidence.len());
        debug!(
            claim = %atom.id,
            kb_hits = kb_evidence.len(),
            web_hits = web_evidence.len(),
            score,
            ?verdict,
            "Scored atom"
        );

        Ok(AtomResult {
            atom_id: atom.id,
            atom: preview(&atom.text, 120),
            score,
            verdict,
            kb_evidence,
            web_evidence,
        })
    }

    // ==================== Lookups ====================

    pub fn get_claim(&self, id: ClaimId) -> Result<Option<Claim>> {
        self.store.get_claim(id)
    }

    pub fn get_source(&self, id: SourceId) -> Result<Option<Source>> {
        self.store.get_source(id)
    }

    /// Claims matching `query`, highest confidence first.
    pub fn list_claims(&self, query: &ClaimQuery) -> Result<Vec<Claim>> {
        self.store.list_claims(query)
    }

    /// Sources at or above `min_credibility`, optionally only those backing
    /// an entity's claims.
    pub fn list_sources(
        &self,
        entity_id: Option<&str>,
        min_credibility: f64,
    ) -> Result<Vec<Source>> {
        self.store.list_sources(entity_id, min_credibility)
    }

    /// Atomic children of a claim, ordered by id.
    pub fn get_atomic_claims(&self, parent: ClaimId) -> Result<Vec<Claim>> {
        self.store.get_children(parent)
    }

    /// Returns `false` if the claim does not exist.
    #[instrument(skip(self))]
    pub fn set_claim_status(&self, id: ClaimId, status: ClaimStatus) -> Result<bool> {
        self.store.set_claim_status(id, status)
    }

    // ==================== Analysis ====================

    /// Contradicting links, most credible source first.
    pub fn check_contradictions(&self, entity_id: Option<&str>) -> Result<Vec<Contradiction>> {
        self.store.contradictions(entity_id)
    }

    /// Credibility-weighted net support per claim, most supported first.
    pub fn check_corroboration(&self, entity_id: Option<&str>) -> Result<Vec<Corroboration>> {
        Ok(self
            .store
            .link_summaries(entity_id)?
            .into_iter()
            .map(Corroboration::from)
            .collect())
    }

    /// Active claims matching any word of `query`, at or above
    /// `min_confidence`, most confident first.
    #[instrument(skip(self))]
    pub fn find_prior_research(&self, query: &str, min_confidence: f64) -> Result<PriorResearch> {
        let claims = match fts_any_word(query) {
            Some(fts) => self
                .store
                .prior_claims(&fts, min_confidence, PRIOR_CLAIM_LIMIT)?,
            None => Vec::new(),
        };

        debug!(found = claims.len(), "Prior research lookup");
        Ok(PriorResearch {
            query: query.to_string(),
            claims,
        })
    }

    /// Lower the confidence of active claims older than `days_threshold`.
    ///
    /// A non-positive threshold counts as one day. Returns the claims whose
    /// confidence actually dropped.
    #[instrument(skip(self))]
    pub fn apply_confidence_decay(
        &self,
        days_threshold: i64,
        decay_rate: f64,
    ) -> Result<Vec<DecayedClaim>> {
        let threshold = days_threshold.max(1);
        let floor = self.config.decay.floor;
        let window = Duration::try_days(threshold).ok_or_else(|| {
            Error::MalformedInput(format!("decay threshold of {threshold} days is out of range"))
        })?;

        self.store.transaction(|store| {
            let now = Utc::now();
            let mut affected = Vec::new();

            for claim in store.active_claims_before(now - window)? {
                let age_days = (now - claim.created_at).num_days();
                let periods = decay_periods(age_days, threshold);
                let new_confidence =
                    decayed_confidence(claim.confidence, periods, decay_rate, floor);
                if new_confidence >= claim.confidence {
                    continue;
                }

                store.update_claim_confidence(claim.id, new_confidence)?;
                affected.push(DecayedClaim {
                    claim_id: claim.id,
                    claim_text: preview(&claim.text, 80),
                    old_confidence: claim.confidence,
                    new_confidence,
                    age_days,
                });
            }

            info!(affected = affected.len(), threshold, decay_rate, "Applied confidence decay");
            Ok(affected)
        })
    }

    /// Decay with the configured threshold and rate.
    pub fn apply_configured_decay(&self) -> Result<Vec<DecayedClaim>> {
        let decay = &self.config.decay;
        self.apply_confidence_decay(decay.days_threshold, decay.decay_rate)
    }

    // ==================== Quote grounding ====================

    /// Quotable sentences from a source's snippet.
    pub fn extract_quotes(&self, source_id: SourceId) -> Result<QuoteExtraction> {
        let source = self.require_source(source_id)?;
        Ok(QuoteExtraction {
            source_id,
            quotes: crate::evidence::extract_quotes(&source.snippet),
            url: source.url,
            title: source.title,
            credibility: source.credibility,
        })
    }

    /// Create a claim grounded on a quote from `source_id`.
    ///
    /// The claim text defaults to the quote itself.
    #[instrument(skip(self, quote, claim_text))]
    pub fn claim_from_quote(
        &self,
        quote: &str,
        source_id: SourceId,
        entity_id: Option<&str>,
        claim_text: Option<&str>,
    ) -> Result<ClaimId> {
        let text = claim_text.filter(|t| !t.trim().is_empty()).unwrap_or(quote);
        let metadata = ClaimMetadata {
            grounding: Some(GroundingRecord {
                quote: quote.to_string(),
                method: GROUNDING_METHOD.to_string(),
            }),
            ..Default::default()
        };
        self.add_claim(text, entity_id, &[source_id], metadata)
    }

    fn require_source(&self, id: SourceId) -> Result<Source> {
        self.store
            .get_source(id)?
            .ok_or_else(|| Error::source_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::engine;
    use crate::evidence::{AtomVerdict, EvidenceGrade, SearchHit};
    use crate::store::SqliteKnowledgeStore;
    use pretty_assertions::assert_eq;

    const COMPOUND: &str =
        "The material showed 30% strength increase; it also demonstrated improved thermal stability.";

    fn sources(engine: &KnowledgeEngine<SqliteKnowledgeStore>, urls: &[&str]) -> Vec<SourceId> {
        urls.iter()
            .map(|url| engine.add_source(SourceInput::new(*url)).unwrap())
            .collect()
    }

    fn claim(engine: &KnowledgeEngine<SqliteKnowledgeStore>, id: ClaimId) -> Claim {
        engine.get_claim(id).unwrap().unwrap()
    }

    fn two_hits(_query: &str) -> Result<Vec<SearchHit>> {
        Ok(vec![
            SearchHit::new("https://nature.com/articles/a").with_snippet("Confirmed."),
            SearchHit::new("https://arxiv.org/abs/b").with_title("Preprint"),
        ])
    }

    fn one_blank_hit(_query: &str) -> Result<Vec<SearchHit>> {
        Ok(vec![
            SearchHit::new("  ").with_title("No locator"),
            SearchHit::new("https://iter.org/news/1").with_snippet("First plasma planned."),
        ])
    }

    fn failing_search(_query: &str) -> Result<Vec<SearchHit>> {
        Err(Error::external_search("timeout"))
    }

    #[test]
    fn test_three_credible_sources_grade_strong() {
        let engine = engine();
        let ids = sources(
            &engine,
            &[
                "https://economist.com/x",
                "https://theguardian.com/y",
                "https://ieee.org/z",
            ],
        );
        let id = engine.add_claim("X", None, &ids, ClaimMetadata::new()).unwrap();

        let c = claim(&engine, id);
        assert_eq!(c.evidence_grade, EvidenceGrade::Strong);
        assert_eq!(c.confidence, 0.932);
        assert_eq!(engine.grade_claim(id).unwrap(), Grading::new(EvidenceGrade::Strong, 0.932));
    }

    #[test]
    fn test_support_and_contradiction_is_contested() {
        let engine = engine();
        let ids = sources(&engine, &["https://github.com/a", "https://ieee.org/b"]);
        let id = engine.add_claim("Y", None, &ids[..1], ClaimMetadata::new()).unwrap();
        assert_eq!(claim(&engine, id).evidence_grade, EvidenceGrade::Weak);

        assert!(engine
            .add_claim_source(id, ids[1], Relationship::Contradicts)
            .unwrap());
        let c = claim(&engine, id);
        assert_eq!(c.evidence_grade, EvidenceGrade::Contested);
        assert_eq!(c.confidence, 0.35);
    }

    #[test]
    fn test_duplicate_link_is_noop() {
        let engine = engine();
        let ids = sources(&engine, &["https://nature.com/a"]);
        let id = engine.add_claim("Z", None, &ids, ClaimMetadata::new()).unwrap();

        assert!(!engine
            .add_claim_source(id, ids[0], Relationship::Refutes)
            .unwrap());
        assert_eq!(claim(&engine, id).evidence_grade, EvidenceGrade::Weak);
    }

    #[test]
    fn test_contradicting_only_is_ungraded() {
        let engine = engine();
        let ids = sources(&engine, &["https://nature.com/a"]);
        let id = engine.add_claim("Z", None, &[], ClaimMetadata::new()).unwrap();
        engine
            .add_claim_source(id, ids[0], Relationship::Refutes)
            .unwrap();

        let c = claim(&engine, id);
        assert_eq!(c.evidence_grade, EvidenceGrade::Ungraded);
        assert_eq!(c.confidence, 0.3);
    }

    #[test]
    fn test_remove_source_regrades() {
        let engine = engine();
        let ids = sources(&engine, &["https://nature.com/a", "https://arxiv.org/b"]);
        let id = engine.add_claim("W", None, &ids, ClaimMetadata::new()).unwrap();
        assert_eq!(claim(&engine, id).evidence_grade, EvidenceGrade::Moderate);

        assert!(engine.remove_claim_source(id, ids[1]).unwrap());
        assert!(!engine.remove_claim_source(id, ids[1]).unwrap());
        assert_eq!(claim(&engine, id).evidence_grade, EvidenceGrade::Weak);
    }

    #[test]
    fn test_add_source_keeps_first_credibility() {
        let engine = engine();
        let first = engine
            .add_source(SourceInput::new("https://www.nature.com/a").title("Old"))
            .unwrap();
        let again = engine
            .add_source(
                SourceInput::new("https://www.nature.com/a")
                    .title("New")
                    .snippet("fresh"),
            )
            .unwrap();
        assert_eq!(first, again);

        let source = engine.get_source(first).unwrap().unwrap();
        assert_eq!(source.domain, "nature.com");
        assert_eq!(source.credibility, 0.95);
        assert_eq!(source.title, "New");
        assert_eq!(source.snippet, "fresh");

        engine
            .add_source(SourceInput::new("https://www.nature.com/a"))
            .unwrap();
        assert_eq!(engine.get_source(first).unwrap().unwrap().title, "New");
    }

    #[test]
    fn test_malformed_url_fails_soft() {
        let engine = engine();
        let id = engine.add_source(SourceInput::new("not a url")).unwrap();
        let source = engine.get_source(id).unwrap().unwrap();
        assert_eq!(source.domain, UNKNOWN_DOMAIN);
        assert_eq!(source.credibility, 0.4);

        assert!(matches!(
            engine.add_source(SourceInput::new("  ")),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_add_claim_rejects_bad_input() {
        let engine = engine();
        assert!(matches!(
            engine.add_claim(" ", None, &[], ClaimMetadata::new()),
            Err(Error::MalformedInput(_))
        ));

        let err = engine
            .add_claim("text", None, &[SourceId(77)], ClaimMetadata::new())
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(engine.list_claims(&ClaimQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_claim_handling() {
        let engine = engine();
        assert!(engine.grade_claim(ClaimId(9)).unwrap_err().is_not_found());
        assert!(engine
            .decompose_claim(ClaimId(9), DecompositionMethod::Auto)
            .unwrap()
            .is_empty());
        assert!(!engine
            .set_claim_status(ClaimId(9), ClaimStatus::Retracted)
            .unwrap());
    }

    #[test]
    fn test_decompose_inherits_links_and_rolls_up() {
        let engine = engine();
        let ids = sources(&engine, &["https://nature.com/a", "https://arxiv.org/b"]);
        let parent = engine
            .add_claim(COMPOUND, Some("materials"), &ids, ClaimMetadata::new())
            .unwrap();
        let parent_links = engine.store().get_claim_sources(parent).unwrap();

        let atoms = engine
            .decompose_claim(parent, DecompositionMethod::Auto)
            .unwrap();
        assert_eq!(atoms.len(), 2);

        for &atom in &atoms {
            let c = claim(&engine, atom);
            assert_eq!(c.claim_type, ClaimType::Atomic);
            assert_eq!(c.parent_claim_id, Some(parent));
            assert_eq!(c.entity_id.as_deref(), Some("materials"));
            assert_eq!(c.evidence_grade, EvidenceGrade::Moderate);
            assert_eq!(engine.store().get_claim_sources(atom).unwrap(), parent_links);
        }

        let p = claim(&engine, parent);
        assert_eq!(p.claim_type, ClaimType::Composite);
        assert_eq!(p.evidence_grade, EvidenceGrade::Strong);
        let record = p.metadata.rollup.unwrap();
        assert_eq!(record.factscore, 1.0);
        assert_eq!(record.atomic_count, 2);
        assert_eq!(record.supported_count, 2);
    }

    #[test]
    fn test_decompose_is_idempotent() {
        let engine = engine();
        let parent = engine
            .add_claim(COMPOUND, None, &[], ClaimMetadata::new())
            .unwrap();

        let first = engine
            .decompose_claim(parent, DecompositionMethod::Auto)
            .unwrap();
        let second = engine
            .decompose_claim(parent, DecompositionMethod::Heuristic)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.get_atomic_claims(parent).unwrap().len(), 2);
    }

    #[test]
    fn test_decompose_method_none_forces_singleton() {
        let engine = engine();
        let id = engine.add_claim(COMPOUND, None, &[], ClaimMetadata::new()).unwrap();

        assert!(engine
            .decompose_claim(id, DecompositionMethod::None)
            .unwrap()
            .is_empty());
        assert_eq!(claim(&engine, id).claim_type, ClaimType::Singleton);
        assert!(engine.get_atomic_claims(id).unwrap().is_empty());
    }

    #[test]
    fn test_atom_link_cascades_to_parent() {
        let engine = engine();
        let ids = sources(
            &engine,
            &["https://nature.com/a", "https://arxiv.org/b", "https://reddit.com/c"],
        );
        let parent = engine
            .add_claim(COMPOUND, None, &ids[..2], ClaimMetadata::new())
            .unwrap();
        let atoms = engine
            .decompose_claim(parent, DecompositionMethod::Auto)
            .unwrap();

        engine
            .add_claim_source(atoms[0], ids[2], Relationship::Contradicts)
            .unwrap();

        assert_eq!(claim(&engine, atoms[0]).evidence_grade, EvidenceGrade::Contested);
        let p = claim(&engine, parent);
        assert_eq!(p.evidence_grade, EvidenceGrade::Weak);
        assert_eq!(p.metadata.rollup.unwrap().factscore, 0.5);
    }

    #[test]
    fn test_self_consistency_persists_record() {
        let engine = engine();
        let ids = sources(
            &engine,
            &["https://nature.com/a", "https://arxiv.org/b", "https://ieee.org/c"],
        );
        let id = engine
            .add_claim("Y", None, &ids, ClaimMetadata::new().with_extra("agent", "scout"))
            .unwrap();

        let outcome = engine.grade_claim_sc(id, Some(7)).unwrap();
        assert_eq!(outcome.n_samples, 7);
        assert!((0.0..=1.0).contains(&outcome.agreement));

        let c = claim(&engine, id);
        assert_eq!(c.evidence_grade, outcome.majority.grade);
        assert_eq!(c.confidence, outcome.majority.confidence);
        let record = c.metadata.self_consistency.unwrap();
        assert_eq!(record.n_samples, 7);
        assert_eq!(c.metadata.extra.get("agent"), Some(&serde_json::json!("scout")));

        assert!(matches!(
            engine.grade_claim_sc(id, Some(0)),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_self_consistency_on_atom_rolls_up() {
        let engine = engine();
        let parent = engine.add_claim(COMPOUND, None, &[], ClaimMetadata::new()).unwrap();
        let atoms = engine
            .decompose_claim(parent, DecompositionMethod::Auto)
            .unwrap();

        engine.grade_claim_sc(atoms[0], None).unwrap();
        let record = claim(&engine, parent).metadata.rollup.unwrap();
        assert_eq!(record.atomic_count, 2);
        assert_eq!(record.supported_count, 0);
    }

    #[test]
    fn test_verify_kb_only() {
        let engine = engine();
        let id = engine
            .add_claim("Tokamak confinement record", None, &[], ClaimMetadata::new())
            .unwrap();
        engine
            .add_claim("Confinement record broken by a tokamak", None, &[], ClaimMetadata::new())
            .unwrap();
        engine
            .add_claim("Another tokamak milestone", None, &[], ClaimMetadata::new())
            .unwrap();

        let report = engine.verify_claim(id, &crate::evidence::NoSearch).unwrap();
        assert_eq!(report.method, VerificationMethod::KbOnly);
        assert_eq!(report.total_atoms, 1);
        assert_eq!(report.atom_results[0].kb_evidence.len(), 2);
        assert_eq!(report.atom_results[0].verdict, AtomVerdict::KbCorroborated);
        assert_eq!(report.atom_results[0].score, 0.66);
        assert_eq!(report.factuality_score, 0.66);

        let c = claim(&engine, id);
        assert_eq!(c.confidence, 0.66);
        assert_eq!(c.metadata.verification.unwrap().method, VerificationMethod::KbOnly);
    }

    #[test]
    fn test_verify_with_search_links_sources() {
        let engine = engine();
        let id = engine
            .add_claim("Stellarator reached steady state", None, &[], ClaimMetadata::new())
            .unwrap();

        let report = engine.verify_claim(id, &two_hits).unwrap();
        assert_eq!(report.method, VerificationMethod::SafeSearch);
        assert_eq!(report.atom_results[0].verdict, AtomVerdict::ExternallyVerified);
        assert_eq!(report.atom_results[0].score, 0.8);
        assert_eq!(report.verified_atoms, 1);

        let links = engine.store().get_claim_sources(id).unwrap();
        assert_eq!(links.len(), 2);
        let c = claim(&engine, id);
        assert_eq!(c.evidence_grade, EvidenceGrade::Moderate);
        assert_eq!(c.confidence, 0.8);

        let source = engine.get_source(links[0].source_id).unwrap().unwrap();
        assert_eq!(source.source_type, VERIFICATION_SOURCE_TYPE);
    }

    #[test]
    fn test_verify_ignores_hits_without_url() {
        let engine = engine();
        let id = engine
            .add_claim("Stellarator reached steady state", None, &[], ClaimMetadata::new())
            .unwrap();

        let report = engine.verify_claim(id, &one_blank_hit).unwrap();
        let atom = &report.atom_results[0];
        assert_eq!(atom.web_evidence.len(), 1);
        assert_eq!(atom.verdict, AtomVerdict::WeaklySupported);
        assert_eq!(atom.score, 0.5);

        assert_eq!(engine.store().get_claim_sources(id).unwrap().len(), 1);
        assert!(engine
            .list_sources(None, 0.0)
            .unwrap()
            .iter()
            .all(|s| !s.url.trim().is_empty()));
    }

    #[test]
    fn test_verify_survives_search_failure() {
        let engine = engine();
        let id = engine
            .add_claim("Lonely claim", None, &[], ClaimMetadata::new())
            .unwrap();

        let report = engine.verify_claim(id, &failing_search).unwrap();
        assert_eq!(report.method, VerificationMethod::SafeSearch);
        assert_eq!(report.atom_results[0].verdict, AtomVerdict::Unverified);
        assert_eq!(report.factuality_score, 0.3);
    }

    #[test]
    fn test_verify_uses_atoms() {
        let engine = engine();
        let parent = engine.add_claim(COMPOUND, None, &[], ClaimMetadata::new()).unwrap();
        let atoms = engine
            .decompose_claim(parent, DecompositionMethod::Auto)
            .unwrap();

        let report = engine.verify_claim(parent, &two_hits).unwrap();
        assert_eq!(report.total_atoms, 2);
        assert_eq!(
            report.atom_results.iter().map(|r| r.atom_id).collect::<Vec<_>>(),
            atoms
        );
        assert!(claim(&engine, parent).metadata.rollup.is_some());
    }

    #[test]
    fn test_confidence_decay() {
        let engine = engine();
        let ids = sources(&engine, &["https://arxiv.org/a"]);
        let old = engine.add_claim("Old", None, &ids, ClaimMetadata::new()).unwrap();
        let fresh = engine.add_claim("Fresh", None, &ids, ClaimMetadata::new()).unwrap();
        let retracted = engine.add_claim("Gone", None, &ids, ClaimMetadata::new()).unwrap();
        engine
            .set_claim_status(retracted, ClaimStatus::Retracted)
            .unwrap();

        let long_ago = Utc::now() - Duration::days(65);
        engine.store().set_created_at(old, long_ago).unwrap();
        engine.store().set_created_at(retracted, long_ago).unwrap();

        let decayed = engine.apply_confidence_decay(30, 0.1).unwrap();
        assert_eq!(decayed.len(), 1);
        assert_eq!(decayed[0].claim_id, old);
        assert_eq!(decayed[0].age_days, 65);
        // weak at 0.3 + 0.15 * 0.88, two periods
        assert_eq!(decayed[0].old_confidence, 0.432);
        assert_eq!(decayed[0].new_confidence, 0.35);

        assert_eq!(claim(&engine, old).confidence, 0.35);
        assert_eq!(claim(&engine, fresh).confidence, 0.432);
    }

    #[test]
    fn test_quotes_and_grounded_claims() {
        let engine = engine();
        let source = engine
            .add_source(
                SourceInput::new("https://iter.org/news")
                    .title("ITER")
                    .snippet("Short. First plasma is planned for 2035 [3]. Assembly continues on site."),
            )
            .unwrap();

        let extraction = engine.extract_quotes(source).unwrap();
        assert_eq!(extraction.quotes.len(), 2);
        assert!(extraction.quotes[0].has_numeric);
        assert!(extraction.quotes[0].has_citation);
        assert_eq!(extraction.credibility, 0.82);

        let quote = &extraction.quotes[0].text;
        let id = engine
            .claim_from_quote(quote, source, Some("iter"), None)
            .unwrap();
        let c = claim(&engine, id);
        assert_eq!(&c.text, quote);
        let grounding = c.metadata.grounding.unwrap();
        assert_eq!(grounding.method, "FRONT");
        assert_eq!(engine.store().get_claim_sources(id).unwrap().len(), 1);

        assert!(engine.extract_quotes(SourceId(404)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_contradiction_and_corroboration_reports() {
        let engine = engine();
        let ids = sources(&engine, &["https://nature.com/a", "https://reddit.com/b"]);
        let id = engine
            .add_claim("Disputed", Some("e"), &ids[..1], ClaimMetadata::new())
            .unwrap();
        engine
            .add_claim_source(id, ids[1], Relationship::Refutes)
            .unwrap();

        let contradictions = engine.check_contradictions(Some("e")).unwrap();
        assert_eq!(contradictions.len(), 1);
        assert_eq!(contradictions[0].relationship, Relationship::Refutes);

        let corroboration = engine.check_corroboration(Some("e")).unwrap();
        assert_eq!(corroboration[0].supporting_sources, 1);
        assert_eq!(corroboration[0].contradicting_sources, 1);
        assert_eq!(corroboration[0].corroboration_score, 0.3);

        let listed = engine.list_sources(Some("e"), 0.5).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ids[0]);
    }

    #[test]
    fn test_find_prior_research() {
        let engine = engine();
        let strong = sources(
            &engine,
            &[
                "https://economist.com/x",
                "https://theguardian.com/y",
                "https://ieee.org/z",
            ],
        );
        let add = |text: &str, links: &[SourceId]| {
            engine.add_claim(text, None, links, ClaimMetadata::new()).unwrap()
        };

        let tokamak = add("Tokamak plasma confinement record", &strong);
        let stellarator = add("Stellarator steady state achieved", &strong);
        add("Tokamak magnet design is unproven", &[]);
        let retracted = add("Tokamak ignition next year", &strong);
        add("Solar panels are cheaper", &strong);
        engine
            .set_claim_status(retracted, ClaimStatus::Retracted)
            .unwrap();

        let prior = engine
            .find_prior_research("tokamak stellarator", 0.4)
            .unwrap();
        assert_eq!(prior.query, "tokamak stellarator");
        let ids: Vec<ClaimId> = prior.claims.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![tokamak, stellarator]);

        assert!(engine
            .find_prior_research("\"tokamak\" AND", 0.0)
            .is_ok());
        assert!(engine.find_prior_research("   ", 0.0).unwrap().claims.is_empty());
    }
}
