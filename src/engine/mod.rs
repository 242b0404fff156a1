//! The grading and convergence engine.
//!
//! [`KnowledgeEngine`] owns a [`ClaimStore`] and exposes every caller-facing
//! operation. Grading is push-based: linking or unlinking a source re-grades
//! the claim immediately, and a new grade on an atomic claim re-rolls its
//! composite parent before the operation returns.
//!
//! ## Transactions
//!
//! Each public operation runs inside [`ClaimStore::transaction`]. Either all
//! of its derived writes (claim fields, metadata, parent rollup) commit, or
//! none do.
//!
//! ## Example
//!
//! ```rust
//! use evidence_core::{ClaimMetadata, EngineConfig, EvidenceGrade, KnowledgeEngine, SourceInput};
//!
//! let engine = KnowledgeEngine::in_memory(EngineConfig::default().with_seed(7)).unwrap();
//! let sources: Vec<_> = ["https://nature.com/a", "https://arxiv.org/b", "https://nasa.gov/c"]
//!     .into_iter()
//!     .map(|url| engine.add_source(SourceInput::new(url)).unwrap())
//!     .collect();
//!
//! let claim = engine
//!     .add_claim("Plasma held for 30 seconds", Some("fusion"), &sources, ClaimMetadata::new())
//!     .unwrap();
//! let graded = engine.get_claim(claim).unwrap().unwrap();
//! assert_eq!(graded.evidence_grade, EvidenceGrade::Strong);
//! ```

mod cascade;
mod claims;
mod evaluations;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::evidence::{
    grade_sources, rollup, Claim, ClaimDecomposer, ClaimId, ClaimMetadata, Grading, Rollup,
    SelfConsistencyGrader,
};
use crate::store::{ClaimStore, SqliteKnowledgeStore};
use cascade::{PostWrite, PostWriteQueue};

pub use claims::SourceInput;

/// Evidence-grading engine over a claim store.
pub struct KnowledgeEngine<S> {
    store: S,
    config: EngineConfig,
    decomposer: ClaimDecomposer,
    consistency: SelfConsistencyGrader,
    rng: Mutex<StdRng>,
}

impl<S: ClaimStore> KnowledgeEngine<S> {
    /// Create an engine over `store`. The configuration is validated first.
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            decomposer: ClaimDecomposer::from_config(&config.decomposition),
            consistency: SelfConsistencyGrader::from_config(&config.self_consistency)?,
            rng: Mutex::new(rng),
            store,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> Result<T> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock sampler: {}", e)))?;
        Ok(f(&mut rng))
    }

    fn require_claim(&self, id: ClaimId) -> Result<Claim> {
        self.store
            .get_claim(id)?
            .ok_or_else(|| Error::claim_not_found(id))
    }

    /// Grade `claim` from its current links and persist the result.
    fn regrade(&self, claim: &Claim, queue: &mut PostWriteQueue) -> Result<Grading> {
        let links = self.store.get_claim_sources(claim.id)?;
        let grading = grade_sources(&links);
        self.write_grade(claim, grading, queue)?;

        debug!(
            claim = %claim.id,
            links = links.len(),
            grade = %grading.grade,
            confidence = grading.confidence,
            "Graded claim"
        );
        Ok(grading)
    }

    fn write_grade(
        &self,
        claim: &Claim,
        grading: Grading,
        queue: &mut PostWriteQueue,
    ) -> Result<()> {
        self.store.update_claim_grade(claim.id, grading)?;
        queue.graded(claim);
        Ok(())
    }

    /// Run every queued hook, including the ones queued along the way.
    fn drain(&self, mut queue: PostWriteQueue) -> Result<()> {
        while let Some(hook) = queue.next() {
            match hook {
                PostWrite::Rollup(parent) => {
                    self.rollup_composite(parent, &mut queue)?;
                }
            }
        }
        Ok(())
    }

    /// Recompute a composite's grade from its atomic children.
    ///
    /// A no-op when the claim is gone or has no children.
    fn rollup_composite(
        &self,
        parent: ClaimId,
        queue: &mut PostWriteQueue,
    ) -> Result<Option<Rollup>> {
        let Some(claim) = self.store.get_claim(parent)? else {
            warn!(claim = %parent, "Rollup target no longer exists");
            return Ok(None);
        };

        let children: Vec<Grading> = self
            .store
            .get_children(parent)?
            .iter()
            .map(|c| Grading::new(c.evidence_grade, c.confidence))
            .collect();
        let Some(result) = rollup(&children) else {
            return Ok(None);
        };

        self.write_grade(&claim, result.grading, queue)?;
        self.store.merge_claim_metadata(
            parent,
            ClaimMetadata {
                rollup: Some(result.record),
                ..Default::default()
            },
        )?;

        debug!(
            claim = %parent,
            factscore = result.record.factscore,
            supported = result.record.supported_count,
            atoms = result.record.atomic_count,
            grade = %result.grading.grade,
            "Rolled up composite"
        );
        Ok(Some(result))
    }
}

impl KnowledgeEngine<SqliteKnowledgeStore> {
    /// Open an engine over a SQLite database file.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening knowledge store");
        Self::new(SqliteKnowledgeStore::open(path)?, config)
    }

    /// An engine over a fresh in-memory store (for testing).
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(SqliteKnowledgeStore::in_memory()?, config)
    }
}

/// First `max` characters of `text`.
pub(crate) fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
