//! Core types for evidence grading.
//!
//! Claims are assertions recorded by research agents. Each claim is graded from
//! the credibility of the sources linked to it, and compound claims can be split
//! into atomic children whose grades roll back up into the parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::Error;

/// Unique identifier for a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub i64);

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Categorical assessment of the evidence behind a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceGrade {
    /// Three or more credible supporting sources
    Strong,
    /// Two or more reasonably credible supporting sources
    Moderate,
    /// Thin or low-credibility support
    Weak,
    /// No supporting sources
    Ungraded,
    /// Both supporting and contradicting sources
    Contested,
}

impl EvidenceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
            Self::Ungraded => "ungraded",
            Self::Contested => "contested",
        }
    }

    /// Whether this grade counts as adequately supported for rollup.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Strong | Self::Moderate)
    }
}

impl std::fmt::Display for EvidenceGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceGrade {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong" => Ok(Self::Strong),
            "moderate" => Ok(Self::Moderate),
            "weak" => Ok(Self::Weak),
            "ungraded" => Ok(Self::Ungraded),
            "contested" => Ok(Self::Contested),
            other => Err(Error::MalformedInput(format!("unknown evidence grade: {other}"))),
        }
    }
}

/// How a source relates to a claim.
///
/// Unrecognized relationship strings are preserved as `Other` and ignored for
/// grading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Relationship {
    Supports,
    Confirms,
    Contradicts,
    Refutes,
    Other(String),
}

impl Relationship {
    pub fn parse(s: &str) -> Self {
        match s {
            "supports" => Self::Supports,
            "confirms" => Self::Confirms,
            "contradicts" => Self::Contradicts,
            "refutes" => Self::Refutes,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Supports => "supports",
            Self::Confirms => "confirms",
            Self::Contradicts => "contradicts",
            Self::Refutes => "refutes",
            Self::Other(s) => s,
        }
    }

    pub fn is_supporting(&self) -> bool {
        matches!(self, Self::Supports | Self::Confirms)
    }

    pub fn is_contradicting(&self) -> bool {
        matches!(self, Self::Contradicts | Self::Refutes)
    }
}

impl Default for Relationship {
    fn default() -> Self {
        Self::Supports
    }
}

impl From<String> for Relationship {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Relationship> for String {
    fn from(r: Relationship) -> Self {
        r.as_str().to_string()
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural role of a claim in the decomposition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Not decomposed (or not decomposable)
    Singleton,
    /// Split into two or more atomic children
    Composite,
    /// Child produced by decomposition
    Atomic,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Composite => "composite",
            Self::Atomic => "atomic",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "composite" => Self::Composite,
            "atomic" => Self::Atomic,
            _ => Self::Singleton,
        }
    }
}

impl std::fmt::Display for ClaimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Retracted,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retracted => "retracted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "retracted" => Self::Retracted,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provenance record with a domain credibility score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub url: String,
    pub title: String,
    /// Registered domain with any leading `www.` removed
    pub domain: String,
    pub snippet: String,
    /// Trust score fixed at registration time
    pub credibility: f64,
    pub source_type: String,
    pub accessed_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

/// A source as seen from one claim: its credibility and the link relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedSource {
    pub source_id: SourceId,
    pub credibility: f64,
    pub relationship: Relationship,
}

impl LinkedSource {
    pub fn new(source_id: SourceId, credibility: f64, relationship: Relationship) -> Self {
        Self {
            source_id,
            credibility,
            relationship,
        }
    }
}

/// Outcome of grading a claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub grade: EvidenceGrade,
    pub confidence: f64,
}

impl Grading {
    pub fn new(grade: EvidenceGrade, confidence: f64) -> Self {
        Self { grade, confidence }
    }
}

/// An evidence-backed assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub text: String,
    /// Owning entity, if any
    pub entity_id: Option<String>,
    pub evidence_grade: EvidenceGrade,
    pub confidence: f64,
    pub status: ClaimStatus,
    pub claim_type: ClaimType,
    pub parent_claim_id: Option<ClaimId>,
    pub metadata: ClaimMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    pub fn is_atomic(&self) -> bool {
        self.claim_type == ClaimType::Atomic
    }

    pub fn is_composite(&self) -> bool {
        self.claim_type == ClaimType::Composite
    }
}

/// Rollup figures persisted on a composite claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollupRecord {
    pub factscore: f64,
    pub atomic_count: usize,
    pub supported_count: usize,
}

/// Count of one grade within a self-consistency run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCount {
    pub grade: EvidenceGrade,
    pub count: usize,
}

/// Record of the most recent self-consistency grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfConsistencyRecord {
    pub n_samples: usize,
    /// Grades in the order they were first drawn
    pub grade_distribution: Vec<GradeCount>,
    pub agreement: f64,
    /// (min, max) of sampled confidences
    pub confidence_range: (f64, f64),
}

/// How a verification run gathered evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// KB lookup plus the external search collaborator
    SafeSearch,
    /// KB lookup only
    KbOnly,
}

impl std::fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SafeSearch => write!(f, "safe_search"),
            Self::KbOnly => write!(f, "kb_only"),
        }
    }
}

/// Record of the most recent verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub avg_score: f64,
    pub min_score: f64,
    pub verified_atoms: usize,
    pub total_atoms: usize,
    pub method: VerificationMethod,
}

/// Quote a claim was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingRecord {
    pub quote: String,
    pub method: String,
}

/// Typed metadata bag carried by every claim.
///
/// Writes go through [`ClaimMetadata::merge`]: a patch only replaces the
/// sub-records it carries and never clobbers sibling keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decomposed_from: Option<ClaimId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollup: Option<RollupRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_consistency: Option<SelfConsistencyRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingRecord>,
    /// Caller-supplied keys without a typed home
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ClaimMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Merge a patch into this bag, keeping every key the patch leaves unset.
    pub fn merge(&mut self, patch: ClaimMetadata) {
        if patch.decomposed_from.is_some() {
            self.decomposed_from = patch.decomposed_from;
        }
        if patch.rollup.is_some() {
            self.rollup = patch.rollup;
        }
        if patch.self_consistency.is_some() {
            self.self_consistency = patch.self_consistency;
        }
        if patch.verification.is_some() {
            self.verification = patch.verification;
        }
        if patch.grounding.is_some() {
            self.grounding = patch.grounding;
        }
        self.extra.extend(patch.extra);
    }
}

/// Filter for listing claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimQuery {
    pub entity_id: Option<String>,
    pub grade: Option<EvidenceGrade>,
    pub status: Option<ClaimStatus>,
}

impl ClaimQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn grade(mut self, grade: EvidenceGrade) -> Self {
        self.grade = Some(grade);
        self
    }

    pub fn status(mut self, status: ClaimStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Round to three decimals, the precision grades are persisted at.
pub(crate) fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
