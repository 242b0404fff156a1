//! SQLite-backed knowledge store implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::schema::{initialize_schema, is_initialized};
use super::{ClaimStore, NewClaim, NewSource};
use crate::error::{Error, Result};
use crate::evaluation::{Evaluation, EvaluationId, EvaluationStatus};
use crate::evidence::{
    Claim, ClaimId, ClaimMetadata, ClaimQuery, ClaimStatus, ClaimType, Contradiction,
    EvidenceGrade, Grading, LinkSummary, LinkedSource, Relationship, Source, SourceId,
};

const CLAIM_COLUMNS: &str = "c.id, c.claim_text, c.entity_id, c.evidence_grade, c.confidence, \
     c.status, c.claim_type, c.parent_claim_id, c.metadata, c.created_at, c.updated_at";

const SOURCE_COLUMNS: &str = "s.id, s.url, s.title, s.domain, s.snippet, s.credibility, \
     s.source_type, s.accessed_at, s.metadata";

const EVALUATION_COLUMNS: &str = "id, parent_id, iteration, max_iterations, status, confidence, \
     gaps, contradictions, convergence_criteria, confidence_history, gap_thompson_params, \
     decision, rationale, created_at, updated_at";

/// SQLite-backed knowledge store.
pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    savepoint_depth: AtomicUsize,
}

impl SqliteKnowledgeStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if !is_initialized(&conn) {
            initialize_schema(&conn)?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            savepoint_depth: AtomicUsize::new(0),
        }
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    fn query_claims(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Claim>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let claims = stmt
                .query_map(params, row_to_claim)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(claims)
        })
    }

    #[cfg(test)]
    pub(crate) fn set_created_at(&self, id: ClaimId, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE claims SET created_at = ?2 WHERE id = ?1",
                params![id.0, timestamp(at)],
            )
        })?;
        Ok(())
    }

    fn ensure_updated(rows: usize, id: ClaimId) -> Result<()> {
        if rows == 0 {
            Err(Error::claim_not_found(id))
        } else {
            Ok(())
        }
    }
}

impl ClaimStore for SqliteKnowledgeStore {
    // ==================== Sources ====================

    fn insert_source(&self, source: &NewSource) -> Result<SourceId> {
        let metadata = serde_json::to_string(&source.metadata)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sources (url, title, domain, snippet, credibility, source_type, accessed_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    source.url,
                    source.title,
                    source.domain,
                    source.snippet,
                    source.credibility,
                    source.source_type,
                    timestamp(Utc::now()),
                    metadata,
                ],
            )?;
            Ok(SourceId(conn.last_insert_rowid()))
        })
    }

    fn find_source_by_url(&self, url: &str) -> Result<Option<SourceId>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id FROM sources WHERE url = ?1", params![url], |row| {
                row.get(0).map(SourceId)
            })
            .optional()
        })
    }

    fn refresh_source(&self, id: SourceId, title: &str, snippet: &str) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE sources SET title = ?2, snippet = ?3, accessed_at = ?4 WHERE id = ?1",
                params![id.0, title, snippet, timestamp(Utc::now())],
            )
        })?;
        if rows == 0 {
            return Err(Error::source_not_found(id));
        }
        Ok(())
    }

    fn get_source(&self, id: SourceId) -> Result<Option<Source>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources s WHERE s.id = ?1"),
                params![id.0],
                row_to_source,
            )
            .optional()
        })
    }

    fn list_sources(&self, entity_id: Option<&str>, min_credibility: f64) -> Result<Vec<Source>> {
        self.with_conn(|conn| {
            let sources = match entity_id {
                Some(entity) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT DISTINCT {SOURCE_COLUMNS} FROM sources s
                         JOIN claim_sources cs ON s.id = cs.source_id
                         JOIN claims c ON cs.claim_id = c.id
                         WHERE c.entity_id = ?1 AND s.credibility >= ?2
                         ORDER BY s.credibility DESC, s.id"
                    ))?;
                    let rows = stmt.query_map(params![entity, min_credibility], row_to_source)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SOURCE_COLUMNS} FROM sources s
                         WHERE s.credibility >= ?1
                         ORDER BY s.credibility DESC, s.id"
                    ))?;
                    let rows = stmt.query_map(params![min_credibility], row_to_source)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(sources)
        })
    }

    // ==================== Claims ====================

    fn insert_claim(&self, claim: &NewClaim) -> Result<ClaimId> {
        let metadata = serde_json::to_string(&claim.metadata)?;
        let now = timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO claims (claim_text, entity_id, claim_type, parent_claim_id, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    claim.text,
                    claim.entity_id,
                    claim.claim_type.as_str(),
                    claim.parent_claim_id.map(|p| p.0),
                    metadata,
                    now,
                ],
            )?;
            Ok(ClaimId(conn.last_insert_rowid()))
        })
    }

    fn get_claim(&self, id: ClaimId) -> Result<Option<Claim>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CLAIM_COLUMNS} FROM claims c WHERE c.id = ?1"),
                params![id.0],
                row_to_claim,
            )
            .optional()
        })
    }

    fn list_claims(&self, query: &ClaimQuery) -> Result<Vec<Claim>> {
        let mut sql = format!("SELECT {CLAIM_COLUMNS} FROM claims c WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref entity) = query.entity_id {
            sql.push_str(" AND c.entity_id = ?");
            params_vec.push(Box::new(entity.clone()));
        }
        if let Some(grade) = query.grade {
            sql.push_str(" AND c.evidence_grade = ?");
            params_vec.push(Box::new(grade.as_str()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND c.status = ?");
            params_vec.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY c.confidence DESC, c.id");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();
        self.query_claims(&sql, &params_refs)
    }

    fn update_claim_grade(&self, id: ClaimId, grading: Grading) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE claims SET evidence_grade = ?2, confidence = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    id.0,
                    grading.grade.as_str(),
                    grading.confidence,
                    timestamp(Utc::now())
                ],
            )
        })?;
        Self::ensure_updated(rows, id)
    }

    fn update_claim_confidence(&self, id: ClaimId, confidence: f64) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE claims SET confidence = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.0, confidence, timestamp(Utc::now())],
            )
        })?;
        Self::ensure_updated(rows, id)
    }

    fn merge_claim_metadata(&self, id: ClaimId, patch: ClaimMetadata) -> Result<()> {
        let mut metadata = self
            .get_claim(id)?
            .ok_or_else(|| Error::claim_not_found(id))?
            .metadata;
        metadata.merge(patch);
        let json = serde_json::to_string(&metadata)?;

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE claims SET metadata = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.0, json, timestamp(Utc::now())],
            )
        })?;
        Ok(())
    }

    fn set_claim_type(&self, id: ClaimId, claim_type: ClaimType) -> Result<()> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE claims SET claim_type = ?2 WHERE id = ?1",
                params![id.0, claim_type.as_str()],
            )
        })?;
        Self::ensure_updated(rows, id)
    }

    fn set_claim_status(&self, id: ClaimId, status: ClaimStatus) -> Result<bool> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE claims SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.0, status.as_str(), timestamp(Utc::now())],
            )
        })?;
        Ok(rows > 0)
    }

    fn create_atomic_claim(
        &self,
        parent: ClaimId,
        text: &str,
        entity_id: Option<&str>,
        inherited: &[LinkedSource],
    ) -> Result<ClaimId> {
        let metadata = ClaimMetadata {
            decomposed_from: Some(parent),
            ..Default::default()
        };
        let id = self.insert_claim(&NewClaim {
            text: text.to_string(),
            entity_id: entity_id.map(str::to_string),
            claim_type: ClaimType::Atomic,
            parent_claim_id: Some(parent),
            metadata,
        })?;

        for link in inherited {
            self.link_source(id, link.source_id, &link.relationship)?;
        }
        Ok(id)
    }

    fn get_children(&self, parent: ClaimId) -> Result<Vec<Claim>> {
        self.query_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM claims c
                 WHERE c.parent_claim_id = ?1 AND c.claim_type = 'atomic'
                 ORDER BY c.id"
            ),
            &[&parent.0],
        )
    }

    fn search_claims(&self, fts_query: &str, exclude: ClaimId, limit: usize) -> Result<Vec<Claim>> {
        self.query_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM claims c
                 JOIN claims_fts f ON c.id = f.rowid
                 WHERE claims_fts MATCH ?1 AND c.id != ?2
                 ORDER BY rank
                 LIMIT ?3"
            ),
            &[&fts_query, &exclude.0, &(limit as i64)],
        )
    }

    fn prior_claims(
        &self,
        fts_query: &str,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Claim>> {
        self.query_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM claims c
                 JOIN claims_fts f ON c.id = f.rowid
                 WHERE claims_fts MATCH ?1 AND c.confidence >= ?2 AND c.status = 'active'
                 ORDER BY c.confidence DESC, c.id
                 LIMIT ?3"
            ),
            &[&fts_query, &min_confidence, &(limit as i64)],
        )
    }

    fn active_claims_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Claim>> {
        self.query_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM claims c
                 WHERE c.created_at < ?1 AND c.status = 'active'
                 ORDER BY c.id"
            ),
            &[&timestamp(cutoff)],
        )
    }

    // ==================== Links ====================

    fn link_source(
        &self,
        claim: ClaimId,
        source: SourceId,
        relationship: &Relationship,
    ) -> Result<bool> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO claim_sources (claim_id, source_id, relationship)
                 VALUES (?1, ?2, ?3)",
                params![claim.0, source.0, relationship.as_str()],
            )
        })?;
        if rows == 0 {
            debug!(claim = %claim, source = %source, "Link already exists");
        }
        Ok(rows > 0)
    }

    fn unlink_source(&self, claim: ClaimId, source: SourceId) -> Result<bool> {
        let rows = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM claim_sources WHERE claim_id = ?1 AND source_id = ?2",
                params![claim.0, source.0],
            )
        })?;
        Ok(rows > 0)
    }

    fn get_claim_sources(&self, claim: ClaimId) -> Result<Vec<LinkedSource>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.credibility, cs.relationship FROM sources s
                 JOIN claim_sources cs ON s.id = cs.source_id
                 WHERE cs.claim_id = ?1
                 ORDER BY s.id",
            )?;
            let links = stmt
                .query_map(params![claim.0], |row| {
                    Ok(LinkedSource::new(
                        SourceId(row.get(0)?),
                        row.get(1)?,
                        Relationship::parse(&row.get::<_, String>(2)?),
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })
    }

    fn contradictions(&self, entity_id: Option<&str>) -> Result<Vec<Contradiction>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.claim_text, c.entity_id, c.evidence_grade, c.confidence,
                        cs.relationship, s.id, s.url, s.title, s.credibility
                 FROM claims c
                 JOIN claim_sources cs ON c.id = cs.claim_id
                 JOIN sources s ON cs.source_id = s.id
                 WHERE cs.relationship IN ('contradicts', 'refutes')
                   AND (?1 IS NULL OR c.entity_id = ?1)
                 ORDER BY s.credibility DESC, c.id",
            )?;
            let rows = stmt
                .query_map(params![entity_id], |row| {
                    Ok(Contradiction {
                        claim_id: ClaimId(row.get(0)?),
                        claim_text: row.get(1)?,
                        entity_id: row.get(2)?,
                        evidence_grade: parse_grade(row.get(3)?),
                        confidence: row.get(4)?,
                        relationship: Relationship::parse(&row.get::<_, String>(5)?),
                        source_id: SourceId(row.get(6)?),
                        url: row.get(7)?,
                        source_title: row.get(8)?,
                        credibility: row.get(9)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn link_summaries(&self, entity_id: Option<&str>) -> Result<Vec<LinkSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.claim_text, c.entity_id, c.evidence_grade, c.confidence,
                        COUNT(CASE WHEN cs.relationship IN ('supports', 'confirms') THEN 1 END) AS n_sup,
                        COUNT(CASE WHEN cs.relationship IN ('contradicts', 'refutes') THEN 1 END) AS n_con,
                        AVG(CASE WHEN cs.relationship IN ('supports', 'confirms') THEN s.credibility END),
                        AVG(CASE WHEN cs.relationship IN ('contradicts', 'refutes') THEN s.credibility END)
                 FROM claims c
                 LEFT JOIN claim_sources cs ON c.id = cs.claim_id
                 LEFT JOIN sources s ON cs.source_id = s.id
                 WHERE (?1 IS NULL OR c.entity_id = ?1)
                 GROUP BY c.id
                 ORDER BY n_sup DESC, c.id",
            )?;
            let rows = stmt
                .query_map(params![entity_id], |row| {
                    Ok(LinkSummary {
                        claim_id: ClaimId(row.get(0)?),
                        claim_text: row.get(1)?,
                        entity_id: row.get(2)?,
                        evidence_grade: parse_grade(row.get(3)?),
                        confidence: row.get(4)?,
                        supporting: row.get::<_, i64>(5)? as usize,
                        contradicting: row.get::<_, i64>(6)? as usize,
                        avg_support_credibility: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                        avg_contradict_credibility: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ==================== Evaluations ====================

    fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<EvaluationId> {
        let encoded = EncodedEvaluation::new(evaluation)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO evaluations (
                    parent_id, iteration, max_iterations, status, confidence, gaps, contradictions,
                    convergence_criteria, confidence_history, gap_thompson_params, decision, rationale,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    evaluation.parent_id,
                    evaluation.iteration,
                    evaluation.max_iterations,
                    evaluation.status.as_str(),
                    evaluation.confidence,
                    encoded.gaps,
                    encoded.contradictions,
                    encoded.criteria,
                    encoded.history,
                    encoded.posteriors,
                    evaluation.decision,
                    evaluation.rationale,
                    timestamp(evaluation.created_at),
                    timestamp(evaluation.updated_at),
                ],
            )?;
            Ok(EvaluationId(conn.last_insert_rowid()))
        })
    }

    fn get_evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = ?1"),
                params![id.0],
                row_to_evaluation,
            )
            .optional()
        })
    }

    fn save_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        let encoded = EncodedEvaluation::new(evaluation)?;
        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE evaluations SET
                    iteration = ?2, max_iterations = ?3, status = ?4, confidence = ?5, gaps = ?6,
                    contradictions = ?7, convergence_criteria = ?8, confidence_history = ?9,
                    gap_thompson_params = ?10, decision = ?11, rationale = ?12, updated_at = ?13
                 WHERE id = ?1",
                params![
                    evaluation.id.0,
                    evaluation.iteration,
                    evaluation.max_iterations,
                    evaluation.status.as_str(),
                    evaluation.confidence,
                    encoded.gaps,
                    encoded.contradictions,
                    encoded.criteria,
                    encoded.history,
                    encoded.posteriors,
                    evaluation.decision,
                    evaluation.rationale,
                    timestamp(evaluation.updated_at),
                ],
            )
        })?;
        if rows == 0 {
            return Err(Error::evaluation_not_found(evaluation.id));
        }
        Ok(())
    }

    fn evaluations_for(&self, parent_id: &str) -> Result<Vec<Evaluation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVALUATION_COLUMNS} FROM evaluations
                 WHERE parent_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map(params![parent_id], row_to_evaluation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ==================== Transactions ====================

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let depth = self.savepoint_depth.fetch_add(1, Ordering::SeqCst);
        let name = format!("sp_{depth}");

        if let Err(e) = self.with_conn(|conn| conn.execute_batch(&format!("SAVEPOINT {name}"))) {
            self.savepoint_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }

        let result = f(self);
        let finish = match result {
            Ok(_) => format!("RELEASE SAVEPOINT {name}"),
            Err(_) => format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"),
        };
        let finished = self.with_conn(|conn| conn.execute_batch(&finish));
        self.savepoint_depth.fetch_sub(1, Ordering::SeqCst);

        if result.is_err() {
            debug!(savepoint = %name, "Rolled back");
        }
        let value = result?;
        finished?;
        Ok(value)
    }
}

/// JSON text columns of an evaluation.
struct EncodedEvaluation {
    gaps: String,
    contradictions: String,
    criteria: String,
    history: String,
    posteriors: String,
}

impl EncodedEvaluation {
    fn new(ev: &Evaluation) -> Result<Self> {
        Ok(Self {
            gaps: serde_json::to_string(&ev.gaps)?,
            contradictions: serde_json::to_string(&ev.contradictions)?,
            criteria: serde_json::to_string(&ev.criteria)?,
            history: serde_json::to_string(&ev.confidence_history)?,
            posteriors: serde_json::to_string(&ev.gap_posteriors)?,
        })
    }
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_grade(s: String) -> EvidenceGrade {
    s.parse().unwrap_or(EvidenceGrade::Ungraded)
}

fn row_to_claim(row: &rusqlite::Row) -> rusqlite::Result<Claim> {
    Ok(Claim {
        id: ClaimId(row.get(0)?),
        text: row.get(1)?,
        entity_id: row.get(2)?,
        evidence_grade: parse_grade(row.get(3)?),
        confidence: row.get(4)?,
        status: ClaimStatus::parse(&row.get::<_, String>(5)?),
        claim_type: ClaimType::parse(&row.get::<_, String>(6)?),
        parent_claim_id: row.get::<_, Option<i64>>(7)?.map(ClaimId),
        metadata: json_column(row, 8)?,
        created_at: datetime_column(row, 9)?,
        updated_at: datetime_column(row, 10)?,
    })
}

fn row_to_source(row: &rusqlite::Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: SourceId(row.get(0)?),
        url: row.get(1)?,
        title: row.get(2)?,
        domain: row.get(3)?,
        snippet: row.get(4)?,
        credibility: row.get(5)?,
        source_type: row.get(6)?,
        accessed_at: datetime_column(row, 7)?,
        metadata: json_column(row, 8)?,
    })
}

fn row_to_evaluation(row: &rusqlite::Row) -> rusqlite::Result<Evaluation> {
    Ok(Evaluation {
        id: EvaluationId(row.get(0)?),
        parent_id: row.get(1)?,
        iteration: row.get(2)?,
        max_iterations: row.get(3)?,
        status: EvaluationStatus::parse(&row.get::<_, String>(4)?),
        confidence: row.get(5)?,
        gaps: json_column(row, 6)?,
        contradictions: json_column(row, 7)?,
        criteria: json_column(row, 8)?,
        confidence_history: json_column(row, 9)?,
        gap_posteriors: json_column(row, 10)?,
        decision: row.get(11)?,
        rationale: row.get(12)?,
        created_at: datetime_column(row, 13)?,
        updated_at: datetime_column(row, 14)?,
    })
}

/// Fixed-width UTC timestamp; `created_at` cutoffs compare these as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Corrupt timestamps surface as row errors.
fn datetime_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
