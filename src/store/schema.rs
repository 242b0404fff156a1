//! SQLite schema and migrations for the knowledge store.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL lets readers proceed while a grading cascade is writing
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_schema_version(conn).unwrap_or(0);
    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            domain TEXT NOT NULL,
            snippet TEXT NOT NULL DEFAULT '',
            credibility REAL NOT NULL DEFAULT 0.5,
            source_type TEXT NOT NULL DEFAULT 'web',
            accessed_at TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS claims (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            claim_text TEXT NOT NULL,
            entity_id TEXT,
            evidence_grade TEXT NOT NULL DEFAULT 'ungraded',
            confidence REAL NOT NULL DEFAULT 0.3,
            status TEXT NOT NULL DEFAULT 'active',
            claim_type TEXT NOT NULL DEFAULT 'singleton',
            parent_claim_id INTEGER,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (parent_claim_id) REFERENCES claims(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS claim_sources (
            claim_id INTEGER NOT NULL,
            source_id INTEGER NOT NULL,
            relationship TEXT NOT NULL DEFAULT 'supports',
            PRIMARY KEY (claim_id, source_id),
            FOREIGN KEY (claim_id) REFERENCES claims(id) ON DELETE CASCADE,
            FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS evaluations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id TEXT NOT NULL,
            iteration INTEGER NOT NULL DEFAULT 1,
            max_iterations INTEGER NOT NULL DEFAULT 5,
            status TEXT NOT NULL DEFAULT 'evaluating',
            confidence REAL NOT NULL DEFAULT 0.0,
            gaps TEXT NOT NULL DEFAULT '[]',
            contradictions TEXT NOT NULL DEFAULT '[]',
            convergence_criteria TEXT NOT NULL DEFAULT '{}',
            confidence_history TEXT NOT NULL DEFAULT '[]',
            gap_thompson_params TEXT NOT NULL DEFAULT '{}',
            decision TEXT,
            rationale TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_claims_entity ON claims(entity_id);
        CREATE INDEX IF NOT EXISTS idx_claims_parent ON claims(parent_claim_id);
        CREATE INDEX IF NOT EXISTS idx_claims_confidence ON claims(confidence);
        CREATE INDEX IF NOT EXISTS idx_claim_sources_source ON claim_sources(source_id);
        CREATE INDEX IF NOT EXISTS idx_sources_credibility ON sources(credibility);
        CREATE INDEX IF NOT EXISTS idx_evaluations_parent ON evaluations(parent_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS claims_fts USING fts5(
            claim_text,
            content='claims',
            content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS claims_ai AFTER INSERT ON claims BEGIN
            INSERT INTO claims_fts(rowid, claim_text) VALUES (NEW.id, NEW.claim_text);
        END;
        CREATE TRIGGER IF NOT EXISTS claims_ad AFTER DELETE ON claims BEGIN
            INSERT INTO claims_fts(claims_fts, rowid, claim_text)
                VALUES ('delete', OLD.id, OLD.claim_text);
        END;
        CREATE TRIGGER IF NOT EXISTS claims_au AFTER UPDATE OF claim_text ON claims BEGIN
            INSERT INTO claims_fts(claims_fts, rowid, claim_text)
                VALUES ('delete', OLD.id, OLD.claim_text);
            INSERT INTO claims_fts(rowid, claim_text) VALUES (NEW.id, NEW.claim_text);
        END;

        INSERT INTO schema_version (version) VALUES (1);",
    )
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='claims'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}
