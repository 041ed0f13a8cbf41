//! SQL migration definitions for the Docent database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: analysis records",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Completed preprocessing results, one row per document and stage configuration
CREATE TABLE IF NOT EXISTS analysis (
    handle      TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    raw_text    TEXT NOT NULL,
    summary     TEXT NOT NULL,
    critique    TEXT NOT NULL,
    innovation  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (handle, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_analysis_handle ON analysis(handle);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
