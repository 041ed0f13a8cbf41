//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding completed document
//! analyses, so a document analyzed in one session is not re-analyzed in the
//! next. Rows are keyed by document handle and a stage-configuration
//! fingerprint; a change of prompts or models yields a new fingerprint and
//! therefore a cache miss.
//!
//! A row is written by a single statement with all four outputs, so a stored
//! analysis is always complete.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use docent_shared::{AnalysisRecord, DocentError, Result};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Listing entry for a stored analysis.
#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    /// Document handle the analysis belongs to.
    pub handle: String,
    /// Stage-configuration fingerprint it was produced under.
    pub fingerprint: String,
    /// When it was stored.
    pub created_at: DateTime<Utc>,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocentError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocentError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DocentError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DocentError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Analysis operations
    // -----------------------------------------------------------------------

    /// Fetch the stored analysis for `handle` under `fingerprint`.
    pub async fn get_analysis(
        &self,
        handle: &str,
        fingerprint: &str,
    ) -> Result<Option<AnalysisRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT raw_text, summary, critique, innovation FROM analysis
                 WHERE handle = ?1 AND fingerprint = ?2",
                params![handle, fingerprint],
            )
            .await
            .map_err(|e| DocentError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocentError::Storage(e.to_string())),
        }
    }

    /// Store a completed analysis (upserts).
    pub async fn put_analysis(
        &self,
        handle: &str,
        fingerprint: &str,
        record: &AnalysisRecord,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO analysis (handle, fingerprint, raw_text, summary, critique, innovation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(handle, fingerprint) DO UPDATE SET
                   raw_text = excluded.raw_text,
                   summary = excluded.summary,
                   critique = excluded.critique,
                   innovation = excluded.innovation,
                   created_at = excluded.created_at",
                params![
                    handle,
                    fingerprint,
                    record.raw_text.as_str(),
                    record.summary.as_str(),
                    record.critique.as_str(),
                    record.innovation.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DocentError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete every stored analysis of `handle`. Returns the number of rows removed.
    pub async fn delete_analysis(&self, handle: &str) -> Result<u64> {
        self.conn
            .execute("DELETE FROM analysis WHERE handle = ?1", params![handle])
            .await
            .map_err(|e| DocentError::Storage(e.to_string()))
    }

    /// List stored analyses, newest first.
    pub async fn list_analyses(&self) -> Result<Vec<StoredAnalysis>> {
        let mut rows = self
            .conn
            .query(
                "SELECT handle, fingerprint, created_at FROM analysis ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| DocentError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let created_at: String = row
                .get(2)
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            results.push(StoredAnalysis {
                handle: row
                    .get::<String>(0)
                    .map_err(|e| DocentError::Storage(e.to_string()))?,
                fingerprint: row
                    .get::<String>(1)
                    .map_err(|e| DocentError::Storage(e.to_string()))?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| DocentError::Storage(format!("invalid date: {e}")))?,
            });
        }
        Ok(results)
    }
}

/// Convert a database row to an [`AnalysisRecord`].
fn row_to_record(row: &libsql::Row) -> Result<AnalysisRecord> {
    Ok(AnalysisRecord {
        raw_text: row
            .get::<String>(0)
            .map_err(|e| DocentError::Storage(e.to_string()))?,
        summary: row
            .get::<String>(1)
            .map_err(|e| DocentError::Storage(e.to_string()))?,
        critique: row
            .get::<String>(2)
            .map_err(|e| DocentError::Storage(e.to_string()))?,
        innovation: row
            .get::<String>(3)
            .map_err(|e| DocentError::Storage(e.to_string()))?,
    })
}
