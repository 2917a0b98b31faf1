//! Schema versions for the documents store.
//!
//! `_migrations` records every applied step. Each step runs in its own
//! transaction together with its bookkeeping row.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_documents_table",
        sql: include_str!("sql/001_create_documents.sql"),
    },
    Step {
        version: 2,
        name: "add_convert_status_index",
        sql: include_str!("sql/002_add_convert_status_index.sql"),
    },
];

pub const LATEST_VERSION: u32 = 2;

/// Highest applied version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}

/// Brings the schema up to [`LATEST_VERSION`].
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let applied = schema_version(conn)?;
    if applied > LATEST_VERSION {
        return Err(DatabaseError::Migration {
            version: applied,
            reason: format!("database is newer than this build (expects <= {})", LATEST_VERSION),
        });
    }

    for step in STEPS.iter().filter(|s| s.version > applied) {
        log::info!("Applying schema v{} ({})", step.version, step.name);

        let apply = |conn: &Connection| -> rusqlite::Result<()> {
            conn.execute_batch("BEGIN")?;
            conn.execute_batch(step.sql)?;
            conn.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![step.version, step.name, Utc::now().to_rfc3339()],
            )?;
            conn.execute_batch("COMMIT")
        };
        if let Err(e) = apply(conn) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(DatabaseError::Migration {
                version: step.version,
                reason: e.to_string(),
            });
        }
    }

    Ok(())
}
