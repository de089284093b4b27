//! SQLite build-history store. Each evaluated build is persisted with its
//! verdict, counts, and warning set so later builds can resolve a reference
//! set for new/fixed delta computation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::str::FromStr;

use crate::error::{DepgateError, Result};
use crate::model::{BuildInfo, BuildResult, ResultWarning, Severity, Verdict, Warning};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS build (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    created_at   TEXT NOT NULL,
    verdict      TEXT NOT NULL,
    reference_id INTEGER REFERENCES build(id),
    total_high   INTEGER NOT NULL,
    total_normal INTEGER NOT NULL,
    total_low    INTEGER NOT NULL,
    new_high     INTEGER NOT NULL,
    new_normal   INTEGER NOT NULL,
    new_low      INTEGER NOT NULL,
    fixed_count  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS warning (
    id        INTEGER PRIMARY KEY,
    build_id  INTEGER NOT NULL REFERENCES build(id) ON DELETE CASCADE,
    identity  TEXT NOT NULL,
    message   TEXT NOT NULL,
    severity  TEXT NOT NULL,
    file_path TEXT NOT NULL,
    is_new    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_warning_build ON warning(build_id);
CREATE INDEX IF NOT EXISTS idx_build_verdict ON build(verdict);
";

/// Open (or create) the depgate database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized
/// database.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(DepgateError::Other(format!(
            "Database schema version {} is newer than this binary supports ({}). \
             Please upgrade depgate.",
            version, SCHEMA_VERSION
        )));
    }
    if version < SCHEMA_VERSION {
        // No migrations exist yet; the first schema change adds them here.
        return Err(DepgateError::Other(format!(
            "No migration path from schema version {} to {}. \
             Consider deleting the database and re-publishing.",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Persist a build result. Returns the build id.
pub fn insert_build(conn: &mut Connection, result: &BuildResult) -> Result<i64> {
    let tx = conn.transaction()?;
    let build_id = insert_build_tx(&tx, result)?;
    tx.commit()?;
    Ok(build_id)
}

fn insert_build_tx(tx: &Transaction, result: &BuildResult) -> Result<i64> {
    let now = Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO build (name, created_at, verdict, reference_id, \
                            total_high, total_normal, total_low, \
                            new_high, new_normal, new_low, fixed_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            result.build_name,
            now,
            result.verdict.as_str(),
            result.reference_id,
            result.totals.high,
            result.totals.normal,
            result.totals.low,
            result.new_counts.high,
            result.new_counts.normal,
            result.new_counts.low,
            result.fixed_count,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DepgateError::Other(format!(
                "Build '{}' already exists. Choose a different --build name, or delete it first.",
                result.build_name
            ))
        }
        other => DepgateError::Sqlite(other),
    })?;
    let build_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO warning (build_id, identity, message, severity, file_path, is_new) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for rw in &result.warnings {
            stmt.execute(params![
                build_id,
                rw.warning.identity,
                rw.warning.message,
                rw.warning.severity.as_str(),
                rw.warning.file_path,
                rw.is_new,
            ])?;
        }
    }

    Ok(build_id)
}

fn build_info_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BuildInfo> {
    let total_high: u64 = row.get("total_high")?;
    let total_normal: u64 = row.get("total_normal")?;
    let total_low: u64 = row.get("total_low")?;
    let new_high: u64 = row.get("new_high")?;
    let new_normal: u64 = row.get("new_normal")?;
    let new_low: u64 = row.get("new_low")?;
    Ok(BuildInfo {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        verdict: row.get("verdict")?,
        total_count: total_high + total_normal + total_low,
        new_count: new_high + new_normal + new_low,
        fixed_count: row.get("fixed_count")?,
    })
}

/// List all stored builds, oldest first.
pub fn list_builds(conn: &Connection) -> Result<Vec<BuildInfo>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, created_at, verdict, total_high, total_normal, total_low, \
                new_high, new_normal, new_low, fixed_count \
         FROM build ORDER BY id",
    )?;
    let rows = stmt.query_map([], build_info_from_row)?;
    let mut builds = Vec::new();
    for row in rows {
        builds.push(row?);
    }
    Ok(builds)
}

/// Look up a build id by name.
pub fn find_build_id(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row("SELECT id FROM build WHERE name = ?1", params![name], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| DepgateError::BuildNotFound(name.to_string()))
}

/// Load a build's warning set in insertion (report) order.
pub fn load_warnings(conn: &Connection, build_id: i64, new_only: bool) -> Result<Vec<ResultWarning>> {
    let sql = if new_only {
        "SELECT identity, message, severity, file_path, is_new \
         FROM warning WHERE build_id = ?1 AND is_new = 1 ORDER BY id"
    } else {
        "SELECT identity, message, severity, file_path, is_new \
         FROM warning WHERE build_id = ?1 ORDER BY id"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![build_id], |row| {
        Ok((
            row.get::<_, String>("identity")?,
            row.get::<_, String>("message")?,
            row.get::<_, String>("severity")?,
            row.get::<_, String>("file_path")?,
            row.get::<_, bool>("is_new")?,
        ))
    })?;
    let mut warnings = Vec::new();
    for row in rows {
        let (identity, message, severity, file_path, is_new) = row?;
        let severity = Severity::from_str(&severity)?;
        warnings.push(ResultWarning {
            warning: Warning {
                identity,
                message,
                severity,
                file_path,
            },
            is_new,
        });
    }
    Ok(warnings)
}

/// Resolve the reference build for delta computation: the most recent build,
/// or the most recent stable one when `use_stable` is set. `None` (no usable
/// reference, empty reference set) is a valid outcome, never an error.
pub fn resolve_reference(conn: &Connection, use_stable: bool) -> Result<Option<(i64, Vec<Warning>)>> {
    let sql = if use_stable {
        "SELECT id FROM build WHERE verdict = 'stable' ORDER BY id DESC LIMIT 1"
    } else {
        "SELECT id FROM build ORDER BY id DESC LIMIT 1"
    };
    let id: Option<i64> = conn.query_row(sql, [], |row| row.get(0)).optional()?;

    match id {
        Some(id) => {
            let warnings = load_warnings(conn, id, false)?
                .into_iter()
                .map(|rw| rw.warning)
                .collect();
            Ok(Some((id, warnings)))
        }
        None => Ok(None),
    }
}

/// Delete a build and its warnings.
pub fn delete_build(conn: &mut Connection, name: &str) -> Result<()> {
    let build_id = find_build_id(conn, name)?;
    let tx = conn.transaction()?;
    // Clear dangling reference ids before the cascade removes the warnings.
    tx.execute(
        "UPDATE build SET reference_id = NULL WHERE reference_id = ?1",
        params![build_id],
    )?;
    tx.execute("DELETE FROM build WHERE id = ?1", params![build_id])?;
    tx.commit()?;
    Ok(())
}

/// Verdict of a stored build, parsed back from its row.
pub fn build_verdict(conn: &Connection, build_id: i64) -> Result<Verdict> {
    let verdict: String = conn.query_row(
        "SELECT verdict FROM build WHERE id = ?1",
        params![build_id],
        |row| row.get(0),
    )?;
    Verdict::from_str(&verdict)
}
