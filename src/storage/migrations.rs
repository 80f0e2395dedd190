//! Embedded schema migrations for the encrypted store.
//!
//! A `schema_version` table holds a single row with the currently applied
//! version. On open, every migration with a version greater than the
//! recorded one runs in order, each inside its own transaction. Opening a
//! database whose recorded version exceeds [`CURRENT_VERSION`] is refused.

use crate::{Error, Result};
use rusqlite::Connection;

/// One forward-only schema change.
pub struct Migration {
    /// Monotonically increasing version this migration advances the schema to.
    pub version: i32,
    /// Short human-readable description, recorded for operators reading the table directly.
    pub description: &'static str,
    /// The DDL/DML to run, as a semicolon-separated batch.
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema: entities, observations, relationships, embeddings",
    sql: r"
        CREATE TABLE entities (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            entity_type TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE observations (
            id         TEXT PRIMARY KEY,
            entity_id  TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            content    TEXT NOT NULL,
            source     TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_observations_entity ON observations(entity_id);

        CREATE TABLE relationships (
            id            TEXT PRIMARY KEY,
            from_entity   TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            to_entity     TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            relation_type TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX idx_relationships_from ON relationships(from_entity);
        CREATE INDEX idx_relationships_to ON relationships(to_entity);

        CREATE TABLE embeddings (
            id             TEXT PRIMARY KEY,
            entity_id      TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            observation_id TEXT NOT NULL UNIQUE REFERENCES observations(id) ON DELETE CASCADE,
            vector         BLOB NOT NULL,
            text_content   TEXT NOT NULL,
            created_at     TEXT NOT NULL
        );
        CREATE INDEX idx_embeddings_entity ON embeddings(entity_id);
    ",
}];

/// The highest version this build understands.
#[must_use]
pub fn current_version() -> i32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Runs every migration newer than the recorded version. Refuses to proceed
/// if the recorded version is newer than this build's [`current_version`].
///
/// # Errors
///
/// Returns [`Error::Fatal`] if the recorded schema version is newer than
/// this build understands, or if a migration fails to apply.
pub fn run(conn: &Connection) -> Result<()> {
    ensure_version_table(conn)?;
    let recorded = get_version(conn)?;
    let max = current_version();

    if recorded > max {
        return Err(Error::Fatal(format!(
            "database schema version {recorded} is newer than this build supports (max {max})"
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > recorded) {
        apply(conn, migration)?;
    }

    Ok(())
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );",
    )?;
    let count: i64 = conn.query_row("SELECT count(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])?;
    }
    Ok(())
}

fn get_version(conn: &Connection) -> Result<i32> {
    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
    .map_err(Into::into)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql).map_err(|e| Error::Fatal(format!(
        "migration {} ({}) failed: {e}",
        migration.version, migration.description
    )))?;
    tx.execute("UPDATE schema_version SET version = ?1", [migration.version])?;
    tx.commit()?;
    tracing::info!(version = migration.version, description = migration.description, "applied migration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_creates_all_tables_and_records_version() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, current_version());

        for table in ["entities", "observations", "relationships", "embeddings"] {
            let exists: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "expected table {table} to exist");
        }
    }

    #[test]
    fn run_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), current_version());
    }

    #[test]
    fn run_refuses_newer_than_supported_version() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_version_table(&conn).unwrap();
        conn.execute("UPDATE schema_version SET version = ?1", [current_version() + 1])
            .unwrap();
        assert!(run(&conn).is_err());
    }
}
