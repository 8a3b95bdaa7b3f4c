//! Schema version gate.
//!
//! Each subsystem records its schema version as a row in the shared `system`
//! table (`name`, `value`). The message-id table is created once, then the
//! version row is written; both happen in the caller's transaction.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Error;

/// Name under which the message-id schema version is recorded.
pub const SCHEMA_NAME: &str = "messageid";

/// Schema version this build expects.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_SYSTEM_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS system (name TEXT PRIMARY KEY, value TEXT)";

const CREATE_MESSAGEID_TABLE: &str =
    "CREATE TABLE messageid (ticket INTEGER PRIMARY KEY, messageid TEXT)";

/// Stored version of `name`, or `None` if the subsystem was never initialized.
pub fn get_version(conn: &Connection, name: &str) -> Result<Option<i64>, Error> {
    if !table_exists(conn, "system")? {
        return Ok(None);
    }
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM system WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(None),
        Some(v) => v.trim().parse().map(Some).map_err(|_| {
            Error::Database(format!("schema version of {name} is not an integer: {v:?}"))
        }),
    }
}

/// Record `version` for `name`, inserting or updating the row.
pub fn set_version(conn: &Connection, name: &str, version: i64) -> Result<(), Error> {
    conn.execute(CREATE_SYSTEM_TABLE, [])?;
    let previous = get_version(conn, name)?;
    match previous {
        Some(_) => {
            conn.execute(
                "UPDATE system SET value = ?1 WHERE name = ?2",
                params![version.to_string(), name],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO system (name, value) VALUES (?1, ?2)",
                params![name, version.to_string()],
            )?;
        }
    }
    tracing::info!(
        subsystem = name,
        from = previous.unwrap_or(0),
        to = version,
        "Upgraded schema version"
    );
    Ok(())
}

/// Whether `name` must be upgraded to reach `expected`.
///
/// A stored version greater than `expected` is a downgrade and fails with
/// [`Error::SchemaDowngrade`].
pub fn needs_upgrade(conn: &Connection, expected: i64, name: &str) -> Result<bool, Error> {
    let stored = get_version(conn, name)?.unwrap_or(0);
    if stored > expected {
        return Err(Error::SchemaDowngrade {
            name: name.to_string(),
            stored,
            expected,
        });
    }
    Ok(stored < expected)
}

/// Create the message-id table (unless it already exists) and record the
/// current schema version.
///
/// Safe to re-enter after a run that created the table but failed before the
/// version row was written.
pub fn create_initial_schema(conn: &Connection) -> Result<(), Error> {
    if table_exists(conn, SCHEMA_NAME)? {
        tracing::debug!(table = SCHEMA_NAME, "Table already present, recording version only");
    } else {
        conn.execute(CREATE_MESSAGEID_TABLE, [])?;
        tracing::debug!(table = SCHEMA_NAME, "Created table");
    }
    set_version(conn, SCHEMA_NAME, SCHEMA_VERSION)
}

/// Bring the schema up to [`SCHEMA_VERSION`].
pub fn upgrade(conn: &Connection) -> Result<(), Error> {
    let stored = get_version(conn, SCHEMA_NAME)?.unwrap_or(0);
    if stored == 0 {
        create_initial_schema(conn)?;
    }
    // Future migrations go here, keyed on `stored`.
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool, Error> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
