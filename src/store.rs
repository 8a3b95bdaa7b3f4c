//! Ticket → Message-ID mapping.
//!
//! Backed by the `messageid (ticket INTEGER PRIMARY KEY, messageid TEXT)` table.
//! Writes are "first write wins": once a ticket has a Message-ID, later inserts
//! leave it untouched so threads already started keep their anchor.
//!
//! All functions take a [`Connection`]; pass the [`Transaction`](rusqlite::Transaction)
//! from [`Environment::db_transaction`](crate::Environment::db_transaction) for writes.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Error;

/// A stored mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIdRecord {
    pub ticket_id: i64,
    pub message_id: String,
}

/// Message-ID stored for `ticket_id`.
pub fn get(conn: &Connection, ticket_id: i64) -> Result<Option<String>, Error> {
    Ok(conn
        .query_row(
            "SELECT messageid FROM messageid WHERE ticket = ?1",
            params![ticket_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Store `message_id` for `ticket_id` unless one is already stored.
///
/// Returns `true` if a row was inserted.
pub fn insert_if_absent(conn: &Connection, ticket_id: i64, message_id: &str) -> Result<bool, Error> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO messageid (ticket, messageid) VALUES (?1, ?2)",
        params![ticket_id, message_id],
    )?;
    Ok(inserted > 0)
}

/// Delete every mapping. Returns the number of rows removed.
pub fn clear_all(conn: &Connection) -> Result<usize, Error> {
    Ok(conn.execute("DELETE FROM messageid", [])?)
}

/// Every stored mapping, ordered by ticket.
pub fn all(conn: &Connection) -> Result<Vec<MessageIdRecord>, Error> {
    let mut stmt = conn.prepare("SELECT ticket, messageid FROM messageid ORDER BY ticket")?;
    let rows = stmt.query_map([], |row| {
        Ok(MessageIdRecord {
            ticket_id: row.get(0)?,
            message_id: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Ids of tickets in the tracker's `ticket` table that have no mapping yet.
pub fn tickets_without_message_id(conn: &Connection) -> Result<Vec<i64>, Error> {
    let mut stmt = conn.prepare(
        "SELECT id FROM ticket WHERE id NOT IN (SELECT ticket FROM messageid) ORDER BY id",
    )?;
    let ids = stmt.query_map([], |row| row.get(0))?;
    Ok(ids.collect::<Result<Vec<i64>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_initial_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_get_absent() {
        let conn = conn();
        assert_eq!(get(&conn, 42).unwrap(), None);
    }

    #[test]
    fn test_first_write_wins() {
        let conn = conn();
        assert!(insert_if_absent(&conn, 7, "<first@example.com>").unwrap());
        assert!(!insert_if_absent(&conn, 7, "<second@example.com>").unwrap());
        assert_eq!(get(&conn, 7).unwrap().as_deref(), Some("<first@example.com>"));
    }

    #[test]
    fn test_clear_all() {
        let conn = conn();
        insert_if_absent(&conn, 1, "<a@x>").unwrap();
        insert_if_absent(&conn, 2, "<b@x>").unwrap();
        assert_eq!(clear_all(&conn).unwrap(), 2);
        assert!(all(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_tickets_without_message_id() {
        let conn = conn();
        conn.execute_batch(
            "CREATE TABLE ticket (id INTEGER PRIMARY KEY, summary TEXT);
             INSERT INTO ticket (id, summary) VALUES (1, 'a'), (2, 'b'), (3, 'c');",
        )
        .unwrap();
        insert_if_absent(&conn, 2, "<b@x>").unwrap();
        assert_eq!(tickets_without_message_id(&conn).unwrap(), vec![1, 3]);
    }
}
