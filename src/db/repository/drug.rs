use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::drug::Drug;

/// Catalog entries for the prescription form dropdown, alphabetical.
pub fn list_drugs(conn: &Connection) -> Result<Vec<Drug>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, name, generic_name FROM drugs ORDER BY name ASC")?;

    let rows = stmt.query_map([], |row| {
        Ok(Drug {
            id: row.get(0)?,
            name: row.get(1)?,
            generic_name: row.get(2)?,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn find_drug(conn: &Connection, id: i64) -> Result<Option<Drug>, DatabaseError> {
    let drug = conn
        .query_row(
            "SELECT id, name, generic_name FROM drugs WHERE id = ?1",
            params![id],
            |row| {
                Ok(Drug {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    generic_name: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(drug)
}

pub fn insert_drug(
    conn: &Connection,
    name: &str,
    generic_name: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO drugs (name, generic_name) VALUES (?1, ?2)",
        params![name, generic_name],
    )?;
    Ok(conn.last_insert_rowid())
}
