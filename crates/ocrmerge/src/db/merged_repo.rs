//! Merged table storage, one table per order.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::codec::{json_column, to_json};
use super::DatabaseError;
use crate::merge::MergedTable;

/// Stores the merged table for an order, replacing any previous one.
pub fn upsert(conn: &Connection, order_id: &str, table: &MergedTable) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO merged_tables (order_id, content, row_count, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(order_id) DO UPDATE SET
            content = excluded.content,
            row_count = excluded.row_count,
            updated_at = excluded.updated_at",
        params![order_id, to_json(table)?, table.len() as i64, Utc::now()],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, order_id: &str) -> Result<Option<MergedTable>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT content FROM merged_tables WHERE order_id = ?1",
            params![order_id],
            |r| json_column(r, "content"),
        )
        .optional()?)
}
