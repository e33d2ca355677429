//! Extraction result repository. Results are set once per file.

use rusqlite::{params, Connection, Row};

use super::codec::{json_column, to_json};
use super::DatabaseError;
use crate::gateway::SetResult;
use crate::order::ExtractionResult;

fn result_from_row(row: &Row<'_>) -> Result<ExtractionResult, rusqlite::Error> {
    Ok(ExtractionResult {
        file_id: row.get("file_id")?,
        item_id: row.get("item_id")?,
        outcome: json_column(row, "outcome")?,
        recorded_at: row.get("recorded_at")?,
    })
}

/// Inserts a result unless the file already has one.
pub fn insert_once(conn: &Connection, result: &ExtractionResult) -> Result<SetResult, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO extraction_results (file_id, item_id, outcome, recorded_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(file_id) DO NOTHING",
        params![
            result.file_id,
            result.item_id,
            to_json(&result.outcome)?,
            result.recorded_at,
        ],
    )?;
    Ok(if changed == 1 {
        SetResult::Stored
    } else {
        SetResult::AlreadySet
    })
}

/// Results of an item in file order.
pub fn list_for_item(conn: &Connection, item_id: &str) -> Result<Vec<ExtractionResult>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT r.* FROM extraction_results r
         JOIN item_files f ON f.id = r.file_id
         WHERE r.item_id = ?1
         ORDER BY f.position",
    )?;
    let results = stmt
        .query_map(params![item_id], result_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results)
}
