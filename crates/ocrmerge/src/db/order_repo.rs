//! Order repository: CRUD and counter operations for the `orders` table.
//!
//! Functions take a `Connection` so they compose inside a transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::codec::{json_column, optional_json_column, to_json};
use super::DatabaseError;
use crate::order::{ItemStatus, Order, OrderStatus};

fn order_from_row(row: &Row<'_>) -> Result<Order, rusqlite::Error> {
    Ok(Order {
        id: row.get("id")?,
        name: row.get("name")?,
        status: row.get("status")?,
        total_items: row.get("total_items")?,
        completed_items: row.get("completed_items")?,
        failed_items: row.get("failed_items")?,
        mapping_file: row.get("mapping_file")?,
        mapping_keys: optional_json_column(row, "mapping_keys")?,
        report_paths: json_column(row, "report_paths")?,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(conn: &Connection, order: &Order) -> Result<(), DatabaseError> {
    let mapping_keys = order.mapping_keys.as_ref().map(to_json).transpose()?;
    conn.execute(
        "INSERT INTO orders (id, name, status, total_items, completed_items, failed_items,
         mapping_file, mapping_keys, report_paths, error_message, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            order.id,
            order.name,
            order.status,
            order.total_items,
            order.completed_items,
            order.failed_items,
            order.mapping_file,
            mapping_keys,
            to_json(&order.report_paths)?,
            order.error_message,
            order.created_at,
            order.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Order>, DatabaseError> {
    Ok(conn
        .query_row("SELECT * FROM orders WHERE id = ?1", params![id], order_from_row)
        .optional()?)
}

/// Moves the order from `from` to `to` if it is still in `from`.
pub fn compare_and_set_status(
    conn: &Connection,
    id: &str,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![id, from, to, now],
    )?;
    Ok(changed == 1)
}

/// Moves a PROCESSING order to `to` only while its counters still match the
/// snapshot the target was computed from and every item is resolved.
pub fn compare_and_set_rollup(
    conn: &Connection,
    snapshot: &Order,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?2, updated_at = ?3
         WHERE id = ?1 AND status = ?4
           AND total_items = ?5 AND completed_items = ?6 AND failed_items = ?7
           AND completed_items + failed_items = total_items",
        params![
            snapshot.id,
            to,
            now,
            OrderStatus::Processing,
            snapshot.total_items,
            snapshot.completed_items,
            snapshot.failed_items
        ],
    )?;
    Ok(changed == 1)
}

pub fn increment_total(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE orders SET total_items = total_items + 1, updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    Ok(())
}

/// Counts a resolved item against the order.
pub fn record_resolution(
    conn: &Connection,
    id: &str,
    status: ItemStatus,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let sql = match status {
        ItemStatus::Completed => {
            "UPDATE orders SET completed_items = completed_items + 1, updated_at = ?2 WHERE id = ?1"
        }
        ItemStatus::Failed => {
            "UPDATE orders SET failed_items = failed_items + 1, updated_at = ?2 WHERE id = ?1"
        }
        ItemStatus::Pending | ItemStatus::Processing => return Ok(()),
    };
    conn.execute(sql, params![id, now])?;
    Ok(())
}

/// Takes one failed attempt out of the counters so a retry can fill its slot.
pub fn release_failed_slot(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE orders SET failed_items = failed_items - 1, updated_at = ?2
         WHERE id = ?1 AND failed_items > 0",
        params![id, now],
    )?;
    Ok(())
}

pub fn set_mapping_keys(
    conn: &Connection,
    id: &str,
    keys: &[String],
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE orders SET mapping_keys = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, to_json(keys)?, now],
    )?;
    Ok(())
}

pub fn set_mapping_file(
    conn: &Connection,
    id: &str,
    storage_ref: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE orders SET mapping_file = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, storage_ref, now],
    )?;
    Ok(())
}

pub fn set_error(
    conn: &Connection,
    id: &str,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE orders SET error_message = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, message, now],
    )?;
    Ok(())
}

pub fn set_report_paths(
    conn: &Connection,
    id: &str,
    paths: &[String],
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE orders SET report_paths = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, to_json(paths)?, now],
    )?;
    Ok(())
}
