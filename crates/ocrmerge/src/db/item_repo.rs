//! Item repository: the `items` and `item_files` tables.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::order::{FileRef, Item, ItemParts, ItemStatus};

/// Item columns without files.
struct ItemRow(ItemParts);

impl ItemRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self(ItemParts {
            id: row.get("id")?,
            order_id: row.get("order_id")?,
            company_id: row.get("company_id")?,
            document_type_id: row.get("document_type_id")?,
            name: row.get("name")?,
            status: row.get("status")?,
            files: Vec::new(),
            retry_of: row.get("retry_of")?,
            processing_started_at: row.get("processing_started_at")?,
            processing_ended_at: row.get("processing_ended_at")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
        }))
    }
}

fn file_from_row(row: &Row<'_>) -> Result<FileRef, rusqlite::Error> {
    Ok(FileRef {
        id: row.get("id")?,
        item_id: row.get("item_id")?,
        role: row.get("role")?,
        filename: row.get("filename")?,
        byte_len: row.get::<_, i64>("byte_len")? as u64,
        storage_ref: row.get("storage_ref")?,
        mime_type: row.get("mime_type")?,
    })
}

/// Inserts an item row and all of its files.
pub fn insert(conn: &Connection, item: &Item) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO items (id, order_id, company_id, document_type_id, name, status, retry_of,
         processing_started_at, processing_ended_at, error_message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            item.id(),
            item.order_id(),
            item.company_id(),
            item.document_type_id(),
            item.name(),
            item.status(),
            item.retry_of(),
            item.processing_started_at(),
            item.processing_ended_at(),
            item.error_message(),
            item.created_at(),
        ],
    )?;
    for file in item.files() {
        insert_file(conn, file)?;
    }
    Ok(())
}

/// Appends a file to an item. Files keep their insertion order.
pub fn insert_file(conn: &Connection, file: &FileRef) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO item_files (id, item_id, role, filename, byte_len, storage_ref, mime_type, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM item_files WHERE item_id = ?2))",
        params![
            file.id,
            file.item_id,
            file.role,
            file.filename,
            file.byte_len as i64,
            file.storage_ref,
            file.mime_type,
        ],
    )?;
    Ok(())
}

fn files_for(conn: &Connection, item_id: &str) -> Result<Vec<FileRef>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM item_files WHERE item_id = ?1 ORDER BY position")?;
    let files = stmt
        .query_map(params![item_id], file_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

fn hydrate(conn: &Connection, row: ItemRow) -> Result<Item, DatabaseError> {
    let mut parts = row.0;
    parts.files = files_for(conn, &parts.id)?;
    Ok(Item::from_parts(parts))
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Item>, DatabaseError> {
    let row = conn
        .query_row("SELECT * FROM items WHERE id = ?1", params![id], ItemRow::from_row)
        .optional()?;
    row.map(|r| hydrate(conn, r)).transpose()
}

/// Items of an order in creation order.
pub fn list_for_order(conn: &Connection, order_id: &str) -> Result<Vec<Item>, DatabaseError> {
    let mut stmt = conn
        .prepare("SELECT * FROM items WHERE order_id = ?1 ORDER BY created_at, rowid")?;
    let rows = stmt
        .query_map(params![order_id], ItemRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| hydrate(conn, r)).collect()
}

pub fn pending_ids(conn: &Connection, order_id: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM items WHERE order_id = ?1 AND status = ?2 ORDER BY created_at, rowid",
    )?;
    let ids = stmt
        .query_map(params![order_id, ItemStatus::Pending], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Compare-and-set PENDING → PROCESSING.
pub fn mark_processing(
    conn: &Connection,
    id: &str,
    at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE items SET status = ?2, processing_started_at = ?3 WHERE id = ?1 AND status = ?4",
        params![id, ItemStatus::Processing, at, ItemStatus::Pending],
    )?;
    Ok(changed == 1)
}

/// Writes a resolved item if it is still PROCESSING.
pub fn mark_resolved(conn: &Connection, item: &Item) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE items SET status = ?2, processing_ended_at = ?3, error_message = ?4
         WHERE id = ?1 AND status = ?5",
        params![
            item.id(),
            item.status(),
            item.processing_ended_at(),
            item.error_message(),
            ItemStatus::Processing,
        ],
    )?;
    Ok(changed == 1)
}

/// True when some item already retries `item_id`.
pub fn has_retry(conn: &Connection, item_id: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM items WHERE retry_of = ?1",
        params![item_id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{order_repo, Database};
    use crate::order::{FileRole, Order};

    fn setup() -> (Database, Order) {
        let db = Database::open_in_memory().unwrap();
        let order = Order::new(None);
        db.with_conn(|c| order_repo::insert(c, &order)).unwrap();
        (db, order)
    }

    #[test]
    fn test_insert_with_files_keeps_order() {
        let (db, order) = setup();
        let item = Item::new(&order.id, "acme", "invoice", "March");
        let item = item
            .with_file(FileRef::new(item.id(), FileRole::Primary, "a.pdf", 3, "o/a.pdf"))
            .unwrap()
            .with_file(FileRef::new(item.id(), FileRole::Attachment, "b.png", 4, "o/b.png"))
            .unwrap();
        db.with_conn(|c| insert(c, &item)).unwrap();

        let found = db.with_conn(|c| find_by_id(c, item.id())).unwrap().unwrap();
        assert_eq!(found.id(), item.id());
        assert_eq!(found.files(), item.files());
        assert_eq!(found.files()[0].role, FileRole::Primary);
        assert_eq!(found.files()[1].filename, "b.png");
    }

    #[test]
    fn test_mark_processing_is_compare_and_set() {
        let (db, order) = setup();
        let item = Item::new(&order.id, "acme", "invoice", "March");
        db.with_conn(|c| insert(c, &item)).unwrap();

        let now = Utc::now();
        assert!(db.with_conn(|c| mark_processing(c, item.id(), now)).unwrap());
        assert!(!db.with_conn(|c| mark_processing(c, item.id(), now)).unwrap());
        assert!(db.with_conn(|c| pending_ids(c, &order.id)).unwrap().is_empty());
    }

    #[test]
    fn test_mark_resolved_requires_processing() {
        let (db, order) = setup();
        let item = Item::new(&order.id, "acme", "invoice", "March");
        db.with_conn(|c| insert(c, &item)).unwrap();

        let started = item.start(Utc::now()).unwrap();
        let failed = started.fail("boom", Utc::now()).unwrap();
        assert!(!db.with_conn(|c| mark_resolved(c, &failed)).unwrap());

        db.with_conn(|c| mark_processing(c, item.id(), Utc::now())).unwrap();
        assert!(db.with_conn(|c| mark_resolved(c, &failed)).unwrap());

        let found = db.with_conn(|c| find_by_id(c, item.id())).unwrap().unwrap();
        assert_eq!(found.status(), ItemStatus::Failed);
        assert_eq!(found.error_message(), Some("boom"));
    }

    #[test]
    fn test_list_for_order() {
        let (db, order) = setup();
        for name in ["first", "second", "third"] {
            let item = Item::new(&order.id, "acme", "invoice", name);
            db.with_conn(|c| insert(c, &item)).unwrap();
        }
        let items = db.with_conn(|c| list_for_order(c, &order.id)).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(db.with_conn(|c| pending_ids(c, &order.id)).unwrap().len(), 3);
    }
}
