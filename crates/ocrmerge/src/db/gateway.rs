//! `PersistenceGateway` and `MappingSource` over SQLite.
//!
//! State checks that guard a write run inside the same transaction as the
//! write, so concurrent callers observe a consistent order record.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{item_repo, mapping_repo, merged_repo, order_repo, result_repo};
use super::{Database, DatabaseError};
use crate::error::{ConfigError, OrderError, Result};
use crate::gateway::{PersistenceGateway, ProcessOutcome, SetResult};
use crate::mapping::{ItemType, MappingDefault, MappingSource, MappingTemplate};
use crate::merge::MergedTable;
use crate::order::machine::{ensure_transition, require_status};
use crate::order::{ExtractionResult, FileRef, Item, ItemStatus, Order, OrderStatus};

fn load_order(conn: &Connection, order_id: &str) -> Result<Order> {
    order_repo::find_by_id(conn, order_id)?
        .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()).into())
}

fn load_item(conn: &Connection, item_id: &str) -> Result<Item> {
    item_repo::find_by_id(conn, item_id)?
        .ok_or_else(|| OrderError::ItemNotFound(item_id.to_string()).into())
}

impl MappingSource for Database {
    fn mapping_default(
        &self,
        company_id: &str,
        document_type_id: &str,
        item_type: ItemType,
    ) -> std::result::Result<Option<MappingDefault>, DatabaseError> {
        self.with_conn(|c| mapping_repo::find_default(c, company_id, document_type_id, item_type))
    }

    fn mapping_template(
        &self,
        id: i64,
    ) -> std::result::Result<Option<MappingTemplate>, DatabaseError> {
        self.with_conn(|c| mapping_repo::find_template(c, id))
    }

    fn find_mapping_template(
        &self,
        company_id: &str,
        document_type_id: &str,
        item_type: ItemType,
    ) -> std::result::Result<Option<MappingTemplate>, DatabaseError> {
        self.with_conn(|c| {
            mapping_repo::find_best_template(c, company_id, document_type_id, item_type)
        })
    }
}

impl PersistenceGateway for Database {
    fn create_order(&self, order: &Order) -> Result<()> {
        Ok(self.with_conn(|c| order_repo::insert(c, order))?)
    }

    fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.with_conn(|c| order_repo::find_by_id(c, order_id))?)
    }

    fn add_item(&self, item: &Item) -> Result<()> {
        self.with_transaction(|tx| {
            let order = load_order(tx, item.order_id())?;
            require_status(&order, &[OrderStatus::Draft], "add_item")?;
            if item.status() != ItemStatus::Pending {
                return Err(OrderError::InvalidState {
                    id: item.id().to_string(),
                    status: item.status().to_string(),
                    operation: "add_item",
                }
                .into());
            }
            item_repo::insert(tx, item)?;
            order_repo::increment_total(tx, &order.id, Utc::now())?;
            Ok(())
        })
    }

    fn get_item(&self, item_id: &str) -> Result<Option<Item>> {
        Ok(self.with_conn(|c| item_repo::find_by_id(c, item_id))?)
    }

    fn list_items(&self, order_id: &str) -> Result<Vec<Item>> {
        Ok(self.with_conn(|c| item_repo::list_for_order(c, order_id))?)
    }

    fn attach_file(&self, file: &FileRef) -> Result<()> {
        self.with_transaction(|tx| {
            let item = load_item(tx, &file.item_id)?;
            let order = load_order(tx, item.order_id())?;
            require_status(
                &order,
                &[OrderStatus::Draft, OrderStatus::Processing],
                "attach_file",
            )?;
            // Validates the item is still open.
            item.with_file(file.clone())?;
            item_repo::insert_file(tx, file)?;
            Ok(())
        })
    }

    fn set_mapping_keys(&self, order_id: &str, keys: &[String]) -> Result<()> {
        self.with_transaction(|tx| {
            let order = load_order(tx, order_id)?;
            require_status(&order, &[OrderStatus::Draft], "set_mapping_keys")?;
            order_repo::set_mapping_keys(tx, order_id, keys, Utc::now())?;
            Ok(())
        })
    }

    fn set_mapping_file(&self, order_id: &str, storage_ref: &str) -> Result<()> {
        self.with_transaction(|tx| {
            let order = load_order(tx, order_id)?;
            require_status(&order, &[OrderStatus::Draft], "set_mapping_file")?;
            order_repo::set_mapping_file(tx, order_id, storage_ref, Utc::now())?;
            Ok(())
        })
    }

    fn submit_order(&self, order_id: &str) -> Result<Vec<String>> {
        self.with_transaction(|tx| {
            let order = load_order(tx, order_id)?;
            require_status(&order, &[OrderStatus::Draft], "submit")?;
            if order.total_items == 0 {
                return Err(OrderError::NoItems(order_id.to_string()).into());
            }
            order_repo::compare_and_set_status(
                tx,
                order_id,
                OrderStatus::Draft,
                OrderStatus::Processing,
                Utc::now(),
            )?;
            Ok(item_repo::pending_ids(tx, order_id)?)
        })
    }

    fn begin_processing(&self, item_id: &str, at: DateTime<Utc>) -> Result<ProcessOutcome> {
        self.with_transaction(|tx| {
            let item = load_item(tx, item_id)?;
            if !item_repo::mark_processing(tx, item_id, at)? {
                return Ok(ProcessOutcome::Skipped);
            }
            Ok(ProcessOutcome::Started(item.start(at)?))
        })
    }

    fn set_item_result(&self, result: &ExtractionResult) -> Result<SetResult> {
        Ok(self.with_conn(|c| result_repo::insert_once(c, result))?)
    }

    fn get_item_results(&self, item_id: &str) -> Result<Vec<ExtractionResult>> {
        Ok(self.with_conn(|c| result_repo::list_for_item(c, item_id))?)
    }

    fn set_item_status(&self, item: &Item) -> Result<Order> {
        if !item.status().is_terminal() {
            return Err(OrderError::InvalidItemTransition {
                id: item.id().to_string(),
                from: ItemStatus::Processing.to_string(),
                to: item.status().to_string(),
            }
            .into());
        }

        self.with_transaction(|tx| {
            if !item_repo::mark_resolved(tx, item)? {
                let current = load_item(tx, item.id())?;
                return Err(OrderError::InvalidItemTransition {
                    id: item.id().to_string(),
                    from: current.status().to_string(),
                    to: item.status().to_string(),
                }
                .into());
            }
            order_repo::record_resolution(tx, item.order_id(), item.status(), Utc::now())?;
            load_order(tx, item.order_id())
        })
    }

    fn transition_order(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(OrderError::InvalidOrderTransition {
                id: order_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        Ok(self.with_conn(|c| {
            order_repo::compare_and_set_status(c, order_id, from, to, Utc::now())
        })?)
    }

    fn rollup_order(&self, snapshot: &Order, to: OrderStatus) -> Result<bool> {
        require_status(snapshot, &[OrderStatus::Processing], "rollup")?;
        ensure_transition(snapshot, to)?;
        Ok(self.with_conn(|c| order_repo::compare_and_set_rollup(c, snapshot, to, Utc::now()))?)
    }

    fn set_order_error(&self, order_id: &str, message: Option<&str>) -> Result<()> {
        Ok(self.with_conn(|c| order_repo::set_error(c, order_id, message, Utc::now()))?)
    }

    fn retry_item(&self, retry: &Item) -> Result<Order> {
        let failed_id = retry.retry_of().ok_or_else(|| OrderError::InvalidState {
            id: retry.id().to_string(),
            status: retry.status().to_string(),
            operation: "retry",
        })?;

        self.with_transaction(|tx| {
            let failed = load_item(tx, failed_id)?;
            if failed.status() != ItemStatus::Failed || item_repo::has_retry(tx, failed_id)? {
                return Err(OrderError::InvalidItemTransition {
                    id: failed_id.to_string(),
                    from: failed.status().to_string(),
                    to: "RETRIED".to_string(),
                }
                .into());
            }

            let order = load_order(tx, failed.order_id())?;
            require_status(
                &order,
                &[OrderStatus::Processing, OrderStatus::Failed],
                "retry",
            )?;

            let now = Utc::now();
            if order.status == OrderStatus::Failed {
                order_repo::compare_and_set_status(
                    tx,
                    &order.id,
                    OrderStatus::Failed,
                    OrderStatus::Processing,
                    now,
                )?;
            }
            order_repo::release_failed_slot(tx, &order.id, now)?;
            item_repo::insert(tx, retry)?;
            load_order(tx, &order.id)
        })
    }

    fn save_merged_table(&self, order_id: &str, table: &MergedTable) -> Result<()> {
        Ok(self.with_conn(|c| merged_repo::upsert(c, order_id, table))?)
    }

    fn get_merged_table(&self, order_id: &str) -> Result<Option<MergedTable>> {
        Ok(self.with_conn(|c| merged_repo::find(c, order_id))?)
    }

    fn set_report_paths(&self, order_id: &str, paths: &[String]) -> Result<()> {
        Ok(self.with_conn(|c| order_repo::set_report_paths(c, order_id, paths, Utc::now()))?)
    }

    fn save_mapping_template(&self, template: &MappingTemplate) -> Result<i64> {
        template
            .validate()
            .map_err(|reason| ConfigError::InvalidTemplate {
                name: template.name.clone(),
                reason,
            })?;
        Ok(self.with_conn(|c| mapping_repo::upsert_template(c, template))?)
    }

    fn save_mapping_default(&self, default: &MappingDefault) -> Result<()> {
        Ok(self.with_conn(|c| mapping_repo::upsert_default(c, default))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrmergeError;
    use crate::order::FileRole;

    fn draft_with_item(db: &Database) -> (Order, Item) {
        let order = Order::new(None);
        db.create_order(&order).unwrap();
        let item = Item::new(&order.id, "acme", "invoice", "March");
        let item = item
            .with_file(FileRef::new(item.id(), FileRole::Primary, "a.pdf", 1, "a"))
            .unwrap();
        db.add_item(&item).unwrap();
        (order, item)
    }

    #[test]
    fn test_add_item_counts_total() {
        let db = Database::open_in_memory().unwrap();
        let (order, _) = draft_with_item(&db);
        let order = db.get_order(&order.id).unwrap().unwrap();
        assert_eq!(order.total_items, 1);
    }

    #[test]
    fn test_submit_requires_items() {
        let db = Database::open_in_memory().unwrap();
        let order = Order::new(None);
        db.create_order(&order).unwrap();
        assert!(matches!(
            db.submit_order(&order.id),
            Err(OcrmergeError::Order(OrderError::NoItems(_)))
        ));
    }

    #[test]
    fn test_draft_only_operations_after_submit() {
        let db = Database::open_in_memory().unwrap();
        let (order, item) = draft_with_item(&db);
        let pending = db.submit_order(&order.id).unwrap();
        assert_eq!(pending, vec![item.id().to_string()]);

        let late = Item::new(&order.id, "acme", "invoice", "late");
        assert!(matches!(
            db.add_item(&late),
            Err(OcrmergeError::Order(OrderError::InvalidState { .. }))
        ));
        assert!(db.set_mapping_keys(&order.id, &["acct".to_string()]).is_err());
        assert!(db.set_mapping_file(&order.id, "mapping.xlsx").is_err());
        assert!(db.submit_order(&order.id).is_err());

        // Files may still be attached to open items while processing.
        let extra = FileRef::new(item.id(), FileRole::Attachment, "b.pdf", 1, "b");
        db.attach_file(&extra).unwrap();
        assert_eq!(db.get_item(item.id()).unwrap().unwrap().files().len(), 2);
    }

    #[test]
    fn test_begin_processing_once() {
        let db = Database::open_in_memory().unwrap();
        let (order, item) = draft_with_item(&db);
        db.submit_order(&order.id).unwrap();

        let first = db.begin_processing(item.id(), Utc::now()).unwrap();
        assert!(matches!(first, ProcessOutcome::Started(ref i) if i.status() == ItemStatus::Processing));
        assert_eq!(
            db.begin_processing(item.id(), Utc::now()).unwrap(),
            ProcessOutcome::Skipped
        );
    }

    #[test]
    fn test_set_item_status_bumps_counter_once() {
        let db = Database::open_in_memory().unwrap();
        let (order, item) = draft_with_item(&db);
        db.submit_order(&order.id).unwrap();
        let ProcessOutcome::Started(started) = db.begin_processing(item.id(), Utc::now()).unwrap()
        else {
            panic!("item should start");
        };

        let done = started.complete(Utc::now()).unwrap();
        let order = db.set_item_status(&done).unwrap();
        assert_eq!(order.completed_items, 1);

        assert!(db.set_item_status(&done).is_err());
        let order = db.get_order(&order.id).unwrap().unwrap();
        assert_eq!(order.completed_items, 1);

        let attach = FileRef::new(item.id(), FileRole::Attachment, "c.pdf", 1, "c");
        assert!(db.attach_file(&attach).is_err());
    }

    #[test]
    fn test_transition_order_rejects_illegal_edges() {
        let db = Database::open_in_memory().unwrap();
        let (order, _) = draft_with_item(&db);
        assert!(db
            .transition_order(&order.id, OrderStatus::Draft, OrderStatus::Completed)
            .is_err());
        assert!(!db
            .transition_order(&order.id, OrderStatus::Processing, OrderStatus::Mapping)
            .unwrap());
    }

    #[test]
    fn test_retry_between_read_and_rollup_keeps_order_open() {
        let db = Database::open_in_memory().unwrap();
        let (order, item) = draft_with_item(&db);
        db.submit_order(&order.id).unwrap();
        let ProcessOutcome::Started(started) = db.begin_processing(item.id(), Utc::now()).unwrap()
        else {
            panic!("item should start");
        };
        let failed = started.fail("unreadable", Utc::now()).unwrap();
        let snapshot = db.set_item_status(&failed).unwrap();
        assert!(snapshot.all_items_resolved());

        let retry = Item::retry_from(&failed).unwrap();
        db.retry_item(&retry).unwrap();

        assert!(!db.rollup_order(&snapshot, OrderStatus::Failed).unwrap());
        let order = db.get_order(&order.id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.failed_items, 0);

        // The retried attempt completes and its own rollup wins.
        let ProcessOutcome::Started(started) = db.begin_processing(retry.id(), Utc::now()).unwrap()
        else {
            panic!("retry should start");
        };
        let snapshot = db.set_item_status(&started.complete(Utc::now()).unwrap()).unwrap();
        assert!(db.rollup_order(&snapshot, OrderStatus::Completed).unwrap());
        assert!(!db.rollup_order(&snapshot, OrderStatus::Mapping).unwrap());
        assert!(db.rollup_order(&snapshot, OrderStatus::Draft).is_err());
    }

    #[test]
    fn test_save_mapping_template_validates() {
        let db = Database::open_in_memory().unwrap();
        let template = MappingTemplate {
            id: 0,
            name: "multi".to_string(),
            item_type: ItemType::MultiSource,
            company_id: None,
            document_type_id: None,
            priority: 1,
            config: Default::default(),
        };
        assert!(matches!(
            db.save_mapping_template(&template),
            Err(OcrmergeError::Config(ConfigError::InvalidTemplate { .. }))
        ));
    }
}
