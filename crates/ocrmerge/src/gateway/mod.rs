//! Persistence contract for orders, items, results and mapping data.
//!
//! Every operation that changes an item's status together with its order's
//! counters must be a single transaction. Compare-and-set operations report
//! whether they won instead of failing.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::mapping::{MappingDefault, MappingSource, MappingTemplate};
use crate::merge::MergedTable;
use crate::order::{ExtractionResult, FileRef, Item, Order, OrderStatus};

/// Signal from set-once writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    Stored,
    /// A value was already present; nothing was written.
    AlreadySet,
}

/// Result of asking to start an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The item moved PENDING → PROCESSING; this caller owns the extraction.
    Started(Item),
    /// The item was not PENDING; another trigger already ran it.
    Skipped,
}

pub trait PersistenceGateway: MappingSource + Send + Sync {
    fn create_order(&self, order: &Order) -> Result<()>;

    fn get_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Inserts a PENDING item (with its files) into a DRAFT order and bumps
    /// `total_items`.
    fn add_item(&self, item: &Item) -> Result<()>;

    fn get_item(&self, item_id: &str) -> Result<Option<Item>>;

    /// Items of an order in creation order, files included.
    fn list_items(&self, order_id: &str) -> Result<Vec<Item>>;

    /// Attaches a file to a non-terminal item of a DRAFT or PROCESSING order.
    fn attach_file(&self, file: &FileRef) -> Result<()>;

    /// Stores already-validated join keys on a DRAFT order.
    fn set_mapping_keys(&self, order_id: &str, keys: &[String]) -> Result<()>;

    fn set_mapping_file(&self, order_id: &str, storage_ref: &str) -> Result<()>;

    /// DRAFT → PROCESSING. Returns the ids of PENDING items to extract.
    fn submit_order(&self, order_id: &str) -> Result<Vec<String>>;

    /// Compare-and-set PENDING → PROCESSING for one item.
    fn begin_processing(&self, item_id: &str, at: DateTime<Utc>) -> Result<ProcessOutcome>;

    /// Stores a file's extraction result unless one already exists.
    fn set_item_result(&self, result: &ExtractionResult) -> Result<SetResult>;

    fn get_item_results(&self, item_id: &str) -> Result<Vec<ExtractionResult>>;

    /// Writes a resolved item (COMPLETED or FAILED, from PROCESSING) and
    /// bumps the matching order counter in the same transaction. Returns the
    /// updated order.
    fn set_item_status(&self, item: &Item) -> Result<Order>;

    /// Compare-and-set on the order status. `Ok(false)` when the order was no
    /// longer in `from`.
    fn transition_order(&self, order_id: &str, from: OrderStatus, to: OrderStatus)
        -> Result<bool>;

    /// Rolls a PROCESSING order up to `to`. Only succeeds while the stored
    /// counters equal `snapshot`'s and every item is resolved, so a retry or
    /// resolution landing after the snapshot was read makes this return
    /// `Ok(false)`.
    fn rollup_order(&self, snapshot: &Order, to: OrderStatus) -> Result<bool>;

    fn set_order_error(&self, order_id: &str, message: Option<&str>) -> Result<()>;

    /// Inserts a retry attempt for a failed item and releases the failed
    /// attempt's counter slot. Reopens a FAILED order.
    fn retry_item(&self, retry: &Item) -> Result<Order>;

    /// Stores the merged table, replacing any previous one.
    fn save_merged_table(&self, order_id: &str, table: &MergedTable) -> Result<()>;

    fn get_merged_table(&self, order_id: &str) -> Result<Option<MergedTable>>;

    fn set_report_paths(&self, order_id: &str, paths: &[String]) -> Result<()>;

    /// Validates and upserts a template by name. Returns its id.
    fn save_mapping_template(&self, template: &MappingTemplate) -> Result<i64>;

    /// Upserts the default for its (company, document type, item type).
    fn save_mapping_default(&self, default: &MappingDefault) -> Result<()>;
}
