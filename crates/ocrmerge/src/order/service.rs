//! Order workflow: uploads, extraction, rollup, merge and export.
//!
//! `OrderService` owns no state of its own. Every status change goes through
//! the gateway, which makes each write atomic; the service decides what to
//! write and in which order. Extraction runs with no lock held.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tracing::info_span;

use super::machine::{require_status, rollup_target, validate_mapping_keys, RollupFacts};
use super::model::{
    ExtractionOutcome, ExtractionResult, FileRef, FileRole, Item, ItemStatus, Order, OrderStatus,
};
use crate::broadcast::{OrderProgressBroadcaster, OrderProgressTracker, ProgressPhase};
use crate::error::{OrderError, Result};
use crate::extraction::{DocumentTypeConfig, ExtractionService};
use crate::gateway::{PersistenceGateway, ProcessOutcome, SetResult};
use crate::mapping::{list_headers_in, resolve, EffectiveConfig, ItemType, SheetHeaders};
use crate::merge::{merge, MatchOptions, MergedTable};
use crate::storage::BlobStore;
use crate::table::{read_csv_path, to_csv, NormalizeOptions, Normalizer, RowTable};

/// Blob directory for an order's uploads.
fn order_dir(order_id: &str) -> String {
    format!("orders/{}", order_id)
}

/// Normalized tables of one item: the primary table, then one table per
/// attachment in file order.
struct ItemTables {
    primary: RowTable,
    attachments: Vec<RowTable>,
}

pub struct OrderService {
    gateway: Arc<dyn PersistenceGateway>,
    extractor: Arc<dyn ExtractionService>,
    blobs: Arc<dyn BlobStore>,
    normalizer: Normalizer,
    matching: MatchOptions,
    progress: Option<OrderProgressBroadcaster>,
}

impl OrderService {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        extractor: Arc<dyn ExtractionService>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            gateway,
            extractor,
            blobs,
            normalizer: Normalizer::default(),
            matching: MatchOptions::default(),
            progress: None,
        }
    }

    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalizer = Normalizer::new(options);
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.matching = options;
        self
    }

    pub fn with_progress(mut self, progress: OrderProgressBroadcaster) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    fn tracker(&self, order_id: &str) -> Option<OrderProgressTracker> {
        self.progress.as_ref().map(|p| p.track(order_id))
    }

    // ---- Orders and items ----

    pub fn create_order(&self, name: Option<String>) -> Result<Order> {
        let order = Order::new(name);
        self.gateway.create_order(&order)?;
        info!("Created order {}", order.id);
        Ok(order)
    }

    pub fn get_order(&self, order_id: &str) -> Result<Order> {
        self.gateway
            .get_order(order_id)?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()).into())
    }

    pub fn get_item(&self, item_id: &str) -> Result<Item> {
        self.gateway
            .get_item(item_id)?
            .ok_or_else(|| OrderError::ItemNotFound(item_id.to_string()).into())
    }

    pub fn list_items(&self, order_id: &str) -> Result<Vec<Item>> {
        self.gateway.list_items(order_id)
    }

    pub fn add_item(
        &self,
        order_id: &str,
        company_id: &str,
        document_type_id: &str,
        name: &str,
    ) -> Result<Item> {
        let item = Item::new(order_id, company_id, document_type_id, name);
        self.gateway.add_item(&item)?;
        debug!("Added item {} to order {}", item.id(), order_id);
        Ok(item)
    }

    /// Stores the bytes and attaches the file to the item.
    pub fn upload_file(
        &self,
        item_id: &str,
        role: FileRole,
        filename: &str,
        bytes: &[u8],
    ) -> Result<FileRef> {
        let item = self.get_item(item_id)?;
        let order = self.get_order(item.order_id())?;
        require_status(
            &order,
            &[OrderStatus::Draft, OrderStatus::Processing],
            "attach_file",
        )?;
        if item.status().is_terminal() {
            return Err(OrderError::InvalidState {
                id: item.id().to_string(),
                status: item.status().to_string(),
                operation: "attach_file",
            }
            .into());
        }

        let directory = format!("{}/items/{}", order_dir(&order.id), item.id());
        let storage_ref = self.blobs.write(&directory, filename, bytes)?;
        let file = FileRef::new(item.id(), role, filename, bytes.len() as u64, storage_ref);
        self.gateway.attach_file(&file)?;
        Ok(file)
    }

    /// Attaches an already stored file.
    pub fn attach_file(&self, file: &FileRef) -> Result<()> {
        self.gateway.attach_file(file)
    }

    pub fn set_mapping_keys(&self, order_id: &str, keys: &[String]) -> Result<Vec<String>> {
        let keys = validate_mapping_keys(keys)?;
        self.gateway.set_mapping_keys(order_id, &keys)?;
        Ok(keys)
    }

    /// Stores a mapping spreadsheet on a DRAFT order and returns its headers.
    /// Unreadable files are rejected before anything is stored.
    pub fn upload_mapping_file(
        &self,
        order_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<SheetHeaders> {
        let order = self.get_order(order_id)?;
        require_status(&order, &[OrderStatus::Draft], "set_mapping_file")?;

        let headers = list_headers_in(filename, bytes)?;
        let storage_ref = self
            .blobs
            .write(&format!("{}/mapping", order_dir(order_id)), filename, bytes)?;
        self.gateway.set_mapping_file(order_id, &storage_ref)?;
        Ok(headers)
    }

    /// Headers of the order's mapping file, for key selection.
    pub fn mapping_file_headers(&self, order_id: &str) -> Result<Option<SheetHeaders>> {
        let order = self.get_order(order_id)?;
        let Some(storage_ref) = order.mapping_file else {
            return Ok(None);
        };
        let bytes = self.blobs.read(&storage_ref)?;
        let filename = storage_ref.rsplit('/').next().unwrap_or(&storage_ref);
        Ok(Some(list_headers_in(filename, &bytes)?))
    }

    // ---- Processing ----

    /// Moves the order to PROCESSING. Returns the ids of the items the caller
    /// must hand to [`OrderService::process_item`].
    pub fn submit(&self, order_id: &str) -> Result<Vec<String>> {
        let pending = self.gateway.submit_order(order_id)?;
        info!("Submitted order {} with {} items", order_id, pending.len());
        if let Some(tracker) = self.tracker(order_id) {
            let order = self.get_order(order_id)?;
            tracker.order_event(&order, ProgressPhase::Submitted, "Order submitted");
        }
        Ok(pending)
    }

    /// Extracts and resolves one item.
    ///
    /// Returns `None` when the item was not PENDING (already triggered).
    /// Extraction problems fail the item, not the call; `Err` is reserved for
    /// persistence failures around the status write.
    pub fn process_item(&self, item_id: &str) -> Result<Option<Item>> {
        let _span = info_span!("extraction", item_id = %item_id).entered();

        let started = match self.gateway.begin_processing(item_id, Utc::now())? {
            ProcessOutcome::Started(item) => item,
            ProcessOutcome::Skipped => {
                debug!("Item {} already triggered, skipping", item_id);
                return Ok(None);
            }
        };
        let order = self.get_order(started.order_id())?;
        let tracker = self.tracker(&order.id);
        if let Some(t) = &tracker {
            t.item_event(&order, item_id, ProgressPhase::ItemStarted, "Extracting item");
        }

        let outcome = {
            let _step = info_span!("extract_files").entered();
            self.extract_files(&started)
        }
        .and_then(|()| {
            let _step = info_span!("validate_results").entered();
            self.validate_results(&started, order.mapping_keys.as_deref())
        });

        let resolved = match outcome {
            Ok(()) => started.complete(Utc::now())?,
            Err(reason) => {
                warn!("Item {} failed: {}", item_id, reason);
                started.fail(reason, Utc::now())?
            }
        };
        let order = self.gateway.set_item_status(&resolved)?;

        if let Some(t) = &tracker {
            match resolved.error_message() {
                Some(error) => t.item_failed(&order, item_id, error),
                None => t.item_event(&order, item_id, ProgressPhase::ItemCompleted, "Item completed"),
            }
        }

        if order.all_items_resolved() {
            self.rollup(&order.id)?;
        }
        Ok(Some(resolved))
    }

    /// Reads and extracts every file of the item, storing one result per
    /// file. Stops at the first failure.
    fn extract_files(&self, item: &Item) -> std::result::Result<(), String> {
        if item.primary_file().is_none() {
            return Err("item has no primary file".to_string());
        }

        for file in item.files() {
            let result = match self.blobs.read(&file.storage_ref) {
                Ok(bytes) => {
                    let config = DocumentTypeConfig::for_file(item, file);
                    match self.extractor.extract(&bytes, &config) {
                        Ok(raw) => ExtractionResult::payload(file, raw),
                        Err(e) => ExtractionResult::failed(file, e.message),
                    }
                }
                Err(e) => ExtractionResult::failed(file, e.to_string()),
            };

            match self.gateway.set_item_result(&result) {
                Ok(SetResult::Stored) => {}
                Ok(SetResult::AlreadySet) => {
                    debug!("Result for file {} already stored", file.id);
                }
                Err(e) => return Err(format!("failed to store result for {}: {}", file.filename, e)),
            }

            if let ExtractionOutcome::Failed { error } = &result.outcome {
                return Err(format!("{}: {}", file.filename, error));
            }
        }
        Ok(())
    }

    /// Normalizes the stored results and checks the order's join keys
    /// against the primary headers.
    fn validate_results(
        &self,
        item: &Item,
        mapping_keys: Option<&[String]>,
    ) -> std::result::Result<(), String> {
        let tables = self.load_tables(item).map_err(|e| e.to_string())?;

        if let Some(keys) = mapping_keys {
            let missing: Vec<&str> = keys
                .iter()
                .map(String::as_str)
                .filter(|k| !tables.primary.has_header(k))
                .collect();
            if !missing.is_empty() {
                return Err(format!(
                    "mapping key(s) {} not found in primary extraction headers [{}]",
                    missing.join(", "),
                    tables.primary.headers().join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Builds the item's tables from its stored results.
    fn load_tables(&self, item: &Item) -> Result<ItemTables> {
        let results = self.gateway.get_item_results(item.id())?;
        let mut primary = None;
        let mut attachments = Vec::new();

        for file in item.files() {
            let Some(result) = results.iter().find(|r| r.file_id == file.id) else {
                return Err(OrderError::InvalidState {
                    id: item.id().to_string(),
                    status: format!("missing result for {}", file.filename),
                    operation: "load_tables",
                }
                .into());
            };
            let table = match &result.outcome {
                ExtractionOutcome::Payload { raw } => self.normalizer.normalize_payload(raw)?,
                ExtractionOutcome::Failed { error } => {
                    return Err(OrderError::InvalidState {
                        id: item.id().to_string(),
                        status: format!("extraction failed for {}: {}", file.filename, error),
                        operation: "load_tables",
                    }
                    .into());
                }
            };
            match file.role {
                FileRole::Primary if primary.is_none() => primary = Some(table),
                _ => attachments.push(table),
            }
        }

        Ok(ItemTables {
            primary: primary.unwrap_or_default(),
            attachments,
        })
    }

    /// Rolls a fully resolved PROCESSING order up to MAPPING, COMPLETED or
    /// FAILED. Returns the new status when this caller won the transition.
    pub fn rollup(&self, order_id: &str) -> Result<Option<OrderStatus>> {
        let order = self.get_order(order_id)?;
        if order.status != OrderStatus::Processing || !order.all_items_resolved() {
            return Ok(None);
        }

        let items = self.gateway.list_items(order_id)?;
        let completed: Vec<&Item> = items
            .iter()
            .filter(|i| i.status() == ItemStatus::Completed)
            .collect();

        let mut mapping_resolvable = order.mapping_keys.is_some();
        if !mapping_resolvable {
            for item in &completed {
                let item_type = ItemType::for_attachment_count(item.attachment_count());
                if resolve(
                    self.gateway.as_ref(),
                    item.company_id(),
                    item.document_type_id(),
                    item_type,
                )?
                .is_some()
                {
                    mapping_resolvable = true;
                    break;
                }
            }
        }

        let facts = RollupFacts {
            mapping_resolvable,
            has_mergeable_files: completed.iter().any(|i| i.primary_file().is_some())
                && completed.iter().any(|i| i.attachment_count() > 0),
            ..RollupFacts::for_order(&order)
        };
        let Some(target) = rollup_target(&facts) else {
            return Ok(None);
        };

        if !self.gateway.rollup_order(&order, target)? {
            debug!("Order {} rollup lost the race", order_id);
            return Ok(None);
        }
        info!("Order {} rolled up to {}", order_id, target);

        if let Some(tracker) = self.tracker(order_id) {
            let order = self.get_order(order_id)?;
            tracker.order_event(&order, ProgressPhase::StatusChanged, &format!("Order is {}", target));
        }
        Ok(Some(target))
    }

    /// Queues a new attempt for a failed item and returns it. The caller
    /// triggers [`OrderService::process_item`] for the returned id.
    pub fn retry_item(&self, failed_item_id: &str) -> Result<Item> {
        let failed = self.get_item(failed_item_id)?;
        let retry = Item::retry_from(&failed)?;
        let order = self.gateway.retry_item(&retry)?;
        info!("Item {} retried as {}", failed_item_id, retry.id());

        if let Some(tracker) = self.tracker(&order.id) {
            tracker.item_event(&order, retry.id(), ProgressPhase::ItemRetried, "Item queued for retry");
        }
        Ok(retry)
    }

    // ---- Merge and export ----

    /// Merges every completed item of the order and stores the result.
    ///
    /// Allowed in MAPPING, or in COMPLETED once a merged table exists. On
    /// failure the error is recorded on the order and its status is left
    /// alone.
    pub fn run_merge(&self, order_id: &str) -> Result<MergedTable> {
        let _span = info_span!("merge", order_id = %order_id).entered();

        let order = self.get_order(order_id)?;
        let rerun = order.status == OrderStatus::Completed
            && self.gateway.get_merged_table(order_id)?.is_some();
        if !rerun {
            require_status(&order, &[OrderStatus::Mapping], "merge")?;
        }

        let tracker = self.tracker(order_id);
        match self.build_merged_table(&order) {
            Ok(table) => {
                self.gateway.save_merged_table(order_id, &table)?;
                self.gateway.set_order_error(order_id, None)?;
                if order.status == OrderStatus::Mapping {
                    self.gateway
                        .transition_order(order_id, OrderStatus::Mapping, OrderStatus::Completed)?;
                }
                info!(
                    "Merged order {}: {} rows ({:?})",
                    order_id,
                    table.len(),
                    table.provenance_summary()
                );
                if let Some(t) = &tracker {
                    let order = self.get_order(order_id)?;
                    t.order_event(&order, ProgressPhase::MergeCompleted, "Merge completed");
                }
                Ok(table)
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Merge of order {} failed: {}", order_id, message);
                self.gateway.set_order_error(order_id, Some(&message))?;
                if let Some(t) = &tracker {
                    t.merge_failed(&order, &message);
                }
                Err(e)
            }
        }
    }

    fn build_merged_table(&self, order: &Order) -> Result<MergedTable> {
        let items = self.gateway.list_items(&order.id)?;
        let mut parts = Vec::new();

        for item in items.iter().filter(|i| i.status() == ItemStatus::Completed) {
            let config = self.join_plan(order, item)?;
            let mut tables = self.load_tables(item)?;
            if let Some(path) = &config.master_csv_path {
                tables.attachments.push(read_csv_path(Path::new(path))?);
            }
            parts.push(merge(
                &tables.primary,
                &tables.attachments,
                &config,
                &self.matching,
            )?);
        }

        Ok(MergedTable::concat(parts))
    }

    /// Resolved configuration for an item with the order's keys on top.
    fn join_plan(&self, order: &Order, item: &Item) -> Result<EffectiveConfig> {
        let item_type = ItemType::for_attachment_count(item.attachment_count());
        let resolved = resolve(
            self.gateway.as_ref(),
            item.company_id(),
            item.document_type_id(),
            item_type,
        )?;
        match (resolved, order.mapping_keys.as_deref()) {
            (Some(config), Some(keys)) => Ok(config.with_order_keys(keys)),
            (Some(config), None) => Ok(config),
            (None, Some(keys)) => Ok(EffectiveConfig::from_keys(item_type, keys)),
            (None, None) => Err(OrderError::MappingConfigNotFound {
                item_id: item.id().to_string(),
                company_id: item.company_id().to_string(),
                document_type_id: item.document_type_id().to_string(),
            }
            .into()),
        }
    }

    pub fn merged_table(&self, order_id: &str) -> Result<MergedTable> {
        self.gateway
            .get_merged_table(order_id)?
            .ok_or_else(|| OrderError::NoMergedTable(order_id.to_string()).into())
    }

    /// Writes the merged table as CSV and records the report on the order.
    /// Returns the report's storage reference.
    pub fn export_report(&self, order_id: &str) -> Result<String> {
        let order = self.get_order(order_id)?;
        let table = self.merged_table(order_id)?;

        let csv = to_csv(table.as_table())?;
        let storage_ref = self.blobs.write(
            &format!("reports/{}", order_id),
            "merged.csv",
            csv.as_bytes(),
        )?;

        let mut paths = order.report_paths.clone();
        paths.push(storage_ref.clone());
        self.gateway.set_report_paths(order_id, &paths)?;
        info!("Exported report {} for order {}", storage_ref, order_id);

        if let Some(tracker) = self.tracker(order_id) {
            tracker.order_event(&order, ProgressPhase::ReportExported, &storage_ref);
        }
        Ok(storage_ref)
    }
}
