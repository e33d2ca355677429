//! Test harness for isolated order runs.
//!
//! The `TestHarness` struct wires a complete service:
//! - an in-memory SQLite database shared through clones
//! - a `FileStorage` blob store rooted in a temp directory
//! - the passthrough extractor (or a caller-supplied one)

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use ocrmerge::extraction::{ExtractionService, PassthroughExtractor};
use ocrmerge::mapping::MappingTemplate;
use ocrmerge::order::{FileRole, Item, Order, OrderService};
use ocrmerge::storage::FileStorage;
use ocrmerge::{Database, PersistenceGateway};

/// Test harness providing an isolated execution environment.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Shared database handle; clones see the same data.
    pub db: Database,
    pub service: Arc<OrderService>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_extractor(Arc::new(PassthroughExtractor))
    }

    pub fn with_extractor(extractor: Arc<dyn ExtractionService>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_in_memory().expect("Failed to open database");
        let blobs = FileStorage::new(temp_dir.path().join("blobs"));
        let service = OrderService::new(Arc::new(db.clone()), extractor, Arc::new(blobs));

        Self {
            temp_dir,
            db,
            service: Arc::new(service),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file outside the blob store, e.g. a master CSV.
    pub fn write_file(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn save_template(&self, template: &MappingTemplate) -> i64 {
        self.db
            .save_mapping_template(template)
            .expect("Failed to save template")
    }

    pub fn new_order(&self) -> Order {
        self.service
            .create_order(Some("test order".to_string()))
            .expect("Failed to create order")
    }

    /// Adds an `acme/invoice` item with a JSON primary and JSON attachments.
    pub fn add_item(&self, order: &Order, primary: &str, attachments: &[&str]) -> Item {
        self.add_item_for(order, "acme", "invoice", primary, attachments)
    }

    pub fn add_item_for(
        &self,
        order: &Order,
        company_id: &str,
        document_type_id: &str,
        primary: &str,
        attachments: &[&str],
    ) -> Item {
        let item = self
            .service
            .add_item(&order.id, company_id, document_type_id, "item")
            .expect("Failed to add item");
        self.service
            .upload_file(item.id(), FileRole::Primary, "primary.json", primary.as_bytes())
            .expect("Failed to upload primary");
        for (i, body) in attachments.iter().enumerate() {
            self.service
                .upload_file(
                    item.id(),
                    FileRole::Attachment,
                    &format!("attachment-{}.json", i),
                    body.as_bytes(),
                )
                .expect("Failed to upload attachment");
        }
        self.service.get_item(item.id()).expect("Failed to reload item")
    }

    /// Submits the order and processes every pending item on this thread.
    pub fn submit_and_process(&self, order: &Order) -> Order {
        let pending = self.service.submit(&order.id).expect("Failed to submit");
        for item_id in &pending {
            self.service
                .process_item(item_id)
                .expect("Failed to process item");
        }
        self.reload(order)
    }

    pub fn reload(&self, order: &Order) -> Order {
        self.service.get_order(&order.id).expect("Failed to reload order")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
