//! Orders, items, file references and extraction results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Processing,
    /// All items resolved; waiting for a merge request.
    Mapping,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Mapping => "MAPPING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(OrderStatus::Draft),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "MAPPING" => Ok(OrderStatus::Mapping),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "FAILED" => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Processing => "PROCESSING",
            ItemStatus::Completed => "COMPLETED",
            ItemStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ItemStatus::Pending),
            "PROCESSING" => Ok(ItemStatus::Processing),
            "COMPLETED" => Ok(ItemStatus::Completed),
            "FAILED" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown item status '{}'", other)),
        }
    }
}

/// Role of a file inside its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    /// The document whose rows drive the merge.
    Primary,
    Attachment,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Primary => "primary",
            FileRole::Attachment => "attachment",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(FileRole::Primary),
            "attachment" => Ok(FileRole::Attachment),
            other => Err(format!("unknown file role '{}'", other)),
        }
    }
}

/// An uploaded file belonging to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: String,
    pub item_id: String,
    pub role: FileRole,
    pub filename: String,
    pub byte_len: u64,
    /// Blob store reference for the file bytes.
    pub storage_ref: String,
    pub mime_type: Option<String>,
}

impl FileRef {
    pub fn new(
        item_id: &str,
        role: FileRole,
        filename: impl Into<String>,
        byte_len: u64,
        storage_ref: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            role,
            filename,
            byte_len,
            storage_ref: storage_ref.into(),
            mime_type,
        }
    }

    /// Copies the reference onto another item under a fresh id.
    fn repointed(&self, item_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub name: Option<String>,
    pub status: OrderStatus,
    pub total_items: u32,
    pub completed_items: u32,
    pub failed_items: u32,
    /// Blob store reference of the uploaded mapping spreadsheet.
    pub mapping_file: Option<String>,
    /// User-selected join keys in priority order.
    pub mapping_keys: Option<Vec<String>>,
    pub report_paths: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            status: OrderStatus::Draft,
            total_items: 0,
            completed_items: 0,
            failed_items: 0,
            mapping_file: None,
            mapping_keys: None,
            report_paths: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Items that have reached a terminal state.
    pub fn resolved_items(&self) -> u32 {
        self.completed_items + self.failed_items
    }

    /// True once every counted item has resolved.
    pub fn all_items_resolved(&self) -> bool {
        self.total_items > 0 && self.resolved_items() == self.total_items
    }
}

/// Raw field values used to rebuild an [`Item`] from storage.
#[derive(Debug, Clone)]
pub struct ItemParts {
    pub id: String,
    pub order_id: String,
    pub company_id: String,
    pub document_type_id: String,
    pub name: String,
    pub status: ItemStatus,
    pub files: Vec<FileRef>,
    pub retry_of: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One primary document plus its attachments.
///
/// Items have no setters. Every state change returns a new value and refuses
/// to run once the item is terminal, so history is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    id: String,
    order_id: String,
    company_id: String,
    document_type_id: String,
    name: String,
    status: ItemStatus,
    files: Vec<FileRef>,
    retry_of: Option<String>,
    processing_started_at: Option<DateTime<Utc>>,
    processing_ended_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(
        order_id: &str,
        company_id: impl Into<String>,
        document_type_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            company_id: company_id.into(),
            document_type_id: document_type_id.into(),
            name: name.into(),
            status: ItemStatus::Pending,
            files: Vec::new(),
            retry_of: None,
            processing_started_at: None,
            processing_ended_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn from_parts(parts: ItemParts) -> Self {
        Self {
            id: parts.id,
            order_id: parts.order_id,
            company_id: parts.company_id,
            document_type_id: parts.document_type_id,
            name: parts.name,
            status: parts.status,
            files: parts.files,
            retry_of: parts.retry_of,
            processing_started_at: parts.processing_started_at,
            processing_ended_at: parts.processing_ended_at,
            error_message: parts.error_message,
            created_at: parts.created_at,
        }
    }

    /// Creates the next attempt for a failed item: new id, PENDING, same
    /// files. The failed item itself is left untouched.
    pub fn retry_from(failed: &Item) -> Result<Item, OrderError> {
        if failed.status != ItemStatus::Failed {
            return Err(failed.transition_error(ItemStatus::Pending));
        }
        let mut next = Item::new(
            &failed.order_id,
            failed.company_id.clone(),
            failed.document_type_id.clone(),
            failed.name.clone(),
        );
        next.files = failed.files.iter().map(|f| f.repointed(&next.id)).collect();
        next.retry_of = Some(failed.id.clone());
        Ok(next)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn document_type_id(&self) -> &str {
        &self.document_type_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    pub fn retry_of(&self) -> Option<&str> {
        self.retry_of.as_deref()
    }

    pub fn processing_started_at(&self) -> Option<DateTime<Utc>> {
        self.processing_started_at
    }

    pub fn processing_ended_at(&self) -> Option<DateTime<Utc>> {
        self.processing_ended_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wall time between start and end of processing, once both are known.
    pub fn processing_duration(&self) -> Option<Duration> {
        match (self.processing_started_at, self.processing_ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn primary_file(&self) -> Option<&FileRef> {
        self.files.iter().find(|f| f.role == FileRole::Primary)
    }

    pub fn attachments(&self) -> impl Iterator<Item = &FileRef> {
        self.files.iter().filter(|f| f.role == FileRole::Attachment)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments().count()
    }

    /// Adds a file. Only allowed while the item is not terminal.
    pub fn with_file(&self, file: FileRef) -> Result<Item, OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::InvalidState {
                id: self.id.clone(),
                status: self.status.to_string(),
                operation: "attach_file",
            });
        }
        let mut next = self.clone();
        next.files.push(FileRef {
            item_id: self.id.clone(),
            ..file
        });
        Ok(next)
    }

    /// PENDING → PROCESSING.
    pub fn start(&self, at: DateTime<Utc>) -> Result<Item, OrderError> {
        if self.status != ItemStatus::Pending {
            return Err(self.transition_error(ItemStatus::Processing));
        }
        Ok(Item {
            status: ItemStatus::Processing,
            processing_started_at: Some(at),
            ..self.clone()
        })
    }

    /// PROCESSING → COMPLETED.
    pub fn complete(&self, at: DateTime<Utc>) -> Result<Item, OrderError> {
        if self.status != ItemStatus::Processing {
            return Err(self.transition_error(ItemStatus::Completed));
        }
        Ok(Item {
            status: ItemStatus::Completed,
            processing_ended_at: Some(at),
            ..self.clone()
        })
    }

    /// PROCESSING → FAILED with a human-readable reason.
    pub fn fail(&self, message: impl Into<String>, at: DateTime<Utc>) -> Result<Item, OrderError> {
        if self.status != ItemStatus::Processing {
            return Err(self.transition_error(ItemStatus::Failed));
        }
        Ok(Item {
            status: ItemStatus::Failed,
            processing_ended_at: Some(at),
            error_message: Some(message.into()),
            ..self.clone()
        })
    }

    fn transition_error(&self, to: ItemStatus) -> OrderError {
        OrderError::InvalidItemTransition {
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// Outcome of one extraction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExtractionOutcome {
    /// Raw payload text returned by the OCR service.
    Payload { raw: String },
    /// Error message surfaced by the OCR service, verbatim.
    Failed { error: String },
}

/// Extraction result for one file. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub file_id: String,
    pub item_id: String,
    pub outcome: ExtractionOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn payload(file: &FileRef, raw: String) -> Self {
        Self {
            file_id: file.id.clone(),
            item_id: file.item_id.clone(),
            outcome: ExtractionOutcome::Payload { raw },
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(file: &FileRef, error: String) -> Self {
        Self {
            file_id: file.id.clone(),
            item_id: file.item_id.clone(),
            outcome: ExtractionOutcome::Failed { error },
            recorded_at: Utc::now(),
        }
    }
}
