use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrmergeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Mapping file error: {0}")]
    MappingFile(#[from] MappingFileError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid mapping template '{name}': {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("Invalid mapping default for {company_id}/{document_type_id}: {reason}")]
    InvalidDefault {
        company_id: String,
        document_type_id: String,
        reason: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Malformed extraction result: {0}")]
    MalformedResult(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("No external join keys configured")]
    NoJoinKeysConfigured,

    #[error("Multi-source merge requires an internal join key")]
    NoInternalJoinKey,
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid item transition for {id}: {from} -> {to}")]
    InvalidItemTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Invalid order transition for {id}: {from} -> {to}")]
    InvalidOrderTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Operation '{operation}' not allowed while order {id} is {status}")]
    InvalidState {
        id: String,
        status: String,
        operation: &'static str,
    },

    #[error("Order {0} has no items to submit")]
    NoItems(String),

    #[error("Invalid mapping keys: {0}")]
    InvalidMappingKeys(String),

    #[error("No mapping configuration found for item {item_id} ({company_id}/{document_type_id})")]
    MappingConfigNotFound {
        item_id: String,
        company_id: String,
        document_type_id: String,
    },

    #[error("No merged table stored for order {0}")]
    NoMergedTable(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage reference escapes the storage root: {0}")]
    InvalidReference(String),

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum MappingFileError {
    #[error("Unsupported mapping file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read mapping file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV mapping file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to process XLSX mapping file: {0}")]
    Xlsx(String),
}

/// Failure reported by the OCR collaborator. The message is stored on the
/// item verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, OcrmergeError>;
