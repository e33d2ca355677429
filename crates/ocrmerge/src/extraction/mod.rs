//! The OCR collaborator seam.
//!
//! Vendor calls live behind [`ExtractionService`]. The crate ships
//! [`PassthroughExtractor`] for files that already carry structured data
//! (JSON payloads, CSV exports), which need no OCR.

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::order::{FileRef, FileRole, Item};
use crate::table::read_csv;

/// What the extractor is told about the document it is reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeConfig {
    pub company_id: String,
    pub document_type_id: String,
    pub role: FileRole,
    pub mime_type: Option<String>,
}

impl DocumentTypeConfig {
    pub fn for_file(item: &Item, file: &FileRef) -> Self {
        Self {
            company_id: item.company_id().to_string(),
            document_type_id: item.document_type_id().to_string(),
            role: file.role,
            mime_type: file.mime_type.clone(),
        }
    }
}

/// Turns document bytes into a raw JSON payload.
///
/// Called with no lock held; implementations may block for as long as the
/// vendor takes.
pub trait ExtractionService: Send + Sync {
    fn extract(&self, bytes: &[u8], config: &DocumentTypeConfig) -> Result<String, ExtractionError>;
}

/// Reads JSON files as-is and converts CSV files into a JSON array of row
/// objects. Everything else is reported as unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

impl PassthroughExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(&self, mime_type: Option<&str>) -> bool {
        matches!(
            mime_type,
            Some("application/json") | Some("text/csv") | Some("text/plain")
        )
    }
}

impl ExtractionService for PassthroughExtractor {
    fn extract(&self, bytes: &[u8], config: &DocumentTypeConfig) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::new(format!("document is not valid UTF-8: {}", e)))?;

        match config.mime_type.as_deref() {
            Some("text/csv") => csv_to_json(text),
            Some("application/json") | Some("text/plain") => Ok(text.to_string()),
            other => Err(ExtractionError::new(format!(
                "no local extractor for {}",
                other.unwrap_or("unknown content type")
            ))),
        }
    }
}

/// Renders CSV rows as a JSON array, keys in header order.
fn csv_to_json(text: &str) -> Result<String, ExtractionError> {
    let table = read_csv(text.as_bytes())
        .map_err(|e| ExtractionError::new(format!("invalid CSV document: {}", e)))?;

    let mut out = String::from("[");
    for (i, row) in table.rows().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('{');
        for (j, header) in table.headers().iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            let value = row.get(header).map(String::as_str).unwrap_or("");
            let key = serde_json::to_string(header)
                .map_err(|e| ExtractionError::new(e.to_string()))?;
            let value = serde_json::to_string(value)
                .map_err(|e| ExtractionError::new(e.to_string()))?;
            out.push_str(&key);
            out.push(':');
            out.push_str(&value);
        }
        out.push('}');
    }
    out.push(']');
    Ok(out)
}
