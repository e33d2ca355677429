pub mod filesystem;

pub use filesystem::FileStorage;

use crate::error::StorageError;

/// Byte storage for uploaded files, mapping spreadsheets and exported
/// reports. References are opaque strings handed back by `write`.
pub trait BlobStore: Send + Sync {
    fn read(&self, storage_ref: &str) -> Result<Vec<u8>, StorageError>;

    /// Stores `bytes` under `directory/filename` without overwriting. Returns
    /// the reference of the stored blob, which may carry a numeric suffix.
    fn write(&self, directory: &str, filename: &str, bytes: &[u8]) -> Result<String, StorageError>;
}
