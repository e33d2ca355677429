use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::BlobStore;
use crate::error::StorageError;

/// Upper bound on `_N` suffixes tried before giving up on a name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A `BlobStore` over a root directory. References are `/`-separated paths
/// relative to the root.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a reference to a path under the root. Absolute references and
    /// `..` components are rejected.
    pub fn resolve(&self, storage_ref: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(storage_ref);
        if storage_ref.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidReference(storage_ref.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Creates the file with `create_new`, moving to `name_2.ext`,
    /// `name_3.ext`, ... while the name is taken.
    fn create_exclusive(&self, dir_path: &Path, filename: &str, content: &[u8]) -> Result<String, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=MAX_NAME_ATTEMPTS {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content).map_err(|e| StorageError::WriteFile {
                        path: try_path.clone(),
                        source: e,
                    })?;
                    return Ok(try_filename);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }
}

impl BlobStore for FileStorage {
    fn read(&self, storage_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(storage_ref)?;
        std::fs::read(&path).map_err(|e| StorageError::ReadFile { path, source: e })
    }

    fn write(&self, directory: &str, filename: &str, bytes: &[u8]) -> Result<String, StorageError> {
        // The filename must be a single component; the directory may nest.
        if matches!(filename, "" | "." | "..") || filename.contains(['/', '\\']) {
            return Err(StorageError::InvalidReference(filename.to_string()));
        }
        let directory = directory.trim_matches('/');
        let dir_path = if directory.is_empty() {
            self.root.clone()
        } else {
            self.resolve(directory)?
        };
        self.ensure_directory(&dir_path)?;

        let stored = self.create_exclusive(&dir_path, filename, bytes)?;
        log::debug!("Stored {} bytes as {}/{}", bytes.len(), directory, stored);

        Ok(if directory.is_empty() {
            stored
        } else {
            format!("{}/{}", directory, stored)
        })
    }
}
