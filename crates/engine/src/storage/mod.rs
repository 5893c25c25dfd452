mod atomic_io;

use std::cell::{Cell, RefCell};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read blob at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write blob at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw transport for a single persisted text blob. Implementations know
/// nothing about the blob's structure.
pub trait BlobStorage {
    /// `Ok(None)` means nothing has been stored yet.
    fn read(&self) -> Result<Option<String>, StorageError>;

    fn write(&self, blob: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct FileBlobStorage {
    path: PathBuf,
}

impl FileBlobStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobStorage for FileBlobStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, blob: &str) -> Result<(), StorageError> {
        atomic_io::write_text_atomic(&self.path, blob).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-memory blob, mainly for tests. Writes can be forced to fail to
/// exercise quota-style errors.
#[derive(Debug, Default)]
pub struct MemoryBlobStorage {
    blob: RefCell<Option<String>>,
    fail_writes: Cell<bool>,
    write_count: Cell<u32>,
}

impl MemoryBlobStorage {
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: RefCell::new(Some(blob.into())),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.borrow().clone()
    }

    pub fn write_count(&self) -> u32 {
        self.write_count.get()
    }
}

impl BlobStorage for MemoryBlobStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.blob.borrow().clone())
    }

    fn write(&self, blob: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        *self.blob.borrow_mut() = Some(blob.to_string());
        self.write_count.set(self.write_count.get() + 1);
        Ok(())
    }
}

impl<T: BlobStorage + ?Sized> BlobStorage for &T {
    fn read(&self) -> Result<Option<String>, StorageError> {
        (**self).read()
    }

    fn write(&self, blob: &str) -> Result<(), StorageError> {
        (**self).write(blob)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_reads_as_none() {
        let temp = TempDir::new().expect("temp");
        let storage = FileBlobStorage::new(temp.path().join("absent.json"));
        assert!(storage.read().expect("read").is_none());
    }

    #[test]
    fn file_write_creates_parent_and_replaces_contents() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("saves").join("progress.json");
        let storage = FileBlobStorage::new(&path);
        storage.write("first").expect("write first");
        storage.write("second").expect("write second");
        assert_eq!(storage.read().expect("read").as_deref(), Some("second"));
        assert!(!path.with_file_name("progress.json.tmp").exists());
    }

    #[test]
    fn memory_storage_can_fail_writes() {
        let storage = MemoryBlobStorage::with_blob("kept");
        storage.set_fail_writes(true);
        assert!(storage.write("lost").is_err());
        assert_eq!(storage.blob().as_deref(), Some("kept"));
        assert_eq!(storage.write_count(), 0);
    }
}
