// rust/ingest-core/src/storage/traits.rs

//! Read-side storage traits.
//!
//! Ingestion only ever reads: sources open objects, stat them and walk
//! directories. Backends implement these traits so the binary-stream
//! adapter and the image-tree walker stay independent of where bytes live.

use std::io::{Read, Seek};
use std::path::Path;

use crate::error::Result;

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size of the object in bytes.
    pub size: u64,
    /// Whether this object is a directory.
    pub is_dir: bool,
}

/// A handle for reading from storage.
pub trait StorageReader: Read + Seek + Send {
    /// Returns the total size of the object in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `length` bytes starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the range runs past the end.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;
}

/// A read-only storage backend.
///
/// This trait is object-safe and is normally used as `Arc<dyn StorageBackend>`.
pub trait StorageBackend: Send + Sync {
    /// Retrieves metadata for an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or metadata cannot be read.
    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    /// Opens an object for reading.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Lists the entry names directly under `prefix`, sorted.
    ///
    /// A missing prefix lists as empty.
    fn list(&self, prefix: &Path) -> Result<Vec<String>>;
}
