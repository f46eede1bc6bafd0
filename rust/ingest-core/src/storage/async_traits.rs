// rust/ingest-core/src/storage/async_traits.rs

//! Async read-side storage traits.
//!
//! The line producer of the concurrent decoder awaits on these while tasks
//! run, so reading the next line never blocks a runtime worker.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

/// An async handle for reading from storage.
pub trait AsyncStorageReader: AsyncRead + Send + Sync + Unpin {
    /// Returns the total size of the object in bytes.
    fn size(&self) -> u64;
}

/// An async, read-only storage backend.
#[async_trait]
pub trait AsyncStorageBackend: Send + Sync {
    /// Opens an object for streaming reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be opened.
    async fn open_read(&self, path: &Path) -> Result<Box<dyn AsyncStorageReader>>;
}
