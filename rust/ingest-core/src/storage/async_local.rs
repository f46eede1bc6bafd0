// rust/ingest-core/src/storage/async_local.rs

//! Async local filesystem storage backend implementation.
//!
//! This module provides an async storage backend that uses the local
//! filesystem via tokio's async filesystem operations.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader, ReadBuf};
use tracing::debug;

use super::async_traits::{AsyncStorageBackend, AsyncStorageReader};
use crate::config::StorageConfig;
use crate::error::{IngestError, Result};

/// Async local filesystem storage backend.
pub struct AsyncLocalStorage {
    /// Base path relative paths are resolved against.
    base_path: PathBuf,
    /// Buffer size for buffered I/O operations.
    buffer_size: usize,
}

impl AsyncLocalStorage {
    /// Creates a new `AsyncLocalStorage` instance from configuration.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            buffer_size: config.buffer_size,
        }
    }

    /// Resolves a path relative to the base path.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl AsyncStorageBackend for AsyncLocalStorage {
    async fn open_read(&self, path: &Path) -> Result<Box<dyn AsyncStorageReader>> {
        let full_path = self.resolve_path(path);
        let file = File::open(&full_path).await.map_err(|e| {
            IngestError::storage_with_source(&full_path, "failed to open file", e)
        })?;

        let size = file
            .metadata()
            .await
            .map_err(|e| {
                IngestError::storage_with_source(&full_path, "failed to read file metadata", e)
            })?
            .len();
        debug!(path = %full_path.display(), size, "Opened source for streaming");

        Ok(Box::new(AsyncLocalReader::new(file, size, self.buffer_size)))
    }
}

/// Async buffered file reader for local storage.
pub struct AsyncLocalReader {
    reader: BufReader<File>,
    size: u64,
}

impl AsyncLocalReader {
    fn new(file: File, size: u64, buffer_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, file),
            size,
        }
    }
}

impl AsyncRead for AsyncLocalReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncStorageReader for AsyncLocalReader {
    fn size(&self) -> u64 {
        self.size
    }
}
