// rust/ingest-core/src/storage/mod.rs

//! Storage abstraction for ingestion sources.
//!
//! # Sync vs Async
//!
//! - **Sync traits** (`StorageBackend`, `StorageReader`): used by the
//!   binary-stream adapter and the image-tree walker, which decode inside
//!   blocking code.
//!
//! - **Async traits** (`AsyncStorageBackend`, `AsyncStorageReader`): used by
//!   the line producer of the concurrent text decoder.
//!
//! # Example
//!
//! ```no_run
//! use ingest_core::config::StorageConfig;
//! use ingest_core::storage::{LocalStorage, StorageBackend};
//! use std::path::Path;
//!
//! let config = StorageConfig::default();
//! let storage = LocalStorage::new(&config).unwrap();
//!
//! let mut reader = storage.open_read(Path::new("train-images.idx3-ubyte")).unwrap();
//! let header = reader.read_range(0, 16).unwrap();
//! ```

// Sync storage
mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader};

// Async storage
mod async_local;
mod async_traits;

pub use async_local::{AsyncLocalReader, AsyncLocalStorage};
pub use async_traits::{AsyncStorageBackend, AsyncStorageReader};
