// rust/ingest-core/src/lib.rs

//! Ingest - Core Library
//!
//! This crate decodes binary streams, byte buffers, delimited and
//! fixed-width text, and image directory trees into in-memory datasets of
//! fixed-shape samples. A tree of [`Chunk`]s describes how each record is
//! laid out; a [`Cursor`] tracks where the next value lands.

pub mod config;
pub mod error;
pub mod storage;
pub mod tensor;

// Re-export commonly used types for convenience
pub use config::IngestConfig;
pub use error::{IngestError, Result, TensorRole};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader};
pub use tensor::{DType, Tensor};

pub mod chunk;
pub use chunk::{Channel, Chunk, Format, ScalingMode, TargetSelector};

pub mod cursor;
pub use cursor::Cursor;

pub mod dataset;
pub use dataset::{Batch, Dataset, LabelRegistry, Sample, SampleLayout, SharedDataset};

pub mod source;

pub mod decode;
pub use decode::{BinaryDecoder, DecodeSummary, ImageTreeDecoder, LineDecoder};

pub mod runtime;
pub use runtime::Ingestor;
