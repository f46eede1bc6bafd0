// rust/ingest-core/src/dataset/mod.rs

//! In-memory datasets of fixed-shape samples.
//!
//! A [`Dataset`] owns an ordered list of samples, a case-insensitive label
//! registry, and an exclusive "in use" flag that refuses structural
//! mutation while set. [`SharedDataset`] wraps one behind an async mutex for
//! concurrent decoding.
//!
//! # Example
//!
//! ```
//! use ingest_core::dataset::{Dataset, SampleLayout};
//!
//! let mut dataset = Dataset::new(SampleLayout::new(&[28, 28], &[10]))?;
//! let sample = dataset.allocate_empty_sample();
//! dataset.append_sample(sample)?;
//!
//! dataset.lock_exclusive()?;
//! let batch = dataset.batch(0, 32)?;
//! dataset.unlock();
//! assert_eq!(batch.len(), 1);
//! # Ok::<(), ingest_core::IngestError>(())
//! ```

mod labels;
mod normalize;
mod sample;
mod shared;
mod store;

pub use labels::LabelRegistry;
pub use sample::{Sample, SampleLayout};
pub use shared::SharedDataset;
pub use store::{Batch, Dataset, RecordSink, RecordSlot, SampleStore};
