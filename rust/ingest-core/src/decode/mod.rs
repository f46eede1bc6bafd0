// rust/ingest-core/src/decode/mod.rs

//! Decoding chunk trees into datasets.
//!
//! [`ChunkDecoder`] interprets a tree against any [`ChunkSource`]. The entry
//! points wrap it for each source family:
//!
//! - [`BinaryDecoder`] for byte streams and byte buffers
//! - [`LineDecoder`] for delimited and fixed-width text, optionally with a
//!   bounded pool of concurrent record tasks
//! - [`ImageTreeDecoder`] for `root/<label>/<file>` image trees
//!
//! # Example
//!
//! ```
//! use ingest_core::chunk::{Chunk, Format};
//! use ingest_core::dataset::{Dataset, SampleLayout};
//! use ingest_core::decode::LineDecoder;
//! use ingest_core::source::{Delimiter, TextOptions};
//!
//! let tree = vec![
//!     Chunk::input(2, Format::TextFloat),
//!     Chunk::output(1, Format::TextFloat),
//! ];
//! let decoder = LineDecoder::new(tree, TextOptions::delimited(Delimiter::Whitespace))?;
//!
//! let mut dataset = Dataset::new(SampleLayout::new(&[2], &[1]))?;
//! decoder.decode_str("1.0 2.0 5.0\n", &mut dataset)?;
//! assert_eq!(dataset.sample(0).unwrap().output.as_slice(), &[5.0]);
//! # Ok::<(), ingest_core::IngestError>(())
//! ```
//!
//! [`ChunkSource`]: crate::source::ChunkSource

mod decoder;
mod image;
mod parallel;

pub use decoder::{BinaryDecoder, ChunkDecoder, DecodeSummary};
pub use image::ImageTreeDecoder;
pub use parallel::LineDecoder;
