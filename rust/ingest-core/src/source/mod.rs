// rust/ingest-core/src/source/mod.rs

//! Source adapters.
//!
//! Every adapter turns a chunk's logical "read N items of format F" request
//! into concrete bytes or substrings. The decoder only sees the
//! [`ChunkSource`] trait, so binary streams, byte buffers, delimited lines
//! and fixed-width lines share identical chunk semantics.
//!
//! Reads are all-or-nothing: when fewer items remain than requested the
//! adapter returns [`IngestError::SourceUnderrun`] without consuming
//! anything.
//!
//! [`IngestError::SourceUnderrun`]: crate::error::IngestError::SourceUnderrun

mod binary;
mod image_tree;
mod lines;
mod text;

pub use binary::{BinarySource, ByteBuffer, ByteSource, ByteStream};
pub use image_tree::{ImageDecoder, ImageEntry, ImageTreeSource, RawPlanes};
pub use lines::{split_lines, LineSource, MemoryLines, StorageLines};
pub use text::{
    DelimitedLine, Delimiter, FixedWidthLine, LineFilter, LineLayout, TextLine, TextOptions,
};

use crate::chunk::Format;
use crate::error::Result;

/// A record-oriented source the decoder reads chunk items from.
pub trait ChunkSource {
    /// Reads `count` numbers encoded as `format`.
    ///
    /// `width` is the per-item width for fixed-width text and for text
    /// formats read from binary sources.
    fn read_numbers(&mut self, format: Format, count: usize, width: Option<usize>)
        -> Result<Vec<f64>>;

    /// Reads one string item, used for label resolution.
    fn read_text(&mut self, width: Option<usize>) -> Result<String>;

    /// Reads and discards `count` items of `format`.
    fn skip(&mut self, format: Format, count: usize, width: Option<usize>) -> Result<()>;

    /// Whether no further items can be read.
    fn is_exhausted(&self) -> bool;

    /// Units consumed so far: bytes for binary sources, fields or
    /// characters for text lines.
    fn consumed(&self) -> usize;

    /// Reads a single number.
    fn read_number(&mut self, format: Format, width: Option<usize>) -> Result<f64> {
        let values = self.read_numbers(format, 1, width)?;
        Ok(values.first().copied().unwrap_or_default())
    }
}
