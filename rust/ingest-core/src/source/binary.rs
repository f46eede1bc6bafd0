// rust/ingest-core/src/source/binary.rs

use std::path::Path;

use bytes::Bytes;

use super::ChunkSource;
use crate::chunk::Format;
use crate::error::{IngestError, Result};
use crate::storage::{StorageBackend, StorageReader};

/// Sequential access to raw bytes.
///
/// `take` and `advance` either satisfy the whole request or fail with an
/// underrun and leave the position untouched.
pub trait ByteSource {
    fn take(&mut self, len: usize) -> Result<Bytes>;

    fn advance(&mut self, len: usize) -> Result<()>;

    fn remaining(&self) -> u64;

    fn position(&self) -> u64;
}

/// An in-memory byte buffer read through an integer offset.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Bytes,
    offset: usize,
}

impl ByteBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
        }
    }

    fn check(&self, len: usize) -> Result<()> {
        let available = self.data.len() - self.offset;
        if len > available {
            return Err(IngestError::underrun(len, available, "bytes"));
        }
        Ok(())
    }
}

impl ByteSource for ByteBuffer {
    fn take(&mut self, len: usize) -> Result<Bytes> {
        self.check(len)?;
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    fn advance(&mut self, len: usize) -> Result<()> {
        self.check(len)?;
        self.offset += len;
        Ok(())
    }

    fn remaining(&self) -> u64 {
        (self.data.len() - self.offset) as u64
    }

    fn position(&self) -> u64 {
        self.offset as u64
    }
}

/// A storage object read through host-side position bookkeeping.
pub struct ByteStream {
    reader: Box<dyn StorageReader>,
    position: u64,
    size: u64,
}

impl ByteStream {
    pub fn new(reader: Box<dyn StorageReader>) -> Self {
        let size = reader.size();
        Self {
            reader,
            position: 0,
            size,
        }
    }

    pub fn open(storage: &dyn StorageBackend, path: &Path) -> Result<Self> {
        Ok(Self::new(storage.open_read(path)?))
    }

    fn check(&self, len: usize) -> Result<()> {
        let available = self.remaining();
        if len as u64 > available {
            return Err(IngestError::underrun(len, available as usize, "bytes"));
        }
        Ok(())
    }
}

impl ByteSource for ByteStream {
    fn take(&mut self, len: usize) -> Result<Bytes> {
        self.check(len)?;
        let bytes = self.reader.read_range(self.position, len)?;
        self.position += len as u64;
        Ok(Bytes::from(bytes))
    }

    fn advance(&mut self, len: usize) -> Result<()> {
        self.check(len)?;
        self.position += len as u64;
        Ok(())
    }

    fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Chunk adapter over any [`ByteSource`].
///
/// Binary element formats are decoded with their declared byte order.
/// Text formats need an explicit byte width per item; the bytes are read as
/// UTF-8 with trailing NUL and space padding removed.
pub struct BinarySource<B> {
    bytes: B,
}

impl<B: ByteSource> BinarySource<B> {
    pub fn new(bytes: B) -> Self {
        Self { bytes }
    }

    /// Skips a fixed-size file header before any chunk runs.
    pub fn with_header(mut bytes: B, header_bytes: usize) -> Result<Self> {
        bytes.advance(header_bytes)?;
        Ok(Self { bytes })
    }

    pub fn get_ref(&self) -> &B {
        &self.bytes
    }

    pub fn into_inner(self) -> B {
        self.bytes
    }

    fn item_width(format: Format, width: Option<usize>) -> Result<usize> {
        if let Some(w) = format.byte_width() {
            return Ok(w);
        }
        if format.is_text() {
            return width.ok_or_else(|| {
                IngestError::invalid_chunk(format!(
                    "reading {format} from a binary source needs an item width"
                ))
            });
        }
        Err(IngestError::invalid_chunk(format!(
            "format {format} cannot be read from a source"
        )))
    }
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| IngestError::invalid_text(String::from_utf8_lossy(bytes), "utf-8"))?;
    Ok(text.trim_end_matches(['\0', ' ']).to_string())
}

impl<B: ByteSource> ChunkSource for BinarySource<B> {
    fn read_numbers(
        &mut self,
        format: Format,
        count: usize,
        width: Option<usize>,
    ) -> Result<Vec<f64>> {
        if format == Format::TextLabel {
            return Err(IngestError::invalid_chunk(
                "label strings must be read as text, not numbers",
            ));
        }
        let item = Self::item_width(format, width)?;
        let block = self.bytes.take(item * count)?;

        block
            .chunks_exact(item)
            .map(|piece| {
                if format.is_text() {
                    format.parse_text(&decode_text(piece)?)
                } else {
                    format.decode_bytes(piece)
                }
            })
            .collect()
    }

    fn read_text(&mut self, width: Option<usize>) -> Result<String> {
        let width = width.ok_or_else(|| {
            IngestError::invalid_chunk("reading a label from a binary source needs an item width")
        })?;
        decode_text(&self.bytes.take(width)?)
    }

    fn skip(&mut self, format: Format, count: usize, width: Option<usize>) -> Result<()> {
        let item = Self::item_width(format, width)?;
        self.bytes.advance(item * count)
    }

    fn is_exhausted(&self) -> bool {
        self.bytes.remaining() == 0
    }

    fn consumed(&self) -> usize {
        self.bytes.position() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ByteOrder;
    use crate::config::StorageConfig;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    #[test]
    fn test_buffer_reads_are_all_or_nothing() {
        let mut source = BinarySource::new(ByteBuffer::new(vec![1u8, 2, 3]));
        let err = source.read_numbers(Format::U8, 4, None).unwrap_err();
        assert!(err.is_underrun());
        assert_eq!(source.consumed(), 0);

        assert_eq!(source.read_numbers(Format::U8, 3, None).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(source.is_exhausted());
    }

    #[test]
    fn test_multi_byte_formats() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-2i16).to_be_bytes());
        data.extend_from_slice(&70_000u32.to_le_bytes());
        data.extend_from_slice(&2.5f64.to_be_bytes());
        let mut source = BinarySource::new(ByteBuffer::new(data));

        assert_eq!(source.read_number(Format::I16(ByteOrder::Big), None).unwrap(), -2.0);
        assert_eq!(
            source.read_number(Format::U32(ByteOrder::Little), None).unwrap(),
            70_000.0
        );
        assert_eq!(source.read_number(Format::F64(ByteOrder::Big), None).unwrap(), 2.5);
        assert_eq!(source.consumed(), 14);
    }

    #[test]
    fn test_text_items_need_width() {
        let mut source = BinarySource::new(ByteBuffer::new(b"12\0\0cat 7.5 ".to_vec()));
        assert!(matches!(
            source.read_numbers(Format::TextInt, 1, None),
            Err(IngestError::InvalidChunk { .. })
        ));
        assert_eq!(source.read_number(Format::TextInt, Some(4)).unwrap(), 12.0);
        assert_eq!(source.read_text(Some(4)).unwrap(), "cat");
        assert_eq!(source.read_number(Format::TextFloat, Some(4)).unwrap(), 7.5);
    }

    #[test]
    fn test_skip_and_header() {
        let bytes = ByteBuffer::new(vec![0u8, 0, 0, 0, 9, 8, 7, 6]);
        let mut source = BinarySource::with_header(bytes, 4).unwrap();
        source.skip(Format::U16(ByteOrder::Little), 1, None).unwrap();
        assert_eq!(source.read_numbers(Format::U8, 2, None).unwrap(), vec![7.0, 6.0]);
        assert!(source.skip(Format::U8, 1, None).unwrap_err().is_underrun());

        assert!(BinarySource::with_header(ByteBuffer::new(vec![0u8; 2]), 4).is_err());
    }

    #[test]
    fn test_stream_matches_buffer() {
        let temp = TempDir::new().unwrap();
        let data: Vec<u8> = (0..64).collect();
        std::fs::write(temp.path().join("data.bin"), &data).unwrap();

        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        let stream = ByteStream::open(&storage, Path::new("data.bin")).unwrap();
        let mut from_stream = BinarySource::new(stream);
        let mut from_buffer = BinarySource::new(ByteBuffer::new(data));

        for _ in 0..4 {
            let a = from_stream.read_numbers(Format::U32(ByteOrder::Big), 4, None).unwrap();
            let b = from_buffer.read_numbers(Format::U32(ByteOrder::Big), 4, None).unwrap();
            assert_eq!(a, b);
        }
        assert!(from_stream.is_exhausted());
        assert!(from_stream.read_numbers(Format::U8, 1, None).unwrap_err().is_underrun());
    }
}
