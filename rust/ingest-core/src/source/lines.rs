// rust/ingest-core/src/source/lines.rs

//! Raw line producers for text sources.
//!
//! Lines are separated by a universal newline: `\n`, `\r\n` or a lone `\r`.
//! A trailing separator does not produce an extra empty line.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{IngestError, Result};
use crate::storage::{AsyncStorageBackend, AsyncStorageReader};

/// An async producer of raw text lines.
#[async_trait]
pub trait LineSource: Send {
    /// Returns the next raw line without its separator, or `None` at the end.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

/// Splits `text` on universal newlines.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    UniversalLines { rest: text }
}

struct UniversalLines<'a> {
    rest: &'a str,
}

impl<'a> Iterator for UniversalLines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.find(['\r', '\n']) {
            None => Some(std::mem::take(&mut self.rest)),
            Some(i) => {
                let line = &self.rest[..i];
                let separator = if self.rest[i..].starts_with("\r\n") { 2 } else { 1 };
                self.rest = &self.rest[i + separator..];
                Some(line)
            }
        }
    }
}

/// Lines held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLines {
    lines: VecDeque<String>,
}

impl MemoryLines {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: split_lines(text).map(str::to_string).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait]
impl LineSource for MemoryLines {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Lines read incrementally from an async storage object.
pub struct StorageLines {
    reader: BufReader<Box<dyn AsyncStorageReader>>,
    /// The previous line ended in `\r`; a following `\n` belongs to it.
    pending_cr: bool,
    lines_read: usize,
}

impl StorageLines {
    pub fn new(reader: Box<dyn AsyncStorageReader>) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending_cr: false,
            lines_read: 0,
        }
    }

    pub async fn open(storage: &dyn AsyncStorageBackend, path: &Path) -> Result<Self> {
        Ok(Self::new(storage.open_read(path).await?))
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    fn finish_line(&mut self, bytes: Vec<u8>) -> Result<String> {
        let mut line = String::from_utf8(bytes).map_err(|e| {
            IngestError::invalid_text(String::from_utf8_lossy(e.as_bytes()), "utf-8")
        })?;
        if self.lines_read == 0 && line.starts_with('\u{feff}') {
            line.drain(..'\u{feff}'.len_utf8());
        }
        self.lines_read += 1;
        Ok(line)
    }
}

#[async_trait]
impl LineSource for StorageLines {
    async fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        loop {
            let buf = self.reader.fill_buf().await.map_err(|e| {
                IngestError::storage_with_source("<lines>", "failed to read line", e)
            })?;
            if buf.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                return self.finish_line(line).map(Some);
            }

            let mut start = 0;
            if std::mem::take(&mut self.pending_cr) && buf[0] == b'\n' {
                start = 1;
            }

            match buf[start..].iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(offset) => {
                    let end = start + offset;
                    line.extend_from_slice(&buf[start..end]);
                    self.pending_cr = buf[end] == b'\r';
                    self.reader.consume(end + 1);
                    return self.finish_line(line).map(Some);
                }
                None => {
                    line.extend_from_slice(&buf[start..]);
                    let consumed = buf.len();
                    self.reader.consume(consumed);
                }
            }
        }
    }
}
