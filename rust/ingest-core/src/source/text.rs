// rust/ingest-core/src/source/text.rs

//! Line-oriented text adapters.
//!
//! Each accepted line is one record. A delimited line is split into fields
//! up front; a fixed-width line is consumed by advancing a character index
//! by each chunk's declared width.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ChunkSource;
use crate::chunk::Format;
use crate::error::{IngestError, Result};

/// Field separator for delimited text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Delimiter {
    #[default]
    Comma,
    /// Runs of any whitespace.
    Whitespace,
    Char(char),
}

impl Delimiter {
    fn split<'a>(self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Comma => line.split(',').map(str::trim).collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
            Delimiter::Char(c) => line.split(c).map(str::trim).collect(),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Comma => f.write_str("comma"),
            Delimiter::Whitespace => f.write_str("whitespace"),
            Delimiter::Char('\t') => f.write_str("tab"),
            Delimiter::Char(c) => write!(f, "{c}"),
        }
    }
}

impl FromStr for Delimiter {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "comma" | "," => Ok(Delimiter::Comma),
            "whitespace" | "space" | " " => Ok(Delimiter::Whitespace),
            "tab" | "\t" => Ok(Delimiter::Char('\t')),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Delimiter::Char(c)),
                    _ => Err(IngestError::config(format!(
                        "invalid delimiter '{other}': expected 'comma', 'whitespace', 'tab' \
                         or a single character"
                    ))),
                }
            }
        }
    }
}

impl TryFrom<String> for Delimiter {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Delimiter> for String {
    fn from(delimiter: Delimiter) -> Self {
        delimiter.to_string()
    }
}

/// How a text line is divided into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLayout {
    Delimited(Delimiter),
    FixedWidth,
}

impl Default for LineLayout {
    fn default() -> Self {
        LineLayout::Delimited(Delimiter::Comma)
    }
}

/// Parsing options shared by every text adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextOptions {
    pub layout: LineLayout,
    /// Lines whose trimmed text starts with any of these are skipped.
    pub comment_prefixes: Vec<String>,
    /// Raw lines discarded before parsing begins.
    pub header_lines: usize,
}

impl TextOptions {
    pub fn delimited(delimiter: Delimiter) -> Self {
        Self {
            layout: LineLayout::Delimited(delimiter),
            ..Default::default()
        }
    }

    pub fn fixed_width() -> Self {
        Self {
            layout: LineLayout::FixedWidth,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_comment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comment_prefixes.push(prefix.into());
        self
    }

    #[must_use]
    pub fn with_header_lines(mut self, lines: usize) -> Self {
        self.header_lines = lines;
        self
    }

    pub fn filter(&self) -> LineFilter {
        LineFilter {
            header_remaining: self.header_lines,
            comment_prefixes: self.comment_prefixes.clone(),
            skipped: 0,
        }
    }

    /// Wraps one accepted line in the adapter matching the layout.
    pub fn open<'a>(&self, line: &'a str) -> TextLine<'a> {
        match self.layout {
            LineLayout::Delimited(delimiter) => {
                TextLine::Delimited(DelimitedLine::new(line, delimiter))
            }
            LineLayout::FixedWidth => TextLine::FixedWidth(FixedWidthLine::new(line)),
        }
    }
}

/// Decides which raw lines become records.
///
/// Header lines are counted on raw input, before comment and blank-line
/// filtering.
#[derive(Debug, Clone)]
pub struct LineFilter {
    header_remaining: usize,
    comment_prefixes: Vec<String>,
    skipped: usize,
}

impl LineFilter {
    pub fn accept(&mut self, line: &str) -> bool {
        if self.header_remaining > 0 {
            self.header_remaining -= 1;
            self.skipped += 1;
            return false;
        }
        let trimmed = line.trim();
        if trimmed.is_empty()
            || self
                .comment_prefixes
                .iter()
                .any(|p| !p.is_empty() && trimmed.starts_with(p.as_str()))
        {
            self.skipped += 1;
            return false;
        }
        true
    }

    /// Lines rejected so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// A line split into fields by a delimiter.
#[derive(Debug, Clone)]
pub struct DelimitedLine<'a> {
    fields: Vec<&'a str>,
    next: usize,
}

impl<'a> DelimitedLine<'a> {
    pub fn new(line: &'a str, delimiter: Delimiter) -> Self {
        Self {
            fields: delimiter.split(line),
            next: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.fields.len() - self.next
    }

    fn take(&mut self, count: usize) -> Result<&[&'a str]> {
        let available = self.remaining();
        if count > available {
            return Err(IngestError::underrun(count, available, "fields"));
        }
        let start = self.next;
        self.next += count;
        Ok(&self.fields[start..self.next])
    }
}

impl ChunkSource for DelimitedLine<'_> {
    fn read_numbers(
        &mut self,
        format: Format,
        count: usize,
        _width: Option<usize>,
    ) -> Result<Vec<f64>> {
        if format == Format::TextLabel || format.is_marker() {
            return Err(IngestError::invalid_chunk(format!(
                "format {format} does not describe a number"
            )));
        }
        // Parse before committing the position so a bad field leaves the
        // line where it was.
        let start = self.next;
        let values = self
            .take(count)?
            .iter()
            .map(|field| format.parse_text(field))
            .collect::<Result<Vec<_>>>();
        if values.is_err() {
            self.next = start;
        }
        values
    }

    fn read_text(&mut self, _width: Option<usize>) -> Result<String> {
        Ok(self.take(1)?[0].to_string())
    }

    fn skip(&mut self, _format: Format, count: usize, _width: Option<usize>) -> Result<()> {
        self.take(count).map(|_| ())
    }

    fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn consumed(&self) -> usize {
        self.next
    }
}

/// A line consumed in fixed character widths.
#[derive(Debug, Clone)]
pub struct FixedWidthLine {
    chars: Vec<char>,
    next: usize,
}

impl FixedWidthLine {
    pub fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            next: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.chars.len() - self.next
    }

    fn take(&mut self, width: Option<usize>, count: usize) -> Result<Vec<String>> {
        let width = width.ok_or_else(|| {
            IngestError::invalid_chunk("fixed-width text chunks need an item width")
        })?;
        let needed = width * count;
        let available = self.remaining();
        if needed > available {
            return Err(IngestError::underrun(needed, available, "characters"));
        }
        let items = self.chars[self.next..self.next + needed]
            .chunks(width)
            .map(|piece| piece.iter().collect())
            .collect();
        self.next += needed;
        Ok(items)
    }
}

impl ChunkSource for FixedWidthLine {
    fn read_numbers(
        &mut self,
        format: Format,
        count: usize,
        width: Option<usize>,
    ) -> Result<Vec<f64>> {
        let start = self.next;
        let values = self
            .take(width, count)?
            .iter()
            .map(|item| format.parse_text(item))
            .collect::<Result<Vec<_>>>();
        if values.is_err() {
            self.next = start;
        }
        values
    }

    fn read_text(&mut self, width: Option<usize>) -> Result<String> {
        let mut items = self.take(width, 1)?;
        Ok(items.pop().unwrap_or_default().trim().to_string())
    }

    fn skip(&mut self, _format: Format, count: usize, width: Option<usize>) -> Result<()> {
        self.take(width, count).map(|_| ())
    }

    fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn consumed(&self) -> usize {
        self.next
    }
}

/// One accepted line behind whichever adapter its layout calls for.
#[derive(Debug, Clone)]
pub enum TextLine<'a> {
    Delimited(DelimitedLine<'a>),
    FixedWidth(FixedWidthLine),
}

impl ChunkSource for TextLine<'_> {
    fn read_numbers(
        &mut self,
        format: Format,
        count: usize,
        width: Option<usize>,
    ) -> Result<Vec<f64>> {
        match self {
            TextLine::Delimited(line) => line.read_numbers(format, count, width),
            TextLine::FixedWidth(line) => line.read_numbers(format, count, width),
        }
    }

    fn read_text(&mut self, width: Option<usize>) -> Result<String> {
        match self {
            TextLine::Delimited(line) => line.read_text(width),
            TextLine::FixedWidth(line) => line.read_text(width),
        }
    }

    fn skip(&mut self, format: Format, count: usize, width: Option<usize>) -> Result<()> {
        match self {
            TextLine::Delimited(line) => line.skip(format, count, width),
            TextLine::FixedWidth(line) => line.skip(format, count, width),
        }
    }

    fn is_exhausted(&self) -> bool {
        match self {
            TextLine::Delimited(line) => line.is_exhausted(),
            TextLine::FixedWidth(line) => line.is_exhausted(),
        }
    }

    fn consumed(&self) -> usize {
        match self {
            TextLine::Delimited(line) => line.consumed(),
            TextLine::FixedWidth(line) => line.consumed(),
        }
    }
}
