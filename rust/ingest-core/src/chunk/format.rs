// rust/ingest-core/src/chunk/format.rs

//! Format descriptors: what a chunk reads, or which axis it targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Byte order of a multi-byte binary element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    fn suffix(self) -> &'static str {
        match self {
            ByteOrder::Little => "le",
            ByteOrder::Big => "be",
        }
    }
}

/// Element encoding read by a chunk, or a structural marker.
///
/// The textual form used in configuration files is compact: `u8`, `i16be`,
/// `f32le`, `text-float`, `text-label`, `dim:1`, `record`. Multi-byte names
/// without a suffix use the host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    I8,
    U8,
    I16(ByteOrder),
    U16(ByteOrder),
    I32(ByteOrder),
    U32(ByteOrder),
    I64(ByteOrder),
    U64(ByteOrder),
    F16(ByteOrder),
    F32(ByteOrder),
    F64(ByteOrder),
    /// Text parsed as an integer.
    TextInt,
    /// Text parsed as a float.
    TextFloat,
    /// Text resolved through the label registry.
    TextLabel,
    /// Targets dimension K of the cursor.
    Dimension(usize),
    /// Targets the record (sample) boundary.
    Record,
}

impl Format {
    /// Width in bytes of one binary element; `None` for text and markers.
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            Format::I8 | Format::U8 => Some(1),
            Format::I16(_) | Format::U16(_) | Format::F16(_) => Some(2),
            Format::I32(_) | Format::U32(_) | Format::F32(_) => Some(4),
            Format::I64(_) | Format::U64(_) | Format::F64(_) => Some(8),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Format::TextInt | Format::TextFloat | Format::TextLabel)
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Format::Dimension(_) | Format::Record)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Format::F16(_) | Format::F32(_) | Format::F64(_) | Format::TextFloat
        )
    }

    /// Largest representable magnitude, used by unit-interval scaling.
    ///
    /// Floats and text are assumed to already be in range and return `None`.
    pub fn max_magnitude(&self) -> Option<f64> {
        match self {
            Format::I8 => Some(i8::MAX as f64),
            Format::U8 => Some(u8::MAX as f64),
            Format::I16(_) => Some(i16::MAX as f64),
            Format::U16(_) => Some(u16::MAX as f64),
            Format::I32(_) => Some(i32::MAX as f64),
            Format::U32(_) => Some(u32::MAX as f64),
            Format::I64(_) => Some(i64::MAX as f64),
            Format::U64(_) => Some(u64::MAX as f64),
            _ => None,
        }
    }

    /// Decodes one element from exactly `byte_width()` bytes.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<f64> {
        let width = self.byte_width().ok_or_else(|| {
            IngestError::invalid_chunk(format!("format {self} has no binary encoding"))
        })?;
        if bytes.len() != width {
            return Err(IngestError::underrun(width, bytes.len(), "bytes"));
        }

        macro_rules! read {
            ($ty:ty, $order:expr) => {{
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                match $order {
                    ByteOrder::Little => <$ty>::from_le_bytes(raw),
                    ByteOrder::Big => <$ty>::from_be_bytes(raw),
                }
            }};
        }

        let value = match *self {
            Format::I8 => bytes[0] as i8 as f64,
            Format::U8 => bytes[0] as f64,
            Format::I16(o) => read!(i16, o) as f64,
            Format::U16(o) => read!(u16, o) as f64,
            Format::I32(o) => read!(i32, o) as f64,
            Format::U32(o) => read!(u32, o) as f64,
            Format::I64(o) => read!(i64, o) as f64,
            Format::U64(o) => read!(u64, o) as f64,
            Format::F16(o) => read!(half::f16, o).to_f64(),
            Format::F32(o) => read!(f32, o) as f64,
            Format::F64(o) => read!(f64, o),
            _ => unreachable!("byte_width() is None for non-binary formats"),
        };
        Ok(value)
    }

    /// Parses trimmed text as a number of this format.
    ///
    /// Binary element names are accepted here too, so a CSV column may be
    /// declared as `u8`.
    pub fn parse_text(&self, text: &str) -> Result<f64> {
        let trimmed = text.trim();
        let parsed = match self {
            Format::TextLabel | Format::Dimension(_) | Format::Record => {
                return Err(IngestError::invalid_chunk(format!(
                    "format {self} does not describe a number"
                )));
            }
            f if f.is_float() => trimmed.parse::<f64>().ok(),
            Format::U64(_) => trimmed.parse::<u64>().ok().map(|v| v as f64),
            _ => trimmed.parse::<i64>().ok().map(|v| v as f64),
        };
        parsed.ok_or_else(|| IngestError::invalid_text(trimmed, self))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, order) = match self {
            Format::I8 => ("i8", None),
            Format::U8 => ("u8", None),
            Format::I16(o) => ("i16", Some(o)),
            Format::U16(o) => ("u16", Some(o)),
            Format::I32(o) => ("i32", Some(o)),
            Format::U32(o) => ("u32", Some(o)),
            Format::I64(o) => ("i64", Some(o)),
            Format::U64(o) => ("u64", Some(o)),
            Format::F16(o) => ("f16", Some(o)),
            Format::F32(o) => ("f32", Some(o)),
            Format::F64(o) => ("f64", Some(o)),
            Format::TextInt => ("text-int", None),
            Format::TextFloat => ("text-float", None),
            Format::TextLabel => ("text-label", None),
            Format::Dimension(d) => return write!(f, "dim:{d}"),
            Format::Record => ("record", None),
        };
        match order {
            Some(o) => write!(f, "{name}{}", o.suffix()),
            None => f.write_str(name),
        }
    }
}

impl FromStr for Format {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();

        if let Some(dim) = s.strip_prefix("dim:") {
            let dim = dim.parse().map_err(|_| {
                IngestError::config(format!("invalid dimension index in format '{s}'"))
            })?;
            return Ok(Format::Dimension(dim));
        }

        match s.as_str() {
            "i8" => return Ok(Format::I8),
            "u8" => return Ok(Format::U8),
            "text-int" | "int" => return Ok(Format::TextInt),
            "text-float" | "float" => return Ok(Format::TextFloat),
            "text-label" | "label" => return Ok(Format::TextLabel),
            "record" | "sample" => return Ok(Format::Record),
            _ => {}
        }

        let (base, order) = if let Some(base) = s.strip_suffix("le") {
            (base, ByteOrder::Little)
        } else if let Some(base) = s.strip_suffix("be") {
            (base, ByteOrder::Big)
        } else {
            (s.as_str(), ByteOrder::NATIVE)
        };

        match base {
            "i16" => Ok(Format::I16(order)),
            "u16" => Ok(Format::U16(order)),
            "i32" => Ok(Format::I32(order)),
            "u32" => Ok(Format::U32(order)),
            "i64" => Ok(Format::I64(order)),
            "u64" => Ok(Format::U64(order)),
            "f16" => Ok(Format::F16(order)),
            "f32" => Ok(Format::F32(order)),
            "f64" => Ok(Format::F64(order)),
            _ => Err(IngestError::config(format!(
                "unknown format '{s}'. Expected an element type such as 'u8', 'i16be', \
                 'f32', a text format, 'dim:N' or 'record'"
            ))),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.to_string()
    }
}
