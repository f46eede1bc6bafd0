// rust/ingest-core/src/chunk/mod.rs

//! Chunk descriptor trees.
//!
//! A chunk is one decode step. A list of chunks, some of which are repeat
//! blocks owning further chunks, describes how a record-oriented source maps
//! onto the input and output buffers of a sample.
//!
//! # Example
//!
//! ```
//! use ingest_core::chunk::{Chunk, Format};
//!
//! // 16-byte file header, then 28x28 u8 images until the stream runs out.
//! let tree = vec![
//!     Chunk::skip(16, Format::U8),
//!     Chunk::repeat_records(vec![Chunk::repeat_dim(
//!         28,
//!         0,
//!         vec![Chunk::input(28, Format::U8), Chunk::set_dim(1, 0)],
//!     )]),
//! ];
//! # let _ = tree;
//! ```

mod format;

pub use format::{ByteOrder, Format};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result, TensorRole};

/// Post-read scaling applied to feature values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingMode {
    /// Store the value as read.
    #[default]
    None,
    /// Divide integers by the format's largest representable value.
    UnitInterval,
    /// Store as read; rescale per feature into [0, 1] after loading.
    MinMax,
    /// Store as read; rescale per feature to zero mean, unit variance after loading.
    Standardize,
}

impl ScalingMode {
    /// Whether this mode is applied by the post-load normalization pass.
    pub fn is_post_hoc(self) -> bool {
        matches!(self, ScalingMode::MinMax | ScalingMode::Standardize)
    }
}

/// Which cursor(s) a structural chunk moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSelector {
    None,
    #[default]
    Input,
    Output,
    Both,
}

impl TargetSelector {
    pub fn roles(self) -> &'static [TensorRole] {
        match self {
            TargetSelector::None => &[],
            TargetSelector::Input => &[TensorRole::Input],
            TargetSelector::Output => &[TensorRole::Output],
            TargetSelector::Both => &[TensorRole::Input, TensorRole::Output],
        }
    }
}

/// Colour plane written by a single-channel chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// Position this channel occupies on dimension 2 of the input tensor.
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Source family a chunk tree is decoded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFamily {
    /// Byte streams and in-memory byte buffers.
    Binary,
    /// Delimited or fixed-width text lines, one record per line.
    Text,
}

/// One decode step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Chunk {
    /// Read and discard `count` items.
    Skip {
        count: usize,
        format: Format,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// Read a class, either numerically or as a label string, into a one-hot output.
    ClassLabel {
        format: Format,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// Read a numeric class index into a one-hot output.
    ClassIndex {
        format: Format,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// Read `count` values into the input buffer along its last dimension.
    InputFeature {
        count: usize,
        format: Format,
        #[serde(default)]
        scaling: ScalingMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// Read one value into a fixed colour plane of the input buffer.
    Channel {
        channel: Channel,
        format: Format,
        #[serde(default)]
        scaling: ScalingMode,
    },
    /// Read `count` values into the output buffer along its last dimension.
    OutputFeature {
        count: usize,
        format: Format,
        #[serde(default)]
        scaling: ScalingMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// Read a label string, registering it if unseen, into a one-hot output.
    OutputLabel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// Run `children` `times` times, or until the source is exhausted.
    Repeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        times: Option<usize>,
        target: Format,
        #[serde(default)]
        selector: TargetSelector,
        /// Allocate a sample at the start of every record iteration rather
        /// than on its first write.
        #[serde(default)]
        eager: bool,
        children: Vec<Chunk>,
    },
    /// Set a cursor dimension (or the sample index) to `value`; a negative
    /// value increments it instead.
    SetDimension {
        target: Format,
        #[serde(default)]
        selector: TargetSelector,
        value: i64,
    },
}

impl Chunk {
    pub fn skip(count: usize, format: Format) -> Self {
        Chunk::Skip {
            count,
            format,
            width: None,
        }
    }

    pub fn class_label(format: Format) -> Self {
        Chunk::ClassLabel {
            format,
            width: None,
        }
    }

    pub fn class_index(format: Format) -> Self {
        Chunk::ClassIndex {
            format,
            width: None,
        }
    }

    pub fn input(count: usize, format: Format) -> Self {
        Chunk::InputFeature {
            count,
            format,
            scaling: ScalingMode::None,
            width: None,
        }
    }

    pub fn output(count: usize, format: Format) -> Self {
        Chunk::OutputFeature {
            count,
            format,
            scaling: ScalingMode::None,
            width: None,
        }
    }

    pub fn channel(channel: Channel, format: Format) -> Self {
        Chunk::Channel {
            channel,
            format,
            scaling: ScalingMode::None,
        }
    }

    pub fn output_label() -> Self {
        Chunk::OutputLabel { width: None }
    }

    /// Repeat `children` `times` times, advancing dimension `dim` of the
    /// input cursor after each pass.
    pub fn repeat_dim(times: usize, dim: usize, children: Vec<Chunk>) -> Self {
        Chunk::Repeat {
            times: Some(times),
            target: Format::Dimension(dim),
            selector: TargetSelector::Input,
            eager: false,
            children,
        }
    }

    /// One sample per iteration, until the source is exhausted.
    pub fn repeat_records(children: Vec<Chunk>) -> Self {
        Chunk::Repeat {
            times: None,
            target: Format::Record,
            selector: TargetSelector::Both,
            eager: false,
            children,
        }
    }

    pub fn set_dim(dim: usize, value: usize) -> Self {
        Chunk::SetDimension {
            target: Format::Dimension(dim),
            selector: TargetSelector::Input,
            value: value as i64,
        }
    }

    pub fn increment_dim(dim: usize) -> Self {
        Chunk::SetDimension {
            target: Format::Dimension(dim),
            selector: TargetSelector::Input,
            value: -1,
        }
    }

    /// Commit the current sample and start the next one.
    pub fn new_sample() -> Self {
        Chunk::SetDimension {
            target: Format::Record,
            selector: TargetSelector::Both,
            value: -1,
        }
    }

    /// Commit the current sample and continue writing into slot `index`.
    pub fn sample_at(index: usize) -> Self {
        Chunk::SetDimension {
            target: Format::Record,
            selector: TargetSelector::Both,
            value: index as i64,
        }
    }

    /// Sets the scaling mode of a feature or channel chunk.
    pub fn scaled(mut self, mode: ScalingMode) -> Self {
        match &mut self {
            Chunk::InputFeature { scaling, .. }
            | Chunk::OutputFeature { scaling, .. }
            | Chunk::Channel { scaling, .. } => *scaling = mode,
            _ => {}
        }
        self
    }

    /// Sets the item width used by fixed-width text and binary text reads.
    pub fn with_width(mut self, item_width: usize) -> Self {
        match &mut self {
            Chunk::Skip { width, .. }
            | Chunk::ClassLabel { width, .. }
            | Chunk::ClassIndex { width, .. }
            | Chunk::InputFeature { width, .. }
            | Chunk::OutputFeature { width, .. }
            | Chunk::OutputLabel { width } => *width = Some(item_width),
            _ => {}
        }
        self
    }

    /// Sets which cursors a repeat or set-dimension chunk moves.
    pub fn on(mut self, target: TargetSelector) -> Self {
        match &mut self {
            Chunk::Repeat { selector, .. } | Chunk::SetDimension { selector, .. } => {
                *selector = target
            }
            _ => {}
        }
        self
    }

    /// Marks a record repeat as allocating eagerly.
    pub fn eager(mut self) -> Self {
        if let Chunk::Repeat { eager, .. } = &mut self {
            *eager = true;
        }
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Chunk::Skip { .. } => "skip",
            Chunk::ClassLabel { .. } => "class-label",
            Chunk::ClassIndex { .. } => "class-index",
            Chunk::InputFeature { .. } => "input-feature",
            Chunk::Channel { .. } => "channel",
            Chunk::OutputFeature { .. } => "output-feature",
            Chunk::OutputLabel { .. } => "output-label",
            Chunk::Repeat { .. } => "repeat",
            Chunk::SetDimension { .. } => "set-dimension",
        }
    }

    /// True if this chunk, or any descendant, resolves label strings.
    pub fn uses_labels(&self) -> bool {
        match self {
            Chunk::OutputLabel { .. } => true,
            Chunk::ClassLabel { format, .. } => *format == Format::TextLabel,
            Chunk::Repeat { children, .. } => children.iter().any(Chunk::uses_labels),
            _ => false,
        }
    }

    /// True if this chunk, or any descendant, reads from the source.
    fn reads_source(&self) -> bool {
        match self {
            Chunk::Repeat { children, .. } => children.iter().any(Chunk::reads_source),
            Chunk::SetDimension { .. } => false,
            _ => true,
        }
    }

    fn is_record_repeat(&self) -> bool {
        matches!(
            self,
            Chunk::Repeat {
                target: Format::Record,
                ..
            }
        )
    }
}

/// Checks a chunk tree against the structural rules for `family`.
///
/// Markers are only meaningful on repeat and set-dimension chunks; element
/// chunks need an element format. Text trees treat every line as one record,
/// so they may not contain record repeats or binary-only kinds. Binary trees
/// may contain at most one record repeat, and never nested in another. A
/// repeat without a count runs until the source ends, so it must read.
pub fn validate_tree(chunks: &[Chunk], family: SourceFamily) -> Result<()> {
    let mut record_repeats = 0;
    for chunk in chunks {
        validate_chunk(chunk, family, false, &mut record_repeats)?;
    }
    if record_repeats > 1 {
        return Err(IngestError::invalid_chunk(format!(
            "a chunk tree may contain at most one record repeat, found {record_repeats}"
        )));
    }
    Ok(())
}

fn validate_chunk(
    chunk: &Chunk,
    family: SourceFamily,
    inside_record: bool,
    record_repeats: &mut usize,
) -> Result<()> {
    let element = |format: &Format| -> Result<()> {
        if format.is_marker() {
            return Err(IngestError::invalid_chunk(format!(
                "{} chunk cannot use structural format {format}",
                chunk.kind_name()
            )));
        }
        Ok(())
    };
    let marker = |format: &Format| -> Result<()> {
        if !format.is_marker() {
            return Err(IngestError::invalid_chunk(format!(
                "{} chunk must target 'dim:N' or 'record', not {format}",
                chunk.kind_name()
            )));
        }
        Ok(())
    };
    let binary_only = || -> Result<()> {
        if family == SourceFamily::Text {
            return Err(IngestError::invalid_chunk(format!(
                "{} chunks are only valid for binary sources",
                chunk.kind_name()
            )));
        }
        Ok(())
    };
    let width = |w: &Option<usize>| -> Result<()> {
        if *w == Some(0) {
            return Err(IngestError::invalid_chunk(format!(
                "{} chunk declares a zero item width",
                chunk.kind_name()
            )));
        }
        Ok(())
    };

    match chunk {
        Chunk::Skip { format, width: w, .. } => {
            binary_only()?;
            element(format)?;
            width(w)
        }
        Chunk::ClassLabel { format, width: w } | Chunk::ClassIndex { format, width: w } => {
            element(format)?;
            width(w)
        }
        Chunk::InputFeature { format, width: w, .. }
        | Chunk::OutputFeature { format, width: w, .. } => {
            element(format)?;
            if *format == Format::TextLabel {
                return Err(IngestError::invalid_chunk(
                    "feature chunks cannot read label strings",
                ));
            }
            width(w)
        }
        Chunk::Channel { format, .. } => {
            binary_only()?;
            element(format)
        }
        Chunk::OutputLabel { width: w } => width(w),
        Chunk::Repeat {
            times,
            target,
            children,
            ..
        } => {
            marker(target)?;
            if times.is_none() && !children.iter().any(Chunk::reads_source) {
                return Err(IngestError::invalid_chunk(
                    "a repeat without a count must contain a chunk that reads the source",
                ));
            }
            let is_record = chunk.is_record_repeat();
            if is_record {
                if family == SourceFamily::Text {
                    return Err(IngestError::invalid_chunk(
                        "text sources treat each line as a record; remove the record repeat",
                    ));
                }
                if inside_record {
                    return Err(IngestError::invalid_chunk(
                        "record repeats cannot be nested",
                    ));
                }
                *record_repeats += 1;
            }
            for child in children {
                validate_chunk(child, family, inside_record || is_record, record_repeats)?;
            }
            Ok(())
        }
        Chunk::SetDimension { target, .. } => {
            marker(target)?;
            if *target == Format::Record {
                binary_only()?;
            }
            Ok(())
        }
    }
}
