// rust/ingest-core/src/config.rs

//! Configuration for a dataset load.
//!
//! A config file names the storage root, the source to read, the sample
//! layout and the chunk tree that maps one onto the other:
//!
//! ```toml
//! [storage]
//! base_path = "./data"
//!
//! [source]
//! kind = "delimited"
//! path = "iris.csv"
//! delimiter = "comma"
//! comment_prefixes = ["#"]
//!
//! [dataset]
//! input_shape = [4]
//! output_shape = [3]
//!
//! [[chunks]]
//! kind = "input-feature"
//! count = 4
//! format = "text-float"
//!
//! [[chunks]]
//! kind = "output-label"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::chunk::{validate_tree, Chunk, SourceFamily};
use crate::dataset::SampleLayout;
use crate::error::{IngestError, Result};
use crate::source::{Delimiter, TextOptions};
use crate::tensor::DType;

// Top-level ingest configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub dataset: DatasetConfig,
    pub decode: DecodeConfig,
    pub chunks: Vec<Chunk>,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Root that every source path is resolved against.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
    // Whether to use memory-mapped reads.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

/// Which adapter reads the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A binary file read as a byte stream.
    #[default]
    Binary,
    /// Text lines split on a delimiter.
    Delimited,
    /// Text lines consumed in fixed character widths.
    FixedWidth,
    /// A `root/<label>/<file>` directory of images.
    ImageTree,
}

impl SourceKind {
    pub fn family(self) -> SourceFamily {
        match self {
            SourceKind::Binary | SourceKind::ImageTree => SourceFamily::Binary,
            SourceKind::Delimited | SourceKind::FixedWidth => SourceFamily::Text,
        }
    }
}

impl FromStr for SourceKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(SourceKind::Binary),
            "delimited" => Ok(SourceKind::Delimited),
            "fixed-width" => Ok(SourceKind::FixedWidth),
            "image-tree" => Ok(SourceKind::ImageTree),
            other => Err(IngestError::config(format!(
                "unknown source kind '{other}': expected binary, delimited, fixed-width or image-tree"
            ))),
        }
    }
}

// Source configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    // File (or image-tree root) relative to storage.base_path.
    pub path: PathBuf,
    // Field separator for delimited text.
    pub delimiter: Delimiter,
    // Text lines starting with any of these are skipped.
    pub comment_prefixes: Vec<String>,
    // Raw text lines discarded before parsing.
    pub header_lines: usize,
    // Bytes skipped at the start of a binary file.
    pub header_bytes: usize,
    // Image file extensions to accept; empty accepts every file.
    pub extensions: Vec<String>,
}

impl SourceConfig {
    pub fn text_options(&self) -> TextOptions {
        let options = match self.kind {
            SourceKind::FixedWidth => TextOptions::fixed_width(),
            _ => TextOptions::delimited(self.delimiter),
        };
        let options = self
            .comment_prefixes
            .iter()
            .fold(options, |o, prefix| o.with_comment_prefix(prefix.clone()));
        options.with_header_lines(self.header_lines)
    }
}

// Sample layout options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub input_shape: Vec<usize>,
    pub input_dtype: DType,
    pub output_shape: Vec<usize>,
    pub output_dtype: DType,
}

impl DatasetConfig {
    pub fn layout(&self) -> SampleLayout {
        SampleLayout::new(&self.input_shape, &self.output_shape)
            .with_dtypes(self.input_dtype, self.output_dtype)
    }
}

// Decode options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    // Record tasks in flight for text sources; 0 or 1 decodes sequentially.
    pub max_concurrency: usize,
    // Run min-max / standardize rescaling after loading.
    pub normalize: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data"),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            normalize: false,
        }
    }
}

impl FromStr for IngestConfig {
    type Err = IngestError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| IngestError::config_with_source("failed to parse TOML config", e))
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring invalid environment override");
            None
        }
    }
}

impl IngestConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `INGEST_` and name the section and field:
    // - `INGEST_STORAGE_BASE_PATH` overrides `storage.base_path`
    // - `INGEST_SOURCE_KIND` overrides `source.kind`
    // - `INGEST_SOURCE_DELIMITER` overrides `source.delimiter`
    // - `INGEST_DECODE_MAX_CONCURRENCY` overrides `decode.max_concurrency`
    //
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("INGEST_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Some(v) = env_parse("INGEST_STORAGE_BUFFER_SIZE") {
            self.storage.buffer_size = v;
        }
        if let Some(v) = env_parse("INGEST_STORAGE_USE_MMAP") {
            self.storage.use_mmap = v;
        }
        if let Some(v) = env_parse("INGEST_STORAGE_MMAP_THRESHOLD") {
            self.storage.mmap_threshold = v;
        }

        // Source overrides
        if let Some(v) = env_parse("INGEST_SOURCE_KIND") {
            self.source.kind = v;
        }
        if let Ok(val) = std::env::var("INGEST_SOURCE_PATH") {
            self.source.path = PathBuf::from(val);
        }
        if let Some(v) = env_parse("INGEST_SOURCE_DELIMITER") {
            self.source.delimiter = v;
        }
        if let Some(v) = env_parse("INGEST_SOURCE_HEADER_LINES") {
            self.source.header_lines = v;
        }
        if let Some(v) = env_parse("INGEST_SOURCE_HEADER_BYTES") {
            self.source.header_bytes = v;
        }

        // Decode overrides
        if let Some(v) = env_parse("INGEST_DECODE_MAX_CONCURRENCY") {
            self.decode.max_concurrency = v;
        }
        if let Some(v) = env_parse("INGEST_DECODE_NORMALIZE") {
            self.decode.normalize = v;
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(IngestError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if self.source.path.as_os_str().is_empty() {
            return Err(IngestError::config("source.path must not be empty"));
        }

        self.dataset.layout().validate()?;

        if self.chunks.is_empty() {
            return Err(IngestError::config(
                "at least one [[chunks]] entry is required",
            ));
        }
        validate_tree(&self.chunks, self.source.kind.family())?;

        if self.source.kind == SourceKind::FixedWidth {
            if let Some(kind) = self.chunks.iter().find_map(missing_width) {
                return Err(IngestError::config(format!(
                    "fixed-width sources need a width on every {kind} chunk"
                )));
            }
        }

        Ok(())
    }
}

fn missing_width(chunk: &Chunk) -> Option<&'static str> {
    match chunk {
        Chunk::Skip { width: None, .. }
        | Chunk::ClassLabel { width: None, .. }
        | Chunk::ClassIndex { width: None, .. }
        | Chunk::InputFeature { width: None, .. }
        | Chunk::OutputFeature { width: None, .. }
        | Chunk::OutputLabel { width: None } => Some(chunk.kind_name()),
        Chunk::Repeat { children, .. } => children.iter().find_map(missing_width),
        _ => None,
    }
}
