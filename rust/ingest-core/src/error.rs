// rust/ingest-core/src/error.rs

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which of a sample's two buffers an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorRole {
    Input,
    Output,
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorRole::Input => f.write_str("input"),
            TensorRole::Output => f.write_str("output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Source underrun: needed {needed} {unit}, only {available} available")]
    SourceUnderrun {
        needed: usize,
        available: usize,
        unit: &'static str,
    },

    #[error("Location {location:?} out of range for {role} shape {shape:?}")]
    LocationOutOfRange {
        role: TensorRole,
        location: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Index {index} out of bounds for buffer of {len} elements")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },

    #[error("Invalid numeric text '{text}' for format {format}")]
    InvalidNumericText {
        text: String,
        format: String,
    },

    #[error("Label '{label}' exceeds output capacity of {capacity} labels")]
    LabelOverflow {
        label: String,
        capacity: usize,
    },

    #[error("Class index {index} out of range for output size {size}")]
    ClassIndexOutOfRange {
        index: i64,
        size: usize,
    },

    #[error("Sample does not match dataset: {message}")]
    ShapeMismatch {
        message: String,
    },

    #[error("Dataset is locked for exclusive use")]
    DatasetLocked,

    #[error("Invalid chunk: {message}")]
    InvalidChunk {
        message: String,
    },

    #[error("Decode task failed: {message}")]
    Task {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;

// Convenience constructors
impl IngestError {

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn underrun(needed: usize, available: usize, unit: &'static str) -> Self {
        Self::SourceUnderrun {
            needed,
            available,
            unit,
        }
    }

    pub fn out_of_range(role: TensorRole, location: &[usize], shape: &[usize]) -> Self {
        Self::LocationOutOfRange {
            role,
            location: location.to_vec(),
            shape: shape.to_vec(),
        }
    }

    pub fn invalid_text(text: impl Into<String>, format: impl fmt::Display) -> Self {
        Self::InvalidNumericText {
            text: text.into(),
            format: format.to_string(),
        }
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    pub fn invalid_chunk(message: impl Into<String>) -> Self {
        Self::InvalidChunk {
            message: message.into(),
        }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// True when the source ran dry before a chunk was satisfied.
    pub fn is_underrun(&self) -> bool {
        matches!(self, Self::SourceUnderrun { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underrun_predicate() {
        assert!(IngestError::underrun(4, 2, "bytes").is_underrun());
        assert!(!IngestError::DatasetLocked.is_underrun());
    }

    #[test]
    fn test_messages_name_the_category() {
        let err = IngestError::out_of_range(TensorRole::Input, &[2, 0], &[2, 2]);
        assert_eq!(
            err.to_string(),
            "Location [2, 0] out of range for input shape [2, 2]"
        );

        let err = IngestError::invalid_text("abc", "text-float");
        assert!(err.to_string().contains("'abc'"));

        let err = IngestError::LabelOverflow {
            label: "dog".to_string(),
            capacity: 2,
        };
        assert!(err.to_string().contains("capacity of 2"));
    }
}
