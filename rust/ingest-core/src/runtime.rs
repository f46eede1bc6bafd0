// rust/ingest-core/src/runtime.rs

//! Load orchestration.
//!
//! The `Ingestor` ties a validated [`IngestConfig`] to the storage backends
//! and the decoder for the configured source kind.
//!
//! # Example
//!
//! ```no_run
//! use ingest_core::Ingestor;
//!
//! # async fn example() -> ingest_core::Result<()> {
//! let ingestor = Ingestor::from_config_file("ingest.toml")?;
//! let dataset = ingestor.load().await?;
//! println!("loaded {} samples", dataset.num_samples());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{IngestConfig, SourceKind};
use crate::dataset::{Dataset, SharedDataset};
use crate::decode::{BinaryDecoder, DecodeSummary, ImageTreeDecoder, LineDecoder};
use crate::error::{IngestError, Result};
use crate::source::{ByteStream, ImageDecoder, ImageTreeSource, RawPlanes, StorageLines};
use crate::storage::{AsyncLocalStorage, AsyncStorageBackend, LocalStorage, StorageBackend};

/// Loads the configured source into a [`Dataset`].
pub struct Ingestor {
    config: IngestConfig,
    /// Sync storage for binary streams and image trees
    storage: Arc<dyn StorageBackend>,
    /// Async storage for line sources
    async_storage: Arc<dyn AsyncStorageBackend>,
    image_decoder: Arc<dyn ImageDecoder>,
}

impl Ingestor {
    /// Creates an ingestor from a configuration file.
    ///
    /// Environment variable overrides are applied after loading the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = IngestConfig::from_file(path)?.with_env_overrides();
        Self::from_config(config)
    }

    /// Creates an ingestor from a configuration.
    ///
    /// Image files are passed to the chunk tree undecoded until
    /// [`with_image_decoder`](Self::with_image_decoder) installs a decoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the storage
    /// backend cannot be initialized.
    pub fn from_config(config: IngestConfig) -> Result<Self> {
        config.validate()?;

        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage)?);
        let async_storage: Arc<dyn AsyncStorageBackend> =
            Arc::new(AsyncLocalStorage::new(&config.storage));

        Ok(Self {
            config,
            storage,
            async_storage,
            image_decoder: Arc::new(RawPlanes),
        })
    }

    #[must_use]
    pub fn with_image_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.image_decoder = decoder;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Decodes the whole source, normalizing afterwards if configured.
    ///
    /// # Errors
    ///
    /// Returns the first decode error. The dataset being filled is dropped
    /// with it, so records decoded before the failure are not returned.
    /// Callers that need them drive [`BinaryDecoder`], [`LineDecoder`] or
    /// [`ImageTreeDecoder`] against a dataset they own: every decoder
    /// leaves committed records in place and releases the failed one.
    pub async fn load(&self) -> Result<Dataset> {
        let dataset = Dataset::new(self.config.dataset.layout())?;
        let source = &self.config.source;
        debug!(kind = ?source.kind, path = %source.path.display(), "Loading source");

        let (mut dataset, summary) = match source.kind {
            SourceKind::Binary => self.load_binary(dataset).await?,
            SourceKind::Delimited | SourceKind::FixedWidth => self.load_lines(dataset).await?,
            SourceKind::ImageTree => self.load_images(dataset).await?,
        };

        if self.config.decode.normalize {
            dataset.normalize()?;
        }

        info!(
            path = %source.path.display(),
            samples = dataset.num_samples(),
            skipped_lines = summary.skipped,
            labels = dataset.labels().len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    async fn load_binary(&self, mut dataset: Dataset) -> Result<(Dataset, DecodeSummary)> {
        let decoder = BinaryDecoder::new(self.config.chunks.clone())?
            .with_header_bytes(self.config.source.header_bytes);
        let storage = Arc::clone(&self.storage);
        let path = self.config.source.path.clone();

        tokio::task::spawn_blocking(move || {
            let stream = ByteStream::open(storage.as_ref(), &path)?;
            let summary = decoder.decode(stream, &mut dataset)?;
            Ok((dataset, summary))
        })
        .await
        .map_err(|e| IngestError::task(format!("binary decode failed: {e}")))?
    }

    async fn load_lines(&self, dataset: Dataset) -> Result<(Dataset, DecodeSummary)> {
        let decoder = LineDecoder::new(self.config.chunks.clone(), self.config.source.text_options())?
            .with_max_concurrency(self.config.decode.max_concurrency);
        let lines = StorageLines::open(self.async_storage.as_ref(), &self.config.source.path).await?;

        let shared = SharedDataset::new(dataset);
        let summary = decoder.decode_lines(lines, &shared).await?;
        Ok((shared.into_inner()?, summary))
    }

    async fn load_images(&self, mut dataset: Dataset) -> Result<(Dataset, DecodeSummary)> {
        let decoder = ImageTreeDecoder::new(self.config.chunks.clone())?;
        let source = ImageTreeSource::new(
            Arc::clone(&self.storage),
            self.config.source.path.clone(),
            Arc::clone(&self.image_decoder),
        )
        .with_extensions(self.config.source.extensions.iter().cloned());

        tokio::task::spawn_blocking(move || {
            let summary = decoder.decode(&source, &mut dataset)?;
            Ok((dataset, summary))
        })
        .await
        .map_err(|e| IngestError::task(format!("image decode failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, Format, ScalingMode};
    use crate::config::StorageConfig;
    use crate::source::Delimiter;
    use crate::tensor::DType;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    fn config_in(temp: &TempDir, kind: SourceKind, path: &str) -> IngestConfig {
        let mut config = IngestConfig::default();
        config.storage = StorageConfig {
            base_path: temp.path().to_path_buf(),
            ..Default::default()
        };
        config.source.kind = kind;
        config.source.path = PathBuf::from(path);
        config
    }

    #[tokio::test]
    async fn test_load_binary_with_header() {
        let temp = TempDir::new().unwrap();
        let mut data = b"MAGIC\0\0\0".to_vec();
        for record in 0..3u8 {
            data.push(record % 2);
            data.extend_from_slice(&[record * 10, record * 10 + 1]);
        }
        std::fs::write(temp.path().join("records.bin"), &data).unwrap();

        let mut config = config_in(&temp, SourceKind::Binary, "records.bin");
        config.source.header_bytes = 8;
        config.dataset.input_shape = vec![2];
        config.dataset.output_shape = vec![2];
        config.dataset.input_dtype = DType::U8;
        config.chunks = vec![Chunk::repeat_records(vec![
            Chunk::class_index(Format::U8),
            Chunk::input(2, Format::U8),
        ])];

        let dataset = Ingestor::from_config(config).unwrap().load().await.unwrap();
        assert_eq!(dataset.num_samples(), 3);
        assert_eq!(dataset.sample(2).unwrap().input.as_slice(), &[20.0, 21.0]);
        assert_eq!(dataset.sample(1).unwrap().class_index, Some(1));
    }

    #[tokio::test]
    async fn test_load_delimited_and_normalize() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("table.csv"),
            "a,b,label\n1,10,yes\n# comment\n3,10,no\n5,10,yes\n",
        )
        .unwrap();

        let mut config = config_in(&temp, SourceKind::Delimited, "table.csv");
        config.source.delimiter = Delimiter::Comma;
        config.source.header_lines = 1;
        config.source.comment_prefixes = vec!["#".to_string()];
        config.dataset.input_shape = vec![2];
        config.dataset.output_shape = vec![2];
        config.decode.normalize = true;
        config.chunks = vec![
            Chunk::input(2, Format::TextFloat).scaled(ScalingMode::MinMax),
            Chunk::output_label(),
        ];

        let dataset = Ingestor::from_config(config).unwrap().load().await.unwrap();
        assert_eq!(dataset.num_samples(), 3);
        let first: Vec<f64> = dataset.samples().iter().map(|s| s.input.as_slice()[0]).collect();
        assert_eq!(first, vec![0.0, 0.5, 1.0]);
        // Constant feature collapses to 0.
        assert_eq!(dataset.sample(2).unwrap().input.as_slice()[1], 0.0);
        assert_eq!(dataset.labels().labels(), vec!["yes", "no"]);
    }

    #[tokio::test]
    async fn test_load_image_tree() {
        let temp = TempDir::new().unwrap();
        for label in ["a", "b"] {
            let dir = temp.path().join("images").join(label);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("0.raw"), [1u8, 2, 3, 4]).unwrap();
        }

        let mut config = config_in(&temp, SourceKind::ImageTree, "images");
        config.source.extensions = vec!["raw".to_string()];
        config.dataset.input_shape = vec![2, 2];
        config.dataset.output_shape = vec![2];
        config.chunks = vec![Chunk::repeat_dim(
            2,
            0,
            vec![Chunk::input(2, Format::U8), Chunk::set_dim(1, 0)],
        )];

        let dataset = Ingestor::from_config(config).unwrap().load().await.unwrap();
        assert_eq!(dataset.num_samples(), 2);
        assert_eq!(dataset.sample(1).unwrap().class_index, Some(1));
        assert_eq!(dataset.sample(1).unwrap().input.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_load_surfaces_decode_errors() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bad.txt"), "1 2\n3 x\n").unwrap();

        let mut config = config_in(&temp, SourceKind::Delimited, "bad.txt");
        config.source.delimiter = Delimiter::Whitespace;
        config.dataset.input_shape = vec![2];
        config.dataset.output_shape = vec![1];
        config.chunks = vec![Chunk::input(2, Format::TextInt)];

        let err = Ingestor::from_config(config).unwrap().load().await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidNumericText { .. }));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let result = Ingestor::from_config(IngestConfig::default());
        assert!(matches!(result, Err(IngestError::Config { .. })));
    }

    #[test]
    fn test_from_config_file() {
        let temp = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [storage]
            base_path = "{}"

            [source]
            kind = "binary"
            path = "data.bin"

            [dataset]
            input_shape = [4]
            output_shape = [1]

            [[chunks]]
            kind = "input-feature"
            count = 4
            format = "u8"
            "#,
            temp.path().display()
        )
        .unwrap();

        let ingestor = Ingestor::from_config_file(file.path()).unwrap();
        assert_eq!(ingestor.config().source.path, PathBuf::from("data.bin"));
        assert_eq!(ingestor.config().chunks, vec![Chunk::input(4, Format::U8)]);
    }
}
