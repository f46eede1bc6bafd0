// rust/ingest-core/src/source/image_tree.rs

//! Image-file trees laid out as `root/<label>/<file>`.
//!
//! Decoding image containers is left to an [`ImageDecoder`] supplied by the
//! caller. The walker only finds files, reads their bytes and hands the
//! decoded planes back as an in-memory [`ByteBuffer`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::binary::ByteBuffer;
use crate::error::Result;
use crate::storage::StorageBackend;

/// Turns an encoded image file into the byte planes chunks are decoded from.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path, encoded: &[u8]) -> Result<Vec<u8>>;
}

/// Passes file bytes through unchanged, for trees of pre-decoded raw planes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPlanes;

impl ImageDecoder for RawPlanes {
    fn decode(&self, _path: &Path, encoded: &[u8]) -> Result<Vec<u8>> {
        Ok(encoded.to_vec())
    }
}

/// One image file and the label taken from its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub label: String,
    pub path: PathBuf,
}

pub struct ImageTreeSource {
    storage: Arc<dyn StorageBackend>,
    root: PathBuf,
    decoder: Arc<dyn ImageDecoder>,
    extensions: Vec<String>,
}

impl ImageTreeSource {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        root: impl Into<PathBuf>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            storage,
            root: root.into(),
            decoder,
            extensions: Vec::new(),
        }
    }

    /// Restricts the walk to files with one of these extensions
    /// (case-insensitive, without the dot).
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Lists every image, ordered by label directory and then file name.
    ///
    /// Hidden entries and plain files directly under the root are ignored.
    pub fn entries(&self) -> Result<Vec<ImageEntry>> {
        let mut entries = Vec::new();
        for label in self.storage.list(&self.root)? {
            if label.starts_with('.') {
                continue;
            }
            let dir = self.root.join(&label);
            if !self.storage.metadata(&dir)?.is_dir {
                continue;
            }
            for name in self.storage.list(&dir)? {
                let path = dir.join(&name);
                if name.starts_with('.') || !self.accepts(&path) {
                    continue;
                }
                if self.storage.metadata(&path)?.is_dir {
                    continue;
                }
                entries.push(ImageEntry {
                    label: label.clone(),
                    path,
                });
            }
        }
        debug!(root = %self.root.display(), images = entries.len(), "Walked image tree");
        Ok(entries)
    }

    /// Reads and decodes one image into a byte buffer.
    pub fn load(&self, entry: &ImageEntry) -> Result<ByteBuffer> {
        let mut reader = self.storage.open_read(&entry.path)?;
        let size = reader.size() as usize;
        let encoded = reader.read_range(0, size)?;
        let planes = self.decoder.decode(&entry.path, &encoded)?;
        Ok(ByteBuffer::new(planes))
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::error::IngestError;
    use crate::source::{BinarySource, ByteSource, ChunkSource};
    use crate::storage::LocalStorage;
    use std::fs;
    use tempfile::TempDir;

    struct Inverting;

    impl ImageDecoder for Inverting {
        fn decode(&self, path: &Path, encoded: &[u8]) -> Result<Vec<u8>> {
            if encoded.is_empty() {
                return Err(IngestError::storage(path, "empty image"));
            }
            Ok(encoded.iter().map(|b| 255 - b).collect())
        }
    }

    fn tree() -> (TempDir, Arc<dyn StorageBackend>) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("images");
        for (label, files) in [("dog", vec!["b.raw", "a.raw"]), ("cat", vec!["x.raw"])] {
            fs::create_dir_all(root.join(label)).unwrap();
            for file in files {
                fs::write(root.join(label).join(file), [1u8, 2, 3, 4]).unwrap();
            }
        }
        fs::write(root.join("README"), b"not an image").unwrap();
        fs::write(root.join("cat").join(".DS_Store"), b"junk").unwrap();
        fs::write(root.join("cat").join("notes.txt"), b"junk").unwrap();

        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        (temp, Arc::new(storage))
    }

    #[test]
    fn test_entries_are_ordered_and_filtered() {
        let (_temp, storage) = tree();
        let source = ImageTreeSource::new(storage, "images", Arc::new(RawPlanes))
            .with_extensions(["RAW"]);

        let entries = source.entries().unwrap();
        let labels: Vec<_> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "dog", "dog"]);
        assert!(entries[1].path.ends_with("dog/a.raw"));
    }

    #[test]
    fn test_load_runs_decoder() {
        let (_temp, storage) = tree();
        let source = ImageTreeSource::new(storage, "images", Arc::new(Inverting))
            .with_extensions(["raw"]);

        let entry = source.entries().unwrap().remove(0);
        let buffer = source.load(&entry).unwrap();
        assert_eq!(buffer.remaining(), 4);

        let mut planes = BinarySource::new(buffer);
        assert_eq!(
            planes.read_numbers(crate::chunk::Format::U8, 4, None).unwrap(),
            vec![254.0, 253.0, 252.0, 251.0]
        );
    }
}
