// rust/ingest-core/src/dataset/shared.rs

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::labels::LabelRegistry;
use super::sample::{Sample, SampleLayout};
use super::store::{Batch, Dataset};
use crate::cursor::NormalizationMap;
use crate::error::{IngestError, Result};

/// A dataset shared between concurrent decode tasks.
///
/// All structural operations go through one async mutex, so commits from
/// different tasks are applied one at a time. The label registry and layout
/// are kept outside the mutex because tasks consult them while decoding.
#[derive(Debug, Clone)]
pub struct SharedDataset {
    inner: Arc<Mutex<Dataset>>,
    labels: Arc<LabelRegistry>,
    layout: SampleLayout,
}

impl SharedDataset {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            labels: dataset.labels().clone(),
            layout: dataset.layout().clone(),
            inner: Arc::new(Mutex::new(dataset)),
        }
    }

    pub fn labels(&self) -> &Arc<LabelRegistry> {
        &self.labels
    }

    pub fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    /// Direct access to the dataset for sequential decoding.
    pub async fn lock(&self) -> MutexGuard<'_, Dataset> {
        self.inner.lock().await
    }

    pub async fn num_samples(&self) -> usize {
        self.inner.lock().await.num_samples()
    }

    pub async fn reserve_slot(&self) -> Result<usize> {
        self.inner.lock().await.reserve_slot()
    }

    pub async fn commit_sample(&self, sample: Sample, index: usize) -> Result<()> {
        self.inner.lock().await.commit_sample(sample, index)
    }

    /// Removes the samples at `slots` under one lock. Later samples move up.
    pub async fn release_slots(&self, mut slots: Vec<usize>) -> Result<()> {
        slots.sort_unstable_by(|a, b| b.cmp(a));
        slots.dedup();
        let mut dataset = self.inner.lock().await;
        for slot in slots {
            dataset.remove_sample(slot)?;
        }
        Ok(())
    }

    pub async fn set_normalization(&self, input: NormalizationMap, output: NormalizationMap) {
        self.inner.lock().await.set_normalization(input, output);
    }

    pub async fn lock_exclusive(&self) -> Result<()> {
        self.inner.lock().await.lock_exclusive()
    }

    pub async fn unlock(&self) {
        self.inner.lock().await.unlock();
    }

    /// Assembles a batch under the exclusive lock, releasing it afterwards.
    pub async fn read_batch(&self, start: usize, size: usize) -> Result<Batch> {
        let mut dataset = self.inner.lock().await;
        dataset.lock_exclusive()?;
        let batch = dataset.batch(start, size);
        dataset.unlock();
        batch
    }

    /// Returns the dataset once no other handle is alive.
    pub fn into_inner(self) -> Result<Dataset> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|_| IngestError::task("dataset is still shared with running tasks"))
    }
}
