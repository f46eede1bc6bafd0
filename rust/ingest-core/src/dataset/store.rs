// rust/ingest-core/src/dataset/store.rs

use std::sync::Arc;

use tracing::debug;

use super::labels::LabelRegistry;
use super::sample::{Sample, SampleLayout};
use crate::cursor::NormalizationMap;
use crate::error::{IngestError, Result};

/// Where the decoder puts the records it produces.
///
/// `Dataset` is the usual store. Concurrent decode tasks write into a
/// single-slot sink instead and hand the finished sample to the shared
/// dataset afterwards.
pub trait SampleStore {
    /// Shapes and element types every sample must have.
    fn layout(&self) -> &SampleLayout;

    /// Resolves a label string to its index, registering it if unseen.
    fn resolve_label(&self, text: &str) -> Result<usize>;

    /// Reserves the slot a record about to be decoded will land in.
    ///
    /// `None` asks for the next free slot.
    fn begin_record(&mut self, slot: Option<usize>) -> Result<RecordSlot>;

    /// Stores a finished record at `slot`.
    fn commit_record(&mut self, slot: usize, sample: Sample) -> Result<()>;

    /// Releases a slot that turned out to have no record behind it.
    ///
    /// Only a placeholder added by [`begin_record`](Self::begin_record) is
    /// removed; a slot that already held a committed sample keeps it.
    fn discard_record(&mut self, slot: RecordSlot) -> Result<()>;

    /// Receives the normalization tags recorded while decoding the first sample.
    fn record_normalization(&mut self, input: NormalizationMap, output: NormalizationMap);
}

/// A slot handed out by [`SampleStore::begin_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSlot {
    pub index: usize,
    /// The store appended a placeholder for this record.
    pub reserved: bool,
}

/// Consecutive samples stacked into flat buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Index of the first sample in the batch.
    pub start: usize,
    /// Input buffers, concatenated in sample order.
    pub inputs: Vec<f64>,
    /// Output buffers, concatenated in sample order.
    pub outputs: Vec<f64>,
    pub class_indices: Vec<Option<usize>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.class_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_indices.is_empty()
    }
}

/// An ordered collection of fixed-shape samples plus a shared label registry.
///
/// While the dataset is exclusively locked every structural mutation
/// (append, commit, reserve, remove) fails with [`IngestError::DatasetLocked`].
#[derive(Debug)]
pub struct Dataset {
    layout: SampleLayout,
    samples: Vec<Sample>,
    labels: Arc<LabelRegistry>,
    locked: bool,
    pub(super) input_normalization: NormalizationMap,
    pub(super) output_normalization: NormalizationMap,
}

impl Dataset {
    /// Creates an empty dataset.
    ///
    /// The label registry holds as many labels as the output buffer has
    /// elements, or two when the output is a single boolean flag.
    pub fn new(layout: SampleLayout) -> Result<Self> {
        layout.validate()?;
        let capacity = match layout.output_len() {
            1 => 2,
            n => n,
        };
        Ok(Self {
            labels: Arc::new(LabelRegistry::with_capacity(capacity)),
            samples: Vec::new(),
            locked: false,
            input_normalization: Vec::new(),
            output_normalization: Vec::new(),
            layout,
        })
    }

    pub fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    pub fn labels(&self) -> &Arc<LabelRegistry> {
        &self.labels
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub(super) fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// A zero-filled sample shaped for this dataset.
    pub fn allocate_empty_sample(&self) -> Sample {
        self.layout.empty_sample()
    }

    /// Appends `sample` after validating its shape and element types.
    pub fn append_sample(&mut self, sample: Sample) -> Result<usize> {
        self.ensure_unlocked()?;
        self.layout.check(&sample)?;
        self.samples.push(sample);
        Ok(self.samples.len() - 1)
    }

    /// Replaces the sample at `index`, or appends it when `index` is the
    /// current length.
    pub fn commit_sample(&mut self, sample: Sample, index: usize) -> Result<()> {
        self.ensure_unlocked()?;
        self.layout.check(&sample)?;
        self.ensure_addressable(index)?;
        if index == self.samples.len() {
            self.samples.push(sample);
        } else {
            self.samples[index] = sample;
        }
        Ok(())
    }

    /// Appends an empty placeholder and returns its index.
    pub fn reserve_slot(&mut self) -> Result<usize> {
        self.ensure_unlocked()?;
        self.samples.push(self.layout.empty_sample());
        Ok(self.samples.len() - 1)
    }

    /// Removes and returns the last sample, if any.
    pub fn drop_trailing_sample(&mut self) -> Result<Option<Sample>> {
        self.ensure_unlocked()?;
        Ok(self.samples.pop())
    }

    pub fn remove_sample(&mut self, index: usize) -> Result<Sample> {
        self.ensure_unlocked()?;
        if index >= self.samples.len() {
            return Err(IngestError::IndexOutOfBounds {
                index,
                len: self.samples.len(),
            });
        }
        Ok(self.samples.remove(index))
    }

    /// Case-insensitive, first-seen-wins label lookup.
    pub fn register_label(&self, text: &str) -> Result<usize> {
        self.labels.resolve(text)
    }

    /// Enters the exclusive "in use" state. Fails if already locked.
    pub fn lock_exclusive(&mut self) -> Result<()> {
        if self.locked {
            return Err(IngestError::DatasetLocked);
        }
        self.locked = true;
        Ok(())
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Stacks up to `size` samples starting at `start`.
    ///
    /// The batch is cut short at the end of the dataset; a `start` past the
    /// end is an error.
    pub fn batch(&self, start: usize, size: usize) -> Result<Batch> {
        if start > self.samples.len() {
            return Err(IngestError::IndexOutOfBounds {
                index: start,
                len: self.samples.len(),
            });
        }
        let end = start.saturating_add(size).min(self.samples.len());
        let window = &self.samples[start..end];

        let mut inputs = Vec::with_capacity(window.len() * self.layout.input_len());
        let mut outputs = Vec::with_capacity(window.len() * self.layout.output_len());
        let mut class_indices = Vec::with_capacity(window.len());
        for sample in window {
            inputs.extend_from_slice(sample.input.as_slice());
            outputs.extend_from_slice(sample.output.as_slice());
            class_indices.push(sample.class_index);
        }

        Ok(Batch {
            start,
            inputs,
            outputs,
            class_indices,
        })
    }

    /// Normalization tags for the input and output buffers, if recorded.
    pub fn normalization(&self) -> (&NormalizationMap, &NormalizationMap) {
        (&self.input_normalization, &self.output_normalization)
    }

    pub fn set_normalization(&mut self, input: NormalizationMap, output: NormalizationMap) {
        self.input_normalization = input;
        self.output_normalization = output;
    }

    /// Existing slots and the one just past the end can be written.
    fn ensure_addressable(&self, index: usize) -> Result<()> {
        if index > self.samples.len() {
            return Err(IngestError::IndexOutOfBounds {
                index,
                len: self.samples.len(),
            });
        }
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(IngestError::DatasetLocked);
        }
        Ok(())
    }
}

impl SampleStore for Dataset {
    fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    fn resolve_label(&self, text: &str) -> Result<usize> {
        self.register_label(text)
    }

    fn begin_record(&mut self, slot: Option<usize>) -> Result<RecordSlot> {
        match slot {
            Some(index) if index < self.samples.len() => {
                self.ensure_unlocked()?;
                Ok(RecordSlot {
                    index,
                    reserved: false,
                })
            }
            Some(index) => {
                self.ensure_addressable(index)?;
                Ok(RecordSlot {
                    index: self.reserve_slot()?,
                    reserved: true,
                })
            }
            None => Ok(RecordSlot {
                index: self.reserve_slot()?,
                reserved: true,
            }),
        }
    }

    fn commit_record(&mut self, slot: usize, sample: Sample) -> Result<()> {
        self.commit_sample(sample, slot)
    }

    fn discard_record(&mut self, slot: RecordSlot) -> Result<()> {
        if slot.reserved && slot.index + 1 == self.samples.len() {
            debug!(slot = slot.index, "Releasing unused record slot");
            self.drop_trailing_sample()?;
        }
        Ok(())
    }

    fn record_normalization(&mut self, input: NormalizationMap, output: NormalizationMap) {
        self.set_normalization(input, output);
    }
}

/// A store holding exactly one pre-reserved slot.
///
/// Used by concurrent decode tasks: the producer reserves the slot in
/// source order, the task decodes into the sink, and the finished sample is
/// committed to the shared dataset once the task completes.
#[derive(Debug)]
pub struct RecordSink {
    layout: SampleLayout,
    labels: Arc<LabelRegistry>,
    slot: usize,
    sample: Option<Sample>,
    normalization: Option<(NormalizationMap, NormalizationMap)>,
}

impl RecordSink {
    pub fn new(layout: SampleLayout, labels: Arc<LabelRegistry>, slot: usize) -> Self {
        Self {
            layout,
            labels,
            slot,
            sample: None,
            normalization: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    fn ensure_own(&self, index: usize) -> Result<()> {
        if index != self.slot {
            return Err(IngestError::invalid_chunk(format!(
                "record decode cannot move from slot {} to slot {index}",
                self.slot
            )));
        }
        Ok(())
    }

    /// The committed sample and any normalization tags recorded with it.
    pub fn into_parts(
        self,
    ) -> (
        Option<Sample>,
        Option<(NormalizationMap, NormalizationMap)>,
    ) {
        (self.sample, self.normalization)
    }
}

impl SampleStore for RecordSink {
    fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    fn resolve_label(&self, text: &str) -> Result<usize> {
        self.labels.resolve(text)
    }

    fn begin_record(&mut self, slot: Option<usize>) -> Result<RecordSlot> {
        self.ensure_own(slot.unwrap_or(self.slot))?;
        Ok(RecordSlot {
            index: self.slot,
            reserved: true,
        })
    }

    fn commit_record(&mut self, slot: usize, sample: Sample) -> Result<()> {
        self.ensure_own(slot)?;
        self.layout.check(&sample)?;
        self.sample = Some(sample);
        Ok(())
    }

    fn discard_record(&mut self, _slot: RecordSlot) -> Result<()> {
        self.sample = None;
        Ok(())
    }

    fn record_normalization(&mut self, input: NormalizationMap, output: NormalizationMap) {
        self.normalization = Some((input, output));
    }
}
