// rust/ingest-core/src/decode/image.rs

use tracing::debug;

use super::decoder::{decode_record, DecodeSummary};
use crate::chunk::{validate_tree, Chunk, Format, SourceFamily};
use crate::cursor::{Cursor, NormalizationMap};
use crate::dataset::{Dataset, RecordSlot, Sample, SampleLayout, SampleStore};
use crate::error::{IngestError, Result};
use crate::source::{BinarySource, ChunkSource, ImageTreeSource};

/// Decodes an image tree, one record per image.
///
/// The chunk tree describes the decoded byte planes of a single image. The
/// class of each sample comes from its directory name through the dataset's
/// label registry, registered in walk order.
#[derive(Debug, Clone)]
pub struct ImageTreeDecoder {
    chunks: Vec<Chunk>,
}

impl ImageTreeDecoder {
    pub fn new(chunks: Vec<Chunk>) -> Result<Self> {
        validate_tree(&chunks, SourceFamily::Binary)?;
        if chunks.iter().any(crosses_records) {
            return Err(IngestError::invalid_chunk(
                "image trees treat each image as a record; remove record chunks",
            ));
        }
        Ok(Self { chunks })
    }

    pub fn decode(&self, source: &ImageTreeSource, dataset: &mut Dataset) -> Result<DecodeSummary> {
        let layout = dataset.layout().clone();
        let mut cursor = Cursor::new(&layout.input_shape, &layout.output_shape);
        let mut summary = DecodeSummary::default();

        for entry in source.entries()? {
            let class = dataset.resolve_label(&entry.label)?;
            let mut planes = BinarySource::new(source.load(&entry)?);
            let mut labelled = Labelled {
                dataset: &mut *dataset,
                class,
            };
            summary.records += decode_record(&self.chunks, &mut labelled, &mut cursor, &mut planes)?;
            summary.consumed += planes.consumed();
        }
        debug!(images = summary.records, labels = dataset.labels().len(), "Decoded image tree");
        Ok(summary)
    }
}

fn crosses_records(chunk: &Chunk) -> bool {
    match chunk {
        Chunk::Repeat {
            target: Format::Record,
            ..
        }
        | Chunk::SetDimension {
            target: Format::Record,
            ..
        } => true,
        Chunk::Repeat { children, .. } => children.iter().any(crosses_records),
        _ => false,
    }
}

/// Stamps the directory class on each record as it is committed.
struct Labelled<'a> {
    dataset: &'a mut Dataset,
    class: usize,
}

impl SampleStore for Labelled<'_> {
    fn layout(&self) -> &SampleLayout {
        self.dataset.layout()
    }

    fn resolve_label(&self, text: &str) -> Result<usize> {
        self.dataset.register_label(text)
    }

    fn begin_record(&mut self, slot: Option<usize>) -> Result<RecordSlot> {
        self.dataset.begin_record(slot)
    }

    fn commit_record(&mut self, slot: usize, mut sample: Sample) -> Result<()> {
        let size = self.dataset.layout().output_len();
        let output = &mut sample.output;
        if size == 1 && self.class <= 1 {
            output.set(0, self.class as f64)?;
        } else if self.class < size {
            output.set_one_hot(self.class)?;
        } else {
            return Err(IngestError::ClassIndexOutOfRange {
                index: self.class as i64,
                size,
            });
        }
        sample.class_index = Some(self.class);
        self.dataset.commit_record(slot, sample)
    }

    fn discard_record(&mut self, slot: RecordSlot) -> Result<()> {
        self.dataset.discard_record(slot)
    }

    fn record_normalization(&mut self, input: NormalizationMap, output: NormalizationMap) {
        self.dataset.record_normalization(input, output);
    }
}
