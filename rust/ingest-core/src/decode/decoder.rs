// rust/ingest-core/src/decode/decoder.rs

//! The chunk interpreter.

use tracing::{debug, warn};

use crate::chunk::{validate_tree, Channel, Chunk, Format, ScalingMode, SourceFamily, TargetSelector};
use crate::cursor::Cursor;
use crate::dataset::{Dataset, RecordSlot, Sample, SampleStore};
use crate::error::{IngestError, Result, TensorRole};
use crate::source::{BinarySource, ByteSource, ChunkSource};

/// What a decode run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Records committed to the dataset.
    pub records: usize,
    /// Source units read: bytes for binary sources, raw lines for text.
    pub consumed: usize,
    /// Raw lines rejected as header, comment or blank.
    pub skipped: usize,
}

#[derive(Debug)]
struct ActiveRecord {
    slot: RecordSlot,
    sample: Sample,
}

/// Walks a chunk tree against a source, writing into a [`SampleStore`].
///
/// A record is allocated lazily on its first write, or up front when the
/// caller (or an eager record repeat) asks for it. Every scalar store is
/// range-checked against the declared shape before it happens.
pub struct ChunkDecoder<'a, S: SampleStore + ?Sized> {
    store: &'a mut S,
    cursor: &'a mut Cursor,
    active: Option<ActiveRecord>,
    next_slot: Option<usize>,
    last_slot: Option<usize>,
    committed: usize,
}

impl<'a, S: SampleStore + ?Sized> ChunkDecoder<'a, S> {
    pub fn new(store: &'a mut S, cursor: &'a mut Cursor) -> Self {
        Self {
            store,
            cursor,
            active: None,
            next_slot: None,
            last_slot: None,
            committed: 0,
        }
    }

    /// Allocates the active record now instead of on its first write.
    pub fn begin(&mut self) -> Result<()> {
        self.sample_mut().map(|_| ())
    }

    /// Runs every chunk in order, returning the source units consumed.
    pub fn run<C>(&mut self, chunks: &[Chunk], source: &mut C) -> Result<usize>
    where
        C: ChunkSource + ?Sized,
    {
        let mut consumed = 0;
        for chunk in chunks {
            consumed += self.decode(chunk, source)?;
        }
        Ok(consumed)
    }

    /// Runs the tree and commits the final record. On failure the record
    /// being decoded is released before the error is returned.
    pub fn execute<C>(mut self, chunks: &[Chunk], source: &mut C) -> Result<usize>
    where
        C: ChunkSource + ?Sized,
    {
        if let Err(e) = self.run(chunks, source) {
            if let Err(discard) = self.abandon() {
                warn!(error = %discard, "Failed to release the record being decoded");
            }
            return Err(e);
        }
        self.finish()
    }

    /// Decodes a single chunk, returning the source units it consumed.
    pub fn decode<C>(&mut self, chunk: &Chunk, source: &mut C) -> Result<usize>
    where
        C: ChunkSource + ?Sized,
    {
        let before = source.consumed();
        match chunk {
            Chunk::Skip {
                count,
                format,
                width,
            } => source.skip(*format, *count, *width)?,
            Chunk::ClassIndex { format, width } => {
                let value = source.read_number(*format, *width)?;
                self.set_class(value as i64)?;
            }
            Chunk::ClassLabel { format, width } => {
                let index = if *format == Format::TextLabel {
                    let text = source.read_text(*width)?;
                    self.store.resolve_label(&text)? as i64
                } else {
                    source.read_number(*format, *width)? as i64
                };
                self.set_class(index)?;
            }
            Chunk::OutputLabel { width } => {
                let text = source.read_text(*width)?;
                let index = self.store.resolve_label(&text)?;
                self.set_class(index as i64)?;
            }
            Chunk::InputFeature {
                count,
                format,
                scaling,
                width,
            } => self.features(TensorRole::Input, *count, *format, *scaling, *width, source)?,
            Chunk::OutputFeature {
                count,
                format,
                scaling,
                width,
            } => self.features(TensorRole::Output, *count, *format, *scaling, *width, source)?,
            Chunk::Channel {
                channel,
                format,
                scaling,
            } => self.channel(*channel, *format, *scaling, source)?,
            Chunk::Repeat {
                times,
                target: Format::Record,
                eager,
                children,
                ..
            } => self.repeat_records(*times, *eager, children, source)?,
            Chunk::Repeat {
                times,
                target,
                selector,
                children,
                ..
            } => self.repeat_dimension(*times, *target, *selector, children, source)?,
            Chunk::SetDimension {
                target: Format::Record,
                value,
                ..
            } => self.switch_record(*value)?,
            Chunk::SetDimension {
                target,
                selector,
                value,
            } => self.set_dimension(*target, *selector, *value)?,
        }
        Ok(source.consumed() - before)
    }

    /// Commits the active record, if any, and returns the number of records
    /// committed over the decoder's lifetime.
    pub fn finish(mut self) -> Result<usize> {
        self.commit_active()?;
        Ok(self.committed)
    }

    /// Releases the active record without committing it.
    pub fn abandon(&mut self) -> Result<()> {
        match self.active.take() {
            Some(record) => self.store.discard_record(record.slot),
            None => Ok(()),
        }
    }

    fn sample_mut(&mut self) -> Result<&mut Sample> {
        let record = match self.active.take() {
            Some(record) => record,
            None => {
                let slot = self.store.begin_record(self.next_slot.take())?;
                self.last_slot = Some(slot.index);
                ActiveRecord {
                    slot,
                    sample: self.store.layout().empty_sample(),
                }
            }
        };
        Ok(&mut self.active.insert(record).sample)
    }

    fn commit_active(&mut self) -> Result<()> {
        let Some(record) = self.active.take() else {
            return Ok(());
        };
        self.store.commit_record(record.slot.index, record.sample)?;
        self.committed += 1;
        if self.cursor.is_recording() {
            let (input, output) = self.cursor.take_normalization();
            self.store.record_normalization(input, output);
        }
        Ok(())
    }

    /// Range check, store and tag a single value at the cursor position.
    fn store_value(&mut self, role: TensorRole, value: f64, scaling: ScalingMode) -> Result<()> {
        let index = self.cursor.tensor(role).checked_index(role)?;
        self.sample_mut()?.tensor_mut(role).set(index, value)?;
        self.cursor.tag(role, index, scaling);
        Ok(())
    }

    fn features<C>(
        &mut self,
        role: TensorRole,
        count: usize,
        format: Format,
        scaling: ScalingMode,
        width: Option<usize>,
        source: &mut C,
    ) -> Result<()>
    where
        C: ChunkSource + ?Sized,
    {
        let values = source.read_numbers(format, count, width)?;
        for value in values {
            self.store_value(role, scale(value, format, scaling), scaling)?;
            self.cursor.tensor_mut(role).advance_last(1)?;
        }
        Ok(())
    }

    // Channel chunks pin dimension 2 and then walk pixels along dimension 0.
    fn channel<C>(
        &mut self,
        channel: Channel,
        format: Format,
        scaling: ScalingMode,
        source: &mut C,
    ) -> Result<()>
    where
        C: ChunkSource + ?Sized,
    {
        let value = source.read_number(format, None)?;
        self.cursor
            .tensor_mut(TensorRole::Input)
            .set(2, channel.index())?;
        self.store_value(TensorRole::Input, scale(value, format, scaling), scaling)?;
        self.cursor.tensor_mut(TensorRole::Input).increment(0, 1)
    }

    fn set_class(&mut self, index: i64) -> Result<()> {
        let size = self.store.layout().output_len();
        let sample = self.sample_mut()?;
        let output = sample.tensor_mut(TensorRole::Output);
        if size == 1 && (index == 0 || index == 1) {
            output.set(0, index as f64)?;
        } else if index >= 0 && (index as usize) < size {
            output.set_one_hot(index as usize)?;
        } else {
            return Err(IngestError::ClassIndexOutOfRange { index, size });
        }
        sample.class_index = Some(index as usize);
        Ok(())
    }

    fn repeat_records<C>(
        &mut self,
        times: Option<usize>,
        eager: bool,
        children: &[Chunk],
        source: &mut C,
    ) -> Result<()>
    where
        C: ChunkSource + ?Sized,
    {
        // A record opened by earlier chunks is finished before the first iteration.
        self.commit_active()?;

        let mut iteration = 0;
        loop {
            match times {
                Some(n) if iteration >= n => break,
                None if source.is_exhausted() => break,
                _ => {}
            }
            self.cursor.reset();
            if eager {
                self.begin()?;
            }

            match self.run(children, source) {
                Ok(0) if times.is_none() => {
                    debug!(iteration, "Record repeat stopped reading; ending it");
                    self.abandon()?;
                    break;
                }
                Ok(_) => {}
                Err(e) if times.is_none() && e.is_underrun() && self.cursor.position_sum() == 0 => {
                    debug!(iteration, "Source ended on a record boundary");
                    self.abandon()?;
                    break;
                }
                Err(e) => return Err(e),
            }
            self.commit_active()?;
            iteration += 1;
        }
        Ok(())
    }

    fn repeat_dimension<C>(
        &mut self,
        times: Option<usize>,
        target: Format,
        selector: TargetSelector,
        children: &[Chunk],
        source: &mut C,
    ) -> Result<()>
    where
        C: ChunkSource + ?Sized,
    {
        let Format::Dimension(dim) = target else {
            return Err(IngestError::invalid_chunk(format!(
                "repeat must target 'dim:N' or 'record', not {target}"
            )));
        };
        let mut iteration = 0;
        loop {
            match times {
                Some(n) if iteration >= n => break,
                None if source.is_exhausted() => break,
                _ => {}
            }
            let consumed = self.run(children, source)?;
            if times.is_none() && consumed == 0 {
                debug!(dim, iteration, "Dimension repeat stopped reading; ending it");
                break;
            }
            for &role in selector.roles() {
                self.cursor.tensor_mut(role).increment(dim, 1)?;
            }
            iteration += 1;
        }
        Ok(())
    }

    /// Commits the current record and opens another: at slot `value` when it
    /// is non-negative, otherwise at the slot after the last one used. The
    /// store refuses slots past its end.
    fn switch_record(&mut self, value: i64) -> Result<()> {
        self.commit_active()?;
        self.cursor.reset();
        self.next_slot = if value >= 0 {
            Some(usize::try_from(value).map_err(|_| {
                IngestError::invalid_chunk(format!("sample index {value} is not addressable"))
            })?)
        } else {
            self.last_slot.map(|slot| slot + 1)
        };
        self.begin()
    }

    fn set_dimension(&mut self, target: Format, selector: TargetSelector, value: i64) -> Result<()> {
        let Format::Dimension(dim) = target else {
            return Err(IngestError::invalid_chunk(format!(
                "set-dimension must target 'dim:N' or 'record', not {target}"
            )));
        };
        for &role in selector.roles() {
            let cursor = self.cursor.tensor_mut(role);
            if value < 0 {
                cursor.increment(dim, 1)?;
            } else {
                cursor.set(dim, value as usize)?;
            }
        }
        Ok(())
    }
}

fn scale(value: f64, format: Format, scaling: ScalingMode) -> f64 {
    match (scaling, format.max_magnitude()) {
        (ScalingMode::UnitInterval, Some(max)) => value / max,
        _ => value,
    }
}

/// Decodes one self-contained record, such as a text line or an image.
///
/// The cursor is reset and a record is allocated before any chunk runs, so
/// every call produces exactly one committed sample on success.
pub(crate) fn decode_record<S, C>(
    chunks: &[Chunk],
    store: &mut S,
    cursor: &mut Cursor,
    source: &mut C,
) -> Result<usize>
where
    S: SampleStore + ?Sized,
    C: ChunkSource + ?Sized,
{
    cursor.reset();
    let mut decoder = ChunkDecoder::new(store, cursor);
    decoder.begin()?;
    decoder.execute(chunks, source)
}

/// Decodes binary streams and byte buffers into a dataset.
#[derive(Debug, Clone)]
pub struct BinaryDecoder {
    chunks: Vec<Chunk>,
    header_bytes: usize,
}

impl BinaryDecoder {
    /// Validates `chunks` as a binary tree.
    pub fn new(chunks: Vec<Chunk>) -> Result<Self> {
        validate_tree(&chunks, SourceFamily::Binary)?;
        Ok(Self {
            chunks,
            header_bytes: 0,
        })
    }

    /// Bytes skipped before the tree runs.
    #[must_use]
    pub fn with_header_bytes(mut self, header_bytes: usize) -> Self {
        self.header_bytes = header_bytes;
        self
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn decode<B: ByteSource>(&self, bytes: B, dataset: &mut Dataset) -> Result<DecodeSummary> {
        self.decode_into(bytes, dataset)
    }

    /// Decodes into any store, e.g. a single-record sink.
    pub fn decode_into<B, S>(&self, bytes: B, store: &mut S) -> Result<DecodeSummary>
    where
        B: ByteSource,
        S: SampleStore + ?Sized,
    {
        let layout = store.layout().clone();
        let mut cursor = Cursor::new(&layout.input_shape, &layout.output_shape);
        let mut source = BinarySource::with_header(bytes, self.header_bytes)?;

        let records = ChunkDecoder::new(store, &mut cursor).execute(&self.chunks, &mut source)?;
        let summary = DecodeSummary {
            records,
            consumed: source.consumed(),
            skipped: 0,
        };
        debug!(records, bytes = summary.consumed, "Decoded binary source");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ByteOrder;
    use crate::dataset::{RecordSink, SampleLayout};
    use crate::source::{ByteBuffer, Delimiter, DelimitedLine};
    use crate::tensor::DType;
    use proptest::prelude::*;

    fn mnist_tree() -> Vec<Chunk> {
        vec![
            Chunk::skip(16, Format::U8),
            Chunk::repeat_records(vec![Chunk::repeat_dim(
                28,
                0,
                vec![Chunk::input(28, Format::U8), Chunk::set_dim(1, 0)],
            )]),
        ]
    }

    fn mnist_dataset() -> Dataset {
        Dataset::new(SampleLayout::new(&[28, 28], &[1]).with_dtypes(DType::U8, DType::U8))
            .unwrap()
    }

    fn synthetic_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_two_record_image_stream() {
        let data = synthetic_bytes(2 * (16 + 28 * 28));
        let mut dataset = mnist_dataset();

        let summary = BinaryDecoder::new(mnist_tree())
            .unwrap()
            .decode(ByteBuffer::new(data.clone()), &mut dataset)
            .unwrap();

        // 16 header bytes, two full records, then 16 bytes that end on a boundary.
        assert_eq!(summary.records, 2);
        assert_eq!(dataset.num_samples(), 2);
        for (i, sample) in dataset.samples().iter().enumerate() {
            let start = 16 + i * 784;
            let expected: Vec<f64> = data[start..start + 784].iter().map(|&b| b as f64).collect();
            assert_eq!(sample.input.shape(), &[28, 28]);
            assert_eq!(sample.input.as_slice(), expected.as_slice());
        }
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_sample() {
        let tree = vec![Chunk::repeat_records(vec![
            Chunk::input(3, Format::U8),
            Chunk::class_index(Format::U8),
        ])];
        let mut dataset = Dataset::new(SampleLayout::new(&[3], &[4])).unwrap();
        let data = vec![1u8, 2, 3, 0, 4, 5, 6, 3, 7, 8, 9, 1];

        let summary = BinaryDecoder::new(tree.clone())
            .unwrap()
            .decode(ByteBuffer::new(data.clone()), &mut dataset)
            .unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.consumed, 12);
        assert_eq!(dataset.sample(1).unwrap().class_index, Some(3));
        assert_eq!(dataset.sample(1).unwrap().output.as_slice(), &[0.0, 0.0, 0.0, 1.0]);

        // Eager allocation lands on the same samples.
        let eager = vec![tree[0].clone().eager()];
        let mut dataset = Dataset::new(SampleLayout::new(&[3], &[4])).unwrap();
        BinaryDecoder::new(eager)
            .unwrap()
            .decode(ByteBuffer::new(data), &mut dataset)
            .unwrap();
        assert_eq!(dataset.num_samples(), 3);
    }

    #[test]
    fn test_mid_record_underrun_is_fatal() {
        let tree = vec![Chunk::repeat_records(vec![Chunk::input(4, Format::U8)])];
        let mut dataset = Dataset::new(SampleLayout::new(&[4], &[1])).unwrap();

        // The second record is short. Reads are all-or-nothing, so the
        // cursor is still at the origin: this is a boundary, not an error.
        let summary = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2, 3, 4, 5, 6]), &mut dataset)
            .unwrap();
        assert_eq!(summary.records, 1);

        let tree = vec![Chunk::repeat_records(vec![
            Chunk::input(2, Format::U8),
            Chunk::input(2, Format::U8),
        ])];
        let mut dataset = Dataset::new(SampleLayout::new(&[4], &[1])).unwrap();
        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2, 3, 4, 5, 6, 7]), &mut dataset)
            .unwrap_err();
        assert!(err.is_underrun());
        assert_eq!(dataset.num_samples(), 1);
    }

    #[test]
    fn test_round_trip_big_endian_records() {
        let records: Vec<([u16; 3], u8)> = vec![([1, 256, 65535], 2), ([7, 0, 4096], 0)];
        let mut data = Vec::new();
        for (values, class) in &records {
            data.push(*class);
            for v in values {
                data.extend_from_slice(&v.to_be_bytes());
            }
        }

        let tree = vec![Chunk::repeat_records(vec![
            Chunk::class_index(Format::U8),
            Chunk::input(3, Format::U16(ByteOrder::Big)),
        ])];
        let mut dataset = Dataset::new(
            SampleLayout::new(&[3], &[3]).with_dtypes(DType::U16, DType::U8),
        )
        .unwrap();
        BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(data), &mut dataset)
            .unwrap();

        assert_eq!(dataset.num_samples(), records.len());
        for (sample, (values, class)) in dataset.samples().iter().zip(&records) {
            let expected: Vec<f64> = values.iter().map(|&v| v as f64).collect();
            assert_eq!(sample.input.as_slice(), expected.as_slice());
            assert_eq!(sample.class_index, Some(*class as usize));
            assert_eq!(sample.output.argmax(), Some(*class as usize));
        }
    }

    #[test]
    fn test_unit_interval_and_tags() {
        let tree = vec![Chunk::repeat_records(vec![
            Chunk::input(1, Format::U8).scaled(ScalingMode::UnitInterval),
            Chunk::input(1, Format::U8).scaled(ScalingMode::MinMax),
        ])];
        let mut dataset = Dataset::new(SampleLayout::new(&[2], &[1])).unwrap();
        BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![255u8, 10, 51, 30]), &mut dataset)
            .unwrap();

        assert_eq!(dataset.sample(0).unwrap().input.as_slice(), &[1.0, 10.0]);
        assert!((dataset.sample(1).unwrap().input.as_slice()[0] - 0.2).abs() < 1e-6);
        let (input_tags, _) = dataset.normalization();
        assert_eq!(input_tags, &vec![None, Some(ScalingMode::MinMax)]);
    }

    #[test]
    fn test_channels_walk_pixels() {
        let tree = vec![Chunk::channel(Channel::Red, Format::U8)];
        let mut dataset = Dataset::new(SampleLayout::new(&[3], &[1])).unwrap();
        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8]), &mut dataset)
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidChunk { .. }));

        let tree = vec![
            Chunk::channel(Channel::Red, Format::U8),
            Chunk::channel(Channel::Green, Format::U8),
            Chunk::channel(Channel::Blue, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[3, 1, 3], &[1])).unwrap();
        BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![10u8, 20, 30]), &mut dataset)
            .unwrap();
        let input = &dataset.sample(0).unwrap().input;
        assert_eq!(input.get_at(&[0, 0, 0]), Some(10.0));
        assert_eq!(input.get_at(&[1, 0, 1]), Some(20.0));
        assert_eq!(input.get_at(&[2, 0, 2]), Some(30.0));
    }

    #[test]
    fn test_class_index_bounds() {
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[1])).unwrap();
        let tree = vec![Chunk::class_index(Format::U8)];
        BinaryDecoder::new(tree.clone())
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8]), &mut dataset)
            .unwrap();
        assert_eq!(dataset.sample(0).unwrap().output.as_slice(), &[1.0]);

        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![2u8]), &mut dataset)
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::ClassIndexOutOfRange { index: 2, size: 1 }
        ));
        assert_eq!(dataset.num_samples(), 1);
    }

    #[test]
    fn test_explicit_sample_switching() {
        let tree = vec![
            Chunk::input(1, Format::U8),
            Chunk::new_sample(),
            Chunk::input(1, Format::U8),
            Chunk::sample_at(0),
            Chunk::input(1, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[1])).unwrap();
        let summary = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![4u8, 5, 6]), &mut dataset)
            .unwrap();
        // Slot 0 is rewritten from scratch by the last record.
        assert_eq!(summary.records, 3);
        assert_eq!(dataset.num_samples(), 2);
        assert_eq!(dataset.sample(0).unwrap().input.as_slice(), &[6.0]);
        assert_eq!(dataset.sample(1).unwrap().input.as_slice(), &[5.0]);
    }

    #[test]
    fn test_switching_past_the_end_is_refused() {
        let tree = vec![
            Chunk::input(1, Format::U8),
            Chunk::sample_at(5),
            Chunk::input(1, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[1])).unwrap();
        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2]), &mut dataset)
            .unwrap_err();
        assert!(matches!(err, IngestError::IndexOutOfBounds { index: 5, len: 1 }));
        assert_eq!(dataset.num_samples(), 1);

        let tree = vec![
            Chunk::input(1, Format::U8),
            Chunk::SetDimension {
                target: Format::Record,
                selector: TargetSelector::Both,
                value: i64::MAX,
            },
            Chunk::input(1, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[1])).unwrap();
        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![3u8, 4]), &mut dataset)
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::IndexOutOfBounds { .. } | IngestError::InvalidChunk { .. }
        ));
        assert_eq!(dataset.num_samples(), 1);
        assert_eq!(dataset.sample(0).unwrap().input.as_slice(), &[3.0]);
    }

    #[test]
    fn test_failed_rewrite_keeps_committed_sample() {
        let tree = vec![
            Chunk::input(1, Format::U8),
            Chunk::sample_at(0),
            Chunk::input(4, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[4], &[1])).unwrap();
        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![7u8, 1]), &mut dataset)
            .unwrap_err();
        assert!(err.is_underrun());
        assert_eq!(dataset.num_samples(), 1);
        assert_eq!(dataset.sample(0).unwrap().input.as_slice(), &[7.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_failed_new_sample_is_released() {
        let tree = vec![
            Chunk::input(1, Format::U8),
            Chunk::new_sample(),
            Chunk::input(4, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[4], &[1])).unwrap();
        let err = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![7u8, 1]), &mut dataset)
            .unwrap_err();
        assert!(err.is_underrun());
        assert_eq!(dataset.num_samples(), 1);
        assert_eq!(dataset.sample(0).unwrap().input.as_slice(), &[7.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_selectors_move_both_cursors() {
        let tree = vec![Chunk::repeat_dim(
            2,
            0,
            vec![
                Chunk::input(2, Format::U8),
                Chunk::output(1, Format::U8),
                Chunk::set_dim(1, 0).on(TargetSelector::Both),
            ],
        )
        .on(TargetSelector::Both)];
        let mut dataset = Dataset::new(SampleLayout::new(&[2, 2], &[2, 1])).unwrap();
        BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2, 3, 4, 5, 6]), &mut dataset)
            .unwrap();
        let sample = dataset.sample(0).unwrap();
        assert_eq!(sample.input.as_slice(), &[1.0, 2.0, 4.0, 5.0]);
        assert_eq!(sample.output.as_slice(), &[3.0, 6.0]);

        // An output-only move leaves the input cursor alone.
        let tree = vec![
            Chunk::set_dim(0, 1).on(TargetSelector::Output),
            Chunk::output(1, Format::U8),
            Chunk::input(1, Format::U8),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[2, 1])).unwrap();
        BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![9u8, 8]), &mut dataset)
            .unwrap();
        let sample = dataset.sample(0).unwrap();
        assert_eq!(sample.output.as_slice(), &[0.0, 9.0]);
        assert_eq!(sample.input.as_slice(), &[8.0]);
    }

    fn until_exhausted(target: Format, children: Vec<Chunk>) -> Chunk {
        Chunk::Repeat {
            times: None,
            target,
            selector: TargetSelector::Input,
            eager: false,
            children,
        }
    }

    #[test]
    fn test_unbounded_dimension_repeat() {
        let tree = vec![until_exhausted(
            Format::Dimension(0),
            vec![Chunk::input(2, Format::U8), Chunk::set_dim(1, 0)],
        )];
        let mut dataset = Dataset::new(SampleLayout::new(&[3, 2], &[1])).unwrap();
        let summary = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2, 3, 4, 5, 6]), &mut dataset)
            .unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(
            dataset.sample(0).unwrap().input.as_slice(),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_unbounded_repeats_stop_when_nothing_is_read() {
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[1])).unwrap();
        let tree = vec![until_exhausted(Format::Record, vec![Chunk::skip(0, Format::U8)])];
        let summary = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2]), &mut dataset)
            .unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(dataset.num_samples(), 0);

        let tree = vec![
            Chunk::input(1, Format::U8),
            until_exhausted(Format::Dimension(0), vec![Chunk::skip(0, Format::U8)]),
        ];
        let summary = BinaryDecoder::new(tree)
            .unwrap()
            .decode(ByteBuffer::new(vec![1u8, 2]), &mut dataset)
            .unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.consumed, 1);
    }

    #[test]
    fn test_text_line_scenario() {
        let tree = vec![
            Chunk::input(1, Format::TextFloat),
            Chunk::input(1, Format::TextFloat),
            Chunk::output(1, Format::TextFloat),
        ];
        let mut dataset = Dataset::new(SampleLayout::new(&[2], &[1])).unwrap();
        let mut cursor = Cursor::new(&[2], &[1]);
        let mut line = DelimitedLine::new("1.0 2.0 5.0", Delimiter::Whitespace);

        let records = decode_record(&tree, &mut dataset, &mut cursor, &mut line).unwrap();
        assert_eq!(records, 1);
        let sample = dataset.sample(0).unwrap();
        assert_eq!(sample.input.as_slice(), &[1.0, 2.0]);
        assert_eq!(sample.output.as_slice(), &[5.0]);
    }

    #[test]
    fn test_decode_reports_items_consumed() {
        let mut dataset = Dataset::new(SampleLayout::new(&[3], &[1])).unwrap();
        let mut cursor = Cursor::new(&[3], &[1]);
        let mut line = DelimitedLine::new("1,2,3,x", Delimiter::Comma);
        let mut decoder = ChunkDecoder::new(&mut dataset, &mut cursor);

        assert_eq!(decoder.decode(&Chunk::input(2, Format::TextInt), &mut line).unwrap(), 2);
        assert!(matches!(
            decoder.decode(&Chunk::input(2, Format::TextInt), &mut line),
            Err(IngestError::InvalidNumericText { .. })
        ));
        assert_eq!(decoder.decode(&Chunk::input(1, Format::TextInt), &mut line).unwrap(), 1);
        assert_eq!(decoder.finish().unwrap(), 1);
        assert_eq!(dataset.sample(0).unwrap().input.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_labels_resolve_through_store() {
        let tree = vec![Chunk::output_label().with_width(4), Chunk::input(1, Format::U8)];
        let mut dataset = Dataset::new(SampleLayout::new(&[1], &[3])).unwrap();
        let records: [&[u8]; 3] = [b"Cat \x01", b"dog\0\x02", b"cat \x03"];
        for record in records {
            BinaryDecoder::new(tree.clone())
                .unwrap()
                .decode(ByteBuffer::new(record.to_vec()), &mut dataset)
                .unwrap();
        }
        let classes: Vec<_> = dataset.samples().iter().map(|s| s.class_index).collect();
        assert_eq!(classes, vec![Some(0), Some(1), Some(0)]);
        assert_eq!(dataset.labels().labels(), vec!["Cat", "dog"]);
    }

    #[test]
    fn test_record_sink_receives_single_record() {
        let dataset = Dataset::new(SampleLayout::new(&[2], &[1])).unwrap();
        let mut sink = RecordSink::new(dataset.layout().clone(), dataset.labels().clone(), 4);
        BinaryDecoder::new(vec![Chunk::input(2, Format::U8)])
            .unwrap()
            .decode_into(ByteBuffer::new(vec![9u8, 8]), &mut sink)
            .unwrap();
        let (sample, tags) = sink.into_parts();
        assert_eq!(sample.unwrap().input.as_slice(), &[9.0, 8.0]);
        assert!(tags.is_some());
    }

    proptest! {
        #[test]
        fn prop_overrunning_features_never_write_out_of_bounds(
            rows in 1usize..4,
            cols in 1usize..8,
            count in 1usize..16,
        ) {
            let layout = SampleLayout::new(&[rows, cols], &[1]);
            let mut dataset = Dataset::new(layout).unwrap();
            let tree = vec![Chunk::input(count, Format::U8)];
            let data: Vec<u8> = (0..count as u8).map(|b| b.wrapping_add(1)).collect();

            let result = BinaryDecoder::new(tree)
                .unwrap()
                .decode(ByteBuffer::new(data), &mut dataset);

            if count > cols {
                let is_out_of_range =
                    matches!(result, Err(IngestError::LocationOutOfRange { .. }));
                prop_assert!(is_out_of_range);
                prop_assert_eq!(dataset.num_samples(), 0);
            } else {
                prop_assert!(result.is_ok());
                let input = &dataset.sample(0).unwrap().input;
                prop_assert_eq!(input.len(), rows * cols);
                let written = input.as_slice().iter().filter(|&&v| v != 0.0).count();
                prop_assert_eq!(written, count);
            }
        }
    }
}
