// rust/ingest-core/src/decode/parallel.rs

//! Line-oriented decoding with a bounded pool of record tasks.
//!
//! One producer loop reads raw lines, filters them and reserves each
//! accepted line's dataset slot in source order. Records are then decoded
//! on the blocking pool, each with its own cursor, and committed into the
//! reserved slot whenever they finish. Placement therefore follows line
//! order regardless of completion order.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::decoder::{decode_record, DecodeSummary};
use crate::chunk::{validate_tree, Chunk, SourceFamily};
use crate::cursor::Cursor;
use crate::dataset::{Dataset, RecordSink, SharedDataset};
use crate::error::{IngestError, Result};
use crate::source::{split_lines, LineFilter, LineSource, TextOptions};

/// Decodes delimited or fixed-width text, one record per accepted line.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    chunks: Arc<[Chunk]>,
    options: TextOptions,
    max_concurrency: usize,
    uses_labels: bool,
}

impl LineDecoder {
    /// Validates `chunks` as a text tree. Decoding is sequential until
    /// [`with_max_concurrency`](Self::with_max_concurrency) says otherwise.
    pub fn new(chunks: Vec<Chunk>, options: TextOptions) -> Result<Self> {
        validate_tree(&chunks, SourceFamily::Text)?;
        let uses_labels = chunks.iter().any(Chunk::uses_labels);
        Ok(Self {
            chunks: chunks.into(),
            options,
            max_concurrency: 1,
            uses_labels,
        })
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    /// Whether [`decode_lines`](Self::decode_lines) will fan records out.
    ///
    /// Trees that resolve labels stay sequential so first-seen label indices
    /// follow line order.
    pub fn is_concurrent(&self) -> bool {
        self.max_concurrency > 1 && !self.uses_labels
    }

    /// Decodes in-memory text on the calling thread.
    pub fn decode_str(&self, text: &str, dataset: &mut Dataset) -> Result<DecodeSummary> {
        let layout = dataset.layout().clone();
        let mut cursor = Cursor::new(&layout.input_shape, &layout.output_shape);
        let mut filter = self.options.filter();
        let mut summary = DecodeSummary::default();

        for line in split_lines(text) {
            summary.consumed += 1;
            if !filter.accept(line) {
                continue;
            }
            let mut source = self.options.open(line);
            summary.records += decode_record(&self.chunks, dataset, &mut cursor, &mut source)?;
        }
        summary.skipped = filter.skipped();
        Ok(summary)
    }

    /// Decodes every line `lines` produces into `dataset`.
    ///
    /// On failure the first error is returned once in-flight tasks have
    /// drained. Records that were committed stay in the dataset and the slots
    /// of records that failed are removed, so no empty placeholder is left.
    pub async fn decode_lines<L>(&self, lines: L, dataset: &SharedDataset) -> Result<DecodeSummary>
    where
        L: LineSource,
    {
        if !self.is_concurrent() {
            debug!(
                max_concurrency = self.max_concurrency,
                uses_labels = self.uses_labels,
                "Decoding lines sequentially"
            );
            return self.decode_sequential(lines, dataset).await;
        }

        let mut run = Dispatch {
            filter: self.options.filter(),
            in_flight: VecDeque::with_capacity(self.max_concurrency),
            failed: Vec::new(),
            first_error: None,
            summary: DecodeSummary::default(),
        };
        if let Err(e) = self.dispatch(lines, dataset, &mut run).await {
            run.first_error.get_or_insert(e);
        }
        while run.settle_oldest().await {}

        if let Some(e) = run.first_error {
            let failed = run.failed.len();
            if let Err(release) = dataset.release_slots(run.failed).await {
                warn!(error = %release, failed, "Failed to release slots of failed records");
            }
            return Err(e);
        }

        run.summary.skipped = run.filter.skipped();
        debug!(
            records = run.summary.records,
            skipped = run.summary.skipped,
            max_concurrency = self.max_concurrency,
            "Decoded lines concurrently"
        );
        Ok(run.summary)
    }

    async fn decode_sequential<L>(&self, mut lines: L, dataset: &SharedDataset) -> Result<DecodeSummary>
    where
        L: LineSource,
    {
        let layout = dataset.layout();
        let mut cursor = Cursor::new(&layout.input_shape, &layout.output_shape);
        let mut filter = self.options.filter();
        let mut summary = DecodeSummary::default();

        while let Some(line) = lines.next_line().await? {
            summary.consumed += 1;
            if !filter.accept(&line) {
                continue;
            }
            let mut source = self.options.open(&line);
            let mut guard = dataset.lock().await;
            summary.records += decode_record(&self.chunks, &mut *guard, &mut cursor, &mut source)?;
        }
        summary.skipped = filter.skipped();
        Ok(summary)
    }

    async fn dispatch<L>(&self, mut lines: L, dataset: &SharedDataset, run: &mut Dispatch) -> Result<()>
    where
        L: LineSource,
    {
        let layout = dataset.layout();
        // Only the task for the first record records normalization tags.
        let mut template = Cursor::new(&layout.input_shape, &layout.output_shape);

        while let Some(line) = lines.next_line().await? {
            run.summary.consumed += 1;
            if !run.filter.accept(&line) {
                continue;
            }

            if run.in_flight.len() >= self.max_concurrency {
                run.settle_oldest().await;
                if run.first_error.is_some() {
                    break;
                }
            }

            let slot = dataset.reserve_slot().await?;
            let cursor = template.clone();
            if template.is_recording() {
                let _ = template.take_normalization();
            }
            run.in_flight
                .push_back((slot, self.spawn_record(line, slot, cursor, dataset)));
            run.summary.records += 1;
        }
        Ok(())
    }

    fn spawn_record(
        &self,
        line: String,
        slot: usize,
        mut cursor: Cursor,
        dataset: &SharedDataset,
    ) -> JoinHandle<Result<()>> {
        let chunks = Arc::clone(&self.chunks);
        let options = self.options.clone();
        let mut sink = RecordSink::new(dataset.layout().clone(), Arc::clone(dataset.labels()), slot);
        let dataset = dataset.clone();

        tokio::spawn(async move {
            let sink = tokio::task::spawn_blocking(move || -> Result<RecordSink> {
                let mut source = options.open(&line);
                decode_record(&chunks, &mut sink, &mut cursor, &mut source)?;
                Ok(sink)
            })
            .await
            .map_err(|e| IngestError::task(format!("record {slot}: {e}")))??;

            let (sample, normalization) = sink.into_parts();
            if let Some(sample) = sample {
                dataset.commit_sample(sample, slot).await?;
            }
            if let Some((input, output)) = normalization {
                dataset.set_normalization(input, output).await;
            }
            Ok(())
        })
    }
}

struct Dispatch {
    filter: LineFilter,
    /// Reserved slot and task of every record not yet joined, oldest first.
    in_flight: VecDeque<(usize, JoinHandle<Result<()>>)>,
    /// Slots whose record task failed.
    failed: Vec<usize>,
    first_error: Option<IngestError>,
    summary: DecodeSummary,
}

impl Dispatch {
    /// Joins the oldest task, noting its slot if it failed. Returns false
    /// when nothing was in flight.
    async fn settle_oldest(&mut self) -> bool {
        let Some((slot, handle)) = self.in_flight.pop_front() else {
            return false;
        };
        if let Err(e) = join(handle).await {
            debug!(slot, error = %e, "Record task failed");
            self.failed.push(slot);
            self.first_error.get_or_insert(e);
        }
        true
    }
}

async fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle
        .await
        .map_err(|e| IngestError::task(format!("record task failed: {e}")))?
}
