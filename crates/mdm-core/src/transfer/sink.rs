//! Chunk handler that feeds one task's temp file and progress counters.

use std::time::{Duration, Instant};

use crate::event::{DownloadEvent, EventSink};
use crate::fetch::{ChunkHandler, FetchError};
use crate::progress::ProgressAggregator;
use crate::registry::TaskHandle;
use crate::storage::TempWriter;

pub(super) struct TransferSink<'a> {
    task: &'a TaskHandle,
    writer: TempWriter,
    progress: ProgressAggregator,
    interval: Duration,
    events: &'a EventSink,
}

impl<'a> TransferSink<'a> {
    pub(super) fn new(
        task: &'a TaskHandle,
        writer: TempWriter,
        interval: Duration,
        events: &'a EventSink,
    ) -> Self {
        Self {
            task,
            writer,
            progress: ProgressAggregator::new(None, interval, Instant::now()),
            interval,
            events,
        }
    }

    fn emit_progress(&mut self, now: Instant) {
        let sample = self.progress.sample(now);
        self.events.emit(DownloadEvent::progress(
            self.task.id(),
            self.task.artifact_id(),
            &sample,
        ));
    }

    /// Emit a last sample if bytes arrived since the previous one.
    pub(super) fn flush_progress(&mut self) {
        if self.progress.has_unreported() {
            self.emit_progress(Instant::now());
        }
    }

    pub(super) fn into_writer(self) -> TempWriter {
        self.writer
    }
}

impl ChunkHandler for TransferSink<'_> {
    fn begin(&mut self, declared_len: Option<u64>) -> Result<(), FetchError> {
        self.progress = ProgressAggregator::new(declared_len, self.interval, Instant::now());
        self.task.record_progress(0, self.progress.total());
        if let Some(len) = declared_len {
            self.writer.preallocate(len).map_err(FetchError::Storage)?;
        }
        Ok(())
    }

    fn chunk(&mut self, data: &[u8]) -> Result<(), FetchError> {
        if self.task.cancel_token().is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        self.writer.write_chunk(data).map_err(FetchError::Storage)?;
        self.progress.on_chunk(data.len());
        self.task
            .record_progress(self.writer.written(), self.progress.total());
        let now = Instant::now();
        if self.progress.should_emit(now) {
            self.emit_progress(now);
        }
        Ok(())
    }
}
