//! Encodes records and writes them to a provisioned index in bounded batches.
//!
//! Encoding runs on tokio's blocking pool, at most `encode_concurrency`
//! records at a time, and results come back in input order. The whole record
//! set is encoded before anything is sent. Upserts are strictly sequential:
//! batch `n + 1` is only sent after batch `n` succeeded or gave up.

use std::sync::Arc;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vecload_core::config::{FailurePolicy, IngestSettings};
use vecload_core::error::{Error, Result};
use vecload_core::traits::{Embedder, VectorIndexClient};
use vecload_core::types::{Batch, EmbeddingVector, IndexHandle, Record, VectorItem};
use vecload_core::ServiceError;

use crate::report::{BatchFailure, RunOutcome, RunReport};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub batch_size: usize,
    pub encode_concurrency: usize,
    pub retry: RetryPolicy,
    pub on_failure: FailurePolicy,
    pub show_progress: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            encode_concurrency: 4,
            retry: RetryPolicy::default(),
            on_failure: FailurePolicy::Halt,
            show_progress: false,
        }
    }
}

impl DriverSettings {
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            encode_concurrency: settings.encode_concurrency.max(1),
            retry: RetryPolicy::from_settings(settings),
            on_failure: settings.on_batch_failure,
            show_progress: false,
        }
    }
}

pub struct BatchUpsertDriver {
    embedder: Arc<dyn Embedder>,
    client: Arc<dyn VectorIndexClient>,
    settings: DriverSettings,
    cancel: Option<watch::Receiver<bool>>,
}

impl BatchUpsertDriver {
    pub fn new(embedder: Arc<dyn Embedder>, client: Arc<dyn VectorIndexClient>, settings: DriverSettings) -> Self {
        Self { embedder, client, settings, cancel: None }
    }

    /// Stops the run once `true` is sent on the channel: during encoding
    /// nothing is sent, afterwards the batch in flight completes and no
    /// further batch starts.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Encodes and upserts `records` into `handle`.
    ///
    /// Every record is encoded and its vector checked against
    /// `handle.dimension` before the first batch is sent, so a mismatch
    /// aborts the run with nothing written. Encode failures are skipped and
    /// batch failures are reported.
    pub async fn run(&self, records: Vec<Record>, handle: &IndexHandle) -> Result<RunReport> {
        let mut report = RunReport::new(handle.name.clone());
        let batch_size = self.settings.batch_size.max(1);

        let Some(items) = self.encode_all(records, handle, &mut report).await? else {
            warn!("cancellation requested during encoding, nothing sent");
            report.outcome = RunOutcome::Cancelled;
            return Ok(report);
        };
        if items.is_empty() {
            info!("No valid records with IDs found to upsert.");
            report.outcome = RunOutcome::NothingToUpsert;
            return Ok(report);
        }

        let mut items = items.into_iter();
        let mut next_batch = 1usize;
        let mut stopped = None;
        loop {
            let chunk: Vec<VectorItem> = items.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            let batch = Batch { index: next_batch, items: chunk };
            next_batch += 1;
            stopped = self.flush(batch, handle, &mut report).await;
            if stopped.is_some() {
                break;
            }
        }

        report.outcome = match stopped {
            Some(outcome) => outcome,
            None if !report.failed_batches.is_empty() => RunOutcome::CompletedWithFailures,
            None => RunOutcome::Completed,
        };
        Ok(report)
    }

    /// Encodes all records in input order. `Ok(None)` when cancelled.
    async fn encode_all(
        &self,
        records: Vec<Record>,
        handle: &IndexHandle,
        report: &mut RunReport,
    ) -> Result<Option<Vec<VectorItem>>> {
        let progress = self.progress_bar(records.len());
        let mut items = Vec::with_capacity(records.len());

        let embedder = Arc::clone(&self.embedder);
        let mut encoded = futures::stream::iter(records)
            .map(|record| {
                let embedder = Arc::clone(&embedder);
                async move {
                    let text = record.content.clone();
                    let result = tokio::task::spawn_blocking(move || embedder.embed_text(&text)).await;
                    (record, result)
                }
            })
            .buffered(self.settings.encode_concurrency.max(1));

        while let Some((record, result)) = encoded.next().await {
            progress.inc(1);
            if self.cancelled() {
                progress.abandon();
                return Ok(None);
            }
            let values = match result {
                Ok(Ok(values)) => values,
                Ok(Err(e)) => {
                    warn!(id = %record.id, error = %format!("{e:#}"), "failed to embed record, skipping it");
                    report.skipped_encode += 1;
                    continue;
                }
                Err(join) => {
                    warn!(id = %record.id, error = %join, "embedding task failed, skipping record");
                    report.skipped_encode += 1;
                    continue;
                }
            };
            let vector = EmbeddingVector { id: record.id.clone(), values };
            if vector.dimension() != handle.dimension {
                progress.abandon();
                return Err(Error::DimensionMismatch {
                    expected: handle.dimension,
                    actual: vector.dimension(),
                    record: Some(record.id),
                });
            }
            items.push(VectorItem::from_record(&record, vector));
        }
        progress.finish_and_clear();
        debug!(encoded = items.len(), skipped = report.skipped_encode, "encoding finished");
        Ok(Some(items))
    }

    /// Sends one batch, retrying per the policy. Returns the outcome that
    /// ends the run, if any.
    async fn flush(&self, batch: Batch, handle: &IndexHandle, report: &mut RunReport) -> Option<RunOutcome> {
        if self.cancelled() {
            warn!(batch = batch.index, "cancellation requested, batch not sent");
            return Some(RunOutcome::Cancelled);
        }
        let policy = self.settings.retry;
        let mut attempt = 0u32;
        loop {
            match self.client.upsert(handle, &batch.items).await {
                Ok(count) => {
                    if count != batch.len() {
                        debug!(batch = batch.index, sent = batch.len(), acknowledged = count, "upsert count differs");
                    }
                    report.upserted += batch.len();
                    report.batches_flushed += 1;
                    info!(batch = batch.index, items = batch.len(), "Upserted batch {}", batch.index);
                    return None;
                }
                Err(e) => {
                    attempt += 1;
                    let retryable = e.downcast_ref::<ServiceError>().map_or(true, ServiceError::is_retryable);
                    if !retryable || attempt >= policy.max_attempts {
                        error!(batch = batch.index, attempts = attempt, error = %format!("{e:#}"), retryable, "batch failed, giving up");
                        report.failed_batches.push(BatchFailure {
                            batch: batch.index,
                            ids: batch.items.iter().map(|i| i.id.clone()).collect(),
                            attempts: attempt,
                            error: format!("{e:#}"),
                        });
                        return match self.settings.on_failure {
                            FailurePolicy::Halt => Some(RunOutcome::Halted),
                            FailurePolicy::Continue => None,
                        };
                    }
                    let delay = policy.backoff(attempt - 1);
                    warn!(batch = batch.index, attempt, delay_ms = delay.as_millis() as u64, error = %e, "upsert failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%)",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
