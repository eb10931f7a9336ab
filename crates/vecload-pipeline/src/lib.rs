//! vecload-pipeline
//!
//! Wires a record source, an embedder and an index client into one ingest
//! run: parse, check dimensions, provision, then drive batches.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use vecload_core::config::{IndexSettings, ProvisionMode, Settings};
use vecload_core::error::{Error, Result};
use vecload_core::record_source::{RecordSet, RecordSource};
use vecload_core::traits::{Embedder, VectorIndexClient};
use vecload_core::types::{IndexDescriptor, IndexHandle};
use vecload_index::IndexProvisioner;

pub mod driver;
pub mod report;
pub mod retry;

pub use driver::{BatchUpsertDriver, DriverSettings};
pub use report::{BatchFailure, RunOutcome, RunReport};
pub use retry::RetryPolicy;

#[derive(Clone)]
pub struct IngestPipeline {
    source: RecordSource,
    embedder: Arc<dyn Embedder>,
    client: Arc<dyn VectorIndexClient>,
    descriptor: IndexDescriptor,
    mode: ProvisionMode,
    driver: DriverSettings,
}

impl IngestPipeline {
    pub fn new(source: RecordSource, embedder: Arc<dyn Embedder>, client: Arc<dyn VectorIndexClient>) -> Self {
        Self {
            source,
            embedder,
            client,
            descriptor: IndexSettings::default().descriptor(),
            mode: ProvisionMode::default(),
            driver: DriverSettings::default(),
        }
    }

    pub fn from_settings(settings: &Settings, embedder: Arc<dyn Embedder>, client: Arc<dyn VectorIndexClient>) -> Self {
        Self::new(settings.ingest.record_source(), embedder, client)
            .with_descriptor(settings.index.descriptor())
            .with_mode(settings.index.mode)
            .with_driver_settings(DriverSettings::from_settings(&settings.ingest))
    }

    pub fn with_descriptor(mut self, descriptor: IndexDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_mode(mut self, mode: ProvisionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_driver_settings(mut self, driver: DriverSettings) -> Self {
        self.driver = driver;
        self
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub async fn run(&self, raw: &[u8]) -> Result<RunReport> {
        let set = self.source.parse(raw)?;
        self.ingest(set, None).await
    }

    pub async fn run_with_cancel(&self, raw: &[u8], cancel: watch::Receiver<bool>) -> Result<RunReport> {
        let set = self.source.parse(raw)?;
        self.ingest(set, Some(cancel)).await
    }

    /// Reads and ingests the document at `path`.
    pub async fn run_file(&self, path: &Path, cancel: Option<watch::Receiver<bool>>) -> Result<RunReport> {
        info!(path = %path.display(), "loading input document");
        let set = self.source.load(path)?;
        self.ingest(set, cancel).await
    }

    /// Brings the index into the configured shape without ingesting anything.
    pub async fn provision(&self) -> Result<IndexHandle> {
        self.check_dimension()?;
        IndexProvisioner::new(self.client.as_ref(), self.mode).ensure(&self.descriptor).await
    }

    async fn ingest(&self, set: RecordSet, cancel: Option<watch::Receiver<bool>>) -> Result<RunReport> {
        info!(
            elements = set.elements_seen,
            records = set.records.len(),
            skipped = set.skipped(),
            "input parsed"
        );
        let handle = self.provision().await?;

        let mut driver = BatchUpsertDriver::new(Arc::clone(&self.embedder), Arc::clone(&self.client), self.driver.clone());
        if let Some(cancel) = cancel {
            driver = driver.with_cancel(cancel);
        }
        let mut report = driver.run(set.records, &handle).await?;
        report.records_seen = set.elements_seen;
        report.skipped_missing_id = set.missing_id;
        report.skipped_duplicate_id = set.duplicate_id;
        report.provision_action = Some(handle.action);
        info!(summary = %report, "ingest finished");
        Ok(report)
    }

    fn check_dimension(&self) -> Result<()> {
        let actual = self.embedder.dim();
        if actual != self.descriptor.dimension {
            return Err(Error::DimensionMismatch { expected: self.descriptor.dimension, actual, record: None });
        }
        Ok(())
    }
}
