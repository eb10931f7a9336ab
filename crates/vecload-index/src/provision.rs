//! Brings the remote index into the configuration named by an
//! [`IndexDescriptor`] before any data flows.
//!
//! An existing index is reconciled into one of three states: it matches the
//! descriptor (reuse), it is absent (create) or it has drifted. What happens
//! to a drifted index is decided by [`ProvisionMode`]; deleting one is always
//! an explicit, logged decision.

use tracing::{info, warn};

use vecload_core::config::ProvisionMode;
use vecload_core::error::{Error, Result};
use vecload_core::traits::VectorIndexClient;
use vecload_core::types::{IndexDescription, IndexDescriptor, IndexHandle, ProvisionAction};

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Matches(IndexDescription),
    Absent,
    Drifted { existing: IndexDescription, differences: Vec<String> },
}

pub struct IndexProvisioner<'a> {
    client: &'a dyn VectorIndexClient,
    mode: ProvisionMode,
}

impl<'a> IndexProvisioner<'a> {
    pub fn new(client: &'a dyn VectorIndexClient, mode: ProvisionMode) -> Self {
        Self { client, mode }
    }

    pub async fn reconcile(&self, descriptor: &IndexDescriptor) -> Result<Reconciliation> {
        let name = descriptor.name.as_str();
        let existing = self
            .client
            .list_indexes()
            .await
            .map_err(|e| Error::provisioning(name, &e))?;
        if !existing.iter().any(|n| n == name) {
            return Ok(Reconciliation::Absent);
        }
        // listed but gone by the time we describe it counts as absent
        let Some(description) = self
            .client
            .describe_index(name)
            .await
            .map_err(|e| Error::provisioning(name, &e))?
        else {
            return Ok(Reconciliation::Absent);
        };
        let differences = description.differences(descriptor);
        if differences.is_empty() {
            Ok(Reconciliation::Matches(description))
        } else {
            Ok(Reconciliation::Drifted { existing: description, differences })
        }
    }

    /// Ensures an index matching `descriptor` exists and is ready.
    pub async fn ensure(&self, descriptor: &IndexDescriptor) -> Result<IndexHandle> {
        let name = descriptor.name.as_str();
        info!(index = name, "Checking if index exists...");
        let state = self.reconcile(descriptor).await?;

        let (description, action) = match (state, self.mode) {
            (Reconciliation::Absent, _) => (self.create(descriptor).await?, ProvisionAction::Created),
            (Reconciliation::Matches(_), ProvisionMode::AlwaysRecreate) => {
                warn!(index = name, "Deleting existing index to ensure correct configuration; its data is lost");
                self.delete(name).await?;
                (self.create(descriptor).await?, ProvisionAction::Recreated)
            }
            (Reconciliation::Matches(existing), _) => {
                info!(index = name, "index already matches the requested configuration, reusing it");
                let description = if existing.ready {
                    existing
                } else {
                    self.client
                        .wait_until_ready(name)
                        .await
                        .map_err(|e| Error::provisioning(name, &e))?
                };
                (description, ProvisionAction::Reused)
            }
            (Reconciliation::Drifted { differences, .. }, ProvisionMode::Reuse) => {
                return Err(Error::Provisioning {
                    index: name.to_string(),
                    message: format!(
                        "existing index has drifted ({}); rerun with recreate-on-drift to replace it or pick another index name",
                        differences.join(", ")
                    ),
                });
            }
            (Reconciliation::Drifted { differences, .. }, _) => {
                warn!(index = name, drift = %differences.join(", "), "Deleting drifted index; its data is lost");
                self.delete(name).await?;
                (self.create(descriptor).await?, ProvisionAction::Recreated)
            }
        };

        Ok(IndexHandle {
            name: description.name,
            dimension: descriptor.dimension,
            host: description.host,
            action,
        })
    }

    async fn create(&self, descriptor: &IndexDescriptor) -> Result<IndexDescription> {
        info!(
            index = %descriptor.name,
            dimension = descriptor.dimension,
            metric = %descriptor.metric,
            topology = %descriptor.topology,
            "Creating new index..."
        );
        let description = self
            .client
            .create_index(descriptor)
            .await
            .map_err(|e| Error::provisioning(&descriptor.name, &e))?;
        info!(index = %descriptor.name, "Index created and ready.");
        Ok(description)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_index(name)
            .await
            .map_err(|e| Error::provisioning(name, &e))
    }
}
