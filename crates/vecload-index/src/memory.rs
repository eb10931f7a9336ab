//! In-process `VectorIndexClient`. Used for dry runs and as the collaborator
//! in pipeline tests; every call is recorded so tests can assert on the exact
//! sequence of remote operations.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use vecload_core::traits::VectorIndexClient;
use vecload_core::types::{IndexDescription, IndexDescriptor, IndexHandle, VectorItem};
use vecload_core::ServiceError;

/// A recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Describe(String),
    Create(String),
    WaitReady(String),
    Delete(String),
    Upsert { index: String, ids: Vec<String> },
}

#[derive(Debug, Clone)]
struct StoredIndex {
    description: IndexDescription,
    items: BTreeMap<String, VectorItem>,
}

#[derive(Debug, Default)]
struct State {
    indexes: HashMap<String, StoredIndex>,
    calls: Vec<Call>,
    failing_upserts: usize,
    rejecting_upserts: usize,
    fail_control_plane: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryIndexClient {
    state: Mutex<State>,
}

impl InMemoryIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates an index, as if left behind by an earlier run.
    pub async fn seed(&self, description: IndexDescription, items: Vec<VectorItem>) {
        let mut state = self.state.lock().await;
        let items = items.into_iter().map(|i| (i.id.clone(), i)).collect();
        state.indexes.insert(description.name.clone(), StoredIndex { description, items });
    }

    /// The next `n` upsert calls fail transiently without storing anything.
    pub async fn fail_next_upserts(&self, n: usize) {
        self.state.lock().await.failing_upserts = n;
    }

    /// The next `n` upsert calls are refused with a non-retryable 400.
    pub async fn reject_next_upserts(&self, n: usize) {
        self.state.lock().await.rejecting_upserts = n;
    }

    /// Every list/describe/create/delete call fails from now on.
    pub async fn fail_control_plane(&self) {
        self.state.lock().await.fail_control_plane = true;
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Item ids of every upsert call, in call order, failed attempts included.
    pub async fn upsert_calls(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Upsert { ids, .. } => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn items(&self, index: &str) -> Vec<VectorItem> {
        self.state
            .lock()
            .await
            .indexes
            .get(index)
            .map(|s| s.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn description(&self, index: &str) -> Option<IndexDescription> {
        self.state.lock().await.indexes.get(index).map(|s| s.description.clone())
    }
}

impl State {
    fn control(&mut self, call: Call) -> Result<()> {
        self.calls.push(call);
        if self.fail_control_plane {
            return Err(anyhow!("control plane unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndexClient for InMemoryIndexClient {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        state.control(Call::List)?;
        let mut names: Vec<String> = state.indexes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let mut state = self.state.lock().await;
        state.control(Call::Describe(name.to_string()))?;
        Ok(state.indexes.get(name).map(|s| s.description.clone()))
    }

    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<IndexDescription> {
        let mut state = self.state.lock().await;
        state.control(Call::Create(descriptor.name.clone()))?;
        if state.indexes.contains_key(&descriptor.name) {
            return Err(anyhow!("index '{}' already exists", descriptor.name));
        }
        let description = IndexDescription {
            name: descriptor.name.clone(),
            dimension: descriptor.dimension,
            metric: descriptor.metric,
            topology: Some(descriptor.topology.clone()),
            host: Some(format!("memory://{}", descriptor.name)),
            ready: true,
        };
        state.indexes.insert(
            descriptor.name.clone(),
            StoredIndex { description: description.clone(), items: BTreeMap::new() },
        );
        Ok(description)
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let mut state = self.state.lock().await;
        state.control(Call::WaitReady(name.to_string()))?;
        let stored = state
            .indexes
            .get_mut(name)
            .ok_or_else(|| anyhow!("index '{}' not found", name))?;
        stored.description.ready = true;
        Ok(stored.description.clone())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.control(Call::Delete(name.to_string()))?;
        state.indexes.remove(name);
        Ok(())
    }

    async fn upsert(&self, index: &IndexHandle, items: &[VectorItem]) -> Result<usize> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Upsert {
            index: index.name.clone(),
            ids: items.iter().map(|i| i.id.clone()).collect(),
        });
        if state.rejecting_upserts > 0 {
            state.rejecting_upserts -= 1;
            return Err(ServiceError::new(Some(400), "metadata size exceeds the limit").into());
        }
        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(anyhow!("injected upsert failure"));
        }
        let stored = state
            .indexes
            .get_mut(&index.name)
            .ok_or_else(|| anyhow!("index '{}' not found", index.name))?;
        for item in items {
            if item.values.len() != stored.description.dimension {
                return Err(anyhow!(
                    "vector dimension {} does not match index dimension {}",
                    item.values.len(),
                    stored.description.dimension
                ));
            }
        }
        for item in items {
            stored.items.insert(item.id.clone(), item.clone());
        }
        Ok(items.len())
    }
}
