//! Pinecone REST adapter for `VectorIndexClient`.
//!
//! Control-plane calls go to the controller URL (`/indexes`); upserts go to
//! the per-index data-plane host reported by `describe`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::debug;

use vecload_core::config::PineconeSettings;
use vecload_core::traits::VectorIndexClient;
use vecload_core::types::{IndexDescription, IndexDescriptor, IndexHandle, Metric, Topology, VectorItem};
use vecload_core::ServiceError;

#[derive(Clone)]
pub struct PineconeClient {
    client: Client,
    controller: String,
    namespace: Option<String>,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl PineconeClient {
    /// Builds a client.
    ///
    /// # Arguments
    /// * `api_key` - Value for the `Api-Key` header (usually from `PINECONE_API_KEY`)
    /// * `controller_url` - Control-plane base URL, e.g. `https://api.pinecone.io`
    /// * `api_version` - Value for the `X-Pinecone-API-Version` header
    pub fn new(api_key: &str, controller_url: &str, api_version: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        anyhow::ensure!(
            controller_url.starts_with("http://") || controller_url.starts_with("https://"),
            "Pinecone controller URL must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        headers.insert("Api-Key", HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?);
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_str(api_version).context("invalid Pinecone API version")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Pinecone HTTP client")?;
        Ok(Self {
            client,
            controller: controller_url.trim_end_matches('/').to_string(),
            namespace: None,
            ready_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        })
    }

    pub fn from_settings(settings: &PineconeSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("missing Pinecone API key (set PINECONE_API_KEY or pinecone.api_key)"))?;
        Ok(Self::new(
            api_key,
            &settings.controller_url,
            &settings.api_version,
            Duration::from_secs(settings.timeout_secs),
        )?
        .with_polling(
            Duration::from_secs(settings.ready_timeout_secs),
            Duration::from_millis(settings.poll_interval_ms),
        ))
    }

    pub fn with_polling(mut self, ready_timeout: Duration, poll_interval: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Upserts go to this namespace instead of the default one.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    fn index_url(&self, name: &str) -> String {
        format!("{}/indexes/{}", self.controller, name)
    }

    async fn wait_until_deleted(&self, name: &str) -> Result<()> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if self.describe_index(name).await?.is_none() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("index '{}' still present {:?} after delete", name, self.ready_timeout);
            }
            debug!(index = name, "waiting for index deletion");
            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl VectorIndexClient for PineconeClient {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let url = format!("{}/indexes", self.controller);
        let resp = self.client.get(&url).send().await.context("list indexes request failed")?;
        let list: IndexList = checked(resp, "list indexes").await?.json().await.context("failed to parse index list")?;
        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let resp = self.client.get(self.index_url(name)).send().await.context("describe index request failed")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let model: IndexModel = checked(resp, "describe index").await?.json().await.context("failed to parse index description")?;
        Ok(Some(model.into_description()))
    }

    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<IndexDescription> {
        let request = CreateIndexRequest {
            name: &descriptor.name,
            dimension: descriptor.dimension,
            metric: descriptor.metric,
            spec: &descriptor.topology,
        };
        let url = format!("{}/indexes", self.controller);
        let resp = self.client.post(&url).json(&request).send().await.context("create index request failed")?;
        checked(resp, "create index").await?;
        debug!(index = %descriptor.name, "create accepted, waiting for readiness");
        self.wait_until_ready(&descriptor.name).await
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            match self.describe_index(name).await? {
                Some(desc) if desc.ready => return Ok(desc),
                Some(_) => debug!(index = name, "index not ready yet"),
                None => anyhow::bail!("index '{}' disappeared while waiting for readiness", name),
            }
            if Instant::now() >= deadline {
                anyhow::bail!("index '{}' not ready after {:?}", name, self.ready_timeout);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let resp = self.client.delete(self.index_url(name)).send().await.context("delete index request failed")?;
        if resp.status() != StatusCode::NOT_FOUND {
            checked(resp, "delete index").await?;
        }
        self.wait_until_deleted(name).await
    }

    async fn upsert(&self, index: &IndexHandle, items: &[VectorItem]) -> Result<usize> {
        let host = index
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("index '{}' has no data-plane host", index.name))?;
        let url = format!("{}/vectors/upsert", with_scheme(host));
        let request = UpsertRequest { vectors: items, namespace: self.namespace.as_deref() };
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::new(e.status().map(|s| s.as_u16()), format!("upsert request failed: {e}")))?;
        let parsed: UpsertResponse = checked(resp, "upsert").await?.json().await.context("failed to parse upsert response")?;
        Ok(parsed.upserted_count)
    }
}

async fn checked(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(ServiceError::new(Some(status.as_u16()), format!("Pinecone {what} failed ({status}): {body}")).into())
}

fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: &'a Topology,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    metric: Metric,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    spec: serde_json::Value,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl IndexModel {
    fn into_description(self) -> IndexDescription {
        IndexDescription {
            name: self.name,
            dimension: self.dimension,
            metric: self.metric,
            topology: serde_json::from_value(self.spec).ok(),
            host: self.host,
            ready: self.status.ready,
        }
    }
}
