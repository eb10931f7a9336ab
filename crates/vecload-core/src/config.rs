//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars. The Pinecone API key falls back to `PINECONE_API_KEY`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record_source::{RecordSource, DEFAULT_ID_FIELD, DEFAULT_RECORDS_FIELD};
use crate::types::{IndexDescriptor, Metric, Topology};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Layers `base`, then `config.<env>.toml` next to it, then `APP_*`
    /// variables (`__` separates nested keys) over the built-in defaults.
    pub fn load_from(base: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let dir = base.parent().unwrap_or_else(|| Path::new(""));

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(base));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if settings.pinecone.api_key.is_none() {
            settings.pinecone.api_key = env::var("PINECONE_API_KEY").ok().filter(|k| !k.trim().is_empty());
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub pinecone: PineconeSettings,
    pub embedding: EmbeddingSettings,
    pub ingest: IngestSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionMode {
    /// Reuse a matching index; refuse to touch a drifted one.
    #[default]
    Reuse,
    /// Reuse a matching index; delete and recreate a drifted one.
    RecreateOnDrift,
    /// Delete and recreate any existing index with the same name.
    AlwaysRecreate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
    pub mode: ProvisionMode,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "developer-quickstart-js".to_string(),
            dimension: 384,
            metric: Metric::Cosine,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            mode: ProvisionMode::Reuse,
        }
    }
}

impl IndexSettings {
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            name: self.name.clone(),
            dimension: self.dimension,
            metric: self.metric,
            topology: Topology::Serverless { cloud: self.cloud.clone(), region: self.region.clone() },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeSettings {
    pub api_key: Option<String>,
    pub controller_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for PineconeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            controller_url: "https://api.pinecone.io".to_string(),
            api_version: "2024-07".to_string(),
            timeout_secs: 30,
            ready_timeout_secs: 300,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Local,
    Hashed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Mean,
    Cls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: String,
    pub max_len: usize,
    pub pooling: Pooling,
    pub normalize: bool,
    /// Output size of the hashed backend.
    pub hashed_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Local,
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            max_len: 256,
            pooling: Pooling::Mean,
            normalize: true,
            hashed_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop flushing after the first batch that exhausts its retries.
    #[default]
    Halt,
    /// Record the failed batch and keep going.
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub input: String,
    pub records_field: String,
    pub id_field: String,
    pub namespace: Option<String>,
    pub batch_size: usize,
    pub encode_concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub on_batch_failure: FailurePolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            input: "bannerJSON_ai_generated.json".to_string(),
            records_field: DEFAULT_RECORDS_FIELD.to_string(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            namespace: None,
            batch_size: 100,
            encode_concurrency: 4,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            on_batch_failure: FailurePolicy::Halt,
        }
    }
}

impl IngestSettings {
    pub fn record_source(&self) -> RecordSource {
        RecordSource::new(self.records_field.clone(), self.id_field.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.index.name.trim().is_empty() {
            problems.push("index.name must not be empty");
        }
        if self.index.dimension == 0 {
            problems.push("index.dimension must be positive");
        }
        if self.ingest.batch_size == 0 {
            problems.push("ingest.batch_size must be positive");
        }
        if self.ingest.encode_concurrency == 0 {
            problems.push("ingest.encode_concurrency must be positive");
        }
        if self.ingest.max_attempts == 0 {
            problems.push("ingest.max_attempts must be at least 1");
        }
        if self.ingest.records_field.is_empty() || self.ingest.id_field.is_empty() {
            problems.push("ingest.records_field and ingest.id_field must not be empty");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(problems.join("; ")))
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
