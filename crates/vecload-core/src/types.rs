//! Domain types shared by the record source, the encoder, the index adapters
//! and the upsert driver.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type RecordId = String;

/// Metadata key under which the record's full JSON is stored next to its vector.
pub const CONTENT_METADATA_KEY: &str = "content";

/// One input entity to be indexed.
///
/// - `id`: non-empty identifier, unique within a run
/// - `payload`: the whole input element, kept verbatim
/// - `content`: canonical JSON serialization of `payload`; this is both the
///   embedding input text and the stored metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub payload: serde_json::Value,
    pub content: String,
}

impl Record {
    /// `content` is compact JSON in input key order. Floats with no
    /// fractional part are written as integers (`1.0` becomes `1`, `-0.0`
    /// becomes `0`), the way JavaScript serializes them, so the stored text
    /// matches what a JS producer of the same document would store.
    pub fn new(id: impl Into<RecordId>, payload: serde_json::Value) -> Self {
        let content = integral_floats_as_ints(payload.clone()).to_string();
        Self { id: id.into(), payload, content }
    }
}

/// Largest magnitude below which every integral f64 is exact (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

fn integral_floats_as_ints(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integral_floats_as_ints).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, integral_floats_as_ints(v))).collect()),
        other => other,
    }
}

/// Dense representation derived from exactly one [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub id: RecordId,
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Distance metric declared by an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    Dotproduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Dotproduct => "dotproduct",
        };
        f.write_str(name)
    }
}

/// Deployment topology. Serializes to the `{"serverless": {...}}` shape the
/// index service expects in its `spec` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Serverless { cloud: String, region: String },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::Serverless { cloud: "aws".to_string(), region: "us-east-1".to_string() }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Serverless { cloud, region } => write!(f, "serverless({cloud}/{region})"),
        }
    }
}

/// Desired configuration of the remote index. Constant for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub topology: Topology,
}

/// Configuration of an index as reported by the service.
///
/// `topology` is `None` when the service reports a deployment shape this crate
/// does not model (for example pod-based indexes); such an index never matches
/// a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub topology: Option<Topology>,
    pub host: Option<String>,
    pub ready: bool,
}

impl IndexDescription {
    /// Human-readable list of the fields that differ from `desired`.
    /// Empty when the index matches.
    pub fn differences(&self, desired: &IndexDescriptor) -> Vec<String> {
        let mut out = Vec::new();
        if self.dimension != desired.dimension {
            out.push(format!("dimension {} != {}", self.dimension, desired.dimension));
        }
        if self.metric != desired.metric {
            out.push(format!("metric {} != {}", self.metric, desired.metric));
        }
        match &self.topology {
            Some(t) if *t == desired.topology => {}
            Some(t) => out.push(format!("topology {} != {}", t, desired.topology)),
            None => out.push(format!("topology <unsupported> != {}", desired.topology)),
        }
        out
    }
}

/// What provisioning did to obtain the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionAction {
    Reused,
    Created,
    Recreated,
}

/// A provisioned index, usable for upserts.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHandle {
    pub name: String,
    pub dimension: usize,
    pub host: Option<String>,
    pub action: ProvisionAction,
}

/// One element of an upsert call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorItem {
    pub id: RecordId,
    pub values: Vec<f32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VectorItem {
    /// Pairs a record with its embedding; the record's JSON goes under
    /// [`CONTENT_METADATA_KEY`].
    pub fn from_record(record: &Record, vector: EmbeddingVector) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            CONTENT_METADATA_KEY.to_string(),
            serde_json::Value::String(record.content.clone()),
        );
        Self { id: vector.id, values: vector.values, metadata }
    }
}

/// A bounded group of items sent in one upsert call. `index` is 1-based.
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub items: Vec<VectorItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
