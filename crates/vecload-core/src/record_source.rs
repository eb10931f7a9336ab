use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Record;

pub const DEFAULT_RECORDS_FIELD: &str = "design";
pub const DEFAULT_ID_FIELD: &str = "id";

/// Records extracted from one input document, in input order.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub elements_seen: usize,
    pub missing_id: usize,
    pub duplicate_id: usize,
}

impl RecordSet {
    pub fn skipped(&self) -> usize {
        self.missing_id + self.duplicate_id
    }
}

/// Turns a raw JSON document into normalized records.
#[derive(Debug, Clone)]
pub struct RecordSource {
    records_field: String,
    id_field: String,
}

impl Default for RecordSource {
    fn default() -> Self {
        Self::new(DEFAULT_RECORDS_FIELD, DEFAULT_ID_FIELD)
    }
}

impl RecordSource {
    pub fn new(records_field: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self { records_field: records_field.into(), id_field: id_field.into() }
    }

    pub fn records_field(&self) -> &str {
        &self.records_field
    }

    pub fn load(&self, path: &Path) -> Result<RecordSet> {
        let raw = fs::read(path)?;
        debug!(path = %path.display(), bytes = raw.len(), "read input document");
        self.parse(&raw)
    }

    pub fn parse(&self, raw: &[u8]) -> Result<RecordSet> {
        let doc: Value = serde_json::from_slice(raw)
            .map_err(|e| Error::MalformedInput(format!("invalid JSON: {e}")))?;
        self.parse_value(doc)
    }

    pub fn parse_value(&self, doc: Value) -> Result<RecordSet> {
        let Value::Object(mut root) = doc else {
            return Err(Error::MalformedInput("top-level value is not an object".to_string()));
        };
        let elements = match root.remove(&self.records_field) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(Error::MalformedInput(format!(
                    "'{}' property is not an array",
                    self.records_field
                )))
            }
            None => {
                return Err(Error::MalformedInput(format!(
                    "document does not have a '{}' array property",
                    self.records_field
                )))
            }
        };

        let mut set = RecordSet { elements_seen: elements.len(), ..RecordSet::default() };
        let mut seen: HashSet<String> = HashSet::with_capacity(elements.len());
        for (position, element) in elements.into_iter().enumerate() {
            let Some(id) = self.extract_id(&element) else {
                warn!(position, element = %element, "element without an '{}', skipping it", self.id_field);
                set.missing_id += 1;
                continue;
            };
            if !seen.insert(id.clone()) {
                warn!(position, id = %id, "duplicate id, keeping the first occurrence");
                set.duplicate_id += 1;
                continue;
            }
            set.records.push(Record::new(id, element));
        }
        debug!(
            elements = set.elements_seen,
            records = set.records.len(),
            skipped = set.skipped(),
            "parsed input document"
        );
        Ok(set)
    }

    fn extract_id(&self, element: &Value) -> Option<String> {
        match element.get(&self.id_field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        }
    }
}
