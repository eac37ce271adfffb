//! Domain models for a dataflow run.
//!
//! - [`Record`] - One flat input record (field name → JSON value), immutable
//! - [`FieldError`] - A single failed (field, rule) pair
//! - [`TrackedRecord`] - A record plus its validation errors and lineage
//! - [`Dataset`] - Named, ordered collection of tracked records
//! - [`Namespace`] - All datasets produced so far in one dataflow run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TransformError;

/// Key under which KO records carry their error list when written out.
pub const ERRORS_FIELD: &str = "arraycoderrorbyfield";

// =============================================================================
// Record
// =============================================================================

/// A flat record. Cloning is cheap; the field map is shared.
///
/// Validation never rewrites a record. Enrichment produces a new one
/// through [`Record::with_fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Arc<Map<String, Value>>,
}

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields: Arc::new(fields),
        }
    }

    /// Field value, `None` when the field is absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// New record with `added` set on top of the current fields.
    /// Existing fields of the same name are overwritten.
    pub fn with_fields(&self, added: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut fields = (*self.fields).clone();
        for (name, value) in added {
            fields.insert(name, value);
        }
        Self::new(fields)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

// =============================================================================
// Validation errors
// =============================================================================

/// One failed (field, rule) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub validation: String,
    pub error_code: String,
    pub message: String,
}

// =============================================================================
// Tracked record
// =============================================================================

/// A record as it flows between datasets: data, accumulated errors and lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRecord {
    pub record: Record,
    pub errors: Vec<FieldError>,
    /// File the record was loaded from.
    pub source_file: Arc<str>,
    /// `source->kind->output->kind->output...`
    pub transformation_path: String,
}

impl TrackedRecord {
    /// A freshly loaded record. Its path starts at the source dataset name.
    pub fn loaded(record: Record, source_file: Arc<str>, source_name: &str) -> Self {
        Self {
            record,
            errors: Vec::new(),
            source_file,
            transformation_path: source_name.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Carry this record into an output dataset, appending `->kind->output`.
    pub fn derive(&self, record: Record, errors: Vec<FieldError>, kind: &str, output: &str) -> Self {
        Self {
            record,
            errors,
            source_file: Arc::clone(&self.source_file),
            transformation_path: format!("{}->{}->{}", self.transformation_path, kind, output),
        }
    }

    /// JSON written by sinks: the record fields, plus the error list for KO records.
    pub fn to_output(&self) -> serde_json::Result<Value> {
        let mut out = self.record.fields().clone();
        if !self.errors.is_empty() {
            out.insert(ERRORS_FIELD.to_string(), serde_json::to_value(&self.errors)?);
        }
        Ok(Value::Object(out))
    }
}

// =============================================================================
// Dataset & namespace
// =============================================================================

/// Named, ordered collection of records. Never mutated once inserted in a [`Namespace`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub records: Vec<TrackedRecord>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, records: Vec<TrackedRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_valid()).count()
    }
}

/// Per-run mapping from dataset name to dataset.
#[derive(Debug, Default)]
pub struct Namespace {
    datasets: HashMap<String, Dataset>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset. Names are single-assignment.
    pub fn insert(&mut self, dataset: Dataset) -> Result<(), TransformError> {
        if self.datasets.contains_key(&dataset.name) {
            return Err(TransformError::DuplicateDataset(dataset.name));
        }
        self.datasets.insert(dataset.name.clone(), dataset);
        Ok(())
    }

    /// Look up `input` on behalf of `referenced_by`.
    pub fn resolve(&self, input: &str, referenced_by: &str) -> Result<&Dataset, TransformError> {
        self.datasets
            .get(input)
            .ok_or_else(|| TransformError::MissingInput {
                input: input.to_string(),
                referenced_by: referenced_by.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
