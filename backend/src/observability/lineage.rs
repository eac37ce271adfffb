//! Record lineage and the recorders that persist it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{ExecutionRecorder, ExecutionStatus, TransformationMetrics};
use crate::error::{ObservabilityError, ObservabilityResult};
use crate::models::TrackedRecord;

pub const EXECUTIONS_FILE: &str = "executions.jsonl";
pub const METRICS_FILE: &str = "transformation_metrics.jsonl";
pub const LINEAGE_FILE: &str = "record_lineage.jsonl";
pub const VALIDATION_ERRORS_FILE: &str = "validation_errors.jsonl";

// =============================================================================
// Entries
// =============================================================================

/// One execution lifecycle event. Start and finish are separate entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub execution_id: String,
    pub dataflow_name: String,
    pub status: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// Where one record came from and where it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub lineage_id: String,
    pub execution_id: String,
    pub record_id: String,
    pub source_file: String,
    pub transformation_path: String,
    pub output_path: String,
    pub validation_passed: bool,
    pub processed_at: DateTime<Utc>,
}

/// One failed (field, rule) pair of a tracked record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorEntry {
    pub lineage_id: String,
    pub field_name: String,
    pub validation_rule: String,
    pub error_code: String,
    pub message: String,
    pub actual_value: Value,
    pub detected_at: DateTime<Utc>,
}

/// Readable record id built from well-known business fields:
/// `<name|unknown>-<age|none>-<office|empty>`.
pub fn record_id(record: &TrackedRecord) -> String {
    let fields = record.record.fields();

    let name = match fields.get("name") {
        None => "unknown".to_string(),
        Some(v) => plain(v),
    };
    let age = match fields.get("age") {
        None | Some(Value::Null) => "none".to_string(),
        Some(v) => plain(v),
    };
    let office = match fields.get("office") {
        Some(v) if truthy(v) => plain(v),
        _ => "empty".to_string(),
    };

    format!("{}-{}-{}", name, age, office)
}

/// Fresh unique id for one lineage entry.
pub fn lineage_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Lineage entry for `record` plus one error entry per failed rule.
pub fn lineage_entries(
    execution_id: &str,
    record: &TrackedRecord,
    output_path: &str,
) -> (LineageEntry, Vec<ValidationErrorEntry>) {
    let now = Utc::now();
    let lineage = LineageEntry {
        lineage_id: lineage_id(),
        execution_id: execution_id.to_string(),
        record_id: record_id(record),
        source_file: record.source_file.to_string(),
        transformation_path: record.transformation_path.clone(),
        output_path: output_path.to_string(),
        validation_passed: record.is_valid(),
        processed_at: now,
    };

    let errors = record
        .errors
        .iter()
        .map(|e| ValidationErrorEntry {
            lineage_id: lineage.lineage_id.clone(),
            field_name: e.field.clone(),
            validation_rule: e.validation.clone(),
            error_code: e.error_code.clone(),
            message: e.message.clone(),
            actual_value: record.record.get(&e.field).cloned().unwrap_or(Value::Null),
            detected_at: now,
        })
        .collect();

    (lineage, errors)
}

/// Open executions, keyed by execution id: dataflow name and start time.
#[derive(Debug, Default)]
struct OpenExecutions(HashMap<String, (String, DateTime<Utc>)>);

impl OpenExecutions {
    fn start(&mut self, execution_id: &str, dataflow_name: &str, at: DateTime<Utc>) {
        self.0
            .insert(execution_id.to_string(), (dataflow_name.to_string(), at));
    }

    /// Finish entry for an execution; unknown ids get an empty dataflow name.
    fn finish(
        &mut self,
        execution_id: &str,
        status: ExecutionStatus,
        records_processed: usize,
        at: DateTime<Utc>,
    ) -> ExecutionEntry {
        let (dataflow_name, duration_seconds) = match self.0.remove(execution_id) {
            Some((name, started)) => {
                let elapsed = (at - started).num_milliseconds() as f64 / 1000.0;
                (name, Some(elapsed))
            }
            None => (String::new(), None),
        };

        ExecutionEntry {
            execution_id: execution_id.to_string(),
            dataflow_name,
            status,
            timestamp: at,
            records_processed: Some(records_processed),
            duration_seconds,
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> ObservabilityResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| ObservabilityError::Unavailable(format!("{} lock poisoned", what)))
}

// =============================================================================
// File recorder
// =============================================================================

/// Appends JSON lines to one file per entry kind under a directory.
///
/// Every call opens its file, appends and closes it again.
#[derive(Debug)]
pub struct FileRecorder {
    dir: PathBuf,
    open: Mutex<OpenExecutions>,
}

impl FileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: Mutex::new(OpenExecutions::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, entries: &[T]) -> ObservabilityResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|source| ObservabilityError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(file);
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        let io_err = |source| ObservabilityError::Io {
            path: path.clone(),
            source,
        };
        let mut out = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;
        out.write_all(&buf).map_err(io_err)?;
        Ok(())
    }
}

impl ExecutionRecorder for FileRecorder {
    fn start_execution(&self, execution_id: &str, dataflow_name: &str) -> ObservabilityResult<()> {
        let now = Utc::now();
        lock(&self.open, "execution")?.start(execution_id, dataflow_name, now);
        self.append(
            EXECUTIONS_FILE,
            &[ExecutionEntry {
                execution_id: execution_id.to_string(),
                dataflow_name: dataflow_name.to_string(),
                status: ExecutionStatus::Running,
                timestamp: now,
                records_processed: None,
                duration_seconds: None,
            }],
        )
    }

    fn finish_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        records_processed: usize,
    ) -> ObservabilityResult<()> {
        let entry = lock(&self.open, "execution")?.finish(execution_id, status, records_processed, Utc::now());
        self.append(EXECUTIONS_FILE, &[entry])
    }

    fn save_transformation_metrics(&self, metrics: &TransformationMetrics) -> ObservabilityResult<()> {
        self.append(METRICS_FILE, std::slice::from_ref(metrics))
    }

    fn track_record(
        &self,
        execution_id: &str,
        record: &TrackedRecord,
        output_path: &str,
    ) -> ObservabilityResult<String> {
        let (lineage, errors) = lineage_entries(execution_id, record, output_path);
        self.append(LINEAGE_FILE, std::slice::from_ref(&lineage))?;
        self.append(VALIDATION_ERRORS_FILE, &errors)?;
        Ok(lineage.lineage_id)
    }
}

// =============================================================================
// Memory recorder
// =============================================================================

/// Everything a [`MemoryRecorder`] has seen.
#[derive(Debug, Clone, Default)]
pub struct RecordedEntries {
    pub executions: Vec<ExecutionEntry>,
    pub metrics: Vec<TransformationMetrics>,
    pub lineage: Vec<LineageEntry>,
    pub validation_errors: Vec<ValidationErrorEntry>,
}

/// Keeps entries in memory. Used to inspect runs in tests and embeddings.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    entries: Mutex<RecordedEntries>,
    open: Mutex<OpenExecutions>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> ObservabilityResult<RecordedEntries> {
        Ok(lock(&self.entries, "memory recorder")?.clone())
    }
}

impl ExecutionRecorder for MemoryRecorder {
    fn start_execution(&self, execution_id: &str, dataflow_name: &str) -> ObservabilityResult<()> {
        let now = Utc::now();
        lock(&self.open, "execution")?.start(execution_id, dataflow_name, now);
        lock(&self.entries, "memory recorder")?
            .executions
            .push(ExecutionEntry {
                execution_id: execution_id.to_string(),
                dataflow_name: dataflow_name.to_string(),
                status: ExecutionStatus::Running,
                timestamp: now,
                records_processed: None,
                duration_seconds: None,
            });
        Ok(())
    }

    fn finish_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        records_processed: usize,
    ) -> ObservabilityResult<()> {
        let entry = lock(&self.open, "execution")?.finish(execution_id, status, records_processed, Utc::now());
        lock(&self.entries, "memory recorder")?.executions.push(entry);
        Ok(())
    }

    fn save_transformation_metrics(&self, metrics: &TransformationMetrics) -> ObservabilityResult<()> {
        lock(&self.entries, "memory recorder")?
            .metrics
            .push(metrics.clone());
        Ok(())
    }

    fn track_record(
        &self,
        execution_id: &str,
        record: &TrackedRecord,
        output_path: &str,
    ) -> ObservabilityResult<String> {
        let (lineage, errors) = lineage_entries(execution_id, record, output_path);
        let id = lineage.lineage_id.clone();
        let mut entries = lock(&self.entries, "memory recorder")?;
        entries.lineage.push(lineage);
        entries.validation_errors.extend(errors);
        Ok(id)
    }
}
