//! Observability: progress logs plus execution, metrics and lineage recording.
//!
//! The pipeline talks to its store only through [`ExecutionRecorder`], and
//! always via an [`Observer`], which logs recorder failures instead of
//! propagating them. Recording never changes the outcome of a run.

pub mod lineage;
pub mod logs;

pub use lineage::{FileRecorder, MemoryRecorder, RecordedEntries};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ObservabilityResult;
use crate::models::TrackedRecord;
use self::logs::log_warning;

/// Lifecycle state of one dataflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Metrics for one executed transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationMetrics {
    pub execution_id: String,
    pub transformation_name: String,
    pub transformation_type: String,
    pub records_in: usize,
    pub records_out: usize,
    pub duration_ms: f64,
    pub executed_at: DateTime<Utc>,
}

impl TransformationMetrics {
    pub fn new(
        execution_id: &str,
        name: &str,
        kind: &str,
        records_in: usize,
        records_out: usize,
        duration: Duration,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            transformation_name: name.to_string(),
            transformation_type: kind.to_string(),
            records_in,
            records_out,
            duration_ms: duration.as_secs_f64() * 1000.0,
            executed_at: Utc::now(),
        }
    }
}

/// Store for execution lifecycle, transformation metrics and record lineage.
pub trait ExecutionRecorder: Send + Sync {
    fn start_execution(&self, execution_id: &str, dataflow_name: &str) -> ObservabilityResult<()>;

    fn finish_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        records_processed: usize,
    ) -> ObservabilityResult<()>;

    fn save_transformation_metrics(&self, metrics: &TransformationMetrics) -> ObservabilityResult<()>;

    /// Record where `record` came from and where it is being written.
    /// Returns the lineage id assigned to it.
    fn track_record(
        &self,
        execution_id: &str,
        record: &TrackedRecord,
        output_path: &str,
    ) -> ObservabilityResult<String>;
}

/// Recorder that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl ExecutionRecorder for NoopRecorder {
    fn start_execution(&self, _: &str, _: &str) -> ObservabilityResult<()> {
        Ok(())
    }

    fn finish_execution(&self, _: &str, _: ExecutionStatus, _: usize) -> ObservabilityResult<()> {
        Ok(())
    }

    fn save_transformation_metrics(&self, _: &TransformationMetrics) -> ObservabilityResult<()> {
        Ok(())
    }

    fn track_record(&self, _: &str, _: &TrackedRecord, _: &str) -> ObservabilityResult<String> {
        Ok(lineage::lineage_id())
    }
}

/// Wraps a recorder so its failures are logged and swallowed.
#[derive(Clone)]
pub struct Observer {
    recorder: Arc<dyn ExecutionRecorder>,
}

impl Observer {
    pub fn new(recorder: Arc<dyn ExecutionRecorder>) -> Self {
        Self { recorder }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopRecorder))
    }

    pub fn start_execution(&self, execution_id: &str, dataflow_name: &str) {
        if let Err(e) = self.recorder.start_execution(execution_id, dataflow_name) {
            log_warning(format!("Failed to record start of execution {}: {}", execution_id, e));
        }
    }

    pub fn finish_execution(&self, execution_id: &str, status: ExecutionStatus, records_processed: usize) {
        if let Err(e) = self
            .recorder
            .finish_execution(execution_id, status, records_processed)
        {
            log_warning(format!("Failed to record end of execution {}: {}", execution_id, e));
        }
    }

    pub fn save_transformation_metrics(&self, metrics: &TransformationMetrics) {
        if let Err(e) = self.recorder.save_transformation_metrics(metrics) {
            log_warning(format!(
                "Failed to save metrics for transformation '{}': {}",
                metrics.transformation_name, e
            ));
        }
    }

    /// Track every record of a dataset about to be written to `output_path`.
    /// Returns how many records were tracked successfully.
    pub fn track_records(&self, execution_id: &str, records: &[TrackedRecord], output_path: &str) -> usize {
        let mut tracked = 0;
        for record in records {
            match self.recorder.track_record(execution_id, record, output_path) {
                Ok(_) => tracked += 1,
                Err(e) => {
                    log_warning(format!("Failed to track lineage for {}: {}", output_path, e));
                    // The store is unlikely to recover within this dataset
                    break;
                }
            }
        }
        tracked
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}
