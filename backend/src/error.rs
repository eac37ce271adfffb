//! Error types for the metaetl pipeline.
//!
//! One error enum per stage of a dataflow run:
//!
//! - [`ConfigError`] - Metadata document missing, malformed or schema-violating
//! - [`SourceLoadError`] - Input files missing, unmatched or not valid JSON
//! - [`TransformError`] - Unknown rules/functions, dangling dataset references
//! - [`SinkError`] - Unsupported format/save mode or failed writes
//! - [`ObservabilityError`] - Lineage/metrics recording failures
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading or validating the metadata document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Metadata file does not exist.
    #[error("Metadata file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Metadata file could not be read.
    #[error("Error reading metadata file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid JSON.
    #[error("Invalid JSON in metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// Document does not match the metadata schema.
    #[error("Metadata validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// Enum-like field holds an unrecognized value.
    #[error("Invalid value '{value}' for {field} (expected one of: {})", expected.join(", "))]
    InvalidValue {
        field: String,
        value: String,
        expected: Vec<String>,
    },

    /// Transformation declares a type no engine implements.
    #[error("Unknown transformation type '{kind}' in transformation '{transformation}'")]
    UnknownTransformationType { transformation: String, kind: String },

    /// Semantic check failed (duplicate names, missing params, ...).
    #[error("Invalid dataflow '{dataflow}': {message}")]
    Invalid { dataflow: String, message: String },

    /// Runtime setting could not be parsed.
    #[error("Invalid setting {key}={value}")]
    Setting { key: String, value: String },
}

// =============================================================================
// Source Loading Errors
// =============================================================================

/// Errors while resolving and parsing source files.
#[derive(Debug, Error)]
pub enum SourceLoadError {
    /// Declared format is not JSON / JSON-Lines.
    #[error("Unsupported format: {0}. Only JSON is supported.")]
    UnsupportedFormat(String),

    /// Parent directory of a wildcard pattern does not exist.
    #[error("Source directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Literal source path does not exist.
    #[error("Source file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Wildcard pattern matched nothing.
    #[error("No files found matching pattern: {0}")]
    NoMatches(String),

    /// Wildcard pattern is not a valid glob.
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// File could not be read.
    #[error("Error reading file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line (or document) is not valid JSON.
    #[error("Invalid JSON on line {line} in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Valid JSON, but not an object.
    #[error("Expected a JSON object on line {line} in {}", path.display())]
    NotAnObject { path: PathBuf, line: usize },
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors while compiling or executing a transformation.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Validation rule is not registered.
    #[error("Validation rule '{rule}' not found. Available: [{}]", available.join(", "))]
    ValidationRuleNotFound { rule: String, available: Vec<String> },

    /// Field generator function is not registered.
    #[error("Field function '{function}' not found. Available: [{}]", available.join(", "))]
    FieldFunctionNotFound {
        function: String,
        available: Vec<String>,
    },

    /// Referenced input dataset was never produced.
    #[error("Dataset not found: '{input}' (referenced by '{referenced_by}')")]
    MissingInput { input: String, referenced_by: String },

    /// Output dataset name is already taken in the namespace.
    #[error("Dataset '{0}' already exists in the namespace")]
    DuplicateDataset(String),
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors while writing a dataset to its destination.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Format other than JSON.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Save mode other than OVERWRITE / APPEND.
    #[error("Unknown save mode: {0}")]
    UnsupportedSaveMode(String),

    /// Sink input is not in the namespace.
    #[error("Dataset not found: {0}")]
    MissingInput(String),

    /// Filesystem failure.
    #[error("Error writing output {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record serialization failure.
    #[error("Error serializing record: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Observability Errors
// =============================================================================

/// Errors from the lineage/metrics recorder.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Store could not be written.
    #[error("Observability store IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be serialized.
    #[error("Observability JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// In-memory store lock was poisoned.
    #[error("Observability store unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::pipeline::Pipeline::run`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Metadata error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Source loading error.
    #[error("Source error in '{source_name}': {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceLoadError,
    },

    /// Transformation error.
    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    /// Sink error.
    #[error("Sink error in '{sink}': {error}")]
    Sink {
        sink: String,
        #[source]
        error: SinkError,
    },

    /// A dataflow failed; wraps the cause with the dataflow name.
    #[error("Dataflow '{dataflow}' failed: {error}")]
    Dataflow {
        dataflow: String,
        #[source]
        error: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attach the failing dataflow's name.
    pub fn in_dataflow(self, dataflow: impl Into<String>) -> Self {
        PipelineError::Dataflow {
            dataflow: dataflow.into(),
            error: Box::new(self),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for source loading.
pub type SourceResult<T> = Result<T, SourceLoadError>;

/// Result type for transformation operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for recorder operations.
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let transform_err = TransformError::MissingInput {
            input: "bogus".into(),
            referenced_by: "t1".into(),
        };
        let pipeline_err: PipelineError = transform_err.into();
        assert!(pipeline_err.to_string().contains("bogus"));

        let config_err = ConfigError::Schema(vec!["missing dataflows".into()]);
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("missing dataflows"));
    }

    #[test]
    fn test_rule_not_found_lists_available() {
        let err = TransformError::ValidationRuleNotFound {
            rule: "isPositive".into(),
            available: vec!["notEmpty".into(), "notNull".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("isPositive"));
        assert!(msg.contains("notEmpty, notNull"));
    }

    #[test]
    fn test_dataflow_context() {
        let err = PipelineError::Sink {
            sink: "ok".into(),
            error: SinkError::UnsupportedSaveMode("MERGE".into()),
        }
        .in_dataflow("prueba-acceso");
        let msg = err.to_string();
        assert!(msg.contains("prueba-acceso"));
        assert!(msg.contains("MERGE"));
    }
}
