//! # Metaetl - metadata-driven ETL with record-level lineage
//!
//! A JSON metadata document describes dataflows: sources to load, an ordered
//! list of transformations, and sinks to write. The engine interprets it,
//! validating and enriching records and recording where every record came
//! from and where it went.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Metadata   │────▶│   Sources   │────▶│  Transform  │────▶│    Sinks    │
//! │   (JSON)    │     │ (glob/JSON) │     │ (ok/ko/add) │     │ (JSON lines)│
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │
//!                                         ┌──────▼──────┐
//!                                         │   Lineage   │
//!                                         │  & metrics  │
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use metaetl::{Pipeline, RuleRegistry};
//!
//! let report = Pipeline::new(RuleRegistry::new()).run_file("metadata.json")?;
//! println!("{} records written", report.records_processed());
//! ```
//!
//! ## Following a run
//!
//! Progress entries go to `tracing` and to [`LOG_BROADCASTER`]. Embedders
//! that want a live feed (a UI, a job runner) subscribe before running:
//!
//! ```rust,ignore
//! use metaetl::{Pipeline, RuleRegistry, LOG_BROADCASTER};
//!
//! let mut logs = LOG_BROADCASTER.subscribe();
//! let report = Pipeline::new(RuleRegistry::new()).run_file("metadata.json")?;
//! while let Ok(entry) = logs.try_recv() {
//!     println!("[{:?}] {}", entry.level, entry.message);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Metadata model, reader and runtime settings
//! - [`models`] - Records, datasets and the dataset namespace
//! - [`source`] - Source loading with wildcard paths
//! - [`registry`] - Validation rules and field functions
//! - [`transform`] - Validation, enrichment and the transformation engine
//! - [`sink`] - Output writing
//! - [`observability`] - Progress logs, execution metrics and lineage
//! - [`pipeline`] - Dataflow orchestration

// Core modules
pub mod error;
pub mod models;

// Configuration
pub mod config;

// Input / output
pub mod sink;
pub mod source;

// Rules and transformations
pub mod registry;
pub mod transform;

// Lineage & logs
pub mod observability;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ObservabilityError,
    PipelineError,
    PipelineResult,
    SinkError,
    SourceLoadError,
    TransformError,
};

// =============================================================================
// Re-exports - Models & config
// =============================================================================

pub use models::{Dataset, FieldError, Namespace, Record, TrackedRecord, ERRORS_FIELD};

pub use config::{
    DataFormat,
    Dataflow,
    MetadataConfig,
    MetadataReader,
    SaveMode,
    Settings,
    Sink,
    Source,
    Transformation,
    TransformationKind,
};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use registry::{FieldFunction, RuleRegistry, ValidationRule};
pub use sink::SinkWriter;
pub use source::SourceLoader;
pub use transform::{CompiledTransformation, Plan, StepReport, TransformationEngine};

// =============================================================================
// Re-exports - Observability & pipeline
// =============================================================================

pub use observability::logs::{log_error, log_info, log_success, log_warning, LOG_BROADCASTER};
pub use observability::{
    ExecutionRecorder,
    ExecutionStatus,
    FileRecorder,
    MemoryRecorder,
    NoopRecorder,
    Observer,
    TransformationMetrics,
};
pub use pipeline::{DataflowReport, Pipeline, RunReport, SinkReport};
