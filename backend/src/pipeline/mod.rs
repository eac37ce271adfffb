//! Pipeline orchestration: run every dataflow of a metadata document.
//!
//! For each dataflow, in order:
//!
//! 1. Record the execution start
//! 2. Compile the transformations (rule/function names, input references)
//! 3. Load every source into the dataset namespace
//! 4. Apply every transformation, recording its metrics
//! 5. Track lineage and write every sink
//! 6. Record the execution end, `success` or `failed`
//!
//! The first error aborts the run. Sinks written by earlier dataflows (or
//! earlier sinks of the failing one) stay on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use metaetl::{Pipeline, RuleRegistry};
//!
//! let report = Pipeline::new(RuleRegistry::new()).run_file("metadata.json")?;
//! for dataflow in &report.dataflows {
//!     println!("{}: {} records written", dataflow.name, dataflow.records_processed);
//! }
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Dataflow, MetadataConfig, MetadataReader, Settings};
use crate::error::{PipelineError, PipelineResult, SinkError};
use crate::models::Namespace;
use crate::observability::logs::{log_error, log_info, log_success};
use crate::observability::{ExecutionRecorder, ExecutionStatus, FileRecorder, Observer, TransformationMetrics};
use crate::registry::RuleRegistry;
use crate::sink::SinkWriter;
use crate::source::SourceLoader;
use crate::transform::{validator, StepReport, TransformationEngine};

/// One sink written during a dataflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkReport {
    pub name: String,
    pub input: String,
    pub output_file: PathBuf,
    pub records: usize,
}

/// Outcome of one successful dataflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataflowReport {
    pub name: String,
    /// Loaded sources with their record counts.
    pub sources: Vec<(String, usize)>,
    pub transformations: Vec<StepReport>,
    pub sinks: Vec<SinkReport>,
    /// Records handed to sinks.
    pub records_processed: usize,
    /// Records routed to `_ok` / `_ko` across all validations.
    pub records_valid: usize,
    pub records_invalid: usize,
    #[serde(rename = "duration_ms", serialize_with = "serialize_ms")]
    pub duration: Duration,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub execution_id: String,
    pub dataflows: Vec<DataflowReport>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_ms")]
    pub duration: Duration,
}

impl RunReport {
    pub fn records_processed(&self) -> usize {
        self.dataflows.iter().map(|d| d.records_processed).sum()
    }
}

fn serialize_ms<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_millis())
}

/// Runs dataflows with one engine and one observer.
#[derive(Debug, Clone)]
pub struct Pipeline {
    engine: TransformationEngine,
    observer: Observer,
}

impl Pipeline {
    /// Pipeline that records nothing.
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            engine: TransformationEngine::new(registry),
            observer: Observer::disabled(),
        }
    }

    /// Pipeline configured from runtime settings: a file recorder under the
    /// lineage directory, unless observability is switched off.
    pub fn from_settings(registry: RuleRegistry, settings: &Settings) -> Self {
        let pipeline = Self::new(registry);
        if settings.observability {
            pipeline.with_recorder(Arc::new(FileRecorder::new(&settings.lineage_dir)))
        } else {
            pipeline
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        self.observer = Observer::new(recorder);
        self
    }

    pub fn engine(&self) -> &TransformationEngine {
        &self.engine
    }

    /// Load a metadata file and run it.
    pub fn run_file(&self, path: impl AsRef<Path>) -> PipelineResult<RunReport> {
        let config = MetadataReader::load(path)?;
        self.run(&config)
    }

    /// Run every dataflow in order under one execution id.
    pub fn run(&self, config: &MetadataConfig) -> PipelineResult<RunReport> {
        let started = Instant::now();
        let execution_id = uuid::Uuid::new_v4().to_string();
        log_info(format!("Starting ETL execution: {}", execution_id));

        let mut dataflows = Vec::with_capacity(config.dataflows.len());
        for dataflow in &config.dataflows {
            dataflows.push(self.run_dataflow(&execution_id, dataflow)?);
        }

        Ok(RunReport {
            execution_id,
            dataflows,
            duration: started.elapsed(),
        })
    }

    /// Run one dataflow, recording its start and end.
    pub fn run_dataflow(&self, execution_id: &str, dataflow: &Dataflow) -> PipelineResult<DataflowReport> {
        let _span = tracing::info_span!("dataflow", name = %dataflow.name, execution_id).entered();
        log_info(format!("Processing dataflow: {}", dataflow.name));
        self.observer.start_execution(execution_id, &dataflow.name);

        let mut processed = 0;
        match self.execute(execution_id, dataflow, &mut processed) {
            Ok(report) => {
                self.observer
                    .finish_execution(execution_id, ExecutionStatus::Success, report.records_processed);
                log_success(format!("Dataflow {} completed", dataflow.name));
                Ok(report)
            }
            Err(e) => {
                self.observer
                    .finish_execution(execution_id, ExecutionStatus::Failed, processed);
                log_error(format!("Dataflow {} failed: {}", dataflow.name, e));
                Err(e.in_dataflow(&dataflow.name))
            }
        }
    }

    fn execute(&self, execution_id: &str, dataflow: &Dataflow, processed: &mut usize) -> PipelineResult<DataflowReport> {
        let started = Instant::now();
        let plan = self.engine.compile(dataflow)?;
        let mut namespace = Namespace::new();

        // Load sources
        let mut sources = Vec::with_capacity(dataflow.sources.len());
        for source in &dataflow.sources {
            log_info(format!("Loading {} from {}", source.name, source.path));
            let dataset = SourceLoader::load(source).map_err(|error| PipelineError::Source {
                source_name: source.name.clone(),
                error,
            })?;
            log_info(format!("Loaded {} records from {}", dataset.len(), source.name));
            sources.push((source.name.clone(), dataset.len()));
            namespace.insert(dataset)?;
        }

        // Apply transformations
        let mut transformations = Vec::with_capacity(plan.len());
        let (mut records_valid, mut records_invalid) = (0, 0);
        for step in &plan.steps {
            log_info(format!("Running transformation: {} ({})", step.name(), step.kind()));
            let report = self.engine.apply(step, &mut namespace)?;

            if report.kind == validator::KIND {
                let ko = report.outputs.get(1).map(|(_, n)| *n).unwrap_or_default();
                records_valid += report.records_out;
                records_invalid += ko;
                log_info(format!("Validation: {} valid, {} invalid", report.records_out, ko));
            } else {
                log_info(format!("Added fields to {} records", report.records_out));
            }

            self.observer.save_transformation_metrics(&TransformationMetrics::new(
                execution_id,
                &report.transformation,
                &report.kind,
                report.records_in,
                report.records_out,
                report.duration,
            ));
            transformations.push(report);
        }

        // Write outputs
        let mut sinks = Vec::with_capacity(dataflow.sinks.len());
        for sink in &dataflow.sinks {
            let dataset = namespace.get(&sink.input).ok_or_else(|| PipelineError::Sink {
                sink: sink.name.clone(),
                error: SinkError::MissingInput(sink.input.clone()),
            })?;

            log_info(format!(
                "Writing {} records to {} ({:?})",
                dataset.len(),
                sink.primary_path(),
                sink.save_mode
            ));
            self.observer
                .track_records(execution_id, &dataset.records, sink.primary_path());

            let (output_file, records) = SinkWriter::write(dataset, sink).map_err(|error| PipelineError::Sink {
                sink: sink.name.clone(),
                error,
            })?;
            *processed += records;
            sinks.push(SinkReport {
                name: sink.name.clone(),
                input: sink.input.clone(),
                output_file,
                records,
            });
        }

        Ok(DataflowReport {
            name: dataflow.name.clone(),
            sources,
            transformations,
            sinks,
            records_processed: *processed,
            records_valid,
            records_invalid,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SourceLoadError, TransformError};
    use crate::models::ERRORS_FIELD;
    use crate::observability::MemoryRecorder;
    use chrono::DateTime;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const PEOPLE: &str = concat!(
        "{\"name\":\"A\",\"age\":30,\"office\":\"MADRID\"}\n",
        "{\"name\":\"B\",\"office\":\"SEVILLA\"}\n",
        "{\"name\":\"C\",\"age\":40,\"office\":\"\"}\n",
        "{\"name\":\"D\",\"age\":50,\"office\":\"BILBAO\"}\n",
    );

    fn fixed_registry() -> RuleRegistry {
        let fixed = DateTime::parse_from_rfc3339("2024-03-15T09:30:05+00:00").unwrap();
        RuleRegistry::with_clock(Arc::new(move || fixed))
    }

    fn workspace() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("input/person")).unwrap();
        fs::write(dir.path().join("input/person/people.json"), PEOPLE).unwrap();
        dir
    }

    fn metadata(dir: &Path, save_mode: &str) -> Value {
        let root = dir.display();
        json!({
            "dataflows": [{
                "name": "prueba-acceso",
                "sources": [{
                    "name": "person_inputs",
                    "path": format!("{}/input/person/*", root),
                    "format": "JSON"
                }],
                "transformations": [
                    {
                        "name": "validation",
                        "type": "validate_fields",
                        "params": {
                            "input": "person_inputs",
                            "validations": [
                                { "field": "office", "validations": ["notEmpty"] },
                                { "field": "age", "validations": ["notNull"] }
                            ]
                        }
                    },
                    {
                        "name": "ok_with_date",
                        "type": "add_fields",
                        "params": {
                            "input": "validation_ok",
                            "addFields": [{ "name": "dt", "function": "current_timestamp" }]
                        }
                    }
                ],
                "sinks": [
                    {
                        "input": "ok_with_date",
                        "name": "raw-ok",
                        "paths": [format!("{}/output/events/person", root)],
                        "format": "JSON",
                        "saveMode": save_mode
                    },
                    {
                        "input": "validation_ko",
                        "name": "raw-ko",
                        "paths": [format!("{}/output/discards/person", root)],
                        "format": "JSON",
                        "saveMode": save_mode
                    }
                ]
            }]
        })
    }

    fn read_output(path: PathBuf) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn names(rows: &[Value]) -> Vec<&str> {
        rows.iter().map(|r| r["name"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_end_to_end_ok_ko_split() {
        let dir = workspace();
        let recorder = Arc::new(MemoryRecorder::new());
        let pipeline = Pipeline::new(fixed_registry()).with_recorder(recorder.clone());

        let config = MetadataReader::from_value(metadata(dir.path(), "OVERWRITE")).unwrap();
        let report = pipeline.run(&config).unwrap();

        let ok = read_output(dir.path().join("output/events/person/output.json"));
        let ko = read_output(dir.path().join("output/discards/person/output.json"));
        assert_eq!(names(&ok), vec!["A", "D"]);
        assert_eq!(names(&ko), vec!["B", "C"]);

        assert!(ok.iter().all(|r| r["dt"] == "2024-03-15 09:30:05"));
        assert!(ok.iter().all(|r| r.get(ERRORS_FIELD).is_none()));
        assert_eq!(ko[0][ERRORS_FIELD][0]["field"], "age");
        assert_eq!(ko[0][ERRORS_FIELD][0]["validation"], "notNull");
        assert_eq!(ko[1][ERRORS_FIELD][0]["field"], "office");
        assert_eq!(ko[1][ERRORS_FIELD][0]["validation"], "notEmpty");
        assert_eq!(ko[1][ERRORS_FIELD].as_array().unwrap().len(), 1);

        let df = &report.dataflows[0];
        assert_eq!(df.sources, vec![("person_inputs".to_string(), 4)]);
        assert_eq!(df.records_processed, 4);
        assert_eq!((df.records_valid, df.records_invalid), (2, 2));
        assert_eq!(report.records_processed(), 4);

        let entries = recorder.snapshot().unwrap();
        assert_eq!(entries.executions.len(), 2);
        assert!(entries.executions.iter().all(|e| e.execution_id == report.execution_id));
        assert_eq!(entries.executions[1].status, ExecutionStatus::Success);
        assert_eq!(entries.executions[1].records_processed, Some(4));
        assert_eq!(entries.metrics.len(), 2);
        assert_eq!(entries.metrics[0].records_in, 4);
        assert_eq!(entries.metrics[0].records_out, 2);

        assert_eq!(entries.lineage.len(), 4);
        assert_eq!(entries.lineage[0].record_id, "A-30-MADRID");
        assert_eq!(
            entries.lineage[0].transformation_path,
            "person_inputs->validation->validation_ok->add_fields->ok_with_date"
        );
        assert!(entries.lineage[0].source_file.ends_with("people.json"));
        assert_eq!(
            entries.lineage[2].transformation_path,
            "person_inputs->validation->validation_ko"
        );
        assert!(!entries.lineage[2].validation_passed);
        assert_eq!(entries.validation_errors.len(), 2);
    }

    #[test]
    fn test_append_accumulates_lines() {
        let dir = workspace();
        let config = MetadataReader::from_value(metadata(dir.path(), "OVERWRITE")).unwrap();
        let pipeline = Pipeline::new(fixed_registry());
        pipeline.run(&config).unwrap();

        let append = MetadataReader::from_value(metadata(dir.path(), "APPEND")).unwrap();
        pipeline.run(&append).unwrap();

        let ok = read_output(dir.path().join("output/events/person/output.json"));
        let ko = read_output(dir.path().join("output/discards/person/output.json"));
        assert_eq!(ok.len(), 4);
        assert_eq!(ko.len(), 4);
        assert_eq!(names(&ok), vec!["A", "D", "A", "D"]);
    }

    #[test]
    fn test_overwrite_round_trip() {
        let dir = workspace();
        let root = dir.path().display().to_string();
        let doc = json!({
            "dataflows": [{
                "name": "copy",
                "sources": [{ "name": "people", "path": format!("{}/input/person/people.json", root), "format": "JSON" }],
                "transformations": [],
                "sinks": [{
                    "input": "people",
                    "name": "copy",
                    "paths": [format!("{}/copy", root)],
                    "format": "JSON",
                    "saveMode": "OVERWRITE"
                }]
            }]
        });
        Pipeline::new(RuleRegistry::new())
            .run(&MetadataReader::from_value(doc).unwrap())
            .unwrap();

        let written = read_output(dir.path().join("copy/output.json"));
        let original: Vec<Value> = PEOPLE.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(written, original);
    }

    #[test]
    fn test_unknown_transformation_type_writes_nothing() {
        let dir = workspace();
        let root = dir.path().display().to_string();
        let doc = json!({
            "dataflows": [{
                "name": "bogus",
                "sources": [{ "name": "s1", "path": format!("{}/input/person/*", root), "format": "JSON" }],
                "transformations": [{ "name": "t1", "type": "bogus", "params": { "input": "s1" } }],
                "sinks": [{
                    "input": "s1",
                    "name": "out",
                    "paths": [format!("{}/out", root)],
                    "format": "JSON",
                    "saveMode": "OVERWRITE"
                }]
            }]
        });
        let path = dir.path().join("metadata.json");
        fs::write(&path, doc.to_string()).unwrap();

        let err = Pipeline::new(RuleRegistry::new()).run_file(&path).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownTransformationType { ref kind, .. }) if kind == "bogus"
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_glob_without_matches_fails_dataflow() {
        let dir = workspace();
        let mut doc = metadata(dir.path(), "OVERWRITE");
        doc["dataflows"][0]["sources"][0]["path"] = json!(format!("{}/input/person/*.jsonl", dir.path().display()));

        let recorder = Arc::new(MemoryRecorder::new());
        let err = Pipeline::new(RuleRegistry::new())
            .with_recorder(recorder.clone())
            .run(&MetadataReader::from_value(doc).unwrap())
            .unwrap_err();

        match err {
            PipelineError::Dataflow { dataflow, error } => {
                assert_eq!(dataflow, "prueba-acceso");
                assert!(matches!(
                    *error,
                    PipelineError::Source { error: SourceLoadError::NoMatches(_), .. }
                ));
            }
            other => panic!("expected dataflow error, got {other}"),
        }

        assert!(!dir.path().join("output").exists());
        let entries = recorder.snapshot().unwrap();
        assert_eq!(entries.executions[1].status, ExecutionStatus::Failed);
        assert_eq!(entries.executions[1].records_processed, Some(0));
    }

    #[test]
    fn test_unknown_rule_fails_before_loading() {
        let dir = workspace();
        let mut doc = metadata(dir.path(), "OVERWRITE");
        doc["dataflows"][0]["transformations"][0]["params"]["validations"][0]["validations"] = json!(["isAdult"]);

        let err = Pipeline::new(RuleRegistry::new())
            .run(&MetadataReader::from_value(doc).unwrap())
            .unwrap_err();

        match err {
            PipelineError::Dataflow { error, .. } => assert!(matches!(
                *error,
                PipelineError::Transform(TransformError::ValidationRuleNotFound { .. })
            )),
            other => panic!("expected dataflow error, got {other}"),
        }
        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn test_earlier_dataflow_output_is_kept() {
        let dir = workspace();
        let mut doc = metadata(dir.path(), "OVERWRITE");
        let mut broken = doc["dataflows"][0].clone();
        broken["name"] = json!("broken");
        broken["sources"][0]["path"] = json!(format!("{}/missing/*", dir.path().display()));
        broken["sinks"][0]["paths"] = json!([format!("{}/output/broken", dir.path().display())]);
        doc["dataflows"].as_array_mut().unwrap().push(broken);

        let err = Pipeline::new(fixed_registry())
            .run(&MetadataReader::from_value(doc).unwrap())
            .unwrap_err();

        assert!(err.to_string().contains("broken"));
        assert!(dir.path().join("output/events/person/output.json").is_file());
        assert!(!dir.path().join("output/broken").exists());
    }

    #[test]
    fn test_sink_failure_keeps_earlier_sinks() {
        let dir = workspace();
        fs::create_dir_all(dir.path().join("output/discards")).unwrap();
        fs::write(dir.path().join("output/discards/person"), "blocked").unwrap();

        let recorder = Arc::new(MemoryRecorder::new());
        let err = Pipeline::new(fixed_registry())
            .with_recorder(recorder.clone())
            .run(&MetadataReader::from_value(metadata(dir.path(), "OVERWRITE")).unwrap())
            .unwrap_err();

        match err {
            PipelineError::Dataflow { error, .. } => match *error {
                PipelineError::Sink { sink, error: SinkError::Io { .. } } => assert_eq!(sink, "raw-ko"),
                other => panic!("expected sink IO error, got {other}"),
            },
            other => panic!("expected dataflow error, got {other}"),
        }

        let ok = read_output(dir.path().join("output/events/person/output.json"));
        assert_eq!(names(&ok), vec!["A", "D"]);

        let entries = recorder.snapshot().unwrap();
        assert_eq!(entries.executions[1].status, ExecutionStatus::Failed);
        assert_eq!(entries.executions[1].records_processed, Some(2));
    }

    #[test]
    fn test_from_settings_writes_lineage_files() {
        let dir = workspace();
        let settings = Settings {
            lineage_dir: dir.path().join("obs"),
            observability: true,
        };
        Pipeline::from_settings(fixed_registry(), &settings)
            .run(&MetadataReader::from_value(metadata(dir.path(), "OVERWRITE")).unwrap())
            .unwrap();

        let lineage = fs::read_to_string(dir.path().join("obs/record_lineage.jsonl")).unwrap();
        assert_eq!(lineage.lines().count(), 4);
        assert!(dir.path().join("obs/executions.jsonl").is_file());
    }
}
