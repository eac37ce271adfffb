//! Pipeline metadata: typed model and reader.
//!
//! A metadata document is a JSON object with a `dataflows` array. Each
//! dataflow declares its sources, an ordered list of transformations and
//! its sinks:
//!
//! ```json
//! {
//!   "dataflows": [{
//!     "name": "prueba-acceso",
//!     "sources": [{ "name": "person_inputs", "path": "/data/input/events/person/*", "format": "JSON" }],
//!     "transformations": [{
//!       "name": "validation",
//!       "type": "validate_fields",
//!       "params": {
//!         "input": "person_inputs",
//!         "validations": [{ "field": "office", "validations": ["notEmpty"] }]
//!       }
//!     }],
//!     "sinks": [{
//!       "input": "validation_ok", "name": "raw-ok",
//!       "paths": ["/data/output/events/person"], "format": "JSON", "saveMode": "OVERWRITE"
//!     }]
//!   }]
//! }
//! ```
//!
//! Loading validates eagerly, in two passes:
//! 1. the raw document against the embedded JSON Schema (every violation reported),
//! 2. typed conversion: format / save mode / transformation type become enums,
//!    and names are checked for uniqueness.

pub mod settings;

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

pub use settings::Settings;

static METADATA_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/metadata.schema.json"))
        .expect("Invalid embedded schema")
});

// =============================================================================
// Enum-like fields
// =============================================================================

/// Record serialization format. Only JSON flavours are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// One or more JSON objects per file (a single document, or one per line).
    Json,
    /// Strictly one JSON object per non-empty line.
    JsonLines,
}

impl DataFormat {
    pub const EXPECTED: &'static [&'static str] = &["JSON", "JSONL"];

    /// Case-insensitive parse; `None` for anything unsupported.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "JSON" => Some(Self::Json),
            "JSONL" | "JSON_LINES" | "NDJSON" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// How a sink treats existing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Truncate, then write.
    Overwrite,
    /// Write after existing content.
    Append,
}

impl SaveMode {
    pub const EXPECTED: &'static [&'static str] = &["OVERWRITE", "APPEND"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "OVERWRITE" => Some(Self::Overwrite),
            "APPEND" => Some(Self::Append),
            _ => None,
        }
    }
}

// =============================================================================
// Typed model
// =============================================================================

/// Root of a metadata document.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub dataflows: Vec<Dataflow>,
}

/// One pipeline definition.
#[derive(Debug, Clone)]
pub struct Dataflow {
    pub name: String,
    pub sources: Vec<Source>,
    pub transformations: Vec<Transformation>,
    pub sinks: Vec<Sink>,
}

/// Where to read input records from. `path` may contain wildcards.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub path: String,
    pub format: DataFormat,
}

/// One transformation step. Produces datasets keyed by `name`.
#[derive(Debug, Clone)]
pub struct Transformation {
    pub name: String,
    pub kind: TransformationKind,
}

/// Closed set of transformation types, each with its own params.
#[derive(Debug, Clone)]
pub enum TransformationKind {
    /// `validate_fields`: split input into `<name>_ok` / `<name>_ko`.
    ValidateFields {
        input: String,
        validations: Vec<FieldValidation>,
    },
    /// `add_fields`: set generated fields on every record into `<name>`.
    AddFields {
        input: String,
        fields: Vec<FieldGenerator>,
    },
}

impl TransformationKind {
    pub const EXPECTED: &'static [&'static str] = &["validate_fields", "add_fields"];

    /// Dataset this step reads.
    pub fn input(&self) -> &str {
        match self {
            Self::ValidateFields { input, .. } | Self::AddFields { input, .. } => input,
        }
    }

    /// Type name as written in metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ValidateFields { .. } => "validate_fields",
            Self::AddFields { .. } => "add_fields",
        }
    }
}

/// Rules to apply to one field, in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldValidation {
    pub field: String,
    pub validations: Vec<String>,
}

/// Field to set and the generator function producing its value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldGenerator {
    pub name: String,
    pub function: String,
}

/// Where to write a dataset. Only the first path is written.
#[derive(Debug, Clone)]
pub struct Sink {
    pub input: String,
    pub name: String,
    pub paths: Vec<String>,
    pub format: DataFormat,
    pub save_mode: SaveMode,
}

impl Sink {
    /// Destination directory actually written.
    pub fn primary_path(&self) -> &str {
        self.paths.first().map(String::as_str).unwrap_or_default()
    }
}

// =============================================================================
// Raw (wire) model
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawMetadata {
    dataflows: Vec<RawDataflow>,
}

#[derive(Debug, Deserialize)]
struct RawDataflow {
    name: String,
    sources: Vec<RawSource>,
    transformations: Vec<RawTransformation>,
    sinks: Vec<RawSink>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: String,
    path: String,
    format: String,
}

#[derive(Debug, Deserialize)]
struct RawTransformation {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    params: RawParams,
}

#[derive(Debug, Deserialize)]
struct RawParams {
    input: String,
    #[serde(default)]
    validations: Option<Vec<FieldValidation>>,
    #[serde(default, rename = "addFields")]
    add_fields: Option<Vec<FieldGenerator>>,
}

#[derive(Debug, Deserialize)]
struct RawSink {
    input: String,
    name: String,
    paths: Vec<String>,
    format: String,
    #[serde(rename = "saveMode")]
    save_mode: String,
}

// =============================================================================
// Reader
// =============================================================================

/// Loads and validates metadata documents.
pub struct MetadataReader;

impl MetadataReader {
    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<MetadataConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Load metadata from a JSON string.
    pub fn from_json(content: &str) -> ConfigResult<MetadataConfig> {
        let document: Value = serde_json::from_str(content)?;
        Self::from_value(document)
    }

    /// Validate an already-parsed document.
    pub fn from_value(document: Value) -> ConfigResult<MetadataConfig> {
        validate_schema(&document)?;
        let raw: RawMetadata = serde_json::from_value(document)?;
        let dataflows = raw
            .dataflows
            .into_iter()
            .map(convert_dataflow)
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(MetadataConfig { dataflows })
    }
}

fn validate_schema(document: &Value) -> ConfigResult<()> {
    let validator = jsonschema::draft7::new(&METADATA_SCHEMA)
        .map_err(|e| ConfigError::Schema(vec![format!("Invalid metadata schema: {}", e)]))?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Schema(errors))
    }
}

fn convert_dataflow(raw: RawDataflow) -> ConfigResult<Dataflow> {
    let dataflow = raw.name;
    let invalid = |message: String| ConfigError::Invalid {
        dataflow: dataflow.clone(),
        message,
    };

    let mut source_names = HashSet::new();
    let mut sources = Vec::with_capacity(raw.sources.len());
    for source in raw.sources {
        if !source_names.insert(source.name.clone()) {
            return Err(invalid(format!("duplicate source name '{}'", source.name)));
        }
        sources.push(Source {
            format: parse_format(&source.format, &format!("sources.{}.format", source.name))?,
            name: source.name,
            path: source.path,
        });
    }

    let mut transformation_names = HashSet::new();
    let mut transformations = Vec::with_capacity(raw.transformations.len());
    for transformation in raw.transformations {
        if !transformation_names.insert(transformation.name.clone()) {
            return Err(invalid(format!(
                "duplicate transformation name '{}'",
                transformation.name
            )));
        }
        let kind = convert_kind(&transformation.name, transformation.kind, transformation.params)
            .map_err(|e| match e {
                ConfigError::Invalid { message, .. } => invalid(message),
                other => other,
            })?;
        transformations.push(Transformation {
            name: transformation.name,
            kind,
        });
    }

    let mut sinks = Vec::with_capacity(raw.sinks.len());
    for sink in raw.sinks {
        if sink.paths.is_empty() {
            return Err(invalid(format!("sink '{}' declares no paths", sink.name)));
        }
        let save_mode = SaveMode::parse(&sink.save_mode).ok_or_else(|| ConfigError::InvalidValue {
            field: format!("sinks.{}.saveMode", sink.name),
            value: sink.save_mode.clone(),
            expected: expected(SaveMode::EXPECTED),
        })?;
        sinks.push(Sink {
            format: parse_format(&sink.format, &format!("sinks.{}.format", sink.name))?,
            input: sink.input,
            name: sink.name,
            paths: sink.paths,
            save_mode,
        });
    }

    Ok(Dataflow {
        name: dataflow,
        sources,
        transformations,
        sinks,
    })
}

fn convert_kind(name: &str, kind: String, params: RawParams) -> ConfigResult<TransformationKind> {
    let missing = |param: &str| ConfigError::Invalid {
        dataflow: String::new(),
        message: format!("transformation '{}' of type '{}' requires params.{}", name, kind, param),
    };

    match kind.as_str() {
        "validate_fields" => Ok(TransformationKind::ValidateFields {
            validations: params.validations.ok_or_else(|| missing("validations"))?,
            input: params.input,
        }),
        "add_fields" => Ok(TransformationKind::AddFields {
            fields: params.add_fields.ok_or_else(|| missing("addFields"))?,
            input: params.input,
        }),
        _ => Err(ConfigError::UnknownTransformationType {
            transformation: name.to_string(),
            kind: kind.clone(),
        }),
    }
}

fn parse_format(value: &str, field: &str) -> ConfigResult<DataFormat> {
    DataFormat::parse(value).ok_or_else(|| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected(DataFormat::EXPECTED),
    })
}

fn expected(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
