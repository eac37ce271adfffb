//! Transformation engine.
//!
//! Compiles a dataflow's transformations against a [`RuleRegistry`] into a
//! [`Plan`], then applies the steps in order against a [`Namespace`].

use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use super::field_adder::FieldAdder;
use super::validator::FieldValidator;
use crate::config::{Dataflow, Transformation, TransformationKind};
use crate::error::{TransformError, TransformResult};
use crate::models::{Dataset, Namespace};
use crate::registry::RuleRegistry;

/// A transformation with every rule and function reference resolved.
#[derive(Debug, Clone)]
pub enum CompiledTransformation {
    Validate(FieldValidator),
    AddFields(FieldAdder),
}

impl CompiledTransformation {
    pub fn compile(transformation: &Transformation, registry: &RuleRegistry) -> TransformResult<Self> {
        let name = &transformation.name;
        match &transformation.kind {
            TransformationKind::ValidateFields { input, validations } => Ok(Self::Validate(
                FieldValidator::compile(name, input, validations, registry)?,
            )),
            TransformationKind::AddFields { input, fields } => {
                Ok(Self::AddFields(FieldAdder::compile(name, input, fields, registry)?))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Validate(v) => v.name(),
            Self::AddFields(a) => a.name(),
        }
    }

    pub fn input(&self) -> &str {
        match self {
            Self::Validate(v) => v.input(),
            Self::AddFields(a) => a.input(),
        }
    }

    /// Lineage label: `validation` or `add_fields`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validate(_) => super::validator::KIND,
            Self::AddFields(_) => super::field_adder::KIND,
        }
    }

    /// Names of the datasets this step produces.
    pub fn outputs(&self) -> Vec<String> {
        match self {
            Self::Validate(v) => vec![v.ok_name(), v.ko_name()],
            Self::AddFields(a) => vec![a.name().to_string()],
        }
    }

    /// Run the step over `input`. The input dataset is not modified.
    pub fn execute(&self, input: &Dataset) -> Vec<Dataset> {
        match self {
            Self::Validate(v) => {
                let (ok, ko) = v.execute(input);
                vec![ok, ko]
            }
            Self::AddFields(a) => vec![a.execute(input)],
        }
    }
}

/// Ordered, fully-resolved transformation steps of one dataflow.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<CompiledTransformation>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Counts for one executed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub transformation: String,
    pub kind: String,
    pub records_in: usize,
    /// Records in the primary output: `_ok` for validation, the enriched dataset otherwise.
    pub records_out: usize,
    /// Every produced dataset with its size.
    pub outputs: Vec<(String, usize)>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}

/// Compiles and runs transformations with a fixed set of rules and functions.
#[derive(Debug, Clone, Default)]
pub struct TransformationEngine {
    registry: RuleRegistry,
}

impl TransformationEngine {
    pub fn new(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Resolve every step of `dataflow` and check that each input (of
    /// transformations and sinks) is produced by a source or an earlier step.
    pub fn compile(&self, dataflow: &Dataflow) -> TransformResult<Plan> {
        let mut known: HashSet<String> = HashSet::new();
        for source in &dataflow.sources {
            if !known.insert(source.name.clone()) {
                return Err(TransformError::DuplicateDataset(source.name.clone()));
            }
        }

        let mut steps = Vec::with_capacity(dataflow.transformations.len());
        for transformation in &dataflow.transformations {
            let step = CompiledTransformation::compile(transformation, &self.registry)?;
            if !known.contains(step.input()) {
                return Err(TransformError::MissingInput {
                    input: step.input().to_string(),
                    referenced_by: step.name().to_string(),
                });
            }
            for output in step.outputs() {
                if !known.insert(output.clone()) {
                    return Err(TransformError::DuplicateDataset(output));
                }
            }
            steps.push(step);
        }

        for sink in &dataflow.sinks {
            if !known.contains(&sink.input) {
                return Err(TransformError::MissingInput {
                    input: sink.input.clone(),
                    referenced_by: sink.name.clone(),
                });
            }
        }

        Ok(Plan { steps })
    }

    /// Apply one step, adding its outputs to `namespace`.
    pub fn apply(&self, step: &CompiledTransformation, namespace: &mut Namespace) -> TransformResult<StepReport> {
        let started = Instant::now();
        let input = namespace.resolve(step.input(), step.name())?;
        let records_in = input.len();
        let outputs = step.execute(input);

        let summary: Vec<(String, usize)> = outputs.iter().map(|d| (d.name.clone(), d.len())).collect();
        let records_out = summary.first().map(|(_, n)| *n).unwrap_or_default();

        for dataset in outputs {
            namespace.insert(dataset)?;
        }

        Ok(StepReport {
            transformation: step.name().to_string(),
            kind: step.kind().to_string(),
            records_in,
            records_out,
            outputs: summary,
            duration: started.elapsed(),
        })
    }
}
