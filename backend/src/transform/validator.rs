//! `validate_fields`: split a dataset into passing (`_ok`) and failing (`_ko`) records.

use crate::config::FieldValidation;
use crate::error::TransformResult;
use crate::models::{Dataset, FieldError, Record};
use crate::registry::{RuleRegistry, ValidationRule};

/// Lineage label for this transformation kind.
pub const KIND: &str = "validation";

pub const OK_SUFFIX: &str = "_ok";
pub const KO_SUFFIX: &str = "_ko";

/// Outcome of validating one record. The record itself is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub errors: Vec<FieldError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validation rules for one field, resolved against the registry.
#[derive(Debug, Clone)]
struct FieldRules {
    field: String,
    rules: Vec<ValidationRule>,
}

/// A compiled `validate_fields` transformation.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    name: String,
    input: String,
    fields: Vec<FieldRules>,
}

impl FieldValidator {
    /// Resolve every rule name now; unknown names fail here, before any record is seen.
    pub fn compile(
        name: &str,
        input: &str,
        validations: &[FieldValidation],
        registry: &RuleRegistry,
    ) -> TransformResult<Self> {
        let fields = validations
            .iter()
            .map(|v| {
                let rules = v
                    .validations
                    .iter()
                    .map(|rule| registry.validation(rule))
                    .collect::<TransformResult<Vec<_>>>()?;
                Ok(FieldRules {
                    field: v.field.clone(),
                    rules,
                })
            })
            .collect::<TransformResult<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            input: input.to_string(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn ok_name(&self) -> String {
        format!("{}{}", self.name, OK_SUFFIX)
    }

    pub fn ko_name(&self) -> String {
        format!("{}{}", self.name, KO_SUFFIX)
    }

    /// Apply every rule to every declared field, collecting all failures.
    pub fn validate(&self, record: &Record) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        for field_rules in &self.fields {
            let value = record.get(&field_rules.field);
            for rule in &field_rules.rules {
                if !rule.passes(value) {
                    outcome.errors.push(FieldError {
                        field: field_rules.field.clone(),
                        validation: rule.name.clone(),
                        error_code: rule.error_code(),
                        message: rule.message.clone(),
                    });
                }
            }
        }

        outcome
    }

    /// Route each input record to the OK or KO dataset, preserving order.
    ///
    /// Records arriving with errors from an earlier validation keep them and
    /// land in KO. Both datasets are always produced.
    pub fn execute(&self, input: &Dataset) -> (Dataset, Dataset) {
        let ok_name = self.ok_name();
        let ko_name = self.ko_name();
        let mut ok = Vec::new();
        let mut ko = Vec::new();

        for tracked in &input.records {
            let outcome = self.validate(&tracked.record);
            let mut errors = tracked.errors.clone();
            errors.extend(outcome.errors);

            if errors.is_empty() {
                ok.push(tracked.derive(tracked.record.clone(), errors, KIND, &ok_name));
            } else {
                ko.push(tracked.derive(tracked.record.clone(), errors, KIND, &ko_name));
            }
        }

        (Dataset::new(ok_name, ok), Dataset::new(ko_name, ko))
    }
}
