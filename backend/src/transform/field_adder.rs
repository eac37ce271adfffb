//! `add_fields`: enrich every record with generated values.

use serde_json::Value;

use crate::config::FieldGenerator;
use crate::error::TransformResult;
use crate::models::Dataset;
use crate::registry::{FieldFunction, RuleRegistry};

/// Lineage label for this transformation kind.
pub const KIND: &str = "add_fields";

/// A compiled `add_fields` transformation.
#[derive(Debug, Clone)]
pub struct FieldAdder {
    name: String,
    input: String,
    fields: Vec<(String, FieldFunction)>,
}

impl FieldAdder {
    /// Resolve every function name now; unknown names fail here.
    pub fn compile(
        name: &str,
        input: &str,
        generators: &[FieldGenerator],
        registry: &RuleRegistry,
    ) -> TransformResult<Self> {
        let fields = generators
            .iter()
            .map(|g| Ok((g.name.clone(), registry.function(&g.function)?)))
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

    /// Generated values for one record. Each function runs exactly once.
    pub fn generate(&self) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .map(|(field, function)| (field.clone(), function.generate()))
            .collect()
    }

    /// New dataset named after the transformation, one enriched record per input record.
    /// Errors carried by the input records are kept.
    pub fn execute(&self, input: &Dataset) -> Dataset {
        let records = input
            .records
            .iter()
            .map(|tracked| {
                let record = tracked.record.with_fields(self.generate());
                tracked.derive(record, tracked.errors.clone(), KIND, &self.name)
            })
            .collect();

        Dataset::new(self.name.clone(), records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::models::{FieldError, Record, TrackedRecord};
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn generator(name: &str, function: &str) -> FieldGenerator {
        FieldGenerator {
            name: name.to_string(),
            function: function.to_string(),
        }
    }

    fn input() -> Dataset {
        let rows = [json!({"name": "A", "dt": "stale"}), json!({"name": "D"})];
        let records = rows
            .into_iter()
            .map(|row| {
                let map = row.as_object().cloned().unwrap();
                TrackedRecord::loaded(Record::new(map), Arc::from("a.json"), "validation_ok")
            })
            .collect();
        Dataset::new("validation_ok", records)
    }

    fn fixed_registry() -> RuleRegistry {
        let fixed = DateTime::parse_from_rfc3339("2024-03-15T09:30:05+00:00").unwrap();
        RuleRegistry::with_clock(Arc::new(move || fixed))
    }

    #[test]
    fn test_adds_and_overwrites() {
        let adder = FieldAdder::compile(
            "ok_with_date",
            "validation_ok",
            &[generator("dt", "current_timestamp"), generator("day", "current_date")],
            &fixed_registry(),
        )
        .unwrap();

        let out = adder.execute(&input());
        assert_eq!(out.name, "ok_with_date");
        assert_eq!(out.len(), 2);
        for tracked in &out.records {
            assert_eq!(tracked.record.get("dt"), Some(&json!("2024-03-15 09:30:05")));
            assert_eq!(tracked.record.get("day"), Some(&json!("2024-03-15")));
        }
        assert_eq!(out.records[0].record.get("name"), Some(&json!("A")));
        assert_eq!(
            out.records[1].transformation_path,
            "validation_ok->add_fields->ok_with_date"
        );
    }

    #[test]
    fn test_function_called_once_per_record() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut registry = RuleRegistry::new();
        let counter = Arc::clone(&calls);
        registry.register_function("seq", move || json!(counter.fetch_add(1, Ordering::SeqCst)));

        let adder = FieldAdder::compile("t", "validation_ok", &[generator("seq", "seq")], &registry).unwrap();
        let out = adder.execute(&input());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.records[0].record.get("seq"), Some(&json!(0)));
        assert_eq!(out.records[1].record.get("seq"), Some(&json!(1)));
    }

    #[test]
    fn test_errors_are_carried() {
        let mut data = input();
        data.records[0].errors.push(FieldError {
            field: "age".into(),
            validation: "notNull".into(),
            error_code: "NOT_NULL".into(),
            message: "Field cannot be null".into(),
        });

        let adder = FieldAdder::compile("t", "x", &[generator("id", "uuid")], &RuleRegistry::new()).unwrap();
        let out = adder.execute(&data);

        assert_eq!(out.records[0].errors.len(), 1);
        assert!(out.records[1].errors.is_empty());
        assert_ne!(out.records[0].record.get("id"), out.records[1].record.get("id"));
    }

    #[test]
    fn test_unknown_function_fails_at_compile() {
        let err = FieldAdder::compile("t", "x", &[generator("dt", "tomorrow")], &RuleRegistry::new()).unwrap_err();
        assert!(matches!(err, TransformError::FieldFunctionNotFound { ref function, .. } if function == "tomorrow"));
    }
}
