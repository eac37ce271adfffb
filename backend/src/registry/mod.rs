//! Rule registry - named validation rules and field generator functions.
//!
//! The registry is an explicit value handed to the engine at construction.
//! Transformations copy the rules and functions they reference when they
//! are compiled, so registering more entries afterwards does not change
//! transformations that already exist.
//!
//! # Example
//!
//! ```rust,ignore
//! use metaetl::RuleRegistry;
//! use serde_json::Value;
//!
//! let mut registry = RuleRegistry::new();
//! registry.register_validation(
//!     "isPositive",
//!     |v| v.and_then(Value::as_f64).is_some_and(|n| n > 0.0),
//!     "Value must be positive",
//! );
//! registry.register_function("source_system", || Value::String("crm".into()));
//! ```

pub mod functions;
pub mod validations;

use chrono::{DateTime, FixedOffset, Local};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{TransformError, TransformResult};

/// Predicate over a field value; `None` when the field is absent.
pub type ValidationFn = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Zero-argument field value generator.
pub type FieldFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Time source for the timestamp-based built-ins.
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

/// A named validation rule with its failure message.
#[derive(Clone)]
pub struct ValidationRule {
    pub name: String,
    pub message: String,
    check: ValidationFn,
}

impl ValidationRule {
    /// Whether `value` passes this rule.
    pub fn passes(&self, value: Option<&Value>) -> bool {
        (self.check)(value)
    }

    /// UPPER_SNAKE_CASE code derived from the rule name.
    pub fn error_code(&self) -> String {
        validations::error_code(&self.name)
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish()
    }
}

/// A named field generator.
#[derive(Clone)]
pub struct FieldFunction {
    pub name: String,
    generate: FieldFn,
}

impl FieldFunction {
    /// Produce one value.
    pub fn generate(&self) -> Value {
        (self.generate)()
    }
}

impl fmt::Debug for FieldFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldFunction").field("name", &self.name).finish()
    }
}

/// Name-keyed tables of validation rules and field functions.
#[derive(Clone)]
pub struct RuleRegistry {
    validations: BTreeMap<String, ValidationRule>,
    functions: BTreeMap<String, FieldFunction>,
}

impl RuleRegistry {
    /// Registry with the built-in rules and functions, on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| DateTime::<FixedOffset>::from(Local::now())))
    }

    /// Registry with the built-ins, reading time from `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        let mut registry = Self::empty();

        registry.register_validation("notNull", validations::not_null, "Field cannot be null");
        registry.register_validation("notEmpty", validations::not_empty, "Field cannot be empty");

        let c = Arc::clone(&clock);
        registry.register_function("current_timestamp", move || functions::current_timestamp(c()));
        let c = Arc::clone(&clock);
        registry.register_function("current_date", move || functions::current_date(c()));
        let c = Arc::clone(&clock);
        registry.register_function("unix_timestamp", move || functions::unix_timestamp(c()));
        registry.register_function("uuid", functions::uuid);

        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            validations: BTreeMap::new(),
            functions: BTreeMap::new(),
        }
    }

    /// Add or replace a validation rule.
    pub fn register_validation<F>(&mut self, name: impl Into<String>, check: F, message: impl Into<String>)
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let mut message = message.into();
        if message.trim().is_empty() {
            message = validations::default_message(&name);
        }
        self.validations.insert(
            name.clone(),
            ValidationRule {
                name,
                message,
                check: Arc::new(check),
            },
        );
    }

    /// Add or replace a field function.
    pub fn register_function<F>(&mut self, name: impl Into<String>, generate: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        self.functions.insert(
            name.clone(),
            FieldFunction {
                name,
                generate: Arc::new(generate),
            },
        );
    }

    /// Look up a validation rule by name.
    pub fn validation(&self, name: &str) -> TransformResult<ValidationRule> {
        self.validations
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::ValidationRuleNotFound {
                rule: name.to_string(),
                available: self.validation_names(),
            })
    }

    /// Look up a field function by name.
    pub fn function(&self, name: &str) -> TransformResult<FieldFunction> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::FieldFunctionNotFound {
                function: name.to_string(),
                available: self.function_names(),
            })
    }

    /// Registered rule names, sorted.
    pub fn validation_names(&self) -> Vec<String> {
        self.validations.keys().cloned().collect()
    }

    /// Registered function names, sorted.
    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn validation_rules(&self) -> impl Iterator<Item = &ValidationRule> {
        self.validations.values()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("validations", &self.validation_names())
            .field("functions", &self.function_names())
            .finish()
    }
}
