//! Transformations over datasets.
//!
//! - Validator: `validate_fields`, splitting records into `_ok` / `_ko`
//! - Field adder: `add_fields`, enriching records with generated values
//! - Engine: plan compilation against a rule registry and step execution

pub mod engine;
pub mod field_adder;
pub mod validator;

pub use engine::{CompiledTransformation, Plan, StepReport, TransformationEngine};
pub use field_adder::FieldAdder;
pub use validator::{FieldValidator, ValidationOutcome};
