//! Policy Control
//!
//! Validates a directory of access-control policy documents against a set of
//! pluggable rules, in parallel, and produces a report with per-file results,
//! batch statistics and derived security and compliance assessments.

pub mod cli;
pub mod engine;
pub mod logging;
pub mod models;
pub mod reporting;
pub mod rules;

pub use engine::{CancellationSignal, EngineError, PolicyValidationEngine};
pub use models::{PolicyValidationReport, ValidationOptions};
pub use rules::{RuleRegistry, ValidationRule};
