//! Data models for Policy Control
//!
//! This module contains the data structures shared by the rule plugins, the
//! validation engine and the report exporters:
//! - Policy documents and their accessors
//! - Rule findings, per-file results and run options
//! - Security and compliance assessments
//! - The batch-wide validation report

pub mod policy;
pub mod validation;
pub mod security;
pub mod compliance;
pub mod report;

// Re-export main types for convenience
pub use policy::{Policy, PolicyParseError};
pub use validation::*;
pub use security::{IdentifiedRisk, SecurityAssessment};
pub use compliance::{
    next_assessment_due, ComplianceAssessment, FrameworkScore, COMPLIANCE_FRAMEWORKS,
    CONTROLS_PER_FRAMEWORK, MAX_FRAMEWORK_JITTER,
};
pub use report::PolicyValidationReport;
