//! Report rendering
//!
//! Turns a [`PolicyValidationReport`](crate::models::PolicyValidationReport)
//! into JSON, YAML, plain text or Markdown.

pub mod exporter;

pub use exporter::{ExportFormat, ReportExporter};
