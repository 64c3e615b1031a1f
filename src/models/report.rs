//! Batch-wide validation report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::compliance::ComplianceAssessment;
use crate::models::security::SecurityAssessment;
use crate::models::validation::{Recommendation, ValidationResult};

/// Complete report for one validation run. Built once by the aggregator and
/// never mutated after it is returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyValidationReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Directory the policies were read from
    pub source_directory: PathBuf,
    pub generated_at: DateTime<Utc>,
    /// Number of policy files discovered
    pub total_policies: usize,
    pub valid_policies: usize,
    pub invalid_policies: usize,
    pub policies_with_warnings: usize,
    /// Error counts keyed by type tag
    pub errors_by_type: BTreeMap<String, usize>,
    /// Warning counts keyed by type tag
    pub warnings_by_type: BTreeMap<String, usize>,
    /// Mean security score across results, 0 when there are none
    pub overall_security_score: f64,
    /// Mean compliance score across results, 0 when there are none
    pub overall_compliance_score: f64,
    /// Per-file results in discovery order
    pub policy_results: Vec<ValidationResult>,
    /// All recommendations across files, in result order
    pub recommendations: Vec<Recommendation>,
    /// Rule ids that were enabled for this run
    pub enabled_rules: Vec<String>,
    /// Whether the run was cancelled before every file was validated
    pub cancelled: bool,
    pub security_assessment: SecurityAssessment,
    pub compliance_assessment: ComplianceAssessment,
}

impl PolicyValidationReport {
    /// Empty report for a run over `source_directory`
    pub fn empty(source_directory: PathBuf) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_directory,
            generated_at: Utc::now(),
            total_policies: 0,
            valid_policies: 0,
            invalid_policies: 0,
            policies_with_warnings: 0,
            errors_by_type: BTreeMap::new(),
            warnings_by_type: BTreeMap::new(),
            overall_security_score: 0.0,
            overall_compliance_score: 0.0,
            policy_results: Vec::new(),
            recommendations: Vec::new(),
            enabled_rules: Vec::new(),
            cancelled: false,
            security_assessment: SecurityAssessment::default(),
            compliance_assessment: ComplianceAssessment::default(),
        }
    }

    pub fn total_errors(&self) -> usize {
        self.errors_by_type.values().sum()
    }

    pub fn total_warnings(&self) -> usize {
        self.warnings_by_type.values().sum()
    }

    pub fn has_invalid_policies(&self) -> bool {
        self.invalid_policies > 0
    }
}
