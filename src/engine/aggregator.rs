//! Reduction of per-file results into a batch report

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::models::{PolicyValidationReport, ValidationResult};

/// Folds completed per-file results into report counts and averages.
///
/// Runs single-threaded after every worker has joined; the output does not
/// depend on the order results were completed in, only on the order they are
/// passed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportAggregator;

impl ReportAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Build a report without assessments. `total_policies` is the number of
    /// discovered files, which can exceed `results.len()` when a run is
    /// cancelled.
    pub fn aggregate(
        &self,
        source_directory: PathBuf,
        total_policies: usize,
        results: Vec<ValidationResult>,
    ) -> PolicyValidationReport {
        let mut report = PolicyValidationReport::empty(source_directory);
        report.total_policies = total_policies;

        let mut errors_by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut warnings_by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut security_total = 0.0;
        let mut compliance_total = 0.0;

        for result in &results {
            if result.is_valid {
                report.valid_policies += 1;
            } else {
                report.invalid_policies += 1;
            }
            if result.has_warnings() {
                report.policies_with_warnings += 1;
            }
            for error in &result.errors {
                *errors_by_type.entry(error.error_type.as_str().to_string()).or_insert(0) += 1;
            }
            for warning in &result.warnings {
                *warnings_by_type.entry(warning.warning_type.as_str().to_string()).or_insert(0) += 1;
            }
            report.recommendations.extend(result.recommendations.iter().cloned());
            security_total += result.security_score;
            compliance_total += result.compliance_score;
        }

        report.errors_by_type = errors_by_type;
        report.warnings_by_type = warnings_by_type;
        report.overall_security_score = mean(security_total, results.len());
        report.overall_compliance_score = mean(compliance_total, results.len());
        report.policy_results = results;
        report
    }
}

/// Arithmetic mean clamped to [0, 100]; 0 for an empty set
fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        (total / count as f64).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        IssueSeverity, Recommendation, RuleCategory, RuleIssue, ValidationError, ValidationWarning,
    };

    fn create_test_result(name: &str, errors: Vec<ValidationError>, warnings: Vec<ValidationWarning>) -> ValidationResult {
        let security_score = crate::models::validation::security_score(&errors, &warnings);
        let compliance_score = crate::models::validation::compliance_score(&errors, &warnings);
        ValidationResult {
            file_path: PathBuf::from(name),
            file_name: name.to_string(),
            policy_id: name.to_string(),
            policy_name: name.to_string(),
            is_valid: errors.is_empty(),
            errors,
            warnings,
            recommendations: vec![Recommendation {
                id: format!("rec-{}", name),
                title: "Enable MFA".to_string(),
                description: "Require MFA".to_string(),
                category: "Security".to_string(),
                severity: IssueSeverity::Error,
                impact_score: 80.0,
                affected_field: "grantControls".to_string(),
                recommended_value: "mfa".to_string(),
            }],
            highest_severity: None,
            security_score,
            compliance_score,
            content_hash: None,
            rules_executed: vec![],
        }
    }

    fn security_error() -> ValidationError {
        ValidationError::from_issue("sec", RuleCategory::Security, RuleIssue::new(IssueSeverity::Error, "bad"))
    }

    fn practice_warning() -> ValidationWarning {
        ValidationWarning::from_issue("bp", RuleCategory::BestPractice, RuleIssue::new(IssueSeverity::Warning, "meh"))
    }

    #[test]
    fn test_empty_results() {
        let report = ReportAggregator::new().aggregate(PathBuf::from("/policies"), 0, vec![]);
        assert_eq!(report.total_policies, 0);
        assert!(report.policy_results.is_empty());
        assert_eq!(report.overall_security_score, 0.0);
        assert_eq!(report.overall_compliance_score, 0.0);
        assert!(!report.overall_security_score.is_nan());
    }

    #[test]
    fn test_counts_and_distributions() {
        let results = vec![
            create_test_result("a.json", vec![], vec![]),
            create_test_result("b.json", vec![security_error(), security_error()], vec![practice_warning()]),
            create_test_result("c.json", vec![], vec![practice_warning()]),
            create_test_result("d.json", vec![ValidationError::unexpected(None, "parse")], vec![]),
        ];

        let report = ReportAggregator::new().aggregate(PathBuf::from("/policies"), 4, results);

        assert_eq!(report.total_policies, 4);
        assert_eq!(report.valid_policies, 2);
        assert_eq!(report.invalid_policies, 2);
        assert_eq!(report.valid_policies + report.invalid_policies, report.policy_results.len());
        assert_eq!(report.policies_with_warnings, 2);
        assert_eq!(report.errors_by_type.get("SecurityIssue"), Some(&2));
        assert_eq!(report.errors_by_type.get("UnexpectedError"), Some(&1));
        assert_eq!(report.warnings_by_type.get("BestPracticeViolation"), Some(&2));
        assert_eq!(report.total_errors(), 3);
        assert_eq!(report.recommendations.len(), 4);
    }

    #[test]
    fn test_scores_are_means() {
        let results = vec![
            create_test_result("a.json", vec![], vec![]),
            create_test_result("b.json", vec![security_error(), security_error()], vec![]),
        ];

        let report = ReportAggregator::new().aggregate(PathBuf::from("/policies"), 2, results);

        // a: 100/100, b: security 50, compliance 70
        assert_eq!(report.overall_security_score, 75.0);
        assert_eq!(report.overall_compliance_score, 85.0);
    }

    #[test]
    fn test_order_does_not_change_totals() {
        let forward = vec![
            create_test_result("a.json", vec![security_error()], vec![]),
            create_test_result("b.json", vec![], vec![practice_warning()]),
            create_test_result("c.json", vec![], vec![]),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let aggregator = ReportAggregator::new();
        let a = aggregator.aggregate(PathBuf::from("/p"), 3, forward);
        let b = aggregator.aggregate(PathBuf::from("/p"), 3, reversed);

        assert_eq!(a.errors_by_type, b.errors_by_type);
        assert_eq!(a.warnings_by_type, b.warnings_by_type);
        assert_eq!(a.valid_policies, b.valid_policies);
        assert_eq!(a.overall_security_score, b.overall_security_score);
        assert_eq!(a.overall_compliance_score, b.overall_compliance_score);
    }
}
