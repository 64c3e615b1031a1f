use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

use crate::models::{PolicyValidationReport, ValidationResult};

/// Report export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
    /// Human-readable text
    Text,
    /// Markdown
    Markdown,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Text => "text",
            ExportFormat::Markdown => "markdown",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "text" | "txt" => Ok(ExportFormat::Text),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Renders validation reports
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportExporter;

impl ReportExporter {
    pub fn new() -> Self {
        Self
    }

    /// Export report in specified format
    pub fn export(&self, report: &PolicyValidationReport, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => {
                serde_json::to_string_pretty(report)
                    .context("Failed to serialize report to JSON")
            }
            ExportFormat::Yaml => {
                serde_yaml::to_string(report)
                    .context("Failed to serialize report to YAML")
            }
            ExportFormat::Text => Ok(self.format_text_report(report)),
            ExportFormat::Markdown => Ok(self.format_markdown_report(report)),
        }
    }

    /// Render the report and write it to `path`
    pub async fn write_to_file(
        &self,
        report: &PolicyValidationReport,
        format: ExportFormat,
        path: &Path,
    ) -> Result<()> {
        let rendered = self.export(report, format)?;
        tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }

    fn format_text_report(&self, report: &PolicyValidationReport) -> String {
        let mut output = String::new();

        output.push_str("=== Policy Validation Report ===\n\n");
        output.push_str(&format!("Generated: {}\n", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
        output.push_str(&format!("Source: {}\n", report.source_directory.display()));
        output.push_str(&format!("Run: {}\n", report.run_id));
        if report.cancelled {
            output.push_str("Status: CANCELLED (partial results)\n");
        }
        output.push('\n');

        output.push_str("=== SUMMARY ===\n");
        output.push_str(&format!("Total Policies: {}\n", report.total_policies));
        output.push_str(&format!("Valid: {}\n", report.valid_policies));
        output.push_str(&format!("Invalid: {}\n", report.invalid_policies));
        output.push_str(&format!("With Warnings: {}\n", report.policies_with_warnings));
        output.push_str(&format!("Security Score: {:.1}\n", report.overall_security_score));
        output.push_str(&format!("Compliance Score: {:.1}\n", report.overall_compliance_score));

        if !report.errors_by_type.is_empty() {
            output.push_str("\n=== ERRORS BY TYPE ===\n");
            for (error_type, count) in &report.errors_by_type {
                output.push_str(&format!("{}: {}\n", error_type, count));
            }
        }
        if !report.warnings_by_type.is_empty() {
            output.push_str("\n=== WARNINGS BY TYPE ===\n");
            for (warning_type, count) in &report.warnings_by_type {
                output.push_str(&format!("{}: {}\n", warning_type, count));
            }
        }

        output.push_str("\n=== POLICIES ===\n");
        for result in &report.policy_results {
            output.push_str(&format!("\n{} [{}]\n", result.file_name, status_label(result)));
            if !result.policy_name.is_empty() {
                output.push_str(&format!("  Name: {}\n", result.policy_name));
            }
            output.push_str(&format!(
                "  Scores: security {:.1}, compliance {:.1}\n",
                result.security_score, result.compliance_score
            ));
            for error in &result.errors {
                output.push_str(&format!("  [{}] {}: {}\n", error.severity, error.error_type.as_str(), error.message));
            }
            for warning in &result.warnings {
                output.push_str(&format!(
                    "  [{}] {}: {}\n",
                    warning.severity,
                    warning.warning_type.as_str(),
                    warning.message
                ));
            }
        }

        let security = &report.security_assessment;
        output.push_str("\n=== SECURITY ASSESSMENT ===\n");
        if let Some(risk) = security.overall_risk() {
            output.push_str(&format!("Overall risk: {}\n", risk));
        }
        output.push_str(&format!(
            "Findings: {} critical, {} high, {} medium, {} low\n",
            security.critical_findings, security.high_findings, security.medium_findings, security.low_findings
        ));
        for risk in &security.identified_risks {
            output.push_str(&format!(
                "- [{}] {} (x{}): {}\n",
                risk.severity, risk.title, risk.occurrences, risk.mitigation
            ));
        }

        let compliance = &report.compliance_assessment;
        if !compliance.frameworks.is_empty() {
            output.push_str("\n=== COMPLIANCE FRAMEWORKS (simulated) ===\n");
            for score in compliance.frameworks.values() {
                output.push_str(&format!(
                    "{}: {:.1} ({}/{} controls passing)\n",
                    score.framework, score.score, score.passing_controls, score.total_controls
                ));
            }
            output.push_str(&format!(
                "Next assessment due: {}\n",
                compliance.next_assessment_due.format("%Y-%m-%d")
            ));
        }

        output
    }

    fn format_markdown_report(&self, report: &PolicyValidationReport) -> String {
        let mut output = String::new();

        output.push_str("# Policy Validation Report\n\n");
        output.push_str(&format!("**Generated:** {}\n", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
        output.push_str(&format!("**Source:** `{}`\n", report.source_directory.display()));
        output.push_str(&format!("**Run:** `{}`\n\n", report.run_id));
        if report.cancelled {
            output.push_str("> **Cancelled:** this report contains partial results.\n\n");
        }

        output.push_str("## Summary\n\n");
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| Total Policies | {} |\n", report.total_policies));
        output.push_str(&format!("| Valid | {} |\n", report.valid_policies));
        output.push_str(&format!("| Invalid | {} |\n", report.invalid_policies));
        output.push_str(&format!("| With Warnings | {} |\n", report.policies_with_warnings));
        output.push_str(&format!("| Security Score | {:.1} |\n", report.overall_security_score));
        output.push_str(&format!("| Compliance Score | {:.1} |\n\n", report.overall_compliance_score));

        output.push_str("## Policies\n\n");
        output.push_str("| File | Policy | Status | Errors | Warnings | Security | Compliance |\n");
        output.push_str("|------|--------|--------|--------|----------|----------|------------|\n");
        for result in &report.policy_results {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} | {:.1} | {:.1} |\n",
                result.file_name,
                escape_cell(&result.policy_name),
                status_label(result),
                result.errors.len(),
                result.warnings.len(),
                result.security_score,
                result.compliance_score
            ));
        }
        output.push('\n');

        let failing: Vec<&ValidationResult> = report
            .policy_results
            .iter()
            .filter(|r| !r.errors.is_empty() || !r.warnings.is_empty())
            .collect();
        if !failing.is_empty() {
            output.push_str("## Findings\n\n");
            for result in failing {
                output.push_str(&format!("### {}\n\n", result.file_name));
                for error in &result.errors {
                    output.push_str(&format!("- **{}** `{}`: {}\n", error.severity, error.error_type.as_str(), error.message));
                }
                for warning in &result.warnings {
                    output.push_str(&format!(
                        "- **{}** `{}`: {}\n",
                        warning.severity,
                        warning.warning_type.as_str(),
                        warning.message
                    ));
                }
                output.push('\n');
            }
        }

        let security = &report.security_assessment;
        output.push_str("## Security Assessment\n\n");
        if let Some(risk) = security.overall_risk() {
            output.push_str(&format!("**Overall Risk:** {}\n\n", risk));
        }
        output.push_str(&format!(
            "- **Critical:** {}\n- **High:** {}\n- **Medium:** {}\n- **Low:** {}\n\n",
            security.critical_findings, security.high_findings, security.medium_findings, security.low_findings
        ));
        if !security.identified_risks.is_empty() {
            output.push_str("| Risk | Severity | Occurrences | Mitigation |\n");
            output.push_str("|------|----------|-------------|------------|\n");
            for risk in &security.identified_risks {
                output.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    escape_cell(&risk.title),
                    risk.severity,
                    risk.occurrences,
                    escape_cell(&risk.mitigation)
                ));
            }
            output.push('\n');
        }

        let compliance = &report.compliance_assessment;
        if !compliance.frameworks.is_empty() {
            output.push_str("## Compliance Frameworks\n\n");
            output.push_str("_Framework scores are simulated from the overall compliance score._\n\n");
            output.push_str("| Framework | Score | Passing | Failing |\n");
            output.push_str("|-----------|-------|---------|---------|\n");
            for score in compliance.frameworks.values() {
                output.push_str(&format!(
                    "| {} | {:.1} | {} | {} |\n",
                    score.framework, score.score, score.passing_controls, score.failing_controls
                ));
            }
        }

        output
    }
}

fn status_label(result: &ValidationResult) -> &'static str {
    if !result.is_valid {
        "INVALID"
    } else if result.has_warnings() {
        "WARNINGS"
    } else {
        "VALID"
    }
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AssessmentGenerator;
    use crate::models::{
        IssueSeverity, Recommendation, RuleCategory, RuleIssue, ValidationError, ValidationWarning,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_report() -> PolicyValidationReport {
        let mut invalid = ValidationResult::unreadable(PathBuf::from("/p/b.json"), None, "x");
        invalid.policy_name = "Ops | Admins".to_string();
        invalid.errors = vec![ValidationError::from_issue(
            "mfa-required",
            RuleCategory::Security,
            RuleIssue::new(IssueSeverity::Error, "MFA missing"),
        )];
        invalid.warnings = vec![ValidationWarning::from_issue(
            "naming-convention",
            RuleCategory::BestPractice,
            RuleIssue::new(IssueSeverity::Warning, "Name | with pipe"),
        )];
        invalid.recommendations = vec![Recommendation {
            id: "mfa-required:b".to_string(),
            title: "Require multi-factor authentication".to_string(),
            description: "d".to_string(),
            category: "Security".to_string(),
            severity: IssueSeverity::Error,
            impact_score: 90.0,
            affected_field: "grantControls.builtInControls".to_string(),
            recommended_value: "Add mfa".to_string(),
        }];

        let mut report = PolicyValidationReport::empty(PathBuf::from("/p"));
        report.total_policies = 1;
        report.invalid_policies = 1;
        report.overall_security_score = 75.0;
        report.overall_compliance_score = 80.0;
        report.errors_by_type.insert("SecurityIssue".to_string(), 1);
        report.recommendations = invalid.recommendations.clone();
        report.policy_results = vec![invalid];
        AssessmentGenerator::new(Some(1), 0.0).assess(&mut report);
        report
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert_eq!("yml".parse::<ExportFormat>(), Ok(ExportFormat::Yaml));
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("text".parse::<ExportFormat>(), Ok(ExportFormat::Text));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_json_export_is_camel_case_and_parses_back() {
        let report = create_test_report();
        let json = ReportExporter::new().export(&report, ExportFormat::Json).unwrap();

        assert!(json.contains("\"totalPolicies\": 1"));
        assert!(json.contains("\"errorsByType\""));
        let parsed: PolicyValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_yaml_export() {
        let report = create_test_report();
        let yaml = ReportExporter::new().export(&report, ExportFormat::Yaml).unwrap();
        assert!(yaml.contains("totalPolicies: 1"));
    }

    #[test]
    fn test_text_export() {
        let report = create_test_report();
        let text = ReportExporter::new().export(&report, ExportFormat::Text).unwrap();

        assert!(text.contains("=== Policy Validation Report ==="));
        assert!(text.contains("Invalid: 1"));
        assert!(text.contains("b.json [INVALID]"));
        assert!(text.contains("SecurityIssue: MFA missing"));
        assert!(text.contains("Require multi-factor authentication (x1)"));
        assert!(text.contains("Overall risk: ERROR"));
        assert!(text.contains("SOC2: 80.0 (40/50 controls passing)"));
        assert!(!text.contains("CANCELLED"));
    }

    #[test]
    fn test_markdown_export() {
        let mut report = create_test_report();
        report.cancelled = true;
        let markdown = ReportExporter::new().export(&report, ExportFormat::Markdown).unwrap();

        assert!(markdown.starts_with("# Policy Validation Report"));
        assert!(markdown.contains("| Total Policies | 1 |"));
        assert!(markdown.contains("### b.json"));
        assert!(markdown.contains("| b.json | Ops \\| Admins | INVALID |"));
        assert!(markdown.contains("`BestPracticeViolation`: Name | with pipe"));
        assert!(markdown.contains("partial results"));
        assert!(markdown.contains("**Overall Risk:** ERROR"));
        assert!(markdown.contains("| CIS | 80.0 | 40 | 10 |"));
    }

    #[tokio::test]
    async fn test_write_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.md");

        ReportExporter::new()
            .write_to_file(&create_test_report(), ExportFormat::Markdown, &path)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("## Security Assessment"));
    }

    #[tokio::test]
    async fn test_write_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("report.json");

        let err = ReportExporter::new()
            .write_to_file(&create_test_report(), ExportFormat::Json, &path)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to write report"));
    }
}
