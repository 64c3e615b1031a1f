//! Findings, per-file results and run options for policy validation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Severity of a single finding. Ordered: `Info < Warning < Error < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Info => "info",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
            IssueSeverity::Critical => "critical",
        }
    }

    /// Issues at or above this level are reported as errors
    pub fn is_error(&self) -> bool {
        *self >= IssueSeverity::Error
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Info => write!(f, "INFO"),
            IssueSeverity::Warning => write!(f, "WARN"),
            IssueSeverity::Error => write!(f, "ERROR"),
            IssueSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for IssueSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(IssueSeverity::Info),
            "warn" | "warning" => Ok(IssueSeverity::Warning),
            "error" => Ok(IssueSeverity::Error),
            "critical" => Ok(IssueSeverity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Rule grouping used for selection and for tagging derived errors/warnings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    Security,
    Compliance,
    BestPractice,
    Schema,
    Conflict,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Security => "Security",
            RuleCategory::Compliance => "Compliance",
            RuleCategory::BestPractice => "BestPractice",
            RuleCategory::Schema => "Schema",
            RuleCategory::Conflict => "Conflict",
        }
    }

    /// Tag given to error-level issues raised by rules of this category
    pub fn error_type(&self) -> ValidationErrorType {
        match self {
            RuleCategory::Security => ValidationErrorType::SecurityIssue,
            RuleCategory::Compliance => ValidationErrorType::ComplianceViolation,
            RuleCategory::BestPractice => ValidationErrorType::BestPracticeViolation,
            RuleCategory::Schema => ValidationErrorType::SchemaViolation,
            RuleCategory::Conflict => ValidationErrorType::PolicyConflict,
        }
    }

    /// Tag given to warning-level issues raised by rules of this category
    pub fn warning_type(&self) -> ValidationWarningType {
        match self {
            RuleCategory::Security => ValidationWarningType::SecurityRecommendation,
            RuleCategory::Compliance => ValidationWarningType::ComplianceRecommendation,
            RuleCategory::BestPractice => ValidationWarningType::BestPracticeViolation,
            RuleCategory::Schema => ValidationWarningType::SchemaRecommendation,
            RuleCategory::Conflict => ValidationWarningType::PolicyOverlap,
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "security" => Ok(RuleCategory::Security),
            "compliance" => Ok(RuleCategory::Compliance),
            "bestpractice" => Ok(RuleCategory::BestPractice),
            "schema" => Ok(RuleCategory::Schema),
            "conflict" => Ok(RuleCategory::Conflict),
            other => Err(format!("unknown rule category '{}'", other)),
        }
    }
}

/// One observation produced by a rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleIssue {
    pub severity: IssueSeverity,
    pub message: String,
    /// Dotted path of the offending field, if any
    pub field_path: Option<String>,
    /// Suggested fix or action
    pub suggestion: Option<String>,
}

impl RuleIssue {
    pub fn new(severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            field_path: None,
            suggestion: None,
        }
    }

    pub fn at_field(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// A remediation suggestion. Security recommendations sharing a title are
/// merged into a single identified risk across the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Free-form category; `"Security"` feeds the security assessment
    pub category: String,
    pub severity: IssueSeverity,
    /// Expected risk reduction, 0-100
    pub impact_score: f64,
    pub affected_field: String,
    pub recommended_value: String,
}

/// Outcome of one rule against one policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub passed: bool,
    pub issues: Vec<RuleIssue>,
    pub recommendations: Vec<Recommendation>,
}

impl RuleResult {
    /// A passing result with no findings
    pub fn pass() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Passed unless at least one issue is error-level
    pub fn from_issues(issues: Vec<RuleIssue>) -> Self {
        let passed = !issues.iter().any(|i| i.severity.is_error());
        Self {
            passed,
            issues,
            recommendations: Vec::new(),
        }
    }

    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendations.push(recommendation);
        self
    }
}

/// Type tag of a per-file error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationErrorType {
    SecurityIssue,
    ComplianceViolation,
    BestPracticeViolation,
    SchemaViolation,
    PolicyConflict,
    UnexpectedError,
}

impl ValidationErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorType::SecurityIssue => "SecurityIssue",
            ValidationErrorType::ComplianceViolation => "ComplianceViolation",
            ValidationErrorType::BestPracticeViolation => "BestPracticeViolation",
            ValidationErrorType::SchemaViolation => "SchemaViolation",
            ValidationErrorType::PolicyConflict => "PolicyConflict",
            ValidationErrorType::UnexpectedError => "UnexpectedError",
        }
    }
}

/// Type tag of a per-file warning
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationWarningType {
    SecurityRecommendation,
    ComplianceRecommendation,
    BestPracticeViolation,
    SchemaRecommendation,
    PolicyOverlap,
}

impl ValidationWarningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationWarningType::SecurityRecommendation => "SecurityRecommendation",
            ValidationWarningType::ComplianceRecommendation => "ComplianceRecommendation",
            ValidationWarningType::BestPracticeViolation => "BestPracticeViolation",
            ValidationWarningType::SchemaRecommendation => "SchemaRecommendation",
            ValidationWarningType::PolicyOverlap => "PolicyOverlap",
        }
    }
}

/// Error-level finding recorded against a policy file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub error_type: ValidationErrorType,
    pub severity: IssueSeverity,
    pub message: String,
    /// Rule that produced the finding; `None` for file-level failures
    pub rule_id: Option<String>,
    pub field_path: Option<String>,
    pub suggestion: Option<String>,
}

impl ValidationError {
    /// Error recorded when a file cannot be read/parsed or a rule faults
    pub fn unexpected(rule_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            error_type: ValidationErrorType::UnexpectedError,
            severity: IssueSeverity::Error,
            message: message.into(),
            rule_id: rule_id.map(str::to_string),
            field_path: None,
            suggestion: None,
        }
    }

    pub fn from_issue(rule_id: &str, category: RuleCategory, issue: RuleIssue) -> Self {
        Self {
            error_type: category.error_type(),
            severity: issue.severity,
            message: issue.message,
            rule_id: Some(rule_id.to_string()),
            field_path: issue.field_path,
            suggestion: issue.suggestion,
        }
    }
}

/// Warning-level finding recorded against a policy file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub warning_type: ValidationWarningType,
    pub severity: IssueSeverity,
    pub message: String,
    pub rule_id: String,
    pub field_path: Option<String>,
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    pub fn from_issue(rule_id: &str, category: RuleCategory, issue: RuleIssue) -> Self {
        Self {
            warning_type: category.warning_type(),
            severity: issue.severity,
            message: issue.message,
            rule_id: rule_id.to_string(),
            field_path: issue.field_path,
            suggestion: issue.suggestion,
        }
    }
}

/// Outcome of validating one policy file. Immutable once returned by the
/// validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub file_path: PathBuf,
    pub file_name: String,
    pub policy_id: String,
    pub policy_name: String,
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub recommendations: Vec<Recommendation>,
    /// Highest severity among all findings; `None` when the file is clean
    pub highest_severity: Option<IssueSeverity>,
    pub security_score: f64,
    pub compliance_score: f64,
    /// SHA-256 of the file bytes, when the file could be read
    pub content_hash: Option<String>,
    /// Rules that ran against this file, in execution order
    pub rules_executed: Vec<String>,
}

impl ValidationResult {
    /// Result for a file that could not be read or parsed. No rules ran.
    pub fn unreadable(file_path: PathBuf, content_hash: Option<String>, message: impl Into<String>) -> Self {
        let file_name = file_name_of(&file_path);
        let errors = vec![ValidationError::unexpected(None, message)];
        Self {
            file_path,
            file_name,
            policy_id: String::new(),
            policy_name: String::new(),
            is_valid: false,
            highest_severity: Some(IssueSeverity::Error),
            security_score: 100.0,
            compliance_score: compliance_score(&errors, &[]),
            errors,
            warnings: Vec::new(),
            recommendations: Vec::new(),
            content_hash,
            rules_executed: Vec::new(),
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn error_count(&self, error_type: ValidationErrorType) -> usize {
        self.errors.iter().filter(|e| e.error_type == error_type).count()
    }

    pub fn warning_count(&self, warning_type: ValidationWarningType) -> usize {
        self.warnings.iter().filter(|w| w.warning_type == warning_type).count()
    }
}

/// `100 - 25 per SecurityIssue error - 10 per SecurityRecommendation warning`, floored at 0
pub fn security_score(errors: &[ValidationError], warnings: &[ValidationWarning]) -> f64 {
    let issues = errors
        .iter()
        .filter(|e| e.error_type == ValidationErrorType::SecurityIssue)
        .count() as f64;
    let recommendations = warnings
        .iter()
        .filter(|w| w.warning_type == ValidationWarningType::SecurityRecommendation)
        .count() as f64;
    (100.0 - 25.0 * issues - 10.0 * recommendations).max(0.0)
}

/// `100 - 15 per error - 5 per BestPracticeViolation warning`, floored at 0
pub fn compliance_score(errors: &[ValidationError], warnings: &[ValidationWarning]) -> f64 {
    let violations = warnings
        .iter()
        .filter(|w| w.warning_type == ValidationWarningType::BestPracticeViolation)
        .count() as f64;
    (100.0 - 15.0 * errors.len() as f64 - 5.0 * violations).max(0.0)
}

pub(crate) fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Options that shape a validation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    /// Only these rule ids run; empty means every registered rule
    pub enabled_rules: Vec<String>,
    /// Rule ids excluded from the run
    pub disabled_rules: Vec<String>,
    /// Only rules in these categories run; empty means all categories
    pub categories: Vec<RuleCategory>,
    /// Rules whose maximum severity is below this threshold are skipped
    pub minimum_severity: IssueSeverity,
    /// Upper bound on files validated at once
    pub max_concurrency: usize,
    /// Amplitude of the simulated per-framework compliance jitter; 0 disables it
    pub framework_jitter: f64,
    /// Seed for the compliance jitter; a random seed is drawn when absent
    pub assessment_seed: Option<u64>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            enabled_rules: Vec::new(),
            disabled_rules: Vec::new(),
            categories: Vec::new(),
            minimum_severity: IssueSeverity::Info,
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            framework_jitter: 5.0,
            assessment_seed: None,
        }
    }
}
