//! Policy validation engine
//!
//! Runs a batch of policy files through the enabled rules:
//! directory scan -> context build -> parallel per-file validation ->
//! aggregation -> assessments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::logging::{PolicyLogger, TracingLogger};
use crate::models::{IdentifiedRisk, IssueSeverity, PolicyValidationReport, ValidationOptions};
use crate::rules::RuleRegistry;

pub mod aggregator;
pub mod assessment;
pub mod cancellation;
pub mod context;
pub mod processor;
pub mod validator;

pub use aggregator::ReportAggregator;
pub use assessment::AssessmentGenerator;
pub use cancellation::CancellationSignal;
pub use context::{ContextBuilder, LoadedPolicy, ValidationContext, CONFIG_FILE_NAME};
pub use processor::{ParallelFileProcessor, ProcessingOutcome, ProgressCallback, ProgressUpdate};
pub use validator::{FileOutcome, PolicyFileValidator};

/// Risk id reported when the policy directory does not exist
pub const MISSING_DIRECTORY_RISK_ID: &str = "DIR001";

/// Failures that stop a run before any file is validated
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to read policy directory '{path}': {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Entry point for validating a directory of policy documents
pub struct PolicyValidationEngine {
    registry: RuleRegistry,
    logger: Arc<dyn PolicyLogger>,
    cancellation: CancellationSignal,
    progress: Option<ProgressCallback>,
}

impl PolicyValidationEngine {
    /// Create an engine over `registry`, logging through `tracing`
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            logger: Arc::new(TracingLogger),
            cancellation: CancellationSignal::new(),
            progress: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn PolicyLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Signal that cancels runs of this engine
    pub fn cancellation(&self) -> CancellationSignal {
        self.cancellation.clone()
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Validate every top-level `*.json` policy in `directory`.
    ///
    /// A missing directory is reported as a critical `DIR001` risk with no
    /// per-file results rather than as an error. When the run is cancelled
    /// the report holds the results finished before cancellation and
    /// `cancelled` is set.
    pub async fn validate_directory(
        &self,
        directory: &Path,
        options: ValidationOptions,
    ) -> Result<PolicyValidationReport, EngineError> {
        let is_dir = tokio::fs::metadata(directory)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            self.logger.log_error(&format!("Policy directory not found: {}", directory.display()));
            return Ok(missing_directory_report(directory));
        }

        let files = discover_policy_files(directory).await?;
        self.logger.log_info(&format!(
            "Discovered {} policy files in {}",
            files.len(),
            directory.display()
        ));

        let context = ContextBuilder::new(self.logger.clone())
            .with_cancellation(self.cancellation.clone())
            .build(directory, &files, options)
            .await;
        let options = context.options().clone();

        let rules = self.registry.enabled_rules(&options);
        if rules.is_empty() {
            self.logger.log_warning("No rules enabled for this run; policies are only parsed");
        }
        let validator = Arc::new(PolicyFileValidator::new(rules));

        let mut processor = ParallelFileProcessor::new(options.max_concurrency);
        if let Some(progress) = &self.progress {
            processor = processor.with_progress(progress.clone());
        }
        let outcome = processor
            .process(&files, validator.clone(), Arc::new(context))
            .await;
        if outcome.cancelled {
            self.logger.log_warning(&format!(
                "Validation cancelled: {} of {} files completed",
                outcome.results.len(),
                files.len()
            ));
        }

        let mut report = ReportAggregator::new().aggregate(directory.to_path_buf(), files.len(), outcome.results);
        report.enabled_rules = validator.rule_ids();
        report.cancelled = outcome.cancelled;
        AssessmentGenerator::new(options.assessment_seed, options.framework_jitter).assess(&mut report);

        self.logger.log_info(&format!(
            "Validation finished: {} valid, {} invalid, security {:.1}, compliance {:.1}",
            report.valid_policies,
            report.invalid_policies,
            report.overall_security_score,
            report.overall_compliance_score
        ));

        Ok(report)
    }
}

impl std::fmt::Debug for PolicyValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyValidationEngine")
            .field("registry", &self.registry)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Top-level `*.json` files in `directory`, excluding the sidecar
/// configuration, sorted by file name
pub async fn discover_policy_files(directory: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let read_error = |source| EngineError::DirectoryRead {
        path: directory.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(directory).await.map_err(read_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let is_config = path
            .file_name()
            .map(|n| n == CONFIG_FILE_NAME)
            .unwrap_or(false);
        if !is_json || is_config {
            continue;
        }
        // Follows symlinks; dangling links and directories are skipped
        if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Report for a run whose directory does not exist
fn missing_directory_report(directory: &Path) -> PolicyValidationReport {
    let mut report = PolicyValidationReport::empty(directory.to_path_buf());
    report.security_assessment.identified_risks.push(IdentifiedRisk {
        id: MISSING_DIRECTORY_RISK_ID.to_string(),
        title: "Policy directory not found".to_string(),
        description: format!(
            "The policy directory '{}' does not exist, so no policies were validated",
            directory.display()
        ),
        severity: IssueSeverity::Critical,
        affected_fields: Vec::new(),
        mitigation: "Point the validator at an existing directory of policy JSON files".to_string(),
        risk_score: 100.0,
        occurrences: 1,
    });
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::validator::tests::{issue, FaultyRule, FixedRule};
    use crate::logging::{LogLevel, MemoryLogger, NoopLogger};
    use crate::models::{RuleCategory, ValidationErrorType};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    fn create_test_directory() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(&dir, "a-require-mfa.json", r#"{
            "id": "a", "displayName": "Require MFA for admins", "state": "enabled",
            "conditions": {"users": {"includeRoles": ["admin"]}},
            "grantControls": {"operator": "OR", "builtInControls": ["mfa"]}
        }"#);
        write(&dir, "b-all-users.json", r#"{
            "id": "b", "displayName": "All users baseline", "state": "enabled",
            "conditions": {"users": {"includeUsers": ["All"]}, "clientAppTypes": ["exchangeActiveSync"]},
            "grantControls": {"operator": "OR", "builtInControls": ["compliantDevice"]}
        }"#);
        write(&dir, "c-broken.json", "{ not valid");
        write(&dir, "notes.txt", "ignored");
        write(&dir, CONFIG_FILE_NAME, r#"{"maxExclusions": 3}"#);
        dir
    }

    fn engine_with(rules: RuleRegistry) -> PolicyValidationEngine {
        PolicyValidationEngine::new(rules).with_logger(Arc::new(NoopLogger))
    }

    fn seeded() -> ValidationOptions {
        ValidationOptions {
            assessment_seed: Some(11),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_discovery_skips_sidecar_and_other_files() {
        let dir = create_test_directory();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let files = discover_policy_files(dir.path()).await.unwrap();

        let names: Vec<_> = files.iter().map(|f| f.file_name().unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a-require-mfa.json", "b-all-users.json", "c-broken.json"]);
    }

    #[tokio::test]
    async fn test_end_to_end_with_builtin_rules() {
        let dir = create_test_directory();
        let engine = engine_with(RuleRegistry::with_builtin_rules());

        let report = engine.validate_directory(dir.path(), seeded()).await.unwrap();

        assert_eq!(report.total_policies, 3);
        assert_eq!(report.valid_policies + report.invalid_policies, report.total_policies);
        assert_eq!(report.policy_results.len(), 3);
        assert!(!report.cancelled);
        assert_eq!(report.enabled_rules, engine.registry().rule_ids());

        let broken = &report.policy_results[2];
        assert!(!broken.is_valid);
        assert_eq!(broken.errors.len(), 1);
        assert_eq!(broken.errors[0].error_type, ValidationErrorType::UnexpectedError);

        let all_users = &report.policy_results[1];
        assert!(!all_users.is_valid);
        assert!(all_users.error_count(ValidationErrorType::SecurityIssue) >= 1);
        assert!(report
            .security_assessment
            .identified_risks
            .iter()
            .any(|r| r.title == "Require multi-factor authentication"));

        for result in &report.policy_results {
            assert!((0.0..=100.0).contains(&result.security_score));
            assert!((0.0..=100.0).contains(&result.compliance_score));
        }
        for framework in report.compliance_assessment.frameworks.values() {
            assert!((framework.score - report.overall_compliance_score).abs() <= 5.0);
            assert_eq!(framework.passing_controls + framework.failing_controls, 50);
        }
    }

    #[tokio::test]
    async fn test_empty_directory_yields_empty_report() {
        let dir = TempDir::new().unwrap();
        let report = engine_with(RuleRegistry::with_builtin_rules())
            .validate_directory(dir.path(), seeded())
            .await
            .unwrap();

        assert_eq!(report.total_policies, 0);
        assert!(report.policy_results.is_empty());
        assert_eq!(report.overall_security_score, 0.0);
        assert_eq!(report.overall_compliance_score, 0.0);
        assert!(report.security_assessment.identified_risks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_reports_critical_risk() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let logger = Arc::new(MemoryLogger::new());

        let report = PolicyValidationEngine::new(RuleRegistry::with_builtin_rules())
            .with_logger(logger.clone())
            .validate_directory(&missing, ValidationOptions::default())
            .await
            .unwrap();

        assert!(report.policy_results.is_empty());
        assert_eq!(report.total_policies, 0);
        let risks = &report.security_assessment.identified_risks;
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].id, MISSING_DIRECTORY_RISK_ID);
        assert_eq!(risks[0].severity, IssueSeverity::Critical);
        assert_eq!(logger.messages(LogLevel::Error).len(), 1);

        let compliance = &report.compliance_assessment;
        assert!(compliance.frameworks.is_empty());
        assert_eq!(
            compliance.next_assessment_due,
            crate::models::next_assessment_due(compliance.assessed_at)
        );
        assert!(compliance.next_assessment_due > compliance.assessed_at);
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let dir = create_test_directory();
        let engine = engine_with(RuleRegistry::with_builtin_rules());

        let first = engine.validate_directory(dir.path(), seeded()).await.unwrap();
        let second = engine.validate_directory(dir.path(), seeded()).await.unwrap();

        assert_eq!(first.policy_results, second.policy_results);
        assert_eq!(first.errors_by_type, second.errors_by_type);
        assert_eq!(first.warnings_by_type, second.warnings_by_type);
        assert_eq!(first.overall_security_score, second.overall_security_score);
        assert_eq!(first.overall_compliance_score, second.overall_compliance_score);
        assert_eq!(first.security_assessment.identified_risks, second.security_assessment.identified_risks);
        assert_eq!(first.compliance_assessment.frameworks, second.compliance_assessment.frameworks);
    }

    #[tokio::test]
    async fn test_faulty_rule_isolated_per_file() {
        let dir = create_test_directory();
        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(FaultyRule { id: "always-fails", panics: false }));
        registry.register(Arc::new(FixedRule {
            id: "finds-things",
            category: RuleCategory::Security,
            issues: vec![issue(IssueSeverity::Warning)],
            recommendations: vec![],
        }));

        let report = engine_with(registry).validate_directory(dir.path(), seeded()).await.unwrap();

        // The unparseable file runs no rules
        for result in &report.policy_results[..2] {
            let faults: Vec<_> = result
                .errors
                .iter()
                .filter(|e| e.error_type == ValidationErrorType::UnexpectedError)
                .collect();
            assert_eq!(faults.len(), 1);
            assert_eq!(faults[0].rule_id.as_deref(), Some("always-fails"));
            assert_eq!(result.warnings.len(), 1);
        }
        assert_eq!(report.errors_by_type.get("UnexpectedError"), Some(&3));
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_partial_report() {
        let dir = create_test_directory();
        let engine = engine_with(RuleRegistry::with_builtin_rules());
        engine.cancellation().cancel();

        let report = engine.validate_directory(dir.path(), seeded()).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.total_policies, 3);
        assert!(report.policy_results.is_empty());
        assert_eq!(report.valid_policies + report.invalid_policies, report.policy_results.len());
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        let dir = create_test_directory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = engine_with(RuleRegistry::with_builtin_rules())
            .with_progress(Arc::new(move |update: &ProgressUpdate| {
                sink.lock().unwrap().push((update.completed, update.total));
            }));

        engine.validate_directory(dir.path(), seeded()).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_sidecar_can_disable_rules() {
        let dir = create_test_directory();
        write(&dir, CONFIG_FILE_NAME, r#"{"rules": {"disabled": ["mfa-required", "legacy-auth-block"]}}"#);

        let report = engine_with(RuleRegistry::with_builtin_rules())
            .validate_directory(dir.path(), seeded())
            .await
            .unwrap();

        assert!(!report.enabled_rules.contains(&"mfa-required".to_string()));
        assert!(report.policy_results[1].rules_executed.iter().all(|r| r != "mfa-required"));
    }
}
