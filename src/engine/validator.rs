//! Per-file policy validation

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use crate::models::validation::{compliance_score, file_name_of, security_score};
use crate::models::{
    IssueSeverity, Policy, RuleResult, ValidationError, ValidationResult, ValidationWarning,
};
use crate::rules::{RuleError, ValidationRule};
use super::ValidationContext;

/// What happened when a file was handed to the validator
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Validation ran to the end; the result may still be invalid
    Completed(ValidationResult),
    /// Cancellation was observed before the file finished
    Cancelled,
}

/// What happened when one rule was invoked against one policy
#[derive(Debug)]
enum RuleOutcome {
    Completed(RuleResult),
    Failed(String),
    Cancelled,
}

/// Runs the enabled rules, in order, against individual policy files
#[derive(Clone)]
pub struct PolicyFileValidator {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl PolicyFileValidator {
    pub fn new(rules: Vec<Arc<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.id().to_string()).collect()
    }

    /// Read, parse and validate one policy file.
    ///
    /// Read and parse failures produce an invalid result with a single
    /// `UnexpectedError` and no rules run.
    pub async fn validate_file(&self, path: &Path, context: &ValidationContext) -> FileOutcome {
        if context.is_cancelled() {
            return FileOutcome::Cancelled;
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                context.logger().log_error(&format!("Failed to read {}: {}", path.display(), e));
                return FileOutcome::Completed(ValidationResult::unreadable(
                    path.to_path_buf(),
                    None,
                    format!("Failed to read policy file: {}", e),
                ));
            }
        };
        let content_hash = sha256_hex(&bytes);

        let parsed = String::from_utf8(bytes)
            .map_err(|e| format!("Policy file is not valid UTF-8: {}", e))
            .and_then(|content| {
                Policy::from_json_str(&content).map_err(|e| format!("Failed to parse policy: {}", e))
            });

        match parsed {
            Ok(policy) => self.validate_policy(path, &policy, Some(content_hash), context).await,
            Err(message) => {
                context.logger().log_error(&format!("{}: {}", path.display(), message));
                FileOutcome::Completed(ValidationResult::unreadable(
                    path.to_path_buf(),
                    Some(content_hash),
                    message,
                ))
            }
        }
    }

    /// Run every rule against an already parsed policy.
    ///
    /// A rule that returns an error or panics contributes one
    /// `UnexpectedError` carrying its id; the remaining rules still run.
    pub async fn validate_policy(
        &self,
        path: &Path,
        policy: &Policy,
        content_hash: Option<String>,
        context: &ValidationContext,
    ) -> FileOutcome {
        let mut errors: Vec<ValidationError> = Vec::new();
        let mut warnings: Vec<ValidationWarning> = Vec::new();
        let mut recommendations = Vec::new();
        let mut rules_executed = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            if context.is_cancelled() {
                return FileOutcome::Cancelled;
            }
            rules_executed.push(rule.id().to_string());

            match run_rule(rule.as_ref(), policy, context).await {
                RuleOutcome::Completed(result) => {
                    for issue in result.issues {
                        if issue.severity.is_error() {
                            errors.push(ValidationError::from_issue(rule.id(), rule.category(), issue));
                        } else {
                            warnings.push(ValidationWarning::from_issue(rule.id(), rule.category(), issue));
                        }
                    }
                    recommendations.extend(result.recommendations);
                }
                RuleOutcome::Failed(message) => {
                    context.logger().log_error(&format!(
                        "Rule '{}' failed on {}: {}",
                        rule.id(),
                        path.display(),
                        message
                    ));
                    errors.push(ValidationError::unexpected(
                        Some(rule.id()),
                        format!("Rule '{}' failed: {}", rule.id(), message),
                    ));
                }
                RuleOutcome::Cancelled => return FileOutcome::Cancelled,
            }
        }

        let highest_severity = errors
            .iter()
            .map(|e| e.severity)
            .chain(warnings.iter().map(|w| w.severity))
            .max();

        FileOutcome::Completed(ValidationResult {
            file_path: path.to_path_buf(),
            file_name: file_name_of(path),
            policy_id: policy.id().to_string(),
            policy_name: policy.display_name().to_string(),
            is_valid: errors.is_empty(),
            security_score: security_score(&errors, &warnings),
            compliance_score: compliance_score(&errors, &warnings),
            errors,
            warnings,
            recommendations,
            highest_severity,
            content_hash,
            rules_executed,
        })
    }
}

async fn run_rule(rule: &dyn ValidationRule, policy: &Policy, context: &ValidationContext) -> RuleOutcome {
    match AssertUnwindSafe(rule.validate(policy, context)).catch_unwind().await {
        Ok(Ok(result)) => RuleOutcome::Completed(result),
        Ok(Err(RuleError::Cancelled)) => RuleOutcome::Cancelled,
        Ok(Err(e)) => RuleOutcome::Failed(e.to_string()),
        Err(panic) => RuleOutcome::Failed(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl std::fmt::Debug for PolicyFileValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyFileValidator")
            .field("rules", &self.rule_ids())
            .finish()
    }
}
