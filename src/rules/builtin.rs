//! Built-in policy rules
//!
//! A small rule set covering schema, security, compliance and conflict
//! checks for conditional-access style policy documents.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

use crate::engine::ValidationContext;
use crate::models::{IssueSeverity, Policy, Recommendation, RuleCategory, RuleIssue, RuleResult};
use super::{RuleError, ValidationRule};

/// Config key for the exclusion limit used by `broad-exclusions`
pub const MAX_EXCLUSIONS_KEY: &str = "maxExclusions";
/// Default exclusion limit
pub const DEFAULT_MAX_EXCLUSIONS: u64 = 5;
/// Config key for the display name regex used by `naming-convention`
pub const NAMING_PATTERN_KEY: &str = "namingPattern";

const VALID_STATES: [&str; 3] = ["enabled", "disabled", "enabledForReportingButNotEnforced"];
const LEGACY_CLIENT_APPS: [&str; 2] = ["exchangeActiveSync", "other"];

/// Every built-in rule in registration order
pub fn all_rules() -> Vec<Arc<dyn ValidationRule>> {
    vec![
        Arc::new(RequiredFieldsRule),
        Arc::new(PolicyStateRule),
        Arc::new(MfaRequiredRule),
        Arc::new(LegacyAuthBlockRule),
        Arc::new(BroadExclusionsRule),
        Arc::new(DuplicatePolicyRule),
        Arc::new(NamingConventionRule),
    ]
}

fn contains_ignore_case(items: &[&str], needle: &str) -> bool {
    items.iter().any(|item| item.eq_ignore_ascii_case(needle))
}

/// `id` and `displayName` must be present; `state` should be
pub struct RequiredFieldsRule;

#[async_trait]
impl ValidationRule for RequiredFieldsRule {
    fn id(&self) -> &str {
        "required-fields"
    }

    fn name(&self) -> &str {
        "Required fields"
    }

    fn description(&self) -> &str {
        "Policies must carry a non-empty id and displayName and should declare a state"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Schema
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Error
    }

    async fn validate(&self, policy: &Policy, _context: &ValidationContext) -> Result<RuleResult, RuleError> {
        let mut issues = Vec::new();

        if policy.id().trim().is_empty() {
            issues.push(
                RuleIssue::new(IssueSeverity::Error, "Policy is missing an id")
                    .at_field("id")
                    .with_suggestion("Add a unique string id"),
            );
        }
        if policy.display_name().trim().is_empty() {
            issues.push(
                RuleIssue::new(IssueSeverity::Error, "Policy is missing a displayName")
                    .at_field("displayName")
                    .with_suggestion("Add a descriptive displayName"),
            );
        }
        if !policy.contains_key("state") {
            issues.push(
                RuleIssue::new(IssueSeverity::Warning, "Policy does not declare a state")
                    .at_field("state")
                    .with_suggestion("Set state to enabled, disabled or enabledForReportingButNotEnforced"),
            );
        }

        Ok(RuleResult::from_issues(issues))
    }
}

/// `state` must be one of the known values
pub struct PolicyStateRule;

#[async_trait]
impl ValidationRule for PolicyStateRule {
    fn id(&self) -> &str {
        "policy-state"
    }

    fn name(&self) -> &str {
        "Policy state"
    }

    fn description(&self) -> &str {
        "Flags unknown states, disabled policies and report-only policies"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::BestPractice
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Error
    }

    async fn validate(&self, policy: &Policy, _context: &ValidationContext) -> Result<RuleResult, RuleError> {
        // Absence is reported by required-fields
        let Some(state) = policy.get("state") else {
            return Ok(RuleResult::pass());
        };

        let issue = match state.as_str() {
            Some("enabled") => None,
            Some("disabled") => Some(
                RuleIssue::new(IssueSeverity::Info, "Policy is disabled and has no effect").at_field("state"),
            ),
            Some("enabledForReportingButNotEnforced") => Some(
                RuleIssue::new(IssueSeverity::Warning, "Policy is in report-only mode and is not enforced")
                    .at_field("state")
                    .with_suggestion("Enable the policy once its impact has been reviewed"),
            ),
            _ => Some(
                RuleIssue::new(IssueSeverity::Error, format!("Unknown policy state: {}", state))
                    .at_field("state")
                    .with_suggestion(format!("Use one of: {}", VALID_STATES.join(", "))),
            ),
        };

        Ok(RuleResult::from_issues(issue.into_iter().collect()))
    }
}

/// Policies that target all users must require MFA
pub struct MfaRequiredRule;

#[async_trait]
impl ValidationRule for MfaRequiredRule {
    fn id(&self) -> &str {
        "mfa-required"
    }

    fn name(&self) -> &str {
        "MFA required"
    }

    fn description(&self) -> &str {
        "Policies applied to all users must require multi-factor authentication"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Error
    }

    async fn validate(&self, policy: &Policy, _context: &ValidationContext) -> Result<RuleResult, RuleError> {
        let targets_all = contains_ignore_case(&policy.string_list("conditions.users.includeUsers"), "All");
        if !targets_all {
            return Ok(RuleResult::pass());
        }

        let controls = policy.string_list("grantControls.builtInControls");
        if contains_ignore_case(&controls, "mfa") || contains_ignore_case(&controls, "block") {
            return Ok(RuleResult::pass());
        }

        let field = "grantControls.builtInControls";
        let issue = RuleIssue::new(IssueSeverity::Error, "Policy applies to all users without requiring MFA")
            .at_field(field)
            .with_suggestion("Add \"mfa\" to grantControls.builtInControls");
        let recommendation = Recommendation {
            id: format!("mfa-required:{}", policy.id()),
            title: "Require multi-factor authentication".to_string(),
            description: format!(
                "Policy '{}' applies to all users but does not require MFA",
                policy.display_name()
            ),
            category: RuleCategory::Security.as_str().to_string(),
            severity: IssueSeverity::Error,
            impact_score: 90.0,
            affected_field: field.to_string(),
            recommended_value: "Add \"mfa\" to the policy's built-in grant controls".to_string(),
        };

        Ok(RuleResult::from_issues(vec![issue]).with_recommendation(recommendation))
    }
}

/// Legacy authentication clients should be blocked
pub struct LegacyAuthBlockRule;

#[async_trait]
impl ValidationRule for LegacyAuthBlockRule {
    fn id(&self) -> &str {
        "legacy-auth-block"
    }

    fn name(&self) -> &str {
        "Legacy authentication blocked"
    }

    fn description(&self) -> &str {
        "Policies covering legacy client app types should block access"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Warning
    }

    async fn validate(&self, policy: &Policy, _context: &ValidationContext) -> Result<RuleResult, RuleError> {
        let client_apps = policy.string_list("conditions.clientAppTypes");
        let legacy: Vec<&str> = LEGACY_CLIENT_APPS
            .iter()
            .copied()
            .filter(|app| contains_ignore_case(&client_apps, app))
            .collect();
        if legacy.is_empty() {
            return Ok(RuleResult::pass());
        }

        let controls = policy.string_list("grantControls.builtInControls");
        if contains_ignore_case(&controls, "block") {
            return Ok(RuleResult::pass());
        }

        let issue = RuleIssue::new(
            IssueSeverity::Warning,
            format!("Legacy client apps ({}) are allowed instead of blocked", legacy.join(", ")),
        )
        .at_field("conditions.clientAppTypes")
        .with_suggestion("Use \"block\" as the grant control for legacy client app types");
        let recommendation = Recommendation {
            id: format!("legacy-auth-block:{}", policy.id()),
            title: "Block legacy authentication".to_string(),
            description: format!(
                "Policy '{}' covers legacy authentication clients without blocking them",
                policy.display_name()
            ),
            category: RuleCategory::Security.as_str().to_string(),
            severity: IssueSeverity::Warning,
            impact_score: 70.0,
            affected_field: "conditions.clientAppTypes".to_string(),
            recommended_value: "Block legacy client app types in a dedicated policy".to_string(),
        };

        Ok(RuleResult::from_issues(vec![issue]).with_recommendation(recommendation))
    }
}

/// Too many excluded users or groups weaken a policy
pub struct BroadExclusionsRule;

impl BroadExclusionsRule {
    fn max_exclusions(context: &ValidationContext) -> Result<u64, RuleError> {
        match context.config_value(MAX_EXCLUSIONS_KEY) {
            None => Ok(DEFAULT_MAX_EXCLUSIONS),
            Some(value) => value.as_u64().ok_or_else(|| RuleError::InvalidConfig {
                key: MAX_EXCLUSIONS_KEY.to_string(),
                reason: format!("expected a non-negative integer, found {}", value),
            }),
        }
    }
}

#[async_trait]
impl ValidationRule for BroadExclusionsRule {
    fn id(&self) -> &str {
        "broad-exclusions"
    }

    fn name(&self) -> &str {
        "Broad exclusions"
    }

    fn description(&self) -> &str {
        "Warns when a policy excludes more users and groups than the configured limit"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Compliance
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Warning
    }

    async fn validate(&self, policy: &Policy, context: &ValidationContext) -> Result<RuleResult, RuleError> {
        let limit = Self::max_exclusions(context)?;
        let excluded = policy.string_list("conditions.users.excludeUsers").len()
            + policy.string_list("conditions.users.excludeGroups").len();

        if excluded as u64 <= limit {
            return Ok(RuleResult::pass());
        }

        Ok(RuleResult::from_issues(vec![RuleIssue::new(
            IssueSeverity::Warning,
            format!("Policy excludes {} users and groups (limit {})", excluded, limit),
        )
        .at_field("conditions.users")
        .with_suggestion("Review exclusions and keep only break-glass accounts")]))
    }
}

/// Detects policies sharing an id or display name with another policy
pub struct DuplicatePolicyRule;

#[async_trait]
impl ValidationRule for DuplicatePolicyRule {
    fn id(&self) -> &str {
        "duplicate-policy"
    }

    fn name(&self) -> &str {
        "Duplicate policy"
    }

    fn description(&self) -> &str {
        "Policies must not share an id and should not share a display name"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Conflict
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Error
    }

    async fn validate(&self, policy: &Policy, context: &ValidationContext) -> Result<RuleResult, RuleError> {
        context.check_cancelled()?;

        let id = policy.id();
        let name = policy.display_name();
        let mut same_id = 0;
        let mut same_name = 0;
        let mut skipped_self = false;

        for other in context.policies() {
            // The snapshot holds this policy too; skip one identical entry
            if !skipped_self && other.policy == *policy {
                skipped_self = true;
                continue;
            }
            if !id.is_empty() && other.policy.id() == id {
                same_id += 1;
            } else if !name.is_empty() && other.policy.display_name().eq_ignore_ascii_case(name) {
                same_name += 1;
            }
        }

        let mut issues = Vec::new();
        if same_id > 0 {
            issues.push(
                RuleIssue::new(
                    IssueSeverity::Error,
                    format!("Policy id '{}' is used by {} other policies", id, same_id),
                )
                .at_field("id"),
            );
        }
        if same_name > 0 {
            issues.push(
                RuleIssue::new(
                    IssueSeverity::Warning,
                    format!("Display name '{}' is shared with {} other policies", name, same_name),
                )
                .at_field("displayName")
                .with_suggestion("Merge overlapping policies or give each a distinct name"),
            );
        }

        Ok(RuleResult::from_issues(issues))
    }
}

/// Display names must match the configured pattern
pub struct NamingConventionRule;

#[async_trait]
impl ValidationRule for NamingConventionRule {
    fn id(&self) -> &str {
        "naming-convention"
    }

    fn name(&self) -> &str {
        "Naming convention"
    }

    fn description(&self) -> &str {
        "Display names must match the namingPattern regex when one is configured"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::BestPractice
    }

    fn severity(&self) -> IssueSeverity {
        IssueSeverity::Warning
    }

    async fn validate(&self, policy: &Policy, context: &ValidationContext) -> Result<RuleResult, RuleError> {
        let Some(value) = context.config_value(NAMING_PATTERN_KEY) else {
            return Ok(RuleResult::pass());
        };
        let invalid = |reason: String| RuleError::InvalidConfig {
            key: NAMING_PATTERN_KEY.to_string(),
            reason,
        };
        let pattern = value
            .as_str()
            .ok_or_else(|| invalid(format!("expected a string, found {}", value)))?;
        let regex = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;

        let name = policy.display_name();
        if regex.is_match(name) {
            return Ok(RuleResult::pass());
        }

        Ok(RuleResult::from_issues(vec![RuleIssue::new(
            IssueSeverity::Warning,
            format!("Display name '{}' does not match pattern '{}'", name, pattern),
        )
        .at_field("displayName")]))
    }
}
