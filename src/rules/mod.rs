use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::ValidationContext;
use crate::models::{IssueSeverity, Policy, RuleCategory, RuleResult};

pub mod builtin;
pub mod registry;

pub use registry::RuleRegistry;

/// Failure of a rule invocation, as opposed to findings about the policy
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The run's cancellation signal was observed
    #[error("validation cancelled")]
    Cancelled,

    /// The rule could not evaluate the policy
    #[error("{0}")]
    Execution(String),

    /// Run configuration consumed by the rule is unusable
    #[error("invalid configuration '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },
}

/// Pluggable policy check.
///
/// Implementations are shared across workers and called concurrently for
/// different files, so they must not keep per-call mutable state.
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Unique rule identifier
    fn id(&self) -> &str;

    /// Short human-readable name
    fn name(&self) -> &str;

    /// What the rule checks
    fn description(&self) -> &str;

    /// Category used for selection and for tagging findings
    fn category(&self) -> RuleCategory;

    /// Highest severity this rule can report
    fn severity(&self) -> IssueSeverity;

    /// Check one policy. The context gives access to run configuration, the
    /// full policy snapshot and the cancellation signal.
    async fn validate(&self, policy: &Policy, context: &ValidationContext) -> Result<RuleResult, RuleError>;
}

/// Serializable summary of a registered rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: RuleCategory,
    pub severity: IssueSeverity,
}

impl RuleDescriptor {
    pub fn of(rule: &dyn ValidationRule) -> Self {
        Self {
            id: rule.id().to_string(),
            name: rule.name().to_string(),
            description: rule.description().to_string(),
            category: rule.category(),
            severity: rule.severity(),
        }
    }
}
