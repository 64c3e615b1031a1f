use std::sync::Arc;

use crate::models::ValidationOptions;
use super::{builtin, RuleDescriptor, ValidationRule};

/// Registry of available rule plugins, in registration order
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl RuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a registry holding every built-in rule
    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();
        for rule in builtin::all_rules() {
            registry.register(rule);
        }
        registry
    }

    /// Add a rule. Returns `false` and keeps the existing rule when the id is
    /// already registered.
    pub fn register(&mut self, rule: Arc<dyn ValidationRule>) -> bool {
        if self.rules.iter().any(|r| r.id() == rule.id()) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Get a rule by id
    pub fn get(&self, rule_id: &str) -> Option<Arc<dyn ValidationRule>> {
        self.rules.iter().find(|r| r.id() == rule_id).cloned()
    }

    /// All rule ids in registration order
    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.id().to_string()).collect()
    }

    /// Descriptors of all registered rules
    pub fn descriptors(&self) -> Vec<RuleDescriptor> {
        self.rules.iter().map(|r| RuleDescriptor::of(r.as_ref())).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules selected for a run, in registration order.
    ///
    /// A rule is selected when it is in `enabled_rules` (or that list is
    /// empty), is not in `disabled_rules`, belongs to one of `categories` (or
    /// that list is empty), and can report at least `minimum_severity`.
    pub fn enabled_rules(&self, options: &ValidationOptions) -> Vec<Arc<dyn ValidationRule>> {
        self.rules
            .iter()
            .filter(|rule| {
                options.enabled_rules.is_empty()
                    || options.enabled_rules.iter().any(|id| id == rule.id())
            })
            .filter(|rule| !options.disabled_rules.iter().any(|id| id == rule.id()))
            .filter(|rule| {
                options.categories.is_empty() || options.categories.contains(&rule.category())
            })
            .filter(|rule| rule.severity() >= options.minimum_severity)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rule_ids())
            .finish()
    }
}
