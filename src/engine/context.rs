//! Run-scoped validation context and its builder

use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::logging::{NoopLogger, PolicyLogger};
use crate::models::{IssueSeverity, Policy, ValidationOptions};
use crate::rules::RuleError;
use super::CancellationSignal;

/// Name of the optional sidecar configuration file in the policy directory
pub const CONFIG_FILE_NAME: &str = "validation-config.json";

/// A policy that parsed successfully during preload
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPolicy {
    pub path: PathBuf,
    pub policy: Policy,
}

/// Shared, read-only state for one run.
///
/// Built once before any file is validated and only read afterwards, so it is
/// handed to workers behind an `Arc` without locking.
#[derive(Clone)]
pub struct ValidationContext {
    options: ValidationOptions,
    config: Map<String, JsonValue>,
    policies: Vec<LoadedPolicy>,
    cancellation: CancellationSignal,
    logger: Arc<dyn PolicyLogger>,
}

impl ValidationContext {
    /// Context with no configuration and no preloaded policies
    pub fn new(options: ValidationOptions) -> Self {
        Self {
            options,
            config: Map::new(),
            policies: Vec::new(),
            cancellation: CancellationSignal::new(),
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_config(mut self, config: Map<String, JsonValue>) -> Self {
        self.config = config;
        self
    }

    pub fn with_policies(mut self, policies: Vec<LoadedPolicy>) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn PolicyLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Resolved run options
    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Sidecar configuration; empty when absent or malformed
    pub fn config(&self) -> &Map<String, JsonValue> {
        &self.config
    }

    pub fn config_value(&self, key: &str) -> Option<&JsonValue> {
        self.config.get(key)
    }

    /// Every policy that parsed during preload
    pub fn policies(&self) -> &[LoadedPolicy] {
        &self.policies
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// `Err(RuleError::Cancelled)` once cancellation has been requested
    pub fn check_cancelled(&self) -> Result<(), RuleError> {
        if self.is_cancelled() {
            Err(RuleError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn logger(&self) -> &dyn PolicyLogger {
        self.logger.as_ref()
    }
}

impl std::fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationContext")
            .field("options", &self.options)
            .field("config_keys", &self.config.keys().collect::<Vec<_>>())
            .field("policies", &self.policies.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Builds a [`ValidationContext`] from a policy directory
pub struct ContextBuilder {
    logger: Arc<dyn PolicyLogger>,
    cancellation: CancellationSignal,
}

impl ContextBuilder {
    pub fn new(logger: Arc<dyn PolicyLogger>) -> Self {
        Self {
            logger,
            cancellation: CancellationSignal::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Load the sidecar configuration and preload `policy_files`.
    ///
    /// Never fails: a malformed sidecar yields an empty configuration and a
    /// policy that does not parse is left out of the snapshot, each with a
    /// warning.
    pub async fn build(
        &self,
        directory: &Path,
        policy_files: &[PathBuf],
        options: ValidationOptions,
    ) -> ValidationContext {
        let config = self.load_config(directory).await;
        let options = merge_rule_settings(options, &config, self.logger.as_ref());
        let policies = self.preload_policies(policy_files).await;

        self.logger.log_info(&format!(
            "Validation context ready: {} of {} policies preloaded, {} config keys",
            policies.len(),
            policy_files.len(),
            config.len()
        ));

        ValidationContext {
            options,
            config,
            policies,
            cancellation: self.cancellation.clone(),
            logger: self.logger.clone(),
        }
    }

    async fn load_config(&self, directory: &Path) -> Map<String, JsonValue> {
        let path = directory.join(CONFIG_FILE_NAME);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                self.logger.log_warning(&format!(
                    "Failed to read {}: {}; continuing with empty configuration",
                    path.display(),
                    e
                ));
                return Map::new();
            }
        };

        match serde_json::from_str::<JsonValue>(&content) {
            Ok(JsonValue::Object(config)) => config,
            Ok(_) => {
                self.logger.log_warning(&format!(
                    "{} is not a JSON object; continuing with empty configuration",
                    path.display()
                ));
                Map::new()
            }
            Err(e) => {
                self.logger.log_warning(&format!(
                    "Failed to parse {}: {}; continuing with empty configuration",
                    path.display(),
                    e
                ));
                Map::new()
            }
        }
    }

    async fn preload_policies(&self, policy_files: &[PathBuf]) -> Vec<LoadedPolicy> {
        let mut policies = Vec::with_capacity(policy_files.len());
        for path in policy_files {
            let content = match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    self.logger.log_warning(&format!("Skipping {} in policy snapshot: {}", path.display(), e));
                    continue;
                }
            };
            match Policy::from_json_str(&content) {
                Ok(policy) => policies.push(LoadedPolicy {
                    path: path.clone(),
                    policy,
                }),
                Err(e) => {
                    self.logger.log_warning(&format!("Skipping {} in policy snapshot: {}", path.display(), e));
                }
            }
        }
        policies
    }
}

/// Fold the sidecar's `rules` section into the run options. Values set
/// explicitly in `options` win; disabled rule lists are unioned.
fn merge_rule_settings(
    mut options: ValidationOptions,
    config: &Map<String, JsonValue>,
    logger: &dyn PolicyLogger,
) -> ValidationOptions {
    let Some(rules) = config.get("rules").and_then(|r| r.as_object()) else {
        return options;
    };

    let ids = |key: &str| -> Vec<String> {
        rules
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };

    if options.enabled_rules.is_empty() {
        options.enabled_rules = ids("enabled");
    }
    for id in ids("disabled") {
        if !options.disabled_rules.contains(&id) {
            options.disabled_rules.push(id);
        }
    }
    if options.minimum_severity == IssueSeverity::Info {
        if let Some(raw) = rules.get("minimumSeverity").and_then(|v| v.as_str()) {
            match raw.parse::<IssueSeverity>() {
                Ok(severity) => options.minimum_severity = severity,
                Err(e) => logger.log_warning(&format!("Ignoring rules.minimumSeverity: {}", e)),
            }
        }
    }
    options
}
