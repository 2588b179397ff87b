//! Per-operation policies built from `dac.yml`.
//!
//! Loading never fails: bad lines, contradictions and rules naming unknown
//! plugins or classes are dropped with a warning and the rest of the policy
//! stands. A malformed default fails closed for its operation.

use std::collections::BTreeMap;

use tracing::{debug, error, warn};
use warden_config::DacConfig;
use warden_core::{wildcard_match, Identity, PluginLookup};

use crate::operation::{Argument, Operation};
use crate::rule::{IdentityFilter, Rule, RuleType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationPolicy {
    pub default: RuleType,
    pub rules: Vec<Rule>,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            default: RuleType::Allow,
            rules: Vec::new(),
        }
    }
}

impl OperationPolicy {
    /// Decide for one caller. Every rule is consulted and the last match
    /// sets the verdict.
    pub fn decide(&self, caller: &Identity, argument: &Argument) -> RuleType {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(caller, argument))
            .map_or(self.default, |rule| rule.rule_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DacPolicy {
    operations: BTreeMap<Operation, OperationPolicy>,
}

impl DacPolicy {
    /// Build the policy from configuration. With a `lookup`, rules whose
    /// `PLUGIN=` or `SOURCE=` target matches nothing indexed are dropped.
    pub fn from_config(config: &DacConfig, lookup: Option<&dyn PluginLookup>) -> Self {
        let mut operations = BTreeMap::new();

        for (name, op_config) in &config.operations {
            let operation = match name.parse::<Operation>() {
                Ok(op) => op,
                Err(e) => {
                    warn!(operation = %name, error = %e, "[DAC] Ignoring policy for unknown operation");
                    continue;
                }
            };

            // An unreadable default denies; every configured rule is kept
            // since none of them can be told apart from the default.
            let (default, default_known) = match op_config.default.as_deref() {
                None => (RuleType::Allow, true),
                Some(raw) => match raw.trim().parse::<RuleType>() {
                    Ok(rule_type) => (rule_type, true),
                    Err(e) => {
                        error!(
                            operation = %operation,
                            error = %e,
                            "[DAC] Malformed default; denying unless a rule allows"
                        );
                        (RuleType::Deny, false)
                    }
                },
            };

            let mut rules = Vec::with_capacity(op_config.rules.len());
            for line in &op_config.rules {
                let rule = match Rule::parse(operation, line) {
                    Ok(rule) => rule,
                    Err(e) => {
                        warn!(operation = %operation, error = %e, "[DAC] Dropping malformed rule");
                        continue;
                    }
                };
                if default_known && rule.rule_type == default {
                    warn!(
                        operation = %operation,
                        rule = %rule.line,
                        "[DAC] Dropping rule that repeats the operation default"
                    );
                    continue;
                }
                if let Some(lookup) = lookup {
                    if !target_exists(&rule.filter, lookup) {
                        warn!(
                            operation = %operation,
                            rule = %rule.line,
                            "[DAC] Dropping rule whose target matches no indexed plugin"
                        );
                        continue;
                    }
                }
                rules.push(rule);
            }

            debug!(operation = %operation, default = %default, rules = rules.len(), "[DAC] Policy loaded");
            operations.insert(operation, OperationPolicy { default, rules });
        }

        Self { operations }
    }

    /// Unconfigured operations allow everything.
    pub fn get(&self, operation: Operation) -> OperationPolicy {
        self.operations.get(&operation).cloned().unwrap_or_default()
    }

    pub fn policy(&self, operation: Operation) -> Option<&OperationPolicy> {
        self.operations.get(&operation)
    }

    pub fn decide(&self, operation: Operation, caller: &Identity, argument: &Argument) -> RuleType {
        match self.operations.get(&operation) {
            Some(policy) => policy.decide(caller, argument),
            None => RuleType::Allow,
        }
    }
}

fn target_exists(filter: &IdentityFilter, lookup: &dyn PluginLookup) -> bool {
    match filter {
        IdentityFilter::All => true,
        IdentityFilter::Plugin(name) => {
            lookup.plugin_by_name(name).is_some()
                || lookup.plugins().iter().any(|p| wildcard_match(name, &p.display_name))
        }
        IdentityFilter::Source { class, .. } => {
            lookup.plugin_for_class(class).is_some()
                || lookup
                    .plugins()
                    .iter()
                    .any(|p| p.class_names.iter().any(|c| wildcard_match(class, c)))
        }
    }
}
