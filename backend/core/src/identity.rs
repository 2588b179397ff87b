/// Identity: who performed an action, or which callers a rule applies to.
///
/// A *concrete* identity describes an actual call site and has every field set.
/// A *filter* identity sets any subset of fields; unset fields are wildcards.
/// Only `filter.matches(&concrete)` is meaningful; every other pairing is an error.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::wildcard::wildcard_match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFlavor {
    Concrete,
    Filter,
}

impl fmt::Display for IdentityFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityFlavor::Concrete => f.write_str("concrete"),
            IdentityFlavor::Filter => f.write_str("filter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    flavor: IdentityFlavor,
    file_path: Option<String>,
    plugin_name: Option<String>,
    class_name: Option<String>,
    method_name: Option<String>,
}

impl Identity {
    /// Build a concrete identity. Every field must be non-empty.
    pub fn concrete(
        file_path: impl Into<String>,
        plugin_name: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Result<Self, WardenError> {
        let non_empty = |value: String, field: &'static str| {
            if value.is_empty() {
                Err(WardenError::IncompleteIdentity(field))
            } else {
                Ok(Some(value))
            }
        };
        Ok(Self {
            flavor: IdentityFlavor::Concrete,
            file_path: non_empty(file_path.into(), "file_path")?,
            plugin_name: non_empty(plugin_name.into(), "plugin_name")?,
            class_name: non_empty(class_name.into(), "class_name")?,
            method_name: non_empty(method_name.into(), "method_name")?,
        })
    }

    /// An empty filter, matching every concrete identity.
    pub fn filter() -> Self {
        FilterBuilder::default().build()
    }

    /// Start a filter with some fields set. Only filters can be built this
    /// way; concrete identities come from [`Identity::concrete`].
    pub fn filter_builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    pub fn flavor(&self) -> IdentityFlavor {
        self.flavor
    }

    pub fn is_filter(&self) -> bool {
        self.flavor == IdentityFlavor::Filter
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin_name.as_deref()
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method_name.as_deref()
    }

    /// Match this filter against a concrete call site.
    ///
    /// Every field set on the filter must wildcard-match the corresponding
    /// concrete field. Returns `IdentityRole` when `self` is not a filter or
    /// `concrete` is not concrete.
    pub fn matches(&self, concrete: &Identity) -> Result<bool, WardenError> {
        if self.flavor != IdentityFlavor::Filter || concrete.flavor != IdentityFlavor::Concrete {
            return Err(WardenError::IdentityRole {
                receiver: self.flavor,
                argument: concrete.flavor,
            });
        }

        let field = |pattern: &Option<String>, value: &Option<String>| match (pattern, value) {
            (None, _) => true,
            (Some(p), Some(v)) => wildcard_match(p, v),
            (Some(_), None) => false,
        };

        Ok(field(&self.file_path, &concrete.file_path)
            && field(&self.plugin_name, &concrete.plugin_name)
            && field(&self.class_name, &concrete.class_name)
            && field(&self.method_name, &concrete.method_name))
    }
}

/// Builder for filter identities. Unset fields stay wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct FilterBuilder {
    file_path: Option<String>,
    plugin_name: Option<String>,
    class_name: Option<String>,
    method_name: Option<String>,
}

impl FilterBuilder {
    pub fn with_file_path(mut self, pattern: impl Into<String>) -> Self {
        self.file_path = Some(pattern.into());
        self
    }

    pub fn with_plugin(mut self, pattern: impl Into<String>) -> Self {
        self.plugin_name = Some(pattern.into());
        self
    }

    pub fn with_class(mut self, pattern: impl Into<String>) -> Self {
        self.class_name = Some(pattern.into());
        self
    }

    pub fn with_method(mut self, pattern: impl Into<String>) -> Self {
        self.method_name = Some(pattern.into());
        self
    }

    pub fn build(self) -> Identity {
        Identity {
            flavor: IdentityFlavor::Filter,
            file_path: self.file_path,
            plugin_name: self.plugin_name,
            class_name: self.class_name,
            method_name: self.method_name,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{}[{}] {}#{}",
            show(&self.plugin_name),
            show(&self.file_path),
            show(&self.class_name),
            show(&self.method_name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evil() -> Identity {
        Identity::concrete("/plugins/Evil.jar", "Evil", "com.evil.Main", "onEnable").unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Identity::filter().matches(&evil()).unwrap());
    }

    #[test]
    fn test_plugin_filter() {
        assert!(Identity::filter_builder().with_plugin("Evil").build().matches(&evil()).unwrap());
        assert!(!Identity::filter_builder().with_plugin("Good").build().matches(&evil()).unwrap());
        assert!(Identity::filter_builder().with_plugin("Ev?l").build().matches(&evil()).unwrap());
    }

    #[test]
    fn test_all_set_fields_must_match() {
        let filter = Identity::filter_builder().with_class("com.evil.*").with_method("onDisable").build();
        assert!(!filter.matches(&evil()).unwrap());
        let filter = Identity::filter_builder().with_class("com.evil.*").with_method("on*").build();
        assert!(filter.matches(&evil()).unwrap());
    }

    #[test]
    fn test_reversed_roles_is_an_error() {
        let err = evil().matches(&Identity::filter()).unwrap_err();
        assert!(matches!(
            err,
            WardenError::IdentityRole {
                receiver: IdentityFlavor::Concrete,
                argument: IdentityFlavor::Filter
            }
        ));
    }

    #[test]
    fn test_two_filters_is_an_error() {
        let result = Identity::filter().matches(&Identity::filter_builder().with_plugin("x").build());
        assert!(result.is_err());
    }

    #[test]
    fn test_two_concretes_is_an_error() {
        assert!(evil().matches(&evil()).is_err());
    }

    #[test]
    fn test_concrete_requires_all_fields() {
        let err = Identity::concrete("/a.jar", "", "A", "run").unwrap_err();
        assert!(matches!(err, WardenError::IncompleteIdentity("plugin_name")));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Identity::filter_builder().with_plugin("Evil").build().to_string(),
            "Evil[*] *#*"
        );
    }

    #[test]
    fn test_builder_only_yields_filters() {
        let filter = Identity::filter_builder()
            .with_file_path("/plugins/*.jar")
            .with_plugin("Evil")
            .with_class("com.evil.Main")
            .with_method("onEnable")
            .build();
        assert_eq!(filter.flavor(), IdentityFlavor::Filter);
        assert!(filter.matches(&evil()).unwrap());
        // A fully specified filter is still a filter, never a call site.
        assert!(evil().matches(&filter).is_err());
        assert!(filter.matches(&filter).is_err());
    }
}
