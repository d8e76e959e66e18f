//! Plugin filter-check registry
//!
//! Source plugins contribute groups of filter fields. Every plugin-sourced
//! factory in one engine build shares the same list, so plugin-defined
//! checks resolve identically across sources within a snapshot.

use serde::{Deserialize, Serialize};

/// A named group of filter fields contributed by one plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCheckInfo {
    /// Name of the contributing plugin
    pub name: String,

    /// Field names the plugin can extract (e.g. `ct.name`)
    pub fields: Vec<String>,
}

impl FilterCheckInfo {
    /// Create a filter-check group
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered set of filter-check groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCheckList {
    checks: Vec<FilterCheckInfo>,
}

impl FilterCheckList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group, replacing any earlier group with the same name
    pub fn add(&mut self, info: FilterCheckInfo) {
        if let Some(existing) = self.checks.iter_mut().find(|c| c.name == info.name) {
            *existing = info;
        } else {
            self.checks.push(info);
        }
    }

    /// Look up a group by plugin name
    pub fn get(&self, name: &str) -> Option<&FilterCheckInfo> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Whether any registered group defines `field`
    ///
    /// An indexed field such as `ct.label[env]` matches its base name.
    pub fn contains_field(&self, field: &str) -> bool {
        let base = field.split('[').next().unwrap_or(field);
        self.checks
            .iter()
            .any(|c| c.fields.iter().any(|f| f == base))
    }

    /// Registered groups in registration order
    pub fn checks(&self) -> &[FilterCheckInfo] {
        &self.checks
    }

    /// Number of registered groups
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no group is registered
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
