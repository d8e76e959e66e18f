//! Event source names
//!
//! The two built-in sources get dedicated filter/formatter factories; any
//! other name is assumed to be provided by a source plugin.

use std::fmt;

/// Name of the built-in syscall event source
pub const SYSCALL_SOURCE: &str = "syscall";

/// Name of the built-in Kubernetes audit event source
pub const K8S_AUDIT_SOURCE: &str = "k8s_audit";

/// A named origin of streamed events
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSource {
    /// Kernel syscall events read through the capture handle
    Syscall,
    /// Kubernetes audit log events (JSON)
    K8sAudit,
    /// Events produced by a source plugin
    Plugin(String),
}

impl EventSource {
    /// Resolve a configured source name. Matching is exact.
    pub fn from_name(name: &str) -> Self {
        match name {
            SYSCALL_SOURCE => Self::Syscall,
            K8S_AUDIT_SOURCE => Self::K8sAudit,
            other => Self::Plugin(other.to_string()),
        }
    }

    /// The name this source is registered under
    pub fn name(&self) -> &str {
        match self {
            Self::Syscall => SYSCALL_SOURCE,
            Self::K8sAudit => K8S_AUDIT_SOURCE,
            Self::Plugin(name) => name,
        }
    }

    /// Whether this source is provided by a plugin
    pub fn is_plugin(&self) -> bool {
        matches!(self, Self::Plugin(_))
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
