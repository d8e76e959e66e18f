//! Event-capture handle
//!
//! The capture subsystem (the "inspector") is owned by the data role. The
//! build step only clones the handle into syscall and plugin factories; the
//! inspector itself is only dereferenced while events are evaluated on the
//! thread that calls `fetch`.

use std::fmt::Debug;
use std::sync::Arc;

/// Opaque event-capture context
pub trait Inspector: Send + Sync + Debug {
    /// Name of the capture backend (for logging/debugging)
    fn name(&self) -> &str;
}

/// Shared, read-only reference to the capture context
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    inner: Arc<dyn Inspector>,
}

impl CaptureHandle {
    /// Wrap an inspector
    pub fn new(inspector: impl Inspector + 'static) -> Self {
        Self {
            inner: Arc::new(inspector),
        }
    }

    /// Access the inspector
    pub fn inspector(&self) -> &dyn Inspector {
        self.inner.as_ref()
    }

    /// Whether two handles refer to the same inspector
    pub fn same_as(&self, other: &CaptureHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Inspector with no live capture, used for validation and offline tooling
#[derive(Debug, Clone)]
pub struct OfflineInspector {
    name: String,
}

impl OfflineInspector {
    /// Create an offline inspector with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for OfflineInspector {
    fn default() -> Self {
        Self::new("offline")
    }
}

impl Inspector for OfflineInspector {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_inspector() {
        let handle = CaptureHandle::new(OfflineInspector::new("test"));
        let clone = handle.clone();
        assert!(handle.same_as(&clone));
        assert_eq!(clone.inspector().name(), "test");

        let other = CaptureHandle::new(OfflineInspector::default());
        assert!(!handle.same_as(&other));
    }
}
