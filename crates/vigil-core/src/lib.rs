//! Vigil Core
//!
//! Core types, traits, and utilities shared across Vigil components.
//!
//! This crate provides:
//! - Error types and result handling for engine builds and swaps
//! - Rule priorities and output formats
//! - Event source names and the capture handle
//! - Filter/formatter factory traits and the plugin filter-check registry

pub mod capture;
pub mod error;
pub mod factory;
pub mod filter_check;
pub mod source;
pub mod types;

pub use capture::{CaptureHandle, Inspector, OfflineInspector};
pub use error::{Error, Result};
pub use factory::{
    check_condition_syntax, CompiledFilter, FieldScanner, FilterFactory, FormatterFactory,
};
pub use filter_check::{FilterCheckInfo, FilterCheckList};
pub use source::{EventSource, K8S_AUDIT_SOURCE, SYSCALL_SOURCE};
pub use types::{OutputFormat, Priority};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::capture::{CaptureHandle, Inspector};
    pub use crate::error::{Error, Result};
    pub use crate::factory::{FilterFactory, FormatterFactory};
    pub use crate::source::EventSource;
    pub use crate::types::{OutputFormat, Priority};
}
