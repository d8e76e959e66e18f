//! Vigil Engine
//!
//! Builds, validates, and hot-swaps rule engine snapshots.
//!
//! A build wires filter/formatter factories for every configured event
//! source, loads the rules files, checks plugin compatibility and applies the
//! configured enable/disable filters. Finished snapshots are handed to the
//! evaluation path through a last-write-wins slot, so evaluation never waits
//! on a build and never sees a half-built engine.

pub mod builder;
pub mod config;
pub mod factory;
pub mod slot;
pub mod swap;

use std::sync::Arc;

/// An immutable, fully wired engine shared with the evaluation path
pub type EngineSnapshot = Arc<vigil_rules::RulesEngine>;

pub use builder::{apply_rule_filters, BuiltEngine, EngineBuilder};
pub use config::{EngineConfig, PluginInfo};
pub use factory::source_factories;
pub use slot::{PendingSlot, Published, SlotReceiver};
pub use swap::SwappableEngine;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::EngineBuilder;
    pub use crate::config::{EngineConfig, PluginInfo};
    pub use crate::swap::SwappableEngine;
    pub use crate::EngineSnapshot;
}
