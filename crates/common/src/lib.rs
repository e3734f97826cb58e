//! Shared types for the vessel workspace.
//!
//! # Invariants
//! - Types here carry no behaviour that mutates ledger state.
//! - Colours are linear RGBA in `[0, 1]`; conversions are pure.

pub mod color;
pub mod config;
pub mod types;

pub use color::Rgba;
pub use config::{ConfigError, DisplayConfig, SimConfig, SpillConfig};
pub use types::{LedgerId, Role};

pub fn crate_info() -> &'static str {
    "vessel-common v0.1.0"
}
