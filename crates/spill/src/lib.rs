//! Spills: deciding when an open container pours, and where the poured
//! liquid ends up.
//!
//! # Invariants
//! - Time only advances through the `dt` handed to [`SpillController::step`].
//! - Poured liquid either lands in another ledger or is discarded; routing
//!   never creates moles.

mod controller;
mod routing;

pub use controller::{SpillController, SpillError, SpillEvent, SpillInput, tilt_degrees};
pub use routing::{HitTarget, SpillTally, route_particle_hits};

pub fn crate_info() -> &'static str {
    "vessel-spill v0.1.0"
}
