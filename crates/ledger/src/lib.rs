//! Substance ledgers: the authoritative record of what each container holds.
//!
//! # Invariants
//! - Only `Role::Server` mutates a ledger; other roles are rejected with no effect.
//! - No entry holds a negative quantity; totals stay finite.
//! - A substance id maps to one definition per ledger, with a positive molar volume.
//! - Removal never reports more than was requested.
//! - `transfer` conserves moles; `discard` deliberately does not.
//! - Each state-changing call queues exactly one notification per subscriber.

pub mod ledger;
pub mod substance;
pub mod transfer;

pub use ledger::{ContentsChanged, LedgerError, SubscriptionId, SubstanceEntry, SubstanceLedger};
pub use substance::{CatalogError, Substance, SubstanceCatalog, SubstanceId};
pub use transfer::{discard, transfer};

pub fn crate_info() -> &'static str {
    "vessel-ledger v0.1.0"
}
