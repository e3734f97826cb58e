//! Replication of container display state from server to clients.
//!
//! # Invariants
//! - Only derived display state crosses the network; ledgers never do.
//! - One consolidated update per change batch, sent to every observer.
//! - Observers apply snapshots verbatim and never mutate a ledger.
//! - Client mutation requests arrive as commands and run under the server role.

pub mod bridge;
pub mod mirror;
pub mod registry;
pub mod snapshot;
pub mod wire;

pub use bridge::{
    BridgeError, BridgeState, DisplayTransport, LoopbackTransport, ObserverId, ReplicationBridge,
};
pub use mirror::DisplayMirror;
pub use registry::{ContainerRegistry, RegistryError};
pub use snapshot::{DisplayProfile, DisplaySnapshot, mix_color};
pub use wire::{
    ContainerRef, DisplayUpdate, LedgerCommand, WireError, decode_command, decode_update,
    encode_command, encode_update, peek_target,
};

pub fn crate_info() -> &'static str {
    "vessel-replicate v0.1.0"
}
