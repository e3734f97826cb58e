//! Wire messages between the authoritative server and observing clients.
//!
//! Display updates travel as a fixed 8-byte [`ContainerRef`] header followed
//! by a CBOR body, so a client can route a frame to its container before
//! decoding the payload. Client commands are plain CBOR.

use serde::{Deserialize, Serialize};

use crate::snapshot::DisplaySnapshot;

/// Errors from encoding or decoding wire messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("CBOR serialization error: {0}")]
    Encode(String),
    #[error("CBOR deserialization error: {0}")]
    Decode(String),
    #[error("truncated frame: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
}

/// Network-stable reference to a container: the owning object's network id
/// plus the container's index on that object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerRef {
    pub net_id: u32,
    pub index: u32,
}

impl ContainerRef {
    pub const ENCODED_LEN: usize = 8;

    pub const fn new(net_id: u32, index: u32) -> Self {
        Self { net_id, index }
    }

    /// `net_id` then `index`, each little-endian.
    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..4].copy_from_slice(&self.net_id.to_le_bytes());
        out[4..].copy_from_slice(&self.index.to_le_bytes());
        out
    }

    /// Read a reference from the front of `bytes`, returning the rest.
    pub fn read(bytes: &[u8]) -> Result<(Self, &[u8]), WireError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(WireError::Truncated {
                needed: Self::ENCODED_LEN,
                got: bytes.len(),
            });
        }
        let (head, rest) = bytes.split_at(Self::ENCODED_LEN);
        let mut net_id = [0u8; 4];
        let mut index = [0u8; 4];
        net_id.copy_from_slice(&head[..4]);
        index.copy_from_slice(&head[4..]);
        Ok((
            Self {
                net_id: u32::from_le_bytes(net_id),
                index: u32::from_le_bytes(index),
            },
            rest,
        ))
    }
}

impl std::fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.net_id, self.index)
    }
}

/// One consolidated display update for one container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayUpdate {
    pub target: ContainerRef,
    pub snapshot: DisplaySnapshot,
}

/// Mutation request a client sends to the server instead of touching a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LedgerCommand {
    TransferMoles {
        source: ContainerRef,
        destination: ContainerRef,
        amount: f32,
    },
    RemoveMoles {
        source: ContainerRef,
        amount: f32,
    },
}

pub fn encode_update(update: &DisplayUpdate) -> Result<Vec<u8>, WireError> {
    let mut buf = update.target.to_bytes().to_vec();
    ciborium::into_writer(&update.snapshot, &mut buf)
        .map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(buf)
}

pub fn decode_update(bytes: &[u8]) -> Result<DisplayUpdate, WireError> {
    let (target, body) = ContainerRef::read(bytes)?;
    let snapshot = cbor_deserialize(body)?;
    Ok(DisplayUpdate { target, snapshot })
}

/// Peek at a frame's destination without decoding the body.
pub fn peek_target(bytes: &[u8]) -> Result<ContainerRef, WireError> {
    ContainerRef::read(bytes).map(|(target, _)| target)
}

pub fn encode_command(command: &LedgerCommand) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(command, &mut buf).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(buf)
}

pub fn decode_command(bytes: &[u8]) -> Result<LedgerCommand, WireError> {
    cbor_deserialize(bytes)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, WireError> {
    ciborium::from_reader(data).map_err(|e| WireError::Decode(e.to_string()))
}
