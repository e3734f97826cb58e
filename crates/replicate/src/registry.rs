use std::collections::BTreeMap;
use vessel_common::Role;
use vessel_ledger::{LedgerError, SubstanceLedger, discard, transfer};

use crate::wire::{ContainerRef, LedgerCommand, WireError, decode_command};

/// Errors from routing a ledger command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown container {0}")]
    UnknownContainer(ContainerRef),
    #[error("cannot transfer container {0} into itself")]
    SameContainer(ContainerRef),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Ledgers addressable by network reference, plus the role this process
/// plays. On the server this is where client commands land.
#[derive(Debug)]
pub struct ContainerRegistry {
    role: Role,
    ledgers: BTreeMap<ContainerRef, SubstanceLedger>,
}

impl ContainerRegistry {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ledgers: BTreeMap::new(),
        }
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Register a ledger. Returns the ledger previously held under `container`.
    pub fn insert(
        &mut self,
        container: ContainerRef,
        ledger: SubstanceLedger,
    ) -> Option<SubstanceLedger> {
        self.ledgers.insert(container, ledger)
    }

    /// Remove a ledger when its container entity is destroyed.
    pub fn remove(&mut self, container: ContainerRef) -> Option<SubstanceLedger> {
        self.ledgers.remove(&container)
    }

    pub fn get(&self, container: ContainerRef) -> Option<&SubstanceLedger> {
        self.ledgers.get(&container)
    }

    pub fn get_mut(&mut self, container: ContainerRef) -> Option<&mut SubstanceLedger> {
        self.ledgers.get_mut(&container)
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Sum of moles across every registered ledger.
    pub fn total_moles(&self) -> f32 {
        self.ledgers.values().map(SubstanceLedger::total_moles).sum()
    }

    /// Resolve the command's references and run it under this registry's role.
    /// Returns the moles moved or removed.
    pub fn apply(&mut self, command: &LedgerCommand) -> Result<f32, RegistryError> {
        match *command {
            LedgerCommand::TransferMoles {
                source,
                destination,
                amount,
            } => self.transfer_between(source, destination, amount),
            LedgerCommand::RemoveMoles { source, amount } => {
                let role = self.role;
                let ledger = self
                    .ledgers
                    .get_mut(&source)
                    .ok_or(RegistryError::UnknownContainer(source))?;
                Ok(discard(role, ledger, amount)?)
            }
        }
    }

    /// Decode a client command frame and apply it.
    pub fn apply_frame(&mut self, frame: &[u8]) -> Result<f32, RegistryError> {
        let command = decode_command(frame)?;
        self.apply(&command)
    }

    fn transfer_between(
        &mut self,
        source: ContainerRef,
        destination: ContainerRef,
        amount: f32,
    ) -> Result<f32, RegistryError> {
        if source == destination {
            return Err(RegistryError::SameContainer(source));
        }
        if !self.ledgers.contains_key(&destination) {
            return Err(RegistryError::UnknownContainer(destination));
        }
        // Take the source out so both ledgers can be borrowed mutably.
        let mut src = self
            .ledgers
            .remove(&source)
            .ok_or(RegistryError::UnknownContainer(source))?;
        let result = match self.ledgers.get_mut(&destination) {
            Some(dst) => transfer(self.role, &mut src, dst, amount).map_err(RegistryError::from),
            None => Err(RegistryError::UnknownContainer(destination)),
        };
        self.ledgers.insert(source, src);
        result
    }
}
