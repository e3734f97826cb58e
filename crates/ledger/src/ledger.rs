use std::collections::BTreeMap;
use std::sync::Arc;
use vessel_common::{LedgerId, Role};

use crate::substance::{Substance, SubstanceId};

/// One substance held by a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstanceEntry {
    pub substance: Arc<Substance>,
    pub moles: f32,
}

/// Notification queued for every subscriber after a state-changing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentsChanged {
    pub ledger: LedgerId,
    /// Ledger revision after the change.
    pub revision: u64,
}

/// Handle returned by [`SubstanceLedger::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Errors from ledger operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount {0}: must be positive and finite")]
    InvalidAmount(f32),
    #[error("invalid capacity {0}: must be positive and finite")]
    InvalidCapacity(f32),
    #[error("ledger {0} can only be mutated by the server")]
    NotAuthoritative(LedgerId),
    #[error("molar volume of {id} must be positive and finite, got {molar_volume}")]
    InvalidSubstance { id: SubstanceId, molar_volume: f32 },
    #[error("ledger {ledger} already holds a different definition of {id}")]
    ConflictingSubstance { id: SubstanceId, ledger: LedgerId },
}

/// The authoritative record of substance quantities held by one container.
///
/// Every mutating call takes the caller's [`Role`] and is rejected unless it
/// is `Role::Server`. Entries keep insertion order; a substance appears at
/// most once. Removal is proportional: each entry gives up the same fraction
/// of its moles, so the mixture's composition survives a partial removal.
///
/// Deposits are checked against the definitions already held: a substance id
/// maps to one definition per ledger, and molar volumes must be positive.
#[derive(Debug)]
pub struct SubstanceLedger {
    id: LedgerId,
    capacity_volume: f32,
    entries: Vec<SubstanceEntry>,
    revision: u64,
    /// Pending notifications per subscriber.
    mailboxes: BTreeMap<SubscriptionId, Vec<ContentsChanged>>,
    next_subscription: u64,
}

impl SubstanceLedger {
    /// Create an empty ledger with the given capacity in volume units.
    pub fn new(capacity_volume: f32) -> Result<Self, LedgerError> {
        if !(capacity_volume.is_finite() && capacity_volume > 0.0) {
            return Err(LedgerError::InvalidCapacity(capacity_volume));
        }
        Ok(Self {
            id: LedgerId::new(),
            capacity_volume,
            entries: Vec::new(),
            revision: 0,
            mailboxes: BTreeMap::new(),
            next_subscription: 0,
        })
    }

    /// Create a ledger pre-filled from container initialization data.
    ///
    /// Initial contents are not a mutation: no role is required and no
    /// notification is raised.
    pub fn with_contents(
        capacity_volume: f32,
        contents: impl IntoIterator<Item = (Arc<Substance>, f32)>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(capacity_volume)?;
        for (substance, moles) in contents {
            validate_amount(moles)?;
            ledger.check_substance(&substance)?;
            ledger.check_headroom(moles, moles * substance.molar_volume)?;
            ledger.deposit(&substance, moles);
        }
        Ok(ledger)
    }

    pub fn id(&self) -> LedgerId {
        self.id
    }

    pub fn capacity_volume(&self) -> f32 {
        self.capacity_volume
    }

    /// Incremented once per state-changing call.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_moles(&self) -> f32 {
        self.entries.iter().map(|e| e.moles).sum()
    }

    pub fn current_volume(&self) -> f32 {
        self.entries
            .iter()
            .map(|e| e.moles * e.substance.molar_volume)
            .sum()
    }

    /// `current_volume / capacity_volume`. Not clamped; may exceed 1 after an overfill.
    pub fn relative_volume(&self) -> f32 {
        self.current_volume() / self.capacity_volume
    }

    /// Read-only copy of the current entries in insertion order.
    pub fn substances(&self) -> Vec<SubstanceEntry> {
        self.entries.clone()
    }

    /// Borrowed view of the entries.
    pub fn entries(&self) -> &[SubstanceEntry] {
        &self.entries
    }

    /// Moles held of one substance, zero when absent.
    pub fn moles_of(&self, id: SubstanceId) -> f32 {
        self.entries
            .iter()
            .find(|e| e.substance.id == id)
            .map_or(0.0, |e| e.moles)
    }

    /// Add `amount` moles of `substance`, merging with an existing entry.
    pub fn add_moles(
        &mut self,
        role: Role,
        substance: &Arc<Substance>,
        amount: f32,
    ) -> Result<(), LedgerError> {
        self.check_authority(role, "add_moles")?;
        validate_amount(amount)?;
        self.check_substance(substance)?;
        self.check_headroom(amount, amount * substance.molar_volume)?;
        self.deposit(substance, amount);
        self.commit();
        tracing::debug!(
            ledger = %self.id,
            substance = %substance.name,
            amount,
            total = self.total_moles(),
            "added moles"
        );
        Ok(())
    }

    /// Remove up to `amount` moles in total, proportionally across entries.
    ///
    /// Saturating: returns the amount actually removed, which is `amount`
    /// or everything the ledger held, whichever is smaller. Removing from an
    /// empty ledger returns zero and raises no notification.
    pub fn remove_moles(&mut self, role: Role, amount: f32) -> Result<f32, LedgerError> {
        self.check_authority(role, "remove_moles")?;
        validate_amount(amount)?;
        let removed = share_total(&self.withdraw(amount));
        if removed > 0.0 {
            self.commit();
            tracing::debug!(
                ledger = %self.id,
                requested = amount,
                removed,
                remaining = self.total_moles(),
                "removed moles"
            );
        }
        Ok(removed)
    }

    /// Register an observer. Notifications raised from now on queue up until drained.
    pub fn subscribe(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.mailboxes.insert(id, Vec::new());
        id
    }

    /// Drop a subscription and its pending notifications. Returns false if unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.mailboxes.remove(&id).is_some()
    }

    /// Take all pending notifications for a subscription, oldest first.
    pub fn drain_notifications(&mut self, id: SubscriptionId) -> Vec<ContentsChanged> {
        self.mailboxes
            .get_mut(&id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.mailboxes.len()
    }

    pub(crate) fn check_authority(&self, role: Role, operation: &str) -> Result<(), LedgerError> {
        if role.is_authoritative() {
            return Ok(());
        }
        tracing::warn!(
            ledger = %self.id,
            ?role,
            operation,
            "rejected non-authoritative ledger mutation"
        );
        Err(LedgerError::NotAuthoritative(self.id))
    }

    /// Reject a substance this ledger cannot hold: a non-positive molar volume,
    /// or an id already held under a different definition.
    pub(crate) fn check_substance(&self, substance: &Substance) -> Result<(), LedgerError> {
        let molar_volume = substance.molar_volume;
        if !(molar_volume.is_finite() && molar_volume > 0.0) {
            return Err(LedgerError::InvalidSubstance {
                id: substance.id,
                molar_volume,
            });
        }
        let conflict = self
            .entries
            .iter()
            .any(|e| e.substance.id == substance.id && *e.substance != *substance);
        if conflict {
            tracing::warn!(
                ledger = %self.id,
                substance = %substance.id,
                name = %substance.name,
                "rejected conflicting substance definition"
            );
            return Err(LedgerError::ConflictingSubstance {
                id: substance.id,
                ledger: self.id,
            });
        }
        Ok(())
    }

    /// Reject a deposit of up to `moles` (occupying up to `volume`) whose
    /// totals would no longer be finite.
    pub(crate) fn check_headroom(&self, moles: f32, volume: f32) -> Result<(), LedgerError> {
        let total = self.total_moles() + moles;
        let occupied = self.current_volume() + volume;
        if total.is_finite() && occupied.is_finite() {
            Ok(())
        } else {
            Err(LedgerError::InvalidAmount(moles))
        }
    }

    /// Merge moles into the entry for `substance`. Does not notify.
    ///
    /// Callers run `check_substance` and `check_headroom` first.
    pub(crate) fn deposit(&mut self, substance: &Arc<Substance>, amount: f32) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.substance.id == substance.id)
        {
            Some(entry) => entry.moles += amount,
            None => self.entries.push(SubstanceEntry {
                substance: Arc::clone(substance),
                moles: amount,
            }),
        }
    }

    /// Take up to `amount` moles proportionally. Does not notify.
    ///
    /// Returns the share taken from each entry. A request at or above the
    /// total drains every entry exactly, so saturation leaves no residue.
    pub(crate) fn withdraw(&mut self, amount: f32) -> Vec<(Arc<Substance>, f32)> {
        let total = self.total_moles();
        if total <= 0.0 {
            return Vec::new();
        }
        if amount >= total {
            return self
                .entries
                .drain(..)
                .map(|e| (e.substance, e.moles))
                .collect();
        }

        // fraction < 1, so no share can exceed its entry's holdings
        let fraction = amount / total;
        let mut shares: Vec<f32> = self.entries.iter().map(|e| e.moles * fraction).collect();
        trim_shares(&mut shares, amount);

        let mut taken = Vec::with_capacity(self.entries.len());
        for (entry, share) in self.entries.iter_mut().zip(shares) {
            if share > 0.0 {
                entry.moles -= share;
                taken.push((Arc::clone(&entry.substance), share));
            }
        }
        self.entries.retain(|e| e.moles > 0.0);
        taken
    }

    /// Bump the revision and queue one notification per subscriber.
    pub(crate) fn commit(&mut self) {
        self.revision += 1;
        let change = ContentsChanged {
            ledger: self.id,
            revision: self.revision,
        };
        for mailbox in self.mailboxes.values_mut() {
            mailbox.push(change);
        }
    }
}

/// Sum of withdrawn shares, in withdrawal order.
pub(crate) fn share_total(shares: &[(Arc<Substance>, f32)]) -> f32 {
    shares.iter().map(|(_, moles)| moles).sum()
}

/// Shave rounding excess off the largest share until the shares sum to at
/// most `amount`.
///
/// Each pass lowers the largest share by at least one ulp, and the sum is
/// monotone in every share, so the loop ends.
fn trim_shares(shares: &mut [f32], amount: f32) {
    loop {
        let sum: f32 = shares.iter().sum();
        if sum <= amount {
            return;
        }
        let Some(largest) = shares.iter_mut().max_by(|a, b| a.total_cmp(b)) else {
            return;
        };
        if *largest <= 0.0 {
            return;
        }
        let excess = (sum - amount).max(*largest * f32::EPSILON);
        *largest = (*largest - excess).max(0.0);
    }
}

pub(crate) fn validate_amount(amount: f32) -> Result<(), LedgerError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}
