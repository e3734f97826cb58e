use std::collections::{BTreeMap, BTreeSet};
use vessel_common::{DisplayConfig, LedgerId};
use vessel_ledger::{SubscriptionId, SubstanceLedger};

use crate::snapshot::{DisplayProfile, DisplaySnapshot};
use crate::wire::{ContainerRef, DisplayUpdate, encode_update};

/// Identifier of a remote observer (typically one client connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Outbound side of the network boundary. Sends are fire-and-forget.
pub trait DisplayTransport {
    fn send(&mut self, observer: ObserverId, update: &DisplayUpdate);
}

/// Errors from bridge operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge observes ledger {expected}, was handed {got}")]
    LedgerMismatch { expected: LedgerId, got: LedgerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Synced,
}

/// Pushes derived display state from one authoritative ledger to observers.
///
/// The bridge never replicates the ledger itself. It drains the ledger's
/// change notifications, computes one [`DisplaySnapshot`] per batch and
/// sends that same update to every connected observer.
#[derive(Debug)]
pub struct ReplicationBridge {
    target: ContainerRef,
    ledger: LedgerId,
    subscription: SubscriptionId,
    profile: DisplayProfile,
    config: DisplayConfig,
    observers: BTreeSet<ObserverId>,
    state: BridgeState,
    last: Option<DisplaySnapshot>,
}

impl ReplicationBridge {
    /// Attach to a ledger. Subscribes immediately; nothing is sent until
    /// [`initialize`](Self::initialize).
    pub fn new(
        target: ContainerRef,
        ledger: &mut SubstanceLedger,
        profile: DisplayProfile,
        config: DisplayConfig,
    ) -> Self {
        let subscription = ledger.subscribe();
        Self {
            target,
            ledger: ledger.id(),
            subscription,
            profile,
            config,
            observers: BTreeSet::new(),
            state: BridgeState::Uninitialized,
            last: None,
        }
    }

    pub fn target(&self) -> ContainerRef {
        self.target
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// The most recently pushed snapshot.
    pub fn last_snapshot(&self) -> Option<&DisplaySnapshot> {
        self.last.as_ref()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Compute the first snapshot and push it to every connected observer.
    pub fn initialize(
        &mut self,
        ledger: &mut SubstanceLedger,
        transport: &mut dyn DisplayTransport,
    ) -> Result<DisplaySnapshot, BridgeError> {
        self.check_ledger(ledger)?;
        // anything pending is covered by the full snapshot
        ledger.drain_notifications(self.subscription);
        let snapshot = self.broadcast(ledger, transport);
        self.state = BridgeState::Synced;
        tracing::debug!(target_ref = %self.target, revision = snapshot.revision, "bridge synced");
        Ok(snapshot)
    }

    /// Push one consolidated update if the ledger changed since the last push.
    ///
    /// Any number of pending notifications collapse into a single snapshot.
    /// An uninitialized bridge initializes instead.
    pub fn sync(
        &mut self,
        ledger: &mut SubstanceLedger,
        transport: &mut dyn DisplayTransport,
    ) -> Result<Option<DisplaySnapshot>, BridgeError> {
        self.check_ledger(ledger)?;
        if self.state == BridgeState::Uninitialized {
            return self.initialize(ledger, transport).map(Some);
        }
        let pending = ledger.drain_notifications(self.subscription);
        if pending.is_empty() {
            return Ok(None);
        }
        let _span = tracing::info_span!("bridge_sync", target_ref = %self.target).entered();
        let snapshot = self.broadcast(ledger, transport);
        tracing::trace!(
            batched = pending.len(),
            revision = snapshot.revision,
            observers = self.observers.len(),
            "pushed display update"
        );
        Ok(Some(snapshot))
    }

    /// Register an observer, or re-register one after a reconnect.
    ///
    /// A synced bridge sends the newcomer a fresh full snapshot right away;
    /// there is no incremental catch-up.
    pub fn connect_observer(
        &mut self,
        observer: ObserverId,
        ledger: &SubstanceLedger,
        transport: &mut dyn DisplayTransport,
    ) -> Result<(), BridgeError> {
        self.check_ledger(ledger)?;
        let reconnect = !self.observers.insert(observer);
        tracing::debug!(?observer, reconnect, target_ref = %self.target, "observer connected");
        if self.state == BridgeState::Synced {
            let update = DisplayUpdate {
                target: self.target,
                snapshot: DisplaySnapshot::compute(ledger, &self.profile, &self.config),
            };
            transport.send(observer, &update);
        }
        Ok(())
    }

    /// Returns false if the observer was not connected.
    pub fn disconnect_observer(&mut self, observer: ObserverId) -> bool {
        let removed = self.observers.remove(&observer);
        if removed {
            tracing::debug!(?observer, target_ref = %self.target, "observer disconnected");
        }
        removed
    }

    /// End the bridge's lifetime and drop its ledger subscription.
    pub fn detach(self, ledger: &mut SubstanceLedger) -> Result<(), BridgeError> {
        self.check_ledger(ledger)?;
        ledger.unsubscribe(self.subscription);
        Ok(())
    }

    fn broadcast(
        &mut self,
        ledger: &SubstanceLedger,
        transport: &mut dyn DisplayTransport,
    ) -> DisplaySnapshot {
        let snapshot = DisplaySnapshot::compute(ledger, &self.profile, &self.config);
        let update = DisplayUpdate {
            target: self.target,
            snapshot,
        };
        for observer in &self.observers {
            transport.send(*observer, &update);
        }
        self.last = Some(snapshot);
        snapshot
    }

    fn check_ledger(&self, ledger: &SubstanceLedger) -> Result<(), BridgeError> {
        if ledger.id() == self.ledger {
            Ok(())
        } else {
            Err(BridgeError::LedgerMismatch {
                expected: self.ledger,
                got: ledger.id(),
            })
        }
    }
}

/// In-process transport that encodes every update to its wire frame and
/// queues it per observer.
///
/// Stands in for a network socket in tests and the CLI. Frames that fail to
/// encode are dropped and counted, matching fire-and-forget delivery.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    outbox: BTreeMap<ObserverId, Vec<Vec<u8>>>,
    dropped: u64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every frame queued for an observer, oldest first.
    pub fn take(&mut self, observer: ObserverId) -> Vec<Vec<u8>> {
        self.outbox.remove(&observer).unwrap_or_default()
    }

    pub fn pending(&self, observer: ObserverId) -> usize {
        self.outbox.get(&observer).map_or(0, Vec::len)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl DisplayTransport for LoopbackTransport {
    fn send(&mut self, observer: ObserverId, update: &DisplayUpdate) {
        match encode_update(update) {
            Ok(frame) => self.outbox.entry(observer).or_default().push(frame),
            Err(err) => {
                self.dropped += 1;
                tracing::warn!(?observer, %err, "dropping display update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::DisplayMirror;
    use crate::wire::decode_update;
    use std::sync::Arc;
    use vessel_common::{Rgba, Role};
    use vessel_ledger::{Substance, SubstanceId, transfer};

    const TARGET: ContainerRef = ContainerRef::new(3, 0);

    fn water() -> Arc<Substance> {
        Arc::new(Substance::new(SubstanceId(1), "water", Rgba::rgb(0.1, 0.3, 0.9), 1.0))
    }

    fn bridge_for(ledger: &mut SubstanceLedger) -> ReplicationBridge {
        ReplicationBridge::new(TARGET, ledger, DisplayProfile::default(), DisplayConfig::default())
    }

    #[test]
    fn starts_uninitialized_and_sends_nothing() {
        let mut ledger = SubstanceLedger::with_contents(10.0, [(water(), 2.0)]).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        bridge
            .connect_observer(ObserverId(1), &ledger, &mut transport)
            .unwrap();
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
        assert_eq!(transport.pending(ObserverId(1)), 0);
    }

    #[test]
    fn initialize_pushes_once_to_each_observer() {
        let mut ledger = SubstanceLedger::with_contents(10.0, [(water(), 2.0)]).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        for id in 1..=3 {
            bridge
                .connect_observer(ObserverId(id), &ledger, &mut transport)
                .unwrap();
        }

        let snap = bridge.initialize(&mut ledger, &mut transport).unwrap();
        assert_eq!(bridge.state(), BridgeState::Synced);
        assert_eq!(snap.fill_fraction, 0.2);
        for id in 1..=3 {
            let frames = transport.take(ObserverId(id));
            assert_eq!(frames.len(), 1);
            let update = decode_update(&frames[0]).unwrap();
            assert_eq!(update.target, TARGET);
            assert_eq!(update.snapshot, snap);
        }
    }

    #[test]
    fn sync_without_changes_is_silent() {
        let mut ledger = SubstanceLedger::with_contents(10.0, [(water(), 2.0)]).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        bridge
            .connect_observer(ObserverId(1), &ledger, &mut transport)
            .unwrap();
        bridge.initialize(&mut ledger, &mut transport).unwrap();
        transport.take(ObserverId(1));

        assert!(bridge.sync(&mut ledger, &mut transport).unwrap().is_none());
        assert_eq!(transport.pending(ObserverId(1)), 0);
    }

    #[test]
    fn batch_of_changes_collapses_to_one_update() {
        let mut ledger = SubstanceLedger::with_contents(10.0, [(water(), 5.0)]).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        bridge
            .connect_observer(ObserverId(1), &ledger, &mut transport)
            .unwrap();
        bridge.initialize(&mut ledger, &mut transport).unwrap();
        transport.take(ObserverId(1));

        for _ in 0..4 {
            ledger.remove_moles(Role::Server, 0.5).unwrap();
        }
        let snap = bridge.sync(&mut ledger, &mut transport).unwrap().unwrap();
        assert_eq!(snap.revision, 4);
        assert!((snap.fill_fraction - 0.3).abs() < 1e-5);

        let frames = transport.take(ObserverId(1));
        assert_eq!(frames.len(), 1);
        assert_eq!(decode_update(&frames[0]).unwrap().snapshot, snap);
    }

    #[test]
    fn sync_on_uninitialized_bridge_initializes() {
        let mut ledger = SubstanceLedger::with_contents(10.0, [(water(), 1.0)]).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        let snap = bridge.sync(&mut ledger, &mut transport).unwrap();
        assert!(snap.is_some());
        assert_eq!(bridge.state(), BridgeState::Synced);
    }

    #[test]
    fn reconnect_gets_fresh_full_snapshot() {
        let mut ledger = SubstanceLedger::with_contents(10.0, [(water(), 5.0)]).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        let a = ObserverId(1);
        let b = ObserverId(2);
        bridge.connect_observer(a, &ledger, &mut transport).unwrap();
        bridge.connect_observer(b, &ledger, &mut transport).unwrap();
        bridge.initialize(&mut ledger, &mut transport).unwrap();
        transport.take(a);
        transport.take(b);

        // b drops; changes happen while it is away
        assert!(bridge.disconnect_observer(b));
        ledger.remove_moles(Role::Server, 2.0).unwrap();
        bridge.sync(&mut ledger, &mut transport).unwrap();
        assert_eq!(transport.pending(a), 1);
        assert_eq!(transport.pending(b), 0);

        bridge.connect_observer(b, &ledger, &mut transport).unwrap();
        let frames = transport.take(b);
        assert_eq!(frames.len(), 1);
        let update = decode_update(&frames[0]).unwrap();
        assert!((update.snapshot.fill_fraction - 0.3).abs() < 1e-5);
        // only the reconnecting observer is resynced
        assert_eq!(transport.pending(a), 1);
    }

    #[test]
    fn transfer_updates_both_bridges_once() {
        let mut src = SubstanceLedger::with_contents(10.0, [(water(), 6.0)]).unwrap();
        let mut dst = SubstanceLedger::new(10.0).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut src_bridge = bridge_for(&mut src);
        let mut dst_bridge = ReplicationBridge::new(
            ContainerRef::new(4, 0),
            &mut dst,
            DisplayProfile::default(),
            DisplayConfig::default(),
        );
        src_bridge.initialize(&mut src, &mut transport).unwrap();
        dst_bridge.initialize(&mut dst, &mut transport).unwrap();

        transfer(Role::Server, &mut src, &mut dst, 1.0).unwrap();
        let s = src_bridge.sync(&mut src, &mut transport).unwrap().unwrap();
        let d = dst_bridge.sync(&mut dst, &mut transport).unwrap().unwrap();
        assert!((s.fill_fraction - 0.5).abs() < 1e-5);
        assert!((d.fill_fraction - 0.1).abs() < 1e-5);
        assert_eq!(d.tint, s.tint);
    }

    #[test]
    fn container_recreated_under_same_ref_resyncs_observer() {
        let observer = ObserverId(1);
        let mut transport = LoopbackTransport::new();
        let mut mirror = DisplayMirror::new(TARGET, DisplayConfig::default());

        let mut old = SubstanceLedger::with_contents(10.0, [(water(), 2.0)]).unwrap();
        let mut bridge = bridge_for(&mut old);
        bridge.connect_observer(observer, &old, &mut transport).unwrap();
        bridge.initialize(&mut old, &mut transport).unwrap();
        for _ in 0..3 {
            old.add_moles(Role::Server, &water(), 0.5).unwrap();
        }
        bridge.sync(&mut old, &mut transport).unwrap();
        for frame in transport.take(observer) {
            assert!(mirror.apply_frame(&frame).unwrap());
        }
        assert_eq!(mirror.snapshot().unwrap().revision, 3);
        bridge.detach(&mut old).unwrap();

        let mut new = SubstanceLedger::with_contents(10.0, [(water(), 9.0)]).unwrap();
        let mut bridge = bridge_for(&mut new);
        bridge.connect_observer(observer, &new, &mut transport).unwrap();
        bridge.initialize(&mut new, &mut transport).unwrap();
        let frames = transport.take(observer);
        assert_eq!(frames.len(), 1);
        assert!(mirror.apply_frame(&frames[0]).unwrap());
        let shown = mirror.snapshot().unwrap();
        assert_eq!(shown.revision, 0);
        assert_eq!(shown.ledger, new.id());
        assert_eq!(shown.fill_fraction, 0.9);
    }

    #[test]
    fn wrong_ledger_rejected() {
        let mut ledger = SubstanceLedger::new(10.0).unwrap();
        let mut other = SubstanceLedger::new(10.0).unwrap();
        let mut transport = LoopbackTransport::new();
        let mut bridge = bridge_for(&mut ledger);
        assert!(matches!(
            bridge.initialize(&mut other, &mut transport),
            Err(BridgeError::LedgerMismatch { .. })
        ));
    }

    #[test]
    fn detach_unsubscribes() {
        let mut ledger = SubstanceLedger::new(10.0).unwrap();
        let bridge = bridge_for(&mut ledger);
        assert_eq!(ledger.subscriber_count(), 1);
        bridge.detach(&mut ledger).unwrap();
        assert_eq!(ledger.subscriber_count(), 0);
    }
}
