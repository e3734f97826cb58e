use vessel_common::DisplayConfig;

use crate::snapshot::DisplaySnapshot;
use crate::wire::{ContainerRef, DisplayUpdate, WireError, decode_update};

/// Client-side presentation state for one container.
///
/// Applies replicated snapshots as-is and never derives anything from
/// ledger contents. The only local behaviour is easing the displayed fill
/// level toward the replicated one, stepped by an injected `dt`.
#[derive(Debug, Clone)]
pub struct DisplayMirror {
    target: ContainerRef,
    config: DisplayConfig,
    applied: Option<DisplaySnapshot>,
    displayed_fill: f32,
}

impl DisplayMirror {
    pub fn new(target: ContainerRef, config: DisplayConfig) -> Self {
        Self {
            target,
            config,
            applied: None,
            displayed_fill: 0.0,
        }
    }

    pub fn target(&self) -> ContainerRef {
        self.target
    }

    /// Last applied snapshot.
    pub fn snapshot(&self) -> Option<&DisplaySnapshot> {
        self.applied.as_ref()
    }

    /// Apply an update. Returns false when it was for another container or
    /// older than what is already shown.
    ///
    /// Revisions only order snapshots of the same ledger. A snapshot from a
    /// different ledger means the container was recreated and always applies.
    pub fn apply(&mut self, update: &DisplayUpdate) -> bool {
        if update.target != self.target {
            return false;
        }
        if let Some(current) = &self.applied {
            if update.snapshot.ledger == current.ledger
                && update.snapshot.revision < current.revision
            {
                tracing::trace!(
                    target_ref = %self.target,
                    stale = update.snapshot.revision,
                    current = current.revision,
                    "ignoring stale display update"
                );
                return false;
            }
        }
        self.applied = Some(update.snapshot);
        true
    }

    /// Decode a wire frame and apply it.
    pub fn apply_frame(&mut self, frame: &[u8]) -> Result<bool, WireError> {
        let update = decode_update(frame)?;
        Ok(self.apply(&update))
    }

    /// Ease the displayed fill toward the replicated fill fraction.
    pub fn advance(&mut self, dt: f32) {
        let goal = self.applied.map_or(0.0, |s| s.fill_fraction);
        let t = (dt * self.config.fill_lerp_rate).clamp(0.0, 1.0);
        self.displayed_fill += (goal - self.displayed_fill) * t;
        if self.displayed_fill.is_nan() || self.displayed_fill < 0.0 {
            self.displayed_fill = 0.0;
        }
    }

    /// Fill level currently shown, before shader mapping.
    pub fn displayed_fill(&self) -> f32 {
        self.displayed_fill
    }

    /// Displayed fill mapped into the shader's `[min_fill, max_fill]` band.
    pub fn shader_fill(&self) -> f32 {
        let fill = self.displayed_fill.clamp(0.0, 1.0);
        fill * (self.config.max_fill - self.config.min_fill) + self.config.min_fill
    }
}
