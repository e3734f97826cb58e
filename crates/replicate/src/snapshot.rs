use glam::Vec3;
use serde::{Deserialize, Serialize};
use vessel_common::{DisplayConfig, LedgerId, Rgba};
use vessel_ledger::SubstanceLedger;

/// Where a container's liquid mesh sits when empty and when full.
///
/// The snapshot's position and scale are interpolated between the two ends
/// by the (clamped) fill fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayProfile {
    pub empty_position: Vec3,
    pub full_position: Vec3,
    pub empty_scale: Vec3,
    pub full_scale: Vec3,
}

impl Default for DisplayProfile {
    fn default() -> Self {
        Self {
            empty_position: Vec3::new(0.0, -0.5, 0.0),
            full_position: Vec3::ZERO,
            empty_scale: Vec3::new(1.0, 0.0, 1.0),
            full_scale: Vec3::ONE,
        }
    }
}

/// Derived, read-only summary of a ledger that observers apply verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    /// Ledger this snapshot was computed from. A container recreated under
    /// the same ref gets a new ledger, and its revisions count from zero again.
    pub ledger: LedgerId,
    /// Ledger revision this snapshot was computed from.
    pub revision: u64,
    pub tint: Rgba,
    pub top: Rgba,
    pub foam: Rgba,
    /// `current_volume / capacity`. Not clamped.
    pub fill_fraction: f32,
    pub position: Vec3,
    pub scale: Vec3,
}

impl DisplaySnapshot {
    /// Derive the snapshot for the ledger's current state.
    ///
    /// Pure: the same ledger state, profile and config always give a
    /// bit-identical snapshot.
    pub fn compute(
        ledger: &SubstanceLedger,
        profile: &DisplayProfile,
        config: &DisplayConfig,
    ) -> Self {
        let tint = mix_color(ledger);
        let fill_fraction = ledger.relative_volume().max(0.0);
        let t = fill_fraction.min(1.0);
        Self {
            ledger: ledger.id(),
            revision: ledger.revision(),
            tint,
            top: tint.desaturate(config.top_saturation),
            foam: tint.desaturate(config.foam_saturation),
            fill_fraction,
            position: profile.empty_position.lerp(profile.full_position, t),
            scale: profile.empty_scale.lerp(profile.full_scale, t),
        }
    }
}

/// Mole-weighted mix of substance colours, forced opaque.
///
/// An empty ledger mixes to opaque black.
pub fn mix_color(ledger: &SubstanceLedger) -> Rgba {
    let total = ledger.total_moles();
    if total <= 0.0 {
        return Rgba::BLACK;
    }
    ledger
        .entries()
        .iter()
        .fold(Rgba::TRANSPARENT, |acc, entry| {
            acc + entry.substance.color * (entry.moles / total)
        })
        .with_alpha(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vessel_common::Role;
    use vessel_ledger::{Substance, SubstanceId};

    fn substance(id: u32, color: Rgba) -> Arc<Substance> {
        Arc::new(Substance::new(SubstanceId(id), format!("s{id}"), color, 1.0))
    }

    #[test]
    fn empty_ledger_is_black_and_at_empty_pose() {
        let ledger = SubstanceLedger::new(10.0).unwrap();
        let profile = DisplayProfile::default();
        let snap = DisplaySnapshot::compute(&ledger, &profile, &DisplayConfig::default());
        assert_eq!(snap.tint, Rgba::BLACK);
        assert_eq!(snap.fill_fraction, 0.0);
        assert_eq!(snap.position, profile.empty_position);
        assert_eq!(snap.scale, profile.empty_scale);
    }

    #[test]
    fn tint_is_mole_weighted() {
        let red = substance(1, Rgba::new(1.0, 0.0, 0.0, 0.5));
        let blue = substance(2, Rgba::new(0.0, 0.0, 1.0, 0.5));
        let ledger = SubstanceLedger::with_contents(10.0, [(red, 1.0), (blue, 3.0)]).unwrap();
        let tint = mix_color(&ledger);
        assert!(tint.approx_eq(Rgba::new(0.25, 0.0, 0.75, 1.0), 1e-6));
    }

    #[test]
    fn top_and_foam_are_desaturated_tint() {
        let green = substance(1, Rgba::rgb(0.2, 0.8, 0.2));
        let ledger = SubstanceLedger::with_contents(10.0, [(green, 5.0)]).unwrap();
        let config = DisplayConfig::default();
        let snap = DisplaySnapshot::compute(&ledger, &DisplayProfile::default(), &config);

        let (_, s_tint, v_tint) = snap.tint.to_hsv();
        let (_, s_top, v_top) = snap.top.to_hsv();
        let (_, s_foam, _) = snap.foam.to_hsv();
        assert!((s_top - s_tint * config.top_saturation).abs() < 1e-4);
        assert!((s_foam - s_tint * config.foam_saturation).abs() < 1e-4);
        assert!((v_top - v_tint).abs() < 1e-4);
        assert_eq!(snap.top.a, 1.0);
    }

    #[test]
    fn pose_interpolates_with_fill() {
        let water = substance(1, Rgba::WHITE);
        let ledger = SubstanceLedger::with_contents(10.0, [(water, 5.0)]).unwrap();
        let profile = DisplayProfile {
            empty_position: Vec3::ZERO,
            full_position: Vec3::new(0.0, 2.0, 0.0),
            empty_scale: Vec3::ZERO,
            full_scale: Vec3::splat(4.0),
        };
        let snap = DisplaySnapshot::compute(&ledger, &profile, &DisplayConfig::default());
        assert_eq!(snap.fill_fraction, 0.5);
        assert_eq!(snap.position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(snap.scale, Vec3::splat(2.0));
    }

    #[test]
    fn overfill_reports_fraction_but_clamps_pose() {
        let water = substance(1, Rgba::WHITE);
        let ledger = SubstanceLedger::with_contents(10.0, [(water, 15.0)]).unwrap();
        let profile = DisplayProfile::default();
        let snap = DisplaySnapshot::compute(&ledger, &profile, &DisplayConfig::default());
        assert_eq!(snap.fill_fraction, 1.5);
        assert_eq!(snap.position, profile.full_position);
        assert_eq!(snap.scale, profile.full_scale);
    }

    #[test]
    fn compute_is_idempotent() {
        let a = substance(1, Rgba::rgb(0.3, 0.1, 0.7));
        let b = substance(2, Rgba::rgb(0.9, 0.9, 0.2));
        let ledger = SubstanceLedger::with_contents(7.0, [(a, 1.3), (b, 2.9)]).unwrap();
        let profile = DisplayProfile::default();
        let config = DisplayConfig::default();
        let first = DisplaySnapshot::compute(&ledger, &profile, &config);
        let second = DisplaySnapshot::compute(&ledger, &profile, &config);
        assert_eq!(first, second);
        assert_eq!(first.tint.r.to_bits(), second.tint.r.to_bits());
    }

    #[test]
    fn revision_tracks_ledger() {
        let water = substance(1, Rgba::WHITE);
        let mut ledger = SubstanceLedger::new(10.0).unwrap();
        ledger.add_moles(Role::Server, &water, 1.0).unwrap();
        let snap = DisplaySnapshot::compute(
            &ledger,
            &DisplayProfile::default(),
            &DisplayConfig::default(),
        );
        assert_eq!(snap.revision, 1);
    }
}
