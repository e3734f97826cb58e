use glam::Vec3;
use vessel_common::SpillConfig;

/// Errors from spill stepping.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpillError {
    #[error("invalid time step {0}: must be finite and non-negative")]
    InvalidTimeStep(f32),
}

/// Per-step container state the host samples from its physics/transform layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpillInput {
    /// Angle between the container's up axis and world up, in degrees.
    pub tilt_degrees: f32,
    pub lidded: bool,
    /// Container `relative_volume` at the time of sampling.
    pub relative_volume: f32,
}

/// What happened during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpillEvent {
    /// The container began pouring; start the display stream.
    Started,
    /// Emit one transfer particle. `rate` also drives the display stream speed.
    Emit { rate: f32 },
    /// The container stopped pouring.
    Stopped,
}

/// Angle in degrees between a container's up vector and world up.
pub fn tilt_degrees(container_up: Vec3) -> f32 {
    if container_up.length_squared() == 0.0 {
        return 0.0;
    }
    container_up.angle_between(Vec3::Y).to_degrees()
}

/// Fixed-step spill detector for one open container.
///
/// A container pours once it is tilted past `max_tilt * (1 - fill)`: full
/// containers spill almost immediately, nearly empty ones only when turned
/// over. While pouring it emits transfer particles at a cadence that speeds
/// up the further past the threshold it is tilted.
#[derive(Debug, Clone)]
pub struct SpillController {
    config: SpillConfig,
    clock: f32,
    next_emit: f32,
    spilling: bool,
    rate: f32,
}

impl SpillController {
    pub fn new(config: SpillConfig) -> Self {
        Self {
            config,
            clock: 0.0,
            next_emit: 0.0,
            spilling: false,
            rate: 0.0,
        }
    }

    pub fn is_spilling(&self) -> bool {
        self.spilling
    }

    /// Spill rate computed on the last pouring step.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Tilt beyond which a container at `relative_volume` pours.
    pub fn threshold_degrees(&self, relative_volume: f32) -> f32 {
        self.config.max_tilt_degrees * (1.0 - relative_volume)
    }

    /// Advance by `dt` seconds. At most one event is produced per step.
    pub fn step(&mut self, input: SpillInput, dt: f32) -> Result<Option<SpillEvent>, SpillError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SpillError::InvalidTimeStep(dt));
        }
        self.clock += dt;

        let threshold = self.threshold_degrees(input.relative_volume);
        let pouring =
            !input.lidded && input.relative_volume > 0.0 && input.tilt_degrees > threshold;

        if !pouring {
            if self.spilling {
                self.spilling = false;
                self.rate = 0.0;
                tracing::debug!(clock = self.clock, "spill stopped");
                return Ok(Some(SpillEvent::Stopped));
            }
            return Ok(None);
        }

        if !self.spilling {
            self.spilling = true;
            self.next_emit = self.clock + self.config.first_emit_delay;
            tracing::debug!(
                clock = self.clock,
                tilt = input.tilt_degrees,
                threshold,
                "spill started"
            );
            return Ok(Some(SpillEvent::Started));
        }

        self.rate = (input.tilt_degrees - threshold) * self.config.rate_scale;
        if self.clock > self.next_emit {
            let interval = (1.0 - self.rate * self.config.interval_scale)
                .max(self.config.min_emit_interval);
            self.next_emit = self.clock + interval;
            tracing::trace!(rate = self.rate, interval, "emitting transfer particle");
            return Ok(Some(SpillEvent::Emit { rate: self.rate }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tilted(tilt: f32, fill: f32) -> SpillInput {
        SpillInput {
            tilt_degrees: tilt,
            lidded: false,
            relative_volume: fill,
        }
    }

    #[test]
    fn tilt_of_axes() {
        assert!(tilt_degrees(Vec3::Y).abs() < 1e-4);
        assert!((tilt_degrees(Vec3::X) - 90.0).abs() < 1e-3);
        assert!((tilt_degrees(-Vec3::Y) - 180.0).abs() < 1e-3);
        assert_eq!(tilt_degrees(Vec3::ZERO), 0.0);
    }

    #[test]
    fn threshold_scales_with_fill() {
        let c = SpillController::new(SpillConfig::default());
        assert_eq!(c.threshold_degrees(0.0), 80.0);
        assert_eq!(c.threshold_degrees(0.5), 40.0);
        assert_eq!(c.threshold_degrees(1.0), 0.0);
    }

    #[test]
    fn upright_container_never_spills() {
        let mut c = SpillController::new(SpillConfig::default());
        for _ in 0..10 {
            assert_eq!(c.step(tilted(0.0, 0.9), 0.1).unwrap(), None);
        }
        assert!(!c.is_spilling());
    }

    #[test]
    fn lid_or_empty_prevents_spill() {
        let mut c = SpillController::new(SpillConfig::default());
        let mut lidded = tilted(170.0, 0.9);
        lidded.lidded = true;
        assert_eq!(c.step(lidded, 0.1).unwrap(), None);
        assert_eq!(c.step(tilted(170.0, 0.0), 0.1).unwrap(), None);
    }

    #[test]
    fn start_emit_stop_sequence() {
        let mut c = SpillController::new(SpillConfig::default());
        // half full, threshold 40 degrees
        assert_eq!(c.step(tilted(60.0, 0.5), 0.1).unwrap(), Some(SpillEvent::Started));
        assert!(c.is_spilling());

        match c.step(tilted(60.0, 0.5), 0.1).unwrap() {
            Some(SpillEvent::Emit { rate }) => assert!((rate - 0.2).abs() < 1e-5),
            other => panic!("expected emit, got {other:?}"),
        }
        assert_eq!(c.step(tilted(0.0, 0.5), 0.1).unwrap(), Some(SpillEvent::Stopped));
        assert!(!c.is_spilling());
        assert_eq!(c.step(tilted(0.0, 0.5), 0.1).unwrap(), None);
    }

    #[test]
    fn emission_interval_shrinks_with_rate() {
        let config = SpillConfig::default();
        // rate 0.1 -> interval 0.5s
        let mut slow = SpillController::new(config.clone());
        let mut slow_emits = 0;
        // rate 0.18 -> interval 0.1s
        let mut fast = SpillController::new(config);
        let mut fast_emits = 0;
        for _ in 0..100 {
            if let Some(SpillEvent::Emit { .. }) = slow.step(tilted(50.0, 0.5), 0.02).unwrap() {
                slow_emits += 1;
            }
            if let Some(SpillEvent::Emit { .. }) = fast.step(tilted(58.0, 0.5), 0.02).unwrap() {
                fast_emits += 1;
            }
        }
        assert!(fast_emits > slow_emits, "fast {fast_emits} vs slow {slow_emits}");
        assert!((4..=5).contains(&slow_emits), "slow emitted {slow_emits}");
    }

    #[test]
    fn interval_has_a_floor() {
        let config = SpillConfig::default();
        let floor = config.min_emit_interval;
        let mut c = SpillController::new(config);
        // rate 1.0 would give a negative interval without the floor
        c.step(tilted(140.0, 0.5), 0.01).unwrap();
        let mut emits = 0;
        for _ in 0..100 {
            if let Some(SpillEvent::Emit { .. }) = c.step(tilted(140.0, 0.5), 0.01).unwrap() {
                emits += 1;
            }
        }
        // one second of pouring at the floor interval, not one emit per step
        assert!(emits < 100);
        assert!(emits as f32 >= 1.0 / (floor + 0.01) - 1.0);
    }

    #[test]
    fn invalid_dt_rejected() {
        let mut c = SpillController::new(SpillConfig::default());
        assert_eq!(
            c.step(tilted(0.0, 0.5), -0.1).unwrap_err(),
            SpillError::InvalidTimeStep(-0.1)
        );
        assert!(c.step(tilted(0.0, 0.5), f32::NAN).is_err());
    }
}
