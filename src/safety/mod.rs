//! Position safety monitoring.
//!
//! Per-motor bounds and runaway checking. The monitor is invoked on every
//! position update and consulted before every motion request; it decides
//! *what* must happen (controlled stop, emergency stop) and the system
//! facade executes the stop primitives and escalation.

use libm::fabsf;

use crate::config::units::{Degrees, DegreesPerSec};
use crate::config::SafetyConfig;

/// Kind of safety violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ViolationKind {
    /// Position below the soft minimum.
    SoftMin,
    /// Position above the soft maximum.
    SoftMax,
    /// Position below the hard minimum.
    HardMin,
    /// Position above the hard maximum.
    HardMax,
    /// Implausible motion or stale feedback.
    Runaway,
    /// Encoder reported a fault; position is untrusted.
    EncoderFault,
}

/// Stop action demanded by a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SafetyAction {
    /// No action required.
    None,
    /// Decelerate to a stop (falls back to hard stop on failure).
    ControlledStop,
    /// Immediate hard stop plus system-wide escalation.
    EmergencyStop,
}

/// Outcome of one safety check.
#[derive(Debug, Clone, Copy)]
pub struct SafetyVerdict {
    /// Required stop action.
    pub action: SafetyAction,
    /// Violation that triggered it, if any.
    pub violation: Option<ViolationKind>,
}

impl SafetyVerdict {
    const OK: Self = Self {
        action: SafetyAction::None,
        violation: None,
    };
}

/// Limit bound identifiers for [`PositionSafetyMonitor::validate_target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitKind {
    /// Soft minimum bound.
    SoftMin,
    /// Soft maximum bound.
    SoftMax,
    /// Hard minimum bound.
    HardMin,
    /// Hard maximum bound.
    HardMax,
}

/// Result of a pure target pre-check.
#[derive(Debug, Clone, Copy)]
pub struct TargetCheck {
    /// Target is inside the hard limits.
    pub hard_ok: bool,
    /// Target is inside the soft limits.
    pub soft_ok: bool,
    /// The bound closest to the target.
    pub nearest: LimitKind,
    /// Signed distance to that bound; positive means inside it.
    pub distance: f32,
}

/// Result of clamping a requested position.
#[derive(Debug, Clone, Copy)]
pub struct EnforcedTarget {
    /// The position after clamping.
    pub position: Degrees,
    /// True when clamping changed the value — the commanded value was not
    /// honored as requested.
    pub limited: bool,
}

/// Read-only safety status snapshot.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyStatus {
    /// Last observed position.
    pub current_position: Degrees,
    /// Position from the update before that.
    pub last_position: Degrees,
    /// Velocity estimated from consecutive updates.
    pub velocity: DegreesPerSec,
    /// Most recent violation, if any.
    pub violation: Option<ViolationKind>,
    /// Total violations observed.
    pub violation_count: u32,
    /// Soft/hard limit violations observed.
    pub limit_count: u32,
    /// Runaway condition is latched.
    pub runaway: bool,
    /// Position feedback is currently trusted.
    pub position_valid: bool,
    /// Position is within the warning margin of a soft limit.
    pub warning: bool,
    /// Timestamp of the most recent violation.
    pub last_violation_us: u64,
    /// Timestamp of the most recent update.
    pub last_update_us: u64,
}

/// Per-motor position safety monitor.
pub struct PositionSafetyMonitor {
    config: SafetyConfig,

    current_position: Degrees,
    last_position: Degrees,
    velocity: f32,
    violation: Option<ViolationKind>,
    violation_count: u32,
    limit_count: u32,
    runaway: bool,
    position_valid: bool,
    warning: bool,
    last_violation_us: u64,
    last_update_us: Option<u64>,
}

impl PositionSafetyMonitor {
    /// Create a monitor from configuration.
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            current_position: Degrees(0.0),
            last_position: Degrees(0.0),
            velocity: 0.0,
            violation: None,
            violation_count: 0,
            limit_count: 0,
            runaway: false,
            position_valid: true,
            warning: false,
            last_violation_us: 0,
            last_update_us: None,
        }
    }

    /// The active configuration.
    #[inline]
    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Check a position delta and interval for runaway conditions.
    ///
    /// True when the single-update delta exceeds the threshold, the implied
    /// velocity exceeds the velocity bound, or the update interval timed
    /// out.
    pub fn detect_runaway(&self, position: Degrees, dt: f32) -> bool {
        let delta = fabsf(position.0 - self.current_position.0);
        if delta > self.config.runaway_threshold.0 {
            return true;
        }
        if dt > self.config.runaway_timeout {
            return true;
        }
        if dt > 0.0 && delta / dt > self.config.max_velocity.0 {
            return true;
        }
        false
    }

    /// Process one position update.
    ///
    /// Runaway signals and hard limits map to an emergency stop, soft
    /// limits (when enforced) to a controlled stop. Hard limits are checked
    /// first — most severe wins.
    pub fn update(&mut self, position: Degrees, now_us: u64) -> SafetyVerdict {
        let dt = self
            .last_update_us
            .map(|t| now_us.saturating_sub(t) as f32 / 1_000_000.0);

        // Runaway needs history: the first update has no delta to judge.
        let runaway = match dt {
            Some(dt) if self.config.enabled => self.detect_runaway(position, dt),
            _ => false,
        };

        let previous = self.current_position;
        self.last_position = previous;
        self.current_position = position;
        if let Some(dt) = dt {
            if dt > 0.0 {
                self.velocity = (position.0 - previous.0) / dt;
            }
        }
        self.last_update_us = Some(now_us);

        self.warning = self.config.enforce_soft
            && (position.0 < self.config.soft_min.0 + self.config.warning_margin.0
                || position.0 > self.config.soft_max.0 - self.config.warning_margin.0);

        if !self.config.enabled {
            return SafetyVerdict::OK;
        }

        if runaway {
            self.runaway = true;
            return self.record(ViolationKind::Runaway, SafetyAction::EmergencyStop, now_us);
        }

        // Hard limits first (most severe), then soft limits if enforced.
        if position.0 < self.config.hard_min.0 {
            self.limit_count = self.limit_count.saturating_add(1);
            return self.record(ViolationKind::HardMin, SafetyAction::EmergencyStop, now_us);
        }
        if position.0 > self.config.hard_max.0 {
            self.limit_count = self.limit_count.saturating_add(1);
            return self.record(ViolationKind::HardMax, SafetyAction::EmergencyStop, now_us);
        }
        if self.config.enforce_soft {
            if position.0 < self.config.soft_min.0 {
                self.limit_count = self.limit_count.saturating_add(1);
                return self.record(ViolationKind::SoftMin, SafetyAction::ControlledStop, now_us);
            }
            if position.0 > self.config.soft_max.0 {
                self.limit_count = self.limit_count.saturating_add(1);
                return self.record(ViolationKind::SoftMax, SafetyAction::ControlledStop, now_us);
            }
        }

        self.violation = None;
        SafetyVerdict::OK
    }

    fn record(&mut self, kind: ViolationKind, action: SafetyAction, now_us: u64) -> SafetyVerdict {
        self.violation = Some(kind);
        self.violation_count = self.violation_count.saturating_add(1);
        self.last_violation_us = now_us;
        SafetyVerdict {
            action,
            violation: Some(kind),
        }
    }

    /// Mark the position feedback invalid after an encoder fault.
    ///
    /// The returned verdict demands a controlled stop; the position stays
    /// untrusted until [`clear_fault`](Self::clear_fault).
    pub fn mark_encoder_fault(&mut self, now_us: u64) -> SafetyVerdict {
        self.position_valid = false;
        self.record(ViolationKind::EncoderFault, SafetyAction::ControlledStop, now_us)
    }

    /// Clear latched runaway/encoder conditions and trust positions again.
    pub fn clear_fault(&mut self) {
        self.runaway = false;
        self.position_valid = true;
        self.violation = None;
    }

    /// Pure pre-check of a move target. Does not mutate state.
    pub fn validate_target(&self, target: Degrees) -> TargetCheck {
        let hard_ok = self.config.within_hard(target);
        let soft_ok = self.config.within_soft(target);

        // Signed distance to each bound, positive inside it.
        let bounds = [
            (LimitKind::SoftMin, target.0 - self.config.soft_min.0),
            (LimitKind::SoftMax, self.config.soft_max.0 - target.0),
            (LimitKind::HardMin, target.0 - self.config.hard_min.0),
            (LimitKind::HardMax, self.config.hard_max.0 - target.0),
        ];
        let (nearest, distance) = bounds
            .iter()
            .copied()
            .min_by(|a, b| {
                fabsf(a.1)
                    .partial_cmp(&fabsf(b.1))
                    .unwrap_or(core::cmp::Ordering::Equal)
            })
            .unwrap_or((LimitKind::HardMax, 0.0));

        TargetCheck {
            hard_ok,
            soft_ok,
            nearest,
            distance,
        }
    }

    /// Clamp a requested position to soft limits (if enforced), then always
    /// to hard limits. Idempotent.
    ///
    /// `limited` signals that the commanded value was not honored; callers
    /// treat it as an advisory, not a hard failure.
    pub fn enforce_limits(&self, requested: Degrees) -> EnforcedTarget {
        let mut position = requested.0;

        if self.config.enforce_soft {
            position = position.clamp(self.config.soft_min.0, self.config.soft_max.0);
        }
        // Hard limits apply regardless of configuration.
        position = position.clamp(self.config.hard_min.0, self.config.hard_max.0);

        EnforcedTarget {
            position: Degrees(position),
            limited: position != requested.0,
        }
    }

    /// Read-only status snapshot.
    pub fn status(&self) -> SafetyStatus {
        SafetyStatus {
            current_position: self.current_position,
            last_position: self.last_position,
            velocity: DegreesPerSec(self.velocity),
            violation: self.violation,
            violation_count: self.violation_count,
            limit_count: self.limit_count,
            runaway: self.runaway,
            position_valid: self.position_valid,
            warning: self.warning,
            last_violation_us: self.last_violation_us,
            last_update_us: self.last_update_us.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SafetyConfig {
        SafetyConfig {
            soft_min: Degrees(-170.0),
            soft_max: Degrees(170.0),
            hard_min: Degrees(-180.0),
            hard_max: Degrees(180.0),
            runaway_threshold: Degrees(20.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_in_range_update_is_ok() {
        let mut monitor = PositionSafetyMonitor::new(config());
        let verdict = monitor.update(Degrees(0.0), 1_000);
        assert_eq!(verdict.action, SafetyAction::None);
        assert!(verdict.violation.is_none());
    }

    #[test]
    fn test_runaway_jump_escalates_to_emergency_stop() {
        let mut monitor = PositionSafetyMonitor::new(config());
        monitor.update(Degrees(0.0), 1_000);
        assert!(monitor.detect_runaway(Degrees(50.0), 0.001));

        let verdict = monitor.update(Degrees(50.0), 2_000);
        assert_eq!(verdict.action, SafetyAction::EmergencyStop);
        assert_eq!(verdict.violation, Some(ViolationKind::Runaway));
        assert!(monitor.status().runaway);
    }

    #[test]
    fn test_first_update_never_runaway() {
        let mut monitor = PositionSafetyMonitor::new(config());
        // Huge first reading: no history, so only limit checks apply.
        let verdict = monitor.update(Degrees(100.0), 1_000);
        assert_eq!(verdict.action, SafetyAction::None);
    }

    #[test]
    fn test_update_interval_timeout_is_runaway() {
        let mut monitor = PositionSafetyMonitor::new(config());
        monitor.update(Degrees(0.0), 0);
        // 2 s gap against a 0.5 s timeout.
        let verdict = monitor.update(Degrees(0.5), 2_000_000);
        assert_eq!(verdict.violation, Some(ViolationKind::Runaway));
    }

    #[test]
    fn test_soft_limit_controlled_stop() {
        let mut monitor = PositionSafetyMonitor::new(config());
        monitor.update(Degrees(170.0), 1_000);
        let verdict = monitor.update(Degrees(172.0), 2_000);
        assert_eq!(verdict.action, SafetyAction::ControlledStop);
        assert_eq!(verdict.violation, Some(ViolationKind::SoftMax));
    }

    #[test]
    fn test_hard_limit_beats_soft_limit() {
        let mut monitor = PositionSafetyMonitor::new(config());
        monitor.update(Degrees(170.0), 1_000);
        // Small steps to stay under the runaway delta.
        monitor.update(Degrees(179.0), 2_000);
        let verdict = monitor.update(Degrees(181.0), 3_000);
        assert_eq!(verdict.action, SafetyAction::EmergencyStop);
        assert_eq!(verdict.violation, Some(ViolationKind::HardMax));
    }

    #[test]
    fn test_soft_limits_toggleable() {
        let mut monitor = PositionSafetyMonitor::new(SafetyConfig {
            enforce_soft: false,
            ..config()
        });
        monitor.update(Degrees(170.0), 1_000);
        let verdict = monitor.update(Degrees(175.0), 2_000);
        assert_eq!(verdict.action, SafetyAction::None);
    }

    #[test]
    fn test_enforce_limits_reference_scenario() {
        let monitor = PositionSafetyMonitor::new(config());

        // 175 with soft enforcement on clamps to 170.
        let enforced = monitor.enforce_limits(Degrees(175.0));
        assert_eq!(enforced.position.0, 170.0);
        assert!(enforced.limited);

        // 190 clamps to 180 regardless of soft enforcement.
        let monitor_no_soft = PositionSafetyMonitor::new(SafetyConfig {
            enforce_soft: false,
            ..config()
        });
        let enforced = monitor_no_soft.enforce_limits(Degrees(190.0));
        assert_eq!(enforced.position.0, 180.0);
        assert!(enforced.limited);
    }

    #[test]
    fn test_enforce_limits_idempotent() {
        let monitor = PositionSafetyMonitor::new(config());
        for requested in [-500.0, -170.5, 0.0, 169.9, 250.0] {
            let once = monitor.enforce_limits(Degrees(requested));
            let twice = monitor.enforce_limits(once.position);
            assert_eq!(once.position.0, twice.position.0);
            assert!(!twice.limited);
        }
    }

    #[test]
    fn test_validate_target_pure_check() {
        let monitor = PositionSafetyMonitor::new(config());

        let check = monitor.validate_target(Degrees(0.0));
        assert!(check.hard_ok);
        assert!(check.soft_ok);

        let check = monitor.validate_target(Degrees(175.0));
        assert!(check.hard_ok);
        assert!(!check.soft_ok);
        assert_eq!(check.nearest, LimitKind::HardMax);
        assert!((check.distance - 5.0).abs() < 1e-4);

        let check = monitor.validate_target(Degrees(169.0));
        assert_eq!(check.nearest, LimitKind::SoftMax);
        assert!((check.distance - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_encoder_fault_invalidates_position() {
        let mut monitor = PositionSafetyMonitor::new(config());
        let verdict = monitor.mark_encoder_fault(5_000);
        assert_eq!(verdict.action, SafetyAction::ControlledStop);
        assert!(!monitor.status().position_valid);

        monitor.clear_fault();
        assert!(monitor.status().position_valid);
        assert!(monitor.status().violation.is_none());
    }

    #[test]
    fn test_disabled_monitor_reports_nothing() {
        let mut monitor = PositionSafetyMonitor::new(SafetyConfig {
            enabled: false,
            ..config()
        });
        monitor.update(Degrees(0.0), 1_000);
        let verdict = monitor.update(Degrees(300.0), 2_000);
        assert_eq!(verdict.action, SafetyAction::None);
    }
}
