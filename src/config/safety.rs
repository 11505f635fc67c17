//! Per-motor position safety configuration.

use serde::Deserialize;

use super::units::{Degrees, DegreesPerSec};

/// Safety limits and runaway thresholds for one motor.
///
/// Soft limits are advisory and individually toggleable via
/// [`enforce_soft`](SafetyConfig::enforce_soft); hard limits are always
/// enforced, whatever `enforce_hard` says.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SafetyConfig {
    /// Advisory minimum position.
    #[serde(rename = "soft_min_deg")]
    pub soft_min: Degrees,

    /// Advisory maximum position.
    #[serde(rename = "soft_max_deg")]
    pub soft_max: Degrees,

    /// Mechanical minimum position.
    #[serde(rename = "hard_min_deg")]
    pub hard_min: Degrees,

    /// Mechanical maximum position.
    #[serde(rename = "hard_max_deg")]
    pub hard_max: Degrees,

    /// Distance from a soft limit at which a warning is flagged.
    #[serde(default = "default_warning_margin", rename = "warning_margin_deg")]
    pub warning_margin: Degrees,

    /// Velocity magnitude above which a runaway is declared.
    #[serde(default = "default_max_velocity", rename = "max_velocity_deg_per_sec")]
    pub max_velocity: DegreesPerSec,

    /// Single-update position delta above which a runaway is declared.
    #[serde(default = "default_runaway_threshold", rename = "runaway_threshold_deg")]
    pub runaway_threshold: Degrees,

    /// Maximum interval between position updates before a runaway is
    /// declared, seconds.
    #[serde(default = "default_runaway_timeout", rename = "runaway_timeout_sec")]
    pub runaway_timeout: f32,

    /// Master enable for the monitor.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Enforce soft limits when clamping and checking.
    #[serde(default = "default_true")]
    pub enforce_soft: bool,

    /// Present for configuration compatibility; hard limits are checked
    /// regardless of this flag.
    #[serde(default = "default_true")]
    pub enforce_hard: bool,
}

fn default_warning_margin() -> Degrees {
    Degrees(5.0)
}

fn default_max_velocity() -> DegreesPerSec {
    DegreesPerSec(720.0)
}

fn default_runaway_threshold() -> Degrees {
    Degrees(20.0)
}

fn default_runaway_timeout() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

impl SafetyConfig {
    /// Check the limit ordering invariant
    /// `hard_min <= soft_min < soft_max <= hard_max`.
    pub fn is_valid(&self) -> bool {
        self.hard_min.0 <= self.soft_min.0
            && self.soft_min.0 < self.soft_max.0
            && self.soft_max.0 <= self.hard_max.0
    }

    /// Check if a position is inside the hard limits.
    #[inline]
    pub fn within_hard(&self, position: Degrees) -> bool {
        position.0 >= self.hard_min.0 && position.0 <= self.hard_max.0
    }

    /// Check if a position is inside the soft limits.
    #[inline]
    pub fn within_soft(&self, position: Degrees) -> bool {
        position.0 >= self.soft_min.0 && position.0 <= self.soft_max.0
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            soft_min: Degrees(-170.0),
            soft_max: Degrees(170.0),
            hard_min: Degrees(-180.0),
            hard_max: Degrees(180.0),
            warning_margin: Degrees(5.0),
            max_velocity: DegreesPerSec(720.0),
            runaway_threshold: Degrees(20.0),
            runaway_timeout: 0.5,
            enabled: true,
            enforce_soft: true,
            enforce_hard: true,
        }
    }
}
