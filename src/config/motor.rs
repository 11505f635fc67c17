//! Per-motor control configuration from TOML.

use heapless::String;
use serde::Deserialize;

use super::units::{Degrees, DegreesPerSec, DegreesPerSecSquared};

/// Complete per-motor configuration from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    /// Human-readable name (max 32 chars).
    pub name: String<32>,

    /// Closed-loop gain set.
    #[serde(default)]
    pub gains: ControlGains,

    /// Control-loop limits.
    pub limits: ControlLimits,

    /// Exponential position filter coefficient in (0, 1].
    ///
    /// 1.0 disables filtering (the raw reading passes through).
    #[serde(default = "default_filter_coefficient")]
    pub filter_coefficient: f32,

    /// Position tolerance for the settled check.
    #[serde(default = "default_settle_position", rename = "settle_position_deg")]
    pub settle_position: Degrees,

    /// Velocity tolerance for the settled check.
    #[serde(default = "default_settle_velocity", rename = "settle_velocity_deg_per_sec")]
    pub settle_velocity: DegreesPerSec,

    /// Jerk ramp time for S-curve profiles, seconds.
    #[serde(default = "default_jerk_time", rename = "jerk_time_sec")]
    pub jerk_time: f32,

    /// Homing parameters.
    #[serde(default)]
    pub homing: HomingConfig,

    /// Position safety limits for this motor.
    #[serde(default)]
    pub safety: super::safety::SafetyConfig,
}

fn default_filter_coefficient() -> f32 {
    0.8
}

fn default_settle_position() -> Degrees {
    Degrees(0.5)
}

fn default_settle_velocity() -> DegreesPerSec {
    DegreesPerSec(1.0)
}

fn default_jerk_time() -> f32 {
    0.05
}

/// PID and feedforward gains for one motor.
///
/// A component is disabled by leaving its gain at zero.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ControlGains {
    /// Proportional gain.
    #[serde(default)]
    pub kp: f32,
    /// Integral gain (0 = disabled).
    #[serde(default)]
    pub ki: f32,
    /// Derivative gain (0 = disabled).
    #[serde(default)]
    pub kd: f32,
    /// Anti-windup clamp on the integral accumulator.
    #[serde(default = "default_integral_limit")]
    pub integral_limit: f32,
    /// Velocity feedforward gain (0 = disabled).
    #[serde(default)]
    pub kvff: f32,
    /// Acceleration feedforward gain (0 = disabled).
    #[serde(default)]
    pub kaff: f32,
    /// Static friction compensation, signed by target velocity (0 = disabled).
    #[serde(default)]
    pub friction: f32,
}

fn default_integral_limit() -> f32 {
    100.0
}

impl Default for ControlGains {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            integral_limit: 100.0,
            kvff: 0.0,
            kaff: 0.0,
            friction: 0.0,
        }
    }
}

/// Control-loop limits for one motor.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ControlLimits {
    /// Tracking error above which output is suppressed and a fault raised.
    #[serde(rename = "max_position_error_deg")]
    pub max_position_error: Degrees,

    /// Maximum commanded velocity.
    #[serde(rename = "max_velocity_deg_per_sec")]
    pub max_velocity: DegreesPerSec,

    /// Maximum commanded acceleration.
    #[serde(rename = "max_acceleration_deg_per_sec2")]
    pub max_acceleration: DegreesPerSecSquared,

    /// Saturation bound on the combined PID + feedforward output.
    #[serde(default = "default_output_limit", rename = "output_limit_deg_per_sec")]
    pub output_limit: DegreesPerSec,
}

fn default_output_limit() -> DegreesPerSec {
    DegreesPerSec(360.0)
}

/// Homing parameters for one motor.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HomingConfig {
    /// Search speed toward the limit switch.
    #[serde(default = "default_homing_speed", rename = "speed_deg_per_sec")]
    pub speed: DegreesPerSec,

    /// Back-off distance after the switch triggers.
    #[serde(default = "default_homing_backoff", rename = "backoff_deg")]
    pub backoff: Degrees,

    /// Limit-switch search timeout, seconds.
    #[serde(default = "default_homing_timeout", rename = "timeout_sec")]
    pub timeout: f32,

    /// Search direction: +1 toward the high limit, -1 toward the low limit.
    #[serde(default = "default_homing_direction")]
    pub search_direction: i8,
}

fn default_homing_speed() -> DegreesPerSec {
    DegreesPerSec(10.0)
}

fn default_homing_backoff() -> Degrees {
    Degrees(2.0)
}

fn default_homing_timeout() -> f32 {
    30.0
}

fn default_homing_direction() -> i8 {
    -1
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            speed: DegreesPerSec(10.0),
            backoff: Degrees(2.0),
            timeout: 30.0,
            search_direction: -1,
        }
    }
}
