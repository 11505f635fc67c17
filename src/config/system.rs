//! System configuration - root configuration structure.

use heapless::{FnvIndexMap, String};
use serde::Deserialize;

use crate::coordination::CoordinationMode;

use super::motor::MotorConfig;
use super::units::Degrees;

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Named motor configurations. Motor ids are assigned in declaration
    /// order.
    pub motors: FnvIndexMap<String<32>, MotorConfig, 8>,

    /// Scheduler rates and health thresholds.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Multi-motor coordination parameters.
    #[serde(default)]
    pub coordination: CoordinationConfig,
}

impl SystemConfig {
    /// Get a motor configuration by name.
    pub fn motor(&self, name: &str) -> Option<&MotorConfig> {
        self.motors
            .iter()
            .find(|(k, _)| k.as_str() == name)
            .map(|(_, v)| v)
    }

    /// Get the declaration-order index of a motor by name.
    pub fn motor_index(&self, name: &str) -> Option<usize> {
        self.motors.iter().position(|(k, _)| k.as_str() == name)
    }

    /// List all motor names in declaration order.
    pub fn motor_names(&self) -> impl Iterator<Item = &str> {
        self.motors.keys().map(|s| s.as_str())
    }

    /// Number of configured motors.
    pub fn motor_count(&self) -> usize {
        self.motors.len()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            motors: FnvIndexMap::new(),
            scheduler: SchedulerConfig::default(),
            coordination: CoordinationConfig::default(),
        }
    }
}

/// Scheduler rates and health thresholds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SchedulerConfig {
    /// Control-loop tick period in microseconds (drives High/Normal/Low
    /// tasks).
    #[serde(default = "default_control_period")]
    pub control_period_us: u32,

    /// Safety tick period in microseconds (drives Critical tasks).
    #[serde(default = "default_safety_period")]
    pub safety_period_us: u32,

    /// Coordination task period in microseconds.
    #[serde(default = "default_coordination_period")]
    pub coordination_period_us: u32,

    /// Missed-deadline count at which the health check reports a fatal
    /// system fault.
    #[serde(default = "default_max_missed_deadlines")]
    pub max_missed_deadlines: u32,

    /// Overrun count at which the health check reports a fatal system fault.
    #[serde(default = "default_max_overruns")]
    pub max_overruns: u32,
}

fn default_control_period() -> u32 {
    1_000
}

fn default_safety_period() -> u32 {
    500
}

fn default_coordination_period() -> u32 {
    10_000
}

fn default_max_missed_deadlines() -> u32 {
    10
}

fn default_max_overruns() -> u32 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            control_period_us: 1_000,
            safety_period_us: 500,
            coordination_period_us: 10_000,
            max_missed_deadlines: 10,
            max_overruns: 5,
        }
    }
}

/// Multi-motor coordination parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinationConfig {
    /// Startup coordination mode.
    #[serde(default)]
    pub mode: CoordinationMode,

    /// Master motor name for Synchronized and MasterSlave modes.
    #[serde(default)]
    pub sync_master: Option<String<32>>,

    /// Allowed spread from the master before a synchronization fault.
    #[serde(default = "default_sync_tolerance", rename = "sync_tolerance_deg")]
    pub sync_tolerance: Degrees,

    /// Maximum time to wait for lagging motors, seconds.
    #[serde(default = "default_sync_max_wait", rename = "sync_max_wait_sec")]
    pub sync_max_wait: f32,

    /// Load-sharing deviation at which balancing engages.
    #[serde(default = "default_load_threshold", rename = "load_threshold_deg")]
    pub load_threshold: Degrees,

    /// Maximum tolerated deviation from the group average.
    #[serde(default = "default_max_load_difference", rename = "max_load_difference_deg")]
    pub max_load_difference: Degrees,
}

fn default_sync_tolerance() -> Degrees {
    Degrees(5.0)
}

fn default_sync_max_wait() -> f32 {
    2.0
}

fn default_load_threshold() -> Degrees {
    Degrees(1.0)
}

fn default_max_load_difference() -> Degrees {
    Degrees(10.0)
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            mode: CoordinationMode::Independent,
            sync_master: None,
            sync_tolerance: Degrees(5.0),
            sync_max_wait: 2.0,
            load_threshold: Degrees(1.0),
            max_load_difference: Degrees(10.0),
        }
    }
}
