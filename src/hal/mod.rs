//! Hardware collaborator contracts.
//!
//! The core never touches hardware directly. It consumes three narrow
//! traits — a position sensor, a motor driver, and a fault/emergency-stop
//! sink — plus a monotonic clock. Implementations live outside the core
//! (firmware bindings, simulators, test doubles); a reference STEP/DIR
//! binding built on embedded-hal 1.0 is provided in [`stepdir`].

pub mod stepdir;

use crate::config::units::{Degrees, DegreesPerSec, MotorId};

/// Direction of motor motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Toward increasing position.
    Positive,
    /// Toward decreasing position.
    Negative,
}

impl Direction {
    /// Get direction from a signed displacement.
    #[inline]
    pub fn from_delta(delta: f32) -> Self {
        if delta >= 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }

    /// Get the sign multiplier.
    #[inline]
    pub fn sign(self) -> f32 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }
}

/// Fault categories reported against a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Encoder read failure.
    Encoder,
    /// Driver command failure.
    Driver,
    /// Tracking error beyond the configured bound.
    TrackingError,
    /// Soft position limit violated.
    SoftLimit,
    /// Hard position limit violated.
    HardLimit,
    /// Runaway motion detected.
    Runaway,
    /// Motors drifted apart beyond the synchronization tolerance.
    SyncSpread,
    /// Scheduler health thresholds crossed.
    SchedulerHealth,
    /// Homing failure.
    Homing,
}

/// Severity attached to a fail-safe escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    /// Informational; no action required.
    Warning,
    /// Degraded operation.
    Error,
    /// Motion must stop.
    Critical,
}

/// Originator of an emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopSource {
    /// Raised by the position safety monitor.
    SafetyMonitor,
    /// Raised by an external caller.
    External,
}

/// Position/velocity feedback source (magnetic encoder or equivalent).
pub trait PositionSensor {
    /// Implementation-specific error type.
    type Error;

    /// Read the absolute position of a motor in degrees.
    fn read_position(&mut self, motor: MotorId) -> Result<Degrees, Self::Error>;

    /// Read the velocity of a motor in degrees per second.
    fn read_velocity(&mut self, motor: MotorId) -> Result<DegreesPerSec, Self::Error>;

    /// Read the state of the motor's limit switch (true = triggered).
    fn limit_switch(&mut self, motor: MotorId) -> Result<bool, Self::Error>;
}

/// Stepper driver command sink.
///
/// Results are authoritative: a failure here is surfaced as a controller
/// fault, never retried inside the core.
pub trait MotorDriver {
    /// Implementation-specific error type.
    type Error;

    /// Command a move to an absolute position.
    fn move_to(&mut self, motor: MotorId, target: Degrees) -> Result<(), Self::Error>;

    /// Run at a constant speed in the given direction.
    fn run(
        &mut self,
        motor: MotorId,
        direction: Direction,
        speed: DegreesPerSec,
    ) -> Result<(), Self::Error>;

    /// Decelerate to a stop.
    fn soft_stop(&mut self, motor: MotorId) -> Result<(), Self::Error>;

    /// Stop immediately without deceleration.
    fn hard_stop(&mut self, motor: MotorId) -> Result<(), Self::Error>;

    /// Reset the driver's position register to zero.
    fn reset_position(&mut self, motor: MotorId) -> Result<(), Self::Error>;
}

/// Fault reporting and emergency-stop escalation sink.
pub trait FaultHandler {
    /// Record a fault against a motor.
    fn report_fault(&mut self, motor: MotorId, kind: FaultKind);

    /// Trigger a system-wide emergency stop.
    fn emergency_stop(&mut self, source: StopSource);

    /// Trigger the fail-safe subsystem.
    fn failsafe(&mut self, kind: FaultKind, severity: Severity);
}

/// Monotonic time source in microseconds.
///
/// The scheduler samples this at tick entry; it never sleeps on it.
pub trait Clock {
    /// Current monotonic time in microseconds.
    fn now_us(&mut self) -> u64;
}
