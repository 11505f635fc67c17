//! Closed-loop position controller for one motor.
//!
//! Combines PID on measured-vs-target error with feedforward from the
//! active trajectory. All hardware I/O stays with the caller: the
//! controller consumes a measured position and returns the velocity
//! command to issue. Controller-local math is total; the fallible
//! operations (sensor read, driver write) live at the boundary.

use libm::fabsf;

use crate::config::units::{Degrees, DegreesPerSec};
use crate::config::MotorConfig;
use crate::error::ControlError;
use crate::motion::{MotionPhase, Trajectory};

use super::homing::{HomingMethod, HomingSequence, HomingStep};
use super::pid::{Feedforward, Pid};

/// Controller run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    /// Output off, no tracking.
    Disabled,
    /// Holding position, no trajectory.
    Enabled,
    /// Following an active trajectory.
    Tracking,
    /// Running a homing sequence.
    Homing,
}

/// Output of one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    /// Signed velocity command for the driver.
    pub velocity_command: DegreesPerSec,
    /// Both position and velocity are within their settle thresholds.
    pub settled: bool,
}

/// Read-only per-motor status snapshot.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorStatus {
    /// Controller is enabled.
    pub enabled: bool,
    /// Current run state.
    pub state: ControllerState,
    /// Filtered position.
    pub current_position: Degrees,
    /// Target position.
    pub target_position: Degrees,
    /// Target minus current.
    pub position_error: f32,
    /// Filtered velocity.
    pub velocity: DegreesPerSec,
    /// Motor has been homed.
    pub homed: bool,
    /// Settled at target.
    pub settled: bool,
    /// Accumulated sensor/driver/tracking faults.
    pub fault_count: u32,
    /// Timestamp of the last control update.
    pub last_update_us: u64,
}

/// Per-motor closed-loop position controller.
pub struct PositionController {
    limits_max_position_error: f32,
    output_limit: f32,
    filter_coefficient: f32,
    settle_position: f32,
    settle_velocity: f32,
    homing_config: crate::config::HomingConfig,

    state: ControllerState,
    pid: Pid,
    feedforward: Feedforward,

    target: Degrees,
    filtered_position: Degrees,
    velocity: f32,
    position_error: f32,
    settled: bool,
    homed: bool,
    fault_count: u32,
    last_update_us: u64,
    has_filter_history: bool,

    trajectory: Option<Trajectory>,
    homing: Option<HomingSequence>,
}

impl PositionController {
    /// Create a disabled controller from configuration.
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            limits_max_position_error: config.limits.max_position_error.0,
            output_limit: config.limits.output_limit.0,
            filter_coefficient: config.filter_coefficient,
            settle_position: config.settle_position.0,
            settle_velocity: config.settle_velocity.0,
            homing_config: config.homing,
            state: ControllerState::Disabled,
            pid: Pid::new(&config.gains),
            feedforward: Feedforward::new(&config.gains),
            target: Degrees(0.0),
            filtered_position: Degrees(0.0),
            velocity: 0.0,
            position_error: 0.0,
            settled: false,
            homed: false,
            fault_count: 0,
            last_update_us: 0,
            has_filter_history: false,
            trajectory: None,
            homing: None,
        }
    }

    /// Enable the controller.
    ///
    /// Captures the measured position as both current and target (zero
    /// initial error) and resets the integral accumulator.
    pub fn enable(&mut self, measured: Degrees) {
        self.filtered_position = measured;
        self.target = measured;
        self.position_error = 0.0;
        self.velocity = 0.0;
        self.has_filter_history = true;
        self.pid.reset();
        self.feedforward.reset();
        self.state = ControllerState::Enabled;
    }

    /// Disable the controller and drop any active trajectory or homing.
    pub fn disable(&mut self) {
        self.state = ControllerState::Disabled;
        self.trajectory = None;
        self.homing = None;
        self.settled = false;
    }

    /// Whether the controller is enabled (any state but `Disabled`).
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state != ControllerState::Disabled
    }

    /// Current run state.
    #[inline]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Whether the motor has been homed.
    #[inline]
    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Filtered position from the last update.
    #[inline]
    pub fn current_position(&self) -> Degrees {
        self.filtered_position
    }

    /// Current target.
    #[inline]
    pub fn target(&self) -> Degrees {
        self.target
    }

    /// Filtered velocity from the last update.
    #[inline]
    pub fn velocity(&self) -> DegreesPerSec {
        DegreesPerSec(self.velocity)
    }

    /// Settled at target as of the last update.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Overwrite the raw target (coordination nudges and follow targets).
    pub fn set_target(&mut self, target: Degrees) {
        self.target = target;
    }

    /// Attach a trajectory without starting its clock.
    ///
    /// Used for coordinated moves where every motor's profile must share
    /// one start timestamp; call [`begin_trajectory`](Self::begin_trajectory)
    /// afterwards.
    pub fn attach_trajectory(&mut self, trajectory: Trajectory) {
        self.trajectory = Some(trajectory);
    }

    /// Start the attached trajectory's clock.
    pub fn begin_trajectory(&mut self, now_us: u64) {
        if let Some(trajectory) = self.trajectory.as_mut() {
            trajectory.begin(now_us);
            self.state = ControllerState::Tracking;
        }
    }

    /// Attach and start a trajectory in one call (single-motor moves).
    pub fn start_trajectory(&mut self, trajectory: Trajectory, now_us: u64) {
        self.attach_trajectory(trajectory);
        self.begin_trajectory(now_us);
    }

    /// Whether a trajectory is attached and not yet complete.
    #[inline]
    pub fn has_active_trajectory(&self) -> bool {
        self.trajectory.is_some()
    }

    /// Drop the active trajectory and fall back to holding position.
    pub fn stop_trajectory(&mut self) {
        self.trajectory = None;
        self.homing = None;
        if self.state != ControllerState::Disabled {
            // Hold wherever we are instead of chasing a stale target.
            self.target = self.filtered_position;
            self.state = ControllerState::Enabled;
        }
    }

    /// Begin a homing sequence.
    ///
    /// # Errors
    ///
    /// `HomingActive` if a sequence is already running, `NotEnabled` if the
    /// controller is disabled.
    pub fn start_homing(&mut self, method: HomingMethod) -> Result<(), ControlError> {
        if self.state == ControllerState::Disabled {
            return Err(ControlError::NotEnabled);
        }
        if self.homing.is_some() {
            return Err(ControlError::HomingActive);
        }
        self.trajectory = None;
        self.homing = Some(HomingSequence::new(method, self.homing_config));
        self.state = ControllerState::Homing;
        Ok(())
    }

    /// Advance the active homing sequence one tick.
    ///
    /// Returns `Ok(None)` when no sequence is running.
    ///
    /// # Errors
    ///
    /// `HomingTimeout` when the limit switch was not found in time; the
    /// controller stays enabled but unhomed and the sequence is dropped.
    pub fn advance_homing(
        &mut self,
        dt: f32,
        switch_active: bool,
    ) -> Result<Option<HomingStep>, ControlError> {
        let sequence = match self.homing.as_mut() {
            Some(sequence) => sequence,
            None => return Ok(None),
        };
        let step = sequence.advance(dt, switch_active);
        match step {
            HomingStep::ResetToZero => {
                self.homing = None;
                self.homed = true;
                self.filtered_position = Degrees(0.0);
                self.target = Degrees(0.0);
                self.position_error = 0.0;
                self.pid.reset();
                self.state = ControllerState::Enabled;
            }
            HomingStep::TimedOut => {
                self.homing = None;
                self.state = ControllerState::Enabled;
                return Err(ControlError::HomingTimeout);
            }
            HomingStep::Run { .. } | HomingStep::Complete => {}
        }
        Ok(Some(step))
    }

    /// Record a sensor or driver fault for this cycle.
    ///
    /// The caller suppresses output for the cycle; the controller only
    /// keeps the count.
    pub fn record_fault(&mut self) {
        self.fault_count = self.fault_count.saturating_add(1);
    }

    /// One control tick.
    ///
    /// Filters the measurement, pulls the instantaneous trajectory target
    /// when one is active, and produces the saturated PID + feedforward
    /// velocity command.
    ///
    /// # Errors
    ///
    /// `NotEnabled` when disabled; `PositionErrorExcessive` when the error
    /// bound is exceeded — the motor must not be commanded this cycle.
    pub fn update(
        &mut self,
        measured: Degrees,
        dt: f32,
        now_us: u64,
    ) -> Result<ControlOutput, ControlError> {
        if self.state == ControllerState::Disabled {
            return Err(ControlError::NotEnabled);
        }

        // Exponential position filter.
        let previous = self.filtered_position.0;
        let filtered = if self.has_filter_history {
            previous + self.filter_coefficient * (measured.0 - previous)
        } else {
            self.has_filter_history = true;
            measured.0
        };
        self.filtered_position = Degrees(filtered);

        if dt > 0.0 {
            self.velocity = (filtered - previous) / dt;
        }
        self.last_update_us = now_us;

        // Trajectory target overrides the raw target while active.
        let mut target_velocity = 0.0;
        if let Some(trajectory) = self.trajectory.as_ref() {
            if let Some(elapsed) = trajectory.elapsed_secs(now_us) {
                let sample = trajectory.evaluate(elapsed);
                self.target = sample.position;
                target_velocity = sample.velocity.0;
                if sample.phase == MotionPhase::Complete {
                    self.trajectory = None;
                    self.state = ControllerState::Enabled;
                }
            }
        }

        self.position_error = self.target.0 - filtered;

        if fabsf(self.position_error) > self.limits_max_position_error {
            self.fault_count = self.fault_count.saturating_add(1);
            self.settled = false;
            return Err(ControlError::PositionErrorExcessive {
                error: self.position_error,
                max: self.limits_max_position_error,
            });
        }

        let pid_out = self.pid.update(self.position_error, dt);
        let ff_out = self.feedforward.update(target_velocity, dt);
        let output = (pid_out + ff_out).clamp(-self.output_limit, self.output_limit);

        self.settled = fabsf(self.position_error) <= self.settle_position
            && fabsf(self.velocity) <= self.settle_velocity;

        Ok(ControlOutput {
            velocity_command: DegreesPerSec(output),
            settled: self.settled,
        })
    }

    /// Read-only status snapshot.
    pub fn status(&self) -> MotorStatus {
        MotorStatus {
            enabled: self.is_enabled(),
            state: self.state,
            current_position: self.filtered_position,
            target_position: self.target,
            position_error: self.position_error,
            velocity: DegreesPerSec(self.velocity),
            homed: self.homed,
            settled: self.settled,
            fault_count: self.fault_count,
            last_update_us: self.last_update_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units::DegreesPerSecSquared;
    use crate::config::{ControlGains, ControlLimits, HomingConfig, MotorConfig, SafetyConfig};
    use crate::motion::MotionLimits;

    fn make_config(kp: f32) -> MotorConfig {
        MotorConfig {
            name: heapless::String::try_from("test").unwrap(),
            gains: ControlGains {
                kp,
                ki: 0.5,
                kd: 0.0,
                integral_limit: 50.0,
                kvff: 1.0,
                kaff: 0.0,
                friction: 0.0,
            },
            limits: ControlLimits {
                max_position_error: Degrees(15.0),
                max_velocity: DegreesPerSec(360.0),
                max_acceleration: DegreesPerSecSquared(720.0),
                output_limit: DegreesPerSec(100.0),
            },
            filter_coefficient: 1.0,
            settle_position: Degrees(0.5),
            settle_velocity: DegreesPerSec(1.0),
            jerk_time: 0.05,
            homing: HomingConfig::default(),
            safety: SafetyConfig::default(),
        }
    }

    #[test]
    fn test_disabled_controller_rejects_update() {
        let mut controller = PositionController::new(&make_config(1.0));
        assert_eq!(
            controller.update(Degrees(0.0), 0.001, 1_000),
            Err(ControlError::NotEnabled)
        );
    }

    #[test]
    fn test_enable_captures_position_with_zero_error() {
        let mut controller = PositionController::new(&make_config(2.0));
        controller.enable(Degrees(42.0));

        assert_eq!(controller.state(), ControllerState::Enabled);
        assert_eq!(controller.target().0, 42.0);

        let out = controller.update(Degrees(42.0), 0.001, 1_000).unwrap();
        assert!(out.velocity_command.abs() < 1e-6);
        assert!(out.settled);
    }

    #[test]
    fn test_proportional_response_toward_target() {
        let mut controller = PositionController::new(&make_config(2.0));
        controller.enable(Degrees(0.0));
        controller.set_target(Degrees(5.0));

        let out = controller.update(Degrees(0.0), 0.001, 1_000).unwrap();
        // kp * 5 = 10, plus a tick of integral
        assert!(out.velocity_command.0 > 9.0);
        assert!(!out.settled);
    }

    #[test]
    fn test_output_saturation() {
        let mut controller = PositionController::new(&make_config(1_000.0));
        controller.enable(Degrees(0.0));
        controller.set_target(Degrees(10.0));

        let out = controller.update(Degrees(0.0), 0.001, 1_000).unwrap();
        assert_eq!(out.velocity_command.0, 100.0);
    }

    #[test]
    fn test_excessive_error_suppresses_output() {
        let mut controller = PositionController::new(&make_config(1.0));
        controller.enable(Degrees(0.0));
        controller.set_target(Degrees(20.0));

        let result = controller.update(Degrees(0.0), 0.001, 1_000);
        assert!(matches!(
            result,
            Err(ControlError::PositionErrorExcessive { .. })
        ));
        assert_eq!(controller.status().fault_count, 1);
    }

    #[test]
    fn test_trajectory_drives_target() {
        let mut controller = PositionController::new(&make_config(2.0));
        controller.enable(Degrees(0.0));

        let trajectory = Trajectory::trapezoidal(
            Degrees(0.0),
            Degrees(90.0),
            &MotionLimits::symmetric(DegreesPerSec(180.0), DegreesPerSecSquared(360.0)),
        );
        controller.start_trajectory(trajectory, 0);
        assert_eq!(controller.state(), ControllerState::Tracking);

        // A tenth of a second in, the target must have moved off the start.
        controller.update(Degrees(0.0), 0.001, 100_000).unwrap();
        assert!(controller.target().0 > 0.0);
        assert!(controller.target().0 < 90.0);

        // Far past total time: trajectory completes and detaches.
        controller.update(Degrees(89.9), 0.001, 10_000_000).unwrap();
        assert_eq!(controller.target().0, 90.0);
        assert!(!controller.has_active_trajectory());
        assert_eq!(controller.state(), ControllerState::Enabled);
    }

    #[test]
    fn test_integral_reset_on_reenable() {
        let mut controller = PositionController::new(&make_config(0.0));
        controller.enable(Degrees(0.0));
        controller.set_target(Degrees(10.0));
        for _ in 0..100 {
            controller.update(Degrees(0.0), 0.01, 1_000).unwrap();
        }
        let wound_up = controller.update(Degrees(0.0), 0.01, 1_000).unwrap();
        assert!(wound_up.velocity_command.0 > 0.0);

        controller.disable();
        controller.enable(Degrees(0.0));
        let fresh = controller.update(Degrees(0.0), 0.01, 1_000).unwrap();
        // Integral was reset and target recaptured: no residual command.
        assert!(fresh.velocity_command.abs() < 0.1);
    }

    #[test]
    fn test_stop_trajectory_holds_current_position() {
        let mut controller = PositionController::new(&make_config(2.0));
        controller.enable(Degrees(0.0));
        let trajectory = Trajectory::trapezoidal(
            Degrees(0.0),
            Degrees(90.0),
            &MotionLimits::symmetric(DegreesPerSec(180.0), DegreesPerSecSquared(360.0)),
        );
        controller.start_trajectory(trajectory, 0);
        controller.update(Degrees(10.0), 0.001, 300_000).unwrap();

        controller.stop_trajectory();
        assert!(!controller.has_active_trajectory());
        assert_eq!(controller.state(), ControllerState::Enabled);
        assert_eq!(controller.target().0, controller.current_position().0);
    }

    #[test]
    fn test_homing_set_zero() {
        let mut controller = PositionController::new(&make_config(1.0));
        controller.enable(Degrees(37.0));
        controller.start_homing(HomingMethod::SetZero).unwrap();
        assert_eq!(controller.state(), ControllerState::Homing);

        let step = controller.advance_homing(0.001, false).unwrap();
        assert_eq!(step, Some(HomingStep::ResetToZero));
        assert!(controller.is_homed());
        assert_eq!(controller.current_position().0, 0.0);
        assert_eq!(controller.state(), ControllerState::Enabled);
    }

    #[test]
    fn test_homing_timeout_surfaces_error() {
        let mut controller = PositionController::new(&make_config(1.0));
        controller.enable(Degrees(0.0));
        controller.start_homing(HomingMethod::LimitSwitch).unwrap();

        // The switch never triggers; the 30 s default timeout elapses.
        let mut result = controller.advance_homing(1.0, false);
        for _ in 0..60 {
            result = controller.advance_homing(1.0, false);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(ControlError::HomingTimeout));
        assert!(!controller.is_homed());
        assert_eq!(controller.state(), ControllerState::Enabled);
        // The sequence is gone; further calls are a no-op.
        assert_eq!(controller.advance_homing(1.0, false), Ok(None));
    }

    #[test]
    fn test_homing_rejected_when_disabled_or_active() {
        let mut controller = PositionController::new(&make_config(1.0));
        assert_eq!(
            controller.start_homing(HomingMethod::SetZero),
            Err(ControlError::NotEnabled)
        );

        controller.enable(Degrees(0.0));
        controller.start_homing(HomingMethod::LimitSwitch).unwrap();
        assert_eq!(
            controller.start_homing(HomingMethod::SetZero),
            Err(ControlError::HomingActive)
        );
    }
}
