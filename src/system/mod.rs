//! Control system facade.
//!
//! Owns the per-motor controllers and safety monitors, the coordinator,
//! and the scheduler task table, and wires them to the three hardware
//! collaborators. The two poll entry points are the periodic "interrupt
//! sources": callers invoke [`ControlSystem::poll_safety`] at the safety
//! rate and [`ControlSystem::poll_control`] at the control-loop rate; the
//! scheduler decides which tasks are due inside each.
//!
//! Construction validates the configuration and returns the live handle —
//! there is no partially-initialized state to guard against.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::config::units::{Degrees, DegreesPerSec, MotorId, MAX_MOTORS};
use crate::config::{validate_config, MotorConfig, SafetyConfig, SystemConfig};
use crate::control::{ControllerState, HomingMethod, HomingStep, MotorStatus, PositionController};
use crate::coordination::{
    CoordinatedMoveCommand, CoordinationAdjustment, CoordinationMode, CoordinationStatus,
    Coordinator, MotorLimitInfo, MotorSnapshot,
};
use crate::error::{
    ConfigError, ControlError, CoordinationError, Error, MotionError, Result, SafetyError,
};
use crate::hal::{
    Clock, Direction, FaultHandler, FaultKind, MotorDriver, PositionSensor, Severity, StopSource,
};
use crate::motion::{MotionLimits, ProfileKind, Trajectory};
use crate::safety::{
    PositionSafetyMonitor, SafetyAction, SafetyStatus, SafetyVerdict, TargetCheck, ViolationKind,
};
use crate::scheduler::{Priority, Scheduler, SchedulerStats, TaskConfig};

/// Tasks in the standard table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreTask {
    /// Per-motor position re-validation (Critical).
    SafetyMonitor,
    /// Per-motor closed-loop control (High).
    PositionControl,
    /// Multi-motor coordination (Normal).
    Coordination,
}

const TASK_TABLE_SIZE: usize = 8;

/// Multi-axis control system.
///
/// Generic over the sensor, driver, and fault-sink collaborators; time
/// enters through the [`Clock`] passed to the poll methods.
pub struct ControlSystem<S, D, F>
where
    S: PositionSensor,
    D: MotorDriver,
    F: FaultHandler,
{
    motor_count: usize,
    configs: Vec<MotorConfig, MAX_MOTORS>,
    controllers: Vec<PositionController, MAX_MOTORS>,
    monitors: Vec<PositionSafetyMonitor, MAX_MOTORS>,
    limit_info: Vec<MotorLimitInfo, MAX_MOTORS>,
    coordinator: Coordinator,
    scheduler: Scheduler<CoreTask, TASK_TABLE_SIZE>,

    sensor: S,
    driver: D,
    faults: F,

    emergency_stop: AtomicBool,
    max_missed_deadlines: u32,
    max_overruns: u32,
    health_fault_reported: bool,
}

impl<S, D, F> ControlSystem<S, D, F>
where
    S: PositionSensor,
    D: MotorDriver,
    F: FaultHandler,
{
    /// Build a system from a validated configuration.
    ///
    /// # Errors
    ///
    /// Any configuration validation failure, or `NoFreeSlots` if the
    /// standard task table cannot be registered.
    pub fn new(config: SystemConfig, sensor: S, driver: D, faults: F) -> Result<Self> {
        validate_config(&config)?;
        let motor_count = config.motor_count();

        let mut configs: Vec<MotorConfig, MAX_MOTORS> = Vec::new();
        let mut controllers: Vec<PositionController, MAX_MOTORS> = Vec::new();
        let mut monitors: Vec<PositionSafetyMonitor, MAX_MOTORS> = Vec::new();
        let mut limit_info: Vec<MotorLimitInfo, MAX_MOTORS> = Vec::new();

        for (_, motor) in config.motors.iter() {
            // Command targets are validated against the limits the monitor
            // will actually enforce.
            let (min, max) = if motor.safety.enforce_soft {
                (motor.safety.soft_min, motor.safety.soft_max)
            } else {
                (motor.safety.hard_min, motor.safety.hard_max)
            };
            let info = MotorLimitInfo {
                min,
                max,
                max_velocity: motor.limits.max_velocity,
                max_acceleration: motor.limits.max_acceleration,
            };

            let overflow = ConfigError::TooManyMotors(config.motor_count());
            controllers
                .push(PositionController::new(motor))
                .map_err(|_| Error::Config(overflow.clone()))?;
            monitors
                .push(PositionSafetyMonitor::new(motor.safety))
                .map_err(|_| Error::Config(overflow.clone()))?;
            limit_info
                .push(info)
                .map_err(|_| Error::Config(overflow.clone()))?;
            configs
                .push(motor.clone())
                .map_err(|_| Error::Config(overflow))?;
        }

        let sync_master = config
            .coordination
            .sync_master
            .as_ref()
            .and_then(|name| config.motor_index(name.as_str()))
            .and_then(|index| MotorId::new(index as u8, motor_count));
        let coordinator = Coordinator::new(&config.coordination, motor_count, sync_master);

        let scheduler_config = config.scheduler;
        let mut scheduler = Scheduler::new(
            scheduler_config.control_period_us,
            scheduler_config.safety_period_us,
        );
        scheduler.create_task(TaskConfig {
            name: "safety-monitor",
            kind: CoreTask::SafetyMonitor,
            priority: Priority::Critical,
            period_us: scheduler_config.safety_period_us,
            deadline_us: scheduler_config.safety_period_us * 2,
            enabled: true,
        })?;
        scheduler.create_task(TaskConfig {
            name: "position-control",
            kind: CoreTask::PositionControl,
            priority: Priority::High,
            period_us: scheduler_config.control_period_us,
            deadline_us: scheduler_config.control_period_us * 2,
            enabled: true,
        })?;
        scheduler.create_task(TaskConfig {
            name: "coordination",
            kind: CoreTask::Coordination,
            priority: Priority::Normal,
            period_us: scheduler_config.coordination_period_us,
            deadline_us: scheduler_config.coordination_period_us * 2,
            enabled: true,
        })?;

        Ok(Self {
            motor_count,
            configs,
            controllers,
            monitors,
            limit_info,
            coordinator,
            scheduler,
            sensor,
            driver,
            faults,
            emergency_stop: AtomicBool::new(false),
            max_missed_deadlines: scheduler_config.max_missed_deadlines,
            max_overruns: scheduler_config.max_overruns,
            health_fault_reported: false,
        })
    }

    /// Number of configured motors.
    #[inline]
    pub fn motor_count(&self) -> usize {
        self.motor_count
    }

    /// Resolve a raw index into a validated motor id.
    ///
    /// # Errors
    ///
    /// `InvalidMotor` for an index outside the configured table.
    pub fn motor_id(&self, index: u8) -> Result<MotorId> {
        MotorId::new(index, self.motor_count)
            .ok_or(Error::Coordination(CoordinationError::InvalidMotor(index)))
    }

    /// Resolve a configured motor name into its id.
    pub fn motor_id_by_name(&self, name: &str) -> Option<MotorId> {
        self.configs
            .iter()
            .position(|c| c.name.as_str() == name)
            .and_then(|index| MotorId::new(index as u8, self.motor_count))
    }

    /// Whether the emergency-stop latch is set.
    #[inline]
    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    /// Enable a motor's controller.
    ///
    /// Captures the current sensor position as target (zero initial error).
    ///
    /// # Errors
    ///
    /// `EmergencyStopActive` while latched, `EncoderFault` if the position
    /// cannot be read.
    pub fn enable_motor(&mut self, motor: MotorId) -> Result<()> {
        if self.is_emergency_stopped() {
            return Err(Error::Safety(SafetyError::EmergencyStopActive));
        }
        let position = match self.sensor.read_position(motor) {
            Ok(position) => position,
            Err(_) => {
                self.controllers[motor.index()].record_fault();
                self.faults.report_fault(motor, FaultKind::Encoder);
                return Err(Error::Control(ControlError::EncoderFault));
            }
        };
        self.controllers[motor.index()].enable(position);
        self.coordinator.set_motor_enabled(motor, true);
        Ok(())
    }

    /// Disable a motor's controller and decelerate it to a stop.
    ///
    /// # Errors
    ///
    /// `DriverFault` if the stop command fails.
    pub fn disable_motor(&mut self, motor: MotorId) -> Result<()> {
        self.controllers[motor.index()].disable();
        self.coordinator.set_motor_enabled(motor, false);
        self.driver
            .soft_stop(motor)
            .map_err(|_| Error::Control(ControlError::DriverFault))
    }

    /// Start a single-motor move.
    ///
    /// The target is validated against the enforced position limits, the
    /// kinematic limits against the motor's configured maxima; the
    /// trajectory starts immediately.
    ///
    /// # Errors
    ///
    /// `EmergencyStopActive`, `NotEnabled`, `PositionOutOfRange`,
    /// `VelocityOutOfRange`, or `AccelerationOutOfRange`.
    pub fn move_motor(
        &mut self,
        motor: MotorId,
        target: Degrees,
        limits: MotionLimits,
        profile: ProfileKind,
        now_us: u64,
    ) -> Result<()> {
        if self.is_emergency_stopped() {
            return Err(Error::Safety(SafetyError::EmergencyStopActive));
        }
        let controller = &mut self.controllers[motor.index()];
        if !controller.is_enabled() {
            return Err(Error::Control(ControlError::NotEnabled));
        }

        let info = &self.limit_info[motor.index()];
        if limits.max_velocity.0 > info.max_velocity.0 {
            return Err(Error::Motion(MotionError::VelocityOutOfRange {
                requested: limits.max_velocity.0,
                max: info.max_velocity.0,
            }));
        }
        if limits.acceleration.0 > info.max_acceleration.0
            || limits.deceleration.0 > info.max_acceleration.0
        {
            return Err(Error::Motion(MotionError::AccelerationOutOfRange {
                requested: limits.acceleration.0.max(limits.deceleration.0),
                max: info.max_acceleration.0,
            }));
        }
        let check = self.monitors[motor.index()].validate_target(target);
        let allowed = if self.monitors[motor.index()].config().enforce_soft {
            check.hard_ok && check.soft_ok
        } else {
            check.hard_ok
        };
        if !allowed {
            return Err(Error::Motion(MotionError::PositionOutOfRange {
                target: target.0,
                min: info.min.0,
                max: info.max.0,
            }));
        }

        let start = controller.current_position();
        let trajectory = match profile {
            ProfileKind::Trapezoidal => Trajectory::trapezoidal(start, target, &limits),
            ProfileKind::SCurve => {
                Trajectory::s_curve(start, target, &limits, self.configs[motor.index()].jerk_time)
            }
        };
        controller.start_trajectory(trajectory, now_us);
        Ok(())
    }

    /// Execute a coordinated move across all targeted motors.
    ///
    /// Trajectories are planned per the active coordination mode and all
    /// started with one shared timestamp.
    ///
    /// # Errors
    ///
    /// `EmergencyStopActive` plus everything
    /// [`Coordinator::plan_move`] reports.
    pub fn coordinated_move(
        &mut self,
        command: &CoordinatedMoveCommand,
        now_us: u64,
    ) -> Result<()> {
        if self.is_emergency_stopped() {
            return Err(Error::Safety(SafetyError::EmergencyStopActive));
        }

        let snapshots = snapshot_motors(&self.controllers);
        let plan =
            self.coordinator
                .plan_move(command, &snapshots, &self.limit_info, now_us)?;

        // One shared epoch for every participant.
        for (motor, trajectory) in plan.trajectories {
            let controller = &mut self.controllers[motor.index()];
            controller.attach_trajectory(trajectory);
            controller.begin_trajectory(now_us);
        }
        Ok(())
    }

    /// Active coordination mode.
    #[inline]
    pub fn coordination_mode(&self) -> CoordinationMode {
        self.coordinator.mode()
    }

    /// Switch coordination mode, stopping any active coordinated motion
    /// first.
    pub fn set_coordination_mode(&mut self, mode: CoordinationMode) {
        if self.coordinator.set_mode(mode) {
            for index in 0..self.motor_count {
                if let Some(motor) = MotorId::new(index as u8, self.motor_count) {
                    self.controllers[index].stop_trajectory();
                    if self.driver.soft_stop(motor).is_err() {
                        self.faults.report_fault(motor, FaultKind::Driver);
                    }
                }
            }
        }
    }

    /// Begin a homing sequence for one motor.
    ///
    /// # Errors
    ///
    /// `EmergencyStopActive`, `NotEnabled`, or `HomingActive`.
    pub fn home_motor(&mut self, motor: MotorId, method: HomingMethod) -> Result<()> {
        if self.is_emergency_stopped() {
            return Err(Error::Safety(SafetyError::EmergencyStopActive));
        }
        self.controllers[motor.index()]
            .start_homing(method)
            .map_err(Error::Control)
    }

    /// Trigger a system-wide emergency stop.
    ///
    /// Hard-stops every motor, disables every controller, abandons any
    /// coordinated move, and latches until
    /// [`clear_emergency_stop`](Self::clear_emergency_stop) plus per-motor
    /// re-enable.
    pub fn trigger_emergency_stop(&mut self, source: StopSource) {
        self.emergency_stop.store(true, Ordering::SeqCst);
        for index in 0..self.motor_count {
            if let Some(motor) = MotorId::new(index as u8, self.motor_count) {
                if self.driver.hard_stop(motor).is_err() {
                    self.faults.report_fault(motor, FaultKind::Driver);
                }
            }
            self.controllers[index].stop_trajectory();
            self.controllers[index].disable();
        }
        self.coordinator.stop();
        self.faults.emergency_stop(source);
    }

    /// Release the emergency-stop latch and clear latched safety faults.
    ///
    /// Motors stay disabled; each must be explicitly re-enabled.
    pub fn clear_emergency_stop(&mut self) {
        self.emergency_stop.store(false, Ordering::SeqCst);
        for monitor in self.monitors.iter_mut() {
            monitor.clear_fault();
        }
    }

    /// Run the safety tick source (Critical class).
    ///
    /// Re-validates every motor position independently of the control loop
    /// and checks scheduler health against the configured thresholds.
    pub fn poll_safety<C: Clock>(&mut self, clock: &mut C) {
        // Health is judged on the statistics accumulated so far; crossing
        // a threshold reports a system fault but does not stop motion.
        if !self.health_fault_reported
            && !self
                .scheduler
                .is_healthy(self.max_missed_deadlines, self.max_overruns)
        {
            self.faults
                .failsafe(FaultKind::SchedulerHealth, Severity::Critical);
            self.health_fault_reported = true;
        }

        let Self {
            scheduler,
            controllers,
            monitors,
            coordinator,
            sensor,
            driver,
            faults,
            emergency_stop,
            motor_count,
            ..
        } = self;

        scheduler.tick_safety(clock, |task, _dt, now| {
            if task != CoreTask::SafetyMonitor {
                return;
            }
            for index in 0..*motor_count {
                let motor = match MotorId::new(index as u8, *motor_count) {
                    Some(motor) => motor,
                    None => continue,
                };
                let verdict = match sensor.read_position(motor) {
                    Ok(position) => monitors[index].update(position, now),
                    Err(_) => {
                        controllers[index].record_fault();
                        faults.report_fault(motor, FaultKind::Encoder);
                        monitors[index].mark_encoder_fault(now)
                    }
                };
                apply_safety_verdict(
                    motor,
                    verdict,
                    controllers,
                    coordinator,
                    driver,
                    faults,
                    emergency_stop,
                );
            }
        });
    }

    /// Run the control tick source (High, Normal, and Low classes).
    ///
    /// Per-motor control runs before coordination so the coordinator reads
    /// just-updated state.
    pub fn poll_control<C: Clock>(&mut self, clock: &mut C) {
        let Self {
            scheduler,
            controllers,
            monitors,
            coordinator,
            sensor,
            driver,
            faults,
            emergency_stop,
            motor_count,
            ..
        } = self;

        scheduler.tick_control(clock, |task, dt, now| {
            if emergency_stop.load(Ordering::SeqCst) {
                // Latched: no motion commands are issued at all.
                return;
            }
            match task {
                CoreTask::PositionControl => {
                    for index in 0..*motor_count {
                        let motor = match MotorId::new(index as u8, *motor_count) {
                            Some(motor) => motor,
                            None => continue,
                        };
                        control_motor(
                            motor,
                            dt,
                            now,
                            &mut controllers[index],
                            sensor,
                            driver,
                            faults,
                        );
                    }
                }
                CoreTask::Coordination => {
                    let snapshots = snapshot_motors(controllers);
                    let adjustments = coordinator.update(dt, &snapshots);
                    for adjustment in adjustments {
                        match adjustment {
                            CoordinationAdjustment::SetTarget { motor, target } => {
                                // Coordination targets go through the same
                                // clamp as everything else.
                                let enforced = monitors[motor.index()].enforce_limits(target);
                                controllers[motor.index()].set_target(enforced.position);
                            }
                            CoordinationAdjustment::SyncFault { motor, .. } => {
                                faults.report_fault(motor, FaultKind::SyncSpread);
                            }
                        }
                    }
                }
                CoreTask::SafetyMonitor => {}
            }
        });
    }

    /// Pure pre-check of a target against one motor's limits.
    pub fn validate_target(&self, motor: MotorId, target: Degrees) -> TargetCheck {
        self.monitors[motor.index()].validate_target(target)
    }

    /// Clamp a requested target to one motor's enforced limits.
    ///
    /// # Errors
    ///
    /// `PositionLimitExceeded` when clamping changed the value. The clamped
    /// position carried in the error is still safe to command; callers treat
    /// the error as "the requested value was not honored", not as a hard
    /// failure.
    pub fn enforce_limits(&self, motor: MotorId, requested: Degrees) -> Result<Degrees> {
        let enforced = self.monitors[motor.index()].enforce_limits(requested);
        if enforced.limited {
            return Err(Error::Safety(SafetyError::PositionLimitExceeded {
                requested: requested.0,
                clamped: enforced.position.0,
            }));
        }
        Ok(enforced.position)
    }

    /// Per-motor controller status snapshot.
    pub fn motor_status(&self, motor: MotorId) -> MotorStatus {
        self.controllers[motor.index()].status()
    }

    /// Coordination status snapshot.
    pub fn coordination_status(&self) -> CoordinationStatus {
        self.coordinator.status()
    }

    /// Per-motor safety status snapshot.
    pub fn safety_status(&self, motor: MotorId) -> SafetyStatus {
        self.monitors[motor.index()].status()
    }

    /// Per-motor safety configuration copy.
    pub fn safety_config(&self, motor: MotorId) -> SafetyConfig {
        *self.monitors[motor.index()].config()
    }

    /// Scheduler statistics snapshot.
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}

/// Cache the per-motor state the coordinator consumes.
fn snapshot_motors(controllers: &[PositionController]) -> Vec<MotorSnapshot, MAX_MOTORS> {
    controllers
        .iter()
        .map(|controller| MotorSnapshot {
            enabled: controller.is_enabled(),
            position: controller.current_position(),
            settled: controller.is_settled(),
            profile_active: controller.has_active_trajectory(),
        })
        .collect()
}

fn violation_fault(violation: ViolationKind) -> FaultKind {
    match violation {
        ViolationKind::SoftMin | ViolationKind::SoftMax => FaultKind::SoftLimit,
        ViolationKind::HardMin | ViolationKind::HardMax => FaultKind::HardLimit,
        ViolationKind::Runaway => FaultKind::Runaway,
        ViolationKind::EncoderFault => FaultKind::Encoder,
    }
}

/// Execute a safety verdict: controlled stop for soft violations, full
/// emergency escalation for hard limits and runaway.
fn apply_safety_verdict<D, F>(
    motor: MotorId,
    verdict: SafetyVerdict,
    controllers: &mut [PositionController],
    coordinator: &mut Coordinator,
    driver: &mut D,
    faults: &mut F,
    emergency_stop: &AtomicBool,
) where
    D: MotorDriver,
    F: FaultHandler,
{
    let kind = match verdict.violation {
        Some(violation) => violation_fault(violation),
        None => return,
    };

    match verdict.action {
        SafetyAction::None => {}
        SafetyAction::ControlledStop => {
            faults.report_fault(motor, kind);
            controllers[motor.index()].stop_trajectory();
            if driver.soft_stop(motor).is_err() {
                // The controlled stop itself failed.
                faults.report_fault(motor, FaultKind::Driver);
                let _ = driver.hard_stop(motor);
            }
        }
        SafetyAction::EmergencyStop => {
            faults.report_fault(motor, kind);
            emergency_stop.store(true, Ordering::SeqCst);
            let count = controllers.len();
            for index in 0..count {
                if let Some(id) = MotorId::new(index as u8, count) {
                    let _ = driver.hard_stop(id);
                }
                controllers[index].stop_trajectory();
                controllers[index].disable();
            }
            coordinator.stop();
            faults.emergency_stop(StopSource::SafetyMonitor);
            faults.failsafe(kind, Severity::Critical);
        }
    }
}

// Keep the control task body out of the closure so the borrow story stays
// readable.
fn control_motor<S, D, F>(
    motor: MotorId,
    dt: f32,
    now: u64,
    controller: &mut PositionController,
    sensor: &mut S,
    driver: &mut D,
    faults: &mut F,
) where
    S: PositionSensor,
    D: MotorDriver,
    F: FaultHandler,
{
    if !controller.is_enabled() {
        return;
    }

    if controller.state() == ControllerState::Homing {
        let switch_active = match sensor.limit_switch(motor) {
            Ok(active) => active,
            Err(_) => {
                controller.record_fault();
                faults.report_fault(motor, FaultKind::Encoder);
                return;
            }
        };
        match controller.advance_homing(dt, switch_active) {
            Ok(Some(HomingStep::Run { direction, speed })) => {
                if driver.run(motor, direction, speed).is_err() {
                    controller.record_fault();
                    faults.report_fault(motor, FaultKind::Driver);
                }
            }
            Ok(Some(HomingStep::ResetToZero)) => {
                if driver.soft_stop(motor).is_err() || driver.reset_position(motor).is_err() {
                    controller.record_fault();
                    faults.report_fault(motor, FaultKind::Driver);
                }
            }
            Err(_) => {
                // HomingTimeout: stop the search and surface it as a fault.
                faults.report_fault(motor, FaultKind::Homing);
                let _ = driver.soft_stop(motor);
            }
            Ok(Some(HomingStep::TimedOut) | Some(HomingStep::Complete) | None) => {}
        }
        return;
    }

    let position = match sensor.read_position(motor) {
        Ok(position) => position,
        Err(_) => {
            // Surface the fault and suppress output for this cycle rather
            // than commanding from a stale value.
            controller.record_fault();
            faults.report_fault(motor, FaultKind::Encoder);
            return;
        }
    };

    match controller.update(position, dt, now) {
        Ok(output) => {
            let direction = Direction::from_delta(output.velocity_command.0);
            let speed = DegreesPerSec(output.velocity_command.abs());
            if driver.run(motor, direction, speed).is_err() {
                controller.record_fault();
                faults.report_fault(motor, FaultKind::Driver);
            }
        }
        Err(ControlError::PositionErrorExcessive { .. }) => {
            faults.report_fault(motor, FaultKind::TrackingError);
            controller.stop_trajectory();
            if driver.soft_stop(motor).is_err() {
                let _ = driver.hard_stop(motor);
            }
        }
        Err(_) => {}
    }
}
