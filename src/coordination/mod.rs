//! Multi-motor coordination.
//!
//! Orchestrates N position controllers under a coordination mode. The
//! coordinator itself is I/O-free: [`Coordinator::plan_move`] validates a
//! command and returns the per-motor trajectories to start, and
//! [`Coordinator::update`] consumes cached per-motor snapshots and returns
//! target adjustments and sync-fault flags for the facade to apply. Each
//! motor's state is owned by its control task; the coordinator reads
//! snapshots and writes targets only.

use heapless::Vec;
use libm::fabsf;
use serde::Deserialize;

use crate::config::units::{Degrees, DegreesPerSec, DegreesPerSecSquared, MotorId, MAX_MOTORS};
use crate::config::CoordinationConfig;
use crate::error::{CoordinationError, Error, MotionError, Result};
use crate::motion::{synchronize, MotionLimits, Trajectory};

/// Policy governing how multiple motors' trajectories relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    /// Each motor runs its own trajectory unmodified.
    #[default]
    Independent,
    /// Trajectories are time-matched and spread against the master is
    /// watched.
    Synchronized,
    /// Displacement is split evenly; stragglers are nudged back to the
    /// group average.
    LoadSharing,
    /// Slaves follow the master's live position plus a fixed offset.
    MasterSlave,
}

/// One motor's slice of a coordinated move command.
#[derive(Debug, Clone, Copy)]
pub struct MotorTarget {
    /// Absolute target position.
    pub target: Degrees,
    /// Velocity limit for this move.
    pub max_velocity: DegreesPerSec,
    /// Acceleration for this move.
    pub acceleration: DegreesPerSecSquared,
    /// Deceleration for this move.
    pub deceleration: DegreesPerSecSquared,
    /// Whether this motor participates.
    pub enabled: bool,
}

/// A coordinated move: one optional target per motor slot plus a
/// wait-for-completion flag. Consumed atomically by
/// [`Coordinator::plan_move`].
#[derive(Debug, Clone)]
pub struct CoordinatedMoveCommand {
    targets: [Option<MotorTarget>; MAX_MOTORS],
    /// Report completion only after every participant settles.
    pub wait_for_completion: bool,
}

impl CoordinatedMoveCommand {
    /// Empty command.
    pub fn new(wait_for_completion: bool) -> Self {
        Self {
            targets: [None; MAX_MOTORS],
            wait_for_completion,
        }
    }

    /// Set one motor's target.
    pub fn set(&mut self, motor: MotorId, target: MotorTarget) {
        self.targets[motor.index()] = Some(target);
    }

    /// Get one motor's target.
    pub fn get(&self, motor: MotorId) -> Option<&MotorTarget> {
        self.targets[motor.index()].as_ref()
    }
}

/// Per-motor state cached from the control task, refreshed every
/// coordinator cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotorSnapshot {
    /// Controller is enabled.
    pub enabled: bool,
    /// Last filtered position.
    pub position: Degrees,
    /// Motor is settled at its target.
    pub settled: bool,
    /// A trajectory is attached and incomplete.
    pub profile_active: bool,
}

/// Static per-motor bounds used to validate command targets.
#[derive(Debug, Clone, Copy)]
pub struct MotorLimitInfo {
    /// Minimum allowed target.
    pub min: Degrees,
    /// Maximum allowed target.
    pub max: Degrees,
    /// Velocity ceiling.
    pub max_velocity: DegreesPerSec,
    /// Acceleration ceiling.
    pub max_acceleration: DegreesPerSecSquared,
}

/// Target adjustment or fault produced by a coordinator cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinationAdjustment {
    /// Overwrite the motor's raw target.
    SetTarget {
        /// Motor to adjust.
        motor: MotorId,
        /// New target.
        target: Degrees,
    },
    /// Spread from the master exceeded the tolerance (advisory).
    SyncFault {
        /// Offending motor.
        motor: MotorId,
        /// Observed spread in degrees.
        spread: f32,
    },
}

/// Trajectories to attach, produced by [`Coordinator::plan_move`].
///
/// The facade attaches each trajectory to its controller and starts them
/// all with one shared timestamp.
#[derive(Debug)]
pub struct MovePlan {
    /// Per-motor trajectories.
    pub trajectories: Vec<(MotorId, Trajectory), MAX_MOTORS>,
}

/// Per-motor coordination sub-state.
#[derive(Debug, Clone, Copy)]
struct MotorCoordState {
    enabled: bool,
    participating: bool,
    synchronized: bool,
    load_share: bool,
    priority: u8,
    position: Degrees,
    settled: bool,
    profile_active: bool,
    slave_offset: Degrees,
}

impl Default for MotorCoordState {
    fn default() -> Self {
        Self {
            enabled: false,
            participating: false,
            synchronized: true,
            load_share: false,
            priority: 0,
            position: Degrees(0.0),
            settled: false,
            profile_active: false,
            slave_offset: Degrees(0.0),
        }
    }
}

/// Per-motor coordination status entry.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorCoordStatus {
    /// Motor is enabled for coordination.
    pub enabled: bool,
    /// Motor is part of the active move.
    pub participating: bool,
    /// Within sync tolerance of the master.
    pub synchronized: bool,
    /// Load balancing is engaged for this motor.
    pub load_share: bool,
    /// Settled at its target.
    pub settled: bool,
    /// Coordination priority.
    pub priority: u8,
    /// Cached position.
    pub position: Degrees,
}

/// Read-only coordination status snapshot.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoordinationStatus {
    /// Active mode.
    pub mode: CoordinationMode,
    /// A coordinated move is running.
    pub active: bool,
    /// Sync master slot, if configured.
    pub sync_master: Option<u8>,
    /// Largest spread from the master observed during the current move.
    pub max_sync_error: f32,
    /// Start timestamp of the current/last coordinated move.
    pub move_start_us: u64,
    /// Per-motor entries; only the first `motor_count` are meaningful.
    pub motors: [MotorCoordStatus; MAX_MOTORS],
    /// Number of configured motors.
    pub motor_count: u8,
}

/// Multi-motor coordinator.
pub struct Coordinator {
    mode: CoordinationMode,
    motor_count: usize,
    motors: [MotorCoordState; MAX_MOTORS],

    sync_master: Option<MotorId>,
    sync_tolerance: f32,
    sync_max_wait: f32,
    load_threshold: f32,
    max_load_difference: f32,

    active: bool,
    start_us: u64,
    settle_wait: f32,
    max_sync_error: f32,
}

impl Coordinator {
    /// Create a coordinator from configuration.
    ///
    /// `sync_master` is the resolved id of the configured master motor, if
    /// any.
    pub fn new(config: &CoordinationConfig, motor_count: usize, sync_master: Option<MotorId>) -> Self {
        Self {
            mode: config.mode,
            motor_count,
            motors: [MotorCoordState::default(); MAX_MOTORS],
            sync_master,
            sync_tolerance: config.sync_tolerance.0,
            sync_max_wait: config.sync_max_wait,
            load_threshold: config.load_threshold.0,
            max_load_difference: config.max_load_difference.0,
            active: false,
            start_us: 0,
            settle_wait: 0.0,
            max_sync_error: 0.0,
        }
    }

    /// Active coordination mode.
    #[inline]
    pub fn mode(&self) -> CoordinationMode {
        self.mode
    }

    /// Whether a coordinated move is running.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Switch mode.
    ///
    /// Returns `true` when a coordinated move was active; the caller must
    /// stop the participating motors — the coordinator has already
    /// abandoned the move.
    pub fn set_mode(&mut self, mode: CoordinationMode) -> bool {
        let was_active = self.active;
        self.mode = mode;
        self.active = false;
        self.settle_wait = 0.0;
        self.max_sync_error = 0.0;
        for motor in self.motors.iter_mut() {
            motor.participating = false;
            motor.load_share = false;
        }
        was_active
    }

    /// Enable or disable a motor for coordination.
    pub fn set_motor_enabled(&mut self, motor: MotorId, enabled: bool) {
        self.motors[motor.index()].enabled = enabled;
    }

    /// Set a motor's coordination priority (status/reporting only).
    pub fn set_motor_priority(&mut self, motor: MotorId, priority: u8) {
        self.motors[motor.index()].priority = priority;
    }

    /// Abandon the active move, if any.
    pub fn stop(&mut self) {
        self.active = false;
        self.settle_wait = 0.0;
        for motor in self.motors.iter_mut() {
            motor.participating = false;
            motor.load_share = false;
        }
    }

    /// Validate a command and produce the per-motor trajectory plan.
    ///
    /// Marks motion active on success; at most one coordinated move exists
    /// system-wide at a time.
    ///
    /// # Errors
    ///
    /// `MotionActive` when a move is already running, `NoMotorsEnabled`
    /// when no enabled motor is targeted, `PositionOutOfRange` /
    /// `VelocityOutOfRange` / `AccelerationOutOfRange` on bad per-motor
    /// targets.
    pub fn plan_move(
        &mut self,
        command: &CoordinatedMoveCommand,
        snapshots: &[MotorSnapshot],
        limits: &[MotorLimitInfo],
        now_us: u64,
    ) -> Result<MovePlan> {
        if self.active {
            return Err(Error::Coordination(CoordinationError::MotionActive));
        }

        // Collect participants: targeted, command-enabled, motor enabled.
        let mut participants: Vec<(MotorId, MotorTarget), MAX_MOTORS> = Vec::new();
        for index in 0..self.motor_count {
            let motor = match MotorId::new(index as u8, self.motor_count) {
                Some(id) => id,
                None => continue,
            };
            if let Some(target) = command.get(motor) {
                if target.enabled && snapshots[index].enabled {
                    let _ = participants.push((motor, *target));
                }
            }
        }
        if participants.is_empty() {
            return Err(Error::Coordination(CoordinationError::NoMotorsEnabled));
        }

        // Per-motor parameter validation before any state change.
        for (motor, target) in participants.iter() {
            let info = &limits[motor.index()];
            if target.target.0 < info.min.0 || target.target.0 > info.max.0 {
                return Err(Error::Motion(MotionError::PositionOutOfRange {
                    target: target.target.0,
                    min: info.min.0,
                    max: info.max.0,
                }));
            }
            if target.max_velocity.0 > info.max_velocity.0 {
                return Err(Error::Motion(MotionError::VelocityOutOfRange {
                    requested: target.max_velocity.0,
                    max: info.max_velocity.0,
                }));
            }
            if target.acceleration.0 > info.max_acceleration.0
                || target.deceleration.0 > info.max_acceleration.0
            {
                let requested = target.acceleration.0.max(target.deceleration.0);
                return Err(Error::Motion(MotionError::AccelerationOutOfRange {
                    requested,
                    max: info.max_acceleration.0,
                }));
            }
        }

        let plan = match self.mode {
            CoordinationMode::Independent => self.plan_independent(&participants, snapshots),
            CoordinationMode::Synchronized => self.plan_synchronized(&participants, snapshots),
            CoordinationMode::LoadSharing => self.plan_load_sharing(&participants, snapshots),
            CoordinationMode::MasterSlave => self.plan_master_slave(&participants, snapshots),
        };

        for (motor, _) in participants.iter() {
            let state = &mut self.motors[motor.index()];
            state.participating = true;
            state.settled = false;
        }
        self.active = true;
        self.start_us = now_us;
        self.settle_wait = 0.0;
        self.max_sync_error = 0.0;

        Ok(plan)
    }

    fn plan_independent(
        &mut self,
        participants: &[(MotorId, MotorTarget)],
        snapshots: &[MotorSnapshot],
    ) -> MovePlan {
        let mut trajectories = Vec::new();
        for (motor, target) in participants.iter() {
            let start = snapshots[motor.index()].position;
            let _ = trajectories.push((*motor, Self::trajectory_for(start, target)));
        }
        MovePlan { trajectories }
    }

    fn plan_synchronized(
        &mut self,
        participants: &[(MotorId, MotorTarget)],
        snapshots: &[MotorSnapshot],
    ) -> MovePlan {
        let mut plan = self.plan_independent(participants, snapshots);

        let mut profiles: Vec<Trajectory, MAX_MOTORS> = plan
            .trajectories
            .iter()
            .map(|(_, trajectory)| trajectory.clone())
            .collect();
        synchronize(&mut profiles);
        for ((_, slot), rescaled) in plan.trajectories.iter_mut().zip(profiles) {
            *slot = rescaled;
        }

        for (motor, _) in participants.iter() {
            self.motors[motor.index()].synchronized = true;
        }
        plan
    }

    /// The commanded displacement is read from the first participant and
    /// split evenly; every motor then covers its own share.
    fn plan_load_sharing(
        &mut self,
        participants: &[(MotorId, MotorTarget)],
        snapshots: &[MotorSnapshot],
    ) -> MovePlan {
        let share = {
            let (first, target) = &participants[0];
            let displacement = target.target.0 - snapshots[first.index()].position.0;
            displacement / participants.len() as f32
        };

        let mut trajectories = Vec::new();
        for (motor, target) in participants.iter() {
            let start = snapshots[motor.index()].position;
            let shared_target = MotorTarget {
                target: Degrees(start.0 + share),
                ..*target
            };
            let _ = trajectories.push((*motor, Self::trajectory_for(start, &shared_target)));
        }
        MovePlan { trajectories }
    }

    /// The master runs its own trajectory; slaves capture their offset from
    /// the master here and follow its live position in `update`.
    fn plan_master_slave(
        &mut self,
        participants: &[(MotorId, MotorTarget)],
        snapshots: &[MotorSnapshot],
    ) -> MovePlan {
        let master = self
            .sync_master
            .filter(|m| participants.iter().any(|(id, _)| id == m))
            .unwrap_or(participants[0].0);
        let master_position = snapshots[master.index()].position;

        let mut trajectories = Vec::new();
        for (motor, target) in participants.iter() {
            if *motor == master {
                let _ = trajectories.push((
                    *motor,
                    Self::trajectory_for(master_position, target),
                ));
            } else {
                let state = &mut self.motors[motor.index()];
                state.slave_offset =
                    Degrees(snapshots[motor.index()].position.0 - master_position.0);
            }
        }
        MovePlan { trajectories }
    }

    fn trajectory_for(start: Degrees, target: &MotorTarget) -> Trajectory {
        let limits = MotionLimits {
            max_velocity: target.max_velocity,
            acceleration: target.acceleration,
            deceleration: target.deceleration,
        };
        Trajectory::trapezoidal(start, target.target, &limits)
    }

    /// One coordinator cycle.
    ///
    /// Refreshes the cached per-motor state, applies the mode-specific
    /// follow/balancing logic, and clears the active flag once every
    /// participant is settled with no active profile. Once all profiles
    /// have finished, stragglers are given `sync_max_wait` seconds to
    /// settle before the move is declared over anyway.
    pub fn update(
        &mut self,
        dt: f32,
        snapshots: &[MotorSnapshot],
    ) -> Vec<CoordinationAdjustment, { 2 * MAX_MOTORS }> {
        let mut adjustments = Vec::new();

        for index in 0..self.motor_count.min(snapshots.len()) {
            let state = &mut self.motors[index];
            state.position = snapshots[index].position;
            state.settled = snapshots[index].settled;
            state.profile_active = snapshots[index].profile_active;
            state.enabled = snapshots[index].enabled;
        }

        if self.active {
            match self.mode {
                CoordinationMode::Independent => {}
                CoordinationMode::Synchronized => self.update_synchronized(&mut adjustments),
                CoordinationMode::LoadSharing => self.update_load_sharing(&mut adjustments),
                CoordinationMode::MasterSlave => self.update_master_slave(&mut adjustments),
            }

            let mut participants = self
                .motors
                .iter()
                .take(self.motor_count)
                .filter(|m| m.participating);
            let profiles_done = participants.clone().all(|m| !m.profile_active);
            let all_settled = participants.all(|m| m.settled);

            if profiles_done {
                self.settle_wait += dt;
            } else {
                self.settle_wait = 0.0;
            }

            if (profiles_done && all_settled)
                || (profiles_done && self.settle_wait > self.sync_max_wait)
            {
                self.active = false;
                self.settle_wait = 0.0;
                for motor in self.motors.iter_mut() {
                    motor.participating = false;
                    motor.load_share = false;
                }
            }
        }

        adjustments
    }

    fn update_synchronized(
        &mut self,
        adjustments: &mut Vec<CoordinationAdjustment, { 2 * MAX_MOTORS }>,
    ) {
        let master = match self.sync_master {
            Some(m) => m,
            None => return,
        };
        let master_position = self.motors[master.index()].position.0;

        for index in 0..self.motor_count {
            if index == master.index() || !self.motors[index].participating {
                continue;
            }
            let spread = fabsf(self.motors[index].position.0 - master_position);
            if spread > self.max_sync_error {
                self.max_sync_error = spread;
            }
            if spread > self.sync_tolerance {
                self.motors[index].synchronized = false;
                if let Some(motor) = MotorId::new(index as u8, self.motor_count) {
                    let _ = adjustments.push(CoordinationAdjustment::SyncFault { motor, spread });
                }
            } else {
                self.motors[index].synchronized = true;
            }
        }
    }

    fn update_load_sharing(
        &mut self,
        adjustments: &mut Vec<CoordinationAdjustment, { 2 * MAX_MOTORS }>,
    ) {
        let mut sum = 0.0;
        let mut count = 0u32;
        for state in self.motors.iter().take(self.motor_count) {
            if state.participating {
                sum += state.position.0;
                count += 1;
            }
        }
        if count == 0 {
            return;
        }
        let average = sum / count as f32;

        for index in 0..self.motor_count {
            let state = &mut self.motors[index];
            if !state.participating {
                continue;
            }
            let deviation = state.position.0 - average;
            // Balancing engages above the deadband; the halfway nudge only
            // fires once the deviation exceeds the tolerated difference.
            state.load_share = fabsf(deviation) > self.load_threshold;
            if fabsf(deviation) > self.max_load_difference {
                let target = Degrees(state.position.0 - deviation / 2.0);
                if let Some(motor) = MotorId::new(index as u8, self.motor_count) {
                    let _ = adjustments.push(CoordinationAdjustment::SetTarget { motor, target });
                }
            }
        }
    }

    fn update_master_slave(
        &mut self,
        adjustments: &mut Vec<CoordinationAdjustment, { 2 * MAX_MOTORS }>,
    ) {
        let master = match self.sync_master {
            Some(m) if self.motors[m.index()].participating => m,
            _ => match self
                .motors
                .iter()
                .take(self.motor_count)
                .position(|m| m.participating && m.profile_active)
            {
                Some(index) => match MotorId::new(index as u8, self.motor_count) {
                    Some(id) => id,
                    None => return,
                },
                None => return,
            },
        };
        let master_position = self.motors[master.index()].position.0;

        for index in 0..self.motor_count {
            if index == master.index() || !self.motors[index].participating {
                continue;
            }
            if let Some(motor) = MotorId::new(index as u8, self.motor_count) {
                let _ = adjustments.push(CoordinationAdjustment::SetTarget {
                    motor,
                    target: Degrees(master_position + self.motors[index].slave_offset.0),
                });
            }
        }
    }

    /// Read-only status snapshot.
    pub fn status(&self) -> CoordinationStatus {
        let mut motors = [MotorCoordStatus::default(); MAX_MOTORS];
        for (entry, state) in motors.iter_mut().zip(self.motors.iter()) {
            *entry = MotorCoordStatus {
                enabled: state.enabled,
                participating: state.participating,
                synchronized: state.synchronized,
                load_share: state.load_share,
                settled: state.settled,
                priority: state.priority,
                position: state.position,
            };
        }
        CoordinationStatus {
            mode: self.mode,
            active: self.active,
            sync_master: self.sync_master.map(|m| m.value()),
            max_sync_error: self.max_sync_error,
            move_start_us: self.start_us,
            motors,
            motor_count: self.motor_count as u8,
        }
    }
}
