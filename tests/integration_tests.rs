//! Integration tests for the stepper-control library.
//!
//! These tests verify the complete workflow from TOML parsing through
//! system wiring to the scheduler-driven control and safety behavior,
//! using in-memory doubles for the encoder, driver, and fault sink.

mod common;

use common::{new_rig, step_plant, SimClock, SimDriver, SimEncoder, SimFaults};
use stepper_control::coordination::{CoordinatedMoveCommand, MotorTarget};
use stepper_control::error::{
    ControlError, CoordinationError, Error, MotionError, SafetyError,
};
use stepper_control::hal::{FaultKind, StopSource};
use stepper_control::{
    parse_config, ControlSystem, Degrees, DegreesPerSec, DegreesPerSecSquared, HomingMethod,
    MotionLimits, ProfileKind,
};

// =============================================================================
// Test configuration data
// =============================================================================

const RIG_CONFIG: &str = r#"
[scheduler]
control_period_us = 1000
safety_period_us = 500
coordination_period_us = 10000
max_missed_deadlines = 100000
max_overruns = 100000

[coordination]
mode = "independent"
sync_master = "azimuth"
sync_tolerance_deg = 5.0

[motors.azimuth]
name = "Azimuth"
filter_coefficient = 1.0

[motors.azimuth.gains]
kp = 5.0
kvff = 1.0

[motors.azimuth.limits]
max_position_error_deg = 50.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0
output_limit_deg_per_sec = 180.0

[motors.azimuth.safety]
soft_min_deg = -170.0
soft_max_deg = 170.0
hard_min_deg = -180.0
hard_max_deg = 180.0
runaway_threshold_deg = 20.0

[motors.azimuth.homing]
speed_deg_per_sec = 10.0
backoff_deg = 2.0
timeout_sec = 30.0

[motors.elevation]
name = "Elevation"
filter_coefficient = 1.0

[motors.elevation.gains]
kp = 5.0
kvff = 1.0

[motors.elevation.limits]
max_position_error_deg = 50.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0
output_limit_deg_per_sec = 180.0

[motors.elevation.safety]
soft_min_deg = -170.0
soft_max_deg = 170.0
hard_min_deg = -180.0
hard_max_deg = 180.0
runaway_threshold_deg = 20.0
"#;

type RigSystem = ControlSystem<SimEncoder, SimDriver, SimFaults>;

fn make_system() -> (RigSystem, common::Rig) {
    let config = parse_config(RIG_CONFIG).expect("rig config should parse");
    let rig = new_rig();
    let system = ControlSystem::new(
        config,
        SimEncoder(rig.clone()),
        SimDriver(rig.clone()),
        SimFaults(rig.clone()),
    )
    .expect("system should build");
    (system, rig)
}

fn default_limits() -> MotionLimits {
    MotionLimits::symmetric(DegreesPerSec(90.0), DegreesPerSecSquared(180.0))
}

/// Run both poll sources over `duration_secs`, stepping the plant at the
/// control rate.
fn run_cycles(system: &mut RigSystem, rig: &common::Rig, clock: &mut SimClock, duration_secs: f32) {
    let steps = (duration_secs / 0.0005) as u64;
    for _ in 0..steps {
        clock.advance_us(500);
        system.poll_safety(clock);
        system.poll_control(clock);
        step_plant(rig, 0.0005);
    }
}

// =============================================================================
// Configuration workflow
// =============================================================================

#[test]
fn config_to_system_workflow() {
    let (system, _rig) = make_system();
    assert_eq!(system.motor_count(), 2);

    let azimuth = system.motor_id_by_name("Azimuth").expect("motor by name");
    assert_eq!(azimuth.index(), 0);
    assert!(system.motor_id_by_name("Focus").is_none());

    assert!(system.motor_id(1).is_ok());
    assert!(matches!(
        system.motor_id(2),
        Err(Error::Coordination(CoordinationError::InvalidMotor(2)))
    ));
}

#[test]
fn status_snapshots_before_enable() {
    let (system, _rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();

    let status = system.motor_status(azimuth);
    assert!(!status.enabled);
    assert!(!status.homed);

    let coordination = system.coordination_status();
    assert!(!coordination.active);
    assert_eq!(coordination.sync_master, Some(0));

    let safety = system.safety_status(azimuth);
    assert!(safety.position_valid);
    assert_eq!(safety.violation, None);
}

// =============================================================================
// Enable / disable
// =============================================================================

#[test]
fn enable_captures_sensor_position() {
    let (mut system, rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    rig.borrow_mut().positions[0] = 42.0;

    system.enable_motor(azimuth).unwrap();
    let status = system.motor_status(azimuth);
    assert!(status.enabled);
    assert_eq!(status.current_position.0, 42.0);
    assert_eq!(status.target_position.0, 42.0);
    assert_eq!(status.position_error, 0.0);
}

#[test]
fn enable_surfaces_encoder_fault() {
    let (mut system, rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    rig.borrow_mut().encoder_fail[0] = true;

    let result = system.enable_motor(azimuth);
    assert!(matches!(
        result,
        Err(Error::Control(ControlError::EncoderFault))
    ));
    assert!(rig
        .borrow()
        .faults
        .contains(&(0, FaultKind::Encoder)));
}

#[test]
fn disable_soft_stops_the_motor() {
    let (mut system, rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();
    system.disable_motor(azimuth).unwrap();

    assert!(!system.motor_status(azimuth).enabled);
    assert_eq!(rig.borrow().soft_stops, 1);
}

// =============================================================================
// Single-motor moves
// =============================================================================

#[test]
fn move_requires_enabled_controller() {
    let (mut system, _rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    let result = system.move_motor(
        azimuth,
        Degrees(45.0),
        default_limits(),
        ProfileKind::Trapezoidal,
        0,
    );
    assert!(matches!(result, Err(Error::Control(ControlError::NotEnabled))));
}

#[test]
fn move_rejects_out_of_range_target() {
    let (mut system, _rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();

    let result = system.move_motor(
        azimuth,
        Degrees(200.0),
        default_limits(),
        ProfileKind::Trapezoidal,
        0,
    );
    assert!(matches!(
        result,
        Err(Error::Motion(MotionError::PositionOutOfRange { .. }))
    ));
}

#[test]
fn move_rejects_excessive_velocity() {
    let (mut system, _rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();

    let result = system.move_motor(
        azimuth,
        Degrees(45.0),
        MotionLimits::symmetric(DegreesPerSec(1_000.0), DegreesPerSecSquared(180.0)),
        ProfileKind::Trapezoidal,
        0,
    );
    assert!(matches!(
        result,
        Err(Error::Motion(MotionError::VelocityOutOfRange { .. }))
    ));
}

#[test]
fn single_motor_move_settles_at_target() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();

    system
        .move_motor(
            azimuth,
            Degrees(45.0),
            default_limits(),
            ProfileKind::Trapezoidal,
            clock.now,
        )
        .unwrap();

    run_cycles(&mut system, &rig, &mut clock, 3.0);

    let status = system.motor_status(azimuth);
    assert!(
        (status.current_position.0 - 45.0).abs() < 1.0,
        "position {} after move",
        status.current_position.0
    );
    assert!(status.settled);
}

#[test]
fn s_curve_move_settles_at_target() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();

    system
        .move_motor(
            azimuth,
            Degrees(-30.0),
            default_limits(),
            ProfileKind::SCurve,
            clock.now,
        )
        .unwrap();

    run_cycles(&mut system, &rig, &mut clock, 3.0);

    let status = system.motor_status(azimuth);
    assert!((status.current_position.0 + 30.0).abs() < 1.0);
    assert!(status.settled);
}

// =============================================================================
// Coordinated moves
// =============================================================================

#[test]
fn coordinated_move_targeting_disabled_motor_fails() {
    let (mut system, _rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    let elevation = system.motor_id(1).unwrap();
    system.enable_motor(azimuth).unwrap();
    // Elevation stays disabled.

    let mut command = CoordinatedMoveCommand::new(true);
    command.set(
        elevation,
        MotorTarget {
            target: Degrees(30.0),
            max_velocity: DegreesPerSec(90.0),
            acceleration: DegreesPerSecSquared(180.0),
            deceleration: DegreesPerSecSquared(180.0),
            enabled: true,
        },
    );

    let result = system.coordinated_move(&command, 0);
    assert!(matches!(
        result,
        Err(Error::Coordination(CoordinationError::NoMotorsEnabled))
    ));
}

#[test]
fn coordinated_move_completes_and_clears_active() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    let elevation = system.motor_id(1).unwrap();
    system.enable_motor(azimuth).unwrap();
    system.enable_motor(elevation).unwrap();

    let mut command = CoordinatedMoveCommand::new(true);
    for (motor, target) in [(azimuth, 40.0), (elevation, -25.0)] {
        command.set(
            motor,
            MotorTarget {
                target: Degrees(target),
                max_velocity: DegreesPerSec(90.0),
                acceleration: DegreesPerSecSquared(180.0),
                deceleration: DegreesPerSecSquared(180.0),
                enabled: true,
            },
        );
    }

    system.coordinated_move(&command, clock.now).unwrap();
    assert!(system.coordination_status().active);

    // A second command while motion is active is rejected.
    let result = system.coordinated_move(&command, clock.now);
    assert!(matches!(
        result,
        Err(Error::Coordination(CoordinationError::MotionActive))
    ));

    run_cycles(&mut system, &rig, &mut clock, 3.0);

    assert!(!system.coordination_status().active);
    assert!((system.motor_status(azimuth).current_position.0 - 40.0).abs() < 1.0);
    assert!((system.motor_status(elevation).current_position.0 + 25.0).abs() < 1.0);
}

// =============================================================================
// Safety behavior
// =============================================================================

#[test]
fn runaway_jump_triggers_emergency_stop() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();

    // Baseline safety update.
    system.poll_safety(&mut clock);

    // 50 degree jump in one update against a 20 degree threshold.
    rig.borrow_mut().positions[0] = 50.0;
    clock.advance_us(500);
    system.poll_safety(&mut clock);

    assert!(system.is_emergency_stopped());
    assert!(rig.borrow().hard_stops >= 2, "all motors hard-stopped");
    assert!(rig
        .borrow()
        .emergency_stops
        .contains(&StopSource::SafetyMonitor));
    assert!(rig.borrow().faults.contains(&(0, FaultKind::Runaway)));
    assert!(!system.motor_status(azimuth).enabled);
    assert!(system.safety_status(azimuth).runaway);
}

#[test]
fn emergency_stop_blocks_commands_until_cleared() {
    let (mut system, rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();
    system.trigger_emergency_stop(StopSource::External);

    let result = system.move_motor(
        azimuth,
        Degrees(10.0),
        default_limits(),
        ProfileKind::Trapezoidal,
        0,
    );
    assert!(matches!(
        result,
        Err(Error::Safety(SafetyError::EmergencyStopActive))
    ));
    assert!(matches!(
        system.enable_motor(azimuth),
        Err(Error::Safety(SafetyError::EmergencyStopActive))
    ));

    // Clear plus explicit re-enable restores operation.
    system.clear_emergency_stop();
    rig.borrow_mut().positions[0] = 0.0;
    system.enable_motor(azimuth).unwrap();
    assert!(system.motor_status(azimuth).enabled);
}

#[test]
fn soft_limit_breach_causes_controlled_stop_only() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();

    // Walk out slowly (0.4 s between updates keeps deltas plausible) until
    // just past the soft maximum.
    let mut position: f32 = 0.0;
    while position < 172.0 {
        position += 15.0;
        rig.borrow_mut().positions[0] = position.min(172.0);
        clock.advance_us(400_000);
        system.poll_safety(&mut clock);
    }

    assert!(!system.is_emergency_stopped());
    assert!(rig.borrow().soft_stops >= 1);
    assert!(rig.borrow().faults.contains(&(0, FaultKind::SoftLimit)));
}

#[test]
fn failed_controlled_stop_falls_back_to_hard_stop() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();
    rig.borrow_mut().soft_stop_fails = true;

    // Walk out past the soft maximum without tripping the runaway delta.
    let mut position: f32 = 0.0;
    while position < 172.0 {
        position += 15.0;
        rig.borrow_mut().positions[0] = position.min(172.0);
        clock.advance_us(400_000);
        system.poll_safety(&mut clock);
    }

    // Soft limit asked for a controlled stop; the failed soft stop was
    // escalated to a hard stop and reported as a driver fault.
    assert!(rig.borrow().hard_stops >= 1);
    assert!(rig.borrow().faults.contains(&(0, FaultKind::SoftLimit)));
    assert!(rig.borrow().faults.contains(&(0, FaultKind::Driver)));
    assert!(!system.is_emergency_stopped());
}

#[test]
fn enforce_limits_reports_unhonored_command() {
    let (system, _rig) = make_system();
    let azimuth = system.motor_id(0).unwrap();

    // The advisory error carries the clamped value, which is still usable.
    let result = system.enforce_limits(azimuth, Degrees(175.0));
    assert!(matches!(
        result,
        Err(Error::Safety(SafetyError::PositionLimitExceeded {
            requested,
            clamped,
        })) if requested == 175.0 && clamped == 170.0
    ));

    let position = system.enforce_limits(azimuth, Degrees(100.0)).unwrap();
    assert_eq!(position.0, 100.0);
}

#[test]
fn encoder_fault_suppresses_output_and_counts() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();
    system
        .move_motor(
            azimuth,
            Degrees(45.0),
            default_limits(),
            ProfileKind::Trapezoidal,
            clock.now,
        )
        .unwrap();

    rig.borrow_mut().encoder_fail[0] = true;
    clock.advance_us(1_000);
    system.poll_control(&mut clock);

    // No command was issued from a stale value.
    assert_eq!(rig.borrow().commanded_velocity[0], 0.0);
    assert!(system.motor_status(azimuth).fault_count > 0);
    assert!(rig.borrow().faults.contains(&(0, FaultKind::Encoder)));
}

// =============================================================================
// Scheduler health
// =============================================================================

#[test]
fn scheduler_health_threshold_reports_failsafe() {
    let toml = RIG_CONFIG
        .replace("max_missed_deadlines = 100000", "max_missed_deadlines = 0")
        .replace("max_overruns = 100000", "max_overruns = 0");
    let config = parse_config(&toml).unwrap();
    let rig = new_rig();
    let mut system = ControlSystem::new(
        config,
        SimEncoder(rig.clone()),
        SimDriver(rig.clone()),
        SimFaults(rig.clone()),
    )
    .unwrap();
    let mut clock = SimClock::new();

    // Two polls a full second apart force deadline misses on the 500 us
    // safety task; the following poll reports the health fault once.
    system.poll_safety(&mut clock);
    clock.advance_us(1_000_000);
    system.poll_safety(&mut clock);
    clock.advance_us(1_000_000);
    system.poll_safety(&mut clock);

    let health_faults = rig
        .borrow()
        .failsafes
        .iter()
        .filter(|(kind, _)| *kind == FaultKind::SchedulerHealth)
        .count();
    assert_eq!(health_faults, 1);
    assert!(system.scheduler_stats().total_missed_deadlines > 0);
}

// =============================================================================
// Homing
// =============================================================================

#[test]
fn homing_set_zero_adopts_current_position() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    rig.borrow_mut().positions[0] = 30.0;
    system.enable_motor(azimuth).unwrap();

    system.home_motor(azimuth, HomingMethod::SetZero).unwrap();
    clock.advance_us(1_000);
    system.poll_control(&mut clock);

    let status = system.motor_status(azimuth);
    assert!(status.homed);
    assert_eq!(status.current_position.0, 0.0);
    assert_eq!(rig.borrow().position_resets, 1);
}

#[test]
fn homing_limit_switch_search_and_backoff() {
    let (mut system, rig) = make_system();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    rig.borrow_mut().positions[0] = 5.0;
    system.enable_motor(azimuth).unwrap();
    system
        .home_motor(azimuth, HomingMethod::LimitSwitch)
        .unwrap();

    // Drive until the simulated switch at 0 degrees trips, then let the
    // backoff and zeroing finish.
    for _ in 0..2_000 {
        clock.advance_us(1_000);
        system.poll_control(&mut clock);
        step_plant(&rig, 0.001);
        let position = rig.borrow().positions[0];
        rig.borrow_mut().switches[0] = position <= 0.0;
        if system.motor_status(azimuth).homed {
            break;
        }
    }

    let status = system.motor_status(azimuth);
    assert!(status.homed);
    assert_eq!(rig.borrow().position_resets, 1);
    // Search ran toward the switch (negative), so some negative velocity
    // was commanded along the way.
    assert!(rig.borrow().run_count > 0);
}

#[test]
fn homing_timeout_reports_fault() {
    let toml = RIG_CONFIG.replace("timeout_sec = 30.0", "timeout_sec = 0.05");
    let config = parse_config(&toml).unwrap();
    let rig = new_rig();
    let mut system = ControlSystem::new(
        config,
        SimEncoder(rig.clone()),
        SimDriver(rig.clone()),
        SimFaults(rig.clone()),
    )
    .unwrap();
    let mut clock = SimClock::new();
    let azimuth = system.motor_id(0).unwrap();
    system.enable_motor(azimuth).unwrap();
    system
        .home_motor(azimuth, HomingMethod::LimitSwitch)
        .unwrap();

    // Switch never triggers; the 50 ms timeout elapses.
    for _ in 0..100 {
        clock.advance_us(1_000);
        system.poll_control(&mut clock);
    }

    let status = system.motor_status(azimuth);
    assert!(!status.homed);
    assert!(rig.borrow().faults.contains(&(0, FaultKind::Homing)));
}
