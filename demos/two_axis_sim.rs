//! Simulated two-axis coordinated move.
//!
//! Runs the control system against an ideal velocity-integrating plant and
//! prints motor status while a synchronized move executes.

use std::cell::RefCell;
use std::rc::Rc;

use stepper_control::coordination::{CoordinatedMoveCommand, MotorTarget};
use stepper_control::hal::{FaultKind, Severity, StopSource};
use stepper_control::{
    parse_config, Clock, ControlSystem, Degrees, DegreesPerSec, DegreesPerSecSquared, Direction,
    FaultHandler, MotorDriver, MotorId, PositionSensor, TickNotifier, MAX_MOTORS,
};

const CONFIG: &str = r#"
[scheduler]
control_period_us = 1000
safety_period_us = 500
coordination_period_us = 10000

[coordination]
mode = "synchronized"
sync_master = "pan"
sync_tolerance_deg = 5.0

[motors.pan]
name = "Pan"
filter_coefficient = 1.0

[motors.pan.gains]
kp = 5.0
kvff = 1.0

[motors.pan.limits]
max_position_error_deg = 50.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0
output_limit_deg_per_sec = 180.0

[motors.pan.safety]
soft_min_deg = -170.0
soft_max_deg = 170.0
hard_min_deg = -180.0
hard_max_deg = 180.0

[motors.tilt]
name = "Tilt"
filter_coefficient = 1.0

[motors.tilt.gains]
kp = 5.0
kvff = 1.0

[motors.tilt.limits]
max_position_error_deg = 50.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0
output_limit_deg_per_sec = 180.0

[motors.tilt.safety]
soft_min_deg = -170.0
soft_max_deg = 170.0
hard_min_deg = -180.0
hard_max_deg = 180.0
"#;

#[derive(Default)]
struct Plant {
    positions: [f32; MAX_MOTORS],
    velocities: [f32; MAX_MOTORS],
}

type Shared = Rc<RefCell<Plant>>;

struct SimEncoder(Shared);

impl PositionSensor for SimEncoder {
    type Error = ();

    fn read_position(&mut self, motor: MotorId) -> Result<Degrees, ()> {
        Ok(Degrees(self.0.borrow().positions[motor.index()]))
    }

    fn read_velocity(&mut self, motor: MotorId) -> Result<DegreesPerSec, ()> {
        Ok(DegreesPerSec(self.0.borrow().velocities[motor.index()]))
    }

    fn limit_switch(&mut self, _motor: MotorId) -> Result<bool, ()> {
        Ok(false)
    }
}

struct SimDriver(Shared);

impl MotorDriver for SimDriver {
    type Error = ();

    fn move_to(&mut self, motor: MotorId, target: Degrees) -> Result<(), ()> {
        self.0.borrow_mut().positions[motor.index()] = target.0;
        Ok(())
    }

    fn run(&mut self, motor: MotorId, direction: Direction, speed: DegreesPerSec) -> Result<(), ()> {
        self.0.borrow_mut().velocities[motor.index()] = direction.sign() * speed.abs();
        Ok(())
    }

    fn soft_stop(&mut self, motor: MotorId) -> Result<(), ()> {
        self.0.borrow_mut().velocities[motor.index()] = 0.0;
        Ok(())
    }

    fn hard_stop(&mut self, motor: MotorId) -> Result<(), ()> {
        self.0.borrow_mut().velocities[motor.index()] = 0.0;
        Ok(())
    }

    fn reset_position(&mut self, motor: MotorId) -> Result<(), ()> {
        self.0.borrow_mut().positions[motor.index()] = 0.0;
        Ok(())
    }
}

struct LogFaults;

impl FaultHandler for LogFaults {
    fn report_fault(&mut self, motor: MotorId, kind: FaultKind) {
        eprintln!("fault on {motor}: {kind:?}");
    }

    fn emergency_stop(&mut self, source: StopSource) {
        eprintln!("EMERGENCY STOP ({source:?})");
    }

    fn failsafe(&mut self, kind: FaultKind, severity: Severity) {
        eprintln!("failsafe: {kind:?} ({severity:?})");
    }
}

struct SimClock {
    now: u64,
}

impl Clock for SimClock {
    fn now_us(&mut self) -> u64 {
        self.now
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_config(CONFIG)?;
    let plant: Shared = Rc::new(RefCell::new(Plant::default()));
    let mut system = ControlSystem::new(
        config,
        SimEncoder(plant.clone()),
        SimDriver(plant.clone()),
        LogFaults,
    )?;
    let mut clock = SimClock { now: 0 };

    let pan = system.motor_id_by_name("Pan").expect("pan configured");
    let tilt = system.motor_id_by_name("Tilt").expect("tilt configured");
    system.enable_motor(pan)?;
    system.enable_motor(tilt)?;

    let mut command = CoordinatedMoveCommand::new(true);
    for (motor, target) in [(pan, 120.0), (tilt, 30.0)] {
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
    system.coordinated_move(&command, clock.now)?;
    println!("coordinated move started (pan -> 120.0, tilt -> 30.0)");

    // 500 us steps. The notifiers stand in for the two periodic timer
    // interrupts: safety fires every step, control every other step, and
    // the main loop dispatches whatever is pending.
    let safety_tick = TickNotifier::new();
    let control_tick = TickNotifier::new();
    for step in 0u64.. {
        clock.now += 500;
        safety_tick.signal();
        if step % 2 == 0 {
            control_tick.signal();
        }

        if safety_tick.take() {
            system.poll_safety(&mut clock);
        }
        if control_tick.take() {
            system.poll_control(&mut clock);
        }
        {
            let mut plant = plant.borrow_mut();
            for index in 0..MAX_MOTORS {
                plant.positions[index] += plant.velocities[index] * 0.0005;
            }
        }

        if step % 500 == 0 {
            let pan_status = system.motor_status(pan);
            let tilt_status = system.motor_status(tilt);
            println!(
                "t={:6.2}s  pan {:8.3} deg  tilt {:8.3} deg  sync_err {:5.3}",
                clock.now as f32 / 1_000_000.0,
                pan_status.current_position.0,
                tilt_status.current_position.0,
                system.coordination_status().max_sync_error,
            );
        }

        if !system.coordination_status().active {
            break;
        }
    }

    let pan_status = system.motor_status(pan);
    let tilt_status = system.motor_status(tilt);
    println!(
        "move complete: pan {:.3} deg (settled: {}), tilt {:.3} deg (settled: {})",
        pan_status.current_position.0,
        pan_status.settled,
        tilt_status.current_position.0,
        tilt_status.settled,
    );
    println!(
        "scheduler: {} missed deadlines, {} overruns",
        system.scheduler_stats().total_missed_deadlines,
        system.scheduler_stats().overruns,
    );
    Ok(())
}
