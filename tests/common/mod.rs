//! Shared test doubles for the hardware collaborators.
//!
//! The encoder, driver, and fault sink all view one `Rc<RefCell<_>>` rig so
//! tests can inject positions and faults from outside the system and
//! inspect every command the core issued.

use std::cell::RefCell;
use std::rc::Rc;

use stepper_control::hal::{FaultKind, Severity, StopSource};
use stepper_control::{
    Clock, Degrees, DegreesPerSec, Direction, FaultHandler, MotorDriver, MotorId, PositionSensor,
    MAX_MOTORS,
};

/// Manually advanced clock.
pub struct SimClock {
    pub now: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    pub fn advance_us(&mut self, us: u64) {
        self.now += us;
    }
}

impl Clock for SimClock {
    fn now_us(&mut self) -> u64 {
        self.now
    }
}

/// State shared between the rig's doubles.
#[derive(Default)]
pub struct RigState {
    pub positions: [f32; MAX_MOTORS],
    pub commanded_velocity: [f32; MAX_MOTORS],
    pub switches: [bool; MAX_MOTORS],
    pub encoder_fail: [bool; MAX_MOTORS],
    pub soft_stop_fails: bool,

    pub run_count: u32,
    pub soft_stops: u32,
    pub hard_stops: u32,
    pub position_resets: u32,

    pub faults: Vec<(u8, FaultKind)>,
    pub emergency_stops: Vec<StopSource>,
    pub failsafes: Vec<(FaultKind, Severity)>,
}

pub type Rig = Rc<RefCell<RigState>>;

pub fn new_rig() -> Rig {
    Rc::new(RefCell::new(RigState::default()))
}

/// Integrate commanded velocities into positions for `dt` seconds.
pub fn step_plant(rig: &Rig, dt: f32) {
    let mut state = rig.borrow_mut();
    for index in 0..MAX_MOTORS {
        state.positions[index] += state.commanded_velocity[index] * dt;
    }
}

pub struct SimEncoder(pub Rig);

#[derive(Debug)]
pub struct SimEncoderError;

impl PositionSensor for SimEncoder {
    type Error = SimEncoderError;

    fn read_position(&mut self, motor: MotorId) -> Result<Degrees, Self::Error> {
        let state = self.0.borrow();
        if state.encoder_fail[motor.index()] {
            return Err(SimEncoderError);
        }
        Ok(Degrees(state.positions[motor.index()]))
    }

    fn read_velocity(&mut self, motor: MotorId) -> Result<DegreesPerSec, Self::Error> {
        let state = self.0.borrow();
        if state.encoder_fail[motor.index()] {
            return Err(SimEncoderError);
        }
        Ok(DegreesPerSec(state.commanded_velocity[motor.index()]))
    }

    fn limit_switch(&mut self, motor: MotorId) -> Result<bool, Self::Error> {
        Ok(self.0.borrow().switches[motor.index()])
    }
}

pub struct SimDriver(pub Rig);

#[derive(Debug)]
pub struct SimDriverError;

impl MotorDriver for SimDriver {
    type Error = SimDriverError;

    fn move_to(&mut self, motor: MotorId, target: Degrees) -> Result<(), Self::Error> {
        self.0.borrow_mut().positions[motor.index()] = target.0;
        Ok(())
    }

    fn run(
        &mut self,
        motor: MotorId,
        direction: Direction,
        speed: DegreesPerSec,
    ) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        state.commanded_velocity[motor.index()] = direction.sign() * speed.abs();
        state.run_count += 1;
        Ok(())
    }

    fn soft_stop(&mut self, motor: MotorId) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        if state.soft_stop_fails {
            return Err(SimDriverError);
        }
        state.commanded_velocity[motor.index()] = 0.0;
        state.soft_stops += 1;
        Ok(())
    }

    fn hard_stop(&mut self, motor: MotorId) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        state.commanded_velocity[motor.index()] = 0.0;
        state.hard_stops += 1;
        Ok(())
    }

    fn reset_position(&mut self, motor: MotorId) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        state.positions[motor.index()] = 0.0;
        state.position_resets += 1;
        Ok(())
    }
}

pub struct SimFaults(pub Rig);

impl FaultHandler for SimFaults {
    fn report_fault(&mut self, motor: MotorId, kind: FaultKind) {
        self.0.borrow_mut().faults.push((motor.value(), kind));
    }

    fn emergency_stop(&mut self, source: StopSource) {
        self.0.borrow_mut().emergency_stops.push(source);
    }

    fn failsafe(&mut self, kind: FaultKind, severity: Severity) {
        self.0.borrow_mut().failsafes.push((kind, severity));
    }
}
