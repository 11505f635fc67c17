//! Reference STEP/DIR driver binding.
//!
//! Single-axis [`MotorDriver`] implementation over embedded-hal 1.0
//! `OutputPin` + `DelayNs`, translating velocity commands into step pulse
//! bursts. Feedback is open-loop: the binding counts its own pulses and can
//! therefore also serve as a [`PositionSensor`] on rigs without an encoder.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::config::units::{Degrees, DegreesPerSec, MotorId};

use super::{Direction, MotorDriver, PositionSensor};

/// Errors from the STEP/DIR binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirError {
    /// GPIO pin operation failed.
    Pin,
}

/// STEP/DIR pulse-train driver for one motor.
///
/// `run` emits a burst sized for one control period, so the control loop
/// re-issues it every tick; `move_to` pulses the full delta at the
/// configured travel speed.
pub struct StepDirDriver<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    step_pin: STEP,
    dir_pin: DIR,
    delay: DELAY,

    /// Steps per degree of output rotation.
    steps_per_degree: f32,

    /// Control period the `run` bursts are sized for, seconds.
    control_period: f32,

    /// Travel speed for `move_to`, degrees per second.
    travel_speed: DegreesPerSec,

    /// Whether direction pin logic is inverted.
    invert_direction: bool,

    /// Cached direction to avoid unnecessary pin writes.
    current_direction: Option<Direction>,

    /// Pulse-counted position in steps.
    position_steps: i64,

    /// Last commanded velocity (open-loop feedback).
    last_velocity: DegreesPerSec,
}

impl<STEP, DIR, DELAY> StepDirDriver<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Create a new binding.
    ///
    /// `steps_per_revolution` already includes microstepping and gearing.
    pub fn new(
        step_pin: STEP,
        dir_pin: DIR,
        delay: DELAY,
        steps_per_revolution: u32,
        control_period: f32,
        travel_speed: DegreesPerSec,
        invert_direction: bool,
    ) -> Self {
        Self {
            step_pin,
            dir_pin,
            delay,
            steps_per_degree: steps_per_revolution as f32 / 360.0,
            control_period,
            travel_speed,
            invert_direction,
            current_direction: None,
            position_steps: 0,
            last_velocity: DegreesPerSec(0.0),
        }
    }

    /// Pulse-counted position in degrees.
    #[inline]
    pub fn position(&self) -> Degrees {
        Degrees(self.position_steps as f32 / self.steps_per_degree)
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), StepDirError> {
        if self.current_direction == Some(direction) {
            return Ok(());
        }

        let pin_high = match direction {
            Direction::Positive => !self.invert_direction,
            Direction::Negative => self.invert_direction,
        };

        if pin_high {
            self.dir_pin.set_high().map_err(|_| StepDirError::Pin)?;
        } else {
            self.dir_pin.set_low().map_err(|_| StepDirError::Pin)?;
        }

        self.current_direction = Some(direction);
        Ok(())
    }

    /// Emit `count` step pulses at a fixed interval.
    fn pulse(&mut self, count: u32, interval_ns: u32, direction: Direction) -> Result<(), StepDirError> {
        self.set_direction(direction)?;

        let step_delta = match direction {
            Direction::Positive => 1,
            Direction::Negative => -1,
        };

        for _ in 0..count {
            self.step_pin.set_high().map_err(|_| StepDirError::Pin)?;
            // 2 us pulse width satisfies common driver ICs
            self.delay.delay_us(2);
            self.step_pin.set_low().map_err(|_| StepDirError::Pin)?;

            self.position_steps += step_delta;

            let gap_ns = interval_ns.saturating_sub(2_000);
            if gap_ns > 0 {
                self.delay.delay_ns(gap_ns);
            }
        }

        Ok(())
    }
}

impl<STEP, DIR, DELAY> MotorDriver for StepDirDriver<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    type Error = StepDirError;

    fn move_to(&mut self, _motor: MotorId, target: Degrees) -> Result<(), Self::Error> {
        let target_steps = (target.0 * self.steps_per_degree) as i64;
        let delta = target_steps - self.position_steps;
        if delta == 0 {
            return Ok(());
        }

        let direction = Direction::from_delta(delta as f32);
        let speed_steps = self.travel_speed.0 * self.steps_per_degree;
        let interval_ns = if speed_steps > 0.0 {
            (1_000_000_000.0 / speed_steps) as u32
        } else {
            u32::MAX
        };

        self.pulse(delta.unsigned_abs() as u32, interval_ns, direction)?;
        self.last_velocity = DegreesPerSec(0.0);
        Ok(())
    }

    fn run(
        &mut self,
        _motor: MotorId,
        direction: Direction,
        speed: DegreesPerSec,
    ) -> Result<(), Self::Error> {
        let speed_steps = speed.abs() * self.steps_per_degree;
        if speed_steps <= 0.0 {
            self.last_velocity = DegreesPerSec(0.0);
            return Ok(());
        }

        // One control period's worth of steps at the commanded rate.
        let count = (speed_steps * self.control_period) as u32;
        let interval_ns = (1_000_000_000.0 / speed_steps) as u32;

        self.pulse(count, interval_ns, direction)?;
        self.last_velocity = DegreesPerSec(direction.sign() * speed.abs());
        Ok(())
    }

    fn soft_stop(&mut self, _motor: MotorId) -> Result<(), Self::Error> {
        // Pulse bursts finish within the tick; nothing is in flight.
        self.last_velocity = DegreesPerSec(0.0);
        Ok(())
    }

    fn hard_stop(&mut self, _motor: MotorId) -> Result<(), Self::Error> {
        self.last_velocity = DegreesPerSec(0.0);
        Ok(())
    }

    fn reset_position(&mut self, _motor: MotorId) -> Result<(), Self::Error> {
        self.position_steps = 0;
        Ok(())
    }
}

impl<STEP, DIR, DELAY> PositionSensor for StepDirDriver<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    type Error = StepDirError;

    fn read_position(&mut self, _motor: MotorId) -> Result<Degrees, Self::Error> {
        Ok(self.position())
    }

    fn read_velocity(&mut self, _motor: MotorId) -> Result<DegreesPerSec, Self::Error> {
        Ok(self.last_velocity)
    }

    /// No switch input on a bare STEP/DIR rig; homing must use `SetZero`.
    fn limit_switch(&mut self, _motor: MotorId) -> Result<bool, Self::Error> {
        Ok(false)
    }
}
