//! Homing sequences.
//!
//! Homing runs as a small state machine advanced once per control tick, so
//! the control task never blocks while a search is in progress.

use crate::config::HomingConfig;
use crate::config::units::DegreesPerSec;
use crate::hal::Direction;

/// Homing method, selected per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingMethod {
    /// Drive toward the limit switch, back off, zero there.
    LimitSwitch,
    /// Re-reference the encoder to its index mark and zero.
    EncoderIndex,
    /// Accept the current position as zero, no motion.
    SetZero,
}

/// Action requested from the control task for this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingStep {
    /// Keep running in the given direction at the given speed.
    Run {
        /// Travel direction.
        direction: Direction,
        /// Travel speed.
        speed: DegreesPerSec,
    },
    /// Stop, reset the driver position register, and adopt zero.
    ResetToZero,
    /// Sequence finished; the motor is homed.
    Complete,
    /// The limit switch was not found within the timeout.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HomingPhase {
    Search,
    Backoff { remaining: f32 },
    Zeroing,
    Done,
    Failed,
}

/// Tick-driven homing state machine for one motor.
#[derive(Debug, Clone)]
pub struct HomingSequence {
    method: HomingMethod,
    config: HomingConfig,
    phase: HomingPhase,
    elapsed: f32,
}

impl HomingSequence {
    /// Start a sequence for the given method.
    pub fn new(method: HomingMethod, config: HomingConfig) -> Self {
        let phase = match method {
            HomingMethod::LimitSwitch => HomingPhase::Search,
            HomingMethod::EncoderIndex | HomingMethod::SetZero => HomingPhase::Zeroing,
        };
        Self {
            method,
            config,
            phase,
            elapsed: 0.0,
        }
    }

    /// The method this sequence was started with.
    #[inline]
    pub fn method(&self) -> HomingMethod {
        self.method
    }

    /// Whether the sequence has reached a terminal state.
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, HomingPhase::Done | HomingPhase::Failed)
    }

    /// Advance one control tick.
    ///
    /// `switch_active` is the current limit-switch reading; it is only
    /// consulted during the search phase.
    pub fn advance(&mut self, dt: f32, switch_active: bool) -> HomingStep {
        match self.phase {
            HomingPhase::Search => {
                self.elapsed += dt;
                if switch_active {
                    let speed = self.config.speed.abs().max(1e-3);
                    self.phase = HomingPhase::Backoff {
                        remaining: self.config.backoff.0 / speed,
                    };
                    return self.backoff_step();
                }
                if self.elapsed > self.config.timeout {
                    self.phase = HomingPhase::Failed;
                    return HomingStep::TimedOut;
                }
                HomingStep::Run {
                    direction: self.search_direction(),
                    speed: self.config.speed,
                }
            }
            HomingPhase::Backoff { remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.phase = HomingPhase::Done;
                    return HomingStep::ResetToZero;
                }
                self.phase = HomingPhase::Backoff { remaining };
                self.backoff_step()
            }
            HomingPhase::Zeroing => {
                self.phase = HomingPhase::Done;
                HomingStep::ResetToZero
            }
            HomingPhase::Done => HomingStep::Complete,
            HomingPhase::Failed => HomingStep::TimedOut,
        }
    }

    fn search_direction(&self) -> Direction {
        if self.config.search_direction >= 0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }

    fn backoff_step(&self) -> HomingStep {
        let direction = match self.search_direction() {
            Direction::Positive => Direction::Negative,
            Direction::Negative => Direction::Positive,
        };
        HomingStep::Run {
            direction,
            speed: self.config.speed,
        }
    }
}
