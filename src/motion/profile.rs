//! Motion profile calculation.
//!
//! Turns a (start, end, limits) request into a time-parameterized trajectory
//! with trapezoidal or jerk-limited S-curve shaping, and evaluates it as a
//! pure function of elapsed time.

use libm::sqrtf;

use crate::config::units::{Degrees, DegreesPerSec, DegreesPerSecSquared};

/// Profile shape selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileKind {
    /// Constant-acceleration trapezoid (or triangle for short moves).
    #[default]
    Trapezoidal,
    /// Jerk-limited two-phase S-curve.
    SCurve,
}

/// Current phase of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionPhase {
    /// Jerk ramp into acceleration (S-curve only).
    JerkAccel,
    /// Accelerating toward peak velocity.
    Accelerating,
    /// Moving at peak velocity.
    ConstVel,
    /// Decelerating from peak velocity.
    Decelerating,
    /// Jerk ramp out of deceleration (S-curve only).
    JerkDecel,
    /// Motion complete.
    Complete,
}

/// Kinematic limits for one move.
#[derive(Debug, Clone, Copy)]
pub struct MotionLimits {
    /// Velocity ceiling.
    pub max_velocity: DegreesPerSec,
    /// Acceleration rate.
    pub acceleration: DegreesPerSecSquared,
    /// Deceleration rate.
    pub deceleration: DegreesPerSecSquared,
}

impl MotionLimits {
    /// Symmetric limits (deceleration equals acceleration).
    pub fn symmetric(max_velocity: DegreesPerSec, acceleration: DegreesPerSecSquared) -> Self {
        Self {
            max_velocity,
            acceleration,
            deceleration: acceleration,
        }
    }
}

/// Instantaneous target produced by [`Trajectory::evaluate`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrajectorySample {
    /// Target position.
    pub position: Degrees,
    /// Signed target velocity.
    pub velocity: DegreesPerSec,
    /// Phase the elapsed time falls in.
    pub phase: MotionPhase,
}

/// Time-parameterized position/velocity plan for one motor.
///
/// Created when a move is requested; restartable only via regeneration.
#[derive(Debug, Clone)]
pub struct Trajectory {
    kind: ProfileKind,
    start: Degrees,
    end: Degrees,
    /// +1.0 or -1.0.
    direction: f32,
    /// Total displacement magnitude.
    distance: f32,

    max_velocity: f32,
    acceleration: f32,
    deceleration: f32,
    /// Velocity actually reached; never exceeds `max_velocity`.
    peak_velocity: f32,
    /// Jerk ramp duration, 0 for trapezoidal profiles.
    jerk_time: f32,

    t_accel: f32,
    t_const: f32,
    t_decel: f32,
    total_time: f32,

    d_accel: f32,
    d_const: f32,
    d_decel: f32,

    /// Shared-epoch start timestamp, set by `begin`.
    start_time_us: Option<u64>,
}

impl Trajectory {
    /// Create a trapezoidal profile.
    ///
    /// If the move is too short to reach `max_velocity` the profile
    /// degrades to a triangle with a lower peak.
    pub fn trapezoidal(start: Degrees, end: Degrees, limits: &MotionLimits) -> Self {
        let displacement = end.0 - start.0;
        let distance = libm::fabsf(displacement);
        let direction = if displacement < 0.0 { -1.0 } else { 1.0 };

        let v_max = limits.max_velocity.0;
        let accel = limits.acceleration.0;
        let decel = limits.deceleration.0;

        if distance == 0.0 || v_max <= 0.0 || accel <= 0.0 || decel <= 0.0 {
            return Self::zero(start);
        }

        let t_acc = v_max / accel;
        let d_acc = 0.5 * accel * t_acc * t_acc;
        let t_dec = v_max / decel;
        let d_dec = 0.5 * decel * t_dec * t_dec;

        let (peak, t_accel, t_const, t_decel, d_accel, d_const, d_decel) =
            if d_acc + d_dec <= distance {
                // Full trapezoid: cruise segment covers the remainder.
                let d_const = distance - (d_acc + d_dec);
                let t_const = d_const / v_max;
                (v_max, t_acc, t_const, t_dec, d_acc, d_const, d_dec)
            } else if accel == decel {
                // Triangle, symmetric rates.
                let t = sqrtf(distance / accel);
                let peak = accel * t;
                let d_accel = 0.5 * accel * t * t;
                (peak, t, 0.0, t, d_accel, 0.0, distance - d_accel)
            } else {
                // Triangle, asymmetric rates.
                let peak = sqrtf(2.0 * distance * accel * decel / (accel + decel));
                let t_accel = peak / accel;
                let t_decel = peak / decel;
                let d_accel = 0.5 * accel * t_accel * t_accel;
                (peak, t_accel, 0.0, t_decel, d_accel, 0.0, distance - d_accel)
            };

        Self {
            kind: ProfileKind::Trapezoidal,
            start,
            end,
            direction,
            distance,
            max_velocity: v_max,
            acceleration: accel,
            deceleration: decel,
            peak_velocity: peak,
            jerk_time: 0.0,
            t_accel,
            t_const,
            t_decel,
            total_time: t_accel + t_const + t_decel,
            d_accel,
            d_const,
            d_decel,
            start_time_us: None,
        }
    }

    /// Create a jerk-limited S-curve profile.
    ///
    /// Two-phase model per side: a jerk ramp of `jerk_time` seconds feeding
    /// a linear ramp. Position and velocity are continuous at every phase
    /// boundary. Moves too short to fit both jerk segments fall back to the
    /// trapezoidal shape.
    pub fn s_curve(start: Degrees, end: Degrees, limits: &MotionLimits, jerk_time: f32) -> Self {
        let displacement = end.0 - start.0;
        let distance = libm::fabsf(displacement);
        let direction = if displacement < 0.0 { -1.0 } else { 1.0 };

        let v_max = limits.max_velocity.0;
        let accel = limits.acceleration.0;
        let decel = limits.deceleration.0;

        if distance == 0.0 || v_max <= 0.0 || accel <= 0.0 || decel <= 0.0 {
            return Self::zero(start);
        }
        if jerk_time <= 0.0 {
            return Self::trapezoidal(start, end, limits);
        }

        // Velocity at the end of each jerk ramp.
        let v1a = 0.5 * accel * jerk_time;
        let v1d = 0.5 * decel * jerk_time;
        if v_max < v1a || v_max < v1d {
            // The jerk ramp alone would overshoot the velocity limit.
            return Self::trapezoidal(start, end, limits);
        }

        // Distance to reach velocity v through jerk ramp + linear ramp:
        //   d(v) = v^2 / (2a) + a * tj^2 / 24
        let accel_dist = |v: f32| v * v / (2.0 * accel) + accel * jerk_time * jerk_time / 24.0;
        let decel_dist = |v: f32| v * v / (2.0 * decel) + decel * jerk_time * jerk_time / 24.0;

        let peak = if accel_dist(v_max) + decel_dist(v_max) <= distance {
            v_max
        } else {
            let radicand = 2.0 * accel * decel
                * (distance - jerk_time * jerk_time * (accel + decel) / 24.0)
                / (accel + decel);
            if radicand <= 0.0 {
                return Self::trapezoidal(start, end, limits);
            }
            let peak = sqrtf(radicand);
            if peak < v1a || peak < v1d {
                // Linear segment would be negative; the jerk segments do
                // not fit this move.
                return Self::trapezoidal(start, end, limits);
            }
            peak
        };

        let d_accel = accel_dist(peak);
        let d_decel = decel_dist(peak);
        let d_const = (distance - d_accel - d_decel).max(0.0);
        let t_accel = peak / accel + jerk_time / 2.0;
        let t_decel = peak / decel + jerk_time / 2.0;
        let t_const = if peak > 0.0 { d_const / peak } else { 0.0 };

        Self {
            kind: ProfileKind::SCurve,
            start,
            end,
            direction,
            distance,
            max_velocity: v_max,
            acceleration: accel,
            deceleration: decel,
            peak_velocity: peak,
            jerk_time,
            t_accel,
            t_const,
            t_decel,
            total_time: t_accel + t_const + t_decel,
            d_accel,
            d_const,
            d_decel,
            start_time_us: None,
        }
    }

    /// Create a zero-length profile (no motion, immediately complete).
    pub fn zero(at: Degrees) -> Self {
        Self {
            kind: ProfileKind::Trapezoidal,
            start: at,
            end: at,
            direction: 1.0,
            distance: 0.0,
            max_velocity: 0.0,
            acceleration: 0.0,
            deceleration: 0.0,
            peak_velocity: 0.0,
            jerk_time: 0.0,
            t_accel: 0.0,
            t_const: 0.0,
            t_decel: 0.0,
            total_time: 0.0,
            d_accel: 0.0,
            d_const: 0.0,
            d_decel: 0.0,
            start_time_us: None,
        }
    }

    /// Regenerate this profile with peak/max velocity scaled by `scale`.
    ///
    /// Used by cross-motor synchronization to stretch a profile toward a
    /// longer total time.
    pub fn with_scaled_velocity(&self, scale: f32) -> Self {
        let limits = MotionLimits {
            max_velocity: DegreesPerSec(self.max_velocity * scale),
            acceleration: DegreesPerSecSquared(self.acceleration),
            deceleration: DegreesPerSecSquared(self.deceleration),
        };
        match self.kind {
            ProfileKind::Trapezoidal => Self::trapezoidal(self.start, self.end, &limits),
            ProfileKind::SCurve => Self::s_curve(self.start, self.end, &limits, self.jerk_time),
        }
    }

    /// Evaluate the trajectory at an elapsed time since start.
    ///
    /// Pure function of phase. Once `elapsed >= total_time` it returns the
    /// end position with zero velocity and phase `Complete`, and keeps
    /// doing so for any later time.
    pub fn evaluate(&self, elapsed: f32) -> TrajectorySample {
        if self.total_time <= 0.0 || elapsed >= self.total_time {
            return TrajectorySample {
                position: self.end,
                velocity: DegreesPerSec(0.0),
                phase: MotionPhase::Complete,
            };
        }
        let elapsed = elapsed.max(0.0);

        let (s, v, phase) = if elapsed < self.t_accel {
            self.eval_accel(elapsed)
        } else if elapsed < self.t_accel + self.t_const {
            let s = self.d_accel + self.peak_velocity * (elapsed - self.t_accel);
            (s, self.peak_velocity, MotionPhase::ConstVel)
        } else {
            self.eval_decel(elapsed - self.t_accel - self.t_const)
        };

        TrajectorySample {
            position: Degrees(self.start.0 + self.direction * s),
            velocity: DegreesPerSec(self.direction * v),
            phase,
        }
    }

    fn eval_accel(&self, t: f32) -> (f32, f32, MotionPhase) {
        if self.jerk_time > 0.0 && t < self.jerk_time {
            let jerk = self.acceleration / self.jerk_time;
            let v = 0.5 * jerk * t * t;
            let s = jerk * t * t * t / 6.0;
            (s, v, MotionPhase::JerkAccel)
        } else {
            // Past the jerk ramp (or pure trapezoid).
            let (tau, v0, s0) = if self.jerk_time > 0.0 {
                let v1 = 0.5 * self.acceleration * self.jerk_time;
                let s1 = self.acceleration * self.jerk_time * self.jerk_time / 6.0;
                (t - self.jerk_time, v1, s1)
            } else {
                (t, 0.0, 0.0)
            };
            let v = v0 + self.acceleration * tau;
            let s = s0 + v0 * tau + 0.5 * self.acceleration * tau * tau;
            (s, v, MotionPhase::Accelerating)
        }
    }

    /// Evaluate the deceleration side at `t` seconds after it began.
    ///
    /// The decel ramp is the time-mirror of an accel-shaped ramp built with
    /// the deceleration rate, so continuity at both ends holds by
    /// construction.
    fn eval_decel(&self, t: f32) -> (f32, f32, MotionPhase) {
        let remaining_t = self.t_decel - t;

        let (r, v, phase) = if self.jerk_time > 0.0 && remaining_t < self.jerk_time {
            let jerk = self.deceleration / self.jerk_time;
            let v = 0.5 * jerk * remaining_t * remaining_t;
            let r = jerk * remaining_t * remaining_t * remaining_t / 6.0;
            (r, v, MotionPhase::JerkDecel)
        } else {
            let (tau, v0, r0) = if self.jerk_time > 0.0 {
                let v1 = 0.5 * self.deceleration * self.jerk_time;
                let r1 = self.deceleration * self.jerk_time * self.jerk_time / 6.0;
                (remaining_t - self.jerk_time, v1, r1)
            } else {
                (remaining_t, 0.0, 0.0)
            };
            let v = v0 + self.deceleration * tau;
            let r = r0 + v0 * tau + 0.5 * self.deceleration * tau * tau;
            (r, v, MotionPhase::Decelerating)
        };

        // Subtraction order can swing the decelerating velocity past the
        // peak or below zero near the boundary; both are float error, not
        // motion state. Completion is decided by elapsed time alone.
        let v = if !(0.0..=self.peak_velocity).contains(&v) {
            0.0
        } else {
            v
        };

        (self.distance - r, v, phase)
    }

    /// Record the shared start timestamp.
    pub fn begin(&mut self, now_us: u64) {
        self.start_time_us = Some(now_us);
    }

    /// Elapsed seconds since `begin`, or `None` if not started.
    pub fn elapsed_secs(&self, now_us: u64) -> Option<f32> {
        self.start_time_us
            .map(|t0| now_us.saturating_sub(t0) as f32 / 1_000_000.0)
    }

    /// Whether the profile has been started.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.start_time_us.is_some()
    }

    /// Whether the elapsed time has consumed the whole profile.
    #[inline]
    pub fn is_complete(&self, elapsed: f32) -> bool {
        elapsed >= self.total_time
    }

    /// Profile shape.
    #[inline]
    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    /// Start position.
    #[inline]
    pub fn start_position(&self) -> Degrees {
        self.start
    }

    /// End position.
    #[inline]
    pub fn end_position(&self) -> Degrees {
        self.end
    }

    /// Velocity actually reached by the profile.
    #[inline]
    pub fn peak_velocity(&self) -> DegreesPerSec {
        DegreesPerSec(self.peak_velocity)
    }

    /// Total profile duration in seconds.
    #[inline]
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Displacement magnitude covered by each phase
    /// (accel, constant-velocity, decel).
    #[inline]
    pub fn phase_distances(&self) -> (f32, f32, f32) {
        (self.d_accel, self.d_const, self.d_decel)
    }

    /// Duration of each phase (accel, constant-velocity, decel).
    #[inline]
    pub fn phase_times(&self) -> (f32, f32, f32) {
        (self.t_accel, self.t_const, self.t_decel)
    }
}
