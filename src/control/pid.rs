//! PID and feedforward terms for the position loop.

use crate::config::ControlGains;

/// PID term with clamped integral accumulator.
///
/// Derivative acts on the error delta, integral windup is prevented by a
/// hard clamp at `integral_limit`.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    integral_limit: f32,
    integral: f32,
    prev_error: Option<f32>,
}

impl Pid {
    /// Create from the configured gain set.
    pub fn new(gains: &ControlGains) -> Self {
        Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            integral_limit: gains.integral_limit,
            integral: 0.0,
            prev_error: None,
        }
    }

    /// Clear the accumulator and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// One control step. `dt` is the tick interval in seconds.
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let p = self.kp * error;

        if dt > 0.0 {
            self.integral += error * dt;
            self.integral = self
                .integral
                .clamp(-self.integral_limit, self.integral_limit);
        }
        let i = self.ki * self.integral;

        let d = match self.prev_error {
            Some(prev) if dt > 0.0 => self.kd * (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        p + i + d
    }

    /// Current integral accumulator value.
    #[inline]
    pub fn integral(&self) -> f32 {
        self.integral
    }
}

/// Feedforward term fed by the planned trajectory, not by error.
#[derive(Debug, Clone)]
pub struct Feedforward {
    kvff: f32,
    kaff: f32,
    friction: f32,
    prev_target_velocity: f32,
}

impl Feedforward {
    /// Create from the configured gain set.
    pub fn new(gains: &ControlGains) -> Self {
        Self {
            kvff: gains.kvff,
            kaff: gains.kaff,
            friction: gains.friction,
            prev_target_velocity: 0.0,
        }
    }

    /// Clear the acceleration-estimate history.
    pub fn reset(&mut self) {
        self.prev_target_velocity = 0.0;
    }

    /// One control step from the trajectory's instantaneous target velocity.
    pub fn update(&mut self, target_velocity: f32, dt: f32) -> f32 {
        let target_accel = if dt > 0.0 {
            (target_velocity - self.prev_target_velocity) / dt
        } else {
            0.0
        };
        self.prev_target_velocity = target_velocity;

        let mut out = self.kvff * target_velocity + self.kaff * target_accel;
        if target_velocity > 0.0 {
            out += self.friction;
        } else if target_velocity < 0.0 {
            out -= self.friction;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains(kp: f32, ki: f32, kd: f32) -> ControlGains {
        ControlGains {
            kp,
            ki,
            kd,
            integral_limit: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = Pid::new(&gains(2.0, 0.0, 0.0));
        assert_eq!(pid.update(3.0, 0.01), 6.0);
    }

    #[test]
    fn test_integral_clamped() {
        let mut pid = Pid::new(&gains(0.0, 1.0, 0.0));
        for _ in 0..10_000 {
            pid.update(100.0, 0.01);
        }
        assert!(pid.integral() <= 10.0);

        for _ in 0..20_000 {
            pid.update(-100.0, 0.01);
        }
        assert!(pid.integral() >= -10.0);
    }

    #[test]
    fn test_derivative_skips_first_sample() {
        let mut pid = Pid::new(&gains(0.0, 0.0, 1.0));
        // No history yet: derivative contributes nothing.
        assert_eq!(pid.update(5.0, 0.01), 0.0);
        // (6 - 5) / 0.01 = 100
        assert!((pid.update(6.0, 0.01) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = Pid::new(&gains(0.0, 1.0, 1.0));
        pid.update(5.0, 0.01);
        pid.update(6.0, 0.01);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.update(1.0, 0.01), 0.0 + 1.0 * 0.01 * 1.0);
    }

    #[test]
    fn test_friction_sign_follows_target_velocity() {
        let g = ControlGains {
            friction: 0.5,
            ..Default::default()
        };
        let mut ff = Feedforward::new(&g);
        assert_eq!(ff.update(10.0, 0.01), 0.5);
        assert_eq!(ff.update(-10.0, 0.01), -0.5);
        assert_eq!(ff.update(0.0, 0.01), 0.0);
    }

    #[test]
    fn test_velocity_and_accel_feedforward() {
        let g = ControlGains {
            kvff: 1.0,
            kaff: 0.1,
            ..Default::default()
        };
        let mut ff = Feedforward::new(&g);
        // First step: accel estimate (10 - 0) / 0.1 = 100
        let out = ff.update(10.0, 0.1);
        assert!((out - (10.0 + 10.0)).abs() < 1e-3);
        // Steady velocity: accel term vanishes
        let out = ff.update(10.0, 0.1);
        assert!((out - 10.0).abs() < 1e-3);
    }
}
