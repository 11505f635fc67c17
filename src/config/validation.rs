//! Configuration validation.

use crate::error::{ConfigError, Error, Result};

use super::units::MAX_MOTORS;
use super::SystemConfig;

/// Validate a system configuration.
///
/// Checks:
/// - Motor count fits the fixed per-motor tables
/// - Gains are finite and non-negative
/// - Control limits and filter coefficient are in range
/// - Safety limit ordering `hard_min <= soft_min < soft_max <= hard_max`
/// - Scheduler periods are non-zero
/// - Coordination sync master names an existing motor
pub fn validate_config(config: &SystemConfig) -> Result<()> {
    if config.motors.len() > MAX_MOTORS {
        return Err(Error::Config(ConfigError::TooManyMotors(config.motors.len())));
    }

    for (name, motor) in config.motors.iter() {
        validate_motor(name.as_str(), motor)?;
    }

    validate_scheduler(&config.scheduler)?;

    if let Some(ref master) = config.coordination.sync_master {
        if config.motor(master.as_str()).is_none() {
            return Err(Error::Config(ConfigError::UnknownSyncMaster(master.clone())));
        }
    }

    Ok(())
}

fn validate_motor(_name: &str, config: &super::MotorConfig) -> Result<()> {
    let gains = [
        ("kp", config.gains.kp),
        ("ki", config.gains.ki),
        ("kd", config.gains.kd),
        ("integral_limit", config.gains.integral_limit),
        ("kvff", config.gains.kvff),
        ("kaff", config.gains.kaff),
        ("friction", config.gains.friction),
    ];
    for (field, value) in gains {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Config(ConfigError::InvalidGain { field, value }));
        }
    }

    if config.filter_coefficient <= 0.0 || config.filter_coefficient > 1.0 {
        return Err(Error::Config(ConfigError::InvalidFilterCoefficient(
            config.filter_coefficient,
        )));
    }

    if config.limits.max_velocity.0 <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidMaxVelocity(
            config.limits.max_velocity.0,
        )));
    }

    if config.limits.max_acceleration.0 <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidMaxAcceleration(
            config.limits.max_acceleration.0,
        )));
    }

    if !config.safety.is_valid() {
        return Err(Error::Config(ConfigError::InvalidSafetyLimits {
            soft_min: config.safety.soft_min.0,
            soft_max: config.safety.soft_max.0,
            hard_min: config.safety.hard_min.0,
            hard_max: config.safety.hard_max.0,
        }));
    }

    Ok(())
}

fn validate_scheduler(config: &super::SchedulerConfig) -> Result<()> {
    for period in [
        config.control_period_us,
        config.safety_period_us,
        config.coordination_period_us,
    ] {
        if period == 0 {
            return Err(Error::Config(ConfigError::InvalidPeriod(period)));
        }
    }
    Ok(())
}
