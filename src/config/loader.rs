//! Configuration loading from files (std only).

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Error, Result};

use super::SystemConfig;

fn truncated(message: &str) -> heapless::String<128> {
    let mut out = heapless::String::new();
    for ch in message.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Load and validate a system configuration from a TOML file.
///
/// # Errors
///
/// `IoError` if the file cannot be read, `ParseError` on malformed TOML,
/// or any validation failure from [`validate_config`](super::validate_config).
///
/// # Example
///
/// ```rust,ignore
/// use stepper_control::load_config;
///
/// let config = load_config("control.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SystemConfig> {
    match fs::read_to_string(path.as_ref()) {
        Ok(content) => parse_config(&content),
        Err(e) => Err(Error::Config(ConfigError::IoError(truncated(
            &e.to_string(),
        )))),
    }
}

/// Parse and validate a system configuration from a TOML string.
///
/// # Errors
///
/// `ParseError` on malformed TOML, or any validation failure.
pub fn parse_config(content: &str) -> Result<SystemConfig> {
    let config = toml::from_str::<SystemConfig>(content)
        .map_err(|e| Error::Config(ConfigError::ParseError(truncated(e.message()))))?;
    super::validation::validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[motors.azimuth]
name = "Azimuth"

[motors.azimuth.limits]
max_position_error_deg = 10.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0
"#;

        let config = parse_config(toml).unwrap();
        assert!(config.motor("azimuth").is_some());
        assert_eq!(config.motor_count(), 1);
    }

    #[test]
    fn test_parse_with_gains_and_safety() {
        let toml = r#"
[motors.azimuth]
name = "Azimuth"

[motors.azimuth.gains]
kp = 2.0
ki = 0.1
kd = 0.05
kvff = 1.0

[motors.azimuth.limits]
max_position_error_deg = 10.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0

[motors.azimuth.safety]
soft_min_deg = -170.0
soft_max_deg = 170.0
hard_min_deg = -180.0
hard_max_deg = 180.0
"#;

        let config = parse_config(toml).unwrap();
        let motor = config.motor("azimuth").unwrap();
        assert!((motor.gains.kp - 2.0).abs() < 1e-6);
        assert!((motor.safety.soft_max.0 - 170.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rejects_bad_safety_ordering() {
        let toml = r#"
[motors.azimuth]
name = "Azimuth"

[motors.azimuth.limits]
max_position_error_deg = 10.0
max_velocity_deg_per_sec = 360.0
max_acceleration_deg_per_sec2 = 720.0

[motors.azimuth.safety]
soft_min_deg = -190.0
soft_max_deg = 170.0
hard_min_deg = -180.0
hard_max_deg = 180.0
"#;

        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn test_parse_error_carries_message() {
        match parse_config("motors = 3") {
            Err(Error::Config(ConfigError::ParseError(msg))) => assert!(!msg.is_empty()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
