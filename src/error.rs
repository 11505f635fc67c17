//! Error types for the stepper-control library.
//!
//! Provides unified error handling across configuration, closed-loop control,
//! motion planning, coordination, safety, and scheduling.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-control operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Closed-loop control error
    Control(ControlError),
    /// Motion planning / target validation error
    Motion(MotionError),
    /// Multi-motor coordination error
    Coordination(CoordinationError),
    /// Position safety error
    Safety(SafetyError),
    /// Scheduler error
    Scheduler(SchedulerError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// More motors configured than the fixed motor table holds
    TooManyMotors(usize),
    /// Invalid gain value (must be finite and >= 0)
    InvalidGain {
        /// Gain field name
        field: &'static str,
        /// Offending value
        value: f32,
    },
    /// Invalid position filter coefficient (must be in (0, 1])
    InvalidFilterCoefficient(f32),
    /// Invalid max velocity (must be > 0)
    InvalidMaxVelocity(f32),
    /// Invalid max acceleration (must be > 0)
    InvalidMaxAcceleration(f32),
    /// Safety limits violate `hard_min <= soft_min < soft_max <= hard_max`
    InvalidSafetyLimits {
        /// Soft minimum in degrees
        soft_min: f32,
        /// Soft maximum in degrees
        soft_max: f32,
        /// Hard minimum in degrees
        hard_min: f32,
        /// Hard maximum in degrees
        hard_max: f32,
    },
    /// Invalid scheduler period or deadline in microseconds (must be > 0)
    InvalidPeriod(u32),
    /// Coordination config references a motor that does not exist
    UnknownSyncMaster(heapless::String<32>),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Closed-loop control errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Encoder read failed; no valid position this cycle
    EncoderFault,
    /// Driver command failed
    DriverFault,
    /// Controller is disabled
    NotEnabled,
    /// Position error exceeds the configured bound; output suppressed
    PositionErrorExcessive {
        /// Measured position error in degrees
        error: f32,
        /// Configured maximum in degrees
        max: f32,
    },
    /// Homing did not finish within its timeout
    HomingTimeout,
    /// A homing sequence is already running
    HomingActive,
}

/// Motion planning errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Requested target is outside the allowed position range
    PositionOutOfRange {
        /// Requested target in degrees
        target: f32,
        /// Minimum allowed position
        min: f32,
        /// Maximum allowed position
        max: f32,
    },
    /// Requested velocity exceeds the configured maximum
    VelocityOutOfRange {
        /// Requested velocity
        requested: f32,
        /// Maximum allowed velocity
        max: f32,
    },
    /// Requested acceleration exceeds the configured maximum
    AccelerationOutOfRange {
        /// Requested acceleration
        requested: f32,
        /// Maximum allowed acceleration
        max: f32,
    },
}

/// Multi-motor coordination errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinationError {
    /// A coordinated move is already running
    MotionActive,
    /// The command targets no enabled motor
    NoMotorsEnabled,
    /// Motor index outside the configured motor table
    InvalidMotor(u8),
}

/// Position safety errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyError {
    /// The commanded value was clamped; it was not honored as requested
    PositionLimitExceeded {
        /// Requested position in degrees
        requested: f32,
        /// Clamped position in degrees
        clamped: f32,
    },
    /// Emergency stop is latched; motion commands are refused
    EmergencyStopActive,
}

/// Scheduler errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// The fixed-size task table is full
    NoFreeSlots,
    /// Task id does not refer to a registered task
    InvalidTask(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Control(e) => write!(f, "Control error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
            Error::Coordination(e) => write!(f, "Coordination error: {}", e),
            Error::Safety(e) => write!(f, "Safety error: {}", e),
            Error::Scheduler(e) => write!(f, "Scheduler error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::TooManyMotors(n) => {
                write!(f, "{} motors configured, table holds at most 8", n)
            }
            ConfigError::InvalidGain { field, value } => {
                write!(f, "Invalid gain {}: {}. Must be finite and >= 0", field, value)
            }
            ConfigError::InvalidFilterCoefficient(v) => {
                write!(f, "Invalid filter coefficient: {}. Must be in (0, 1]", v)
            }
            ConfigError::InvalidMaxVelocity(v) => {
                write!(f, "Invalid max velocity: {}. Must be > 0", v)
            }
            ConfigError::InvalidMaxAcceleration(v) => {
                write!(f, "Invalid max acceleration: {}. Must be > 0", v)
            }
            ConfigError::InvalidSafetyLimits {
                soft_min,
                soft_max,
                hard_min,
                hard_max,
            } => write!(
                f,
                "Invalid safety limits: require hard_min ({}) <= soft_min ({}) < soft_max ({}) <= hard_max ({})",
                hard_min, soft_min, soft_max, hard_max
            ),
            ConfigError::InvalidPeriod(v) => {
                write!(f, "Invalid period/deadline: {} us. Must be > 0", v)
            }
            ConfigError::UnknownSyncMaster(name) => {
                write!(f, "Sync master '{}' is not a configured motor", name)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::EncoderFault => write!(f, "Encoder read failed"),
            ControlError::DriverFault => write!(f, "Driver command failed"),
            ControlError::NotEnabled => write!(f, "Controller is disabled"),
            ControlError::PositionErrorExcessive { error, max } => {
                write!(f, "Position error {} deg exceeds maximum {} deg", error, max)
            }
            ControlError::HomingTimeout => write!(f, "Homing timed out"),
            ControlError::HomingActive => write!(f, "Homing sequence already running"),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::PositionOutOfRange { target, min, max } => {
                write!(f, "Target position {} outside range [{}, {}]", target, min, max)
            }
            MotionError::VelocityOutOfRange { requested, max } => {
                write!(f, "Requested velocity {} exceeds maximum {}", requested, max)
            }
            MotionError::AccelerationOutOfRange { requested, max } => {
                write!(f, "Requested acceleration {} exceeds maximum {}", requested, max)
            }
        }
    }
}

impl fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinationError::MotionActive => write!(f, "A coordinated move is already active"),
            CoordinationError::NoMotorsEnabled => write!(f, "Command targets no enabled motor"),
            CoordinationError::InvalidMotor(id) => write!(f, "Invalid motor id {}", id),
        }
    }
}

impl fmt::Display for SafetyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyError::PositionLimitExceeded { requested, clamped } => {
                write!(f, "Requested position {} clamped to {}", requested, clamped)
            }
            SafetyError::EmergencyStopActive => write!(f, "Emergency stop is active"),
        }
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::NoFreeSlots => write!(f, "Task table is full"),
            SchedulerError::InvalidTask(id) => write!(f, "Invalid task id {}", id),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<ControlError> for Error {
    fn from(e: ControlError) -> Self {
        Error::Control(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

impl From<CoordinationError> for Error {
    fn from(e: CoordinationError) -> Self {
        Error::Coordination(e)
    }
}

impl From<SafetyError> for Error {
    fn from(e: SafetyError) -> Self {
        Error::Safety(e)
    }
}

impl From<SchedulerError> for Error {
    fn from(e: SchedulerError) -> Self {
        Error::Scheduler(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for ControlError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}

#[cfg(feature = "std")]
impl std::error::Error for CoordinationError {}

#[cfg(feature = "std")]
impl std::error::Error for SafetyError {}

#[cfg(feature = "std")]
impl std::error::Error for SchedulerError {}
