//! # stepper-control
//!
//! Real-time motion control core for multi-axis stepper motor controllers.
//!
//! ## Features
//!
//! - **Deterministic scheduling**: fixed-table priority scheduler driven by
//!   two periodic tick sources, with deadline/jitter/overrun accounting
//! - **Motion profiles**: trapezoidal and jerk-limited S-curve trajectories
//!   evaluated as pure functions of elapsed time
//! - **Closed-loop control**: per-motor PID with anti-windup plus
//!   velocity/acceleration/friction feedforward
//! - **Multi-motor coordination**: independent, synchronized, load-sharing,
//!   and master/slave modes
//! - **Position safety**: layered soft/hard limits and runaway detection
//!   escalating from controlled stop to emergency stop
//! - **Configuration-driven**: motors, gains, limits, and rates from TOML
//! - **no_std compatible**: core library works without the standard library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_control::{ControlSystem, ProfileKind, MotionLimits};
//!
//! // Load configuration from TOML
//! let config = stepper_control::load_config("control.toml")?;
//!
//! // Wire the hardware collaborators (sensor, driver, fault sink)
//! let mut system = ControlSystem::new(config, encoder, driver, faults)?;
//!
//! let azimuth = system.motor_id_by_name("Azimuth").unwrap();
//! system.enable_motor(azimuth)?;
//! system.move_motor(azimuth, target, limits, ProfileKind::Trapezoidal, now_us)?;
//!
//! // Periodic interrupt handlers drive the core:
//! system.poll_safety(&mut clock);   // fast source, Critical class
//! system.poll_control(&mut clock);  // control source, High/Normal/Low
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O and TOML parsing
//! - `alloc`: Enables heap allocation for no_std with allocator
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod config;
pub mod control;
pub mod coordination;
pub mod error;
pub mod hal;
pub mod motion;
pub mod safety;
pub mod scheduler;
pub mod system;

// Re-exports for ergonomic API
pub use config::{validate_config, MotorConfig, SafetyConfig, SystemConfig};
pub use control::{ControllerState, HomingMethod, MotorStatus, PositionController};
pub use coordination::{
    CoordinatedMoveCommand, CoordinationMode, CoordinationStatus, Coordinator, MotorTarget,
};
pub use error::{Error, Result};
pub use hal::{Clock, Direction, FaultHandler, MotorDriver, PositionSensor};
pub use motion::{MotionLimits, MotionPhase, ProfileKind, Trajectory};
pub use safety::{PositionSafetyMonitor, SafetyAction, SafetyStatus, ViolationKind};
pub use scheduler::{Priority, Scheduler, SchedulerStats, TaskConfig, TickNotifier};
pub use system::{ControlSystem, CoreTask};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{Degrees, DegreesPerSec, DegreesPerSecSquared, MotorId, MAX_MOTORS};
