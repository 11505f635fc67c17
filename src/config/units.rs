//! Unit types for physical quantities.
//!
//! Provides type-safe representations of angles, velocities, and
//! accelerations, plus the validated motor index used throughout the core.

use core::ops::{Add, Mul, Sub};

use serde::Deserialize;

/// Number of motor slots in every fixed per-motor table.
pub const MAX_MOTORS: usize = 8;

/// Angular position in degrees.
///
/// The unit every configuration field and API surface speaks; sensor and
/// driver contracts use it too.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Degrees(pub f32);

impl Degrees {
    /// Wrap a raw degree value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Unwrap to the raw degree value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// Absolute angular distance to another position.
    #[inline]
    pub fn distance_to(self, other: Degrees) -> f32 {
        libm::fabsf(other.0 - self.0)
    }
}

impl Add for Degrees {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Degrees {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Angular velocity in degrees per second.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct DegreesPerSec(pub f32);

impl DegreesPerSec {
    /// Wrap a raw velocity value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Unwrap to the raw velocity value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// Magnitude of the velocity.
    #[inline]
    pub fn abs(self) -> f32 {
        libm::fabsf(self.0)
    }
}

impl Mul<f32> for DegreesPerSec {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Angular acceleration in degrees per second squared.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct DegreesPerSecSquared(pub f32);

impl DegreesPerSecSquared {
    /// Wrap a raw acceleration value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Unwrap to the raw acceleration value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Mul<f32> for DegreesPerSecSquared {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Validated index into the fixed per-motor tables.
///
/// A `MotorId` can only be constructed for an index below the configured
/// motor count, so table access through it is always in bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorId(u8);

impl MotorId {
    /// Create a motor id, checked against the number of configured motors.
    ///
    /// Returns `None` if `index >= count` or `count` exceeds [`MAX_MOTORS`].
    #[inline]
    pub fn new(index: u8, count: usize) -> Option<Self> {
        if (index as usize) < count && count <= MAX_MOTORS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Get the raw index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw index as u8.
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for MotorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "motor{}", self.0)
    }
}
