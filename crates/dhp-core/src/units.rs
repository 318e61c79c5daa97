//! Compile-time unit safety for planning quantities.
//!
//! Prevents mixing incompatible quantities like metric lengths and annual
//! energy demands.
//!
//! # Design Philosophy
//!
//! District-heating planning mixes two families of numbers that are easy to
//! confuse when everything is a bare `f64`: distances along and around the
//! street network (meters) and annual building demands (kilowatt-hours).
//! Summing a connector length into a demand total is a silent planning error;
//! with newtype wrappers it is a compile error.
//!
//! # Zero Runtime Overhead
//!
//! All types use `#[repr(transparent)]` ensuring they have the same memory
//! layout as `f64`. The compiler optimizes away all wrapper overhead.
//!
//! # Usage
//!
//! ```
//! use dhp_core::units::{KilowattHours, Meters};
//!
//! let spur = Meters(18.5);
//! let total = spur + Meters(3.0);
//! assert!(total.value() > 21.0);
//!
//! let heat = KilowattHours(12_000.0);
//! // Energetic factor: demand per meter of network distance.
//! let factor = heat.per_meter(Meters(250.0));
//! assert!((factor - 48.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Mul<$type> for f64 {
            type Output = $type;
            fn mul(self, rhs: $type) -> Self::Output {
                <$type>::new(self * rhs.0)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.2} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Absolute value
            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// Minimum of two values
            #[inline]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            /// Maximum of two values
            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Length in meters (m)
///
/// Street-segment lengths, projection offsets, and network path distances are
/// all planar distances in a local metric map projection.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Meters(pub f64);

impl_unit_ops!(Meters, "m");

/// Annual energy in kilowatt-hours (kWh)
///
/// Building demand attributes (space heating, hot water, electricity) are
/// annual sums as produced by the upstream demand simulation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct KilowattHours(pub f64);

impl_unit_ops!(KilowattHours, "kWh");

impl KilowattHours {
    /// Energetic factor: demand per meter of network distance (kWh/m).
    ///
    /// Used to rank buildings for eviction when a cluster overflows; a zero
    /// or near-zero distance means the building sits at the cluster center
    /// and the factor is unbounded.
    #[inline]
    pub fn per_meter(self, distance: Meters) -> f64 {
        if distance.0.abs() < 1e-12 {
            f64::INFINITY
        } else {
            self.0 / distance.0
        }
    }
}
