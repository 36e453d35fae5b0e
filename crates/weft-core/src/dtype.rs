//! Data Types - Weft Type System
//!
//! Defines the runtime data types carried by arrays and the `Element`
//! trait that binds Rust scalar types to them. Arithmetic in the CPU
//! evaluator runs in widened lanes (f64 / i64), so every element type
//! needs lossless-enough conversions in both directions.
//!
//! @version 0.1.0
//! @author Weft Development Team

use num_traits::NumCast;

// =============================================================================
// DType Enum
// =============================================================================

/// Runtime representation of array element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    /// Boolean type.
    Bool,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
}

impl DType {
    /// Returns the size in bytes of this data type.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Returns true if this is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns true if this is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::I32 | Self::I64)
    }

    /// Returns the name of this data type as a string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Returns the common type two operands promote to.
    ///
    /// The ordering is `Bool < I32 < I64 < F32 < F64`, so mixed
    /// integer/float arithmetic always lands on a float type.
    #[must_use]
    pub fn promote(a: Self, b: Self) -> Self {
        a.max(b)
    }

    /// Returns the default floating point type (f32).
    #[must_use]
    pub const fn default_float() -> Self {
        Self::F32
    }
}

impl Default for DType {
    fn default() -> Self {
        Self::F32
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Element Trait
// =============================================================================

/// Rust scalar types that can be stored in an array.
pub trait Element: Copy + Send + Sync + PartialEq + core::fmt::Debug + 'static {
    /// The runtime dtype corresponding to this Rust type.
    const DTYPE: DType;

    /// Widens this value to an f64 lane.
    fn to_f64(self) -> f64;

    /// Narrows an f64 lane back to this type.
    fn from_f64(v: f64) -> Self;
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn from_f64(v: f64) -> Self {
        v != 0.0
    }
}

macro_rules! impl_numeric_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Self {
                NumCast::from(v).unwrap_or_default()
            }
        }
    };
}

impl_numeric_element!(i32, DType::I32);
impl_numeric_element!(i64, DType::I64);
impl_numeric_element!(f32, DType::F32);
impl_numeric_element!(f64, DType::F64);

// =============================================================================
// Tests
// =============================================================================
