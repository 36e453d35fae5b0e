//! Evaluated Buffers
//!
//! Storage for materialized array contents. The evaluator computes in
//! widened f64 lanes and narrows back into the typed buffer matching
//! the array's dtype; `scalar_bits` exposes the raw bit pattern the
//! compiler uses to key scalar deduplication.
//!
//! @version 0.1.0
//! @author Weft Development Team

use weft_core::{DType, Element};

// =============================================================================
// Data Enum
// =============================================================================

/// A typed, materialized buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Boolean buffer.
    Bool(Vec<bool>),
    /// 32-bit signed integer buffer.
    I32(Vec<i32>),
    /// 64-bit signed integer buffer.
    I64(Vec<i64>),
    /// 32-bit float buffer.
    F32(Vec<f32>),
    /// 64-bit float buffer.
    F64(Vec<f64>),
}

impl Data {
    /// Returns the dtype of this buffer.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// Returns true if the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens the buffer into f64 lanes.
    #[must_use]
    pub fn to_f64_lanes(&self) -> Vec<f64> {
        match self {
            Self::Bool(v) => v.iter().map(|&x| x.to_f64()).collect(),
            Self::I32(v) => v.iter().map(|&x| x.to_f64()).collect(),
            Self::I64(v) => v.iter().map(|&x| x.to_f64()).collect(),
            Self::F32(v) => v.iter().map(|&x| x.to_f64()).collect(),
            Self::F64(v) => v.clone(),
        }
    }

    /// Narrows f64 lanes into a buffer of the given dtype.
    #[must_use]
    pub fn from_f64_lanes(dtype: DType, lanes: Vec<f64>) -> Self {
        match dtype {
            DType::Bool => Self::Bool(lanes.into_iter().map(bool::from_f64).collect()),
            DType::I32 => Self::I32(lanes.into_iter().map(i32::from_f64).collect()),
            DType::I64 => Self::I64(lanes.into_iter().map(i64::from_f64).collect()),
            DType::F32 => Self::F32(lanes.into_iter().map(f32::from_f64).collect()),
            DType::F64 => Self::F64(lanes),
        }
    }

    /// Returns element `idx` widened to f64.
    #[must_use]
    pub fn get_f64(&self, idx: usize) -> f64 {
        match self {
            Self::Bool(v) => v[idx].to_f64(),
            Self::I32(v) => v[idx].to_f64(),
            Self::I64(v) => v[idx].to_f64(),
            Self::F32(v) => v[idx].to_f64(),
            Self::F64(v) => v[idx],
        }
    }

    /// Returns the raw bit pattern of the first element, widened to 64
    /// bits. Together with the dtype this is the representative key for
    /// scalar deduplication.
    #[must_use]
    pub fn scalar_bits(&self) -> u64 {
        match self {
            Self::Bool(v) => u64::from(v[0]),
            Self::I32(v) => u64::from(v[0] as u32),
            Self::I64(v) => v[0] as u64,
            Self::F32(v) => u64::from(v[0].to_bits()),
            Self::F64(v) => v[0].to_bits(),
        }
    }
}

// =============================================================================
// ArrayElement Trait
// =============================================================================

/// Element types that can be wrapped into and borrowed out of a [`Data`]
/// buffer.
pub trait ArrayElement: Element {
    /// Wraps a vector of this type into a buffer.
    fn wrap(vec: Vec<Self>) -> Data;

    /// Borrows a typed slice out of a buffer, if the dtype matches.
    fn unwrap_ref(data: &Data) -> Option<&[Self]>;
}

macro_rules! impl_array_element {
    ($ty:ty, $variant:ident) => {
        impl ArrayElement for $ty {
            fn wrap(vec: Vec<Self>) -> Data {
                Data::$variant(vec)
            }

            fn unwrap_ref(data: &Data) -> Option<&[Self]> {
                match data {
                    Data::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_array_element!(bool, Bool);
impl_array_element!(i32, I32);
impl_array_element!(i64, I64);
impl_array_element!(f32, F32);
impl_array_element!(f64, F64);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_round_trip() {
        let d = Data::F32(vec![1.5, -2.0]);
        let lanes = d.to_f64_lanes();
        assert_eq!(lanes, vec![1.5, -2.0]);
        assert_eq!(Data::from_f64_lanes(DType::F32, lanes), d);
    }

    #[test]
    fn test_narrowing_to_bool() {
        let d = Data::from_f64_lanes(DType::Bool, vec![0.0, 1.0, 2.0]);
        assert_eq!(d, Data::Bool(vec![false, true, true]));
    }

    #[test]
    fn test_scalar_bits_distinguish_dtypes() {
        let f = Data::F32(vec![2.0]);
        let i = Data::I32(vec![2]);
        // Same value, different bit patterns.
        assert_ne!(f.scalar_bits(), i.scalar_bits());
        // Identical constants share a key.
        assert_eq!(f.scalar_bits(), Data::F32(vec![2.0]).scalar_bits());
    }

    #[test]
    fn test_wrap_unwrap() {
        let d = f32::wrap(vec![1.0, 2.0]);
        assert_eq!(f32::unwrap_ref(&d), Some(&[1.0f32, 2.0][..]));
        assert_eq!(i32::unwrap_ref(&d), None);
    }
}
