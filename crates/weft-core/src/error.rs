//! Error Types - Weft Core Error Handling
//!
//! Provides the shared error type used by the array layer and the
//! evaluator. The graph compiler has its own error enum in
//! `weft-compile` that wraps this one.
//!
//! @version 0.1.0
//! @author Weft Development Team

use thiserror::Error;

use crate::dtype::DType;

// =============================================================================
// Error Types
// =============================================================================

/// The main error type for array and evaluator operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Shape mismatch between arrays.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Data type mismatch between arrays.
    #[error("DType mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// The expected data type.
        expected: DType,
        /// The actual data type.
        actual: DType,
    },

    /// Broadcasting failed between shapes.
    #[error("Cannot broadcast shapes {shape1:?} and {shape2:?}")]
    BroadcastError {
        /// The first shape.
        shape1: Vec<usize>,
        /// The second shape.
        shape2: Vec<usize>,
    },

    /// Invalid operation for the given arrays.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Operation not implemented.
    #[error("Not implemented: {op}")]
    NotImplemented {
        /// The unimplemented operation.
        op: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

// =============================================================================
// Result Type
// =============================================================================

/// A specialized Result type for Weft operations.
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// Helper Functions
// =============================================================================

impl Error {
    /// Creates a new shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a new invalid operation error.
    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a new not-implemented error.
    #[must_use]
    pub fn not_implemented(op: impl Into<String>) -> Self {
        Self::NotImplemented { op: op.into() }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::shape_mismatch(&[2, 3], &[2, 4]);
        assert!(err.to_string().contains("Shape mismatch"));

        let err = Error::not_implemented("Compiled::vjp");
        assert!(err.to_string().contains("Compiled::vjp"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = Error::invalid_operation("bad");
        let err2 = Error::invalid_operation("bad");
        assert_eq!(err1, err2);
    }
}
