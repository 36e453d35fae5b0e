//! Compiler Error Types
//!
//! Error handling for the graph compiler. Invariant violations are
//! bugs: the compiler never silently continues past a broken tape or
//! parents map, and it never retries - retry is the caller's concern.
//!
//! @version 0.1.0
//! @author Weft Development Team

use thiserror::Error;

/// Result type for compiler operations.
pub type CompileResult<T> = core::result::Result<T, CompileError>;

/// Graph compiler errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The callable carries captured state, so its type identity cannot
    /// key the cache deterministically.
    #[error(
        "cannot compile a non-addressable function; \
         pass a fn item or a non-capturing closure"
    )]
    NonAddressableFunction,

    /// A cached entry for this function was built with a different
    /// number of inputs. This is a host-level bug.
    #[error("function was compiled with {expected} inputs but called with {actual}")]
    InputCountMismatch {
        /// Input count the cache entry was built with.
        expected: usize,
        /// Input count of the current call.
        actual: usize,
    },

    /// The user function failed while being traced.
    #[error("user function failed during tracing")]
    UserFunction {
        /// The underlying failure.
        #[source]
        source: weft_core::Error,
    },

    /// A rewrite invariant was violated. Always a compiler bug.
    #[error("compiler invariant violated: {message}")]
    Invariant {
        /// Which invariant broke, and where.
        message: String,
    },

    /// An array-layer operation failed inside the compiler.
    #[error(transparent)]
    Array(#[from] weft_core::Error),
}

impl CompileError {
    /// Creates an invariant-violation error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
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
    fn test_display() {
        let err = CompileError::InputCountMismatch {
            expected: 2,
            actual: 3,
        };
        assert!(err.to_string().contains("2 inputs"));

        let err = CompileError::invariant("parents map out of sync");
        assert!(err.to_string().contains("parents map"));
    }

    #[test]
    fn test_array_error_conversion() {
        let core_err = weft_core::Error::invalid_operation("bad");
        let err: CompileError = core_err.clone().into();
        assert_eq!(err, CompileError::Array(core_err));
    }
}
