//! Weft Core - Foundation Layer for the Weft Tensor Compiler
//!
//! This crate provides the shared abstractions underneath the Weft graph
//! compiler: runtime data types, error handling, execution streams, and
//! the process-wide memory allocator.
//!
//! # Key Features
//! - Runtime dtype information via the `DType` enum
//! - Type-safe scalar conversions via the `Element` trait
//! - Execution stream tags used to place primitives on devices
//! - Global allocator singleton with system memory statistics
//!
//! @version 0.1.0
//! @author Weft Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

// =============================================================================
// Modules
// =============================================================================

pub mod allocator;
pub mod device;
pub mod dtype;
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

pub use allocator::{allocator, DefaultAllocator};
pub use device::{default_stream, Device, Stream};
pub use dtype::{DType, Element};
pub use error::{Error, Result};

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::device::{default_stream, Device, Stream};
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result};
}
