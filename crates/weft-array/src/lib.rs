//! Weft Array - Lazy Array Graphs
//!
//! This crate provides the array layer the Weft graph compiler operates
//! on: immutable array handles that record the operation producing them,
//! the closed set of primitive operations, and a CPU evaluator that
//! walks a recorded graph and materializes buffers.
//!
//! Arrays are lazy. Calling an op constructor builds a new node pointing
//! at its inputs; nothing computes until [`eval`] (or a convenience
//! accessor such as [`Array::to_vec_f64`]) forces the graph.
//!
//! # Example
//! ```
//! use weft_array::{ops, Array};
//!
//! let x = Array::from_slice(&[1.0f32, 4.0, 9.0], &[3]).unwrap();
//! let y = ops::sqrt(&x);
//! assert_eq!(y.to_vec_f64().unwrap(), vec![1.0, 2.0, 3.0]);
//! ```
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

pub mod array;
pub mod compiled;
pub mod data;
pub mod eval;
pub mod op;
pub mod ops;

// =============================================================================
// Re-exports
// =============================================================================

pub use array::{Array, ArrayId};
pub use compiled::CompiledKernel;
pub use data::{ArrayElement, Data};
pub use eval::eval;
pub use op::{Op, Primitive};
