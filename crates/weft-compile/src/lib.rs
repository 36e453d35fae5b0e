//! Weft Compile - Tracing JIT Graph Compiler
//!
//! Compiles functions over lazy arrays: the function runs once on
//! placeholder inputs to capture its computation graph, the captured
//! tape is rewritten in place (scalar deduplication, common
//! subexpression fusion, elementwise region fusion), and the result is
//! cached per function identity and input signature. Later calls
//! replay the rewritten tape against fresh inputs without re-tracing.
//!
//! # Example
//! ```
//! use weft_array::{ops, Array};
//! use weft_compile::compile;
//!
//! fn fun(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
//!     let y = ops::add(&inputs[0], &inputs[1])?;
//!     Ok(vec![ops::multiply(&ops::exp(&y), &y)?])
//! }
//!
//! let compiled = compile(fun).unwrap();
//! let x = Array::from_slice(&[0.0f32, 1.0], &[2]).unwrap();
//! let y = Array::from_slice(&[1.0f32, 0.5], &[2]).unwrap();
//! let out = compiled.call(&[x, y]).unwrap();
//! assert_eq!(out.len(), 1);
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

pub mod cache;
pub mod classify;
pub mod compile;
pub mod error;
pub mod partition;
pub mod replace;
pub mod simplify;
pub mod trace;
pub mod walk;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{compiler_cache, CacheEntry, CompilerCache, FunId};
pub use classify::{is_binary, is_broadcast, is_fusable, is_unary};
pub use compile::{
    compile, compile_erase, compile_with_options, compiler_disabled, disable_compile,
    enable_compile, stats, CompileOptions, CompileStats, CompiledFunction,
    DEFAULT_MAX_REGION_SIZE, DEFAULT_SIMPLIFY_PASSES,
};
pub use error::{CompileError, CompileResult};
pub use trace::{in_tracing, trace_count};
pub use walk::ParentsMap;
