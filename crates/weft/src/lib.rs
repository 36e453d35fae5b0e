//! # Weft - A Tracing JIT Graph Compiler for Lazy Tensor Graphs
//!
//! Weft compiles functions over lazy arrays. A wrapped function runs
//! once on symbolic placeholders to capture its computation graph;
//! the captured tape is rewritten through a fixed pipeline - scalar
//! deduplication, common subexpression fusion, and elementwise region
//! fusion into `Compiled` nodes - and cached per function identity
//! and input signature. Every later call with a matching signature
//! replays the rewritten tape against fresh inputs.
//!
//! ## Core Pieces
//!
//! - **Arrays** (`weft-array`): immutable lazy handles recording the
//!   primitive that produces them, with a CPU evaluator
//! - **Compiler** (`weft-compile`): tracer, graph walker, simplifier,
//!   fusion partitioner, replayer, and the process-global cache
//! - **Core** (`weft-core`): dtypes, errors, streams, and the
//!   allocator singleton
//!
//! # Quick Start
//!
//! ```
//! use weft::prelude::*;
//!
//! fn silu_like(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
//!     let x = &inputs[0];
//!     Ok(vec![ops::multiply(x, &ops::sigmoid(x))?])
//! }
//!
//! let fun = compile(silu_like).unwrap();
//! let x = Array::from_slice(&[0.0f32, 1.0, -1.0], &[3]).unwrap();
//! // First call traces and rewrites; later calls replay the tape.
//! let out = fun.call(&[x]).unwrap();
//! assert_eq!(out.len(), 1);
//! ```
//!
//! @version 0.1.0
//! @author Weft Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use weft_array::{eval, ops, Array, ArrayId, CompiledKernel, Data, Op, Primitive};
pub use weft_compile::{
    compile, compile_erase, compile_with_options, compiler_cache, disable_compile,
    enable_compile, is_binary, is_broadcast, is_fusable, is_unary, stats, CompileError,
    CompileOptions, CompileResult, CompiledFunction, FunId,
};
pub use weft_core::{allocator, default_stream, DType, Device, Element, Error, Result, Stream};

/// Convenient imports for common usage.
pub mod prelude {
    pub use weft_array::{ops, Array};
    pub use weft_compile::{
        compile, compile_with_options, disable_compile, enable_compile, CompileOptions,
    };
    pub use weft_core::{DType, Stream};
}
