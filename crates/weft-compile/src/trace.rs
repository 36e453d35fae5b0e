//! Tracing
//!
//! Runs a user function on placeholder inputs to capture its graph.
//! The process-wide tracing flag is held for exactly the duration of
//! the user function via an RAII guard, so it is released on every
//! exit path, including a failing trace.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use weft_array::Array;

use crate::error::{CompileError, CompileResult};

// =============================================================================
// Tracing Flag
// =============================================================================

static TRACING_DEPTH: AtomicUsize = AtomicUsize::new(0);
static TRACE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Whether a trace is currently running on this process.
#[must_use]
pub fn in_tracing() -> bool {
    TRACING_DEPTH.load(Ordering::Relaxed) > 0
}

/// The cumulative number of traces this process has run. Each cache
/// miss costs exactly one trace, so this is the hook tests use to
/// verify trace-once behavior.
#[must_use]
pub fn trace_count() -> usize {
    TRACE_COUNT.load(Ordering::Relaxed)
}

/// RAII guard over the process-wide tracing flag.
struct TracingGuard;

impl TracingGuard {
    fn new() -> Self {
        TRACING_DEPTH.fetch_add(1, Ordering::Relaxed);
        Self
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        TRACING_DEPTH.fetch_sub(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Trace
// =============================================================================

/// Runs `fun` on placeholders mirroring the shapes and dtypes of
/// `inputs`, returning the placeholder inputs and the captured
/// placeholder outputs.
///
/// A failure inside `fun` propagates as
/// [`CompileError::UserFunction`]; the tracing flag is cleared either
/// way.
pub fn trace_graph<F>(fun: &F, inputs: &[Array]) -> CompileResult<(Vec<Array>, Vec<Array>)>
where
    F: Fn(&[Array]) -> weft_core::Result<Vec<Array>>,
{
    let _guard = TracingGuard::new();
    TRACE_COUNT.fetch_add(1, Ordering::Relaxed);
    debug!(inputs = inputs.len(), "tracing function");

    let placeholders: Vec<Array> = inputs
        .iter()
        .map(|a| Array::placeholder(a.shape().to_vec(), a.dtype()))
        .collect();

    let outputs =
        fun(&placeholders).map_err(|source| CompileError::UserFunction { source })?;
    Ok((placeholders, outputs))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_array::ops;
    use weft_core::DType;

    #[test]
    fn test_trace_mirrors_signature() {
        let x = Array::from_slice(&[1.0f32, 2.0, 3.0], &[3]).unwrap();
        let fun = |ins: &[Array]| Ok(vec![ops::negative(&ins[0])]);
        let (trace_ins, trace_outs) = trace_graph(&fun, &[x]).unwrap();

        assert_eq!(trace_ins.len(), 1);
        assert_eq!(trace_ins[0].shape(), &[3]);
        assert_eq!(trace_ins[0].dtype(), DType::F32);
        assert!(trace_ins[0].is_tracer());
        assert!(!trace_ins[0].is_evaled());

        assert_eq!(trace_outs.len(), 1);
        assert!(trace_outs[0].is_tracer());
        assert_eq!(trace_outs[0].input(0).id(), trace_ins[0].id());
    }

    #[test]
    fn test_flag_cleared_after_trace() {
        let x = Array::scalar(1.0f32);
        let fun = |ins: &[Array]| Ok(vec![ins[0].clone()]);
        assert!(!in_tracing());
        trace_graph(&fun, &[x]).unwrap();
        assert!(!in_tracing());
    }

    #[test]
    fn test_flag_set_during_trace() {
        let x = Array::scalar(1.0f32);
        let fun = |ins: &[Array]| {
            assert!(in_tracing());
            Ok(vec![ins[0].clone()])
        };
        trace_graph(&fun, &[x]).unwrap();
    }

    #[test]
    fn test_user_failure_clears_flag() {
        let x = Array::scalar(1.0f32);
        let fun = |_: &[Array]| -> weft_core::Result<Vec<Array>> {
            Err(weft_core::Error::invalid_operation("boom"))
        };
        let err = trace_graph(&fun, &[x]).unwrap_err();
        assert!(matches!(err, CompileError::UserFunction { .. }));
        assert!(!in_tracing());
    }

    #[test]
    fn test_trace_count_increments() {
        let before = trace_count();
        let x = Array::scalar(1.0f32);
        let fun = |ins: &[Array]| Ok(vec![ins[0].clone()]);
        trace_graph(&fun, &[x]).unwrap();
        assert_eq!(trace_count(), before + 1);
    }
}
