//! Replay
//!
//! Substitutes real inputs for the placeholders of a cached tape and
//! rebuilds a live graph, reusing the tape's primitive instances. The
//! first mapping recorded for an identity wins; tape entries that were
//! already seeded (re-emitted placeholders) are not rebuilt, and
//! primitive-less entries stand for themselves.
//!
//! @version 0.1.0
//! @author Weft Development Team

use rustc_hash::FxHashMap;

use weft_core::DType;
use weft_array::{Array, ArrayId};

use crate::error::{CompileError, CompileResult};

/// Rebuilds `tape` against `inputs` and returns the real counterparts
/// of `trace_outputs`.
pub fn replace_tape(
    tape: &[Array],
    trace_inputs: &[Array],
    trace_outputs: &[Array],
    inputs: &[Array],
) -> CompileResult<Vec<Array>> {
    let mut trace_to_real: FxHashMap<ArrayId, Array> = FxHashMap::default();
    for (trace_in, real_in) in trace_inputs.iter().zip(inputs) {
        trace_to_real
            .entry(trace_in.id())
            .or_insert_with(|| real_in.clone());
    }

    for a in tape {
        if trace_to_real.contains_key(&a.id()) {
            continue;
        }
        if !a.has_primitive() {
            // Constants participate directly.
            trace_to_real.insert(a.id(), a.clone());
            continue;
        }
        let primitive = a.primitive().ok_or_else(|| {
            CompileError::invariant("primitive disappeared during replay")
        })?;
        let real_inputs = a
            .inputs()
            .iter()
            .map(|input| {
                trace_to_real.get(&input.id()).cloned().ok_or_else(|| {
                    CompileError::invariant(format!(
                        "tape entry consumes {} before it is defined",
                        input.id()
                    ))
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;

        let trace_group = a.outputs();
        if trace_group.len() == 1 {
            let real = Array::new(
                a.shape().to_vec(),
                a.dtype(),
                Some(primitive),
                real_inputs,
            );
            trace_to_real.insert(a.id(), real);
        } else {
            // Multi-output primitives rebuild as a group so sibling
            // order is preserved.
            let shapes: Vec<Vec<usize>> =
                trace_group.iter().map(|o| o.shape().to_vec()).collect();
            let dtypes: Vec<DType> = trace_group.iter().map(Array::dtype).collect();
            let real_group = Array::make_arrays(shapes, dtypes, primitive, real_inputs);
            for (trace_out, real_out) in trace_group.iter().zip(real_group) {
                trace_to_real
                    .entry(trace_out.id())
                    .or_insert(real_out);
            }
        }
    }

    trace_outputs
        .iter()
        .map(|o| {
            trace_to_real.get(&o.id()).cloned().ok_or_else(|| {
                CompileError::invariant(format!(
                    "declared output {} is unreachable from the tape",
                    o.id()
                ))
            })
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
