//! Compiled Regions
//!
//! A [`CompiledKernel`] is the primitive synthesized by the graph
//! compiler for a fused region: it captures the region's trace-time
//! input arrays, output arrays, and the contiguous sub-tape it
//! replaces. The kernel exposes the regular primitive surface; actual
//! kernel synthesis is left to the runtime, which here means the
//! sub-tape is rebuilt against real inputs and interpreted.
//!
//! @version 0.1.0
//! @author Weft Development Team

use rustc_hash::FxHashMap;

use weft_core::{DType, Error, Result, Stream};

use crate::array::{Array, ArrayId};

// =============================================================================
// CompiledKernel
// =============================================================================

/// A fused sub-tape captured behind a single primitive.
#[derive(Debug)]
pub struct CompiledKernel {
    stream: Stream,
    inputs: Vec<Array>,
    outputs: Vec<Array>,
    tape: Vec<Array>,
}

impl CompiledKernel {
    /// Creates a kernel from a captured region.
    #[must_use]
    pub fn new(stream: Stream, inputs: Vec<Array>, outputs: Vec<Array>, tape: Vec<Array>) -> Self {
        Self {
            stream,
            inputs,
            outputs,
            tape,
        }
    }

    /// The stream every primitive in the region runs on.
    #[must_use]
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// The captured trace-time inputs, in the order real inputs are
    /// bound to them.
    #[must_use]
    pub fn inputs(&self) -> &[Array] {
        &self.inputs
    }

    /// The captured trace-time outputs.
    #[must_use]
    pub fn outputs(&self) -> &[Array] {
        &self.outputs
    }

    /// The captured sub-tape.
    #[must_use]
    pub fn tape(&self) -> &[Array] {
        &self.tape
    }

    // -------------------------------------------------------------------------
    // Trace Substitution
    // -------------------------------------------------------------------------

    /// Rebuilds the captured region against real inputs and returns the
    /// real counterparts of the captured outputs.
    ///
    /// The first mapping for an identity wins: tape entries already
    /// seeded from the input binding are not rebuilt, and
    /// primitive-less entries (constants, captured placeholders) stand
    /// for themselves.
    pub fn to_real(&self, real_inputs: &[Array]) -> Result<Vec<Array>> {
        let (_, outputs) = self.to_real_full(real_inputs)?;
        Ok(outputs)
    }

    /// Like [`to_real`](Self::to_real), also returning the rebuilt tape
    /// nodes in evaluation order.
    pub(crate) fn to_real_full(&self, real_inputs: &[Array]) -> Result<(Vec<Array>, Vec<Array>)> {
        if real_inputs.len() != self.inputs.len() {
            return Err(Error::invalid_operation(format!(
                "compiled region expects {} inputs, got {}",
                self.inputs.len(),
                real_inputs.len()
            )));
        }

        let mut trace_to_real: FxHashMap<ArrayId, Array> = FxHashMap::default();
        for (trace_in, real_in) in self.inputs.iter().zip(real_inputs) {
            trace_to_real
                .entry(trace_in.id())
                .or_insert_with(|| real_in.clone());
        }

        let mut real_tape = Vec::new();
        for a in &self.tape {
            if trace_to_real.contains_key(&a.id()) {
                continue;
            }
            if !a.has_primitive() {
                trace_to_real.insert(a.id(), a.clone());
                continue;
            }
            let real = rebuild_node(a, &trace_to_real)?;
            for (trace_out, real_out) in a.outputs().iter().zip(&real) {
                trace_to_real
                    .entry(trace_out.id())
                    .or_insert_with(|| real_out.clone());
            }
            real_tape.push(real[0].clone());
        }

        let outputs = self
            .outputs
            .iter()
            .map(|o| {
                trace_to_real.get(&o.id()).cloned().ok_or_else(|| {
                    Error::internal(format!("compiled output {} not reachable", o.id()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((real_tape, outputs))
    }

    // -------------------------------------------------------------------------
    // Primitive Surface
    // -------------------------------------------------------------------------

    /// Vectorizes the region over a batch axis by rebuilding the
    /// captured trace against the batched inputs and forwarding each
    /// rebuilt node's `vmap`.
    pub fn vmap(
        &self,
        inputs: &[Array],
        axes: &[Option<usize>],
    ) -> Result<(Vec<Array>, Vec<Option<usize>>)> {
        let (real_tape, real_outputs) = self.to_real_full(inputs)?;

        let mut vmapped: FxHashMap<ArrayId, (Array, Option<usize>)> = FxHashMap::default();
        for (real_in, ax) in inputs.iter().zip(axes) {
            vmapped.insert(real_in.id(), (real_in.clone(), *ax));
        }

        for a in &real_tape {
            let mut v_inputs = Vec::new();
            let mut v_axes = Vec::new();
            for input in a.inputs() {
                match vmapped.get(&input.id()) {
                    Some((v_in, v_ax)) => {
                        v_inputs.push(v_in.clone());
                        v_axes.push(*v_ax);
                    }
                    // Constants captured inside the region carry no
                    // batch axis.
                    None => {
                        v_inputs.push(input.clone());
                        v_axes.push(None);
                    }
                }
            }
            let primitive = a
                .primitive()
                .ok_or_else(|| Error::internal("rebuilt tape node without a primitive"))?;
            let (v_outputs, v_out_axes) = primitive.vmap(&v_inputs, &v_axes)?;
            for (out, (v_out, v_ax)) in a.outputs().iter().zip(v_outputs.iter().zip(&v_out_axes)) {
                vmapped.insert(out.id(), (v_out.clone(), *v_ax));
            }
        }

        let mut outputs = Vec::new();
        let mut out_axes = Vec::new();
        for o in &real_outputs {
            let (out, ax) = vmapped
                .get(&o.id())
                .cloned()
                .ok_or_else(|| Error::internal("vmapped output missing from the trace map"))?;
            outputs.push(out);
            out_axes.push(ax);
        }
        Ok((outputs, out_axes))
    }

    /// Reverse-mode differentiation through a compiled region.
    pub fn vjp(&self, _primals: &[Array], _cotangents: &[Array]) -> Result<Vec<Array>> {
        Err(Error::not_implemented("Compiled::vjp"))
    }

    /// Forward-mode differentiation through a compiled region.
    pub fn jvp(&self, _primals: &[Array], _tangents: &[Array]) -> Result<Vec<Array>> {
        Err(Error::not_implemented("Compiled::jvp"))
    }
}

fn rebuild_node(a: &Array, trace_to_real: &FxHashMap<ArrayId, Array>) -> Result<Vec<Array>> {
    let primitive = a
        .primitive()
        .ok_or_else(|| Error::internal("rebuild_node on a primitive-less array"))?;
    let real_inputs = a
        .inputs()
        .iter()
        .map(|input| {
            trace_to_real.get(&input.id()).cloned().ok_or_else(|| {
                Error::internal(format!(
                    "input {} of a compiled tape node has no real counterpart",
                    input.id()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let trace_outputs = a.outputs();
    if trace_outputs.len() == 1 {
        Ok(vec![Array::new(
            a.shape().to_vec(),
            a.dtype(),
            Some(primitive),
            real_inputs,
        )])
    } else {
        let shapes: Vec<Vec<usize>> = trace_outputs.iter().map(|o| o.shape().to_vec()).collect();
        let dtypes: Vec<DType> = trace_outputs.iter().map(Array::dtype).collect();
        Ok(Array::make_arrays(shapes, dtypes, primitive, real_inputs))
    }
}

impl core::fmt::Display for CompiledKernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "compiled[")?;
        let mut first = true;
        for a in &self.tape {
            if let Some(p) = a.primitive() {
                if !first {
                    write!(f, " ")?;
                }
                f.write_str(p.op().name())?;
                first = false;
            }
        }
        write!(f, "]")
    }
}

// =============================================================================
// Tests
// =============================================================================
