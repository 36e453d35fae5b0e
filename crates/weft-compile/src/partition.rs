//! Fusion Partitioner
//!
//! Carves maximal contiguous runs of fusable operations out of the
//! tape and replaces each with a single `Compiled` node owning the
//! region's sub-tape.
//!
//! The tape is walked from the last element backwards. Each fusable
//! array anchors a candidate region that extends leftward one array at
//! a time:
//!
//! - a fusable array whose live consumers all lie inside the region
//!   becomes interior;
//! - a constant fully consumed inside the region rides along free;
//! - a placeholder fully consumed inside the region becomes a captured
//!   region input, re-emitted ahead of the compiled node;
//! - anything else - a non-fusable primitive, an array with a consumer
//!   outside the region, a declared output, a stream change, or the
//!   region size cap - ends the extension.
//!
//! A region with fewer than two fusable arrays is left alone. Spliced
//! regions keep the tape and parents map consistent: outer consumers
//! of the anchor and the declared-output list are rerouted to the
//! compiled output, and interior parent entries are dropped.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::debug;

use weft_array::{Array, ArrayId, CompiledKernel, Op, Primitive};

use crate::classify::is_fusable;
use crate::error::{CompileError, CompileResult};
use crate::walk::ParentsMap;

// =============================================================================
// Partition
// =============================================================================

/// Rewrites `tape` in place, replacing fusable regions with `Compiled`
/// nodes. `outputs` entries that anchor a region are replaced by the
/// region's compiled output so replay can resolve them.
pub fn partition_tape(
    tape: &mut Vec<Array>,
    parents: &mut ParentsMap,
    outputs: &mut [Array],
    max_region: usize,
) -> CompileResult<()> {
    let output_set: FxHashSet<ArrayId> = outputs.iter().map(Array::id).collect();
    let mut new_tape_rev: Vec<Array> = Vec::with_capacity(tape.len());

    let mut i = tape.len() as isize - 1;
    while i >= 0 {
        let anchor = tape[i as usize].clone();
        let Some(anchor_prim) = anchor.primitive().filter(|p| is_fusable(p.op())) else {
            new_tape_rev.push(anchor);
            i -= 1;
            continue;
        };
        let stream = anchor_prim.stream();

        // Grow the region leftward from the anchor.
        let mut region: FxHashSet<ArrayId> = FxHashSet::default();
        let mut captured_inputs: FxHashSet<ArrayId> = FxHashSet::default();
        region.insert(anchor.id());
        let mut fusable_count = 1usize;

        let mut s = i - 1;
        while s >= 0 {
            let candidate = &tape[s as usize];
            let consumers = parents.get(&candidate.id());
            match candidate.primitive() {
                None => {
                    let Some(edges) = consumers else { break };
                    if edges.is_empty() {
                        return Err(CompileError::invariant(format!(
                            "array {} is in the parents map with no parents",
                            candidate.id()
                        )));
                    }
                    if !edges.iter().all(|(p, _)| region.contains(&p.id())) {
                        break;
                    }
                    region.insert(candidate.id());
                    if !candidate.is_evaled() {
                        // A placeholder: its value arrives from outside.
                        captured_inputs.insert(candidate.id());
                    }
                }
                Some(prim) => {
                    if !is_fusable(prim.op()) || prim.stream() != stream {
                        break;
                    }
                    if output_set.contains(&candidate.id()) {
                        // Regions have exactly one output, the anchor.
                        break;
                    }
                    let Some(edges) = consumers else { break };
                    if edges.is_empty() {
                        return Err(CompileError::invariant(format!(
                            "array {} is in the parents map with no parents",
                            candidate.id()
                        )));
                    }
                    if !edges.iter().all(|(p, _)| region.contains(&p.id())) {
                        break;
                    }
                    if fusable_count >= max_region {
                        break;
                    }
                    region.insert(candidate.id());
                    fusable_count += 1;
                }
            }
            s -= 1;
        }

        if fusable_count < 2 {
            // Nothing to fuse here; emit the anchor unchanged.
            new_tape_rev.push(anchor);
            i -= 1;
            continue;
        }

        let slice: Vec<Array> = tape[(s + 1) as usize..=(i as usize)].to_vec();
        let compiled = splice_region(
            &slice,
            &region,
            &captured_inputs,
            &anchor,
            stream,
            parents,
        )?;
        debug!(
            size = fusable_count,
            inputs = compiled.inputs().len(),
            "fused region into compiled node"
        );

        for o in outputs.iter_mut() {
            if o.id() == anchor.id() {
                *o = compiled.clone();
            }
        }

        new_tape_rev.push(compiled.clone());
        // Captured placeholders sit ahead of the compiled node once the
        // tape is reversed.
        for input in compiled.inputs().iter().rev() {
            if captured_inputs.contains(&input.id()) {
                new_tape_rev.push(input.clone());
            }
        }

        i = s;
    }

    new_tape_rev.reverse();
    *tape = new_tape_rev;
    Ok(())
}

// =============================================================================
// Region Splicing
// =============================================================================

/// Builds the `Compiled` node for a finalized region and rewires the
/// surrounding graph: external inputs gain an edge to the compiled
/// array, interior parent entries are dropped, and outer consumers of
/// the anchor are rerouted.
fn splice_region(
    slice: &[Array],
    region: &FxHashSet<ArrayId>,
    captured_inputs: &FxHashSet<ArrayId>,
    anchor: &Array,
    stream: weft_core::Stream,
    parents: &mut ParentsMap,
) -> CompileResult<Array> {
    // Region inputs in first-use order: captured placeholders plus any
    // array below the slice that a member consumes.
    let mut fused_inputs: Vec<Array> = Vec::new();
    let mut seen: FxHashSet<ArrayId> = FxHashSet::default();
    for member in slice {
        if captured_inputs.contains(&member.id()) {
            if seen.insert(member.id()) {
                fused_inputs.push(member.clone());
            }
            continue;
        }
        if !member.has_primitive() {
            continue;
        }
        for input in member.inputs() {
            if !region.contains(&input.id()) && seen.insert(input.id()) {
                fused_inputs.push(input.clone());
            }
        }
    }

    // Captured placeholders at the head of the slice are seeded from
    // the input binding anyway; keep the sub-tape tight.
    let start = slice
        .iter()
        .position(|a| !captured_inputs.contains(&a.id()))
        .unwrap_or(slice.len());
    let kernel_tape: Vec<Array> = slice[start..].to_vec();

    let kernel = CompiledKernel::new(
        stream,
        fused_inputs.clone(),
        vec![anchor.clone()],
        kernel_tape,
    );
    let compiled_outputs = Array::make_arrays(
        vec![anchor.shape().to_vec()],
        vec![anchor.dtype()],
        Arc::new(Primitive::new(Op::Compiled(Arc::new(kernel)), stream)),
        fused_inputs.clone(),
    );
    let compiled = compiled_outputs
        .into_iter()
        .next()
        .ok_or_else(|| CompileError::invariant("compiled construction produced no outputs"))?;

    // Outer consumers of the anchor now read the compiled output.
    if let Some(edges) = parents.remove(&anchor.id()) {
        for (consumer, slot) in &edges {
            consumer.set_input(*slot, compiled.clone());
        }
        parents.entry(compiled.id()).or_default().extend(edges);
    }

    // Interior consumption edges die with the region; region inputs are
    // now consumed by the compiled array instead.
    for (slot, input) in fused_inputs.iter().enumerate() {
        let edges = parents.entry(input.id()).or_default();
        edges.retain(|(p, _)| !region.contains(&p.id()));
        edges.push((compiled.clone(), slot));
    }
    for id in region {
        if *id != anchor.id() && !captured_inputs.contains(id) {
            parents.remove(id);
        }
    }

    Ok(compiled)
}

// =============================================================================
// Tests
// =============================================================================
