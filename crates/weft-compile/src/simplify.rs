//! Tape Simplification
//!
//! Collapses duplicate computation in place. Pass 0 deduplicates
//! evaluated scalars by bit pattern and dtype; the remaining passes
//! fuse consumers that are equivalent at depth 1 (same operator kind,
//! same parameters, identical input identities). A fusion at depth k
//! only exposes the one at depth k+1 on the next pass, which is why
//! the pass count is configurable; three passes cover realistic
//! function depths.
//!
//! Both the tape and the parents map are rewritten so that after every
//! pass the map still mirrors the tape exactly, and declared outputs
//! keep their identities.
//!
//! @version 0.1.0
//! @author Weft Development Team

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use weft_core::DType;
use weft_array::{Array, ArrayId};

use crate::error::{CompileError, CompileResult};
use crate::walk::ParentsMap;

// =============================================================================
// Entry Point
// =============================================================================

/// Runs scalar deduplication followed by `passes` rounds of
/// common-subexpression fusion, mutating `tape` and `parents` in
/// place. Declared `outputs` are never dropped or rerouted.
pub fn simplify_tape(
    tape: &mut Vec<Array>,
    parents: &mut ParentsMap,
    outputs: &[Array],
    passes: usize,
) -> CompileResult<()> {
    let output_set: FxHashSet<ArrayId> = outputs.iter().map(Array::id).collect();

    dedup_scalars(tape, parents, &output_set)?;

    for pass in 0..passes {
        let fused = fuse_common_subexpressions(tape, parents, &output_set)?;
        debug!(pass, fused, tape = tape.len(), "common subexpression pass");
    }
    Ok(())
}

// =============================================================================
// Pass 0: Scalar Deduplication
// =============================================================================

fn scalar_key(a: &Array) -> Option<(u64, DType)> {
    // Zero-dimensional and already evaluated, i.e. a scalar constant.
    a.scalar_bits().map(|bits| (bits, a.dtype()))
}

fn dedup_scalars(
    tape: &mut Vec<Array>,
    parents: &mut ParentsMap,
    output_set: &FxHashSet<ArrayId>,
) -> CompileResult<()> {
    let mut canonical: FxHashMap<(u64, DType), Array> = FxHashMap::default();
    for a in tape.iter() {
        if let Some(key) = scalar_key(a) {
            canonical.entry(key).or_insert_with(|| a.clone());
        }
    }

    let mut fused = 0usize;
    let mut new_tape = Vec::with_capacity(tape.len());
    for a in tape.drain(..) {
        if let Some(key) = scalar_key(&a) {
            let dst = &canonical[&key];
            if dst.id() != a.id() && !output_set.contains(&a.id()) {
                fuse(dst, &a, parents)?;
                fused += 1;
                // Orphaned scalars are dropped from the tape.
                continue;
            }
        }
        new_tape.push(a);
    }
    *tape = new_tape;
    debug!(fused, "scalar deduplication pass");
    Ok(())
}

// =============================================================================
// Passes 1..N: Common Subexpression Fusion
// =============================================================================

/// Depth-1 equivalence: both produced by primitives, distinct
/// instances of the same operator kind with equal parameters, and
/// identical input identity sequences.
fn array_equivalent(a: &Array, b: &Array) -> bool {
    let (Some(pa), Some(pb)) = (a.primitive(), b.primitive()) else {
        return false;
    };
    // Sibling outputs share an instance; they are the same node, not
    // duplicates of each other.
    if a.same_primitive_instance(b) {
        return false;
    }
    let (a_inputs, b_inputs) = (a.inputs(), b.inputs());
    if a_inputs.len() != b_inputs.len() {
        return false;
    }
    if a_inputs
        .iter()
        .zip(&b_inputs)
        .any(|(x, y)| x.id() != y.id())
    {
        return false;
    }
    pa.is_equivalent(&pb)
}

fn fuse_common_subexpressions(
    tape: &mut Vec<Array>,
    parents: &mut ParentsMap,
    output_set: &FxHashSet<ArrayId>,
) -> CompileResult<usize> {
    let mut fused = 0usize;
    let mut new_tape = Vec::with_capacity(tape.len());

    for a in tape.drain(..) {
        let mut discard = fuse_parents_of(&a, parents, output_set, &mut fused)?;
        for sibling in a.siblings() {
            discard &= fuse_parents_of(&sibling, parents, output_set, &mut fused)?;
        }
        // An array whose whole output group has no consumers left, and
        // none of which is a declared output, is orphaned.
        if !discard {
            new_tape.push(a);
        }
    }
    *tape = new_tape;
    Ok(fused)
}

/// Pairwise-fuses equivalent consumers of `a`, purging consumed edges.
/// Returns whether `a` itself has become orphaned.
fn fuse_parents_of(
    a: &Array,
    parents: &mut ParentsMap,
    output_set: &FxHashSet<ArrayId>,
    fused: &mut usize,
) -> CompileResult<bool> {
    let Some(edges) = parents.get(&a.id()) else {
        return Ok(!output_set.contains(&a.id()));
    };

    let list = edges.clone();
    let mut consumed = vec![false; list.len()];
    for i in 0..list.len() {
        if consumed[i] {
            continue;
        }
        for j in (i + 1)..list.len() {
            if consumed[j] {
                continue;
            }
            let dst = &list[i].0;
            let src = &list[j].0;
            if src.id() != dst.id() && array_equivalent(dst, src) {
                fuse(dst, src, parents)?;
                consumed[j] = true;
                *fused += 1;
            }
        }
    }

    if consumed.iter().any(|&c| c) {
        let kept: Vec<(Array, usize)> = list
            .into_iter()
            .zip(&consumed)
            .filter(|(_, &c)| !c)
            .map(|(edge, _)| edge)
            .collect();
        if kept.is_empty() {
            parents.remove(&a.id());
        } else {
            parents.insert(a.id(), kept);
        }
    }
    Ok(false)
}

// =============================================================================
// Fusion Primitive
// =============================================================================

/// Reroutes every consumer of `src`'s output group to the matching
/// output of `dst`'s group, merging the parent lists and removing the
/// source entries so nothing fuses with `src` again.
pub(crate) fn fuse(dst: &Array, src: &Array, parents: &mut ParentsMap) -> CompileResult<()> {
    let sources = src.outputs();
    let dests = dst.outputs();
    if sources.len() != dests.len() {
        return Err(CompileError::invariant(format!(
            "fusing output groups of different arity: {} vs {}",
            sources.len(),
            dests.len()
        )));
    }
    for (src_out, dst_out) in sources.iter().zip(&dests) {
        let Some(edges) = parents.remove(&src_out.id()) else {
            continue;
        };
        for (consumer, slot) in &edges {
            consumer.set_input(*slot, dst_out.clone());
        }
        parents.entry(dst_out.id()).or_default().extend(edges);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_array::ops;
    use weft_core::DType;

    use crate::walk::walk_graph;

    fn placeholder(shape: &[usize]) -> Array {
        Array::placeholder(shape.to_vec(), DType::F32)
    }

    fn assert_parents_consistent(tape: &[Array], parents: &ParentsMap) {
        // Every edge in the map matches an actual input slot.
        for (id, edges) in parents {
            for (consumer, slot) in edges {
                assert_eq!(
                    consumer.input(*slot).id(),
                    *id,
                    "stale parent edge for {id}"
                );
            }
        }
        // Every input slot in the tape is present in the map.
        for a in tape {
            for (slot, input) in a.inputs().iter().enumerate() {
                let edges = parents.get(&input.id()).expect("input has a map entry");
                assert!(edges
                    .iter()
                    .any(|(p, s)| p.id() == a.id() && *s == slot));
            }
        }
    }

    #[test]
    fn test_scalar_dedup_keeps_one_constant() {
        // y = (x + 2.0) + 2.0, with two distinct 2.0 constants.
        let x = placeholder(&[4]);
        let c1 = Array::scalar(2.0f32);
        let c2 = Array::scalar(2.0f32);
        let y = ops::add(&ops::add(&x, &c1).unwrap(), &c2).unwrap();

        let (mut tape, mut parents) = walk_graph(&[x.clone()], &[y.clone()]);
        let scalars_before = tape.iter().filter(|a| a.scalar_bits().is_some()).count();
        assert_eq!(scalars_before, 2);

        simplify_tape(&mut tape, &mut parents, &[y.clone()], 3).unwrap();

        let scalars_after: Vec<&Array> =
            tape.iter().filter(|a| a.scalar_bits().is_some()).collect();
        assert_eq!(scalars_after.len(), 1);
        assert_eq!(scalars_after[0].id(), c1.id());
        assert_parents_consistent(&tape, &parents);
    }

    #[test]
    fn test_scalar_dedup_distinguishes_dtypes() {
        let x = placeholder(&[2]);
        let cf = Array::scalar(2.0f32);
        let ci = Array::scalar(2i32);
        let y = ops::add(&ops::add(&x, &cf).unwrap(), &ci).unwrap();

        let (mut tape, mut parents) = walk_graph(&[x.clone()], &[y.clone()]);
        simplify_tape(&mut tape, &mut parents, &[y], 3).unwrap();
        let scalars = tape.iter().filter(|a| a.scalar_bits().is_some()).count();
        assert_eq!(scalars, 2);
    }

    #[test]
    fn test_cse_collapses_sin_pair() {
        // y = sin(x) * sin(x), traced as two distinct sine nodes.
        let x = placeholder(&[3]);
        let s1 = ops::sin(&x);
        let s2 = ops::sin(&x);
        let y = ops::multiply(&s1, &s2).unwrap();

        let (mut tape, mut parents) = walk_graph(&[x.clone()], &[y.clone()]);
        assert_eq!(tape.len(), 4);

        simplify_tape(&mut tape, &mut parents, &[y.clone()], 3).unwrap();

        // One sine survives, consumed at both slots of the multiply.
        assert_eq!(tape.len(), 3);
        let sines: Vec<&Array> = tape
            .iter()
            .filter(|a| {
                a.primitive()
                    .is_some_and(|p| matches!(p.op(), weft_array::Op::Sin))
            })
            .collect();
        assert_eq!(sines.len(), 1);
        assert_eq!(sines[0].id(), s1.id());
        assert_eq!(y.input(0).id(), s1.id());
        assert_eq!(y.input(1).id(), s1.id());
        assert_eq!(parents[&s1.id()].len(), 2);
        assert_parents_consistent(&tape, &parents);
    }

    #[test]
    fn test_cse_cascades_through_depth() {
        // exp(sin(x)) + exp(sin(x)): the exp pair only becomes
        // equivalent once the sin pair fuses. Tape order processes
        // producers first, so the cascade resolves within the
        // configured passes.
        let x = placeholder(&[2]);
        let e1 = ops::exp(&ops::sin(&x));
        let e2 = ops::exp(&ops::sin(&x));
        let y = ops::add(&e1, &e2).unwrap();

        let (mut tape, mut parents) = walk_graph(&[x.clone()], &[y.clone()]);
        assert_eq!(tape.len(), 6);

        simplify_tape(&mut tape, &mut parents, &[y.clone()], 3).unwrap();
        // One sin, one exp, consumed at both slots of the add.
        assert_eq!(tape.len(), 4);
        assert_eq!(y.input(0).id(), y.input(1).id());
        assert_eq!(y.input(0).id(), e1.id());
        assert_parents_consistent(&tape, &parents);
    }

    #[test]
    fn test_cse_respects_parameters() {
        // Two broadcasts to different shapes share an input but must
        // not fuse.
        let x = placeholder(&[1]);
        let b1 = ops::broadcast_to(&x, &[2]).unwrap();
        let b2 = ops::broadcast_to(&x, &[3]).unwrap();
        let s1 = ops::sum(&b1, None).unwrap();
        let s2 = ops::sum(&b2, None).unwrap();
        let y = ops::add(&s1, &s2).unwrap();

        let (mut tape, mut parents) = walk_graph(&[x.clone()], &[y.clone()]);
        let before = tape.len();
        simplify_tape(&mut tape, &mut parents, &[y], 3).unwrap();
        assert_eq!(tape.len(), before);
    }

    #[test]
    fn test_cse_fuses_multi_output_groups_as_units() {
        // Two identical divmod groups collapse into one; consumers of
        // both the quotient and the remainder reroute positionally.
        let x = placeholder(&[2]);
        let y = placeholder(&[2]);
        let (q1, r1) = ops::divmod(&x, &y).unwrap();
        let (q2, r2) = ops::divmod(&x, &y).unwrap();
        let out = ops::add(&q1, &r2).unwrap();

        let (mut tape, mut parents) =
            walk_graph(&[x.clone(), y.clone()], &[out.clone()]);
        simplify_tape(&mut tape, &mut parents, &[out.clone()], 3).unwrap();

        // The second group is gone and the add now reads r1.
        assert_eq!(out.input(0).id(), q1.id());
        assert_eq!(out.input(1).id(), r1.id());
        assert!(!tape
            .iter()
            .any(|a| a.id() == q2.id() || a.id() == r2.id()));
        assert_parents_consistent(&tape, &parents);
    }

    #[test]
    fn test_orphans_dropped_outputs_kept() {
        // sin(x) fuses into a duplicate that happens to be a declared
        // output; the declared output keeps its identity.
        let x = placeholder(&[2]);
        let s1 = ops::sin(&x);
        let s2 = ops::sin(&x);
        let y = ops::add(&s1, &s2).unwrap();

        let (mut tape, mut parents) =
            walk_graph(&[x.clone()], &[y.clone(), s1.clone()]);
        simplify_tape(&mut tape, &mut parents, &[y.clone(), s1.clone()], 3).unwrap();

        assert!(tape.iter().any(|a| a.id() == s1.id()));
        assert!(!tape.iter().any(|a| a.id() == s2.id()));
    }
}
