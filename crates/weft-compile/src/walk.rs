//! Graph Walker
//!
//! Produces the canonical tape from a traced graph: a post-order
//! enumeration of everything reachable from the outputs, plus the
//! parents map recording which array consumes which, and at what input
//! slot. Declared graph inputs appear in the tape as leaves but are
//! not recursed through. Every sibling of a multi-output node counts
//! as a parent of that node's inputs, so rewrites always move output
//! groups as a unit.
//!
//! @version 0.1.0
//! @author Weft Development Team

use rustc_hash::{FxHashMap, FxHashSet};

use weft_array::{Array, ArrayId};

// =============================================================================
// Parents Map
// =============================================================================

/// For each array identity, the list of `(consumer, input_slot)` pairs
/// with `consumer.input(input_slot)` currently equal to that array.
///
/// The map is scoped to a single compile and must never outlive it.
pub type ParentsMap = FxHashMap<ArrayId, Vec<(Array, usize)>>;

// =============================================================================
// Walk
// =============================================================================

/// Builds `(tape, parents_map)` for the graph reachable from
/// `outputs`, treating `inputs` as leaves.
#[must_use]
pub fn walk_graph(inputs: &[Array], outputs: &[Array]) -> (Vec<Array>, ParentsMap) {
    let input_set: FxHashSet<ArrayId> = inputs.iter().map(Array::id).collect();
    let mut visited: FxHashSet<ArrayId> = FxHashSet::default();
    let mut tape = Vec::new();
    let mut parents: ParentsMap = ParentsMap::default();

    for output in outputs {
        visit(
            output,
            &input_set,
            &mut visited,
            &mut tape,
            &mut parents,
        );
    }
    (tape, parents)
}

fn visit(
    a: &Array,
    input_set: &FxHashSet<ArrayId>,
    visited: &mut FxHashSet<ArrayId>,
    tape: &mut Vec<Array>,
    parents: &mut ParentsMap,
) {
    if visited.contains(&a.id()) {
        return;
    }
    let siblings = a.siblings();
    for (slot, input) in a.inputs().iter().enumerate() {
        let edges = parents.entry(input.id()).or_default();
        edges.push((a.clone(), slot));
        for sibling in &siblings {
            edges.push((sibling.clone(), slot));
        }
        if input_set.contains(&input.id()) {
            // Declared graph input: a leaf in the tape, not recursed.
            if visited.insert(input.id()) {
                tape.push(input.clone());
            }
        } else {
            visit(input, input_set, visited, tape, parents);
        }
    }
    visited.insert(a.id());
    for sibling in &siblings {
        visited.insert(sibling.id());
    }
    tape.push(a.clone());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_array::ops;
    use weft_core::DType;

    fn placeholder(shape: &[usize]) -> Array {
        Array::placeholder(shape.to_vec(), DType::F32)
    }

    fn position(tape: &[Array], a: &Array) -> usize {
        tape.iter().position(|t| t.id() == a.id()).expect("in tape")
    }

    #[test]
    fn test_post_order_is_topological() {
        let x = placeholder(&[2]);
        let y = placeholder(&[2]);
        let sum = ops::add(&x, &y).unwrap();
        let out = ops::multiply(&ops::exp(&sum), &sum).unwrap();

        let (tape, _) = walk_graph(&[x.clone(), y.clone()], &[out.clone()]);
        assert_eq!(tape.len(), 5);
        for a in &tape {
            let pos = position(&tape, a);
            for input in a.inputs() {
                assert!(position(&tape, &input) < pos, "input after consumer");
            }
        }
        assert_eq!(tape.last().unwrap().id(), out.id());
    }

    #[test]
    fn test_inputs_are_leaves() {
        let x = placeholder(&[2]);
        let out = ops::negative(&x);
        let (tape, _) = walk_graph(&[x.clone()], &[out]);
        assert_eq!(tape[0].id(), x.id());
        assert_eq!(tape.len(), 2);
    }

    #[test]
    fn test_parent_edges_mirror_inputs() {
        let x = placeholder(&[2]);
        let s1 = ops::sin(&x);
        let s2 = ops::sin(&x);
        let out = ops::multiply(&s1, &s2).unwrap();

        let (tape, parents) = walk_graph(&[x.clone()], &[out.clone()]);
        for a in &tape {
            for (slot, input) in a.inputs().iter().enumerate() {
                let edges = &parents[&input.id()];
                assert!(edges
                    .iter()
                    .any(|(p, s)| p.id() == a.id() && *s == slot));
            }
        }
        // x feeds both sine nodes at slot 0.
        assert_eq!(parents[&x.id()].len(), 2);
        // The output consumes nothing downstream.
        assert!(!parents.contains_key(&out.id()));
    }

    #[test]
    fn test_same_input_twice_records_both_slots() {
        let x = placeholder(&[2]);
        let out = ops::multiply(&x, &x).unwrap();
        let (_, parents) = walk_graph(&[x.clone()], &[out.clone()]);
        let edges = &parents[&x.id()];
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().any(|(_, s)| *s == 0));
        assert!(edges.iter().any(|(_, s)| *s == 1));
    }

    #[test]
    fn test_siblings_count_as_parents() {
        let x = placeholder(&[2]);
        let y = placeholder(&[2]);
        let (q, r) = ops::divmod(&x, &y).unwrap();
        let out = ops::add(&q, &r).unwrap();

        let (tape, parents) = walk_graph(&[x.clone(), y.clone()], &[out]);
        // Both outputs of divmod register as parents of each input.
        let x_edges = &parents[&x.id()];
        assert!(x_edges.iter().any(|(p, _)| p.id() == q.id()));
        assert!(x_edges.iter().any(|(p, _)| p.id() == r.id()));
        // Only one representative of the group lands in the tape.
        let group_in_tape = tape
            .iter()
            .filter(|a| a.id() == q.id() || a.id() == r.id())
            .count();
        assert_eq!(group_in_tape, 1);
    }

    #[test]
    fn test_diamond_visited_once() {
        let x = placeholder(&[2]);
        let shared = ops::exp(&x);
        let left = ops::negative(&shared);
        let right = ops::sqrt(&shared);
        let out = ops::add(&left, &right).unwrap();

        let (tape, _) = walk_graph(&[x.clone()], &[out]);
        let shared_count = tape.iter().filter(|a| a.id() == shared.id()).count();
        assert_eq!(shared_count, 1);
    }

    #[test]
    fn test_output_that_is_an_input() {
        let x = placeholder(&[2]);
        let (tape, parents) = walk_graph(&[x.clone()], &[x.clone()]);
        assert_eq!(tape.len(), 1);
        assert!(parents.is_empty());
    }
}
