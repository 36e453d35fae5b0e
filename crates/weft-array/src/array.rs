//! Array Handles
//!
//! An [`Array`] is an immutable value handle with shared ownership of a
//! graph node. A node records the shape and dtype of its value, the
//! primitive that produces it (absent for constants and placeholders),
//! the input arrays it consumes, and - for multi-output primitives -
//! its sibling outputs. Graph rewrites construct new arrays or reroute
//! input slots; they never change a node's identity.
//!
//! Identities are opaque counters, not addresses: every node gets a
//! fresh [`ArrayId`] from a process-wide atomic.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use weft_core::{DType, Error, Result};

use crate::data::{ArrayElement, Data};
use crate::op::Primitive;

// =============================================================================
// ArrayId
// =============================================================================

/// Opaque, process-unique identity of an array node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(u64);

impl ArrayId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl core::fmt::Display for ArrayId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "a{}", self.0)
    }
}

// =============================================================================
// Array Node
// =============================================================================

#[derive(Debug)]
pub(crate) struct ArrayNode {
    id: ArrayId,
    shape: Vec<usize>,
    dtype: DType,
    primitive: Option<Arc<Primitive>>,
    inputs: RwLock<Vec<Array>>,
    /// Other outputs of the same primitive instance (empty for
    /// single-output nodes). Position-ordered together with `position`.
    siblings: RwLock<Vec<Array>>,
    position: usize,
    data: RwLock<Option<Data>>,
    tracer: AtomicBool,
}

// =============================================================================
// Array Handle
// =============================================================================

/// An immutable handle to a node in a lazy computation graph.
#[derive(Debug, Clone)]
pub struct Array {
    node: Arc<ArrayNode>,
}

impl Array {
    // -------------------------------------------------------------------------
    // Constructors
    // -------------------------------------------------------------------------

    /// Creates a single-output array from a primitive and its inputs.
    ///
    /// Pass `None` as the primitive for constants and placeholders.
    #[must_use]
    pub fn new(
        shape: Vec<usize>,
        dtype: DType,
        primitive: Option<Arc<Primitive>>,
        inputs: Vec<Array>,
    ) -> Self {
        Self::build(shape, dtype, primitive, inputs, 0)
    }

    /// Creates the outputs of a multi-output primitive, in position
    /// order. All outputs share the primitive instance and the input
    /// list, and each is wired to its siblings.
    #[must_use]
    pub fn make_arrays(
        shapes: Vec<Vec<usize>>,
        dtypes: Vec<DType>,
        primitive: Arc<Primitive>,
        inputs: Vec<Array>,
    ) -> Vec<Array> {
        let outputs: Vec<Array> = shapes
            .into_iter()
            .zip(dtypes)
            .enumerate()
            .map(|(position, (shape, dtype))| {
                Self::build(
                    shape,
                    dtype,
                    Some(Arc::clone(&primitive)),
                    inputs.clone(),
                    position,
                )
            })
            .collect();
        for (position, out) in outputs.iter().enumerate() {
            let sibs: Vec<Array> = outputs
                .iter()
                .enumerate()
                .filter(|(p, _)| *p != position)
                .map(|(_, o)| o.clone())
                .collect();
            *out.node.siblings.write() = sibs;
        }
        outputs
    }

    /// Creates a placeholder: no primitive, no data, marked as a tracer.
    #[must_use]
    pub fn placeholder(shape: Vec<usize>, dtype: DType) -> Self {
        let a = Self::new(shape, dtype, None, Vec::new());
        a.set_tracer(true);
        a
    }

    /// Creates a constant array from a typed slice.
    pub fn from_slice<T: ArrayElement>(values: &[T], shape: &[usize]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if size != values.len() {
            return Err(Error::shape_mismatch(shape, &[values.len()]));
        }
        let a = Self::new(shape.to_vec(), T::DTYPE, None, Vec::new());
        *a.node.data.write() = Some(T::wrap(values.to_vec()));
        Ok(a)
    }

    /// Creates a zero-dimensional constant.
    #[must_use]
    pub fn scalar<T: ArrayElement>(value: T) -> Self {
        let a = Self::new(Vec::new(), T::DTYPE, None, Vec::new());
        *a.node.data.write() = Some(T::wrap(vec![value]));
        a
    }

    fn build(
        shape: Vec<usize>,
        dtype: DType,
        primitive: Option<Arc<Primitive>>,
        inputs: Vec<Array>,
        position: usize,
    ) -> Self {
        let tracer = inputs.iter().any(Array::is_tracer);
        Self {
            node: Arc::new(ArrayNode {
                id: ArrayId::next(),
                shape,
                dtype,
                primitive,
                inputs: RwLock::new(inputs),
                siblings: RwLock::new(Vec::new()),
                position,
                data: RwLock::new(None),
                tracer: AtomicBool::new(tracer),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// The stable identity of this array.
    #[must_use]
    pub fn id(&self) -> ArrayId {
        self.node.id
    }

    /// The shape of this array.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.node.shape
    }

    /// The number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.node.shape.len()
    }

    /// The number of elements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.node.shape.iter().product()
    }

    /// The element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.node.dtype
    }

    /// Whether a primitive produces this array.
    #[must_use]
    pub fn has_primitive(&self) -> bool {
        self.node.primitive.is_some()
    }

    /// The primitive instance producing this array, if any. Sibling
    /// outputs share one instance.
    #[must_use]
    pub fn primitive(&self) -> Option<Arc<Primitive>> {
        self.node.primitive.clone()
    }

    /// Whether two arrays are produced by the same primitive instance.
    #[must_use]
    pub fn same_primitive_instance(&self, other: &Array) -> bool {
        match (&self.node.primitive, &other.node.primitive) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The input arrays this node consumes.
    #[must_use]
    pub fn inputs(&self) -> Vec<Array> {
        self.node.inputs.read().clone()
    }

    /// The input at slot `i`.
    #[must_use]
    pub fn input(&self, i: usize) -> Array {
        self.node.inputs.read()[i].clone()
    }

    /// Replaces the input at slot `i`. Graph rewrites use this to
    /// reroute an edge to an equivalent producer.
    pub fn set_input(&self, i: usize, input: Array) {
        self.node.inputs.write()[i] = input;
    }

    /// The sibling outputs of this array (empty for single-output
    /// primitives).
    #[must_use]
    pub fn siblings(&self) -> Vec<Array> {
        self.node.siblings.read().clone()
    }

    /// All outputs of this array's primitive in position order,
    /// including this array itself.
    #[must_use]
    pub fn outputs(&self) -> Vec<Array> {
        let siblings = self.node.siblings.read();
        if siblings.is_empty() {
            return vec![self.clone()];
        }
        let mut outs: Vec<Array> = siblings.iter().cloned().collect();
        outs.push(self.clone());
        outs.sort_by_key(Array::position);
        outs
    }

    /// The position of this array within its primitive's outputs.
    #[must_use]
    pub fn position(&self) -> usize {
        self.node.position
    }

    /// Whether this array's buffer has been materialized.
    #[must_use]
    pub fn is_evaled(&self) -> bool {
        self.node.data.read().is_some()
    }

    /// A copy of the materialized buffer, if any.
    #[must_use]
    pub fn data(&self) -> Option<Data> {
        self.node.data.read().clone()
    }

    /// The raw bit pattern of an evaluated scalar, widened to 64 bits.
    /// Returns `None` for unevaluated or non-scalar arrays.
    #[must_use]
    pub fn scalar_bits(&self) -> Option<u64> {
        if self.ndim() != 0 {
            return None;
        }
        self.node.data.read().as_ref().map(Data::scalar_bits)
    }

    /// Whether this array participates in a trace.
    #[must_use]
    pub fn is_tracer(&self) -> bool {
        self.node.tracer.load(Ordering::Relaxed)
    }

    /// Marks this array as a tracer (or clears the mark).
    pub fn set_tracer(&self, tracer: bool) {
        self.node.tracer.store(tracer, Ordering::Relaxed);
    }

    pub(crate) fn set_data(&self, data: Data) {
        *self.node.data.write() = Some(data);
    }

    // -------------------------------------------------------------------------
    // Evaluation Helpers
    // -------------------------------------------------------------------------

    /// Materializes this array's buffer.
    pub fn eval(&self) -> Result<()> {
        crate::eval::eval(std::slice::from_ref(self))
    }

    /// Evaluates and returns the contents widened to f64.
    pub fn to_vec_f64(&self) -> Result<Vec<f64>> {
        self.eval()?;
        self.node
            .data
            .read()
            .as_ref()
            .map(Data::to_f64_lanes)
            .ok_or_else(|| Error::internal("array evaluated but has no data"))
    }

    /// Evaluates and returns the single element of a scalar array.
    pub fn item<T: ArrayElement>(&self) -> Result<T> {
        self.eval()?;
        if self.size() != 1 {
            return Err(Error::invalid_operation(format!(
                "item() on array of size {}",
                self.size()
            )));
        }
        let guard = self.node.data.read();
        let data = guard
            .as_ref()
            .ok_or_else(|| Error::internal("array evaluated but has no data"))?;
        if data.dtype() != T::DTYPE {
            return Err(Error::DTypeMismatch {
                expected: T::DTYPE,
                actual: data.dtype(),
            });
        }
        T::unwrap_ref(data)
            .and_then(|s| s.first().copied())
            .ok_or_else(|| Error::internal("empty buffer in item()"))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::default_stream;

    use crate::op::Op;

    #[test]
    fn test_ids_are_unique() {
        let a = Array::scalar(1.0f32);
        let b = Array::scalar(1.0f32);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_constant_has_data() {
        let a = Array::from_slice(&[1.0f32, 2.0], &[2]).unwrap();
        assert!(a.is_evaled());
        assert!(!a.has_primitive());
        assert_eq!(a.dtype(), DType::F32);
        assert_eq!(a.size(), 2);
    }

    #[test]
    fn test_placeholder_is_tracer() {
        let p = Array::placeholder(vec![4], DType::F32);
        assert!(p.is_tracer());
        assert!(!p.is_evaled());
        assert!(!p.has_primitive());
    }

    #[test]
    fn test_tracer_propagates_through_inputs() {
        let p = Array::placeholder(vec![2], DType::F32);
        let prim = Arc::new(Primitive::new(Op::Negative, default_stream()));
        let out = Array::new(vec![2], DType::F32, Some(prim), vec![p]);
        assert!(out.is_tracer());
    }

    #[test]
    fn test_scalar_bits() {
        let a = Array::scalar(2.0f32);
        let b = Array::scalar(2.0f32);
        let c = Array::scalar(3.0f32);
        assert_eq!(a.scalar_bits(), b.scalar_bits());
        assert_ne!(a.scalar_bits(), c.scalar_bits());

        let v = Array::from_slice(&[2.0f32, 2.0], &[2]).unwrap();
        assert_eq!(v.scalar_bits(), None);
    }

    #[test]
    fn test_make_arrays_sibling_order() {
        let x = Array::from_slice(&[7.0f32], &[1]).unwrap();
        let y = Array::from_slice(&[2.0f32], &[1]).unwrap();
        let prim = Arc::new(Primitive::new(Op::DivMod, default_stream()));
        let outs = Array::make_arrays(
            vec![vec![1], vec![1]],
            vec![DType::F32, DType::F32],
            prim,
            vec![x, y],
        );
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].position(), 0);
        assert_eq!(outs[1].position(), 1);
        assert!(outs[0].same_primitive_instance(&outs[1]));

        let grouped = outs[1].outputs();
        assert_eq!(grouped[0].id(), outs[0].id());
        assert_eq!(grouped[1].id(), outs[1].id());
    }

    #[test]
    fn test_set_input_reroutes_edge() {
        let a = Array::scalar(1.0f32);
        let b = Array::scalar(2.0f32);
        let prim = Arc::new(Primitive::new(Op::Negative, default_stream()));
        let out = Array::new(vec![], DType::F32, Some(prim), vec![a]);
        out.set_input(0, b.clone());
        assert_eq!(out.input(0).id(), b.id());
    }
}
