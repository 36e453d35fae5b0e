//! Primitive Operations
//!
//! The closed set of operations an array node can record. `Op` is a
//! tagged union; operator-specific parameters live on their variants,
//! so equivalence is a discriminant check plus parameter equality.
//! [`Primitive`] wraps an `Op` with the stream it executes on; sibling
//! outputs of a multi-output primitive share one `Arc<Primitive>`
//! instance.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::Arc;

use weft_core::{DType, Error, Result, Stream};

use crate::array::Array;
use crate::compiled::CompiledKernel;

// =============================================================================
// Op Enum
// =============================================================================

/// A primitive operation.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum Op {
    // Unary elementwise
    Abs,
    Negative,
    Exp,
    Log,
    Log1p,
    Sigmoid,
    Sqrt,
    Square,
    Sign,
    Round,
    Floor,
    Ceil,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    ArcSin,
    ArcCos,
    ArcTan,
    ArcSinh,
    ArcCosh,
    ArcTanh,
    Erf,
    ErfInv,
    LogicalNot,
    /// Elementwise remainder by a fixed scalar divisor.
    RemainderScalar {
        /// The divisor.
        divisor: f64,
    },
    /// Cast to a different dtype.
    AsType {
        /// The target dtype.
        dtype: DType,
    },
    Copy,

    // Binary elementwise
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Maximum,
    Minimum,
    LogAddExp,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    /// Broadcast to a target shape.
    Broadcast {
        /// The target shape.
        shape: Vec<usize>,
    },

    // Opaque to the rewriter
    MatMul,
    /// Reduction over one axis, or over everything when `axis` is None.
    Sum {
        /// The reduced axis.
        axis: Option<usize>,
    },
    /// Floored quotient and remainder; two outputs.
    DivMod,

    /// A fused region produced by the graph compiler.
    Compiled(Arc<CompiledKernel>),
}

impl Op {
    /// A short name for diagnostics and kernel printing.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Negative => "negative",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log1p => "log1p",
            Self::Sigmoid => "sigmoid",
            Self::Sqrt => "sqrt",
            Self::Square => "square",
            Self::Sign => "sign",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::ArcSin => "arcsin",
            Self::ArcCos => "arccos",
            Self::ArcTan => "arctan",
            Self::ArcSinh => "arcsinh",
            Self::ArcCosh => "arccosh",
            Self::ArcTanh => "arctanh",
            Self::Erf => "erf",
            Self::ErfInv => "erfinv",
            Self::LogicalNot => "logical_not",
            Self::RemainderScalar { .. } => "remainder_scalar",
            Self::AsType { .. } => "astype",
            Self::Copy => "copy",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::LogAddExp => "logaddexp",
            Self::LogicalAnd => "logical_and",
            Self::LogicalOr => "logical_or",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Greater => "greater",
            Self::GreaterEqual => "greater_equal",
            Self::Broadcast { .. } => "broadcast",
            Self::MatMul => "matmul",
            Self::Sum { .. } => "sum",
            Self::DivMod => "divmod",
            Self::Compiled(_) => "compiled",
        }
    }

    /// The number of outputs this operation produces.
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        match self {
            Self::DivMod => 2,
            Self::Compiled(kernel) => kernel.outputs().len(),
            _ => 1,
        }
    }

    /// Whether two ops denote the same operation: same discriminant and
    /// equal operator parameters. A `Compiled` region is never
    /// equivalent to anything, including another `Compiled`.
    #[must_use]
    pub fn is_equivalent(&self, other: &Op) -> bool {
        match (self, other) {
            (Self::Compiled(_), _) | (_, Self::Compiled(_)) => false,
            (Self::RemainderScalar { divisor: a }, Self::RemainderScalar { divisor: b }) => {
                a.to_bits() == b.to_bits()
            }
            (Self::AsType { dtype: a }, Self::AsType { dtype: b }) => a == b,
            (Self::Broadcast { shape: a }, Self::Broadcast { shape: b }) => a == b,
            (Self::Sum { axis: a }, Self::Sum { axis: b }) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    /// Whether results are boolean regardless of input dtypes.
    #[must_use]
    pub fn is_boolean_output(&self) -> bool {
        matches!(
            self,
            Self::LogicalNot
                | Self::LogicalAnd
                | Self::LogicalOr
                | Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }

    /// Whether this op always produces a floating point result.
    #[must_use]
    pub fn forces_float_output(&self) -> bool {
        matches!(
            self,
            Self::Exp
                | Self::Log
                | Self::Log1p
                | Self::Sigmoid
                | Self::Sqrt
                | Self::Sin
                | Self::Cos
                | Self::Tan
                | Self::Sinh
                | Self::Cosh
                | Self::Tanh
                | Self::ArcSin
                | Self::ArcCos
                | Self::ArcTan
                | Self::ArcSinh
                | Self::ArcCosh
                | Self::ArcTanh
                | Self::Erf
                | Self::ErfInv
                | Self::LogAddExp
        )
    }

    /// The result dtype for the given input dtypes.
    #[must_use]
    pub fn result_dtype(&self, input_dtypes: &[DType]) -> DType {
        if self.is_boolean_output() {
            return DType::Bool;
        }
        if let Self::AsType { dtype } = self {
            return *dtype;
        }
        let promoted = input_dtypes
            .iter()
            .copied()
            .reduce(DType::promote)
            .unwrap_or_default();
        if self.forces_float_output() && !promoted.is_float() {
            DType::default_float()
        } else {
            promoted
        }
    }
}

// =============================================================================
// Primitive
// =============================================================================

/// An operation instance bound to an execution stream.
#[derive(Debug)]
pub struct Primitive {
    op: Op,
    stream: Stream,
}

impl Primitive {
    /// Creates a primitive on the given stream.
    #[must_use]
    pub fn new(op: Op, stream: Stream) -> Self {
        Self { op, stream }
    }

    /// The operation.
    #[must_use]
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// The stream this primitive executes on.
    #[must_use]
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Whether two primitive instances denote the same operation.
    #[must_use]
    pub fn is_equivalent(&self, other: &Primitive) -> bool {
        self.op.is_equivalent(&other.op)
    }

    /// Vectorizes this primitive over a batch axis: rebuilds the same
    /// operation over the batched inputs and maps the axis through.
    ///
    /// Supported for elementwise and broadcast operations (and for
    /// `Compiled`, which forwards to each node of its captured trace);
    /// opaque operations fail with `NotImplemented`.
    pub fn vmap(
        &self,
        inputs: &[Array],
        axes: &[Option<usize>],
    ) -> Result<(Vec<Array>, Vec<Option<usize>>)> {
        let mut out_axis = None;
        for ax in axes {
            match (out_axis, ax) {
                (None, Some(a)) => out_axis = Some(*a),
                (Some(prev), Some(a)) if prev != *a => {
                    return Err(Error::invalid_operation(format!(
                        "vmap axis mismatch: {prev} vs {a}"
                    )));
                }
                _ => {}
            }
        }

        match &self.op {
            Op::Compiled(kernel) => kernel.vmap(inputs, axes),
            Op::MatMul | Op::Sum { .. } | Op::DivMod => Err(Error::not_implemented(format!(
                "vmap for {}",
                self.op.name()
            ))),
            Op::Broadcast { shape } => {
                let input = inputs.first().ok_or_else(|| {
                    Error::invalid_operation("broadcast vmap without an input")
                })?;
                let mut target = shape.clone();
                if let Some(ax) = out_axis {
                    let batch = input.shape().get(ax).copied().unwrap_or(1);
                    target.insert(ax, batch);
                }
                let out = Array::new(
                    target.clone(),
                    input.dtype(),
                    Some(Arc::new(Primitive::new(
                        Op::Broadcast { shape: target },
                        self.stream,
                    ))),
                    vec![input.clone()],
                );
                Ok((vec![out], vec![out_axis]))
            }
            op => {
                let input = inputs.first().ok_or_else(|| {
                    Error::invalid_operation("vmap without inputs")
                })?;
                let shape = input.shape().to_vec();
                for other in &inputs[1..] {
                    if other.shape() != shape.as_slice() {
                        return Err(Error::shape_mismatch(&shape, other.shape()));
                    }
                }
                let dtypes: Vec<DType> = inputs.iter().map(Array::dtype).collect();
                let out = Array::new(
                    shape,
                    op.result_dtype(&dtypes),
                    Some(Arc::new(Primitive::new(op.clone(), self.stream))),
                    inputs.to_vec(),
                );
                Ok((vec![out], vec![out_axis]))
            }
        }
    }
}

impl core::fmt::Display for Primitive {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.op.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalence_by_kind() {
        assert!(Op::Add.is_equivalent(&Op::Add));
        assert!(!Op::Add.is_equivalent(&Op::Multiply));
    }

    #[test]
    fn test_equivalence_checks_parameters() {
        let a = Op::Broadcast { shape: vec![2, 3] };
        let b = Op::Broadcast { shape: vec![2, 3] };
        let c = Op::Broadcast { shape: vec![3, 2] };
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));

        let r1 = Op::RemainderScalar { divisor: 3.0 };
        let r2 = Op::RemainderScalar { divisor: 4.0 };
        assert!(!r1.is_equivalent(&r2));

        assert!(!Op::Sum { axis: Some(0) }.is_equivalent(&Op::Sum { axis: None }));
    }

    #[test]
    fn test_result_dtype() {
        use weft_core::DType::{Bool, F32, F64, I32, I64};
        assert_eq!(Op::Add.result_dtype(&[I32, F32]), F32);
        assert_eq!(Op::Less.result_dtype(&[F64, F64]), Bool);
        assert_eq!(Op::Exp.result_dtype(&[I64]), F32);
        assert_eq!(Op::AsType { dtype: I32 }.result_dtype(&[F32]), I32);
        assert_eq!(Op::Negative.result_dtype(&[I64]), I64);
    }

    #[test]
    fn test_num_outputs() {
        assert_eq!(Op::Add.num_outputs(), 1);
        assert_eq!(Op::DivMod.num_outputs(), 2);
    }
}
