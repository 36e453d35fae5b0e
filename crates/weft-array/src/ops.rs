//! Op Constructors
//!
//! User-facing graph builders. Each constructor records a node pointing
//! at its inputs; binary constructors insert explicit `Broadcast` nodes
//! so every elementwise node sees equal input shapes, and result dtypes
//! follow the promotion rules on [`Op`].
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::Arc;

use weft_core::{default_stream, DType, Error, Result};

use crate::array::Array;
use crate::op::{Op, Primitive};

fn primitive(op: Op) -> Arc<Primitive> {
    Arc::new(Primitive::new(op, default_stream()))
}

fn unary(op: Op, x: &Array) -> Array {
    let dtype = op.result_dtype(&[x.dtype()]);
    Array::new(x.shape().to_vec(), dtype, Some(primitive(op)), vec![x.clone()])
}

fn binary(op: Op, a: &Array, b: &Array) -> Result<Array> {
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    let dtype = op.result_dtype(&[a.dtype(), b.dtype()]);
    let a = broadcast_to(a, &shape)?;
    let b = broadcast_to(b, &shape)?;
    Ok(Array::new(shape, dtype, Some(primitive(op)), vec![a, b]))
}

/// Computes the right-aligned broadcast of two shapes.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        if da != db && da != 1 && db != 1 {
            return Err(Error::BroadcastError {
                shape1: a.to_vec(),
                shape2: b.to_vec(),
            });
        }
        out[ndim - 1 - i] = da.max(db);
    }
    Ok(out)
}

/// Broadcasts `x` to `shape`, or returns it unchanged if the shape
/// already matches.
pub fn broadcast_to(x: &Array, shape: &[usize]) -> Result<Array> {
    if x.shape() == shape {
        return Ok(x.clone());
    }
    // Validity falls out of the pairwise broadcast rule.
    broadcast_shapes(x.shape(), shape).and_then(|s| {
        if s == shape {
            Ok(Array::new(
                shape.to_vec(),
                x.dtype(),
                Some(primitive(Op::Broadcast {
                    shape: shape.to_vec(),
                })),
                vec![x.clone()],
            ))
        } else {
            Err(Error::BroadcastError {
                shape1: x.shape().to_vec(),
                shape2: shape.to_vec(),
            })
        }
    })
}

macro_rules! unary_ops {
    ($(($name:ident, $op:expr, $doc:literal)),* $(,)?) => {
        $(
            #[doc = $doc]
            #[must_use]
            pub fn $name(x: &Array) -> Array {
                unary($op, x)
            }
        )*
    };
}

unary_ops![
    (abs, Op::Abs, "Elementwise absolute value."),
    (negative, Op::Negative, "Elementwise negation."),
    (exp, Op::Exp, "Elementwise exponential."),
    (log, Op::Log, "Elementwise natural logarithm."),
    (log1p, Op::Log1p, "Elementwise `ln(1 + x)`."),
    (sigmoid, Op::Sigmoid, "Elementwise logistic sigmoid."),
    (sqrt, Op::Sqrt, "Elementwise square root."),
    (square, Op::Square, "Elementwise square."),
    (sign, Op::Sign, "Elementwise sign (`-1`, `0`, or `1`)."),
    (round, Op::Round, "Elementwise rounding to the nearest integer."),
    (floor, Op::Floor, "Elementwise floor."),
    (ceil, Op::Ceil, "Elementwise ceiling."),
    (sin, Op::Sin, "Elementwise sine."),
    (cos, Op::Cos, "Elementwise cosine."),
    (tan, Op::Tan, "Elementwise tangent."),
    (sinh, Op::Sinh, "Elementwise hyperbolic sine."),
    (cosh, Op::Cosh, "Elementwise hyperbolic cosine."),
    (tanh, Op::Tanh, "Elementwise hyperbolic tangent."),
    (arcsin, Op::ArcSin, "Elementwise inverse sine."),
    (arccos, Op::ArcCos, "Elementwise inverse cosine."),
    (arctan, Op::ArcTan, "Elementwise inverse tangent."),
    (arcsinh, Op::ArcSinh, "Elementwise inverse hyperbolic sine."),
    (arccosh, Op::ArcCosh, "Elementwise inverse hyperbolic cosine."),
    (arctanh, Op::ArcTanh, "Elementwise inverse hyperbolic tangent."),
    (erf, Op::Erf, "Elementwise error function."),
    (erf_inv, Op::ErfInv, "Elementwise inverse error function."),
    (logical_not, Op::LogicalNot, "Elementwise logical negation."),
    (copy, Op::Copy, "Elementwise copy."),
];

macro_rules! binary_ops {
    ($(($name:ident, $op:expr, $doc:literal)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub fn $name(a: &Array, b: &Array) -> Result<Array> {
                binary($op, a, b)
            }
        )*
    };
}

binary_ops![
    (add, Op::Add, "Elementwise addition with broadcasting."),
    (subtract, Op::Subtract, "Elementwise subtraction with broadcasting."),
    (multiply, Op::Multiply, "Elementwise multiplication with broadcasting."),
    (divide, Op::Divide, "Elementwise division with broadcasting."),
    (power, Op::Power, "Elementwise power with broadcasting."),
    (maximum, Op::Maximum, "Elementwise maximum with broadcasting."),
    (minimum, Op::Minimum, "Elementwise minimum with broadcasting."),
    (logaddexp, Op::LogAddExp, "Elementwise `ln(exp(a) + exp(b))`, computed stably."),
    (logical_and, Op::LogicalAnd, "Elementwise logical and."),
    (logical_or, Op::LogicalOr, "Elementwise logical or."),
    (eq, Op::Equal, "Elementwise equality comparison."),
    (ne, Op::NotEqual, "Elementwise inequality comparison."),
    (lt, Op::Less, "Elementwise less-than comparison."),
    (le, Op::LessEqual, "Elementwise less-or-equal comparison."),
    (gt, Op::Greater, "Elementwise greater-than comparison."),
    (ge, Op::GreaterEqual, "Elementwise greater-or-equal comparison."),
];

/// Elementwise remainder by a fixed scalar divisor (floored).
#[must_use]
pub fn remainder_scalar(x: &Array, divisor: f64) -> Array {
    unary(Op::RemainderScalar { divisor }, x)
}

/// Casts to a different dtype.
#[must_use]
pub fn astype(x: &Array, dtype: DType) -> Array {
    unary(Op::AsType { dtype }, x)
}

/// Matrix product of two 2-D arrays.
pub fn matmul(a: &Array, b: &Array) -> Result<Array> {
    if a.ndim() != 2 || b.ndim() != 2 {
        return Err(Error::invalid_operation(format!(
            "matmul expects 2-D operands, got {}-D and {}-D",
            a.ndim(),
            b.ndim()
        )));
    }
    let (m, k) = (a.shape()[0], a.shape()[1]);
    let (k2, n) = (b.shape()[0], b.shape()[1]);
    if k != k2 {
        return Err(Error::shape_mismatch(a.shape(), b.shape()));
    }
    let dtype = DType::promote(a.dtype(), b.dtype());
    Ok(Array::new(
        vec![m, n],
        dtype,
        Some(primitive(Op::MatMul)),
        vec![a.clone(), b.clone()],
    ))
}

/// Sum over one axis, or over all elements when `axis` is `None`.
pub fn sum(x: &Array, axis: Option<usize>) -> Result<Array> {
    let shape = match axis {
        None => Vec::new(),
        Some(ax) => {
            if ax >= x.ndim() {
                return Err(Error::invalid_operation(format!(
                    "sum axis {ax} out of range for {}-D array",
                    x.ndim()
                )));
            }
            let mut s = x.shape().to_vec();
            s.remove(ax);
            s
        }
    };
    Ok(Array::new(
        shape,
        x.dtype(),
        Some(primitive(Op::Sum { axis })),
        vec![x.clone()],
    ))
}

/// Floored quotient and remainder, as two outputs of one primitive.
pub fn divmod(a: &Array, b: &Array) -> Result<(Array, Array)> {
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    let dtype = DType::promote(a.dtype(), b.dtype());
    let a = broadcast_to(a, &shape)?;
    let b = broadcast_to(b, &shape)?;
    let outs = Array::make_arrays(
        vec![shape.clone(), shape],
        vec![dtype, dtype],
        primitive(Op::DivMod),
        vec![a, b],
    );
    let mut iter = outs.into_iter();
    match (iter.next(), iter.next()) {
        (Some(q), Some(r)) => Ok((q, r)),
        _ => Err(Error::internal("divmod produced fewer than two outputs")),
    }
}

// =============================================================================
// Tests
// =============================================================================
