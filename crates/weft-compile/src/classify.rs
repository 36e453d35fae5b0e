//! Primitive Classification
//!
//! Decides which operations the fusion partitioner may pack into a
//! compiled region. The fusable set is closed and deliberately small:
//! an operation wrongly classified here would end up inside a region
//! whose semantics the runtime cannot synthesize. Adding a kind means
//! editing exactly one table below.
//!
//! @version 0.1.0
//! @author Weft Development Team

use weft_array::Op;

/// Whether `op` is a unary elementwise operation.
#[must_use]
pub fn is_unary(op: &Op) -> bool {
    matches!(
        op,
        Op::Abs
            | Op::Negative
            | Op::Exp
            | Op::Log
            | Op::Log1p
            | Op::Sigmoid
            | Op::Sqrt
            | Op::Square
            | Op::Sign
            | Op::Round
            | Op::Floor
            | Op::Ceil
            | Op::Sin
            | Op::Cos
            | Op::Tan
            | Op::Sinh
            | Op::Cosh
            | Op::Tanh
            | Op::ArcSin
            | Op::ArcCos
            | Op::ArcTan
            | Op::ArcSinh
            | Op::ArcCosh
            | Op::ArcTanh
            | Op::Erf
            | Op::ErfInv
            | Op::LogicalNot
            | Op::RemainderScalar { .. }
            | Op::AsType { .. }
            | Op::Copy
    )
}

/// Whether `op` is a binary elementwise operation.
#[must_use]
pub fn is_binary(op: &Op) -> bool {
    matches!(
        op,
        Op::Add
            | Op::Subtract
            | Op::Multiply
            | Op::Divide
            | Op::Power
            | Op::Maximum
            | Op::Minimum
            | Op::LogAddExp
            | Op::LogicalAnd
            | Op::LogicalOr
            | Op::Equal
            | Op::NotEqual
            | Op::Less
            | Op::LessEqual
            | Op::Greater
            | Op::GreaterEqual
    )
}

/// Whether `op` is a broadcast.
#[must_use]
pub fn is_broadcast(op: &Op) -> bool {
    matches!(op, Op::Broadcast { .. })
}

/// Whether `op` may live inside a compiled region.
#[must_use]
pub fn is_fusable(op: &Op) -> bool {
    is_unary(op) || is_binary(op) || is_broadcast(op)
}

// =============================================================================
// Tests
// =============================================================================
