//! CPU Evaluator
//!
//! Walks a recorded graph post-order and materializes buffers. All
//! float math runs in f64 lanes and narrows back into the node's
//! dtype; integer and boolean values ride the same lanes, which is
//! exact for every integer the supported dtypes can hold in an f64.
//!
//! Compiled regions evaluate by rebuilding their captured sub-tape
//! against the node's (already real) inputs and interpreting it; the
//! runtime that synthesizes actual fused kernels replaces exactly this
//! function.
//!
//! @version 0.1.0
//! @author Weft Development Team

use rayon::prelude::*;
use tracing::trace;

use weft_core::{Error, Result};

use crate::array::Array;
use crate::data::Data;
use crate::op::{Op, Primitive};

// =============================================================================
// Entry Points
// =============================================================================

/// Materializes the buffers of the given arrays and everything they
/// depend on.
pub fn eval(roots: &[Array]) -> Result<()> {
    for root in roots {
        eval_node(root)?;
    }
    Ok(())
}

fn eval_node(a: &Array) -> Result<()> {
    if a.is_evaled() {
        return Ok(());
    }
    let Some(primitive) = a.primitive() else {
        return Err(Error::invalid_operation(
            "cannot evaluate a placeholder array with no data",
        ));
    };
    for input in a.inputs() {
        eval_node(&input)?;
    }
    apply(&primitive, a)
}

// =============================================================================
// Primitive Application
// =============================================================================

fn apply(primitive: &Primitive, a: &Array) -> Result<()> {
    let inputs = a.inputs();
    match primitive.op() {
        Op::Compiled(kernel) => {
            trace!(region = %kernel, "interpreting compiled region");
            let real_outputs = kernel.to_real(&inputs)?;
            for (out, real) in a.outputs().iter().zip(&real_outputs) {
                eval_node(real)?;
                let data = real
                    .data()
                    .ok_or_else(|| Error::internal("compiled output missing data"))?;
                out.set_data(data);
            }
            Ok(())
        }
        Op::DivMod => {
            let x = lanes(&inputs[0])?;
            let y = lanes(&inputs[1])?;
            check_lane_len(&x, &y)?;
            let q: Vec<f64> = x
                .par_iter()
                .zip(y.par_iter())
                .map(|(&a, &b)| (a / b).floor())
                .collect();
            let r: Vec<f64> = x
                .par_iter()
                .zip(y.par_iter())
                .map(|(&a, &b)| a - b * (a / b).floor())
                .collect();
            let outputs = a.outputs();
            outputs[0].set_data(Data::from_f64_lanes(outputs[0].dtype(), q));
            outputs[1].set_data(Data::from_f64_lanes(outputs[1].dtype(), r));
            Ok(())
        }
        Op::Broadcast { shape } => {
            let x = lanes(&inputs[0])?;
            let out = broadcast_lanes(&x, inputs[0].shape(), shape);
            a.set_data(Data::from_f64_lanes(a.dtype(), out));
            Ok(())
        }
        Op::MatMul => {
            let x = lanes(&inputs[0])?;
            let y = lanes(&inputs[1])?;
            let (m, k) = (inputs[0].shape()[0], inputs[0].shape()[1]);
            let n = inputs[1].shape()[1];
            let mut out = vec![0.0; m * n];
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0.0;
                    for l in 0..k {
                        acc += x[i * k + l] * y[l * n + j];
                    }
                    out[i * n + j] = acc;
                }
            }
            a.set_data(Data::from_f64_lanes(a.dtype(), out));
            Ok(())
        }
        Op::Sum { axis } => {
            let x = lanes(&inputs[0])?;
            let out = match axis {
                None => vec![x.iter().sum()],
                Some(ax) => reduce_axis(&x, inputs[0].shape(), *ax),
            };
            a.set_data(Data::from_f64_lanes(a.dtype(), out));
            Ok(())
        }
        Op::RemainderScalar { divisor } => {
            let d = *divisor;
            let x = lanes(&inputs[0])?;
            let out: Vec<f64> = x.par_iter().map(|&v| v - d * (v / d).floor()).collect();
            a.set_data(Data::from_f64_lanes(a.dtype(), out));
            Ok(())
        }
        op => {
            if let Some(f) = unary_fn(op) {
                let x = lanes(&inputs[0])?;
                let out: Vec<f64> = x.par_iter().map(|&v| f(v)).collect();
                a.set_data(Data::from_f64_lanes(a.dtype(), out));
                Ok(())
            } else if let Some(f) = binary_fn(op) {
                let x = lanes(&inputs[0])?;
                let y = lanes(&inputs[1])?;
                check_lane_len(&x, &y)?;
                let out: Vec<f64> = x
                    .par_iter()
                    .zip(y.par_iter())
                    .map(|(&a, &b)| f(a, b))
                    .collect();
                a.set_data(Data::from_f64_lanes(a.dtype(), out));
                Ok(())
            } else {
                Err(Error::not_implemented(format!("eval for {}", op.name())))
            }
        }
    }
}

fn lanes(a: &Array) -> Result<Vec<f64>> {
    a.data()
        .map(|d| d.to_f64_lanes())
        .ok_or_else(|| Error::internal("input not evaluated before use"))
}

fn check_lane_len(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() == y.len() {
        Ok(())
    } else {
        Err(Error::internal(format!(
            "elementwise lane mismatch: {} vs {}",
            x.len(),
            y.len()
        )))
    }
}

// =============================================================================
// Scalar Kernels
// =============================================================================

fn unary_fn(op: &Op) -> Option<fn(f64) -> f64> {
    Some(match op {
        Op::Abs => f64::abs,
        Op::Negative => |x| -x,
        Op::Exp => f64::exp,
        Op::Log => f64::ln,
        Op::Log1p => f64::ln_1p,
        Op::Sigmoid => |x| 1.0 / (1.0 + (-x).exp()),
        Op::Sqrt => f64::sqrt,
        Op::Square => |x| x * x,
        Op::Sign => |x| if x == 0.0 { 0.0 } else { x.signum() },
        Op::Round => f64::round,
        Op::Floor => f64::floor,
        Op::Ceil => f64::ceil,
        Op::Sin => f64::sin,
        Op::Cos => f64::cos,
        Op::Tan => f64::tan,
        Op::Sinh => f64::sinh,
        Op::Cosh => f64::cosh,
        Op::Tanh => f64::tanh,
        Op::ArcSin => f64::asin,
        Op::ArcCos => f64::acos,
        Op::ArcTan => f64::atan,
        Op::ArcSinh => f64::asinh,
        Op::ArcCosh => f64::acosh,
        Op::ArcTanh => f64::atanh,
        Op::Erf => libm::erf,
        Op::ErfInv => erf_inv,
        Op::LogicalNot => |x| f64::from(x == 0.0),
        Op::AsType { .. } | Op::Copy => |x| x,
        _ => return None,
    })
}

fn binary_fn(op: &Op) -> Option<fn(f64, f64) -> f64> {
    Some(match op {
        Op::Add => |a, b| a + b,
        Op::Subtract => |a, b| a - b,
        Op::Multiply => |a, b| a * b,
        Op::Divide => |a, b| a / b,
        Op::Power => f64::powf,
        Op::Maximum => f64::max,
        Op::Minimum => f64::min,
        Op::LogAddExp => logaddexp,
        Op::LogicalAnd => |a, b| f64::from(a != 0.0 && b != 0.0),
        Op::LogicalOr => |a, b| f64::from(a != 0.0 || b != 0.0),
        Op::Equal => |a, b| f64::from(a == b),
        Op::NotEqual => |a, b| f64::from(a != b),
        Op::Less => |a, b| f64::from(a < b),
        Op::LessEqual => |a, b| f64::from(a <= b),
        Op::Greater => |a, b| f64::from(a > b),
        Op::GreaterEqual => |a, b| f64::from(a >= b),
        _ => return None,
    })
}

fn logaddexp(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    if m.is_infinite() && m < 0.0 {
        f64::NEG_INFINITY
    } else {
        m + ((a - m).exp() + (b - m).exp()).ln()
    }
}

/// Inverse error function: rational initial guess refined with Newton
/// steps against `erf`.
fn erf_inv(x: f64) -> f64 {
    if x <= -1.0 {
        return f64::NEG_INFINITY;
    }
    if x >= 1.0 {
        return f64::INFINITY;
    }
    let w = -((1.0 - x) * (1.0 + x)).ln();
    let mut p = if w < 5.0 {
        let w = w - 2.5;
        let mut p = 2.810_226_36e-8;
        p = 3.432_739_39e-7 + p * w;
        p = -3.523_387_7e-6 + p * w;
        p = -4.391_506_54e-6 + p * w;
        p = 2.185_808_7e-4 + p * w;
        p = -1.253_725_03e-3 + p * w;
        p = -4.177_681_64e-3 + p * w;
        p = 2.466_407_27e-1 + p * w;
        p = 1.501_409_41 + p * w;
        p * x
    } else {
        let w = w.sqrt() - 3.0;
        let mut p = -2.002_142_57e-4;
        p = 1.009_505_58e-4 + p * w;
        p = 1.349_343_22e-3 + p * w;
        p = -3.673_428_44e-3 + p * w;
        p = 5.739_507_73e-3 + p * w;
        p = -7.622_461_3e-3 + p * w;
        p = 9.438_870_47e-3 + p * w;
        p = 1.001_674_06 + p * w;
        p = 2.832_976_82 + p * w;
        p * x
    };
    let two_over_sqrt_pi = 2.0 / core::f64::consts::PI.sqrt();
    for _ in 0..2 {
        let err = libm::erf(p) - x;
        p -= err / (two_over_sqrt_pi * (-p * p).exp());
    }
    p
}

// =============================================================================
// Shape Helpers
// =============================================================================

fn broadcast_lanes(lanes: &[f64], in_shape: &[usize], out_shape: &[usize]) -> Vec<f64> {
    let r_out = out_shape.len();
    let r_in = in_shape.len();
    let out_size: usize = out_shape.iter().product();

    let mut in_strides = vec![0usize; r_out];
    let mut stride = 1;
    for k in (0..r_in).rev() {
        in_strides[r_out - r_in + k] = if in_shape[k] == 1 { 0 } else { stride };
        stride *= in_shape[k];
    }

    let mut out_strides = vec![1usize; r_out];
    for d in (0..r_out.saturating_sub(1)).rev() {
        out_strides[d] = out_strides[d + 1] * out_shape[d + 1];
    }

    (0..out_size)
        .map(|i| {
            let mut src = 0;
            for d in 0..r_out {
                let idx = (i / out_strides[d]) % out_shape[d];
                src += idx * in_strides[d];
            }
            lanes[src]
        })
        .collect()
}

fn reduce_axis(lanes: &[f64], shape: &[usize], axis: usize) -> Vec<f64> {
    let inner: usize = shape[axis + 1..].iter().product();
    let outer: usize = shape[..axis].iter().product();
    let n = shape[axis];
    let mut out = vec![0.0; outer * inner];
    for o in 0..outer {
        for j in 0..n {
            for i in 0..inner {
                out[o * inner + i] += lanes[(o * n + j) * inner + i];
            }
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
