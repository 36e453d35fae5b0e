//! End-to-end tests for the graph compiler: trace, rewrite, replay.

use weft::prelude::*;
use weft::{compile_erase, compiler_cache, CompileError, CompiledKernel, Op};

use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-6, "got {got:?}, want {want:?}");
    }
}

fn kernel_of(a: &Array) -> Arc<CompiledKernel> {
    match a.primitive().expect("compiled node").op() {
        Op::Compiled(kernel) => Arc::clone(kernel),
        other => panic!("expected compiled node, got {}", other.name()),
    }
}

fn compiled_nodes(tape: &[Array]) -> Vec<Array> {
    tape.iter()
        .filter(|a| {
            a.primitive()
                .is_some_and(|p| matches!(p.op(), Op::Compiled(_)))
        })
        .cloned()
        .collect()
}

/// The tape with compiled regions expanded back into their sub-tapes.
fn flattened(tape: &[Array]) -> Vec<Array> {
    let mut out = Vec::new();
    for a in tape {
        if let Some(p) = a.primitive() {
            if let Op::Compiled(kernel) = p.op() {
                out.extend(kernel.tape().iter().cloned());
                continue;
            }
        }
        out.push(a.clone());
    }
    out
}

fn cached_entry<F>(fun: &weft::CompiledFunction<F>, inputs: &[Array]) -> Arc<weft_compile::CacheEntry>
where
    F: Fn(&[Array]) -> weft_core::Result<Vec<Array>>,
{
    compiler_cache()
        .lookup(fun.fun_id(), inputs)
        .unwrap()
        .expect("entry cached")
}

// =============================================================================
// Scenario: scalar deduplication
// =============================================================================

fn add_two_twice(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let a = ops::add(&inputs[0], &Array::scalar(2.0f32))?;
    Ok(vec![ops::add(&a, &Array::scalar(2.0f32))?])
}

#[test]
fn test_scalar_dedup_end_to_end() {
    let fun = compile(add_two_twice).unwrap();
    let x = Array::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[4]).unwrap();
    let out = fun.call(&[x.clone()]).unwrap();
    assert_close(&out[0].to_vec_f64().unwrap(), &[5.0, 6.0, 7.0, 8.0]);

    // Exactly one 2.0 constant survives in the rewritten trace.
    let entry = cached_entry(&fun, &[x]);
    let scalars: Vec<Array> = flattened(&entry.tape)
        .into_iter()
        .filter(|a| a.scalar_bits().is_some())
        .collect();
    assert_eq!(scalars.len(), 1);
    assert_eq!(scalars[0].item::<f32>().unwrap(), 2.0);
}

// =============================================================================
// Scenario: common subexpression fusion
// =============================================================================

fn sin_squared(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let s1 = ops::sin(&inputs[0]);
    let s2 = ops::sin(&inputs[0]);
    Ok(vec![ops::multiply(&s1, &s2)?])
}

#[test]
fn test_cse_end_to_end() {
    let fun = compile(sin_squared).unwrap();
    let x = Array::from_slice(&[0.5f32, 1.0, 2.0], &[3]).unwrap();
    let out = fun.call(&[x.clone()]).unwrap();

    let want: Vec<f64> = [0.5f64, 1.0, 2.0]
        .iter()
        .map(|v| v.sin() * v.sin())
        .collect();
    assert_close(&out[0].to_vec_f64().unwrap(), &want);

    // One sine, consumed twice by the multiply.
    let entry = cached_entry(&fun, &[x]);
    let flat = flattened(&entry.tape);
    let sines = flat
        .iter()
        .filter(|a| a.primitive().is_some_and(|p| matches!(p.op(), Op::Sin)))
        .count();
    assert_eq!(sines, 1);
}

// =============================================================================
// Scenario: elementwise fusion
// =============================================================================

fn exp_sum_times_sum(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let sum = ops::add(&inputs[0], &inputs[1])?;
    Ok(vec![ops::multiply(&ops::exp(&sum), &sum)?])
}

#[test]
fn test_fusion_end_to_end() {
    let fun = compile(exp_sum_times_sum).unwrap();
    let x = Array::from_slice(&[0.0f32, 0.5, 1.0], &[3]).unwrap();
    let y = Array::from_slice(&[1.0f32, 0.5, -1.0], &[3]).unwrap();
    let out = fun.call(&[x.clone(), y.clone()]).unwrap();

    let want: Vec<f64> = [1.0f64, 1.0, 0.0].iter().map(|s| s.exp() * s).collect();
    assert_close(&out[0].to_vec_f64().unwrap(), &want);

    // A single compiled region with inputs {x, y} and the full
    // elementwise body inside.
    let entry = cached_entry(&fun, &[x, y]);
    let compiled = compiled_nodes(&entry.tape);
    assert_eq!(compiled.len(), 1);
    let kernel = kernel_of(&compiled[0]);
    assert_eq!(kernel.inputs().len(), 2);
    let names: Vec<&'static str> = kernel
        .tape()
        .iter()
        .filter_map(|a| a.primitive().map(|p| p.op().name()))
        .collect();
    assert_eq!(names, vec!["add", "exp", "multiply"]);
}

// =============================================================================
// Scenario: partition cut at a non-fusable consumer
// =============================================================================

fn matmul_of_exp(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let e = ops::exp(&inputs[0]);
    Ok(vec![ops::matmul(&inputs[0], &e)?])
}

#[test]
fn test_partition_cut_end_to_end() {
    let fun = compile(matmul_of_exp).unwrap();
    let x = Array::from_slice(&[1.0f32, 0.0, 0.0, 1.0], &[2, 2]).unwrap();
    let out = fun.call(&[x.clone()]).unwrap();

    let e = std::f64::consts::E;
    assert_close(&out[0].to_vec_f64().unwrap(), &[e, 1.0, 1.0, e]);

    // exp stays outside any region: its only consumer is opaque.
    let entry = cached_entry(&fun, &[x]);
    assert!(compiled_nodes(&entry.tape).is_empty());
}

// =============================================================================
// Scenario: depth cap
// =============================================================================

fn negate_twenty(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let mut cur = inputs[0].clone();
    for _ in 0..20 {
        cur = ops::negative(&cur);
    }
    Ok(vec![cur])
}

#[test]
fn test_depth_cap_end_to_end() {
    let fun = compile(negate_twenty).unwrap();
    let x = Array::from_slice(&[1.0f32, -2.5, 3.0], &[3]).unwrap();
    let out = fun.call(&[x.clone()]).unwrap();
    // Twenty negations cancel.
    assert_close(&out[0].to_vec_f64().unwrap(), &[1.0, -2.5, 3.0]);

    let entry = cached_entry(&fun, &[x]);
    let compiled = compiled_nodes(&entry.tape);
    assert!(compiled.len() >= 3, "expected >= 3 regions, got {}", compiled.len());
    for c in &compiled {
        let fused = kernel_of(c)
            .tape()
            .iter()
            .filter(|a| a.has_primitive())
            .count();
        assert!(fused <= 8, "region of {fused} fusable arrays exceeds the cap");
    }
}

// =============================================================================
// Multi-output primitives
// =============================================================================

fn duplicate_divmod(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let (q1, _r1) = ops::divmod(&inputs[0], &inputs[1])?;
    let (_q2, r2) = ops::divmod(&inputs[0], &inputs[1])?;
    Ok(vec![ops::add(&q1, &r2)?])
}

#[test]
fn test_divmod_cse_end_to_end() {
    let fun = compile(duplicate_divmod).unwrap();
    let x = Array::from_slice(&[7.0f32, 9.0], &[2]).unwrap();
    let y = Array::from_slice(&[2.0f32, 4.0], &[2]).unwrap();
    let out = fun.call(&[x.clone(), y.clone()]).unwrap();
    assert_close(&out[0].to_vec_f64().unwrap(), &[4.0, 3.0]);

    // The duplicate group collapsed; one divmod remains.
    let entry = cached_entry(&fun, &[x, y]);
    let divmods = flattened(&entry.tape)
        .iter()
        .filter(|a| a.primitive().is_some_and(|p| matches!(p.op(), Op::DivMod)))
        .count();
    assert_eq!(divmods, 1);
}

// =============================================================================
// Tape validity after the full pipeline
// =============================================================================

fn busy_function(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let x = &inputs[0];
    let a = ops::add(&ops::sin(x), &Array::scalar(2.0f32))?;
    let b = ops::add(&ops::sin(x), &Array::scalar(2.0f32))?;
    let m = ops::multiply(&a, &b)?;
    let s = ops::sum(&m, None)?;
    Ok(vec![ops::multiply(&m, &ops::broadcast_to(&s, &[4])?)?, s])
}

#[test]
fn test_tape_is_topologically_valid() {
    let fun = compile(busy_function).unwrap();
    let x = Array::from_slice(&[0.1f32, 0.2, 0.3, 0.4], &[4]).unwrap();
    fun.call(&[x.clone()]).unwrap();

    let entry = cached_entry(&fun, &[x]);
    let mut defined: Vec<weft::ArrayId> = entry.inputs.iter().map(Array::id).collect();
    for a in &entry.tape {
        for input in a.inputs() {
            assert!(
                defined.contains(&input.id()),
                "tape entry consumes an undefined array"
            );
        }
        defined.push(a.id());
    }
    // Declared outputs resolve from the tape or the inputs.
    for o in &entry.outputs {
        assert!(defined.contains(&o.id()));
    }
}

// =============================================================================
// Replay behavior
// =============================================================================

fn silu(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
    let x = &inputs[0];
    Ok(vec![ops::multiply(x, &ops::sigmoid(x))?])
}

#[test]
fn test_replay_matches_direct_execution() {
    let fun = compile(silu).unwrap();
    let x1 = Array::from_slice(&[0.0f32, 1.0, -1.0, 3.5], &[4]).unwrap();
    let x2 = Array::from_slice(&[2.0f32, -2.0, 0.5, -0.5], &[4]).unwrap();

    for x in [x1, x2] {
        let compiled_out = fun.call(&[x.clone()]).unwrap();
        let direct_out = silu(&[x]).unwrap();
        assert_close(
            &compiled_out[0].to_vec_f64().unwrap(),
            &direct_out[0].to_vec_f64().unwrap(),
        );
    }
}

#[test]
fn test_erase_forces_recompile() {
    fn quadruple(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
        let two = Array::scalar(2.0f32);
        let d = ops::multiply(&inputs[0], &ops::broadcast_to(&two, inputs[0].shape())?)?;
        Ok(vec![ops::multiply(&d, &Array::scalar(2.0f32))?])
    }
    let fun = compile(quadruple).unwrap();
    let x = Array::from_slice(&[1.0f32, 2.0], &[2]).unwrap();
    fun.call(&[x.clone()]).unwrap();
    assert_eq!(compiler_cache().entry_count(fun.fun_id()), 1);

    compile_erase(fun.fun_id());
    assert_eq!(compiler_cache().entry_count(fun.fun_id()), 0);

    let out = fun.call(&[x]).unwrap();
    assert_close(&out[0].to_vec_f64().unwrap(), &[4.0, 8.0]);
    assert_eq!(compiler_cache().entry_count(fun.fun_id()), 1);
}

// =============================================================================
// vmap over a compiled region
// =============================================================================

#[test]
fn test_vmap_through_compiled_region() {
    let fun = compile(silu).unwrap();
    let x = Array::from_slice(&[0.0f32, 1.0, -1.0], &[3]).unwrap();
    fun.call(&[x.clone()]).unwrap();

    let entry = cached_entry(&fun, &[x]);
    let compiled = compiled_nodes(&entry.tape);
    assert_eq!(compiled.len(), 1);
    let kernel = kernel_of(&compiled[0]);

    let batch =
        Array::from_slice(&[0.0f32, 1.0, -1.0, 2.0, -2.0, 0.5], &[2, 3]).unwrap();
    let (outs, axes) = kernel.vmap(&[batch.clone()], &[Some(0)]).unwrap();
    assert_eq!(outs.len(), 1);
    assert_eq!(axes, vec![Some(0)]);

    let got = outs[0].to_vec_f64().unwrap();
    let want: Vec<f64> = batch
        .to_vec_f64()
        .unwrap()
        .iter()
        .map(|v| v * (1.0 / (1.0 + (-v).exp())))
        .collect();
    assert_close(&got, &want);
}

// =============================================================================
// Error paths
// =============================================================================

#[test]
fn test_capturing_closure_is_rejected() {
    let captured = Array::scalar(3.0f32);
    let fun = move |ins: &[Array]| ops::add(&ins[0], &captured).map(|a| vec![a]);
    assert!(matches!(
        compile(fun),
        Err(CompileError::NonAddressableFunction)
    ));
}

#[test]
fn test_input_count_mismatch() {
    fn one_input(inputs: &[Array]) -> weft_core::Result<Vec<Array>> {
        Ok(vec![ops::abs(&inputs[0])])
    }
    let fun = compile(one_input).unwrap();
    let x = Array::from_slice(&[1.0f32], &[1]).unwrap();
    fun.call(&[x.clone()]).unwrap();

    let err = fun.call(&[x.clone(), x]).unwrap_err();
    assert!(matches!(err, CompileError::InputCountMismatch { .. }));
}

#[test]
fn test_failing_user_function_leaves_no_entry() {
    fn always_fails(_: &[Array]) -> weft_core::Result<Vec<Array>> {
        Err(weft_core::Error::invalid_operation("nope"))
    }
    let fun = compile(always_fails).unwrap();
    let x = Array::from_slice(&[1.0f32], &[1]).unwrap();

    let err = fun.call(&[x]).unwrap_err();
    assert!(matches!(err, CompileError::UserFunction { .. }));
    assert_eq!(compiler_cache().entry_count(fun.fun_id()), 0);
}
