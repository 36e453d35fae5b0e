//! Compile Driver
//!
//! The public transform: `compile(fun)` wraps a function over arrays
//! so that its first call per input signature traces and rewrites the
//! graph, and every later call replays the cached tape. The pipeline
//! per miss is trace, walk, simplify, partition, store; parent lists
//! never outlive the compile that built them.
//!
//! Compilation can be bypassed globally, either from code
//! (`disable_compile`) or by setting the `WEFT_DISABLE_COMPILE`
//! environment variable to any non-empty value before first use.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use weft_array::Array;

use crate::cache::{compiler_cache, CacheEntry, FunId};
use crate::error::{CompileError, CompileResult};
use crate::partition::partition_tape;
use crate::replace::replace_tape;
use crate::simplify::simplify_tape;
use crate::trace::{trace_count, trace_graph};
use crate::walk::walk_graph;

// =============================================================================
// Options
// =============================================================================

/// Default number of common-subexpression fusion passes.
pub const DEFAULT_SIMPLIFY_PASSES: usize = 3;

/// Default cap on fusable arrays per compiled region. Unbounded
/// regions explode downstream kernel-synthesis cost.
pub const DEFAULT_MAX_REGION_SIZE: usize = 8;

/// Tuning knobs for the rewrite pipeline.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Number of common-subexpression fusion passes.
    pub simplify_passes: usize,
    /// Maximum fusable arrays per compiled region.
    pub max_region_size: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            simplify_passes: DEFAULT_SIMPLIFY_PASSES,
            max_region_size: DEFAULT_MAX_REGION_SIZE,
        }
    }
}

impl CompileOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the number of simplification passes.
    #[must_use]
    pub fn simplify_passes(mut self, passes: usize) -> Self {
        self.simplify_passes = passes;
        self
    }

    /// Builder: set the region size cap.
    #[must_use]
    pub fn max_region_size(mut self, size: usize) -> Self {
        self.max_region_size = size;
        self
    }
}

// =============================================================================
// Global Bypass
// =============================================================================

fn disabled_flag() -> &'static AtomicBool {
    static DISABLED: OnceLock<AtomicBool> = OnceLock::new();
    DISABLED.get_or_init(|| {
        let from_env = std::env::var_os("WEFT_DISABLE_COMPILE")
            .is_some_and(|v| !v.is_empty());
        AtomicBool::new(from_env)
    })
}

/// Whether compilation is currently bypassed.
#[must_use]
pub fn compiler_disabled() -> bool {
    disabled_flag().load(Ordering::Relaxed)
}

/// Bypasses compilation globally: compiled wrappers delegate to the
/// original function without tracing.
pub fn disable_compile() {
    disabled_flag().store(true, Ordering::Relaxed);
}

/// Re-enables compilation after [`disable_compile`].
pub fn enable_compile() {
    disabled_flag().store(false, Ordering::Relaxed);
}

// =============================================================================
// Compiled Function
// =============================================================================

/// A function wrapped by [`compile`]. Calling it replays the cached
/// rewritten graph for the inputs' signature, tracing at most once per
/// signature.
pub struct CompiledFunction<F> {
    fun: F,
    fun_id: FunId,
    options: CompileOptions,
}

impl<F> CompiledFunction<F>
where
    F: Fn(&[Array]) -> weft_core::Result<Vec<Array>>,
{
    /// The cache identity of the wrapped function.
    #[must_use]
    pub fn fun_id(&self) -> FunId {
        self.fun_id
    }

    /// Invokes the compiled function on real inputs.
    pub fn call(&self, inputs: &[Array]) -> CompileResult<Vec<Array>> {
        if compiler_disabled() {
            return (self.fun)(inputs)
                .map_err(|source| CompileError::UserFunction { source });
        }

        let cache = compiler_cache();
        if let Some(entry) = cache.lookup(self.fun_id, inputs)? {
            return replace_tape(&entry.tape, &entry.inputs, &entry.outputs, inputs);
        }

        debug!(fun_id = %self.fun_id, "cache miss, compiling");
        let entry = self.build_entry(inputs)?;
        cache.insert(self.fun_id, Arc::clone(&entry));
        replace_tape(&entry.tape, &entry.inputs, &entry.outputs, inputs)
    }

    /// Runs the full rewrite pipeline for one input signature. The
    /// entry is only stored by the caller on success, so a failing
    /// trace leaves no partially filled cache state behind.
    fn build_entry(&self, inputs: &[Array]) -> CompileResult<Arc<CacheEntry>> {
        let (trace_inputs, trace_outputs) = trace_graph(&self.fun, inputs)?;
        let (mut tape, mut parents) = walk_graph(&trace_inputs, &trace_outputs);

        let mut outputs = trace_outputs;
        simplify_tape(&mut tape, &mut parents, &outputs, self.options.simplify_passes)?;
        partition_tape(&mut tape, &mut parents, &mut outputs, self.options.max_region_size)?;
        // The parents map is scoped to this compile; only the tape and
        // its endpoints are cached.
        drop(parents);

        Ok(Arc::new(CacheEntry {
            inputs: trace_inputs,
            outputs,
            tape,
        }))
    }
}

// =============================================================================
// Public Transform
// =============================================================================

fn fun_id_of<F: 'static>() -> CompileResult<FunId> {
    // Captured state would alias distinct functions under one type
    // identity, so only zero-sized callables are addressable.
    if core::mem::size_of::<F>() != 0 {
        return Err(CompileError::NonAddressableFunction);
    }
    let mut hasher = DefaultHasher::new();
    core::any::TypeId::of::<F>().hash(&mut hasher);
    Ok(FunId(hasher.finish()))
}

/// Wraps `fun` for traced, cached execution with default options.
///
/// `fun` must be a fn item or a non-capturing closure; a callable with
/// captured state fails with [`CompileError::NonAddressableFunction`].
pub fn compile<F>(fun: F) -> CompileResult<CompiledFunction<F>>
where
    F: Fn(&[Array]) -> weft_core::Result<Vec<Array>> + 'static,
{
    compile_with_options(fun, CompileOptions::default())
}

/// Like [`compile`], with explicit pipeline options.
pub fn compile_with_options<F>(
    fun: F,
    options: CompileOptions,
) -> CompileResult<CompiledFunction<F>>
where
    F: Fn(&[Array]) -> weft_core::Result<Vec<Array>> + 'static,
{
    let fun_id = fun_id_of::<F>()?;
    Ok(CompiledFunction {
        fun,
        fun_id,
        options,
    })
}

/// Evicts every cached entry for the function identified by `fun_id`.
pub fn compile_erase(fun_id: FunId) {
    compiler_cache().erase(fun_id);
}

// =============================================================================
// Stats
// =============================================================================

/// Counters for inspecting compiler behavior.
#[derive(Debug, Clone, Copy)]
pub struct CompileStats {
    /// Cumulative traces run by this process.
    pub traces: usize,
    /// Entries currently held by the cache, across all functions.
    pub cached_entries: usize,
}

/// Returns the current compiler counters.
#[must_use]
pub fn stats() -> CompileStats {
    CompileStats {
        traces: trace_count(),
        cached_entries: compiler_cache().len(),
    }
}

// =============================================================================
// Tests
// =============================================================================
