//! Compiler Cache
//!
//! Process-global cache of rewritten tapes, keyed by function identity
//! and matched by input signature (the ordered shapes and dtypes of
//! the call's inputs). Lookup scans the entries for a function
//! linearly; typical callers compile each function with few shape
//! variants, so the scan stays short.
//!
//! The cache constructor touches the allocator singleton first, so the
//! allocator is always initialized before - and torn down after - any
//! cached graph that holds buffers.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use weft_core::DType;
use weft_array::Array;

use crate::error::{CompileError, CompileResult};

// =============================================================================
// FunId
// =============================================================================

/// Deterministic identity of a compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunId(pub(crate) u64);

impl core::fmt::Display for FunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "fn#{:016x}", self.0)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A rewritten trace: placeholder inputs and outputs, plus the tape
/// that connects them.
#[derive(Debug)]
pub struct CacheEntry {
    /// Placeholder inputs, in call order.
    pub inputs: Vec<Array>,
    /// Declared outputs (post-rewrite identities).
    pub outputs: Vec<Array>,
    /// The rewritten tape.
    pub tape: Vec<Array>,
}

type Signature = Vec<(Vec<usize>, DType)>;

fn signature(inputs: &[Array]) -> Signature {
    inputs
        .iter()
        .map(|a| (a.shape().to_vec(), a.dtype()))
        .collect()
}

// =============================================================================
// Compiler Cache
// =============================================================================

/// The process-global compiler cache.
pub struct CompilerCache {
    entries: Mutex<FxHashMap<FunId, Vec<Arc<CacheEntry>>>>,
}

impl CompilerCache {
    fn new() -> Self {
        // The allocator must be fully initialized before the cache.
        weft_core::allocator();
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Finds the entry for `fun_id` whose signature matches `inputs`.
    ///
    /// An entry recorded with a different input count is a host-level
    /// bug and fails with [`CompileError::InputCountMismatch`].
    pub fn lookup(
        &self,
        fun_id: FunId,
        inputs: &[Array],
    ) -> CompileResult<Option<Arc<CacheEntry>>> {
        let sig = signature(inputs);
        let entries = self.entries.lock();
        let Some(list) = entries.get(&fun_id) else {
            return Ok(None);
        };
        for entry in list {
            if entry.inputs.len() != inputs.len() {
                return Err(CompileError::InputCountMismatch {
                    expected: entry.inputs.len(),
                    actual: inputs.len(),
                });
            }
            if signature(&entry.inputs) == sig {
                return Ok(Some(Arc::clone(entry)));
            }
        }
        Ok(None)
    }

    /// Stores a fully built entry for `fun_id`.
    pub fn insert(&self, fun_id: FunId, entry: Arc<CacheEntry>) {
        debug!(%fun_id, tape = entry.tape.len(), "caching compiled trace");
        self.entries.lock().entry(fun_id).or_default().push(entry);
    }

    /// Removes every entry for `fun_id`.
    pub fn erase(&self, fun_id: FunId) {
        self.entries.lock().remove(&fun_id);
    }

    /// The number of entries cached for `fun_id`.
    #[must_use]
    pub fn entry_count(&self, fun_id: FunId) -> usize {
        self.entries
            .lock()
            .get(&fun_id)
            .map_or(0, Vec::len)
    }

    /// The total number of entries across all functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns the process-wide compiler cache, initializing it on first
/// use.
pub fn compiler_cache() -> &'static CompilerCache {
    static CACHE: OnceLock<CompilerCache> = OnceLock::new();
    CACHE.get_or_init(CompilerCache::new)
}

// =============================================================================
// Tests
// =============================================================================
