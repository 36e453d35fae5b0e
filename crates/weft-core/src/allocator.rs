//! Allocator - Process-Wide Buffer Allocation
//!
//! Provides the CPU allocator singleton that hands out evaluation
//! buffers and reports system memory statistics. Construction order
//! matters: the compiler cache touches `allocator()` in its own
//! constructor so the allocator is initialized first and outlives
//! everything that holds buffers.
//!
//! @version 0.1.0
//! @author Weft Development Team

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use sysinfo::System;

use crate::dtype::Element;

// =============================================================================
// Default Allocator
// =============================================================================

/// Default CPU allocator using system memory.
#[derive(Debug, Default)]
pub struct DefaultAllocator {
    bytes_allocated: AtomicUsize,
}

impl DefaultAllocator {
    /// Creates a new default allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicUsize::new(0),
        }
    }

    /// Allocates a zero-initialized buffer for `count` elements.
    pub fn allocate<T: Element>(&self, count: usize) -> Vec<T> {
        self.bytes_allocated
            .fetch_add(count * core::mem::size_of::<T>(), Ordering::Relaxed);
        vec![T::from_f64(0.0); count]
    }

    /// Returns the cumulative number of bytes handed out.
    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    /// Returns the total memory available on the host.
    #[must_use]
    pub fn total_memory(&self) -> usize {
        let sys = System::new_all();
        sys.total_memory() as usize
    }

    /// Returns the currently free memory on the host.
    #[must_use]
    pub fn free_memory(&self) -> usize {
        let sys = System::new_all();
        sys.available_memory() as usize
    }
}

// =============================================================================
// Global Singleton
// =============================================================================

static ALLOCATOR: OnceLock<DefaultAllocator> = OnceLock::new();

/// Returns the process-wide allocator, initializing it on first use.
pub fn allocator() -> &'static DefaultAllocator {
    ALLOCATOR.get_or_init(DefaultAllocator::new)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed() {
        let alloc = DefaultAllocator::new();
        let buf = alloc.allocate::<f32>(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&x| x == 0.0));
        assert_eq!(alloc.bytes_allocated(), 64);
    }

    #[test]
    fn test_singleton_identity() {
        let a = allocator() as *const DefaultAllocator;
        let b = allocator() as *const DefaultAllocator;
        assert_eq!(a, b);
    }

    #[test]
    fn test_memory_stats() {
        assert!(allocator().total_memory() > 0);
    }
}
