//! Context reuse pool.
//!
//! [`ContextPool`] is an explicit free list. [`ContextPool::acquire`] moves a
//! context out to the caller, which owns it for the whole cycle;
//! [`ContextPool::release`] resets it and keeps it if there is room.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;

use super::Context;

// ============================================================================
// Constants
// ============================================================================

/// Default number of idle contexts retained.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

// ============================================================================
// ContextPool
// ============================================================================

/// Bounded free list of reset contexts.
///
/// Shared by every connection of a server. Pooling only saves allocations;
/// a capacity of zero disables it.
#[derive(Debug)]
pub struct ContextPool {
    /// Idle, already reset contexts.
    free: Mutex<Vec<Context>>,
    /// Maximum idle contexts kept.
    capacity: usize,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl ContextPool {
    /// Creates a pool keeping at most `capacity` idle contexts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes an idle context or allocates a fresh one.
    #[must_use]
    pub fn acquire(&self) -> Context {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Resets `ctx` and returns it to the pool.
    ///
    /// Dropped instead when the pool is full.
    pub fn release(&self, mut ctx: Context) {
        ctx.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }

    /// Returns the number of idle contexts.
    #[inline]
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Returns the maximum number of idle contexts.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Tests
// ============================================================================
