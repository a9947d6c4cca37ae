//! Fixed-capacity slot allocator bounding how many packets may be alive.
//!
//! Slots are tokens, not storage: each [`crate::Packet`] keeps its frame in
//! its own fixed-size buffer and holds a [`PoolSlot`] for as long as it
//! lives. The pool caps live packets at its capacity and never allocates
//! after construction.
//!
//! The free list is a bitmask updated with compare-and-swap, so a pool can be
//! shared by several link contexts without a lock and allocation never waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

pub const DEFAULT_POOL_SLOTS: usize = 12;
pub const MAX_POOL_SLOTS: usize = u32::BITS as usize;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("packet pool exhausted ({capacity} slots in use)")]
pub struct PoolExhausted {
    pub capacity: usize,
}

#[derive(Debug)]
pub struct PacketPool {
    used: AtomicU32,
    capacity: usize,
}

/// Ownership of one pool slot. The slot is returned when this is dropped.
#[derive(Debug)]
pub struct PoolSlot {
    pool: Arc<PacketPool>,
    index: u32,
}

impl PacketPool {
    /// Capacity is clamped to `1..=MAX_POOL_SLOTS`.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            used: AtomicU32::new(0),
            capacity: capacity.clamp(1, MAX_POOL_SLOTS),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.used.load(Ordering::Acquire).count_ones() as usize
    }

    pub fn available(&self) -> usize {
        self.capacity - self.in_use()
    }

    fn mask(&self) -> u32 {
        if self.capacity == MAX_POOL_SLOTS {
            u32::MAX
        } else {
            (1u32 << self.capacity) - 1
        }
    }

    /// Take a free slot, failing immediately when none is left.
    pub fn acquire(self: &Arc<Self>) -> Result<PoolSlot, PoolExhausted> {
        let mask = self.mask();
        let mut cur = self.used.load(Ordering::Acquire);
        loop {
            let free = !cur & mask;
            if free == 0 {
                return Err(PoolExhausted {
                    capacity: self.capacity,
                });
            }
            let index = free.trailing_zeros();
            match self.used.compare_exchange_weak(
                cur,
                cur | (1 << index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(PoolSlot {
                        pool: Arc::clone(self),
                        index,
                    });
                }
                Err(actual) => cur = actual,
            }
        }
    }

    fn release(&self, index: u32) {
        self.used.fetch_and(!(1 << index), Ordering::Release);
    }
}

impl PoolSlot {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
