//! Lowest-first project ID allocator
//!
//! The in-use set only ever holds IDs inside the configured range. All three
//! mutating operations take the same lock, so no caller can observe a
//! half-applied update.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::errors::{PoolError, PoolResult};

/// Inclusive range of project IDs this process may hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectIdRange {
    min: u32,
    max: u32,
}

impl ProjectIdRange {
    /// Create a range. `min` must be non-zero and strictly below `max`.
    pub fn new(min: u32, max: u32) -> PoolResult<Self> {
        if min == 0 || min >= max {
            return Err(PoolError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.min..=self.max).contains(&id)
    }

    /// Number of IDs in the range
    pub fn capacity(&self) -> u64 {
        u64::from(self.max - self.min) + 1
    }
}

/// Concurrency-safe pool of XFS project IDs.
#[derive(Debug)]
pub struct ProjectIdPool {
    range: ProjectIdRange,
    used: Mutex<BTreeSet<u32>>,
}

impl ProjectIdPool {
    /// Create an empty pool over `range`.
    pub fn new(range: ProjectIdRange) -> Self {
        Self {
            range,
            used: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn range(&self) -> ProjectIdRange {
        self.range
    }

    // The set is never left half-updated, so a poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the lowest free ID.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Exhausted` when every ID in the range is in use.
    pub fn allocate(&self) -> PoolResult<u32> {
        let mut used = self.lock();

        // Walk the sorted in-use set alongside the range; the first gap is the answer.
        let mut candidate = self.range.min;
        for &id in used.range(self.range.min..=self.range.max) {
            if id != candidate {
                break;
            }
            if candidate == self.range.max {
                return Err(PoolError::Exhausted {
                    min: self.range.min,
                    max: self.range.max,
                });
            }
            candidate += 1;
        }

        used.insert(candidate);
        Ok(candidate)
    }

    /// Mark `id` free. Releasing a free or out-of-range ID is a no-op.
    pub fn release(&self, id: u32) {
        self.lock().remove(&id);
    }

    /// Reserve `id` without allocating it, used to seed the pool from
    /// persisted entries before any allocation happens.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::OutOfRange` if `id` is outside the configured range;
    /// the pool is left unchanged.
    pub fn mark_used(&self, id: u32) -> PoolResult<()> {
        if !self.range.contains(id) {
            return Err(PoolError::OutOfRange {
                id,
                min: self.range.min,
                max: self.range.max,
            });
        }
        self.lock().insert(id);
        Ok(())
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.lock().contains(&id)
    }

    /// Snapshot of the in-use IDs in ascending order.
    pub fn in_use(&self) -> Vec<u32> {
        self.lock().iter().copied().collect()
    }

    pub fn used_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of IDs still free
    pub fn available(&self) -> u64 {
        self.range.capacity() - self.used_count() as u64
    }
}
