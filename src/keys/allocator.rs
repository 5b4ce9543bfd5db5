//! Derivation index allocation.
//!
//! Allocation is a single atomic increment, never read-then-write, so two
//! concurrent address-creation requests cannot receive the same index.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::keys::{KeyError, KeyResult};

/// Issues derivation indices. Implementations must never return the same
/// value twice.
#[async_trait]
pub trait IndexAllocator: Send + Sync {
    async fn allocate_index(&self) -> KeyResult<u32>;
}

/// In-process counter backed by an atomic.
#[derive(Debug, Default)]
pub struct AtomicIndexAllocator {
    next: AtomicU64,
}

impl AtomicIndexAllocator {
    /// Start issuing at `next`.
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Next value that would be issued.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Raise the counter to at least `floor` (used when restoring state).
    pub fn ensure_at_least(&self, floor: u64) {
        self.next.fetch_max(floor, Ordering::SeqCst);
    }

    pub fn allocate(&self) -> KeyResult<u32> {
        let issued = self.next.fetch_add(1, Ordering::SeqCst);
        u32::try_from(issued)
            .ok()
            .filter(|i| *i < 0x8000_0000)
            .ok_or(KeyError::IndexOutOfRange(issued))
    }
}

#[async_trait]
impl IndexAllocator for AtomicIndexAllocator {
    async fn allocate_index(&self) -> KeyResult<u32> {
        self.allocate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequential_allocation() {
        let allocator = AtomicIndexAllocator::starting_at(5);
        assert_eq!(allocator.allocate().unwrap(), 5);
        assert_eq!(allocator.allocate().unwrap(), 6);
        assert_eq!(allocator.peek(), 7);

        allocator.ensure_at_least(3);
        assert_eq!(allocator.peek(), 7);
        allocator.ensure_at_least(100);
        assert_eq!(allocator.allocate().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_unique() {
        let allocator = Arc::new(AtomicIndexAllocator::default());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                let mut issued = Vec::new();
                for _ in 0..100 {
                    issued.push(allocator.allocate_index().await.unwrap());
                }
                issued
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for index in handle.await.unwrap() {
                assert!(all.insert(index), "index {} issued twice", index);
            }
        }
        assert_eq!(all.len(), 1600);
    }

    #[test]
    fn test_exhaustion() {
        let allocator = AtomicIndexAllocator::starting_at(0x8000_0000);
        assert!(matches!(allocator.allocate(), Err(KeyError::IndexOutOfRange(_))));
    }
}
