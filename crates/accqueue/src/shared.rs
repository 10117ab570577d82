//! Accumulator shared between threads

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    accqueue::AccQueue,
    error::Result,
    field::Field,
    hasher::{FieldHasher, PoseidonHasher},
};

/// Cloneable handle to one accumulator.
///
/// Mutations take the write lock for the duration of a single call; root
/// queries take the read lock.
#[derive(Debug)]
pub struct SharedAccQueue<H: FieldHasher = PoseidonHasher> {
    inner: Arc<RwLock<AccQueue<H>>>,
}

impl<H: FieldHasher> Clone for SharedAccQueue<H> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<H: FieldHasher> From<AccQueue<H>> for SharedAccQueue<H> {
    fn from(queue: AccQueue<H>) -> Self {
        Self::new(queue)
    }
}

impl<H: FieldHasher> SharedAccQueue<H> {
    /// Wrap an accumulator
    pub fn new(queue: AccQueue<H>) -> Self {
        Self { inner: Arc::new(RwLock::new(queue)) }
    }

    // Every mutation validates before it writes, so a panicking holder
    // cannot leave the queue half-updated.
    fn read(&self) -> RwLockReadGuard<'_, AccQueue<H>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccQueue<H>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`AccQueue::enqueue`]
    pub fn enqueue(&self, leaf: Field) -> Result<u128> {
        self.write().enqueue(leaf)
    }

    /// See [`AccQueue::fill`]
    pub fn fill(&self) -> Result<()> {
        self.write().fill()
    }

    /// See [`AccQueue::insert_sub_tree`]
    pub fn insert_sub_tree(&self, root: Field) -> Result<()> {
        self.write().insert_sub_tree(root)
    }

    /// See [`AccQueue::merge_sub_roots`]
    pub fn merge_sub_roots(&self, num_ops: usize) -> Result<()> {
        self.write().merge_sub_roots(num_ops)
    }

    /// See [`AccQueue::merge`]
    pub fn merge(&self, depth: usize) -> Result<Field> {
        self.write().merge(depth)
    }

    /// Current small sub-root tree root
    pub fn small_srt_root(&self) -> Option<Field> {
        self.read().small_srt_root()
    }

    /// Main root at `depth`
    pub fn main_root(&self, depth: usize) -> Option<Field> {
        self.read().main_root(depth)
    }

    /// Copy of every main root
    pub fn main_roots(&self) -> BTreeMap<usize, Field> {
        self.read().main_roots().clone()
    }

    /// Leaves accounted for so far
    pub fn num_leaves(&self) -> u128 {
        self.read().num_leaves()
    }

    /// Run `f` with shared access to the accumulator
    pub fn with<R>(&self, f: impl FnOnce(&AccQueue<H>) -> R) -> R {
        f(&self.read())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_concurrent_enqueue_keeps_every_leaf() {
        let shared = SharedAccQueue::new(AccQueue::new(2, 5, Field::from(0u64)).unwrap());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..10u64 {
                        shared.enqueue(Field::from(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.num_leaves(), 40);
        shared.merge_sub_roots(0).unwrap();
        let root = shared.merge(4).unwrap();
        assert_eq!(shared.main_root(4), Some(root));
        assert_eq!(shared.with(|aq| aq.num_subtrees()), 2);
    }
}
