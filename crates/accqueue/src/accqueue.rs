//! Queueing accumulator built from fixed-depth subtrees
//!
//! Leaves are enqueued into the active subtree of `hash_length^sub_depth`
//! slots. A full (or explicitly filled) subtree contributes its root to the
//! sub-root queue. Merging happens in two phases:
//!
//! 1. [`AccQueue::merge_sub_roots`] folds queued sub-roots, front first, into
//!    the small sub-root tree. It can be spread over several calls.
//! 2. [`AccQueue::merge`] extends that root with empty siblings up to a
//!    requested main-tree depth.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::{
    error::{AccumulatorError, Result},
    field::{Field, format_field_hex},
    hasher::{FieldHasher, PoseidonHasher, check_arity},
    queue::LevelQueue,
    tree::capacity,
    zeros::{MAX_DEPTH, ZeroCache},
};

const TARGET: &str = "accqueue";

/// Batched accumulator with a resumable two-phase merge
#[derive(Clone, Debug)]
pub struct AccQueue<H: FieldHasher = PoseidonHasher> {
    pub(crate) hasher: H,
    pub(crate) sub_depth: usize,
    pub(crate) hash_length: usize,
    pub(crate) zeros: ZeroCache,
    pub(crate) sub_tree_capacity: u128,
    pub(crate) max_subtrees: u128,
    pub(crate) num_leaves: u128,
    /// Leaves of the active subtree
    pub(crate) leaf_queue: LevelQueue,
    /// Completed subtree roots in completion order
    pub(crate) sub_roots: Vec<Field>,
    /// Index of the next sub-root the merge will consume
    pub(crate) next_sr_index_to_queue: usize,
    /// Consumed sub-roots, level-buffered
    pub(crate) sr_queue: LevelQueue,
    pub(crate) small_srt_root: Option<Field>,
    pub(crate) main_roots: BTreeMap<usize, Field>,
}

impl AccQueue<PoseidonHasher> {
    /// Create an empty Poseidon queue
    pub fn new(sub_depth: usize, hash_length: usize, zero_value: Field) -> Result<Self> {
        Self::with_hasher(PoseidonHasher, sub_depth, hash_length, zero_value)
    }
}

impl<H: FieldHasher> AccQueue<H> {
    /// Create an empty queue over a custom hasher
    pub fn with_hasher(
        hasher: H,
        sub_depth: usize,
        hash_length: usize,
        zero_value: Field,
    ) -> Result<Self> {
        check_arity(hash_length)?;
        if sub_depth == 0 || sub_depth > MAX_DEPTH {
            return Err(AccumulatorError::invalid_config(format!(
                "subtree depth must be within 1..={MAX_DEPTH}, got {sub_depth}"
            )));
        }

        let zeros = ZeroCache::new(&hasher, hash_length, zero_value, MAX_DEPTH)?;
        Ok(Self {
            hasher,
            sub_depth,
            hash_length,
            zeros,
            sub_tree_capacity: capacity(hash_length, sub_depth),
            max_subtrees: capacity(hash_length, MAX_DEPTH - sub_depth),
            num_leaves: 0,
            leaf_queue: LevelQueue::new(hash_length),
            sub_roots: Vec::new(),
            next_sr_index_to_queue: 0,
            sr_queue: LevelQueue::new(hash_length),
            small_srt_root: None,
            main_roots: BTreeMap::new(),
        })
    }

    /// Depth of each subtree
    pub const fn sub_depth(&self) -> usize {
        self.sub_depth
    }

    /// Children per node
    pub const fn hash_length(&self) -> usize {
        self.hash_length
    }

    /// Null leaf the zero chain starts from
    pub fn zero_value(&self) -> Field {
        self.zeros.null_leaf()
    }

    /// Empty-subtree roots up to [`MAX_DEPTH`]
    pub const fn zeros(&self) -> &ZeroCache {
        &self.zeros
    }

    /// Leaf slots per subtree
    pub const fn sub_tree_capacity(&self) -> u128 {
        self.sub_tree_capacity
    }

    /// Leaves accounted for so far, padding from fills included
    pub const fn num_leaves(&self) -> u128 {
        self.num_leaves
    }

    /// Leaves waiting in the active subtree
    pub const fn leaf_queue_len(&self) -> u128 {
        self.leaf_queue.len()
    }

    /// Completed subtrees, which is also the index of the next one
    pub fn num_subtrees(&self) -> usize {
        self.sub_roots.len()
    }

    /// Root of completed subtree `index`
    pub fn sub_root(&self, index: usize) -> Option<Field> {
        self.sub_roots.get(index).copied()
    }

    /// All completed subtree roots in completion order
    pub fn sub_roots(&self) -> &[Field] {
        &self.sub_roots
    }

    /// Sub-roots not yet consumed by [`Self::merge_sub_roots`]
    pub fn pending_sub_roots(&self) -> &[Field] {
        &self.sub_roots[self.next_sr_index_to_queue..]
    }

    /// Root of the small sub-root tree, once every completed sub-root is merged
    pub const fn small_srt_root(&self) -> Option<Field> {
        self.small_srt_root
    }

    /// Whether the small sub-root tree is up to date
    pub const fn sub_roots_merged(&self) -> bool {
        self.small_srt_root.is_some()
    }

    /// Main root computed by the latest [`Self::merge`] to `depth`
    pub fn main_root(&self, depth: usize) -> Option<Field> {
        self.main_roots.get(&depth).copied()
    }

    /// Whether a main root exists for `depth`
    pub fn has_root(&self, depth: usize) -> bool {
        self.main_roots.contains_key(&depth)
    }

    /// Every computed main root keyed by depth
    pub const fn main_roots(&self) -> &BTreeMap<usize, Field> {
        &self.main_roots
    }

    /// Depth of the small sub-root tree: the least `d` with
    /// `hash_length^d >= num_subtrees`
    pub fn srt_depth(&self) -> usize {
        let count = self.sub_roots.len() as u128;
        let arity = self.hash_length as u128;
        let mut depth = 0;
        let mut slots: u128 = 1;
        while slots < count {
            slots = slots.saturating_mul(arity);
            depth += 1;
        }
        depth
    }

    /// Append a leaf to the active subtree and return its index
    pub fn enqueue(&mut self, leaf: Field) -> Result<u128> {
        let total = self.sub_tree_capacity.saturating_mul(self.max_subtrees);
        if self.num_leaves >= total {
            return Err(AccumulatorError::CapacityExceeded {
                what: "accumulator queue",
                required: self.num_leaves + 1,
                capacity: total,
            });
        }

        let mut leaf_queue = self.leaf_queue.clone();
        leaf_queue.push(&self.hasher, leaf)?;
        let completed = if leaf_queue.len() == self.sub_tree_capacity {
            let root = leaf_queue.root(&self.hasher, &self.zeros, 0, self.sub_depth)?;
            leaf_queue.clear();
            Some(root)
        } else {
            None
        };

        let leaf_index = self.num_leaves;
        self.leaf_queue = leaf_queue;
        self.num_leaves += 1;
        self.small_srt_root = None;
        if let Some(root) = completed {
            self.push_sub_root(root);
        }
        Ok(leaf_index)
    }

    /// Close the active subtree, padding empty slots with zero values.
    ///
    /// An empty active subtree still yields a subtree, whose root is
    /// `zeros[sub_depth]`.
    pub fn fill(&mut self) -> Result<()> {
        self.ensure_subtree_slots(1)?;
        let (root, padding) = self.filled_root()?;
        self.num_leaves += padding;
        self.leaf_queue.clear();
        self.small_srt_root = None;
        self.push_sub_root(root);
        Ok(())
    }

    /// Append a precomputed subtree root, filling a partial active subtree first
    pub fn insert_sub_tree(&mut self, root: Field) -> Result<()> {
        let partial = !self.leaf_queue.is_empty();
        self.ensure_subtree_slots(if partial { 2 } else { 1 })?;
        if partial {
            let (filled, padding) = self.filled_root()?;
            self.num_leaves += padding;
            self.leaf_queue.clear();
            self.push_sub_root(filled);
        }
        self.num_leaves += self.sub_tree_capacity;
        self.small_srt_root = None;
        self.push_sub_root(root);
        Ok(())
    }

    /// Consume up to `num_ops` pending sub-roots into the small sub-root tree;
    /// `0` consumes all of them.
    ///
    /// A partially filled active subtree is filled first. Once no sub-root is
    /// pending, the small tree is padded with empty subtree roots and its root
    /// becomes available through [`Self::small_srt_root`]. Splitting the
    /// consumption over several calls gives the same root as a single call.
    pub fn merge_sub_roots(&mut self, num_ops: usize) -> Result<()> {
        if self.num_leaves == 0 {
            return Err(AccumulatorError::InconsistentMergeState("no subtrees to merge"));
        }
        if !self.leaf_queue.is_empty() {
            self.fill()?;
        }

        let start = self.next_sr_index_to_queue;
        let pending = self.sub_roots.len() - start;
        let count = if num_ops == 0 { pending } else { num_ops.min(pending) };

        let mut queue = self.sr_queue.clone();
        for root in &self.sub_roots[start..start + count] {
            queue.push(&self.hasher, *root)?;
        }

        let end = start + count;
        let small_root = if end == self.sub_roots.len() {
            Some(queue.root(&self.hasher, &self.zeros, self.sub_depth, self.srt_depth())?)
        } else {
            None
        };

        self.sr_queue = queue;
        self.next_sr_index_to_queue = end;
        self.small_srt_root = small_root;

        let remaining = self.sub_roots.len() - end;
        debug!(target: TARGET, consumed = count, remaining, "queued sub-roots");
        if let Some(root) = small_root {
            info!(
                target: TARGET,
                subtrees = self.sub_roots.len(),
                srt_depth = self.srt_depth(),
                root = %format_field_hex(&root),
                "sub-roots merged"
            );
        }
        Ok(())
    }

    /// Compute the main root at `depth`, counted in leaf levels.
    ///
    /// Requires a merged sub-root tree and
    /// `sub_depth + srt_depth <= depth <= MAX_DEPTH`.
    pub fn merge(&mut self, depth: usize) -> Result<Field> {
        let small_root = self
            .small_srt_root
            .ok_or(AccumulatorError::InconsistentMergeState("sub-roots have not been merged"))?;
        if depth > MAX_DEPTH {
            return Err(AccumulatorError::invalid_config(format!(
                "main depth {depth} exceeds maximum depth {MAX_DEPTH}"
            )));
        }

        let base = self.sub_depth + self.srt_depth();
        if depth < base {
            let available = depth
                .checked_sub(self.sub_depth)
                .map_or(0, |levels| capacity(self.hash_length, levels));
            return Err(AccumulatorError::CapacityExceeded {
                what: "main tree",
                required: self.sub_roots.len() as u128,
                capacity: available,
            });
        }

        let mut root = small_root;
        for level in base..depth {
            let mut children = vec![self.zeros.at(level); self.hash_length];
            children[0] = root;
            root = self.hasher.hash(&children)?;
        }

        self.main_roots.insert(depth, root);
        info!(target: TARGET, depth, root = %format_field_hex(&root), "main root computed");
        Ok(root)
    }

    fn ensure_subtree_slots(&self, needed: u128) -> Result<()> {
        let required = self.sub_roots.len() as u128 + needed;
        if required > self.max_subtrees {
            return Err(AccumulatorError::CapacityExceeded {
                what: "sub-root queue",
                required,
                capacity: self.max_subtrees,
            });
        }
        Ok(())
    }

    /// Root of the active subtree padded with zeros, and the padding count
    fn filled_root(&self) -> Result<(Field, u128)> {
        let root = if self.leaf_queue.is_empty() {
            self.zeros.at(self.sub_depth)
        } else {
            self.leaf_queue.root(&self.hasher, &self.zeros, 0, self.sub_depth)?
        };
        Ok((root, self.sub_tree_capacity - self.leaf_queue.len()))
    }

    fn push_sub_root(&mut self, root: Field) {
        self.sub_roots.push(root);
        debug!(
            target: TARGET,
            index = self.sub_roots.len() - 1,
            root = %format_field_hex(&root),
            "subtree completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::batch_root;

    fn zero() -> Field {
        Field::from(0u64)
    }

    #[test]
    fn test_enqueue_completes_subtree() {
        let mut aq = AccQueue::new(2, 2, zero()).unwrap();
        let leaves: Vec<Field> = (1..=4u64).map(Field::from).collect();
        for (i, leaf) in leaves.iter().enumerate() {
            assert_eq!(aq.enqueue(*leaf).unwrap(), i as u128);
        }
        assert_eq!(aq.num_subtrees(), 1);
        assert_eq!(aq.leaf_queue_len(), 0);
        let expected = batch_root(&PoseidonHasher, 2, 2, zero(), &leaves).unwrap();
        assert_eq!(aq.sub_root(0).unwrap(), expected);
    }

    #[test]
    fn test_fill_pads_partial_subtree() {
        let mut aq = AccQueue::new(2, 5, zero()).unwrap();
        let leaves: Vec<Field> = (1..=7u64).map(Field::from).collect();
        for leaf in &leaves {
            aq.enqueue(*leaf).unwrap();
        }
        aq.fill().unwrap();
        assert_eq!(aq.num_leaves(), 25);
        let expected = batch_root(&PoseidonHasher, 5, 2, zero(), &leaves).unwrap();
        assert_eq!(aq.sub_root(0).unwrap(), expected);
    }

    #[test]
    fn test_fill_on_aligned_queue_pushes_zero_subtree() {
        let mut aq = AccQueue::new(3, 2, zero()).unwrap();
        aq.fill().unwrap();
        assert_eq!(aq.sub_root(0), aq.zeros().get(3));
        assert_eq!(aq.num_leaves(), 8);
    }

    #[test]
    fn test_single_subtree_srt_root_is_sub_root() {
        let mut aq = AccQueue::new(2, 2, zero()).unwrap();
        aq.enqueue(Field::from(9u64)).unwrap();
        aq.merge_sub_roots(0).unwrap();
        assert_eq!(aq.srt_depth(), 0);
        assert_eq!(aq.small_srt_root(), aq.sub_root(0));
    }

    #[test]
    fn test_partial_merge_leaves_root_unset() {
        let mut aq = AccQueue::new(1, 2, zero()).unwrap();
        for i in 0..6u64 {
            aq.enqueue(Field::from(i)).unwrap();
        }
        aq.merge_sub_roots(2).unwrap();
        assert!(!aq.sub_roots_merged());
        assert_eq!(aq.pending_sub_roots().len(), 1);
        aq.merge_sub_roots(2).unwrap();
        assert!(aq.sub_roots_merged());
    }

    #[test]
    fn test_merge_pads_with_empty_subtrees() {
        let mut aq = AccQueue::new(1, 2, zero()).unwrap();
        let leaves: Vec<Field> = (1..=6u64).map(Field::from).collect();
        for leaf in &leaves {
            aq.enqueue(*leaf).unwrap();
        }
        aq.merge_sub_roots(0).unwrap();
        // 3 subtrees of 2 leaves form a depth-3 tree of 8 leaves
        let expected = batch_root(&PoseidonHasher, 2, 3, zero(), &leaves).unwrap();
        assert_eq!(aq.small_srt_root(), Some(expected));
        assert_eq!(aq.merge(3).unwrap(), expected);

        let deeper = batch_root(&PoseidonHasher, 2, 6, zero(), &leaves).unwrap();
        assert_eq!(aq.merge(6).unwrap(), deeper);
        assert_eq!(aq.main_root(3), Some(expected));
        assert!(aq.has_root(6));
    }

    #[test]
    fn test_merge_before_merge_sub_roots_fails() {
        let mut aq = AccQueue::new(2, 2, zero()).unwrap();
        assert!(matches!(aq.merge(10), Err(AccumulatorError::InconsistentMergeState(_))));
        assert!(matches!(aq.merge_sub_roots(0), Err(AccumulatorError::InconsistentMergeState(_))));
        aq.enqueue(Field::from(1u64)).unwrap();
        assert!(matches!(aq.merge(10), Err(AccumulatorError::InconsistentMergeState(_))));
    }

    #[test]
    fn test_merge_depth_too_small() {
        let mut aq = AccQueue::new(2, 2, zero()).unwrap();
        for _ in 0..3 {
            aq.fill().unwrap();
        }
        aq.merge_sub_roots(0).unwrap();
        let err = aq.merge(3).unwrap_err();
        assert!(matches!(err, AccumulatorError::CapacityExceeded { required: 3, capacity: 2, .. }));
        assert!(aq.merge(4).is_ok());
        assert!(matches!(aq.merge(MAX_DEPTH + 1), Err(AccumulatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_enqueue_invalidates_small_root_but_keeps_main_roots() {
        let mut aq = AccQueue::new(1, 2, zero()).unwrap();
        aq.enqueue(Field::from(1u64)).unwrap();
        aq.merge_sub_roots(0).unwrap();
        let main = aq.merge(4).unwrap();

        aq.enqueue(Field::from(2u64)).unwrap();
        assert!(aq.small_srt_root().is_none());
        assert_eq!(aq.main_root(4), Some(main));
    }

    #[test]
    fn test_merge_resumes_after_new_subtrees() {
        let leaves: Vec<Field> = (1..=10u64).map(Field::from).collect();

        let mut stepwise = AccQueue::new(1, 2, zero()).unwrap();
        for leaf in &leaves[..4] {
            stepwise.enqueue(*leaf).unwrap();
        }
        stepwise.merge_sub_roots(0).unwrap();
        for leaf in &leaves[4..] {
            stepwise.enqueue(*leaf).unwrap();
        }
        stepwise.merge_sub_roots(0).unwrap();

        let mut oneshot = AccQueue::new(1, 2, zero()).unwrap();
        for leaf in &leaves {
            oneshot.enqueue(*leaf).unwrap();
        }
        oneshot.merge_sub_roots(0).unwrap();

        assert_eq!(stepwise.small_srt_root(), oneshot.small_srt_root());
        assert_eq!(stepwise.merge(8).unwrap(), oneshot.merge(8).unwrap());
    }

    #[test]
    fn test_insert_sub_tree_fills_partial_first() {
        let mut aq = AccQueue::new(2, 2, zero()).unwrap();
        aq.enqueue(Field::from(1u64)).unwrap();
        let external = Field::from(42u64);
        aq.insert_sub_tree(external).unwrap();

        assert_eq!(aq.num_subtrees(), 2);
        assert_eq!(aq.sub_root(1), Some(external));
        assert_eq!(aq.num_leaves(), 8);
    }

    #[test]
    fn test_sub_root_queue_capacity() {
        let mut aq = AccQueue::new(MAX_DEPTH - 1, 2, zero()).unwrap();
        aq.fill().unwrap();
        aq.fill().unwrap();
        let err = aq.fill().unwrap_err();
        assert!(matches!(err, AccumulatorError::CapacityExceeded { required: 3, capacity: 2, .. }));
        assert!(aq.enqueue(Field::from(1u64)).is_err());
        assert_eq!(aq.num_subtrees(), 2);
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(AccQueue::new(0, 2, zero()).is_err());
        assert!(AccQueue::new(2, 3, zero()).is_err());
        assert!(AccQueue::new(MAX_DEPTH + 1, 5, zero()).is_err());
    }
}
