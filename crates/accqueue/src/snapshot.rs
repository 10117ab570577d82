//! Serializable accumulator state
//!
//! A snapshot carries the configuration triple and every buffer the merge
//! needs to resume: the active subtree's level buffers, the completed
//! sub-roots, the merge cursor with its level buffers, and the cached roots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    accqueue::AccQueue,
    error::{AccumulatorError, Result},
    field::{DecimalField, Field},
    hasher::FieldHasher,
    queue::LevelQueue,
    zeros::MAX_DEPTH,
};

/// Plain-data copy of an [`AccQueue`]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccQueueSnapshot {
    /// Depth of each subtree
    pub sub_depth: usize,
    /// Children per node
    pub hash_length: usize,
    /// Null leaf
    pub zero_value: DecimalField,
    /// Leaves accounted for, padding included
    pub num_leaves: u128,
    /// Level buffers of the active subtree
    pub leaf_queue: Vec<Vec<DecimalField>>,
    /// Completed subtree roots
    pub sub_roots: Vec<DecimalField>,
    /// Number of sub-roots already consumed by the merge
    pub next_sr_index_to_queue: usize,
    /// Level buffers of consumed sub-roots
    pub sr_queue: Vec<Vec<DecimalField>>,
    /// Root of the small sub-root tree
    pub small_srt_root: Option<DecimalField>,
    /// Main roots keyed by depth
    pub main_roots: BTreeMap<usize, DecimalField>,
}

fn wrap(levels: &[Vec<Field>]) -> Vec<Vec<DecimalField>> {
    levels.iter().map(|nodes| nodes.iter().copied().map(DecimalField).collect()).collect()
}

fn unwrap_levels(levels: &[Vec<DecimalField>]) -> Vec<Vec<Field>> {
    levels.iter().map(|nodes| nodes.iter().map(|node| node.0).collect()).collect()
}

impl<H: FieldHasher> AccQueue<H> {
    /// Capture the current state
    pub fn snapshot(&self) -> AccQueueSnapshot {
        let main_roots = self.main_roots.iter().map(|(depth, root)| (*depth, DecimalField(*root)));
        AccQueueSnapshot {
            sub_depth: self.sub_depth,
            hash_length: self.hash_length,
            zero_value: DecimalField(self.zero_value()),
            num_leaves: self.num_leaves,
            leaf_queue: wrap(self.leaf_queue.levels()),
            sub_roots: self.sub_roots.iter().copied().map(DecimalField).collect(),
            next_sr_index_to_queue: self.next_sr_index_to_queue,
            sr_queue: wrap(self.sr_queue.levels()),
            small_srt_root: self.small_srt_root.map(DecimalField),
            main_roots: main_roots.collect(),
        }
    }

    /// Rebuild a queue from a snapshot, checking that its counters and
    /// buffers agree with each other.
    ///
    /// A small sub-root tree root is recomputed from the merge buffers and
    /// must match the stored one.
    pub fn from_snapshot(hasher: H, snapshot: &AccQueueSnapshot) -> Result<Self> {
        let (sub_depth, hash_length) = (snapshot.sub_depth, snapshot.hash_length);
        let mut queue = Self::with_hasher(hasher, sub_depth, hash_length, snapshot.zero_value.0)?;

        let leaf_levels = unwrap_levels(&snapshot.leaf_queue);
        let leaf_queue = LevelQueue::from_levels(queue.hash_length, leaf_levels)?;
        if leaf_queue.len() >= queue.sub_tree_capacity {
            return Err(AccumulatorError::invalid_config("active subtree holds a full subtree"));
        }

        let sub_roots: Vec<Field> = snapshot.sub_roots.iter().map(|root| root.0).collect();
        if sub_roots.len() as u128 > queue.max_subtrees {
            return Err(AccumulatorError::CapacityExceeded {
                what: "sub-root queue",
                required: sub_roots.len() as u128,
                capacity: queue.max_subtrees,
            });
        }

        let expected_leaves = (sub_roots.len() as u128)
            .checked_mul(queue.sub_tree_capacity)
            .and_then(|n| n.checked_add(leaf_queue.len()));
        if expected_leaves != Some(snapshot.num_leaves) {
            return Err(AccumulatorError::invalid_config(format!(
                "leaf count {} does not match {} subtrees plus {} queued leaves",
                snapshot.num_leaves,
                sub_roots.len(),
                leaf_queue.len()
            )));
        }

        let cursor = snapshot.next_sr_index_to_queue;
        if cursor > sub_roots.len() {
            return Err(AccumulatorError::invalid_config("merge cursor is past the last sub-root"));
        }
        let sr_levels = unwrap_levels(&snapshot.sr_queue);
        let sr_queue = LevelQueue::from_levels(queue.hash_length, sr_levels)?;
        if sr_queue.len() != cursor as u128 {
            return Err(AccumulatorError::invalid_config(
                "merged sub-root buffers do not match the merge cursor",
            ));
        }
        if snapshot.small_srt_root.is_some() && (cursor != sub_roots.len() || cursor == 0) {
            return Err(AccumulatorError::InconsistentMergeState(
                "small sub-root tree root present with sub-roots still pending",
            ));
        }

        if let Some(depth) = snapshot.main_roots.keys().find(|depth| **depth > MAX_DEPTH) {
            return Err(AccumulatorError::invalid_config(format!(
                "main root depth {depth} exceeds maximum depth {MAX_DEPTH}"
            )));
        }

        queue.num_leaves = snapshot.num_leaves;
        queue.leaf_queue = leaf_queue;
        queue.sub_roots = sub_roots;
        queue.next_sr_index_to_queue = cursor;

        if let Some(stored) = snapshot.small_srt_root {
            let (base, depth) = (queue.sub_depth, queue.srt_depth());
            let root = sr_queue.root(&queue.hasher, &queue.zeros, base, depth)?;
            if root != stored.0 {
                return Err(AccumulatorError::InconsistentMergeState(
                    "small sub-root tree root does not match the merged sub-roots",
                ));
            }
            queue.small_srt_root = Some(root);
        }
        queue.sr_queue = sr_queue;
        let main_roots = snapshot.main_roots.iter();
        queue.main_roots = main_roots.map(|(depth, root)| (*depth, root.0)).collect();
        Ok(queue)
    }
}
