//! Level-buffered append-only tree

use crate::{
    error::{AccumulatorError, Result},
    field::Field,
    hasher::FieldHasher,
    zeros::ZeroCache,
};

/// Right edge of an append-only tree, kept as one buffer per level.
///
/// `levels[i]` holds the completed height-`i` nodes whose parent is still
/// open; it never holds `arity` entries because a full group is hashed into
/// the level above as soon as it forms. The buffers do not depend on the
/// final tree depth, so a root can be taken at any depth that fits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LevelQueue {
    arity: usize,
    levels: Vec<Vec<Field>>,
    len: u128,
}

impl LevelQueue {
    pub(crate) const fn new(arity: usize) -> Self {
        Self { arity, levels: Vec::new(), len: 0 }
    }

    /// Rebuild a queue from its level buffers
    pub(crate) fn from_levels(arity: usize, mut levels: Vec<Vec<Field>>) -> Result<Self> {
        let mut len: u128 = 0;
        let mut weight: u128 = 1;
        for (level, nodes) in levels.iter().enumerate() {
            if nodes.len() >= arity {
                return Err(AccumulatorError::invalid_config(format!(
                    "level {level} buffers {} nodes, arity is {arity}",
                    nodes.len()
                )));
            }
            len = weight
                .checked_mul(nodes.len() as u128)
                .and_then(|n| n.checked_add(len))
                .ok_or_else(|| AccumulatorError::invalid_config("queue length overflows"))?;
            weight = weight.saturating_mul(arity as u128);
        }
        while levels.last().is_some_and(Vec::is_empty) {
            levels.pop();
        }
        Ok(Self { arity, levels, len })
    }

    /// Number of nodes pushed since the last clear
    pub(crate) const fn len(&self) -> u128 {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn levels(&self) -> &[Vec<Field>] {
        &self.levels
    }

    pub(crate) fn clear(&mut self) {
        self.levels.clear();
        self.len = 0;
    }

    /// Append a node, hashing every group it completes.
    ///
    /// All hashes are computed before any buffer changes.
    pub(crate) fn push<H: FieldHasher>(&mut self, hasher: &H, node: Field) -> Result<()> {
        let mut carry = node;
        let mut level = 0;
        while level < self.levels.len() && self.levels[level].len() + 1 == self.arity {
            let mut children = Vec::with_capacity(self.arity);
            children.extend_from_slice(&self.levels[level]);
            children.push(carry);
            carry = hasher.hash(&children)?;
            level += 1;
        }

        for completed in &mut self.levels[..level] {
            completed.clear();
        }
        if level == self.levels.len() {
            self.levels.push(Vec::with_capacity(self.arity - 1));
        }
        self.levels[level].push(carry);
        self.len += 1;
        Ok(())
    }

    /// Root of the tree of `depth` levels whose leaves are the pushed nodes
    /// followed by empty slots.
    ///
    /// Leaves sit at height `base_level` of the overall tree, so an empty
    /// slot at queue level `k` is `zeros[base_level + k]`. The caller
    /// guarantees `len <= arity^depth`.
    pub(crate) fn root<H: FieldHasher>(
        &self,
        hasher: &H,
        zeros: &ZeroCache,
        base_level: usize,
        depth: usize,
    ) -> Result<Field> {
        let mut carry: Option<Field> = None;
        for level in 0..depth {
            let pending = self.levels.get(level).map_or(&[][..], Vec::as_slice);
            if pending.is_empty() && carry.is_none() {
                continue;
            }
            let mut children = Vec::with_capacity(self.arity);
            children.extend_from_slice(pending);
            children.extend(carry);
            children.resize(self.arity, zeros.at(base_level + level));
            carry = Some(hasher.hash(&children)?);
        }

        if let Some(root) = carry {
            return Ok(root);
        }
        // either nothing was pushed or the tree is exactly full
        Ok(self
            .levels
            .get(depth)
            .and_then(|nodes| nodes.first())
            .copied()
            .unwrap_or_else(|| zeros.at(base_level + depth)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hasher::PoseidonHasher, tree::batch_root};

    fn leaves(n: u64) -> Vec<Field> {
        (1..=n).map(Field::from).collect()
    }

    #[test]
    fn test_push_collapses_full_groups() {
        let mut queue = LevelQueue::new(2);
        for leaf in leaves(4) {
            queue.push(&PoseidonHasher, leaf).unwrap();
        }
        assert_eq!(queue.len(), 4);
        assert!(queue.levels()[0].is_empty());
        assert!(queue.levels()[1].is_empty());
        assert_eq!(queue.levels()[2].len(), 1);
    }

    #[test]
    fn test_root_matches_batch_root() {
        let zero = Field::from(0u64);
        for arity in [2usize, 5] {
            let zeros = ZeroCache::new(&PoseidonHasher, arity, zero, 4).unwrap();
            for n in [0u64, 1, 3, 7, 11] {
                let mut queue = LevelQueue::new(arity);
                for leaf in leaves(n) {
                    queue.push(&PoseidonHasher, leaf).unwrap();
                }
                let expected = batch_root(&PoseidonHasher, arity, 3, zero, &leaves(n)).unwrap();
                assert_eq!(queue.root(&PoseidonHasher, &zeros, 0, 3).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_root_of_full_queue_needs_no_padding() {
        let zero = Field::from(0u64);
        let zeros = ZeroCache::new(&PoseidonHasher, 2, zero, 3).unwrap();
        let mut queue = LevelQueue::new(2);
        for leaf in leaves(8) {
            queue.push(&PoseidonHasher, leaf).unwrap();
        }
        let expected = batch_root(&PoseidonHasher, 2, 3, zero, &leaves(8)).unwrap();
        assert_eq!(queue.root(&PoseidonHasher, &zeros, 0, 3).unwrap(), expected);
        assert_eq!(queue.levels().len(), 4);
    }

    #[test]
    fn test_from_levels_recounts_length() {
        let mut queue = LevelQueue::new(5);
        for leaf in leaves(13) {
            queue.push(&PoseidonHasher, leaf).unwrap();
        }
        let rebuilt = LevelQueue::from_levels(5, queue.levels().to_vec()).unwrap();
        assert_eq!(rebuilt, queue);
        assert_eq!(rebuilt.len(), 13);

        let overfull = vec![vec![Field::from(1u64); 2]];
        assert!(LevelQueue::from_levels(2, overfull).is_err());
    }
}
