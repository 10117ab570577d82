//! Fixed-depth incremental Merkle tree

use crate::{
    error::{AccumulatorError, Result},
    field::Field,
    hasher::{FieldHasher, PoseidonHasher, check_arity},
    zeros::{MAX_DEPTH, ZeroCache},
};

/// Append-only Merkle tree of fixed depth and arity.
///
/// Only the right edge is stored: `filled_subtrees[level][i]` is the latest
/// node written at position `i` of the current group on `level`. Every insert
/// costs `depth` hashes and leaves `root` up to date.
#[derive(Clone, Debug)]
pub struct IncrementalTree<H: FieldHasher = PoseidonHasher> {
    hasher: H,
    depth: usize,
    arity: usize,
    zeros: ZeroCache,
    filled_subtrees: Vec<Vec<Field>>,
    next_leaf_index: u128,
    capacity: u128,
    root: Field,
}

impl IncrementalTree<PoseidonHasher> {
    /// Create a Poseidon tree, optionally with `seed` already at leaf 0
    pub fn new(depth: usize, arity: usize, null_leaf: Field, seed: Option<Field>) -> Result<Self> {
        Self::with_hasher(PoseidonHasher, depth, arity, null_leaf, seed)
    }
}

impl<H: FieldHasher> IncrementalTree<H> {
    /// Create a tree over a custom hasher
    pub fn with_hasher(
        hasher: H,
        depth: usize,
        arity: usize,
        null_leaf: Field,
        seed: Option<Field>,
    ) -> Result<Self> {
        check_arity(arity)?;
        if depth == 0 || depth > MAX_DEPTH {
            return Err(AccumulatorError::invalid_config(format!(
                "tree depth must be within 1..={MAX_DEPTH}, got {depth}"
            )));
        }

        let zeros = ZeroCache::new(&hasher, arity, null_leaf, depth)?;
        let filled_subtrees = (0..depth).map(|level| vec![zeros.at(level); arity]).collect();
        let root = zeros.at(depth);
        let mut tree = Self {
            hasher,
            depth,
            arity,
            zeros,
            filled_subtrees,
            next_leaf_index: 0,
            capacity: capacity(arity, depth),
            root,
        };

        if let Some(leaf) = seed {
            tree.insert_leaf(leaf)?;
        }
        Ok(tree)
    }

    /// Current root
    pub const fn root(&self) -> Field {
        self.root
    }

    /// Number of levels above the leaves
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Children per node
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Index the next leaf will take
    pub const fn next_leaf_index(&self) -> u128 {
        self.next_leaf_index
    }

    /// Total number of leaf slots
    pub const fn capacity(&self) -> u128 {
        self.capacity
    }

    /// Right-edge nodes per level
    pub fn filled_subtrees(&self) -> &[Vec<Field>] {
        &self.filled_subtrees
    }

    /// Empty-subtree roots used as padding
    pub const fn zeros(&self) -> &ZeroCache {
        &self.zeros
    }

    /// Insert a leaf and return its index
    pub fn insert_leaf(&mut self, leaf: Field) -> Result<u128> {
        if self.next_leaf_index >= self.capacity {
            return Err(AccumulatorError::CapacityExceeded {
                what: "incremental tree",
                required: self.next_leaf_index + 1,
                capacity: self.capacity,
            });
        }

        let arity = self.arity as u128;
        let mut index = self.next_leaf_index;
        let mut current = leaf;
        let mut path = Vec::with_capacity(self.depth);

        for level in 0..self.depth {
            let position = (index % arity) as usize;
            let mut children = Vec::with_capacity(self.arity);
            children.extend_from_slice(&self.filled_subtrees[level][..position]);
            children.push(current);
            children.resize(self.arity, self.zeros.at(level));

            path.push((position, current));
            current = self.hasher.hash(&children)?;
            index /= arity;
        }

        for (level, (position, node)) in path.into_iter().enumerate() {
            self.filled_subtrees[level][position] = node;
        }
        let leaf_index = self.next_leaf_index;
        self.next_leaf_index += 1;
        self.root = current;

        tracing::trace!(target: "accqueue::tree", leaf_index, depth = self.depth, "inserted leaf");
        Ok(leaf_index)
    }
}

/// Leaf slots of a tree with `depth` levels, saturating at `u128::MAX`
pub(crate) fn capacity(arity: usize, depth: usize) -> u128 {
    u32::try_from(depth)
        .ok()
        .and_then(|depth| (arity as u128).checked_pow(depth))
        .unwrap_or(u128::MAX)
}

/// Root of the tree holding `leaves` followed by null leaves, computed in one
/// pass level by level.
pub fn batch_root<H: FieldHasher>(
    hasher: &H,
    arity: usize,
    depth: usize,
    null_leaf: Field,
    leaves: &[Field],
) -> Result<Field> {
    let zeros = ZeroCache::new(hasher, arity, null_leaf, depth)?;
    let slots = capacity(arity, depth);
    if leaves.len() as u128 > slots {
        return Err(AccumulatorError::CapacityExceeded {
            what: "batch tree",
            required: leaves.len() as u128,
            capacity: slots,
        });
    }

    let mut nodes = leaves.to_vec();
    for level in 0..depth {
        if nodes.is_empty() {
            break;
        }
        nodes = nodes
            .chunks(arity)
            .map(|chunk| {
                let mut children = chunk.to_vec();
                children.resize(arity, zeros.at(level));
                hasher.hash(&children)
            })
            .collect::<Result<Vec<_>>>()?;
    }

    Ok(nodes.first().copied().unwrap_or_else(|| zeros.at(depth)))
}
