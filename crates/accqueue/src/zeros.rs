//! Precomputed roots of empty subtrees

use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use crate::{
    error::{AccumulatorError, Result},
    field::Field,
    hasher::{FieldHasher, check_arity},
};

/// Deepest tree any structure in this crate may describe
pub const MAX_DEPTH: usize = 32;

type CacheKey = (TypeId, usize, Field);

static ZERO_CACHES: OnceLock<Mutex<HashMap<CacheKey, Arc<[Field]>>>> = OnceLock::new();

/// Empty-subtree roots for one `(hasher, arity, null leaf)` combination.
///
/// `level(0)` is the null leaf and `level(i)` is the hash of `arity` copies of
/// `level(i - 1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroCache {
    arity: usize,
    levels: Arc<[Field]>,
    max_level: usize,
}

impl ZeroCache {
    /// Build (or fetch from the process-wide memo) the zero chain up to
    /// `max_level` inclusive.
    ///
    /// Hashers of the same type are assumed to compute the same function.
    pub fn new<H: FieldHasher>(
        hasher: &H,
        arity: usize,
        null_leaf: Field,
        max_level: usize,
    ) -> Result<Self> {
        check_arity(arity)?;
        if max_level > MAX_DEPTH {
            return Err(AccumulatorError::invalid_config(format!(
                "zero cache level {max_level} exceeds maximum depth {MAX_DEPTH}"
            )));
        }

        let key = (TypeId::of::<H>(), arity, null_leaf);
        let caches = ZERO_CACHES.get_or_init(Default::default);
        let mut caches = caches.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(levels) = caches.get(&key)
            && levels.len() > max_level
        {
            return Ok(Self { arity, levels: Arc::clone(levels), max_level });
        }

        let levels: Arc<[Field]> = compute_zeros(hasher, arity, null_leaf, max_level)?.into();
        tracing::trace!(target: "accqueue::zeros", arity, max_level, "computed zero chain");
        caches.insert(key, Arc::clone(&levels));
        Ok(Self { arity, levels, max_level })
    }

    /// Hash arity the chain was built for
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Highest level available
    pub const fn max_level(&self) -> usize {
        self.max_level
    }

    /// Null leaf the chain starts from
    pub fn null_leaf(&self) -> Field {
        self.levels[0]
    }

    /// Empty-subtree root at `level`, if within range
    pub fn get(&self, level: usize) -> Option<Field> {
        (level <= self.max_level).then(|| self.levels[level])
    }

    /// Empty-subtree roots for levels `0..=max_level`
    pub fn as_slice(&self) -> &[Field] {
        &self.levels[..=self.max_level]
    }

    /// Empty-subtree root at a level the caller already bounded
    pub(crate) fn at(&self, level: usize) -> Field {
        debug_assert!(level <= self.max_level);
        self.levels[level]
    }
}

fn compute_zeros<H: FieldHasher>(
    hasher: &H,
    arity: usize,
    null_leaf: Field,
    max_level: usize,
) -> Result<Vec<Field>> {
    let mut zeros = Vec::with_capacity(max_level + 1);
    zeros.push(null_leaf);
    for level in 1..=max_level {
        let below = zeros[level - 1];
        zeros.push(hasher.hash(&vec![below; arity])?);
    }
    Ok(zeros)
}

/// Root of an empty tree of `depth` levels, the off-chain counterpart of the
/// contract's `computeEmptyQuinRoot`.
pub fn empty_root<H: FieldHasher>(
    hasher: &H,
    arity: usize,
    depth: usize,
    null_leaf: Field,
) -> Result<Field> {
    Ok(ZeroCache::new(hasher, arity, null_leaf, depth)?.at(depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field::parse_field, hasher::PoseidonHasher};

    #[test]
    fn test_binary_zero_chain() {
        let zeros = ZeroCache::new(&PoseidonHasher, 2, Field::from(0u64), 3).unwrap();
        // poseidon(0, 0)
        let expected = parse_field(
            "14744269619966411208579211824598458697587494354926760081771325075741142829156",
        )
        .unwrap();
        assert_eq!(zeros.get(0), Some(Field::from(0u64)));
        assert_eq!(zeros.get(1), Some(expected));
        assert_eq!(zeros.get(2), Some(PoseidonHasher.hash_pair(&expected, &expected).unwrap()));
        assert_eq!(zeros.get(4), None);
        assert_eq!(zeros.as_slice().len(), 4);
    }

    #[test]
    fn test_memoized_chain_is_reused() {
        let null = Field::from(77u64);
        let deep = ZeroCache::new(&PoseidonHasher, 5, null, 6).unwrap();
        let shallow = ZeroCache::new(&PoseidonHasher, 5, null, 2).unwrap();
        assert_eq!(shallow.as_slice(), &deep.as_slice()[..3]);
        assert!(Arc::ptr_eq(&deep.levels, &shallow.levels));
    }

    #[test]
    fn test_deeper_request_extends_chain() {
        let null = Field::from(78u64);
        let shallow = ZeroCache::new(&PoseidonHasher, 2, null, 1).unwrap();
        let deep = ZeroCache::new(&PoseidonHasher, 2, null, 5).unwrap();
        assert_eq!(shallow.as_slice(), &deep.as_slice()[..2]);
        assert_eq!(deep.max_level(), 5);
    }

    #[test]
    fn test_empty_root_is_deterministic() {
        let a = empty_root(&PoseidonHasher, 5, 4, Field::from(0u64)).unwrap();
        let b = empty_root(&PoseidonHasher, 5, 4, Field::from(0u64)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, empty_root(&PoseidonHasher, 2, 4, Field::from(0u64)).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(ZeroCache::new(&PoseidonHasher, 3, Field::from(0u64), 2).is_err());
        assert!(ZeroCache::new(&PoseidonHasher, 2, Field::from(0u64), MAX_DEPTH + 1).is_err());
    }
}
