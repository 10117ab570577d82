//! Poseidon hasher for the accumulator

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Mutex, OnceLock, PoisonError},
};

use light_poseidon::{Poseidon, PoseidonHasher as _};

use crate::{
    error::{AccumulatorError, Result},
    field::Field,
};

/// Arities the accumulator supports: binary and quinary trees
pub const SUPPORTED_ARITIES: [usize; 2] = [2, 5];

/// Circom Poseidon instances keyed by input count
static POSEIDON_INSTANCES: OnceLock<Mutex<HashMap<usize, Poseidon<Field>>>> = OnceLock::new();

/// Fixed-width hash over field elements.
///
/// Implementations must be deterministic; the accumulator calls `hash` with
/// exactly `arity` inputs per node.
pub trait FieldHasher: Send + Sync + 'static {
    /// Hash `inputs` into a single field element
    fn hash(&self, inputs: &[Field]) -> Result<Field>;

    /// Hash two values together
    fn hash_pair(&self, left: &Field, right: &Field) -> Result<Field> {
        self.hash(&[*left, *right])
    }
}

/// Circom-compatible Poseidon over BN254, matching the `PoseidonT3`..`PoseidonT6`
/// contracts the on-chain queue links against.
///
/// Round constants and the MDS matrix are built once per input count and
/// shared by every hasher in the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseidonHasher;

impl FieldHasher for PoseidonHasher {
    fn hash(&self, inputs: &[Field]) -> Result<Field> {
        let instances = POSEIDON_INSTANCES.get_or_init(Default::default);
        let mut instances = instances.lock().unwrap_or_else(PoisonError::into_inner);
        let poseidon = match instances.entry(inputs.len()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let poseidon = Poseidon::<Field>::new_circom(inputs.len())
                    .map_err(|e| AccumulatorError::Hash(e.to_string()))?;
                tracing::trace!(target: "accqueue::hasher", inputs = inputs.len(), "poseidon");
                entry.insert(poseidon)
            }
        };
        poseidon.hash(inputs).map_err(|e| AccumulatorError::Hash(e.to_string()))
    }
}

/// Check that `arity` is one of [`SUPPORTED_ARITIES`]
pub(crate) fn check_arity(arity: usize) -> Result<()> {
    if SUPPORTED_ARITIES.contains(&arity) {
        Ok(())
    } else {
        Err(AccumulatorError::invalid_config(format!(
            "unsupported hash length {arity}, expected 2 or 5"
        )))
    }
}
