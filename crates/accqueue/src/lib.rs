//! Incremental Merkle accumulator over BN254
//!
//! Off-chain counterpart of an on-chain queueing accumulator. Roots are
//! Poseidon hashes and match the contract bit for bit, so a verifier can
//! replay the same operations and compare roots without executing contract
//! code.
//! Key pieces:
//! - [`ZeroCache`]: empty-subtree roots per level
//! - [`IncrementalTree`]: fixed-depth append-only tree
//! - [`AccQueue`]: batched subtrees with a resumable two-phase merge

mod accqueue;
mod config;
mod error;
mod field;
mod hasher;
mod queue;
mod shared;
mod snapshot;
mod tree;
mod zeros;

pub use accqueue::AccQueue;
pub use config::{AccQueueConfig, ZeroValue};
pub use error::{AccumulatorError, Result};
pub use field::{
    DecimalField, Field, FieldBytes, NOTHING_UP_MY_SLEEVE, format_field_decimal, format_field_hex,
    parse_field, to_be_bytes,
};
pub use hasher::{FieldHasher, PoseidonHasher, SUPPORTED_ARITIES};
pub use shared::SharedAccQueue;
pub use snapshot::AccQueueSnapshot;
pub use tree::{IncrementalTree, batch_root};
pub use zeros::{MAX_DEPTH, ZeroCache, empty_root};
