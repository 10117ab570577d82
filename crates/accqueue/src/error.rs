//! Accumulator errors

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AccumulatorError>;

/// Errors returned by trees and queues.
///
/// Every fallible operation validates its input before touching state, so an
/// error never leaves a tree or queue partially updated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    /// An insert or merge needs more slots than the structure provides
    #[error("capacity exceeded: {what} needs {required} slots but only {capacity} are available")]
    CapacityExceeded {
        /// Which structure ran out of room
        what: &'static str,
        /// Slots the operation would need
        required: u128,
        /// Slots available at the configured depth
        capacity: u128,
    },

    /// Depth or arity outside the supported range
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A merge step was requested before the state it builds on exists
    #[error("inconsistent merge state: {0}")]
    InconsistentMergeState(&'static str),

    /// The hash backend rejected its input
    #[error("hash failure: {0}")]
    Hash(String),

    /// A field element could not be parsed from text
    #[error("invalid field element {0:?}")]
    Parse(String),
}

impl AccumulatorError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
