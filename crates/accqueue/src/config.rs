//! Configuration

use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    accqueue::AccQueue,
    error::{AccumulatorError, Result},
    field::{DecimalField, Field, NOTHING_UP_MY_SLEEVE, format_field_decimal, parse_field},
    hasher::check_arity,
    zeros::MAX_DEPTH,
};

/// Null leaf an accumulator pads empty slots with
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZeroValue {
    /// The field element `0`
    Zero,
    /// [`NOTHING_UP_MY_SLEEVE`]
    #[default]
    NothingUpMySleeve,
    /// Any other field element
    Custom(DecimalField),
}

impl ZeroValue {
    /// Field element this choice stands for
    pub fn value(&self) -> Field {
        match self {
            Self::Zero => Field::from(0u64),
            Self::NothingUpMySleeve => NOTHING_UP_MY_SLEEVE,
            Self::Custom(value) => value.0,
        }
    }
}

impl FromStr for ZeroValue {
    type Err = AccumulatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zero" => Ok(Self::Zero),
            "nums" | "nothing_up_my_sleeve" => Ok(Self::NothingUpMySleeve),
            other => parse_field(other).map(|value| Self::Custom(DecimalField(value))),
        }
    }
}

impl fmt::Display for ZeroValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => f.write_str("zero"),
            Self::NothingUpMySleeve => f.write_str("nothing_up_my_sleeve"),
            Self::Custom(value) => f.write_str(&format_field_decimal(&value.0)),
        }
    }
}

/// Accumulator configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccQueueConfig {
    /// Depth of each subtree
    pub sub_depth: usize,
    /// Children per node, 2 or 5
    pub hash_length: usize,
    /// Null leaf
    pub zero_value: ZeroValue,
}

impl Default for AccQueueConfig {
    fn default() -> Self {
        Self::quinary(2)
    }
}

impl AccQueueConfig {
    /// Binary accumulator padded with `0`
    pub const fn binary(sub_depth: usize) -> Self {
        Self { sub_depth, hash_length: 2, zero_value: ZeroValue::Zero }
    }

    /// Quinary accumulator padded with [`NOTHING_UP_MY_SLEEVE`]
    pub const fn quinary(sub_depth: usize) -> Self {
        Self { sub_depth, hash_length: 5, zero_value: ZeroValue::NothingUpMySleeve }
    }

    /// Load from environment variables, falling back to defaults for any
    /// variable that is unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sub_depth: env::var("ACCQUEUE_SUB_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sub_depth),
            hash_length: env::var("ACCQUEUE_HASH_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hash_length),
            zero_value: env::var("ACCQUEUE_ZERO")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.zero_value),
        }
    }

    /// Check depth and arity bounds
    pub fn validate(&self) -> Result<()> {
        check_arity(self.hash_length)?;
        if self.sub_depth == 0 || self.sub_depth > MAX_DEPTH {
            return Err(AccumulatorError::invalid_config(format!(
                "subtree depth must be within 1..={MAX_DEPTH}, got {}",
                self.sub_depth
            )));
        }
        Ok(())
    }

    /// Build an empty Poseidon accumulator
    pub fn build(&self) -> Result<AccQueue> {
        self.validate()?;
        AccQueue::new(self.sub_depth, self.hash_length, self.zero_value.value())
    }
}
