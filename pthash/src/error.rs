//! Errors reported by construction and deserialization.

use std::io;
use thiserror::Error;

/// Problems with the input or the configuration, detected before pilot search.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// There are no keys to build the function for
    #[error("the key set is empty")]
    NoKeys,
    /// The load factor is outside `(0, 1]`
    #[error("load factor alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),
    /// The average bucket size is not positive
    #[error("average bucket size lambda must be positive and finite, got {0}")]
    InvalidLambda(f64),
    /// The average partition size is zero while dense partitioning is enabled
    #[error("average partition size must be positive")]
    InvalidPartitionSize,
    /// The limit of pilot trials is zero
    #[error("the limit of pilot trials per bucket must be positive")]
    InvalidTrialLimit,
    /// Two keys (probably equal) have identical fingerprints
    #[error("duplicate keys detected in partition {partition}")]
    DuplicateKeys {
        /// Partition with the duplicates
        partition: u64,
    },
    /// The configuration does not agree with the type of the function being built
    #[error("configuration does not match the function type: {0}")]
    TypeMismatch(&'static str),
}

/// Error of [`Function`](crate::Function) construction or deserialization.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input or configuration
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Pilot search exceeded the limit of trials; retrying with another seed or larger table may succeed
    #[error("no pilot found for bucket {bucket} of partition {partition} within {trials} trials")]
    Construction {
        partition: u64,
        bucket: u64,
        trials: u64,
    },
    /// Serialized function is truncated or corrupted
    #[error("cannot read `{field}`: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Returns [`Error::Decode`] of the given `field` with the [`io::ErrorKind::InvalidData`] source.
    pub(crate) fn malformed(field: &'static str, message: &str) -> Self {
        Self::Decode { field, source: crate::encoding::invalid_data(message) }
    }
}
