//! Errors for the staking action parameters.

use bitcoin::XOnlyPublicKey;
use thiserror::Error;

/// A parameter set violates one of the protocol's shape or bound rules.
///
/// These are caller bugs: they are raised before any device interaction and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The covenant quorum is zero or larger than the covenant committee.
    #[error("covenant threshold {threshold} must be within [1, {keys}]")]
    ThresholdOutOfRange {
        /// Requested quorum.
        threshold: u8,
        /// Number of covenant keys.
        keys: usize,
    },

    /// Not enough covenant keys for the configured strictness.
    #[error("covenant_pks must have at least {min} keys, got {got}")]
    TooFewCovenantKeys {
        /// Keys supplied.
        got: usize,
        /// Minimum required.
        min: usize,
    },

    /// The same covenant key appears twice.
    #[error("duplicate covenant key {0}")]
    DuplicateCovenantKey(XOnlyPublicKey),

    /// A list does not fit in a single-byte count.
    #[error("{field} has {count} entries, at most 255 are allowed")]
    TooManyKeys {
        /// Offending field.
        field: &'static str,
        /// Entries supplied.
        count: usize,
    },

    /// A raw public key is not 32 bytes long.
    #[error("{field}: public key must be 32 bytes, got {len}")]
    InvalidKeyLength {
        /// Offending field.
        field: &'static str,
        /// Length supplied.
        len: usize,
    },

    /// A raw 32-byte value is not the x coordinate of a curve point.
    #[error("{field}: {value} is not a valid x-only public key")]
    InvalidKey {
        /// Offending field.
        field: &'static str,
        /// Hex of the rejected value.
        value: String,
    },

    /// The number of finality providers does not match what the action allows.
    #[error("finality_providers must have {expected}, got {got}")]
    FinalityProviderCount {
        /// Entries supplied.
        got: usize,
        /// Human readable requirement.
        expected: &'static str,
    },

    /// The relative timelock does not fit a block-based `OP_CSV`.
    #[error("timelock_blocks {0} must be within [1, 65535]")]
    TimelockOutOfRange(u64),

    /// The slashing output script is empty.
    #[error("slashing_pk_script must not be empty")]
    EmptySlashingScript,

    /// A variable-length value exceeds what a 2-byte length can describe.
    #[error("{field} is {len} bytes, at most 65535 are allowed")]
    ValueTooLong {
        /// Offending field.
        field: &'static str,
        /// Length supplied.
        len: usize,
    },
}
