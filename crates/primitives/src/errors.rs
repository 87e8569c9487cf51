//! Errors produced by the primitive codecs in this crate.

use thiserror::Error;

use crate::keys::EXTENDED_KEY_LEN;

/// Error while serializing or parsing an extended public key.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KeyCodecError {
    /// The 4-byte version prefix is neither the mainnet nor the testnet public version.
    #[error("unrecognized extended key version {}", hex::encode(.0))]
    InvalidNetwork([u8; 4]),

    /// The decoded payload does not have the fixed extended key length.
    #[error("extended key payload must be {expected} bytes, got {0}", expected = EXTENDED_KEY_LEN)]
    InvalidLength(usize),

    /// The key field does not start with a compressed point prefix.
    #[error("key prefix must be 0x02 or 0x03, got {0:#04x}")]
    InvalidKeyPrefix(u8),

    /// A `[fingerprint/path]` origin could not be parsed.
    #[error("malformed key origin {0:?}")]
    InvalidOrigin(String),

    /// Base58 decoding or checksum verification failed.
    #[error("base58check: {0}")]
    Base58(#[from] bitcoin::base58::Error),
}

/// Error while locating taproot data inside a PSBT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaprootError {
    /// None of the PSBT inputs carries a taproot leaf script.
    #[error("no taproot leaf script found in any input")]
    NoTaprootScript,
}

/// Error while assembling or parsing a wallet policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// The template references a key index outside of the key list.
    #[error("placeholder @{index} has no key (policy has {keys} keys)")]
    MissingKey {
        /// Index referenced by the template.
        index: u32,
        /// Length of the key list.
        keys: usize,
    },

    /// A key in the list is never referenced by the template.
    #[error("key at index {0} is not referenced by the template")]
    UnusedKey(usize),

    /// A `multi_a` fragment asks for more signatures than it has keys.
    #[error("multi_a threshold {threshold} is not within [1, {keys}]")]
    InvalidThreshold {
        /// Required signatures.
        threshold: u32,
        /// Keys in the fragment.
        keys: usize,
    },

    /// The policy name is empty, too long or not printable ASCII.
    #[error("invalid policy name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A key expression could not be parsed as `[origin]xpub`.
    #[error("malformed key expression {0:?}")]
    MalformedKey(String),
}
