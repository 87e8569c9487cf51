//! Errors for the TLV codec.

use thiserror::Error;

/// Error while encoding or decoding a TLV stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TlvError {
    /// A key list does not consist of whole 32-byte keys.
    #[error("tag {tag:#04x}: key list of {len} bytes does not hold {count} 32-byte keys")]
    InvalidKeyLength {
        /// Tag of the key list.
        tag: u8,
        /// Declared number of keys.
        count: usize,
        /// Length of the list in bytes.
        len: usize,
    },

    /// A 32-byte value is not a valid x-only public key.
    #[error("tag {0:#04x}: value is not a valid x-only public key")]
    InvalidKey(u8),

    /// A list has more entries than a single-byte count can describe.
    #[error("tag {tag:#04x}: {count} entries do not fit a one-byte count")]
    TooManyEntries {
        /// Tag of the count record.
        tag: u8,
        /// Entries supplied.
        count: usize,
    },

    /// A value is longer than a two-byte length can describe.
    #[error("tag {tag:#04x}: value of {len} bytes exceeds 65535")]
    ValueTooLong {
        /// Tag of the record.
        tag: u8,
        /// Length supplied.
        len: usize,
    },

    /// The stream ends in the middle of a record.
    #[error("stream truncated: needed {needed} more bytes, {available} available")]
    Truncated {
        /// Bytes the current record still needs.
        needed: usize,
        /// Bytes left in the stream.
        available: usize,
    },

    /// A record appears where a different one is required.
    #[error("expected tag {expected:#04x}, found {found:?}")]
    UnexpectedTag {
        /// Tag required at this position.
        expected: u8,
        /// Tag found, `None` at end of stream.
        found: Option<u8>,
    },

    /// A fixed-size value has the wrong length.
    #[error("tag {tag:#04x}: expected {expected} bytes, got {got}")]
    LengthMismatch {
        /// Tag of the record.
        tag: u8,
        /// Required length.
        expected: usize,
        /// Length found.
        got: usize,
    },

    /// The action record holds an unknown code.
    #[error("unknown action code {0}")]
    UnknownAction(u8),

    /// Records remain after the action's last record.
    #[error("{0} unexpected trailing records")]
    TrailingRecords(usize),
}
