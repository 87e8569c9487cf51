//! Tag-length-value encoding of staking action parameters.
//!
//! The device receives these bytes as auxiliary data before it is asked to register a wallet
//! policy. It parses them to show the user what the policy commits to.

pub mod actions;
pub mod errors;
pub mod record;

pub use actions::{decode, encode};
pub use errors::TlvError;
pub use record::{TlvRecord, TlvStream};

/// Record tags understood by the device.
pub mod tags {
    /// Action code, one byte.
    pub const ACTION: u8 = 0x77;

    /// Number of finality provider keys, one byte.
    pub const FINALITY_PROVIDER_COUNT: u8 = 0xF9;

    /// Concatenated finality provider keys.
    pub const FINALITY_PROVIDERS: u8 = 0xF8;

    /// Number of covenant keys, one byte.
    pub const COVENANT_KEY_COUNT: u8 = 0xC0;

    /// Concatenated covenant keys.
    pub const COVENANT_KEYS: u8 = 0xC1;

    /// Covenant quorum, one byte.
    pub const COVENANT_QUORUM: u8 = 0x01;

    /// Relative timelock in blocks, eight bytes.
    pub const TIMELOCK: u8 = 0x71;

    /// Slashing fee limit in satoshis, eight bytes.
    pub const SLASHING_FEE_LIMIT: u8 = 0xFE;

    /// Unbonding fee limit in satoshis, eight bytes.
    pub const UNBONDING_FEE_LIMIT: u8 = 0xFF;

    /// Slashing output script.
    pub const SLASHING_SCRIPT: u8 = 0x36;

    /// Message to sign.
    pub const MESSAGE: u8 = 0x33;

    /// BIP322 `to_spend` txid, 32 bytes.
    pub const TXID: u8 = 0x35;

    /// Signer's x-only key, 32 bytes.
    pub const STAKER_KEY: u8 = 0x51;
}
