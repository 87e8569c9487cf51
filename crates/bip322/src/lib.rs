//! BIP322 message signing on top of the staking signer's device flow.
//!
//! A BIP322 simple signature is the witness that spends a virtual `to_spend` output committing
//! to the message. [`MessageSigner`] builds that virtual pair, has the device sign `to_sign`
//! under a `Sign message` policy and returns the encoded witness. The legacy ECDSA scheme is
//! available as well for callers that need it.

pub mod errors;
pub mod signer;
pub mod virtual_tx;

pub use errors::{MessageSignError, MessageSignResult};
pub use signer::{MessageSigner, MessageSigningProtocol, SignedMessage};
pub use virtual_tx::{encode_witness, VirtualTransactionPair};
