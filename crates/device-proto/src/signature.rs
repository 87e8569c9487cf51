//! Signatures returned by [`Device::sign_transaction`](crate::Device::sign_transaction).

use bitcoin::{
    ecdsa,
    taproot::{self, TapLeafHash},
    PublicKey, XOnlyPublicKey,
};

/// A signature for one input, tagged with the key and spending path it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialSignature {
    /// Taproot key-path signature by the (tweaked) output key.
    TaprootKey {
        /// Key the signature verifies under.
        pubkey: XOnlyPublicKey,
        /// Schnorr signature with its sighash type.
        signature: taproot::Signature,
    },

    /// Taproot script-path signature for one leaf.
    TaprootScript {
        /// Key inside the leaf that signed.
        pubkey: XOnlyPublicKey,
        /// Leaf the signature commits to.
        leaf_hash: TapLeafHash,
        /// Schnorr signature with its sighash type.
        signature: taproot::Signature,
    },

    /// Segwit v0 ECDSA signature.
    Ecdsa {
        /// Key the signature verifies under.
        pubkey: PublicKey,
        /// DER signature with its sighash type.
        signature: ecdsa::Signature,
    },
}

impl PartialSignature {
    /// The leaf hash, for script-path signatures.
    pub const fn leaf_hash(&self) -> Option<TapLeafHash> {
        match self {
            PartialSignature::TaprootScript { leaf_hash, .. } => Some(*leaf_hash),
            _ => None,
        }
    }

    /// The signature as it appears on a witness stack.
    pub fn to_witness_bytes(&self) -> Vec<u8> {
        match self {
            PartialSignature::TaprootKey { signature, .. }
            | PartialSignature::TaprootScript { signature, .. } => signature.to_vec(),
            PartialSignature::Ecdsa { signature, .. } => signature.to_vec(),
        }
    }
}
