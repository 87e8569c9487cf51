//! Protocol constants shared by policy construction and message signing.

use std::{str::FromStr, sync::LazyLock};

use bitcoin::{bip32::Fingerprint, XOnlyPublicKey};

/// Hex of the BIP341 "nothing up my sleeve" point `H = lift_x(SHA256(G))`.
const UNSPENDABLE_PUBLIC_KEY_HEX: &str =
    "50929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0";

/// A verifiably unspendable public key.
///
/// This is the point suggested in [BIP-341](https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki#constructing-and-spending-taproot-outputs)
/// for outputs that must only be spendable through their script tree. Staking outputs use it as
/// their internal key.
pub static UNSPENDABLE_INTERNAL_KEY: LazyLock<XOnlyPublicKey> = LazyLock::new(|| {
    XOnlyPublicKey::from_str(UNSPENDABLE_PUBLIC_KEY_HEX).expect("valid xonly public key")
});

/// Maximum length in bytes of a policy name accepted by signing devices.
pub const MAX_POLICY_NAME_LEN: usize = 64;

/// Reserved fingerprints that mark a key in a policy as a data container.
///
/// The device firmware recognizes these in a key origin and treats the key as carrying protocol
/// data instead of deriving anything from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicFingerprint {
    /// A leaf hash the device shows to the user.
    LeafHashDisplay,

    /// A leaf hash the device only checks against the PSBT.
    LeafHashCheckOnly,

    /// A finality provider public key.
    FinalityProvider,

    /// A BIP322 message hash.
    Bip322Message,

    /// The internal key of a BIP322 signing output.
    Bip322InternalKey,
}

impl MagicFingerprint {
    /// All sentinels.
    pub const ALL: [MagicFingerprint; 5] = [
        MagicFingerprint::LeafHashDisplay,
        MagicFingerprint::LeafHashCheckOnly,
        MagicFingerprint::FinalityProvider,
        MagicFingerprint::Bip322Message,
        MagicFingerprint::Bip322InternalKey,
    ];

    /// The raw sentinel bytes.
    pub const fn to_bytes(self) -> [u8; 4] {
        match self {
            MagicFingerprint::LeafHashDisplay => [0x69, 0x84, 0x6D, 0x00],
            MagicFingerprint::LeafHashCheckOnly => [0x3B, 0x9F, 0x96, 0x80],
            MagicFingerprint::FinalityProvider => [0xFF, 0x11, 0x94, 0x73],
            MagicFingerprint::Bip322Message => [0x83, 0x87, 0x16, 0x19],
            MagicFingerprint::Bip322InternalKey => [0x25, 0x27, 0x04, 0x17],
        }
    }

    /// Looks up the sentinel for the given bytes, if any.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|magic| magic.to_bytes() == bytes)
    }

    /// The sentinel as a [`Fingerprint`].
    pub fn fingerprint(self) -> Fingerprint {
        Fingerprint::from(self.to_bytes())
    }
}
