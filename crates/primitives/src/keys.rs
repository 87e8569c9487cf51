//! Extended public key serialization and key origins.
//!
//! Signing devices only accept keys in a policy as BIP32 extended public keys. This module encodes
//! arbitrary key material into that textual form, which is also how the older key-embedding
//! technique carries 32-byte protocol values (leaf hashes, finality provider keys) through a
//! policy's key list.
//!
//! # Layout
//!
//! | Offset | Size | Field                |
//! | ------ | ---- | -------------------- |
//! | 0      | 4    | version              |
//! | 4      | 1    | depth                |
//! | 5      | 4    | parent fingerprint   |
//! | 9      | 4    | child index (BE)     |
//! | 13     | 32   | chain code           |
//! | 45     | 33   | compressed key       |
//!
//! The textual form is Base58 of the 78 bytes followed by the first four bytes of their double
//! SHA256.

use std::{fmt, str::FromStr};

use bitcoin::{
    base58,
    bip32::{ChildNumber, DerivationPath, Fingerprint},
    Network, NetworkKind,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{constants::MagicFingerprint, errors::KeyCodecError};

/// Length of a serialized extended key, without checksum.
pub const EXTENDED_KEY_LEN: usize = 78;

/// Version bytes of a mainnet extended public key (`xpub`).
pub const MAINNET_PUBLIC_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];

/// Version bytes of a testnet extended public key (`tpub`).
pub const TESTNET_PUBLIC_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

/// High bit of a hardened child index.
const HARDENED_INDEX_BIT: u32 = 1 << 31;

/// Prefix put in front of a synthetic payload so it looks like an even compressed point.
const SYNTHETIC_KEY_PREFIX: u8 = 0x02;

/// Network a serialized extended key is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNetwork {
    /// `xpub` keys.
    Mainnet,
    /// `tpub` keys, shared by testnet, signet and regtest.
    Testnet,
}

impl KeyNetwork {
    /// Returns the 4-byte public version prefix.
    pub const fn version(self) -> [u8; 4] {
        match self {
            KeyNetwork::Mainnet => MAINNET_PUBLIC_VERSION,
            KeyNetwork::Testnet => TESTNET_PUBLIC_VERSION,
        }
    }

    /// Maps a version prefix back to its network.
    pub fn from_version(version: [u8; 4]) -> Result<Self, KeyCodecError> {
        match version {
            MAINNET_PUBLIC_VERSION => Ok(KeyNetwork::Mainnet),
            TESTNET_PUBLIC_VERSION => Ok(KeyNetwork::Testnet),
            other => Err(KeyCodecError::InvalidNetwork(other)),
        }
    }

    /// BIP44 coin type used in default account paths.
    pub const fn coin_type(self) -> u32 {
        match self {
            KeyNetwork::Mainnet => 0,
            KeyNetwork::Testnet => 1,
        }
    }
}

impl From<Network> for KeyNetwork {
    fn from(network: Network) -> Self {
        match NetworkKind::from(network) {
            NetworkKind::Main => KeyNetwork::Mainnet,
            NetworkKind::Test => KeyNetwork::Testnet,
        }
    }
}

/// The fields of a BIP32 extended public key.
///
/// Values of this type are built transiently whenever a raw key or a payload has to appear in a
/// policy; they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtendedKeyMaterial {
    /// Network tag.
    pub network: KeyNetwork,

    /// Derivation depth.
    pub depth: u8,

    /// First four bytes of the parent key's HASH160.
    pub parent_fingerprint: Fingerprint,

    /// Child index, with the high bit set for hardened children.
    pub child_index: u32,

    /// BIP32 chain code.
    pub chain_code: [u8; 32],

    /// Compressed public key, `0x02`/`0x03` followed by the x coordinate.
    pub key: [u8; 33],
}

impl ExtendedKeyMaterial {
    /// Returns `true` if the child index is hardened.
    pub const fn is_hardened(&self) -> bool {
        self.child_index & HARDENED_INDEX_BIT != 0
    }

    /// Serializes to the fixed 78-byte layout.
    pub fn serialize(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[0..4].copy_from_slice(&self.network.version());
        out[4] = self.depth;
        out[5..9].copy_from_slice(self.parent_fingerprint.as_bytes());
        out[9..13].copy_from_slice(&self.child_index.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..78].copy_from_slice(&self.key);
        out
    }

    /// Parses the fixed 78-byte layout.
    pub fn deserialize(data: &[u8]) -> Result<Self, KeyCodecError> {
        let data: &[u8; EXTENDED_KEY_LEN] = data
            .try_into()
            .map_err(|_| KeyCodecError::InvalidLength(data.len()))?;

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[0..4]);
        let network = KeyNetwork::from_version(version)?;

        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&data[5..9]);

        let mut index = [0u8; 4];
        index.copy_from_slice(&data[9..13]);

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);

        let mut key = [0u8; 33];
        key.copy_from_slice(&data[45..78]);
        check_key_prefix(key[0])?;

        Ok(Self {
            network,
            depth: data[4],
            parent_fingerprint: Fingerprint::from(fingerprint),
            child_index: u32::from_be_bytes(index),
            chain_code,
            key,
        })
    }

    fn to_base58(self) -> String {
        base58::encode_check(&self.serialize())
    }
}

impl FromStr for ExtendedKeyMaterial {
    type Err = KeyCodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_extended_key(s)
    }
}

/// Encodes key material into its Base58Check text form.
///
/// # Errors
///
/// If the key field does not carry a compressed point prefix.
pub fn encode_extended_key(material: &ExtendedKeyMaterial) -> Result<String, KeyCodecError> {
    check_key_prefix(material.key[0])?;
    Ok(material.to_base58())
}

/// Decodes the Base58Check text form of an extended public key.
///
/// # Errors
///
/// If the checksum does not match, the payload has the wrong length, the version is not a known
/// public version or the key prefix is not a compressed point prefix.
pub fn decode_extended_key(s: &str) -> Result<ExtendedKeyMaterial, KeyCodecError> {
    let data = base58::decode_check(s)?;
    ExtendedKeyMaterial::deserialize(&data)
}

fn check_key_prefix(prefix: u8) -> Result<(), KeyCodecError> {
    match prefix {
        0x02 | 0x03 => Ok(()),
        other => Err(KeyCodecError::InvalidKeyPrefix(other)),
    }
}

/// How the chain code of a synthetic key is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainCodeMode {
    /// `SHA256(payload)`.
    #[default]
    PayloadDigest,

    /// All zeroes, as the first generation of the key-embedding technique did.
    Zero,
}

/// Wraps a 32-byte payload in an extended key so it survives any channel that accepts keys.
///
/// The payload is not checked to be a valid curve point. The result is a transport container
/// that the device recognizes through the origin it is paired with, not a usable key.
pub fn encode_synthetic_key(payload: &[u8; 32], network: KeyNetwork, mode: ChainCodeMode) -> String {
    let chain_code = match mode {
        ChainCodeMode::PayloadDigest => Sha256::digest(payload).into(),
        ChainCodeMode::Zero => [0u8; 32],
    };

    let mut key = [0u8; 33];
    key[0] = SYNTHETIC_KEY_PREFIX;
    key[1..].copy_from_slice(payload);

    ExtendedKeyMaterial {
        network,
        depth: 0,
        parent_fingerprint: Fingerprint::from([0u8; 4]),
        child_index: 0,
        chain_code,
        key,
    }
    .to_base58()
}

/// The fingerprint part of a key origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginFingerprint {
    /// A real master key fingerprint reported by the device.
    Master(Fingerprint),

    /// A reserved sentinel that marks the key as carrying protocol data.
    Magic(MagicFingerprint),
}

impl OriginFingerprint {
    /// Returns the four bytes as they appear in the origin.
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            OriginFingerprint::Master(fp) => fp.to_bytes(),
            OriginFingerprint::Magic(magic) => magic.to_bytes(),
        }
    }
}

impl From<[u8; 4]> for OriginFingerprint {
    fn from(bytes: [u8; 4]) -> Self {
        match MagicFingerprint::from_bytes(bytes) {
            Some(magic) => OriginFingerprint::Magic(magic),
            None => OriginFingerprint::Master(Fingerprint::from(bytes)),
        }
    }
}

/// `[fingerprint/path]` prefix of a key expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyOrigin {
    fingerprint: OriginFingerprint,
    path: DerivationPath,
}

impl KeyOrigin {
    /// Origin of a key derived from the device's master key.
    pub const fn new(fingerprint: Fingerprint, path: DerivationPath) -> Self {
        Self {
            fingerprint: OriginFingerprint::Master(fingerprint),
            path,
        }
    }

    /// Origin that tags a synthetic key with the sentinel for its data role.
    pub fn magic(magic: MagicFingerprint) -> Self {
        Self {
            fingerprint: OriginFingerprint::Magic(magic),
            path: DerivationPath::master(),
        }
    }

    /// The fingerprint part.
    pub const fn fingerprint(&self) -> OriginFingerprint {
        self.fingerprint
    }

    /// The derivation path part.
    pub const fn path(&self) -> &DerivationPath {
        &self.path
    }

    /// Returns `true` if this origin is a sentinel rather than a real derivation.
    pub const fn is_magic(&self) -> bool {
        matches!(self.fingerprint, OriginFingerprint::Magic(_))
    }
}

impl fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", hex::encode(self.fingerprint.to_bytes()))?;
        for child in self.path.as_ref() {
            match child {
                ChildNumber::Normal { index } => write!(f, "/{index}")?,
                ChildNumber::Hardened { index } => write!(f, "/{index}'")?,
            }
        }
        f.write_str("]")
    }
}

impl FromStr for KeyOrigin {
    type Err = KeyCodecError;

    /// Parses `[f5acc2fd/86'/1'/0']`, with or without the brackets.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyCodecError::InvalidOrigin(s.to_owned());

        let inner = s.trim_start_matches('[').trim_end_matches(']');
        let (fp, path) = inner.split_once('/').unwrap_or((inner, ""));

        let fp_bytes: [u8; 4] = hex::decode(fp)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(invalid)?;

        let path = if path.is_empty() {
            DerivationPath::master()
        } else {
            DerivationPath::from_str(&format!("m/{path}")).map_err(|_| invalid())?
        };

        Ok(Self {
            fingerprint: OriginFingerprint::from(fp_bytes),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::bip32::Xpub;
    use proptest::prelude::*;

    use super::*;
    use crate::constants::UNSPENDABLE_INTERNAL_KEY;

    const DEVICE_ACCOUNT_TPUB: &str = "tpubDDKYE6BREvDsSWMazgHoyQWiJwYaDDYPbCFjYxN3HFXJP5fokeiK4hwK5tTLBNEDBwrDXn8cQ4v9b2xdW62Xr5yxoQdMu1v6c7UDXYVH27U";

    fn arb_material() -> impl Strategy<Value = ExtendedKeyMaterial> {
        (
            prop_oneof![Just(KeyNetwork::Mainnet), Just(KeyNetwork::Testnet)],
            any::<u8>(),
            any::<[u8; 4]>(),
            any::<u32>(),
            any::<[u8; 32]>(),
            prop_oneof![Just(0x02u8), Just(0x03u8)],
            any::<[u8; 32]>(),
        )
            .prop_map(|(network, depth, fp, child_index, chain_code, prefix, x)| {
                let mut key = [0u8; 33];
                key[0] = prefix;
                key[1..].copy_from_slice(&x);
                ExtendedKeyMaterial {
                    network,
                    depth,
                    parent_fingerprint: Fingerprint::from(fp),
                    child_index,
                    chain_code,
                    key,
                }
            })
    }

    proptest! {
        #[test]
        fn extended_key_roundtrips(material in arb_material()) {
            let encoded = encode_extended_key(&material).unwrap();
            prop_assert_eq!(decode_extended_key(&encoded).unwrap(), material);
        }

        #[test]
        fn corrupted_checksum_is_rejected(material in arb_material(), flip in 1u8..=255) {
            let encoded = encode_extended_key(&material).unwrap();
            let mut raw = base58::decode(&encoded).unwrap();
            let last = raw.len() - 1;
            raw[last] ^= flip;

            let corrupted = base58::encode(&raw);
            prop_assert!(matches!(
                decode_extended_key(&corrupted),
                Err(KeyCodecError::Base58(_))
            ));
        }
    }

    #[test]
    fn matches_bitcoin_xpub_encoding() {
        let xpub = Xpub::from_str(DEVICE_ACCOUNT_TPUB).unwrap();
        let material = decode_extended_key(DEVICE_ACCOUNT_TPUB).unwrap();

        assert_eq!(material.network, KeyNetwork::Testnet);
        assert_eq!(material.depth, 3);
        assert!(material.is_hardened());
        assert_eq!(material.chain_code, xpub.chain_code.to_bytes());
        assert_eq!(material.key, xpub.public_key.serialize());
        assert_eq!(
            encode_extended_key(&material).unwrap(),
            DEVICE_ACCOUNT_TPUB
        );
    }

    #[test]
    fn synthetic_key_golden() {
        let payload = UNSPENDABLE_INTERNAL_KEY.serialize();

        assert_eq!(
            encode_synthetic_key(&payload, KeyNetwork::Testnet, ChainCodeMode::Zero),
            "tpubD6NzVbkrYhZ4WLczPJWReQycCJdd6YVWXubbVUFnJ5KgU5MDQrD998ZJLSmaB7GVcCnJSDWprxmrGkJ6SvgQC6QAffVpqSvonXmeizXcrkN"
        );
        assert_eq!(
            encode_synthetic_key(&payload, KeyNetwork::Mainnet, ChainCodeMode::PayloadDigest),
            "xpub661MyMwAqRbcGNuNEQMdadk7FFo3p7Ln9J6XW6CWj5VNgy6m1T8M5EdrqP3geGAZ1a5wztLJ6WXACcvP1n6m1xmBDUUJzbKfpXbuogwh4nM"
        );
    }

    #[test]
    fn synthetic_key_decodes_back_to_payload() {
        let payload = [0xab; 32];
        let encoded = encode_synthetic_key(&payload, KeyNetwork::Testnet, ChainCodeMode::PayloadDigest);
        let material = decode_extended_key(&encoded).unwrap();

        assert_eq!(material.key[0], 0x02);
        assert_eq!(&material.key[1..], &payload);
        assert_eq!(material.chain_code, <[u8; 32]>::from(Sha256::digest(payload)));
        assert_eq!(material.depth, 0);
    }

    #[test]
    fn rejects_private_and_unknown_versions() {
        let xprv = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
        assert!(matches!(
            decode_extended_key(xprv),
            Err(KeyCodecError::InvalidNetwork([0x04, 0x88, 0xAD, 0xE4]))
        ));
    }

    #[test]
    fn rejects_bad_key_prefix() {
        let mut material = decode_extended_key(DEVICE_ACCOUNT_TPUB).unwrap();
        material.key[0] = 0x04;
        assert!(matches!(
            encode_extended_key(&material),
            Err(KeyCodecError::InvalidKeyPrefix(0x04))
        ));
    }

    #[test]
    fn key_origin_display_and_parse() {
        let origin = KeyOrigin::new(
            Fingerprint::from([0xf5, 0xac, 0xc2, 0xfd]),
            DerivationPath::from_str("m/86'/1'/0'").unwrap(),
        );
        assert_eq!(origin.to_string(), "[f5acc2fd/86'/1'/0']");
        assert_eq!(KeyOrigin::from_str("[f5acc2fd/86'/1'/0']").unwrap(), origin);

        let magic = KeyOrigin::magic(MagicFingerprint::FinalityProvider);
        assert_eq!(magic.to_string(), "[ff119473]");
        assert!(KeyOrigin::from_str("[ff119473]").unwrap().is_magic());
    }
}
