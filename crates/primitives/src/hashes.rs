//! BIP340-style tagged hashes.

use sha2::{Digest, Sha256};

/// Tag of the BIP322 message hash.
pub const BIP322_MESSAGE_TAG: &str = "BIP0322-signed-message";

/// Computes `SHA256(SHA256(tag) || SHA256(tag) || data)`.
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());

    Sha256::new()
        .chain_update(tag_hash)
        .chain_update(tag_hash)
        .chain_update(data)
        .finalize()
        .into()
}

/// Hash committed to by the `to_spend` transaction of a BIP322 signature.
pub fn bip322_message_hash(message: &[u8]) -> [u8; 32] {
    tagged_hash(BIP322_MESSAGE_TAG, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bip322_message_hash_vectors() {
        assert_eq!(
            hex::encode(bip322_message_hash(b"")),
            "c90c269c4f8fcbe6880f72a721ddfbf1914268a794cbb21cfafee13770ae19f1"
        );
        assert_eq!(
            hex::encode(bip322_message_hash(b"Hello World")),
            "f0eb03b1a75ac6d9847f55c624a99169b5dccba2a31f5b23bea77ba270de0a7a"
        );
    }

    #[test]
    fn tagged_hash_matches_tap_leaf_hash() {
        use bitcoin::{hashes::Hash, taproot::LeafVersion, ScriptBuf, TapLeafHash};

        let script = ScriptBuf::from_bytes(vec![0x51]);
        let mut data = vec![0xc0, 0x01];
        data.extend_from_slice(script.as_bytes());

        assert_eq!(
            tagged_hash("TapLeaf", &data),
            TapLeafHash::from_script(&script, LeafVersion::TapScript).to_byte_array()
        );
    }
}
