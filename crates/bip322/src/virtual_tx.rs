//! The `to_spend`/`to_sign` transaction pair of a BIP322 signature.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::{
    absolute::LockTime,
    consensus,
    hashes::Hash,
    opcodes::{all::OP_RETURN, OP_0},
    script::Builder,
    transaction::Version,
    Amount, OutPoint, Psbt, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use staking_signer_primitives::hashes::bip322_message_hash;

use crate::errors::MessageSignResult;

/// The virtual transactions a BIP322 signature is made over.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualTransactionPair {
    /// Commits to the message and pays the signer's script.
    pub to_spend: Transaction,

    /// Spends `to_spend`; the signature is made over this one.
    pub to_sign: Psbt,
}

impl VirtualTransactionPair {
    /// Builds the pair for `message` signed by the owner of `script_pubkey`.
    ///
    /// The `to_sign` input carries `to_spend`'s output as its witness utxo.
    pub fn new(message: &[u8], script_pubkey: ScriptBuf) -> MessageSignResult<Self> {
        let message_hash = bip322_message_hash(message);

        let to_spend = Transaction {
            version: Version(0),
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::all_zeros(),
                    vout: u32::MAX,
                },
                script_sig: Builder::new()
                    .push_opcode(OP_0)
                    .push_slice(message_hash)
                    .into_script(),
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::ZERO,
                script_pubkey,
            }],
        };

        let unsigned = Transaction {
            version: Version(0),
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: to_spend.compute_txid(),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::ZERO,
                script_pubkey: Builder::new().push_opcode(OP_RETURN).into_script(),
            }],
        };

        let mut to_sign = Psbt::from_unsigned_tx(unsigned)?;
        to_sign.inputs[0].witness_utxo = Some(to_spend.output[0].clone());

        Ok(Self { to_spend, to_sign })
    }

    /// Txid of `to_spend`.
    pub fn to_spend_txid(&self) -> Txid {
        self.to_spend.compute_txid()
    }
}

/// Serializes a witness stack (count and length prefixed items) and encodes it as base64.
pub fn encode_witness(witness: &Witness) -> String {
    STANDARD.encode(consensus::serialize(witness))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bitcoin::{
        ecdsa,
        secp256k1::{Message, SECP256K1},
        sighash::{EcdsaSighashType, SighashCache},
        CompressedPublicKey, PrivateKey, PublicKey,
    };
    use staking_signer_device_proto::PartialSignature;

    use super::*;
    use crate::signer::finalize_signature;

    const WIF: &str = "L3VFeEujGtevx9w18HD1fhRbCH67Az2dpCymeRE1SoPK6XQtaN2k";

    fn p2wpkh(key: &PrivateKey) -> (ScriptBuf, PublicKey) {
        let pubkey = CompressedPublicKey(key.public_key(SECP256K1).inner);
        (ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()), PublicKey::new(pubkey.0))
    }

    fn sign_p2wpkh(message: &str) -> String {
        let key = PrivateKey::from_wif(WIF).unwrap();
        let (script, pubkey) = p2wpkh(&key);
        let mut pair = VirtualTransactionPair::new(message.as_bytes(), script.clone()).unwrap();

        let sighash = SighashCache::new(&pair.to_sign.unsigned_tx)
            .p2wpkh_signature_hash(0, &script, Amount::ZERO, EcdsaSighashType::All)
            .unwrap();
        let signature = SECP256K1.sign_ecdsa_low_r(
            &Message::from_digest(sighash.to_byte_array()),
            &key.inner,
        );

        finalize_signature(
            &mut pair.to_sign.inputs[0],
            &PartialSignature::Ecdsa {
                pubkey,
                signature: ecdsa::Signature {
                    signature,
                    sighash_type: EcdsaSighashType::All,
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn hello_world_transactions() {
        let script = ScriptBuf::from_hex("00142b05d564e6a7a33c087f16e0f730d1440123799d").unwrap();
        let pair = VirtualTransactionPair::new(b"Hello World", script).unwrap();

        assert_eq!(
            pair.to_spend_txid(),
            Txid::from_str("b79d196740ad5217771c1098fc4a4b51e0535c32236c71f1ea4d61a2d603352b")
                .unwrap()
        );
        assert_eq!(
            pair.to_sign.unsigned_tx.compute_txid(),
            Txid::from_str("88737ae86f2077145f93cc4b153ae9a1cb8d56afa511988c149c5c8c9d93bddf")
                .unwrap()
        );
        assert_eq!(pair.to_sign.inputs[0].witness_utxo, Some(pair.to_spend.output[0].clone()));
    }

    #[test]
    fn p2wpkh_witness_vectors() {
        assert_eq!(
            sign_p2wpkh("Hello World"),
            "AkcwRAIgZRfIY3p7/DoVTty6YZbWS71bc5Vct9p9Fia83eRmw2QCICK/ENGfwLtptFluMGs2KsqoNSk89pO7F29zJLUx9a/sASECx/EgAxlkQpQ9hYjgGu6EBCPMVPwVIVJqO4XCsMvViHI="
        );
        assert_eq!(
            sign_p2wpkh(""),
            "AkcwRAIgM2gBAQqvZX15ZiysmKmQpDrG83avLIT492QBzLnQIxYCIBaTpOaD20qRlEylyxFSeEA2ba9YOixpX8z46TSDtS40ASECx/EgAxlkQpQ9hYjgGu6EBCPMVPwVIVJqO4XCsMvViHI="
        );
    }
}
