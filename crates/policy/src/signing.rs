//! Merging device signatures into a PSBT.

use bitcoin::{psbt::Input, Psbt};
use staking_signer_device_proto::PartialSignature;

use crate::errors::ProtocolMismatch;

/// Stores `signature` in the field of `input` that matches its spending path.
///
/// An existing signature for the same key (and leaf) is replaced.
pub fn merge_signature(input: &mut Input, signature: &PartialSignature) {
    match *signature {
        PartialSignature::TaprootKey { signature, .. } => {
            input.tap_key_sig = Some(signature);
        }
        PartialSignature::TaprootScript {
            pubkey,
            leaf_hash,
            signature,
        } => {
            input.tap_script_sigs.insert((pubkey, leaf_hash), signature);
        }
        PartialSignature::Ecdsa { pubkey, signature } => {
            input.partial_sigs.insert(pubkey, signature);
        }
    }
}

/// Merges the signatures a device returned into `psbt`.
///
/// Either every signature is merged or none is. Returns the number merged.
///
/// # Errors
///
/// - [`ProtocolMismatch::NoSignatures`] if `signatures` is empty.
/// - [`ProtocolMismatch::InputOutOfRange`] if an index points past the inputs.
pub fn apply_signatures(
    psbt: &mut Psbt,
    signatures: &[(usize, PartialSignature)],
) -> Result<usize, ProtocolMismatch> {
    if signatures.is_empty() {
        return Err(ProtocolMismatch::NoSignatures);
    }

    let inputs = psbt.inputs.len();
    if let Some(&(index, _)) = signatures.iter().find(|(index, _)| *index >= inputs) {
        return Err(ProtocolMismatch::InputOutOfRange { index, inputs });
    }

    for (index, signature) in signatures {
        merge_signature(&mut psbt.inputs[*index], signature);
    }

    Ok(signatures.len())
}

#[cfg(test)]
mod tests {
    use bitcoin::{
        secp256k1::schnorr, sighash::TapSighashType, taproot, TapLeafHash, XOnlyPublicKey,
    };
    use staking_signer_primitives::taproot::compute_leaf_hash;
    use staking_signer_test_utils::fixtures;

    use super::*;

    fn script_signature(pubkey: XOnlyPublicKey, leaf_hash: TapLeafHash) -> PartialSignature {
        PartialSignature::TaprootScript {
            pubkey,
            leaf_hash,
            signature: taproot::Signature {
                signature: schnorr::Signature::from_slice(&[0x11; 64]).unwrap(),
                sighash_type: TapSighashType::Default,
            },
        }
    }

    #[test]
    fn merges_script_path_signature_under_key_and_leaf() {
        let mut psbt = fixtures::psbt(fixtures::WITHDRAW_PSBT);
        let staker = fixtures::x_only(fixtures::STAKER_PK);
        let leaf_hash = compute_leaf_hash(&psbt).unwrap();

        let merged = apply_signatures(&mut psbt, &[(0, script_signature(staker, leaf_hash))]);

        assert_eq!(merged, Ok(1));
        assert!(psbt.inputs[0]
            .tap_script_sigs
            .contains_key(&(staker, leaf_hash)));
        assert!(psbt.inputs[0].tap_key_sig.is_none());
    }

    #[test]
    fn out_of_range_index_leaves_psbt_untouched() {
        let mut psbt = fixtures::psbt(fixtures::WITHDRAW_PSBT);
        let staker = fixtures::x_only(fixtures::STAKER_PK);
        let leaf_hash = compute_leaf_hash(&psbt).unwrap();
        let before = psbt.clone();

        let err = apply_signatures(
            &mut psbt,
            &[
                (0, script_signature(staker, leaf_hash)),
                (3, script_signature(staker, leaf_hash)),
            ],
        )
        .unwrap_err();

        assert_eq!(err, ProtocolMismatch::InputOutOfRange { index: 3, inputs: 1 });
        assert_eq!(psbt, before);
    }

    #[test]
    fn empty_answer_is_an_error() {
        let mut psbt = fixtures::psbt(fixtures::STAKE_PSBT);
        assert_eq!(
            apply_signatures(&mut psbt, &[]),
            Err(ProtocolMismatch::NoSignatures)
        );
    }
}
