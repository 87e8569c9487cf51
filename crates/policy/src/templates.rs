//! Descriptor templates and key lists for each action.
//!
//! [`tlv_policy`] produces the shapes used alongside the TLV channel, [`embedded_policy`] the
//! older shapes that carry the protocol data as synthetic keys.

use bitcoin::{hashes::Hash, TapLeafHash, XOnlyPublicKey};
use staking_signer_params::prelude::{StakingActionParams, ValidationError};
use staking_signer_primitives::{
    constants::{MagicFingerprint, UNSPENDABLE_INTERNAL_KEY},
    hashes::bip322_message_hash,
    keys::{encode_synthetic_key, ChainCodeMode, KeyNetwork, KeyOrigin},
    policy::{AddressType, DescriptorTemplate, Fragment, KeyExpression, KeyPlaceholder},
};

use crate::errors::{PolicyBuildError, PolicyResult, ProtocolMismatch};

/// A template with the keys its placeholders refer to.
pub type TemplateWithKeys = (DescriptorTemplate, Vec<KeyExpression>);

/// Template for the TLV channel.
///
/// Everything except withdrawal signs through `tr(@0/**)` (or `wpkh(@0/**)` for segwit message
/// signatures) and relies on the TLV stream for the rest. Withdrawal spells out its timelock leaf
/// under the unspendable internal key.
pub fn tlv_policy(
    params: &StakingActionParams,
    own_key: KeyExpression,
    network: KeyNetwork,
    address_type: AddressType,
) -> PolicyResult<TemplateWithKeys> {
    match (params, address_type) {
        (StakingActionParams::Withdraw(p), AddressType::Taproot) => {
            let template = timelock_template(p.timelock_blocks)?;
            let nums = KeyExpression::new(None, synthetic(&UNSPENDABLE_INTERNAL_KEY, network));
            Ok((template, vec![nums, own_key]))
        }
        (StakingActionParams::SignMessage(_), AddressType::NativeSegwit) => Ok((
            DescriptorTemplate::Wpkh(KeyPlaceholder::ranged(0)),
            vec![own_key],
        )),
        (_, AddressType::Taproot) => Ok((DescriptorTemplate::key_path_only(), vec![own_key])),
        (_, other) => Err(PolicyBuildError::UnsupportedAddressType(other)),
    }
}

/// Template for firmware without the TLV channel.
///
/// Covenant keys are sorted bytewise. `leaf_hash` is required for the script-path actions and
/// is tagged for display or for checking only according to `display_leaf_hash`. Segwit message
/// signatures need nothing embedded and use `wpkh(@0/**)` as on the TLV channel.
pub fn embedded_policy(
    params: &StakingActionParams,
    own_key: KeyExpression,
    network: KeyNetwork,
    address_type: AddressType,
    leaf_hash: Option<TapLeafHash>,
    display_leaf_hash: bool,
) -> PolicyResult<TemplateWithKeys> {
    match (params, address_type) {
        (_, AddressType::Taproot) => {}
        (StakingActionParams::SignMessage(_), AddressType::NativeSegwit) => {
            return Ok((
                DescriptorTemplate::Wpkh(KeyPlaceholder::ranged(0)),
                vec![own_key],
            ))
        }
        (_, other) => return Err(PolicyBuildError::UnsupportedAddressType(other)),
    }

    let leaf_key = || -> PolicyResult<KeyExpression> {
        let leaf_hash = leaf_hash.ok_or(ProtocolMismatch::NoTaprootScript)?;
        let magic = if display_leaf_hash {
            MagicFingerprint::LeafHashDisplay
        } else {
            MagicFingerprint::LeafHashCheckOnly
        };
        Ok(tagged(magic, &leaf_hash.to_byte_array(), network))
    };

    match params {
        StakingActionParams::Staking(_) => {
            Ok((DescriptorTemplate::key_path_only(), vec![own_key]))
        }
        StakingActionParams::Slashing(p) => {
            let covenants = p.covenants.sorted_keys();
            let mut keys = vec![leaf_key()?, own_key];
            keys.extend(p.finality_providers.iter().map(|fp| {
                tagged(MagicFingerprint::FinalityProvider, &fp.serialize(), network)
            }));
            keys.extend(covenants.iter().map(|key| plain(key, network)));

            let template = staker_leaf(Fragment::and_v(
                Fragment::PkK(KeyPlaceholder::fixed(2)),
                multi_a(p.covenants.threshold, 3, covenants.len()),
            ));
            Ok((template, keys))
        }
        StakingActionParams::Unbonding(p) => {
            let covenants = p.covenants.sorted_keys();
            let mut keys = vec![leaf_key()?, own_key];
            keys.extend(covenants.iter().map(|key| plain(key, network)));

            let template = staker_leaf(multi_a(p.covenants.threshold, 2, covenants.len()));
            Ok((template, keys))
        }
        StakingActionParams::Withdraw(p) => Ok((
            timelock_template(p.timelock_blocks)?,
            vec![leaf_key()?, own_key],
        )),
        StakingActionParams::SignMessage(p) => {
            let message_hash = bip322_message_hash(&p.message);
            let keys = vec![
                own_key,
                tagged(MagicFingerprint::Bip322Message, &message_hash, network),
                tagged(
                    MagicFingerprint::Bip322InternalKey,
                    &p.signer_key.serialize(),
                    network,
                ),
            ];

            let template = DescriptorTemplate::Tr {
                internal: KeyPlaceholder::ranged(0),
                leaf: Some(Fragment::and_v(
                    Fragment::PkK(KeyPlaceholder::fixed(1)),
                    Fragment::PkK(KeyPlaceholder::fixed(2)),
                )),
            };
            Ok((template, keys))
        }
    }
}

/// `tr(@0/**, and_v(pk_k(@1/**), older(n)))`.
fn timelock_template(timelock_blocks: u64) -> PolicyResult<DescriptorTemplate> {
    let blocks = u32::try_from(timelock_blocks)
        .map_err(|_| ValidationError::TimelockOutOfRange(timelock_blocks))?;
    Ok(staker_leaf(Fragment::Older(blocks)))
}

/// `tr(@0/**, and_v(pk_k(@1/**), rest))`.
fn staker_leaf(rest: Fragment) -> DescriptorTemplate {
    DescriptorTemplate::Tr {
        internal: KeyPlaceholder::ranged(0),
        leaf: Some(Fragment::and_v(
            Fragment::PkK(KeyPlaceholder::ranged(1)),
            rest,
        )),
    }
}

/// `multi_a(threshold, @first, ..., @first+count-1)`.
fn multi_a(threshold: u8, first: u32, count: usize) -> Fragment {
    Fragment::MultiA {
        threshold: u32::from(threshold),
        keys: (first..)
            .take(count)
            .map(KeyPlaceholder::fixed)
            .collect(),
    }
}

fn synthetic(key: &XOnlyPublicKey, network: KeyNetwork) -> String {
    encode_synthetic_key(&key.serialize(), network, ChainCodeMode::Zero)
}

fn plain(key: &XOnlyPublicKey, network: KeyNetwork) -> KeyExpression {
    KeyExpression::new(None, synthetic(key, network))
}

fn tagged(magic: MagicFingerprint, payload: &[u8; 32], network: KeyNetwork) -> KeyExpression {
    KeyExpression::new(
        Some(KeyOrigin::magic(magic)),
        encode_synthetic_key(payload, network, ChainCodeMode::Zero),
    )
}

#[cfg(test)]
mod tests {
    use staking_signer_params::prelude::{SignMessageParams, WithdrawParams};
    use staking_signer_test_utils::fixtures;

    use super::*;

    const NUMS_TPUB: &str = "tpubD6NzVbkrYhZ4WLczPJWReQycCJdd6YVWXubbVUFnJ5KgU5MDQrD998ZJLSmaB7GVcCnJSDWprxmrGkJ6SvgQC6QAffVpqSvonXmeizXcrkN";

    fn own() -> KeyExpression {
        format!("[f5acc2fd/86'/1'/0']{}", fixtures::TAPROOT_ACCOUNT_XPUB)
            .parse()
            .unwrap()
    }

    #[test]
    fn withdraw_uses_unspendable_internal_key() {
        let params = StakingActionParams::from(WithdrawParams {
            timelock_blocks: 1008,
        });
        let (template, keys) =
            tlv_policy(&params, own(), KeyNetwork::Testnet, AddressType::Taproot).unwrap();

        assert_eq!(
            template.to_string(),
            "tr(@0/**, and_v(pk_k(@1/**), older(1008)))"
        );
        assert_eq!(keys[0].to_string(), NUMS_TPUB);
        assert_eq!(keys[1], own());
    }

    #[test]
    fn segwit_only_for_messages() {
        let message = StakingActionParams::from(SignMessageParams {
            message: b"hello".to_vec(),
            signer_key: fixtures::x_only(fixtures::STAKER_PK),
            to_spend_txid: None,
        });
        let (template, _) =
            tlv_policy(&message, own(), KeyNetwork::Testnet, AddressType::NativeSegwit).unwrap();
        assert_eq!(template.to_string(), "wpkh(@0/**)");

        let stake = StakingActionParams::from(fixtures::staking_params());
        assert!(matches!(
            tlv_policy(&stake, own(), KeyNetwork::Testnet, AddressType::NativeSegwit),
            Err(PolicyBuildError::UnsupportedAddressType(AddressType::NativeSegwit))
        ));
    }

    #[test]
    fn embedded_unbonding_sorts_covenants() {
        let mut params = fixtures::unbonding_params();
        params.covenants.keys.reverse();
        let leaf_hash = TapLeafHash::from_byte_array([7; 32]);

        let (template, keys) = embedded_policy(
            &StakingActionParams::from(params),
            own(),
            KeyNetwork::Testnet,
            AddressType::Taproot,
            Some(leaf_hash),
            false,
        )
        .unwrap();

        assert_eq!(
            template.to_string(),
            "tr(@0/**, and_v(pk_k(@1/**), multi_a(6, @2, @3, @4, @5, @6, @7, @8, @9, @10)))"
        );
        assert!(keys[0].to_string().starts_with("[3b9f9680]tpub"));
        assert_eq!(
            keys[2].to_string(),
            synthetic(&fixtures::x_only(fixtures::COVENANT_PKS[0]), KeyNetwork::Testnet)
        );
    }

    #[test]
    fn embedded_message_tags_hash_and_internal_key() {
        let params = StakingActionParams::from(SignMessageParams {
            message: b"Hello World".to_vec(),
            signer_key: fixtures::x_only(fixtures::STAKER_PK),
            to_spend_txid: None,
        });
        let (template, keys) = embedded_policy(
            &params,
            own(),
            KeyNetwork::Testnet,
            AddressType::Taproot,
            None,
            true,
        )
        .unwrap();

        assert_eq!(
            template.to_string(),
            "tr(@0/**, and_v(pk_k(@1), pk_k(@2)))"
        );
        assert!(keys[1].to_string().starts_with("[83871619]tpub"));
        assert!(keys[2].to_string().starts_with("[25270417]tpub"));
    }

    #[test]
    fn embedded_script_paths_need_leaf_hash() {
        let params = StakingActionParams::from(fixtures::withdraw_params());
        assert!(matches!(
            embedded_policy(
                &params,
                own(),
                KeyNetwork::Testnet,
                AddressType::Taproot,
                None,
                true
            ),
            Err(PolicyBuildError::ProtocolMismatch(
                ProtocolMismatch::NoTaprootScript
            ))
        ));
    }

    #[test]
    fn embedded_segwit_message_is_plain_wpkh() {
        let message = StakingActionParams::from(SignMessageParams {
            message: b"Hello World".to_vec(),
            signer_key: fixtures::x_only(fixtures::STAKER_PK),
            to_spend_txid: None,
        });
        let (template, keys) = embedded_policy(
            &message,
            own(),
            KeyNetwork::Testnet,
            AddressType::NativeSegwit,
            None,
            true,
        )
        .unwrap();
        assert_eq!(template.to_string(), "wpkh(@0/**)");
        assert_eq!(keys, [own()]);

        let unbond = StakingActionParams::from(fixtures::unbonding_params());
        assert!(matches!(
            embedded_policy(
                &unbond,
                own(),
                KeyNetwork::Testnet,
                AddressType::NativeSegwit,
                Some(TapLeafHash::from_byte_array([7; 32])),
                true
            ),
            Err(PolicyBuildError::UnsupportedAddressType(AddressType::NativeSegwit))
        ));
    }
}
