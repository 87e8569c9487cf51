//! Encoding and decoding of staking action parameters as TLV streams.
//!
//! Record order per action:
//!
//! | Action       | Records                                                    |
//! | ------------ | ---------------------------------------------------------- |
//! | stake        | action, fp count, fp list, cov count, cov list, quorum, timelock |
//! | slash        | same as stake, then slashing fee, slashing script          |
//! | unbond       | same as stake, then unbonding fee                          |
//! | withdraw     | action, timelock                                           |
//! | sign message | action, message, staker key, [to_spend txid]               |
//!
//! A list record is omitted when its count is zero. Counts are one byte, integers are eight
//! big-endian bytes and keys are 32-byte x-only keys.

use std::{iter::Peekable, slice};

use bitcoin::{hashes::Hash, Amount, ScriptBuf, Txid, XOnlyPublicKey};
use staking_signer_params::prelude::{
    ActionKind, CovenantQuorum, SignMessageParams, SlashingParams, StakingActionParams,
    StakingParams, UnbondingParams, WithdrawParams, X_ONLY_KEY_LEN,
};

use crate::{
    errors::TlvError,
    record::{TlvRecord, TlvStream},
    tags,
};

/// Encodes any action's parameters.
pub fn encode(params: &StakingActionParams) -> Result<TlvStream, TlvError> {
    match params {
        StakingActionParams::Staking(p) => encode_staking(p),
        StakingActionParams::Slashing(p) => encode_slashing(p),
        StakingActionParams::Unbonding(p) => encode_unbonding(p),
        StakingActionParams::Withdraw(p) => Ok(encode_withdraw(p)),
        StakingActionParams::SignMessage(p) => encode_sign_message(p),
    }
}

/// Encodes staking parameters.
pub fn encode_staking(params: &StakingParams) -> Result<TlvStream, TlvError> {
    let mut stream = action(ActionKind::Stake);
    push_delegation(
        &mut stream,
        &params.finality_providers,
        &params.covenants,
        params.timelock_blocks,
    )?;
    Ok(stream)
}

/// Encodes slashing parameters.
pub fn encode_slashing(params: &SlashingParams) -> Result<TlvStream, TlvError> {
    let mut stream = action(ActionKind::Slash);
    push_delegation(
        &mut stream,
        &params.finality_providers,
        &params.covenants,
        params.timelock_blocks,
    )?;
    stream.push(TlvRecord::u64(
        tags::SLASHING_FEE_LIMIT,
        params.slashing_fee.to_sat(),
    ));
    stream.push(TlvRecord::new(
        tags::SLASHING_SCRIPT,
        params.slashing_pk_script.as_bytes(),
    )?);
    Ok(stream)
}

/// Encodes unbonding parameters.
pub fn encode_unbonding(params: &UnbondingParams) -> Result<TlvStream, TlvError> {
    let mut stream = action(ActionKind::Unbond);
    push_delegation(
        &mut stream,
        params.finality_providers.as_deref().unwrap_or_default(),
        &params.covenants,
        params.timelock_blocks,
    )?;
    stream.push(TlvRecord::u64(
        tags::UNBONDING_FEE_LIMIT,
        params.unbonding_fee.to_sat(),
    ));
    Ok(stream)
}

/// Encodes withdrawal parameters.
pub fn encode_withdraw(params: &WithdrawParams) -> TlvStream {
    let mut stream = action(ActionKind::Withdraw);
    stream.push(TlvRecord::u64(tags::TIMELOCK, params.timelock_blocks));
    stream
}

/// Encodes message signing parameters.
///
/// The txid is written in its internal byte order.
pub fn encode_sign_message(params: &SignMessageParams) -> Result<TlvStream, TlvError> {
    let mut stream = action(ActionKind::SignMessage);
    stream.push(TlvRecord::new(tags::MESSAGE, params.message.as_slice())?);
    stream.push(TlvRecord::new(
        tags::STAKER_KEY,
        params.signer_key.serialize(),
    )?);
    if let Some(txid) = params.to_spend_txid {
        stream.push(TlvRecord::new(tags::TXID, txid.to_byte_array())?);
    }
    Ok(stream)
}

fn action(kind: ActionKind) -> TlvStream {
    let mut stream = TlvStream::new();
    stream.push(TlvRecord::byte(tags::ACTION, kind.code()));
    stream
}

fn push_delegation(
    stream: &mut TlvStream,
    finality_providers: &[XOnlyPublicKey],
    covenants: &CovenantQuorum,
    timelock_blocks: u64,
) -> Result<(), TlvError> {
    push_key_list(
        stream,
        tags::FINALITY_PROVIDER_COUNT,
        tags::FINALITY_PROVIDERS,
        finality_providers,
    )?;
    push_key_list(
        stream,
        tags::COVENANT_KEY_COUNT,
        tags::COVENANT_KEYS,
        &covenants.keys,
    )?;
    stream.push(TlvRecord::byte(tags::COVENANT_QUORUM, covenants.threshold));
    stream.push(TlvRecord::u64(tags::TIMELOCK, timelock_blocks));
    Ok(())
}

fn push_key_list(
    stream: &mut TlvStream,
    count_tag: u8,
    list_tag: u8,
    keys: &[XOnlyPublicKey],
) -> Result<(), TlvError> {
    let count = u8::try_from(keys.len()).map_err(|_| TlvError::TooManyEntries {
        tag: count_tag,
        count: keys.len(),
    })?;
    stream.push(TlvRecord::byte(count_tag, count));

    if count > 0 {
        let list: Vec<u8> = keys.iter().flat_map(|key| key.serialize()).collect();
        stream.push(TlvRecord::new(list_tag, list)?);
    }
    Ok(())
}

/// Decodes a stream produced by [`encode`].
///
/// # Errors
///
/// If records are missing, out of order, of the wrong size, or followed by extra records.
pub fn decode(bytes: &[u8]) -> Result<StakingActionParams, TlvError> {
    let stream = TlvStream::parse(bytes)?;
    let mut reader = Reader {
        records: stream.records().iter().peekable(),
    };

    let code = reader.byte(tags::ACTION)?;
    let kind = ActionKind::from_code(code).ok_or(TlvError::UnknownAction(code))?;

    let params = match kind {
        ActionKind::Stake => {
            let (finality_providers, covenants, timelock_blocks) = reader.delegation()?;
            StakingActionParams::Staking(StakingParams {
                timelock_blocks,
                finality_providers,
                covenants,
            })
        }
        ActionKind::Slash => {
            let (finality_providers, covenants, timelock_blocks) = reader.delegation()?;
            let slashing_fee = Amount::from_sat(reader.u64(tags::SLASHING_FEE_LIMIT)?);
            let slashing_pk_script =
                ScriptBuf::from_bytes(reader.expect(tags::SLASHING_SCRIPT)?.to_vec());
            StakingActionParams::Slashing(SlashingParams {
                timelock_blocks,
                finality_providers,
                covenants,
                slashing_pk_script,
                slashing_fee,
            })
        }
        ActionKind::Unbond => {
            let (finality_providers, covenants, timelock_blocks) = reader.delegation()?;
            let unbonding_fee = Amount::from_sat(reader.u64(tags::UNBONDING_FEE_LIMIT)?);
            StakingActionParams::Unbonding(UnbondingParams {
                timelock_blocks,
                finality_providers: (!finality_providers.is_empty()).then_some(finality_providers),
                covenants,
                unbonding_fee,
            })
        }
        ActionKind::Withdraw => StakingActionParams::Withdraw(WithdrawParams {
            timelock_blocks: reader.u64(tags::TIMELOCK)?,
        }),
        ActionKind::SignMessage => {
            let message = reader.expect(tags::MESSAGE)?.to_vec();
            let signer_key = reader.keys(tags::STAKER_KEY, 1)?[0];
            let to_spend_txid = match reader.optional(tags::TXID) {
                Some(value) => Some(Txid::from_byte_array(fixed::<32>(tags::TXID, value)?)),
                None => None,
            };
            StakingActionParams::SignMessage(SignMessageParams {
                message,
                signer_key,
                to_spend_txid,
            })
        }
    };

    reader.finish()?;
    Ok(params)
}

struct Reader<'a> {
    records: Peekable<slice::Iter<'a, TlvRecord>>,
}

impl<'a> Reader<'a> {
    fn expect(&mut self, tag: u8) -> Result<&'a [u8], TlvError> {
        match self.records.next() {
            Some(record) if record.tag() == tag => Ok(record.value()),
            other => Err(TlvError::UnexpectedTag {
                expected: tag,
                found: other.map(TlvRecord::tag),
            }),
        }
    }

    fn optional(&mut self, tag: u8) -> Option<&'a [u8]> {
        self.records
            .next_if(|record| record.tag() == tag)
            .map(TlvRecord::value)
    }

    fn byte(&mut self, tag: u8) -> Result<u8, TlvError> {
        let [value] = fixed::<1>(tag, self.expect(tag)?)?;
        Ok(value)
    }

    fn u64(&mut self, tag: u8) -> Result<u64, TlvError> {
        Ok(u64::from_be_bytes(fixed::<8>(tag, self.expect(tag)?)?))
    }

    fn keys(&mut self, tag: u8, count: usize) -> Result<Vec<XOnlyPublicKey>, TlvError> {
        let value = self.expect(tag)?;
        if value.len() != count * X_ONLY_KEY_LEN {
            return Err(TlvError::InvalidKeyLength {
                tag,
                count,
                len: value.len(),
            });
        }

        value
            .chunks_exact(X_ONLY_KEY_LEN)
            .map(|chunk| XOnlyPublicKey::from_slice(chunk).map_err(|_| TlvError::InvalidKey(tag)))
            .collect()
    }

    fn key_list(&mut self, count_tag: u8, list_tag: u8) -> Result<Vec<XOnlyPublicKey>, TlvError> {
        match usize::from(self.byte(count_tag)?) {
            0 => Ok(Vec::new()),
            count => self.keys(list_tag, count),
        }
    }

    fn delegation(&mut self) -> Result<(Vec<XOnlyPublicKey>, CovenantQuorum, u64), TlvError> {
        let finality_providers =
            self.key_list(tags::FINALITY_PROVIDER_COUNT, tags::FINALITY_PROVIDERS)?;
        let keys = self.key_list(tags::COVENANT_KEY_COUNT, tags::COVENANT_KEYS)?;
        let threshold = self.byte(tags::COVENANT_QUORUM)?;
        let timelock_blocks = self.u64(tags::TIMELOCK)?;

        Ok((
            finality_providers,
            CovenantQuorum::new(threshold, keys),
            timelock_blocks,
        ))
    }

    fn finish(mut self) -> Result<(), TlvError> {
        match self.records.by_ref().count() {
            0 => Ok(()),
            n => Err(TlvError::TrailingRecords(n)),
        }
    }
}

fn fixed<const N: usize>(tag: u8, value: &[u8]) -> Result<[u8; N], TlvError> {
    value.try_into().map_err(|_| TlvError::LengthMismatch {
        tag,
        expected: N,
        got: value.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;
    use staking_signer_params::prelude::Strictness;

    use super::*;

    const COVENANT_PKS: [&str; 9] = [
        "0aee0509b16db71c999238a4827db945526859b13c95487ab46725357c9a9f25",
        "113c3a32a9d320b72190a04a020a0db3976ef36972673258e9a38a364f3dc3b0",
        "17921cf156ccb4e73d428f996ed11b245313e37e27c978ac4d2cc21eca4672e4",
        "3bb93dfc8b61887d771f3630e9a63e97cbafcfcc78556a474df83a31a0ef899c",
        "40afaf47c4ffa56de86410d8e47baa2bb6f04b604f4ea24323737ddc3fe092df",
        "79a71ffd71c503ef2e2f91bccfc8fcda7946f4653cef0d9f3dde20795ef3b9f0",
        "d21faf78c6751a0d38e6bd8028b907ff07e9a869a43fc837d6b3f8dff6119a36",
        "f5199efae3f28bb82476163a7e458c7ad445d9bffb0682d10d3bdb2cb41f8e8e",
        "fa9d882d45f4060bdb8042183828cd87544f1ea997380e586cab77d5fd698737",
    ];

    const FINALITY_PROVIDER: &str =
        "d66124f8f42fd83e4c901a100ae3b5d706ef6cfd217b04bc64152e739a30c41e";

    fn key(hex: &str) -> XOnlyPublicKey {
        XOnlyPublicKey::from_str(hex).unwrap()
    }

    fn covenants() -> CovenantQuorum {
        CovenantQuorum::new(6, COVENANT_PKS.into_iter().map(key).collect())
    }

    #[test]
    fn withdraw_golden() {
        let stream = encode_withdraw(&WithdrawParams {
            timelock_blocks: 1008,
        });

        assert_eq!(
            hex::encode(stream.to_bytes()),
            "77000105710008\
             00000000000003f0"
        );
        assert_eq!(
            stream.get(tags::TIMELOCK).unwrap().value(),
            &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xF0]
        );
    }

    #[test]
    fn staking_emits_counts_and_lists() {
        let params = StakingParams {
            timelock_blocks: 64_000,
            finality_providers: vec![key(FINALITY_PROVIDER)],
            covenants: covenants(),
        };
        let stream = encode_staking(&params).unwrap();

        assert_eq!(
            stream.tags(),
            vec![
                tags::ACTION,
                tags::FINALITY_PROVIDER_COUNT,
                tags::FINALITY_PROVIDERS,
                tags::COVENANT_KEY_COUNT,
                tags::COVENANT_KEYS,
                tags::COVENANT_QUORUM,
                tags::TIMELOCK,
            ]
        );
        assert_eq!(stream.get(tags::ACTION).unwrap().value(), &[2]);
        assert_eq!(stream.get(tags::COVENANT_KEY_COUNT).unwrap().value(), &[9]);

        let list = stream.get(tags::COVENANT_KEYS).unwrap().value();
        assert_eq!(list.len(), 9 * 32);
        assert_eq!(hex::encode(&list[..32]), COVENANT_PKS[0]);
        assert_eq!(hex::encode(&list[8 * 32..]), COVENANT_PKS[8]);

        // Count records keep a 2-byte length whose top byte is zero.
        let bytes = stream.to_bytes();
        let count_at = 3 + 1 + 3 + 1 + 3 + 32;
        assert_eq!(&bytes[count_at..count_at + 4], &[0xc0, 0x00, 0x01, 0x09]);
    }

    #[test]
    fn slashing_record_order() {
        let params = SlashingParams {
            timelock_blocks: 64_000,
            finality_providers: vec![key(FINALITY_PROVIDER)],
            covenants: covenants(),
            slashing_pk_script: ScriptBuf::from_bytes(
                hex::decode("00145be12624d08a2b424095d7c07221c33450d14bf1").unwrap(),
            ),
            slashing_fee: Amount::from_sat(2_000),
        };
        let stream = encode_slashing(&params).unwrap();

        assert_eq!(
            &stream.tags()[5..],
            &[
                tags::COVENANT_QUORUM,
                tags::TIMELOCK,
                tags::SLASHING_FEE_LIMIT,
                tags::SLASHING_SCRIPT
            ]
        );
        assert_eq!(stream.get(tags::ACTION).unwrap().value(), &[0]);
        assert_eq!(
            stream.get(tags::SLASHING_FEE_LIMIT).unwrap().value(),
            &2_000u64.to_be_bytes()
        );
        assert_eq!(stream.get(tags::SLASHING_SCRIPT).unwrap().value().len(), 22);
    }

    #[test]
    fn unbonding_without_providers_omits_list() {
        let params = UnbondingParams {
            timelock_blocks: 1008,
            finality_providers: None,
            covenants: covenants(),
            unbonding_fee: Amount::from_sat(1_000),
        };
        let stream = encode_unbonding(&params).unwrap();

        assert_eq!(
            &stream.tags()[..3],
            &[
                tags::ACTION,
                tags::FINALITY_PROVIDER_COUNT,
                tags::COVENANT_KEY_COUNT
            ]
        );
        assert_eq!(
            stream.get(tags::FINALITY_PROVIDER_COUNT).unwrap().value(),
            &[0]
        );
        assert_eq!(
            decode(&stream.to_bytes()).unwrap(),
            StakingActionParams::from(params)
        );
    }

    #[test]
    fn decode_rejects_malformed_streams() {
        let withdraw = encode_withdraw(&WithdrawParams {
            timelock_blocks: 10,
        })
        .to_bytes();

        let mut trailing = withdraw.clone();
        trailing.extend_from_slice(&[0x33, 0x00, 0x00]);
        assert_eq!(decode(&trailing), Err(TlvError::TrailingRecords(1)));

        assert_eq!(
            decode(&withdraw[..4]),
            Err(TlvError::UnexpectedTag {
                expected: tags::TIMELOCK,
                found: None
            })
        );

        assert_eq!(
            decode(&[0x77, 0x00, 0x01, 0x03]),
            Err(TlvError::UnknownAction(3))
        );

        let short_keys = [
            0x77, 0x00, 0x01, 0x02, // stake
            0xf9, 0x00, 0x01, 0x01, // one provider
            0xf8, 0x00, 0x01, 0xaa, // but one byte of key
        ];
        assert_eq!(
            decode(&short_keys),
            Err(TlvError::InvalidKeyLength {
                tag: tags::FINALITY_PROVIDERS,
                count: 1,
                len: 1
            })
        );
    }

    fn arb_key() -> impl Strategy<Value = XOnlyPublicKey> {
        any::<[u8; 32]>().prop_filter_map("x coordinate on the curve", |bytes| {
            XOnlyPublicKey::from_slice(&bytes).ok()
        })
    }

    fn arb_quorum() -> impl Strategy<Value = CovenantQuorum> {
        prop::collection::vec(arb_key(), 1..12).prop_flat_map(|keys| {
            let n = keys.len() as u8;
            (1..=n).prop_map(move |threshold| CovenantQuorum::new(threshold, keys.clone()))
        })
    }

    fn arb_params() -> impl Strategy<Value = StakingActionParams> {
        let timelock = 1u64..=65_535;
        prop_oneof![
            (timelock.clone(), prop::collection::vec(arb_key(), 1..4), arb_quorum()).prop_map(
                |(timelock_blocks, finality_providers, covenants)| {
                    StakingActionParams::from(StakingParams {
                        timelock_blocks,
                        finality_providers,
                        covenants,
                    })
                }
            ),
            (
                timelock.clone(),
                arb_key(),
                arb_quorum(),
                prop::collection::vec(any::<u8>(), 1..64),
                any::<u64>()
            )
                .prop_map(|(timelock_blocks, fp, covenants, script, fee)| {
                    StakingActionParams::from(SlashingParams {
                        timelock_blocks,
                        finality_providers: vec![fp],
                        covenants,
                        slashing_pk_script: ScriptBuf::from_bytes(script),
                        slashing_fee: Amount::from_sat(fee),
                    })
                }),
            (
                timelock.clone(),
                prop::option::of(prop::collection::vec(arb_key(), 1..3)),
                arb_quorum(),
                any::<u64>()
            )
                .prop_map(|(timelock_blocks, finality_providers, covenants, fee)| {
                    StakingActionParams::from(UnbondingParams {
                        timelock_blocks,
                        finality_providers,
                        covenants,
                        unbonding_fee: Amount::from_sat(fee),
                    })
                }),
            timelock.prop_map(|timelock_blocks| {
                StakingActionParams::from(WithdrawParams { timelock_blocks })
            }),
            (
                prop::collection::vec(any::<u8>(), 0..200),
                arb_key(),
                prop::option::of(any::<[u8; 32]>())
            )
                .prop_map(|(message, signer_key, txid)| {
                    StakingActionParams::from(SignMessageParams {
                        message,
                        signer_key,
                        to_spend_txid: txid.map(Txid::from_byte_array),
                    })
                }),
        ]
    }

    proptest! {
        #[test]
        fn roundtrips_valid_params(params in arb_params()) {
            prop_assume!(params.validate(Strictness::Standard).is_ok());

            let stream = encode(&params).unwrap();
            let bytes = stream.to_bytes();

            let declared: usize = stream.records().iter().map(|r| r.value().len() + 3).sum();
            prop_assert_eq!(bytes.len(), declared);
            prop_assert_eq!(decode(&bytes).unwrap(), params);
        }
    }
}
