//! Parameter sets for each staking action.

use std::collections::HashSet;

use bitcoin::{Amount, ScriptBuf, Txid, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Size of an x-only public key.
pub const X_ONLY_KEY_LEN: usize = 32;

/// Largest relative timelock expressible in blocks.
///
/// BIP68 keeps the block count of a relative lock time in the low 16 bits of `nSequence`, so
/// `OP_CHECKSEQUENCEVERIFY` cannot enforce more than `u16::MAX` blocks.
pub const MAX_TIMELOCK_BLOCKS: u64 = u16::MAX as u64;

/// Largest variable-length value a TLV record can carry.
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// How strictly parameter sets are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// At least one covenant key, any number of finality providers where lists are allowed.
    #[default]
    Standard,

    /// At least two covenant keys and a single finality provider everywhere.
    Strict,
}

impl Strictness {
    /// Minimum covenant committee size.
    pub const fn min_covenant_keys(self) -> usize {
        match self {
            Strictness::Standard => 1,
            Strictness::Strict => 2,
        }
    }
}

/// The protocol action a parameter set belongs to.
///
/// The discriminant is the action code the device expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActionKind {
    /// Pre-signing the slashing transaction.
    Slash = 0,
    /// Signing the unbonding transaction.
    Unbond = 1,
    /// Signing the staking transaction.
    Stake = 2,
    /// Spending the timelock path.
    Withdraw = 5,
    /// Signing a message.
    SignMessage = 6,
}

impl ActionKind {
    /// Action code on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Looks up an action from its wire code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ActionKind::Slash),
            1 => Some(ActionKind::Unbond),
            2 => Some(ActionKind::Stake),
            5 => Some(ActionKind::Withdraw),
            6 => Some(ActionKind::SignMessage),
            _ => None,
        }
    }

    /// Name of the wallet policy registered for this action.
    pub const fn policy_name(self) -> &'static str {
        match self {
            ActionKind::Slash => "Consent to slashing",
            ActionKind::Unbond => "Unbonding",
            ActionKind::Stake => "Staking transaction",
            ActionKind::Withdraw => "Withdraw",
            ActionKind::SignMessage => "Sign message",
        }
    }
}

/// The covenant committee and the number of its signatures a transition needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CovenantQuorum {
    /// Required signatures.
    pub threshold: u8,

    /// Committee keys, in the order the caller supplied them.
    pub keys: Vec<XOnlyPublicKey>,
}

impl CovenantQuorum {
    /// Creates a quorum without validating it.
    pub const fn new(threshold: u8, keys: Vec<XOnlyPublicKey>) -> Self {
        Self { threshold, keys }
    }

    /// Committee keys sorted bytewise.
    pub fn sorted_keys(&self) -> Vec<XOnlyPublicKey> {
        let mut keys = self.keys.clone();
        keys.sort_by_key(|key| key.serialize());
        keys
    }

    fn validate(&self, strictness: Strictness) -> Result<(), ValidationError> {
        let n = self.keys.len();
        check_count("covenant_pks", n)?;

        let min = strictness.min_covenant_keys();
        if n < min {
            return Err(ValidationError::TooFewCovenantKeys { got: n, min });
        }

        if self.threshold == 0 || usize::from(self.threshold) > n {
            return Err(ValidationError::ThresholdOutOfRange {
                threshold: self.threshold,
                keys: n,
            });
        }

        let mut seen = HashSet::with_capacity(n);
        if let Some(dup) = self.keys.iter().find(|key| !seen.insert(**key)) {
            return Err(ValidationError::DuplicateCovenantKey(*dup));
        }

        Ok(())
    }
}

/// Parameters of the staking transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingParams {
    /// Relative timelock of the staking output's timelock path.
    pub timelock_blocks: u64,

    /// Finality providers the stake is delegated to.
    pub finality_providers: Vec<XOnlyPublicKey>,

    /// Covenant committee.
    pub covenants: CovenantQuorum,
}

/// Parameters of a slashing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Relative timelock of the output being slashed.
    pub timelock_blocks: u64,

    /// The single finality provider whose misbehavior triggers slashing.
    pub finality_providers: Vec<XOnlyPublicKey>,

    /// Covenant committee.
    pub covenants: CovenantQuorum,

    /// Output script receiving the slashed amount.
    pub slashing_pk_script: ScriptBuf,

    /// Maximum fee the slashing transaction may pay.
    pub slashing_fee: Amount,
}

/// Parameters of the unbonding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingParams {
    /// Relative timelock of the unbonding output.
    pub timelock_blocks: u64,

    /// Finality providers, when the device should show them.
    #[serde(default)]
    pub finality_providers: Option<Vec<XOnlyPublicKey>>,

    /// Covenant committee.
    pub covenants: CovenantQuorum,

    /// Maximum fee the unbonding transaction may pay.
    pub unbonding_fee: Amount,
}

/// Parameters of a timelock-path withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawParams {
    /// Relative timelock guarding the path.
    pub timelock_blocks: u64,
}

/// Parameters of a message signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMessageParams {
    /// The message, as signed.
    #[serde(with = "hex::serde")]
    pub message: Vec<u8>,

    /// Key the signature is made with.
    pub signer_key: XOnlyPublicKey,

    /// Id of the BIP322 `to_spend` transaction, when signing through virtual transactions.
    #[serde(default)]
    pub to_spend_txid: Option<Txid>,
}

/// Parameters for one protocol action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StakingActionParams {
    /// See [`StakingParams`].
    Staking(StakingParams),
    /// See [`SlashingParams`].
    Slashing(SlashingParams),
    /// See [`UnbondingParams`].
    Unbonding(UnbondingParams),
    /// See [`WithdrawParams`].
    Withdraw(WithdrawParams),
    /// See [`SignMessageParams`].
    SignMessage(SignMessageParams),
}

impl StakingActionParams {
    /// The action these parameters belong to.
    pub const fn kind(&self) -> ActionKind {
        match self {
            StakingActionParams::Staking(_) => ActionKind::Stake,
            StakingActionParams::Slashing(_) => ActionKind::Slash,
            StakingActionParams::Unbonding(_) => ActionKind::Unbond,
            StakingActionParams::Withdraw(_) => ActionKind::Withdraw,
            StakingActionParams::SignMessage(_) => ActionKind::SignMessage,
        }
    }

    /// Relative timelock carried by the action, if it has one.
    pub const fn timelock_blocks(&self) -> Option<u64> {
        match self {
            StakingActionParams::Staking(p) => Some(p.timelock_blocks),
            StakingActionParams::Slashing(p) => Some(p.timelock_blocks),
            StakingActionParams::Unbonding(p) => Some(p.timelock_blocks),
            StakingActionParams::Withdraw(p) => Some(p.timelock_blocks),
            StakingActionParams::SignMessage(_) => None,
        }
    }

    /// Checks every rule the parameter set must satisfy.
    ///
    /// # Errors
    ///
    /// The first violated rule, naming the offending field.
    pub fn validate(&self, strictness: Strictness) -> Result<(), ValidationError> {
        if let Some(blocks) = self.timelock_blocks() {
            check_timelock(blocks)?;
        }

        match self {
            StakingActionParams::Staking(p) => {
                let expected = match strictness {
                    Strictness::Standard => FpRule::AtLeastOne,
                    Strictness::Strict => FpRule::ExactlyOne,
                };
                check_finality_providers(&p.finality_providers, expected)?;
                p.covenants.validate(strictness)
            }
            StakingActionParams::Slashing(p) => {
                check_finality_providers(&p.finality_providers, FpRule::ExactlyOne)?;
                p.covenants.validate(strictness)?;
                if p.slashing_pk_script.is_empty() {
                    return Err(ValidationError::EmptySlashingScript);
                }
                check_value_len("slashing_pk_script", p.slashing_pk_script.len())
            }
            StakingActionParams::Unbonding(p) => {
                if let Some(fps) = &p.finality_providers {
                    let expected = match strictness {
                        Strictness::Standard => FpRule::AtLeastOne,
                        Strictness::Strict => FpRule::ExactlyOne,
                    };
                    check_finality_providers(fps, expected)?;
                }
                p.covenants.validate(strictness)
            }
            StakingActionParams::Withdraw(_) => Ok(()),
            StakingActionParams::SignMessage(p) => check_value_len("message", p.message.len()),
        }
    }
}

impl From<StakingParams> for StakingActionParams {
    fn from(params: StakingParams) -> Self {
        StakingActionParams::Staking(params)
    }
}

impl From<SlashingParams> for StakingActionParams {
    fn from(params: SlashingParams) -> Self {
        StakingActionParams::Slashing(params)
    }
}

impl From<UnbondingParams> for StakingActionParams {
    fn from(params: UnbondingParams) -> Self {
        StakingActionParams::Unbonding(params)
    }
}

impl From<WithdrawParams> for StakingActionParams {
    fn from(params: WithdrawParams) -> Self {
        StakingActionParams::Withdraw(params)
    }
}

impl From<SignMessageParams> for StakingActionParams {
    fn from(params: SignMessageParams) -> Self {
        StakingActionParams::SignMessage(params)
    }
}

/// Parses raw public keys, checking that each is a 32-byte x-only key.
///
/// # Errors
///
/// [`ValidationError::InvalidKeyLength`] or [`ValidationError::InvalidKey`] for the first
/// offending entry.
pub fn parse_x_only_keys<K: AsRef<[u8]>>(
    field: &'static str,
    raw: &[K],
) -> Result<Vec<XOnlyPublicKey>, ValidationError> {
    raw.iter()
        .map(|key| {
            let key = key.as_ref();
            if key.len() != X_ONLY_KEY_LEN {
                return Err(ValidationError::InvalidKeyLength {
                    field,
                    len: key.len(),
                });
            }
            XOnlyPublicKey::from_slice(key).map_err(|_| ValidationError::InvalidKey {
                field,
                value: hex::encode(key),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum FpRule {
    AtLeastOne,
    ExactlyOne,
}

fn check_finality_providers(fps: &[XOnlyPublicKey], rule: FpRule) -> Result<(), ValidationError> {
    check_count("finality_providers", fps.len())?;

    match rule {
        FpRule::AtLeastOne if fps.is_empty() => Err(ValidationError::FinalityProviderCount {
            got: 0,
            expected: "at least one key",
        }),
        FpRule::ExactlyOne if fps.len() != 1 => Err(ValidationError::FinalityProviderCount {
            got: fps.len(),
            expected: "exactly one key",
        }),
        _ => Ok(()),
    }
}

fn check_count(field: &'static str, count: usize) -> Result<(), ValidationError> {
    if count > u8::MAX as usize {
        return Err(ValidationError::TooManyKeys { field, count });
    }
    Ok(())
}

fn check_value_len(field: &'static str, len: usize) -> Result<(), ValidationError> {
    if len > MAX_VALUE_LEN {
        return Err(ValidationError::ValueTooLong { field, len });
    }
    Ok(())
}

/// A timelock must be non-zero and fit the 16-bit block count of a BIP68 relative lock time.
///
/// Larger values would be truncated by the sequence encoding and unlock far earlier than asked.
fn check_timelock(blocks: u64) -> Result<(), ValidationError> {
    if blocks == 0 || blocks > MAX_TIMELOCK_BLOCKS {
        return Err(ValidationError::TimelockOutOfRange(blocks));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

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

    fn staking() -> StakingParams {
        StakingParams {
            timelock_blocks: 64_000,
            finality_providers: vec![key(FINALITY_PROVIDER)],
            covenants: CovenantQuorum::new(6, COVENANT_PKS.into_iter().map(key).collect()),
        }
    }

    #[test]
    fn accepts_valid_staking() {
        let params = StakingActionParams::from(staking());
        assert_eq!(params.validate(Strictness::Standard), Ok(()));
        assert_eq!(params.validate(Strictness::Strict), Ok(()));
    }

    #[test]
    fn threshold_must_be_within_committee() {
        let mut p = staking();
        p.covenants.threshold = 10;
        assert_eq!(
            StakingActionParams::from(p.clone()).validate(Strictness::Standard),
            Err(ValidationError::ThresholdOutOfRange {
                threshold: 10,
                keys: 9
            })
        );

        p.covenants.threshold = 0;
        assert!(matches!(
            StakingActionParams::from(p).validate(Strictness::Standard),
            Err(ValidationError::ThresholdOutOfRange { threshold: 0, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_covenant_keys() {
        let mut p = staking();
        p.covenants.keys[8] = p.covenants.keys[3];
        assert_eq!(
            StakingActionParams::from(p).validate(Strictness::Standard),
            Err(ValidationError::DuplicateCovenantKey(key(COVENANT_PKS[3])))
        );
    }

    #[test]
    fn strictness_changes_minimums() {
        let mut p = staking();
        p.covenants = CovenantQuorum::new(1, vec![key(COVENANT_PKS[0])]);
        p.finality_providers.push(key(COVENANT_PKS[1]));
        let params = StakingActionParams::from(p);

        assert_eq!(params.validate(Strictness::Standard), Ok(()));
        assert!(matches!(
            params.validate(Strictness::Strict),
            Err(ValidationError::FinalityProviderCount { got: 2, .. })
        ));
    }

    #[test]
    fn slashing_requires_single_provider_and_script() {
        let base = staking();
        let mut slashing = SlashingParams {
            timelock_blocks: base.timelock_blocks,
            finality_providers: vec![],
            covenants: base.covenants,
            slashing_pk_script: ScriptBuf::new(),
            slashing_fee: Amount::from_sat(2_000),
        };

        assert!(matches!(
            StakingActionParams::from(slashing.clone()).validate(Strictness::Standard),
            Err(ValidationError::FinalityProviderCount { got: 0, .. })
        ));

        slashing.finality_providers = base.finality_providers;
        assert_eq!(
            StakingActionParams::from(slashing).validate(Strictness::Standard),
            Err(ValidationError::EmptySlashingScript)
        );
    }

    #[test]
    fn unbonding_providers_are_optional_but_not_empty() {
        let base = staking();
        let mut unbonding = UnbondingParams {
            timelock_blocks: 1008,
            finality_providers: None,
            covenants: base.covenants,
            unbonding_fee: Amount::from_sat(1_000),
        };
        assert_eq!(
            StakingActionParams::from(unbonding.clone()).validate(Strictness::Strict),
            Ok(())
        );

        unbonding.finality_providers = Some(vec![]);
        assert!(matches!(
            StakingActionParams::from(unbonding).validate(Strictness::Standard),
            Err(ValidationError::FinalityProviderCount { got: 0, .. })
        ));
    }

    #[test]
    fn timelock_bounds() {
        for blocks in [0, MAX_TIMELOCK_BLOCKS + 1] {
            assert_eq!(
                StakingActionParams::Withdraw(WithdrawParams {
                    timelock_blocks: blocks
                })
                .validate(Strictness::Standard),
                Err(ValidationError::TimelockOutOfRange(blocks))
            );
        }

        for blocks in [1, 1008, MAX_TIMELOCK_BLOCKS] {
            assert_eq!(
                StakingActionParams::Withdraw(WithdrawParams {
                    timelock_blocks: blocks
                })
                .validate(Strictness::Standard),
                Ok(())
            );
        }
    }

    #[test]
    fn parses_raw_keys() {
        let raw = vec![hex::decode(COVENANT_PKS[0]).unwrap(), vec![0x02; 33]];
        assert_eq!(
            parse_x_only_keys("covenant_pks", &raw),
            Err(ValidationError::InvalidKeyLength {
                field: "covenant_pks",
                len: 33
            })
        );

        let keys = parse_x_only_keys("covenant_pks", &raw[..1]).unwrap();
        assert_eq!(keys, vec![key(COVENANT_PKS[0])]);
    }

    #[test]
    fn sorted_keys_are_bytewise() {
        let mut p = staking();
        p.covenants.keys.reverse();
        let sorted = p.covenants.sorted_keys();
        assert_eq!(sorted, COVENANT_PKS.into_iter().map(key).collect::<Vec<_>>());
    }

    #[test]
    fn action_codes_roundtrip() {
        for kind in [
            ActionKind::Slash,
            ActionKind::Unbond,
            ActionKind::Stake,
            ActionKind::Withdraw,
            ActionKind::SignMessage,
        ] {
            assert_eq!(ActionKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ActionKind::from_code(3), None);
    }

    #[test]
    fn params_serde_toml() {
        let params = r#"
            action = "unbonding"
            timelock_blocks = 1008
            unbonding_fee = 1000

            [covenants]
            threshold = 1
            keys = ["0aee0509b16db71c999238a4827db945526859b13c95487ab46725357c9a9f25"]
        "#;

        let parsed = toml::from_str::<StakingActionParams>(params);
        assert!(
            parsed.is_ok(),
            "must be able to deserialize params from toml but got: {}",
            parsed.unwrap_err()
        );

        let parsed = parsed.unwrap();
        assert_eq!(parsed.kind(), ActionKind::Unbond);
        assert_eq!(parsed.validate(Strictness::Standard), Ok(()));
    }
}
