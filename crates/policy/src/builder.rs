//! Turns staking parameters into a wallet policy the device can sign against.

use bitcoin::{bip32::DerivationPath, Psbt, TapLeafHash, XOnlyPublicKey};
use staking_signer_device_proto::Device;
use staking_signer_params::prelude::{ActionKind, CovenantQuorum, StakingActionParams};
use staking_signer_primitives::{
    keys::KeyOrigin,
    policy::{AddressType, KeyExpression, WalletPolicy},
    script_template::StakingLeaf,
    taproot::{compute_leaf_hash, extract_leaf_script},
};
use tracing::{debug, info, warn};

use crate::{
    config::{AuxiliaryChannel, SignerConfig},
    errors::{PolicyBuildError, PolicyResult, ProtocolMismatch},
    signing::apply_signatures,
    templates::{embedded_policy, tlv_policy},
};

/// Everything needed to build the policy for one action.
#[derive(Debug, Clone)]
pub struct PolicyRequest<'r> {
    /// Parameters of the action.
    pub params: StakingActionParams,

    /// PSBT about to be signed, used to cross-check the leaf script.
    pub psbt: Option<&'r Psbt>,

    /// Leaf hash to embed, overriding the one computed from [`Self::psbt`].
    pub leaf_hash: Option<TapLeafHash>,

    /// Address type of the signing key.
    pub address_type: AddressType,
}

impl<'r> PolicyRequest<'r> {
    /// A taproot request without PSBT.
    pub fn new(params: impl Into<StakingActionParams>) -> Self {
        Self {
            params: params.into(),
            psbt: None,
            leaf_hash: None,
            address_type: AddressType::Taproot,
        }
    }

    /// Attaches the PSBT about to be signed.
    pub fn with_psbt(mut self, psbt: &'r Psbt) -> Self {
        self.psbt = Some(psbt);
        self
    }

    /// Uses `leaf_hash` instead of computing it.
    pub fn with_leaf_hash(mut self, leaf_hash: TapLeafHash) -> Self {
        self.leaf_hash = Some(leaf_hash);
        self
    }

    /// Requests a policy for a key of `address_type`.
    pub fn with_address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = address_type;
        self
    }
}

/// A policy ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPolicy {
    /// The policy to sign against.
    pub policy: WalletPolicy,

    /// The TLV stream the device accepted, if the TLV channel was used.
    pub auxiliary_data: Option<Vec<u8>>,
}

/// Builds wallet policies for a device and signs PSBTs against them.
///
/// All device calls of one [`Self::build_policy`] or [`Self::sign_psbt`] happen in sequence on
/// the same device; running two flows against one device concurrently is not supported.
#[derive(Debug)]
pub struct PolicyBuilder<'a, D> {
    device: &'a D,
    config: SignerConfig,
}

impl<'a, D: Device> PolicyBuilder<'a, D> {
    /// Creates a builder talking to `device`.
    pub const fn new(device: &'a D, config: SignerConfig) -> Self {
        Self { device, config }
    }

    /// The configuration in use.
    pub const fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Builds the policy for `request`.
    ///
    /// Parameters are validated, and checked against the PSBT's leaf script when one is given,
    /// before the device is contacted. With [`AuxiliaryChannel::SendTlv`] the TLV stream is sent
    /// once; a rejection aborts the build and is not retried.
    pub async fn build_policy(&self, request: PolicyRequest<'_>) -> PolicyResult<BuiltPolicy> {
        let PolicyRequest {
            params,
            psbt,
            leaf_hash,
            address_type,
        } = request;
        let kind = params.kind();
        let channel = self.config.auxiliary_channel;

        params.validate(self.config.strictness)?;
        if address_type != AddressType::Taproot && kind != ActionKind::SignMessage {
            return Err(PolicyBuildError::UnsupportedAddressType(address_type));
        }
        debug!(?kind, ?channel, "parameters validated");

        if let Some(psbt) = psbt {
            check_leaf(&params, psbt)?;
            debug!(?kind, "leaf script matches the parameters");
        }

        let embedded_leaf_hash = match (channel, kind) {
            (
                AuxiliaryChannel::EmbedInKeys,
                ActionKind::Slash | ActionKind::Unbond | ActionKind::Withdraw,
            ) => Some(match (leaf_hash, psbt) {
                (Some(leaf_hash), _) => leaf_hash,
                (None, Some(psbt)) => compute_leaf_hash(psbt)?,
                (None, None) => return Err(ProtocolMismatch::NoTaprootScript.into()),
            }),
            _ => None,
        };

        let own_key = self
            .resolve_own_key(&self.config.account_path_for(address_type))
            .await?;

        let network = self.config.key_network();
        let (template, keys, auxiliary_data) = match channel {
            AuxiliaryChannel::SendTlv => {
                let stream = staking_signer_tlv::encode(&params)?;
                let (template, keys) = tlv_policy(&params, own_key, network, address_type)?;
                (template, keys, Some(stream.to_bytes()))
            }
            AuxiliaryChannel::EmbedInKeys => {
                let (template, keys) = embedded_policy(
                    &params,
                    own_key,
                    network,
                    address_type,
                    embedded_leaf_hash,
                    self.config.display_leaf_hash,
                )?;
                (template, keys, None)
            }
        };
        let policy = WalletPolicy::new(kind.policy_name(), &template, keys)?;

        if let Some(data) = &auxiliary_data {
            self.device.send_auxiliary_data(data).await.map_err(|e| {
                warn!(?kind, %e, "device rejected auxiliary data");
                PolicyBuildError::AuxiliaryDataRejected(e)
            })?;
            debug!(len = data.len(), "auxiliary data accepted");
        }

        info!(
            ?kind,
            template = policy.descriptor_template(),
            keys = policy.keys().len(),
            "policy built"
        );

        Ok(BuiltPolicy {
            policy,
            auxiliary_data,
        })
    }

    /// Resolves `[fingerprint/path]xpub` for the device's account at `path`.
    pub async fn resolve_own_key(&self, path: &DerivationPath) -> PolicyResult<KeyExpression> {
        let fingerprint = self
            .device
            .master_fingerprint()
            .await
            .map_err(PolicyBuildError::DeviceRejected)?;
        let xpub = self
            .device
            .extended_pubkey(path)
            .await
            .map_err(PolicyBuildError::DeviceRejected)?;

        debug!(%fingerprint, %path, "resolved key origin");

        Ok(KeyExpression::new(
            Some(KeyOrigin::new(fingerprint, path.clone())),
            xpub.to_string(),
        ))
    }

    /// Has the device sign `psbt` against `policy` and merges the signatures into it.
    ///
    /// Returns the number of signatures merged. The PSBT is left untouched on error.
    pub async fn sign_psbt(&self, psbt: &mut Psbt, policy: &WalletPolicy) -> PolicyResult<usize> {
        let signatures = self
            .device
            .sign_transaction(psbt, policy)
            .await
            .map_err(|e| {
                warn!(policy = policy.name(), %e, "device refused to sign");
                PolicyBuildError::DeviceRejected(e)
            })?;

        let merged = apply_signatures(psbt, &signatures)?;
        info!(policy = policy.name(), %merged, "merged signatures");

        Ok(merged)
    }
}

/// Checks that the PSBT's leaf script is the leaf the action spends, with the same values.
///
/// Staking spends by key path and messages have no leaf, so neither is checked.
fn check_leaf(params: &StakingActionParams, psbt: &Psbt) -> Result<(), ProtocolMismatch> {
    let expected = match params {
        StakingActionParams::Slashing(_) => "slashing",
        StakingActionParams::Unbonding(_) => "unbonding",
        StakingActionParams::Withdraw(_) => "timelock",
        StakingActionParams::Staking(_) | StakingActionParams::SignMessage(_) => return Ok(()),
    };

    let script = extract_leaf_script(psbt).ok_or(ProtocolMismatch::NoTaprootScript)?;
    let leaf = StakingLeaf::parse(&script).ok_or(ProtocolMismatch::UnexpectedLeaf { expected })?;

    match (params, leaf) {
        (StakingActionParams::Withdraw(p), StakingLeaf::Timelock { blocks, .. }) => {
            if u64::from(blocks) != p.timelock_blocks {
                return Err(ProtocolMismatch::TimelockMismatch {
                    leaf: u64::from(blocks),
                    params: p.timelock_blocks,
                });
            }
            Ok(())
        }
        (
            StakingActionParams::Unbonding(p),
            StakingLeaf::Unbonding {
                covenants,
                threshold,
                ..
            },
        ) => check_covenants(&p.covenants, covenants, threshold),
        (
            StakingActionParams::Slashing(p),
            StakingLeaf::Slashing {
                finality_provider,
                covenants,
                threshold,
                ..
            },
        ) => {
            if !p.finality_providers.contains(&finality_provider) {
                return Err(ProtocolMismatch::LeafParams {
                    field: "finality provider",
                });
            }
            check_covenants(&p.covenants, covenants, threshold)
        }
        _ => Err(ProtocolMismatch::UnexpectedLeaf { expected }),
    }
}

fn check_covenants(
    quorum: &CovenantQuorum,
    mut leaf_keys: Vec<XOnlyPublicKey>,
    leaf_threshold: u32,
) -> Result<(), ProtocolMismatch> {
    leaf_keys.sort_by_key(|key| key.serialize());

    if quorum.sorted_keys() != leaf_keys {
        return Err(ProtocolMismatch::LeafParams {
            field: "covenant keys",
        });
    }
    if u32::from(quorum.threshold) != leaf_threshold {
        return Err(ProtocolMismatch::LeafParams {
            field: "covenant quorum",
        });
    }

    Ok(())
}
