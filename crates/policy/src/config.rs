//! Signer configuration.

use std::{fs, path::Path};

use bitcoin::{
    bip32::{ChildNumber, DerivationPath},
    Network,
};
use serde::{Deserialize, Serialize};
use staking_signer_params::prelude::Strictness;
use staking_signer_primitives::{keys::KeyNetwork, policy::AddressType};

use crate::errors::ConfigError;

/// How protocol parameters the descriptor cannot express reach the device.
///
/// The two are mutually exclusive per firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryChannel {
    /// A TLV stream sent ahead of the policy.
    #[default]
    SendTlv,

    /// Synthetic keys tagged with magic fingerprints inside the policy's key list.
    ///
    /// Only older firmware needs this.
    EmbedInKeys,
}

/// The configuration values that dictate how policies are built for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Network the device's keys belong to.
    pub network: Network,

    /// Taproot account, defaults to `m/86'/coin'/0'`.
    #[serde(default)]
    pub account_path: Option<DerivationPath>,

    /// Native segwit account, defaults to `m/84'/coin'/0'`.
    #[serde(default)]
    pub segwit_account_path: Option<DerivationPath>,

    /// Channel for the protocol parameters.
    #[serde(default)]
    pub auxiliary_channel: AuxiliaryChannel,

    /// How strictly parameters are validated.
    #[serde(default)]
    pub strictness: Strictness,

    /// Whether the device shows embedded leaf hashes to the user or only checks them.
    #[serde(default = "default_display_leaf_hash")]
    pub display_leaf_hash: bool,

    /// Address type message signatures are made for.
    #[serde(default)]
    pub message_address_type: AddressType,
}

const fn default_display_leaf_hash() -> bool {
    true
}

impl SignerConfig {
    /// Defaults for `network`.
    pub const fn new(network: Network) -> Self {
        Self {
            network,
            account_path: None,
            segwit_account_path: None,
            auxiliary_channel: AuxiliaryChannel::SendTlv,
            strictness: Strictness::Standard,
            display_leaf_hash: true,
            message_address_type: AddressType::Taproot,
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Network tag of extended keys built for this signer.
    pub fn key_network(&self) -> KeyNetwork {
        KeyNetwork::from(self.network)
    }

    /// Account path for keys of `address_type`.
    pub fn account_path_for(&self, address_type: AddressType) -> DerivationPath {
        let (configured, purpose) = match address_type {
            AddressType::Taproot => (&self.account_path, 86),
            AddressType::NativeSegwit => (&self.segwit_account_path, 84),
        };

        configured.clone().unwrap_or_else(|| {
            DerivationPath::from(vec![
                ChildNumber::Hardened { index: purpose },
                ChildNumber::Hardened {
                    index: self.key_network().coin_type(),
                },
                ChildNumber::Hardened { index: 0 },
            ])
        })
    }
}
