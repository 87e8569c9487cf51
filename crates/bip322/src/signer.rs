//! Message signing with a device.

use bitcoin::{
    bip32::{ChildNumber, DerivationPath, Fingerprint},
    psbt::Input,
    secp256k1::SECP256K1,
    CompressedPublicKey, NetworkKind, ScriptBuf, Witness,
};
use staking_signer_device_proto::{Device, PartialSignature};
use staking_signer_params::prelude::SignMessageParams;
use staking_signer_policy::{
    signing::merge_signature, PolicyBuilder, PolicyRequest, SignerConfig,
};
use staking_signer_primitives::{policy::AddressType, taproot::finalize_input};
use tracing::{debug, info};

use crate::{
    errors::{MessageSignError, MessageSignResult},
    virtual_tx::{encode_witness, VirtualTransactionPair},
};

/// Scheme a [`SignedMessage`] was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSigningProtocol {
    /// Legacy "Bitcoin Signed Message" compact signature.
    Ecdsa,

    /// BIP322 simple signature: the witness of the `to_sign` input.
    Bip322,
}

/// A base64 encoded message signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// The signature.
    pub signature: String,

    /// How [`Self::signature`] was produced.
    pub protocol: MessageSigningProtocol,
}

/// Signs messages with the first receive key of the device's account.
#[derive(Debug)]
pub struct MessageSigner<'a, D> {
    device: &'a D,
    config: SignerConfig,
}

impl<'a, D: Device> MessageSigner<'a, D> {
    /// Creates a signer talking to `device`.
    pub const fn new(device: &'a D, config: SignerConfig) -> Self {
        Self { device, config }
    }

    /// Signs `message` as a BIP322 simple signature for the configured address type.
    pub async fn sign_bip322(&self, message: &str) -> MessageSignResult<SignedMessage> {
        let address_type = self.config.message_address_type;
        let path = receive_path(&self.config.account_path_for(address_type));

        let fingerprint = self.device.master_fingerprint().await?;
        let xpub = self.device.extended_pubkey(&path).await?;
        let expected = NetworkKind::from(self.config.network);
        if xpub.network != expected {
            return Err(MessageSignError::InvalidSpendScript(format!(
                "key at {path} is for {:?}, expected {expected:?}",
                xpub.network
            )));
        }

        let pubkey = xpub.public_key;
        let (signer_key, _) = pubkey.x_only_public_key();
        let script_pubkey = match address_type {
            AddressType::Taproot => ScriptBuf::new_p2tr(SECP256K1, signer_key, None),
            AddressType::NativeSegwit => {
                ScriptBuf::new_p2wpkh(&CompressedPublicKey(pubkey).wpubkey_hash())
            }
        };

        let mut pair = VirtualTransactionPair::new(message.as_bytes(), script_pubkey)?;
        let to_spend_txid = pair.to_spend_txid();
        add_key_source(
            &mut pair.to_sign.inputs[0],
            address_type,
            fingerprint,
            path,
            &xpub.public_key,
        );
        info!(?address_type, %to_spend_txid, "signing message with bip322");

        let builder = PolicyBuilder::new(self.device, self.config.clone());
        let built = builder
            .build_policy(
                PolicyRequest::new(SignMessageParams {
                    message: message.as_bytes().to_vec(),
                    signer_key,
                    to_spend_txid: Some(to_spend_txid),
                })
                .with_address_type(address_type),
            )
            .await?;

        let signatures = self
            .device
            .sign_transaction(&pair.to_sign, &built.policy)
            .await?;
        let [(_, signature)] = signatures.as_slice() else {
            return Err(MessageSignError::SignatureCountMismatch(signatures.len()));
        };

        let signature = finalize_signature(&mut pair.to_sign.inputs[0], signature)?;
        debug!(%to_spend_txid, "message signed");

        Ok(SignedMessage {
            signature,
            protocol: MessageSigningProtocol::Bip322,
        })
    }

    /// Signs `message` with the legacy scheme.
    ///
    /// Uses the key at `path`, or the taproot account's first receive key when none is given.
    /// No transaction is involved.
    pub async fn sign_message_ecdsa(
        &self,
        message: &str,
        path: Option<&DerivationPath>,
    ) -> MessageSignResult<SignedMessage> {
        let path = match path {
            Some(path) => path.clone(),
            None => receive_path(&self.config.account_path_for(AddressType::Taproot)),
        };
        info!(%path, "signing message with ecdsa");

        let signature = self.device.sign_message(message, &path).await?;

        Ok(SignedMessage {
            signature,
            protocol: MessageSigningProtocol::Ecdsa,
        })
    }
}

/// `account/0/0`.
fn receive_path(account: &DerivationPath) -> DerivationPath {
    account.extend([
        ChildNumber::Normal { index: 0 },
        ChildNumber::Normal { index: 0 },
    ])
}

fn add_key_source(
    input: &mut Input,
    address_type: AddressType,
    fingerprint: Fingerprint,
    path: DerivationPath,
    pubkey: &bitcoin::secp256k1::PublicKey,
) {
    match address_type {
        AddressType::Taproot => {
            let (internal_key, _) = pubkey.x_only_public_key();
            input.tap_internal_key = Some(internal_key);
            input
                .tap_key_origins
                .insert(internal_key, (Vec::new(), (fingerprint, path)));
        }
        AddressType::NativeSegwit => {
            input.bip32_derivation.insert(*pubkey, (fingerprint, path));
        }
    }
}

/// Merges `signature` into the `to_sign` input, finalizes it and encodes its witness.
pub(crate) fn finalize_signature(
    input: &mut Input,
    signature: &PartialSignature,
) -> MessageSignResult<String> {
    let stack = match signature {
        PartialSignature::TaprootKey { .. } => vec![signature.to_witness_bytes()],
        PartialSignature::Ecdsa { pubkey, .. } => {
            vec![signature.to_witness_bytes(), pubkey.to_bytes()]
        }
        PartialSignature::TaprootScript { .. } => {
            return Err(MessageSignError::UnexpectedScriptPath)
        }
    };

    merge_signature(input, signature);
    finalize_input(input, &stack);

    Ok(encode_witness(&Witness::from_slice(&stack)))
}
