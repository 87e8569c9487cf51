//! A software [`Device`] backed by an in-memory BIP32 master key.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bitcoin::{
    bip32::{ChildNumber, DerivationPath, Fingerprint, Xpriv, Xpub},
    ecdsa,
    hashes::Hash,
    key::TapTweak,
    psbt::Input,
    script::Instruction,
    secp256k1::{Keypair, Message},
    sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType},
    sign_message::{signed_msg_hash, MessageSignature},
    taproot::{self, TapLeafHash},
    CompressedPublicKey, Network, Psbt, PublicKey, Script, ScriptBuf, TxOut, XOnlyPublicKey,
};
use parking_lot::Mutex;
use secp256k1::SECP256K1;
use staking_signer_device_proto::{Device, DeviceError, DeviceResult, PartialSignature};
use staking_signer_primitives::{keys::OriginFingerprint, policy::WalletPolicy};
use tracing::debug;

use crate::fixtures::test_seed;

/// Status word the device answers with when the user declines.
pub const STATUS_DENIED: u16 = 0x6985;

/// A deterministic signing device for tests.
///
/// Signs with real keys derived from its seed, so signatures verify. Every call is counted, and
/// auxiliary data and signing policies are recorded, which lets tests assert exactly what
/// reached the device.
#[derive(Debug)]
pub struct SoftwareDevice {
    master: Xpriv,
    auxiliary_data: Mutex<Vec<Vec<u8>>>,
    policies: Mutex<Vec<WalletPolicy>>,
    calls: CallCounters,
    reject_auxiliary_data: AtomicBool,
    reject_signing: AtomicBool,
}

#[derive(Debug, Default)]
struct CallCounters {
    master_fingerprint: AtomicUsize,
    extended_pubkey: AtomicUsize,
    send_auxiliary_data: AtomicUsize,
    sign_transaction: AtomicUsize,
    sign_message: AtomicUsize,
}

/// Snapshot of how often each device method was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// [`Device::master_fingerprint`] calls.
    pub master_fingerprint: usize,
    /// [`Device::extended_pubkey`] calls.
    pub extended_pubkey: usize,
    /// [`Device::send_auxiliary_data`] calls.
    pub send_auxiliary_data: usize,
    /// [`Device::sign_transaction`] calls.
    pub sign_transaction: usize,
    /// [`Device::sign_message`] calls.
    pub sign_message: usize,
}

impl CallCounts {
    /// Calls of any kind.
    pub const fn total(&self) -> usize {
        self.master_fingerprint
            + self.extended_pubkey
            + self.send_auxiliary_data
            + self.sign_transaction
            + self.sign_message
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    /// A testnet device seeded with [`test_seed`], master fingerprint `f5acc2fd`.
    pub fn new() -> Self {
        Self::from_seed(&test_seed(), Network::Testnet)
    }

    /// A device holding the master key of `seed`.
    pub fn from_seed(seed: &[u8], network: Network) -> Self {
        let master = Xpriv::new_master(network, seed).expect("seed must be 16 to 64 bytes");
        Self {
            master,
            auxiliary_data: Mutex::new(Vec::new()),
            policies: Mutex::new(Vec::new()),
            calls: CallCounters::default(),
            reject_auxiliary_data: AtomicBool::new(false),
            reject_signing: AtomicBool::new(false),
        }
    }

    /// Master key fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.master.fingerprint(SECP256K1)
    }

    /// Private key at `path`.
    pub fn derive_priv(&self, path: &DerivationPath) -> Xpriv {
        self.master
            .derive_priv(SECP256K1, path)
            .expect("derivation from a master key must succeed")
    }

    /// Key pair at `path`.
    pub fn keypair(&self, path: &DerivationPath) -> Keypair {
        self.derive_priv(path).to_keypair(SECP256K1)
    }

    /// X-only public key at `path`.
    pub fn x_only_public_key(&self, path: &DerivationPath) -> XOnlyPublicKey {
        self.keypair(path).x_only_public_key().0
    }

    /// Compressed public key at `path`.
    pub fn public_key(&self, path: &DerivationPath) -> PublicKey {
        PublicKey::new(self.derive_priv(path).private_key.public_key(SECP256K1))
    }

    /// Makes every following [`Device::send_auxiliary_data`] fail, or succeed again.
    pub fn set_reject_auxiliary_data(&self, reject: bool) {
        self.reject_auxiliary_data.store(reject, Ordering::SeqCst);
    }

    /// Makes every following [`Device::sign_transaction`] fail, or succeed again.
    pub fn set_reject_signing(&self, reject: bool) {
        self.reject_signing.store(reject, Ordering::SeqCst);
    }

    /// Auxiliary data received so far, oldest first.
    pub fn auxiliary_data(&self) -> Vec<Vec<u8>> {
        self.auxiliary_data.lock().clone()
    }

    /// Policies passed to [`Device::sign_transaction`] so far, oldest first.
    pub fn policies(&self) -> Vec<WalletPolicy> {
        self.policies.lock().clone()
    }

    /// Call counts so far.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            master_fingerprint: self.calls.master_fingerprint.load(Ordering::SeqCst),
            extended_pubkey: self.calls.extended_pubkey.load(Ordering::SeqCst),
            send_auxiliary_data: self.calls.send_auxiliary_data.load(Ordering::SeqCst),
            sign_transaction: self.calls.sign_transaction.load(Ordering::SeqCst),
            sign_message: self.calls.sign_message.load(Ordering::SeqCst),
        }
    }

    fn sign_psbt(
        &self,
        psbt: &Psbt,
        policy: &WalletPolicy,
    ) -> DeviceResult<Vec<(usize, PartialSignature)>> {
        let policy_path = self.policy_key_path(policy)?;

        let prevouts = psbt
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                input.witness_utxo.clone().ok_or_else(|| {
                    DeviceError::Signing(format!("input {index} has no witness utxo"))
                })
            })
            .collect::<DeviceResult<Vec<TxOut>>>()?;

        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let mut signatures = Vec::new();

        for (index, input) in psbt.inputs.iter().enumerate() {
            let Some(path) = self.input_key_path(input).or_else(|| policy_path.clone()) else {
                continue;
            };

            let xpriv = self.derive_priv(&path);
            if let Some(signature) = sign_input(&mut cache, &prevouts, index, input, &xpriv)? {
                debug!(%index, %path, "signed input");
                signatures.push((index, signature));
            }
        }

        Ok(signatures)
    }

    /// First receive key of the policy key that originates from this device.
    fn policy_key_path(&self, policy: &WalletPolicy) -> DeviceResult<Option<DerivationPath>> {
        let ours = OriginFingerprint::Master(self.fingerprint());
        let keys = policy
            .key_expressions()
            .map_err(|e| DeviceError::Signing(e.to_string()))?;

        Ok(keys
            .into_iter()
            .filter_map(|key| key.origin)
            .find(|origin| origin.fingerprint() == ours)
            .map(|origin| {
                origin
                    .path()
                    .child(ChildNumber::Normal { index: 0 })
                    .child(ChildNumber::Normal { index: 0 })
            }))
    }

    /// Path from the input's own derivation metadata, if it names this device.
    fn input_key_path(&self, input: &Input) -> Option<DerivationPath> {
        let fingerprint = self.fingerprint();

        input
            .tap_key_origins
            .values()
            .map(|(_, source)| source)
            .chain(input.bip32_derivation.values())
            .find(|(fp, _)| *fp == fingerprint)
            .map(|(_, path)| path.clone())
    }
}

fn sign_input(
    cache: &mut SighashCache<&bitcoin::Transaction>,
    prevouts: &[TxOut],
    index: usize,
    input: &Input,
    xpriv: &Xpriv,
) -> DeviceResult<Option<PartialSignature>> {
    let spent = &prevouts[index];
    let keypair = xpriv.to_keypair(SECP256K1);
    let (x_only, _) = keypair.x_only_public_key();

    if spent.script_pubkey.is_p2tr() {
        if let Some((script, version)) = input
            .tap_scripts
            .values()
            .find(|(script, _)| script_has_key(script, &x_only))
        {
            let leaf_hash = TapLeafHash::from_script(script, *version);
            let sighash = cache
                .taproot_script_spend_signature_hash(
                    index,
                    &Prevouts::All(prevouts),
                    leaf_hash,
                    TapSighashType::Default,
                )
                .map_err(signing_error)?;
            let signature = SECP256K1
                .sign_schnorr_no_aux_rand(&Message::from_digest(sighash.to_byte_array()), &keypair);

            return Ok(Some(PartialSignature::TaprootScript {
                pubkey: x_only,
                leaf_hash,
                signature: taproot::Signature {
                    signature,
                    sighash_type: TapSighashType::Default,
                },
            }));
        }

        let tweaked = keypair
            .tap_tweak(SECP256K1, input.tap_merkle_root)
            .to_keypair();
        let (output_key, _) = tweaked.x_only_public_key();
        if ScriptBuf::new_p2tr_tweaked(output_key.dangerous_assume_tweaked()) != spent.script_pubkey
        {
            return Ok(None);
        }

        let sighash = cache
            .taproot_key_spend_signature_hash(index, &Prevouts::All(prevouts), TapSighashType::Default)
            .map_err(signing_error)?;
        let signature = SECP256K1
            .sign_schnorr_no_aux_rand(&Message::from_digest(sighash.to_byte_array()), &tweaked);

        return Ok(Some(PartialSignature::TaprootKey {
            pubkey: output_key,
            signature: taproot::Signature {
                signature,
                sighash_type: TapSighashType::Default,
            },
        }));
    }

    if spent.script_pubkey.is_p2wpkh() {
        let pubkey = CompressedPublicKey(xpriv.private_key.public_key(SECP256K1));
        if ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()) != spent.script_pubkey {
            return Ok(None);
        }

        let sighash = cache
            .p2wpkh_signature_hash(index, &spent.script_pubkey, spent.value, EcdsaSighashType::All)
            .map_err(signing_error)?;
        let signature = SECP256K1.sign_ecdsa_low_r(
            &Message::from_digest(sighash.to_byte_array()),
            &xpriv.private_key,
        );

        return Ok(Some(PartialSignature::Ecdsa {
            pubkey: PublicKey::new(pubkey.0),
            signature: ecdsa::Signature {
                signature,
                sighash_type: EcdsaSighashType::All,
            },
        }));
    }

    Ok(None)
}

fn script_has_key(script: &Script, key: &XOnlyPublicKey) -> bool {
    let key = key.serialize();
    script.instructions().any(|instruction| {
        matches!(instruction, Ok(Instruction::PushBytes(bytes)) if bytes.as_bytes() == key.as_slice())
    })
}

fn signing_error(e: impl std::fmt::Display) -> DeviceError {
    DeviceError::Signing(e.to_string())
}

fn denied(reason: &str) -> DeviceError {
    DeviceError::Rejected {
        status: STATUS_DENIED,
        reason: reason.to_string(),
    }
}

impl Device for SoftwareDevice {
    async fn master_fingerprint(&self) -> DeviceResult<Fingerprint> {
        self.calls.master_fingerprint.fetch_add(1, Ordering::SeqCst);
        Ok(self.fingerprint())
    }

    async fn extended_pubkey(&self, path: &DerivationPath) -> DeviceResult<Xpub> {
        self.calls.extended_pubkey.fetch_add(1, Ordering::SeqCst);
        Ok(Xpub::from_priv(SECP256K1, &self.derive_priv(path)))
    }

    async fn send_auxiliary_data(&self, data: &[u8]) -> DeviceResult<()> {
        self.calls.send_auxiliary_data.fetch_add(1, Ordering::SeqCst);
        if self.reject_auxiliary_data.load(Ordering::SeqCst) {
            return Err(denied("auxiliary data refused"));
        }

        debug!(len = data.len(), "received auxiliary data");
        self.auxiliary_data.lock().push(data.to_vec());
        Ok(())
    }

    async fn sign_transaction(
        &self,
        psbt: &Psbt,
        policy: &WalletPolicy,
    ) -> DeviceResult<Vec<(usize, PartialSignature)>> {
        self.calls.sign_transaction.fetch_add(1, Ordering::SeqCst);
        self.policies.lock().push(policy.clone());
        if self.reject_signing.load(Ordering::SeqCst) {
            return Err(denied("signing refused"));
        }

        self.sign_psbt(psbt, policy)
    }

    async fn sign_message(&self, message: &str, path: &DerivationPath) -> DeviceResult<String> {
        self.calls.sign_message.fetch_add(1, Ordering::SeqCst);
        if self.reject_signing.load(Ordering::SeqCst) {
            return Err(denied("signing refused"));
        }

        let digest = signed_msg_hash(message);
        let signature = SECP256K1.sign_ecdsa_recoverable(
            &Message::from_digest(digest.to_byte_array()),
            &self.derive_priv(path).private_key,
        );

        Ok(MessageSignature::new(signature, true).to_base64())
    }
}
