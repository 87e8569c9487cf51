//! The device capability.

use std::future::Future;

use bitcoin::{
    bip32::{DerivationPath, Fingerprint, Xpub},
    Psbt,
};
use staking_signer_primitives::policy::WalletPolicy;

use crate::{errors::DeviceResult, signature::PartialSignature};

/// A signing device holding a BIP32 master key.
///
/// Every method is a single request/response exchange. A device is a serial resource: callers
/// must not interleave two operations on the same handle, and nothing here queues or locks on
/// their behalf.
pub trait Device: Send + Sync {
    /// Fingerprint of the master key.
    fn master_fingerprint(&self) -> impl Future<Output = DeviceResult<Fingerprint>> + Send;

    /// Extended public key at `path`.
    fn extended_pubkey(
        &self,
        path: &DerivationPath,
    ) -> impl Future<Output = DeviceResult<Xpub>> + Send;

    /// Hands the device raw parameters it cannot read from a policy.
    ///
    /// The device keeps them for the following signing round and uses them to check what it is
    /// asked to sign.
    fn send_auxiliary_data(&self, data: &[u8]) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Signs every input of `psbt` the policy's keys can sign for.
    ///
    /// Returns `(input index, signature)` pairs. The PSBT itself is not modified.
    fn sign_transaction(
        &self,
        psbt: &Psbt,
        policy: &WalletPolicy,
    ) -> impl Future<Output = DeviceResult<Vec<(usize, PartialSignature)>>> + Send;

    /// Signs `message` with the key at `path` using the legacy "Bitcoin Signed Message" scheme.
    ///
    /// Returns the base64 encoded compact recoverable signature.
    fn sign_message(
        &self,
        message: &str,
        path: &DerivationPath,
    ) -> impl Future<Output = DeviceResult<String>> + Send;
}
