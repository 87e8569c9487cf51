//! Errors for building policies and signing against them.

use std::io;

use staking_signer_device_proto::DeviceError;
use staking_signer_params::prelude::ValidationError;
use staking_signer_primitives::{
    errors::{KeyCodecError, PolicyError, TaprootError},
    policy::AddressType,
};
use staking_signer_tlv::TlvError;
use thiserror::Error;

/// Result of a policy operation.
pub type PolicyResult<T> = Result<T, PolicyBuildError>;

/// Error while building a policy or signing a PSBT with it.
///
/// [`Validation`](Self::Validation) and [`Encoding`](Self::Encoding) are raised before the device
/// is contacted and are deterministic. Device errors are never retried: the caller must restart
/// the whole flow because the device's auxiliary state is unknown afterwards.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyBuildError {
    /// The parameters are invalid.
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    /// A wire artifact could not be built.
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    /// The device failed a key or signing request.
    #[error("device rejected the request: {0}")]
    DeviceRejected(#[source] DeviceError),

    /// The device did not accept the auxiliary data.
    #[error("device rejected the auxiliary data: {0}")]
    AuxiliaryDataRejected(#[source] DeviceError),

    /// The PSBT or the device's answer does not fit the action.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(#[from] ProtocolMismatch),

    /// The address type cannot be used with this action and channel.
    #[error("address type {0:?} is not supported here")]
    UnsupportedAddressType(AddressType),
}

/// A key string, TLV stream or policy could not be built.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EncodingError {
    /// See [`TlvError`].
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// See [`KeyCodecError`].
    #[error(transparent)]
    KeyCodec(#[from] KeyCodecError),

    /// See [`PolicyError`].
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// What the caller handed over does not match the requested action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolMismatch {
    /// No input carries a taproot leaf script.
    #[error("no input carries a taproot leaf script")]
    NoTaprootScript,

    /// The leaf script is not the leaf the action spends.
    #[error("leaf script is not a {expected} leaf")]
    UnexpectedLeaf {
        /// Leaf shape the action needs.
        expected: &'static str,
    },

    /// The leaf disagrees with the parameters.
    #[error("leaf {field} does not match the parameters")]
    LeafParams {
        /// Name of the disagreeing value.
        field: &'static str,
    },

    /// The leaf's timelock differs from the parameters'.
    #[error("leaf timelock {leaf} differs from timelock_blocks {params}")]
    TimelockMismatch {
        /// Timelock in the leaf.
        leaf: u64,
        /// Timelock in the parameters.
        params: u64,
    },

    /// The device returned no signature.
    #[error("device returned no signatures")]
    NoSignatures,

    /// The device returned a signature for an input that does not exist.
    #[error("signature for input {index}, but the psbt has {inputs} inputs")]
    InputOutOfRange {
        /// Input index returned.
        index: usize,
        /// Inputs in the PSBT.
        inputs: usize,
    },
}

impl From<TaprootError> for ProtocolMismatch {
    fn from(err: TaprootError) -> Self {
        match err {
            TaprootError::NoTaprootScript => ProtocolMismatch::NoTaprootScript,
        }
    }
}

impl From<TaprootError> for PolicyBuildError {
    fn from(err: TaprootError) -> Self {
        PolicyBuildError::ProtocolMismatch(err.into())
    }
}

impl From<TlvError> for PolicyBuildError {
    fn from(err: TlvError) -> Self {
        PolicyBuildError::Encoding(err.into())
    }
}

impl From<KeyCodecError> for PolicyBuildError {
    fn from(err: KeyCodecError) -> Self {
        PolicyBuildError::Encoding(err.into())
    }
}

impl From<PolicyError> for PolicyBuildError {
    fn from(err: PolicyError) -> Self {
        PolicyBuildError::Encoding(err.into())
    }
}

/// Error while loading a [`SignerConfig`](crate::config::SignerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config: {0}")]
    Io(#[from] io::Error),

    /// The document is not a valid configuration.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
