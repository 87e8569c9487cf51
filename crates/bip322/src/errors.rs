//! Errors for message signing.

use staking_signer_device_proto::DeviceError;
use staking_signer_policy::PolicyBuildError;
use staking_signer_primitives::policy::AddressType;
use thiserror::Error;

/// Result of a message signing operation.
pub type MessageSignResult<T> = Result<T, MessageSignError>;

/// Error while signing a message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MessageSignError {
    /// The account key does not give an output script the signature can be made for.
    #[error("invalid spend script: {0}")]
    InvalidSpendScript(String),

    /// The device returned a number of signatures other than one.
    #[error("expected exactly one signature, got {0}")]
    SignatureCountMismatch(usize),

    /// The device signed a script path of a key-path only output.
    #[error("device returned a script-path signature for a key-path spend")]
    UnexpectedScriptPath,

    /// Messages cannot be signed for this address type with the configured channel.
    #[error("address type {0:?} is not supported for message signing")]
    UnsupportedAddressType(AddressType),

    /// The device failed a request.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The signing policy could not be built.
    #[error("policy error: {0}")]
    Policy(#[source] PolicyBuildError),

    /// The virtual transaction could not be wrapped in a PSBT.
    #[error("psbt error: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),
}

impl From<PolicyBuildError> for MessageSignError {
    fn from(err: PolicyBuildError) -> Self {
        match err {
            PolicyBuildError::UnsupportedAddressType(address_type) => {
                MessageSignError::UnsupportedAddressType(address_type)
            }
            other => MessageSignError::Policy(other),
        }
    }
}
