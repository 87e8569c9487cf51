//! Builds the wallet policies a signing device needs for each staking action.
//!
//! A device only understands generic wallet policies, so the protocol parameters travel next to
//! the policy: either as a TLV stream sent ahead of it, or, for older firmware, as synthetic
//! keys tagged with magic fingerprints inside the policy's key list. [`PolicyBuilder`] picks the
//! channel from its [`SignerConfig`], validates the parameters, cross-checks them against the
//! PSBT being signed and talks to the device.

pub mod builder;
pub mod config;
pub mod errors;
pub mod signing;
pub mod templates;

pub use builder::{BuiltPolicy, PolicyBuilder, PolicyRequest};
pub use config::{AuxiliaryChannel, SignerConfig};
pub use errors::{ConfigError, EncodingError, PolicyBuildError, PolicyResult, ProtocolMismatch};
