//! The interface between the staking signer and an external signing device.
//!
//! The device understands generic wallet policies and an auxiliary data channel. It knows nothing
//! about the staking protocol; everything protocol specific is translated into those two inputs
//! before it reaches an implementation of [`Device`].

pub mod errors;
pub mod signature;
pub mod traits;

pub use errors::{DeviceError, DeviceResult};
pub use signature::PartialSignature;
pub use traits::Device;
