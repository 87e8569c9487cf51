//! This crate provides test-utilities for the staking signer.
//!
//! The main piece is [`device::SoftwareDevice`], a deterministic implementation of the device
//! capability that signs with real keys, so the flows under test can be checked end to end
//! without hardware.

pub mod device;
pub mod fixtures;

pub use device::SoftwareDevice;

use staking_signer_common::logging::{self, LoggerConfig};

/// Initializes logging for a test process, ignoring repeated calls.
pub fn init_test_logging() {
    let _ = logging::try_init(LoggerConfig::with_base_name("staking-signer-tests"));
}
