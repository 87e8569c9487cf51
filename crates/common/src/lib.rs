//! Crate includes reusable utils for the staking signer and its callers.
//! Such as initializing the tracing framework.

pub mod logging;

// Re-export tracing crate for convenience.
pub use tracing;
