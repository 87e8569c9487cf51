//! This crate contains the types and pure functions that the policy builder and the message
//! signer share: extended key encoding, taproot leaf hashing, staking leaf recognition and the
//! wallet policy model.
//!
//! It lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod constants;
pub mod errors;
pub mod hashes;
pub mod keys;
pub mod policy;
pub mod script_template;
pub mod taproot;
