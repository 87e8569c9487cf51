//! This crate contains the parameter sets of the staking protocol's actions and the rules every
//! one of them must satisfy before a device is asked to sign anything.

pub mod errors;
pub mod types;

pub mod prelude {
    //! Re-exports of the commonly used parameter types.

    pub use crate::{errors::ValidationError, types::*};
}
