//! Versioned staking parameters: covenant committee, amount and timelock bounds, unbonding and
//! slashing terms.

mod constants;
mod errors;
mod params;
mod registry;
pub mod serde_helpers;
mod slashing;
mod tag;

pub use constants::*;
pub use errors::*;
pub use params::*;
pub use registry::*;
pub use slashing::*;
pub use tag::*;
