//! Deterministic keys, fixture transactions and Schnorr signing helpers for staking tests.

pub mod keys;
pub mod signing;
pub mod transaction;

pub use keys::{TestKey, covenant_keys, finality_provider_key, staker_key};
pub use signing::{sign_key_spend, sign_script_spend};
pub use transaction::{create_dummy_tx, funding_tx_with_output};
