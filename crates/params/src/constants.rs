//! Protocol-level constants shared by the params and the transaction builders.

use bitcoin::Amount;

/// Outputs at or below this value are considered dust by the staking protocol.
pub const DUST_THRESHOLD: Amount = Amount::from_sat(546);

/// Length in bytes of the tag carried by observable staking outputs.
pub const STAKING_TAG_LEN: usize = 4;
