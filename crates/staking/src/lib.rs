//! Taproot transaction engine for BTC staking.
//!
//! Derives the staking scripts and their taproot outputs, builds the staking, unbonding,
//! slashing, withdrawal and expansion transactions, and turns them into PSBTs. Signed PSBTs are
//! checked against their templates before extraction, and covenant committee signatures are
//! merged into the final unbonding and slashing witnesses.
//!
//! Every operation is a pure function of its inputs: no I/O, no key material, no global state.

mod constants;
mod covenant;
mod errors;
mod fee;
mod inclusion_proof;
mod integrity;
mod psbt;
mod scripts;
mod staking;
mod taproot;
pub mod tx;
mod utxo;

#[cfg(test)]
mod test_utils;

pub use constants::*;
pub use covenant::{CovenantSignature, covenant_witness, witness_bytes};
pub use errors::*;
pub use fee::{Selection, select_utxos, withdrawal_fee};
pub use inclusion_proof::{InclusionProof, build_inclusion_proof};
pub use integrity::validate_signed_psbt;
pub use psbt::{InputSpec, ScriptPathSpend, assemble_psbt};
pub use scripts::{StakingScriptData, StakingScripts};
pub use staking::{PreviousStake, StakerInfo, Staking, StakingInput};
pub use taproot::{
    LeafSpend, TaprootOutput, derive_slashing_change_output, derive_staking_output,
    derive_unbonding_output,
};
pub use utxo::{ScriptKind, Utxo};
