//! Builders for the staking, unbonding, slashing, withdrawal and expansion transactions.
//!
//! Every builder checks its arguments first and returns [`StakingError::InvalidInput`] directly;
//! anything that fails afterwards is wrapped in [`StakingError::BuildTransaction`].

mod expansion;
mod sanity;
mod slashing;
mod staking;
mod unbonding;
mod withdrawal;

use bitcoin::{Amount, OutPoint, Psbt, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
pub use expansion::{ExpansionRequest, build_expansion_tx};
pub use sanity::check_pre_signed_tx;
pub use slashing::{SlashingSource, build_slashing_tx};
pub use staking::build_staking_tx;
pub use unbonding::build_unbonding_tx;
pub use withdrawal::{WithdrawalSource, build_withdrawal_tx};

use crate::{
    errors::{StakingError, StakingResult},
    utxo::Utxo,
};

/// An unsigned transaction and the fee it pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub transaction: Transaction,
    /// Always `Σinputs − Σoutputs`.
    pub fee: Amount,
}

/// A signable PSBT and the fee its transaction pays.
#[derive(Debug, Clone, PartialEq)]
pub struct PsbtResult {
    pub psbt: Psbt,
    pub fee: Amount,
}

/// Wallet inputs available to fund a transaction.
#[derive(Debug, Clone, Copy)]
pub struct Funding<'a> {
    pub utxos: &'a [Utxo],
    /// Sat/vB.
    pub fee_rate: u64,
    /// Receives the change, if any.
    pub change_script: &'a ScriptBuf,
}

impl Funding<'_> {
    fn validate(&self) -> StakingResult<()> {
        if self.utxos.is_empty() {
            return Err(StakingError::invalid_input("no utxos supplied"));
        }
        validate_fee_rate(self.fee_rate)
    }
}

pub(crate) fn validate_fee_rate(fee_rate: u64) -> StakingResult<()> {
    if fee_rate == 0 {
        return Err(StakingError::invalid_input("fee rate must be positive"));
    }
    Ok(())
}

pub(crate) fn make_txin(previous_output: OutPoint, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence,
        witness: Witness::new(),
    }
}

/// Output `vout` of `tx`, which must pay to `expected`.
pub(crate) fn spent_output<'a>(
    tx: &'a Transaction,
    vout: u32,
    expected: &ScriptBuf,
) -> StakingResult<&'a TxOut> {
    let output = tx
        .output
        .get(vout as usize)
        .ok_or_else(|| StakingError::invalid_input(format!("output {vout} does not exist")))?;
    if &output.script_pubkey != expected {
        return Err(StakingError::invalid_input(format!(
            "output {vout} does not pay to the expected staking script"
        )));
    }
    Ok(output)
}

/// Index of the first output of `tx` paying to `script_pubkey`.
pub fn find_output(tx: &Transaction, script_pubkey: &ScriptBuf) -> StakingResult<u32> {
    tx.output
        .iter()
        .position(|out| &out.script_pubkey == script_pubkey)
        .map(|idx| idx as u32)
        .ok_or_else(|| {
            StakingError::invalid_input(format!(
                "transaction {} has no output paying to {script_pubkey}",
                tx.compute_txid()
            ))
        })
}

pub(crate) fn outputs_total(outputs: &[TxOut]) -> Amount {
    outputs.iter().map(|out| out.value).sum()
}
