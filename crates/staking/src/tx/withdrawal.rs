use bitcoin::{
    Network, OutPoint, ScriptBuf, Sequence, Transaction, TxOut,
    absolute::LockTime,
    secp256k1::{Secp256k1, Verification},
};
use btc_staking_params::DUST_THRESHOLD;
use tracing::debug;

use super::{TransactionResult, make_txin, spent_output, validate_fee_rate};
use crate::{
    constants::STAKING_TX_VERSION,
    errors::{FundsError, StakingError, StakingResult, TxKind},
    fee::withdrawal_fee,
    scripts::{StakingScriptData, StakingScripts},
    taproot::{
        LeafSpend, TaprootOutput, derive_slashing_change_output, derive_staking_output,
        derive_unbonding_output,
    },
};

/// The timelocked output a withdrawal spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalSource {
    /// Staking output whose staking timelock has expired.
    StakingExpired,
    /// Unbonding output after the unbonding time.
    EarlyUnbonded,
    /// Change output of a slashing transaction after the unbonding time.
    SlashingChange,
}

impl WithdrawalSource {
    /// The spent tree and the timelock leaf used to spend it.
    pub fn spend_path<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        scripts: &StakingScripts,
        network: Network,
    ) -> StakingResult<(TaprootOutput, LeafSpend)> {
        let (tree, leaf) = match self {
            WithdrawalSource::StakingExpired => (
                derive_staking_output(secp, scripts, network)?,
                &scripts.timelock,
            ),
            WithdrawalSource::EarlyUnbonded => (
                derive_unbonding_output(secp, scripts, network)?,
                &scripts.unbonding_timelock,
            ),
            WithdrawalSource::SlashingChange => (
                derive_slashing_change_output(secp, scripts, network)?,
                &scripts.unbonding_timelock,
            ),
        };
        let spend = tree.leaf_spend(leaf)?;
        Ok((tree, spend))
    }

    /// Relative timelock, in blocks, enforced by the leaf this source is spent through.
    pub fn timelock(&self, data: &StakingScriptData) -> u16 {
        match self {
            WithdrawalSource::StakingExpired => data.staking_timelock(),
            WithdrawalSource::EarlyUnbonded | WithdrawalSource::SlashingChange => {
                data.unbonding_timelock()
            }
        }
    }
}

/// Builds a withdrawal of output `vout` of `source_tx` back to `destination`.
///
/// The input sequence carries the leaf's relative timelock, as `OP_CHECKSEQUENCEVERIFY`
/// requires. The fee comes from a fixed size estimate at `fee_rate`.
#[expect(clippy::too_many_arguments, reason = "each argument is an independent input")]
pub fn build_withdrawal_tx<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    data: &StakingScriptData,
    source: WithdrawalSource,
    source_tx: &Transaction,
    vout: u32,
    destination: &ScriptBuf,
    fee_rate: u64,
) -> StakingResult<TransactionResult> {
    validate_fee_rate(fee_rate)?;

    build(secp, network, data, source, source_tx, vout, destination, fee_rate)
        .map_err(|e| StakingError::build(TxKind::Withdrawal, e))
}

#[expect(clippy::too_many_arguments, reason = "same arguments as build_withdrawal_tx")]
fn build<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    data: &StakingScriptData,
    source: WithdrawalSource,
    source_tx: &Transaction,
    vout: u32,
    destination: &ScriptBuf,
    fee_rate: u64,
) -> StakingResult<TransactionResult> {
    let scripts = data.build_scripts()?;
    let (tree, _) = source.spend_path(secp, &scripts, network)?;
    let spent = spent_output(source_tx, vout, &tree.script_pubkey())?;

    let fee = withdrawal_fee(fee_rate)?;
    let value = spent.value.checked_sub(fee).ok_or(FundsError::Insufficient {
        required: fee,
        available: spent.value,
    })?;
    if value < DUST_THRESHOLD {
        return Err(FundsError::BelowDust {
            output: "withdrawal",
            value,
        }
        .into());
    }

    let sequence = Sequence::from_height(source.timelock(data));
    let transaction = Transaction {
        version: STAKING_TX_VERSION,
        lock_time: LockTime::ZERO,
        input: vec![make_txin(
            OutPoint::new(source_tx.compute_txid(), vout),
            sequence,
        )],
        output: vec![TxOut {
            value,
            script_pubkey: destination.clone(),
        }],
    };
    debug!(txid = %transaction.compute_txid(), ?source, %fee, "built withdrawal transaction");

    Ok(TransactionResult { transaction, fee })
}
