use bitcoin::{
    Amount, Network, OutPoint, Transaction, TxOut,
    absolute::LockTime,
    secp256k1::{Secp256k1, Verification},
};
use btc_staking_params::DUST_THRESHOLD;
use tracing::debug;

use super::{TransactionResult, make_txin, spent_output};
use crate::{
    constants::{PRE_SIGNED_SEQUENCE, STAKING_TX_VERSION},
    errors::{FundsError, StakingError, StakingResult, TxKind},
    scripts::StakingScripts,
    taproot::{derive_staking_output, derive_unbonding_output},
};

/// Builds the unbonding transaction spending output `vout` of `staking_tx` through the unbonding
/// leaf.
///
/// The single output pays the staked value minus `unbonding_fee` to the unbonding output. The
/// fee is fixed by the protocol rather than derived from a fee rate.
pub fn build_unbonding_tx<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    scripts: &StakingScripts,
    staking_tx: &Transaction,
    vout: u32,
    unbonding_fee: Amount,
) -> StakingResult<TransactionResult> {
    if unbonding_fee == Amount::ZERO {
        return Err(StakingError::invalid_input("unbonding fee must be positive"));
    }

    build(secp, network, scripts, staking_tx, vout, unbonding_fee)
        .map_err(|e| StakingError::build(TxKind::Unbonding, e))
}

fn build<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    scripts: &StakingScripts,
    staking_tx: &Transaction,
    vout: u32,
    unbonding_fee: Amount,
) -> StakingResult<TransactionResult> {
    let staking_output = derive_staking_output(secp, scripts, network)?;
    let spent = spent_output(staking_tx, vout, &staking_output.script_pubkey())?;

    let value = spent.value.checked_sub(unbonding_fee).unwrap_or(Amount::ZERO);
    if value < DUST_THRESHOLD {
        return Err(FundsError::BelowDust {
            output: "unbonding",
            value,
        }
        .into());
    }

    let unbonding_output = derive_unbonding_output(secp, scripts, network)?;
    let transaction = Transaction {
        version: STAKING_TX_VERSION,
        lock_time: LockTime::ZERO,
        input: vec![make_txin(
            OutPoint::new(staking_tx.compute_txid(), vout),
            PRE_SIGNED_SEQUENCE,
        )],
        output: vec![TxOut {
            value,
            script_pubkey: unbonding_output.script_pubkey(),
        }],
    };
    debug!(txid = %transaction.compute_txid(), %value, "built unbonding transaction");

    Ok(TransactionResult {
        transaction,
        fee: unbonding_fee,
    })
}
