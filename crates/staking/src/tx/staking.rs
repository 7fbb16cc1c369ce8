use bitcoin::{
    Amount, Network, Transaction, TxOut,
    absolute::LockTime,
    secp256k1::{Secp256k1, Verification},
};
use tracing::debug;

use super::{Funding, TransactionResult, make_txin, outputs_total};
use crate::{
    constants::{FUNDING_SEQUENCE, LOCK_TIME_THRESHOLD, STAKING_TX_VERSION},
    errors::{StakingError, StakingResult, TxKind},
    fee::select_utxos,
    scripts::StakingScripts,
    taproot::derive_staking_output,
};

/// Builds an unsigned staking transaction locking `amount` into the staking output of
/// `scripts`.
///
/// Outputs are the staking output, the data-embed output when `scripts` carries one, and change
/// above dust. With `lock_height`, the locktime is set to `lock_height - 1` so the transaction
/// can be mined no earlier than that height.
pub fn build_staking_tx<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    scripts: &StakingScripts,
    amount: Amount,
    funding: Funding<'_>,
    lock_height: Option<u32>,
) -> StakingResult<TransactionResult> {
    if amount == Amount::ZERO {
        return Err(StakingError::invalid_input("staking amount must be positive"));
    }
    funding.validate()?;
    let lock_time = staking_lock_time(lock_height)?;

    build(secp, network, scripts, amount, funding, lock_time)
        .map_err(|e| StakingError::build(TxKind::Staking, e))
}

fn build<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    scripts: &StakingScripts,
    amount: Amount,
    funding: Funding<'_>,
    lock_time: LockTime,
) -> StakingResult<TransactionResult> {
    let staking_output = derive_staking_output(secp, scripts, network)?;

    let mut outputs = vec![TxOut {
        value: amount,
        script_pubkey: staking_output.script_pubkey(),
    }];
    if let Some(data_embed) = &scripts.data_embed {
        outputs.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: data_embed.clone(),
        });
    }

    let selection = select_utxos(
        funding.utxos,
        &outputs,
        funding.change_script,
        funding.fee_rate,
    )?;

    if let Some(change) = selection.change {
        outputs.push(TxOut {
            value: change,
            script_pubkey: funding.change_script.clone(),
        });
    }

    let input = selection
        .selected
        .iter()
        .map(|utxo| make_txin(utxo.outpoint(), FUNDING_SEQUENCE))
        .collect::<Vec<_>>();
    let input_total: Amount = selection.selected.iter().map(|utxo| utxo.value).sum();
    let fee = input_total - outputs_total(&outputs);

    let transaction = Transaction {
        version: STAKING_TX_VERSION,
        lock_time,
        input,
        output: outputs,
    };
    debug!(txid = %transaction.compute_txid(), %amount, %fee, "built staking transaction");

    Ok(TransactionResult { transaction, fee })
}

fn staking_lock_time(lock_height: Option<u32>) -> StakingResult<LockTime> {
    match lock_height {
        None => Ok(LockTime::ZERO),
        Some(0) => Err(StakingError::invalid_input("lock height must be positive")),
        Some(height) if height >= LOCK_TIME_THRESHOLD => Err(StakingError::invalid_input(
            format!("lock height {height} is not below {LOCK_TIME_THRESHOLD}"),
        )),
        Some(height) => Ok(LockTime::from_consensus(height - 1)),
    }
}
