use bitcoin::{
    Amount, Network, OutPoint, Transaction, TxOut,
    absolute::LockTime,
    secp256k1::{Secp256k1, Verification},
};
use tracing::debug;

use super::{Funding, TransactionResult, make_txin, outputs_total, spent_output};
use crate::{
    constants::{FUNDING_SEQUENCE, PRE_SIGNED_SEQUENCE, STAKING_TX_VERSION},
    errors::{StakingError, StakingResult, TxKind},
    fee::{FixedInput, script_path_placeholder_witness, select_utxos_with_fixed},
    scripts::StakingScriptData,
    taproot::derive_staking_output,
};

/// Inputs of a staking expansion: an existing stake grown into a new staking output.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionRequest<'a> {
    /// Scripts of the stake being expanded.
    pub previous: &'a StakingScriptData,
    pub previous_tx: &'a Transaction,
    pub previous_vout: u32,
    /// Scripts of the resulting stake.
    pub next: &'a StakingScriptData,
    /// Value of the new staking output; at least the previous stake.
    pub amount: Amount,
    pub funding: Funding<'a>,
}

/// Builds a staking transaction that spends the previous staking output through its unbonding
/// leaf together with wallet UTXOs.
///
/// Input 0 is the previous stake and requires covenant signatures, so it is not replaceable;
/// funding inputs are. The new finality provider set must include every previous provider.
pub fn build_expansion_tx<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    request: ExpansionRequest<'_>,
) -> StakingResult<TransactionResult> {
    request.funding.validate()?;

    let previous_value = request
        .previous_tx
        .output
        .get(request.previous_vout as usize)
        .map(|out| out.value)
        .ok_or_else(|| {
            StakingError::invalid_input(format!(
                "previous staking output {} does not exist",
                request.previous_vout
            ))
        })?;
    if request.amount < previous_value {
        return Err(StakingError::invalid_input(format!(
            "expanded amount {} is below the previous stake {previous_value}",
            request.amount
        )));
    }

    let next_fps = request.next.finality_provider_keys();
    if let Some(missing) = request
        .previous
        .finality_provider_keys()
        .iter()
        .find(|fp| !next_fps.contains(fp))
    {
        return Err(StakingError::invalid_input(format!(
            "finality provider {missing} of the previous stake is missing"
        )));
    }

    build(secp, network, request).map_err(|e| StakingError::build(TxKind::StakingExpansion, e))
}

fn build<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    request: ExpansionRequest<'_>,
) -> StakingResult<TransactionResult> {
    let previous_scripts = request.previous.build_scripts()?;
    let previous_output = derive_staking_output(secp, &previous_scripts, network)?;
    let spent = spent_output(
        request.previous_tx,
        request.previous_vout,
        &previous_output.script_pubkey(),
    )?;
    let leaf = previous_output.leaf_spend(&previous_scripts.unbonding)?;

    let previous_outpoint =
        OutPoint::new(request.previous_tx.compute_txid(), request.previous_vout);
    let mut placeholder = make_txin(previous_outpoint, PRE_SIGNED_SEQUENCE);
    // staker plus every covenant member
    placeholder.witness =
        script_path_placeholder_witness(&leaf, request.previous.covenant_keys().len() + 1);
    let fixed = FixedInput {
        txin: placeholder,
        value: spent.value,
    };

    let scripts = request.next.build_scripts()?;
    let staking_output = derive_staking_output(secp, &scripts, network)?;
    let mut outputs = vec![TxOut {
        value: request.amount,
        script_pubkey: staking_output.script_pubkey(),
    }];
    if let Some(data_embed) = &scripts.data_embed {
        outputs.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: data_embed.clone(),
        });
    }

    let funding = request.funding;
    let selection = select_utxos_with_fixed(
        &[fixed],
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

    let mut input = vec![make_txin(previous_outpoint, PRE_SIGNED_SEQUENCE)];
    input.extend(
        selection
            .selected
            .iter()
            .map(|utxo| make_txin(utxo.outpoint(), FUNDING_SEQUENCE)),
    );
    let input_total = selection
        .selected
        .iter()
        .map(|utxo| utxo.value)
        .sum::<Amount>()
        + spent.value;
    let fee = input_total - outputs_total(&outputs);

    let transaction = Transaction {
        version: STAKING_TX_VERSION,
        lock_time: LockTime::ZERO,
        input,
        output: outputs,
    };
    debug!(
        txid = %transaction.compute_txid(),
        previous = %previous_outpoint,
        amount = %request.amount,
        %fee,
        "built staking expansion transaction"
    );

    Ok(TransactionResult { transaction, fee })
}
