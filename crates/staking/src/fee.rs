//! Funding input selection and fee estimation.
//!
//! Fees are computed from the virtual size of the candidate transaction with placeholder
//! satisfactions sized for each input's script type, so the estimate follows the selection as it
//! grows.

use bitcoin::{
    Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness, absolute::LockTime,
};
use btc_staking_params::DUST_THRESHOLD;
use tracing::{debug, trace};

use crate::{
    constants::{
        COMPRESSED_PUBKEY_LEN, ECDSA_SIG_LEN, FUNDING_SEQUENCE, LOW_FEE_RATE_BUFFER_SAT,
        LOW_FEE_RATE_THRESHOLD, MAX_NON_LEGACY_OUTPUT_VSIZE, P2PKH_SCRIPT_SIG_LEN,
        P2TR_SCRIPT_INPUT_VSIZE, SCHNORR_SIG_LEN, STAKING_TX_VERSION, TX_OVERHEAD_VSIZE,
        WITHDRAW_TX_BUFFER_VSIZE,
    },
    errors::FundsError,
    taproot::LeafSpend,
    utxo::{ScriptKind, Utxo},
};

/// Outcome of funding a set of outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen UTXOs, largest first.
    pub selected: Vec<Utxo>,
    /// `Σinputs − Σoutputs` of the resulting transaction, change included.
    pub fee: Amount,
    /// Change to return to the staker, only present when above the dust threshold.
    pub change: Option<Amount>,
}

/// An input spent ahead of the selected UTXOs, with a placeholder witness of its final size.
#[derive(Debug, Clone)]
pub(crate) struct FixedInput {
    pub(crate) txin: TxIn,
    pub(crate) value: Amount,
}

/// Selects UTXOs covering `outputs` plus the fee at `fee_rate` sat/vB.
///
/// UTXOs with unsupported script types are skipped. Candidates are tried largest first and the
/// first prefix that covers the outputs and its own fee wins. A change output paying
/// `change_script` is added only if it would exceed the dust threshold; otherwise the remainder
/// goes to the fee.
pub fn select_utxos(
    utxos: &[Utxo],
    outputs: &[TxOut],
    change_script: &ScriptBuf,
    fee_rate: u64,
) -> Result<Selection, FundsError> {
    select_utxos_with_fixed(&[], utxos, outputs, change_script, fee_rate)
}

pub(crate) fn select_utxos_with_fixed(
    fixed: &[FixedInput],
    utxos: &[Utxo],
    outputs: &[TxOut],
    change_script: &ScriptBuf,
    fee_rate: u64,
) -> Result<Selection, FundsError> {
    let mut candidates: Vec<(&Utxo, ScriptKind)> = utxos
        .iter()
        .filter_map(|utxo| utxo.kind().map(|kind| (utxo, kind)))
        .collect();
    if candidates.len() < utxos.len() {
        debug!(
            skipped = utxos.len() - candidates.len(),
            "ignoring utxos with unsupported scripts"
        );
    }
    if candidates.is_empty() {
        return Err(FundsError::NoValidUtxos);
    }

    // stable, so equal values keep the caller's order
    candidates.sort_by(|a, b| b.0.value.cmp(&a.0.value));

    let target: Amount = outputs.iter().map(|out| out.value).sum();
    let mut available: Amount = fixed.iter().map(|input| input.value).sum();
    let mut inputs: Vec<TxIn> = fixed.iter().map(|input| input.txin.clone()).collect();
    let mut required = target;

    let mut with_change = outputs.to_vec();
    with_change.push(TxOut {
        value: Amount::ZERO,
        script_pubkey: change_script.clone(),
    });

    for (idx, (utxo, kind)) in candidates.iter().enumerate() {
        inputs.push(placeholder_txin(utxo, *kind, FUNDING_SEQUENCE));
        available = available
            .checked_add(utxo.value)
            .ok_or(FundsError::FeeOverflow)?;

        let fee = fee_for_vsize(estimate_vsize(&inputs, outputs), fee_rate)?;
        required = target.checked_add(fee).ok_or(FundsError::FeeOverflow)?;
        trace!(inputs = idx + 1, %fee, %required, %available, "evaluating selection");
        if available < required {
            continue;
        }

        let selected: Vec<Utxo> = candidates[..=idx].iter().map(|(u, _)| (*u).clone()).collect();
        let change_fee = fee_for_vsize(estimate_vsize(&inputs, &with_change), fee_rate)?;
        let change = (available - target).checked_sub(change_fee);

        let selection = match change {
            Some(change) if change > DUST_THRESHOLD => Selection {
                selected,
                fee: change_fee,
                change: Some(change),
            },
            _ => {
                debug!(?change, "change at or below dust, adding it to the fee");
                Selection {
                    selected,
                    fee: available - target,
                    change: None,
                }
            }
        };
        debug!(
            selected = selection.selected.len(),
            fee = %selection.fee,
            change = ?selection.change,
            "funded outputs"
        );
        return Ok(selection);
    }

    Err(FundsError::Insufficient {
        required,
        available,
    })
}

/// Fee of a withdrawal from a staking-protocol output, from a fixed virtual size estimate.
pub fn withdrawal_fee(fee_rate: u64) -> Result<Amount, FundsError> {
    let vsize = P2TR_SCRIPT_INPUT_VSIZE
        + MAX_NON_LEGACY_OUTPUT_VSIZE
        + TX_OVERHEAD_VSIZE
        + WITHDRAW_TX_BUFFER_VSIZE;
    let buffer = if fee_rate <= LOW_FEE_RATE_THRESHOLD {
        LOW_FEE_RATE_BUFFER_SAT
    } else {
        0
    };
    vsize
        .checked_mul(fee_rate)
        .and_then(|fee| fee.checked_add(buffer))
        .map(Amount::from_sat)
        .ok_or(FundsError::FeeOverflow)
}

pub(crate) fn fee_for_vsize(vsize: usize, fee_rate: u64) -> Result<Amount, FundsError> {
    (vsize as u64)
        .checked_mul(fee_rate)
        .map(Amount::from_sat)
        .ok_or(FundsError::FeeOverflow)
}

pub(crate) fn estimate_vsize(inputs: &[TxIn], outputs: &[TxOut]) -> usize {
    Transaction {
        version: STAKING_TX_VERSION,
        lock_time: LockTime::ZERO,
        input: inputs.to_vec(),
        output: outputs.to_vec(),
    }
    .vsize()
}

/// An input spending `utxo` with zero-filled signatures of worst-case size.
pub(crate) fn placeholder_txin(utxo: &Utxo, kind: ScriptKind, sequence: Sequence) -> TxIn {
    let sig = vec![0u8; ECDSA_SIG_LEN];
    let pubkey = vec![0u8; COMPRESSED_PUBKEY_LEN];
    let p2wpkh_witness = || Witness::from_slice(&[sig.clone(), pubkey.clone()]);

    let (script_sig_len, witness) = match kind {
        ScriptKind::P2pkh => (P2PKH_SCRIPT_SIG_LEN, Witness::new()),
        ScriptKind::P2wpkh => (0, p2wpkh_witness()),
        ScriptKind::P2tr => (0, Witness::from_slice(&[vec![0u8; SCHNORR_SIG_LEN]])),
        ScriptKind::P2wsh => (0, p2wsh_witness(utxo.witness_script.as_ref(), &sig, &pubkey)),
        ScriptKind::P2sh => match &utxo.redeem_script {
            Some(redeem) if redeem.is_p2wsh() => (
                push_len(redeem.len()),
                p2wsh_witness(utxo.witness_script.as_ref(), &sig, &pubkey),
            ),
            Some(redeem) if redeem.is_witness_program() => {
                (push_len(redeem.len()), p2wpkh_witness())
            }
            Some(redeem) => (push_len(ECDSA_SIG_LEN) + push_len(redeem.len()), Witness::new()),
            // without a redeem script, assume nested P2WPKH
            None => (push_len(22), p2wpkh_witness()),
        },
    };

    TxIn {
        previous_output: utxo.outpoint(),
        script_sig: ScriptBuf::from_bytes(vec![0u8; script_sig_len]),
        sequence,
        witness,
    }
}

/// Placeholder witness for a taproot script-path spend needing `signatures` Schnorr signatures.
pub(crate) fn script_path_placeholder_witness(leaf: &LeafSpend, signatures: usize) -> Witness {
    let mut witness = Witness::new();
    for _ in 0..signatures {
        witness.push([0u8; SCHNORR_SIG_LEN]);
    }
    witness.push(leaf.script.as_bytes());
    witness.push(leaf.control_block.serialize());
    witness
}

fn p2wsh_witness(witness_script: Option<&ScriptBuf>, sig: &[u8], pubkey: &[u8]) -> Witness {
    match witness_script {
        Some(script) => Witness::from_slice(&[sig, script.as_bytes()]),
        None => Witness::from_slice(&[sig, pubkey]),
    }
}

/// Bytes taken by pushing `len` bytes of data, opcode included.
fn push_len(len: usize) -> usize {
    let prefix = match len {
        0..=75 => 1,
        76..=0xff => 2,
        0x100..=0xffff => 3,
        _ => 5,
    };
    prefix + len
}

#[cfg(test)]
mod tests {
    use std::slice;

    use bitcoin::{Network, Txid, hashes::Hash};
    use btc_staking_test_utils::staker_key;

    use super::*;

    fn p2tr_script() -> ScriptBuf {
        staker_key().p2tr_address(Network::Regtest).script_pubkey()
    }

    fn utxo(seed: u8, sats: u64, script: ScriptBuf) -> Utxo {
        Utxo::new(Txid::from_byte_array([seed; 32]), 0, Amount::from_sat(sats), script)
    }

    fn staking_like_output(sats: u64) -> TxOut {
        TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: p2tr_script(),
        }
    }

    #[test]
    fn test_single_p2tr_vsizes() {
        let u = utxo(1, 10_000, p2tr_script());
        let inputs = vec![placeholder_txin(&u, ScriptKind::P2tr, FUNDING_SEQUENCE)];
        let out = staking_like_output(1_000);

        assert_eq!(estimate_vsize(&inputs, slice::from_ref(&out)), 111);
        assert_eq!(estimate_vsize(&inputs, &[out.clone(), out]), 154);
    }

    #[test]
    fn test_p2pkh_placeholder_has_no_witness() {
        let script = staker_key().p2pkh_address(Network::Regtest).script_pubkey();
        let u = utxo(1, 10_000, script);
        let txin = placeholder_txin(&u, ScriptKind::P2pkh, FUNDING_SEQUENCE);

        assert_eq!(txin.script_sig.len(), 107);
        assert!(txin.witness.is_empty());
    }

    #[test]
    fn test_change_emitted_above_dust() {
        let utxos = vec![utxo(1, 101_000, p2tr_script())];
        let outputs = vec![staking_like_output(100_000)];

        let selection = select_utxos(&utxos, &outputs, &p2tr_script(), 1).unwrap();
        assert_eq!(selection.fee, Amount::from_sat(154));
        assert_eq!(selection.change, Some(Amount::from_sat(846)));
    }

    #[test]
    fn test_dust_change_folded_into_fee() {
        let utxos = vec![utxo(1, 100_600, p2tr_script())];
        let outputs = vec![staking_like_output(100_000)];

        let selection = select_utxos(&utxos, &outputs, &p2tr_script(), 1).unwrap();
        assert_eq!(selection.change, None);
        assert_eq!(selection.fee, Amount::from_sat(600));
    }

    #[test]
    fn test_insufficient_funds() {
        let utxos = vec![utxo(1, 100_100, p2tr_script())];
        let outputs = vec![staking_like_output(100_000)];

        let err = select_utxos(&utxos, &outputs, &p2tr_script(), 1).unwrap_err();
        assert_eq!(
            err,
            FundsError::Insufficient {
                required: Amount::from_sat(100_111),
                available: Amount::from_sat(100_100),
            }
        );
    }

    #[test]
    fn test_no_valid_utxos() {
        let utxos = vec![utxo(1, 1_000_000, ScriptBuf::from_bytes(vec![0x51]))];
        let outputs = vec![staking_like_output(100_000)];

        assert_eq!(
            select_utxos(&utxos, &outputs, &p2tr_script(), 1).unwrap_err(),
            FundsError::NoValidUtxos
        );
        assert_eq!(
            select_utxos(&[], &outputs, &p2tr_script(), 1).unwrap_err(),
            FundsError::NoValidUtxos
        );
    }

    #[test]
    fn test_unsupported_utxos_are_skipped() {
        let utxos = vec![
            utxo(1, 5_000_000, ScriptBuf::from_bytes(vec![0x51])),
            utxo(2, 200_000, p2tr_script()),
        ];
        let outputs = vec![staking_like_output(100_000)];

        let selection = select_utxos(&utxos, &outputs, &p2tr_script(), 2).unwrap();
        assert_eq!(selection.selected, vec![utxos[1].clone()]);
    }

    #[test]
    fn test_largest_first_and_grows_until_covered() {
        let utxos = vec![
            utxo(1, 40_000, p2tr_script()),
            utxo(2, 70_000, p2tr_script()),
            utxo(3, 10_000, p2tr_script()),
        ];
        let outputs = vec![staking_like_output(100_000)];

        let selection = select_utxos(&utxos, &outputs, &p2tr_script(), 1).unwrap();
        let picked: Vec<_> = selection.selected.iter().map(|u| u.value.to_sat()).collect();
        assert_eq!(picked, vec![70_000, 40_000]);

        let spent: Amount = selection.selected.iter().map(|u| u.value).sum();
        let change = selection.change.unwrap_or(Amount::ZERO);
        assert_eq!(spent - Amount::from_sat(100_000) - change, selection.fee);
    }

    #[test]
    fn test_withdrawal_fee() {
        assert_eq!(withdrawal_fee(1).unwrap(), Amount::from_sat(129 + 30));
        assert_eq!(withdrawal_fee(2).unwrap(), Amount::from_sat(258 + 30));
        assert_eq!(withdrawal_fee(10).unwrap(), Amount::from_sat(1_290));
        assert_eq!(withdrawal_fee(u64::MAX).unwrap_err(), FundsError::FeeOverflow);
    }

    #[test]
    fn test_push_len() {
        assert_eq!(push_len(22), 23);
        assert_eq!(push_len(72), 73);
        assert_eq!(push_len(80), 82);
        assert_eq!(push_len(300), 303);
    }
}
