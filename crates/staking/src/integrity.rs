//! Checks a PSBT returned by a signer against the template it was asked to sign.
//!
//! A signer only adds signatures. Any change to version, locktime, inputs or outputs means the
//! wallet tampered with the transaction, and it is rejected before extraction.

use bitcoin::{Psbt, Transaction};
use tracing::{debug, warn};

use crate::errors::IntegrityError;

/// Compares `signed` with `template` field by field and extracts the finalized transaction.
pub fn validate_signed_psbt(template: &Psbt, signed: Psbt) -> Result<Transaction, IntegrityError> {
    if let Err(e) = check_unchanged(&template.unsigned_tx, &signed.unsigned_tx) {
        warn!(%e, "signed psbt diverges from its template");
        return Err(e);
    }
    if let Err(e) = check_map_counts(template, &signed) {
        warn!(%e, "signed psbt is missing per-input or per-output maps");
        return Err(e);
    }

    if let Some(idx) = signed
        .inputs
        .iter()
        .position(|input| input.final_script_witness.is_none() && input.final_script_sig.is_none())
    {
        warn!(input = idx, "signed psbt has an unfinalized input");
        return Err(IntegrityError::NotFinalized(idx));
    }

    let tx = signed.extract_tx_unchecked_fee_rate();
    debug!(txid = %tx.compute_txid(), "accepted signed psbt");
    Ok(tx)
}

/// Extraction pairs maps with transaction inputs positionally, so a short map list would leave
/// inputs with empty witnesses.
fn check_map_counts(template: &Psbt, signed: &Psbt) -> Result<(), IntegrityError> {
    if template.inputs.len() != signed.inputs.len() {
        return Err(IntegrityError::field(
            "psbt input count",
            template.inputs.len(),
            signed.inputs.len(),
        ));
    }
    if template.outputs.len() != signed.outputs.len() {
        return Err(IntegrityError::field(
            "psbt output count",
            template.outputs.len(),
            signed.outputs.len(),
        ));
    }
    Ok(())
}

fn check_unchanged(expected: &Transaction, actual: &Transaction) -> Result<(), IntegrityError> {
    if expected.version != actual.version {
        return Err(IntegrityError::field(
            "version",
            expected.version.0,
            actual.version.0,
        ));
    }
    if expected.lock_time != actual.lock_time {
        return Err(IntegrityError::field(
            "locktime",
            expected.lock_time,
            actual.lock_time,
        ));
    }

    if expected.input.len() != actual.input.len() {
        return Err(IntegrityError::field(
            "input count",
            expected.input.len(),
            actual.input.len(),
        ));
    }
    for (idx, (want, got)) in expected.input.iter().zip(&actual.input).enumerate() {
        let (want_prev, got_prev) = (want.previous_output, got.previous_output);
        if want_prev.txid != got_prev.txid {
            return Err(IntegrityError::indexed(
                "input prevout txid",
                idx,
                want_prev.txid,
                got_prev.txid,
            ));
        }
        if want_prev.vout != got_prev.vout {
            return Err(IntegrityError::indexed(
                "input prevout vout",
                idx,
                want_prev.vout,
                got_prev.vout,
            ));
        }
        if want.sequence != got.sequence {
            return Err(IntegrityError::indexed(
                "input sequence",
                idx,
                want.sequence,
                got.sequence,
            ));
        }
    }

    if expected.output.len() != actual.output.len() {
        return Err(IntegrityError::field(
            "output count",
            expected.output.len(),
            actual.output.len(),
        ));
    }
    for (idx, (want, got)) in expected.output.iter().zip(&actual.output).enumerate() {
        if want.value != got.value {
            return Err(IntegrityError::indexed(
                "output value",
                idx,
                want.value.to_sat(),
                got.value.to_sat(),
            ));
        }
        if want.script_pubkey != got.script_pubkey {
            return Err(IntegrityError::indexed(
                "output script",
                idx,
                want.script_pubkey.to_hex_string(),
                got.script_pubkey.to_hex_string(),
            ));
        }
    }

    Ok(())
}
