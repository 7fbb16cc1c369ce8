use bitcoin::{Transaction, absolute::LockTime};

use crate::{constants::STAKING_TX_VERSION, errors::IntegrityError};

/// Checks the shape of a transaction that the covenant committee signs ahead of time.
///
/// Unbonding and slashing transactions must be version 2 with a zero locktime, carry the
/// expected number of inputs and outputs, and have final, non-replaceable inputs with empty
/// script sigs.
pub fn check_pre_signed_tx(
    tx: &Transaction,
    expected_inputs: usize,
    expected_outputs: usize,
) -> Result<(), IntegrityError> {
    if tx.version != STAKING_TX_VERSION {
        return Err(IntegrityError::field(
            "version",
            STAKING_TX_VERSION.0,
            tx.version.0,
        ));
    }
    if tx.lock_time != LockTime::ZERO {
        return Err(IntegrityError::field(
            "locktime",
            LockTime::ZERO,
            tx.lock_time,
        ));
    }
    if tx.input.len() != expected_inputs {
        return Err(IntegrityError::field(
            "input count",
            expected_inputs,
            tx.input.len(),
        ));
    }
    if tx.output.len() != expected_outputs {
        return Err(IntegrityError::field(
            "output count",
            expected_outputs,
            tx.output.len(),
        ));
    }

    for (idx, input) in tx.input.iter().enumerate() {
        if input.sequence.is_rbf() {
            return Err(IntegrityError::Replaceable(idx));
        }
        if !input.script_sig.is_empty() {
            return Err(IntegrityError::NonEmptyScriptSig(idx));
        }
    }

    Ok(())
}
