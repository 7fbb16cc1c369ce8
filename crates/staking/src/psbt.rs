//! Turns built transactions into signable PSBTs.
//!
//! Wallet inputs are described by [`InputSpec`], one variant per supported script type, each
//! carrying exactly the PSBT fields a signer needs for that type. Inputs spending a staking
//! protocol output carry the leaf script and control block instead.

use bitcoin::{
    OutPoint, Psbt, ScriptBuf, Transaction, TxOut, XOnlyPublicKey, consensus, psbt,
    secp256k1::{Secp256k1, Verification},
    taproot::LeafVersion,
};
use tracing::debug;

use crate::{
    errors::PsbtError,
    taproot::LeafSpend,
    utxo::{ScriptKind, Utxo},
};

/// Validated PSBT input data for a wallet UTXO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    P2pkh {
        non_witness_utxo: Transaction,
    },
    /// Plain or nested-segwit P2SH. Nested segwit also carries the witness UTXO, and nested
    /// P2WSH its witness script.
    P2sh {
        non_witness_utxo: Transaction,
        redeem_script: ScriptBuf,
        witness_utxo: Option<TxOut>,
        witness_script: Option<ScriptBuf>,
    },
    P2wpkh {
        witness_utxo: TxOut,
    },
    P2wsh {
        witness_utxo: TxOut,
        witness_script: ScriptBuf,
    },
    /// The internal key is only set when the output is the staker's own key-path address.
    P2tr {
        witness_utxo: TxOut,
        tap_internal_key: Option<XOnlyPublicKey>,
    },
}

impl InputSpec {
    /// Classifies `utxo` and checks the metadata it comes with.
    ///
    /// Legacy inputs need the raw previous transaction, which must hash to the UTXO's txid and
    /// hold the same script and value at its vout. Redeem and witness scripts must hash to the
    /// script pubkey.
    pub fn from_utxo<C: Verification>(
        secp: &Secp256k1<C>,
        utxo: &Utxo,
        staker_key: Option<XOnlyPublicKey>,
    ) -> Result<Self, PsbtError> {
        let kind = utxo
            .kind()
            .ok_or_else(|| PsbtError::UnsupportedScript(utxo.script_pubkey.clone()))?;

        let spec = match kind {
            ScriptKind::P2pkh => InputSpec::P2pkh {
                non_witness_utxo: checked_raw_tx(utxo)?,
            },
            ScriptKind::P2sh => {
                let non_witness_utxo = checked_raw_tx(utxo)?;
                let redeem_script = utxo.redeem_script.clone().ok_or(
                    PsbtError::MissingRedeemScript {
                        txid: utxo.txid,
                        vout: utxo.vout,
                    },
                )?;
                if ScriptBuf::new_p2sh(&redeem_script.script_hash()) != utxo.script_pubkey {
                    return Err(PsbtError::RedeemScriptMismatch {
                        txid: utxo.txid,
                        vout: utxo.vout,
                    });
                }

                let witness_utxo = redeem_script.is_witness_program().then(|| utxo.txout());
                let witness_script = if redeem_script.is_p2wsh() {
                    Some(checked_witness_script(utxo, &redeem_script)?)
                } else {
                    None
                };
                InputSpec::P2sh {
                    non_witness_utxo,
                    redeem_script,
                    witness_utxo,
                    witness_script,
                }
            }
            ScriptKind::P2wpkh => InputSpec::P2wpkh {
                witness_utxo: utxo.txout(),
            },
            ScriptKind::P2wsh => InputSpec::P2wsh {
                witness_utxo: utxo.txout(),
                witness_script: checked_witness_script(utxo, &utxo.script_pubkey)?,
            },
            ScriptKind::P2tr => InputSpec::P2tr {
                witness_utxo: utxo.txout(),
                tap_internal_key: staker_key
                    .filter(|key| ScriptBuf::new_p2tr(secp, *key, None) == utxo.script_pubkey),
            },
        };
        Ok(spec)
    }

    pub fn kind(&self) -> ScriptKind {
        match self {
            InputSpec::P2pkh { .. } => ScriptKind::P2pkh,
            InputSpec::P2sh { .. } => ScriptKind::P2sh,
            InputSpec::P2wpkh { .. } => ScriptKind::P2wpkh,
            InputSpec::P2wsh { .. } => ScriptKind::P2wsh,
            InputSpec::P2tr { .. } => ScriptKind::P2tr,
        }
    }

    /// Writes this spec into `input`.
    pub fn apply(self, input: &mut psbt::Input) {
        match self {
            InputSpec::P2pkh { non_witness_utxo } => {
                input.non_witness_utxo = Some(non_witness_utxo);
            }
            InputSpec::P2sh {
                non_witness_utxo,
                redeem_script,
                witness_utxo,
                witness_script,
            } => {
                input.non_witness_utxo = Some(non_witness_utxo);
                input.redeem_script = Some(redeem_script);
                input.witness_utxo = witness_utxo;
                input.witness_script = witness_script;
            }
            InputSpec::P2wpkh { witness_utxo } => {
                input.witness_utxo = Some(witness_utxo);
            }
            InputSpec::P2wsh {
                witness_utxo,
                witness_script,
            } => {
                input.witness_utxo = Some(witness_utxo);
                input.witness_script = Some(witness_script);
            }
            InputSpec::P2tr {
                witness_utxo,
                tap_internal_key,
            } => {
                input.witness_utxo = Some(witness_utxo);
                input.tap_internal_key = tap_internal_key;
            }
        }
    }
}

/// An input spending a staking protocol output through one of its leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPathSpend {
    pub outpoint: OutPoint,
    pub prevout: TxOut,
    pub leaf: LeafSpend,
}

/// Wraps `tx` in a PSBT and fills every input.
///
/// Inputs listed in `script_paths` get the witness UTXO and tapscript leaf; every other input
/// must be one of `utxos`.
pub fn assemble_psbt<C: Verification>(
    secp: &Secp256k1<C>,
    tx: Transaction,
    utxos: &[Utxo],
    script_paths: &[ScriptPathSpend],
    staker_key: Option<XOnlyPublicKey>,
) -> Result<Psbt, PsbtError> {
    let mut psbt = Psbt::from_unsigned_tx(tx)?;

    for (index, (txin, input)) in psbt
        .unsigned_tx
        .input
        .iter()
        .zip(psbt.inputs.iter_mut())
        .enumerate()
    {
        let outpoint = txin.previous_output;
        if let Some(spend) = script_paths.iter().find(|s| s.outpoint == outpoint) {
            input.witness_utxo = Some(spend.prevout.clone());
            input.tap_scripts.insert(
                spend.leaf.control_block.clone(),
                (spend.leaf.script.clone(), LeafVersion::TapScript),
            );
            continue;
        }

        let utxo = utxos
            .iter()
            .find(|utxo| utxo.outpoint() == outpoint)
            .ok_or(PsbtError::MissingUtxo { index })?;
        let spec = InputSpec::from_utxo(secp, utxo, staker_key)?;
        debug!(index, kind = ?spec.kind(), %outpoint, "filled psbt input");
        spec.apply(input);
    }

    Ok(psbt)
}

fn checked_raw_tx(utxo: &Utxo) -> Result<Transaction, PsbtError> {
    let (txid, vout) = (utxo.txid, utxo.vout);
    let raw = utxo
        .raw_tx_hex
        .as_deref()
        .ok_or(PsbtError::MissingRawTx { txid, vout })?;
    let bytes = hex::decode(raw).map_err(|e| PsbtError::InvalidRawTx {
        txid,
        reason: e.to_string(),
    })?;
    let tx: Transaction = consensus::deserialize(&bytes).map_err(|e| PsbtError::InvalidRawTx {
        txid,
        reason: e.to_string(),
    })?;

    let mismatch = |field: &'static str| PsbtError::RawTxMismatch { txid, vout, field };
    if tx.compute_txid() != txid {
        return Err(mismatch("txid"));
    }
    let output = tx.output.get(vout as usize).ok_or_else(|| mismatch("vout"))?;
    if output.script_pubkey != utxo.script_pubkey {
        return Err(mismatch("script pubkey"));
    }
    if output.value != utxo.value {
        return Err(mismatch("value"));
    }

    Ok(tx)
}

/// The UTXO's witness script, which must hash to the P2WSH program `program`.
fn checked_witness_script(utxo: &Utxo, program: &ScriptBuf) -> Result<ScriptBuf, PsbtError> {
    let (txid, vout) = (utxo.txid, utxo.vout);
    let witness_script = utxo
        .witness_script
        .clone()
        .ok_or(PsbtError::MissingWitnessScript { txid, vout })?;
    if &ScriptBuf::new_p2wsh(&witness_script.wscript_hash()) != program {
        return Err(PsbtError::WitnessScriptMismatch { txid, vout });
    }
    Ok(witness_script)
}
