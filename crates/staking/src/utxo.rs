use bitcoin::{Amount, OutPoint, Script, ScriptBuf, TxOut, Txid};
use btc_staking_params::serde_helpers::serde_amount_sat;
use serde::{Deserialize, Serialize};

/// A spendable output supplied by the staker's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    #[serde(with = "serde_amount_sat", rename = "value_sat")]
    pub value: Amount,
    pub script_pubkey: ScriptBuf,

    /// Hex of the full previous transaction, required for legacy inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tx_hex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeem_script: Option<ScriptBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_script: Option<ScriptBuf>,
}

impl Utxo {
    pub fn new(txid: Txid, vout: u32, value: Amount, script_pubkey: ScriptBuf) -> Self {
        Self {
            txid,
            vout,
            value,
            script_pubkey,
            raw_tx_hex: None,
            redeem_script: None,
            witness_script: None,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    pub fn txout(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
        }
    }

    /// The script type of this UTXO, or `None` when it is not one the builders can spend.
    pub fn kind(&self) -> Option<ScriptKind> {
        ScriptKind::classify(&self.script_pubkey)
    }
}

/// Output script types accepted as staking funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl ScriptKind {
    pub fn classify(script: &Script) -> Option<Self> {
        if script.is_p2pkh() {
            Some(ScriptKind::P2pkh)
        } else if script.is_p2sh() {
            Some(ScriptKind::P2sh)
        } else if script.is_p2wpkh() {
            Some(ScriptKind::P2wpkh)
        } else if script.is_p2wsh() {
            Some(ScriptKind::P2wsh)
        } else if script.is_p2tr() {
            Some(ScriptKind::P2tr)
        } else {
            None
        }
    }
}
