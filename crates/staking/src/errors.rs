//! Error types for script derivation, funding, PSBT assembly and signed-PSBT checks.

use std::fmt;

use bitcoin::{
    Amount, ScriptBuf, Txid, XOnlyPublicKey, psbt, script::PushBytesError,
    taproot::TaprootBuilderError,
};
use btc_staking_params::ParamsError;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type StakingResult<T> = Result<T, StakingError>;

/// The transaction a builder was producing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Staking,
    Unbonding,
    Slashing,
    Withdrawal,
    StakingExpansion,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxKind::Staking => "staking",
            TxKind::Unbonding => "unbonding",
            TxKind::Slashing => "slashing",
            TxKind::Withdrawal => "withdrawal",
            TxKind::StakingExpansion => "staking expansion",
        };
        f.write_str(name)
    }
}

/// Top-level error returned by every public operation.
#[derive(Debug, Error)]
pub enum StakingError {
    /// Caller-supplied values failed validation before any construction started.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid staking params: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("script construction failed: {0}")]
    Script(#[from] ScriptError),

    #[error(transparent)]
    InsufficientFunds(#[from] FundsError),

    #[error("psbt input validation failed: {0}")]
    Psbt(#[from] PsbtError),

    #[error("covenant witness composition failed: {0}")]
    Covenant(#[from] CovenantError),

    #[error("signed psbt rejected: {0}")]
    Integrity(#[from] IntegrityError),

    /// A lower-level failure raised while a builder was assembling a transaction.
    #[error("failed to build {kind} transaction: {source}")]
    BuildTransaction {
        kind: TxKind,
        #[source]
        source: Box<StakingError>,
    },
}

impl StakingError {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        StakingError::InvalidInput(msg.into())
    }

    /// Wraps `source` as a failure of the `kind` builder.
    pub(crate) fn build(kind: TxKind, source: StakingError) -> Self {
        StakingError::BuildTransaction {
            kind,
            source: Box::new(source),
        }
    }

    /// Strips any [`StakingError::BuildTransaction`] layers.
    pub fn root_cause(&self) -> &StakingError {
        match self {
            StakingError::BuildTransaction { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Failures while compiling staking scripts or their taproot trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("at least one finality provider key is required")]
    NoFinalityProviders,

    #[error("multisig requires at least one key")]
    EmptyKeySet,

    #[error("threshold {threshold} is out of range for {keys} keys")]
    ThresholdOutOfRange { threshold: usize, keys: usize },

    #[error("duplicate key {0}")]
    DuplicateKey(XOnlyPublicKey),

    #[error("{0} timelock must be positive")]
    ZeroTimelock(&'static str),

    /// The data-embed payload has room for exactly one finality provider.
    #[error("data embed script takes exactly one finality provider, got {0}")]
    DataEmbedFinalityProviders(usize),

    #[error("data embed payload: {0}")]
    Push(#[from] PushBytesError),

    #[error("taproot builder: {0}")]
    Taproot(#[from] TaprootBuilderError),

    #[error("taproot tree is incomplete")]
    IncompleteTree,

    #[error("leaf {0} is not part of the taproot tree")]
    MissingLeaf(ScriptBuf),
}

/// Coin selection and output value failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundsError {
    /// None of the candidate UTXOs has a supported script type.
    #[error("no valid utxos available for funding")]
    NoValidUtxos,

    #[error("insufficient funds: required {required}, available {available}")]
    Insufficient { required: Amount, available: Amount },

    #[error("{output} output value {value} is below the dust threshold")]
    BelowDust { output: &'static str, value: Amount },

    #[error("fee computation overflowed")]
    FeeOverflow,
}

/// A UTXO could not be turned into a PSBT input.
#[derive(Debug, Error)]
pub enum PsbtError {
    #[error("unsupported script type {0}")]
    UnsupportedScript(ScriptBuf),

    #[error("input {index} has no matching utxo")]
    MissingUtxo { index: usize },

    #[error("utxo {txid}:{vout} requires the raw previous transaction")]
    MissingRawTx { txid: Txid, vout: u32 },

    #[error("raw transaction for {txid} is malformed: {reason}")]
    InvalidRawTx { txid: Txid, reason: String },

    /// The raw previous transaction disagrees with the UTXO it was supplied for.
    #[error("raw transaction for {txid}:{vout} does not match utxo {field}")]
    RawTxMismatch {
        txid: Txid,
        vout: u32,
        field: &'static str,
    },

    #[error("utxo {txid}:{vout} requires a redeem script")]
    MissingRedeemScript { txid: Txid, vout: u32 },

    #[error("redeem script does not hash to the script pubkey of {txid}:{vout}")]
    RedeemScriptMismatch { txid: Txid, vout: u32 },

    #[error("utxo {txid}:{vout} requires a witness script")]
    MissingWitnessScript { txid: Txid, vout: u32 },

    #[error("witness script does not hash to the script pubkey of {txid}:{vout}")]
    WitnessScriptMismatch { txid: Txid, vout: u32 },

    #[error(transparent)]
    Psbt(#[from] psbt::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CovenantError {
    #[error("signature from {0} who is not a covenant member")]
    UnknownSigner(XOnlyPublicKey),

    #[error("more than one signature from covenant member {0}")]
    DuplicateSignature(XOnlyPublicKey),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// A signed or pre-signed transaction diverges from what was built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    Field {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{field} mismatch at index {index}: expected {expected}, got {actual}")]
    Indexed {
        field: &'static str,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("input {0} is not finalized")]
    NotFinalized(usize),

    #[error("input {0} signals replaceability")]
    Replaceable(usize),

    #[error("input {0} has a non-empty script sig")]
    NonEmptyScriptSig(usize),
}

impl IntegrityError {
    pub(crate) fn field(
        field: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        IntegrityError::Field {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn indexed(
        field: &'static str,
        index: usize,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        IntegrityError::Indexed {
            field,
            index,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
