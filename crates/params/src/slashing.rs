use bitcoin::{Amount, ScriptBuf};
use serde::{Deserialize, Serialize};

use crate::{errors::ParamsError, serde_helpers::serde_amount_sat};

/// Fixed-point scale used when applying a [`SlashingRate`] to an amount.
const RATE_SCALE: u128 = 100_000_000;

/// Fraction of a stake that is burned on slashing, in `(0, 1]`.
///
/// Applying the rate goes through a fixed-point representation with eight decimal places so
/// that `floor(amount * rate)` does not pick up binary floating point drift (`0.29 * 100` must be
/// `29`, not `28`).
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SlashingRate(f64);

impl SlashingRate {
    pub fn new(rate: f64) -> Result<Self, ParamsError> {
        if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
            return Err(ParamsError::InvalidSlashingRate(rate));
        }
        Ok(Self(rate))
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// Returns `floor(amount * rate)`.
    pub fn apply(&self, amount: Amount) -> Amount {
        let scaled_rate = (self.0 * RATE_SCALE as f64).round() as u128;
        let slashed = amount.to_sat() as u128 * scaled_rate / RATE_SCALE;
        // rate <= 1, so the result never exceeds `amount`
        Amount::from_sat(slashed as u64)
    }
}

impl TryFrom<f64> for SlashingRate {
    type Error = ParamsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SlashingRate> for f64 {
    fn from(value: SlashingRate) -> Self {
        value.0
    }
}

/// Parameters of the slashing transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Script the slashed portion of the stake is paid to.
    pub slashing_pk_script: ScriptBuf,

    pub slashing_rate: SlashingRate,

    /// Fee every slashing transaction pays, deducted from the change output.
    #[serde(with = "serde_amount_sat", rename = "min_slashing_tx_fee_sat")]
    pub min_slashing_tx_fee: Amount,
}

impl SlashingParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.slashing_pk_script.is_empty() {
            return Err(ParamsError::EmptySlashingScript);
        }
        if self.min_slashing_tx_fee == Amount::ZERO {
            return Err(ParamsError::NonPositive("min_slashing_tx_fee_sat"));
        }
        Ok(())
    }
}
