//! Errors raised while validating or looking up staking parameters.

use bitcoin::{Amount, XOnlyPublicKey};
use thiserror::Error;

/// Reasons a set of staking parameters is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    /// The covenant committee has no members.
    #[error("covenant committee is empty")]
    EmptyCovenant,

    /// The quorum is zero or larger than the committee.
    #[error("covenant quorum {quorum} is out of range for a committee of {committee}")]
    QuorumOutOfRange { quorum: u32, committee: usize },

    /// The same key appears twice in the covenant committee.
    #[error("duplicate covenant key {0}")]
    DuplicateCovenantKey(XOnlyPublicKey),

    /// A field that must be strictly positive is zero.
    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("max staking amount {max} is below min staking amount {min}")]
    StakingAmountRange { min: Amount, max: Amount },

    #[error("max staking time {max} is below min staking time {min}")]
    StakingTimeRange { min: u16, max: u16 },

    /// The minimum stake cannot pay the unbonding fee and still leave a non-dust output.
    #[error("min staking amount {min} must cover unbonding fee {unbonding_fee} plus dust {dust}")]
    MinStakingBelowUnbondingFee {
        min: Amount,
        unbonding_fee: Amount,
        dust: Amount,
    },

    #[error("slashing rate {0} is outside (0, 1]")]
    InvalidSlashingRate(f64),

    #[error("slashing pk script is empty")]
    EmptySlashingScript,

    #[error("invalid staking tag: {0}")]
    InvalidTag(String),

    #[error("unknown params version {0}")]
    UnknownVersion(u32),

    #[error("no params are active at btc height {0}")]
    NoParamsForHeight(u32),

    #[error("params registry is empty")]
    EmptyRegistry,

    /// Versions must be strictly increasing in both version number and activation height.
    #[error("params version {version} is out of order")]
    OutOfOrderVersion { version: u32 },

    #[error("params version {version}: {source}")]
    InvalidVersion {
        version: u32,
        #[source]
        source: Box<ParamsError>,
    },

    #[error("malformed params json: {0}")]
    Json(String),
}
