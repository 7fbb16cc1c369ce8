use std::collections::BTreeSet;

use bitcoin::{Amount, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

use crate::{
    DUST_THRESHOLD, errors::ParamsError, serde_helpers::serde_amount_sat, slashing::SlashingParams,
    tag::StakingTag,
};

/// Protocol parameters a staking delegation is built against.
///
/// Instances are plain data; call [`StakingParams::validate`] (or load them through a
/// [`ParamsRegistry`](crate::ParamsRegistry), which does so) before handing them to a builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakingParams {
    /// Covenant committee keys, in any order.
    pub covenant_pks: Vec<XOnlyPublicKey>,

    /// Number of covenant signatures required to unbond or slash.
    pub covenant_quorum: u32,

    /// Relative timelock of the unbonding and slashing change outputs.
    pub unbonding_time_blocks: u16,

    /// Fixed fee paid by every unbonding transaction.
    #[serde(with = "serde_amount_sat", rename = "unbonding_fee_sat")]
    pub unbonding_fee: Amount,

    #[serde(with = "serde_amount_sat", rename = "min_staking_amount_sat")]
    pub min_staking_amount: Amount,

    #[serde(with = "serde_amount_sat", rename = "max_staking_amount_sat")]
    pub max_staking_amount: Amount,

    pub min_staking_time_blocks: u16,

    pub max_staking_time_blocks: u16,

    #[serde(default)]
    pub slashing: Option<SlashingParams>,

    /// Present for observable staking, where the staking transaction carries a data-embed
    /// output.
    #[serde(default)]
    pub tag: Option<StakingTag>,
}

impl StakingParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.covenant_pks.is_empty() {
            return Err(ParamsError::EmptyCovenant);
        }
        if self.covenant_quorum == 0 || self.covenant_quorum as usize > self.covenant_pks.len() {
            return Err(ParamsError::QuorumOutOfRange {
                quorum: self.covenant_quorum,
                committee: self.covenant_pks.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for pk in &self.covenant_pks {
            if !seen.insert(pk.serialize()) {
                return Err(ParamsError::DuplicateCovenantKey(*pk));
            }
        }

        if self.unbonding_time_blocks == 0 {
            return Err(ParamsError::NonPositive("unbonding_time_blocks"));
        }
        if self.unbonding_fee == Amount::ZERO {
            return Err(ParamsError::NonPositive("unbonding_fee_sat"));
        }
        if self.min_staking_time_blocks == 0 {
            return Err(ParamsError::NonPositive("min_staking_time_blocks"));
        }
        if self.max_staking_time_blocks < self.min_staking_time_blocks {
            return Err(ParamsError::StakingTimeRange {
                min: self.min_staking_time_blocks,
                max: self.max_staking_time_blocks,
            });
        }
        if self.max_staking_amount < self.min_staking_amount {
            return Err(ParamsError::StakingAmountRange {
                min: self.min_staking_amount,
                max: self.max_staking_amount,
            });
        }

        let floor = self
            .unbonding_fee
            .checked_add(DUST_THRESHOLD)
            .ok_or(ParamsError::NonPositive("unbonding_fee_sat"))?;
        if self.min_staking_amount < floor {
            return Err(ParamsError::MinStakingBelowUnbondingFee {
                min: self.min_staking_amount,
                unbonding_fee: self.unbonding_fee,
                dust: DUST_THRESHOLD,
            });
        }

        if let Some(slashing) = &self.slashing {
            slashing.validate()?;
        }

        Ok(())
    }

    pub fn is_observable(&self) -> bool {
        self.tag.is_some()
    }
}

/// A [`StakingParams`] set together with the version and BTC height it activates at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedStakingParams {
    pub version: u32,

    pub btc_activation_height: u32,

    #[serde(flatten)]
    pub params: StakingParams,
}

impl VersionedStakingParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.params
            .validate()
            .map_err(|e| ParamsError::InvalidVersion {
                version: self.version,
                source: Box::new(e),
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bitcoin::{
        ScriptBuf,
        secp256k1::{Keypair, Secp256k1, SecretKey},
    };

    use super::*;
    use crate::SlashingRate;

    pub(crate) fn xonly(seed: u8) -> XOnlyPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        XOnlyPublicKey::from_keypair(&Keypair::from_secret_key(&secp, &sk)).0
    }

    pub(crate) fn sample_params() -> StakingParams {
        StakingParams {
            covenant_pks: vec![xonly(11), xonly(12), xonly(13)],
            covenant_quorum: 2,
            unbonding_time_blocks: 1_008,
            unbonding_fee: Amount::from_sat(32_000),
            min_staking_amount: Amount::from_sat(50_000),
            max_staking_amount: Amount::from_sat(35_000_000),
            min_staking_time_blocks: 64_000,
            max_staking_time_blocks: 64_000,
            slashing: Some(SlashingParams {
                slashing_pk_script: ScriptBuf::from_hex(
                    "0014f87283ca2ab20a1ca0c2e9a2a0bb6a9d3c5e3dd0",
                )
                .unwrap(),
                slashing_rate: SlashingRate::new(0.1).unwrap(),
                min_slashing_tx_fee: Amount::from_sat(1_000),
            }),
            tag: None,
        }
    }

    #[test]
    fn test_sample_params_are_valid() {
        sample_params().validate().unwrap();
    }

    #[test]
    fn test_quorum_checks() {
        let mut params = sample_params();
        params.covenant_quorum = 0;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::QuorumOutOfRange { quorum: 0, .. })
        ));

        params.covenant_quorum = 4;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::QuorumOutOfRange {
                quorum: 4,
                committee: 3
            })
        ));

        params.covenant_pks.clear();
        assert_eq!(params.validate(), Err(ParamsError::EmptyCovenant));
    }

    #[test]
    fn test_duplicate_covenant_key() {
        let mut params = sample_params();
        params.covenant_pks.push(xonly(12));
        assert_eq!(
            params.validate(),
            Err(ParamsError::DuplicateCovenantKey(xonly(12)))
        );
    }

    #[test]
    fn test_amount_and_time_ranges() {
        let mut params = sample_params();
        params.max_staking_amount = Amount::from_sat(49_999);
        assert!(matches!(
            params.validate(),
            Err(ParamsError::StakingAmountRange { .. })
        ));

        let mut params = sample_params();
        params.max_staking_time_blocks = 63_999;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::StakingTimeRange { .. })
        ));

        let mut params = sample_params();
        params.unbonding_time_blocks = 0;
        assert_eq!(
            params.validate(),
            Err(ParamsError::NonPositive("unbonding_time_blocks"))
        );
    }

    #[test]
    fn test_min_staking_must_cover_unbonding_fee_and_dust() {
        let mut params = sample_params();
        params.min_staking_amount = Amount::from_sat(32_546);
        params.validate().unwrap();

        params.min_staking_amount = Amount::from_sat(32_545);
        assert!(matches!(
            params.validate(),
            Err(ParamsError::MinStakingBelowUnbondingFee { .. })
        ));
    }

    #[test]
    fn test_slashing_params_checked() {
        let mut params = sample_params();
        params.slashing.as_mut().unwrap().min_slashing_tx_fee = Amount::ZERO;
        assert_eq!(
            params.validate(),
            Err(ParamsError::NonPositive("min_slashing_tx_fee_sat"))
        );

        let mut params = sample_params();
        params.slashing.as_mut().unwrap().slashing_pk_script = ScriptBuf::new();
        assert_eq!(params.validate(), Err(ParamsError::EmptySlashingScript));
    }

    #[test]
    fn test_versioned_error_names_version() {
        let mut params = sample_params();
        params.covenant_quorum = 0;
        let versioned = VersionedStakingParams {
            version: 3,
            btc_activation_height: 100,
            params,
        };
        let err = versioned.validate().unwrap_err();
        assert!(matches!(err, ParamsError::InvalidVersion { version: 3, .. }));
    }
}
