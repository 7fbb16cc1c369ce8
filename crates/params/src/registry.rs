use tracing::debug;

use crate::{errors::ParamsError, params::VersionedStakingParams};

/// All known versions of the staking parameters, ordered by activation height.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamsRegistry {
    versions: Vec<VersionedStakingParams>,
}

impl ParamsRegistry {
    /// Validates every version and checks that versions and activation heights are strictly
    /// increasing.
    pub fn new(versions: Vec<VersionedStakingParams>) -> Result<Self, ParamsError> {
        if versions.is_empty() {
            return Err(ParamsError::EmptyRegistry);
        }

        for v in &versions {
            v.validate()?;
        }
        for pair in versions.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.version <= prev.version
                || next.btc_activation_height <= prev.btc_activation_height
            {
                return Err(ParamsError::OutOfOrderVersion {
                    version: next.version,
                });
            }
        }

        debug!(versions = versions.len(), "loaded staking params");
        Ok(Self { versions })
    }

    /// Parses a JSON array of [`VersionedStakingParams`].
    pub fn from_json_str(json: &str) -> Result<Self, ParamsError> {
        let versions: Vec<VersionedStakingParams> =
            serde_json::from_str(json).map_err(|e| ParamsError::Json(e.to_string()))?;
        Self::new(versions)
    }

    pub fn by_version(&self, version: u32) -> Result<&VersionedStakingParams, ParamsError> {
        self.versions
            .iter()
            .find(|v| v.version == version)
            .ok_or(ParamsError::UnknownVersion(version))
    }

    /// Returns the params with the greatest activation height that is not above `height`.
    pub fn for_height(&self, height: u32) -> Result<&VersionedStakingParams, ParamsError> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.btc_activation_height <= height)
            .ok_or(ParamsError::NoParamsForHeight(height))
    }

    pub fn latest(&self) -> &VersionedStakingParams {
        // non-empty by construction
        &self.versions[self.versions.len() - 1]
    }

    pub fn versions(&self) -> &[VersionedStakingParams] {
        &self.versions
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::params::tests::{sample_params, xonly};

    fn versioned(version: u32, height: u32) -> VersionedStakingParams {
        VersionedStakingParams {
            version,
            btc_activation_height: height,
            params: sample_params(),
        }
    }

    #[test]
    fn test_lookup_by_height() {
        let registry =
            ParamsRegistry::new(vec![versioned(0, 100), versioned(1, 200), versioned(2, 300)])
                .unwrap();

        assert_eq!(
            registry.for_height(99),
            Err(ParamsError::NoParamsForHeight(99))
        );
        assert_eq!(registry.for_height(100).unwrap().version, 0);
        assert_eq!(registry.for_height(199).unwrap().version, 0);
        assert_eq!(registry.for_height(200).unwrap().version, 1);
        assert_eq!(registry.for_height(1_000_000).unwrap().version, 2);
        assert_eq!(registry.latest().version, 2);
    }

    #[test]
    fn test_lookup_by_version() {
        let registry = ParamsRegistry::new(vec![versioned(0, 100), versioned(1, 200)]).unwrap();
        assert_eq!(registry.by_version(1).unwrap().btc_activation_height, 200);
        assert_eq!(registry.by_version(7), Err(ParamsError::UnknownVersion(7)));
    }

    #[test]
    fn test_rejects_out_of_order_versions() {
        assert_eq!(
            ParamsRegistry::new(vec![versioned(1, 100), versioned(1, 200)]),
            Err(ParamsError::OutOfOrderVersion { version: 1 })
        );
        assert_eq!(
            ParamsRegistry::new(vec![versioned(0, 200), versioned(1, 200)]),
            Err(ParamsError::OutOfOrderVersion { version: 1 })
        );
        assert_eq!(ParamsRegistry::new(vec![]), Err(ParamsError::EmptyRegistry));
    }

    #[test]
    fn test_rejects_invalid_version() {
        let mut bad = versioned(1, 200);
        bad.params.covenant_quorum = 9;
        let err = ParamsRegistry::new(vec![versioned(0, 100), bad]).unwrap_err();
        assert!(matches!(err, ParamsError::InvalidVersion { version: 1, .. }));
    }

    #[test]
    fn test_from_json() {
        let doc = json!([
            {
                "version": 0,
                "btc_activation_height": 857_910,
                "covenant_pks": [xonly(11).to_string(), xonly(12).to_string(), xonly(13).to_string()],
                "covenant_quorum": 2,
                "unbonding_time_blocks": 1_008,
                "unbonding_fee_sat": 32_000,
                "min_staking_amount_sat": 500_000,
                "max_staking_amount_sat": 5_000_000,
                "min_staking_time_blocks": 64_000,
                "max_staking_time_blocks": 64_000,
                "tag": "62626e31"
            },
            {
                "version": 1,
                "btc_activation_height": 864_790,
                "covenant_pks": [xonly(11).to_string(), xonly(12).to_string(), xonly(13).to_string()],
                "covenant_quorum": 2,
                "unbonding_time_blocks": 1_008,
                "unbonding_fee_sat": 32_000,
                "min_staking_amount_sat": 500_000,
                "max_staking_amount_sat": 50_000_000_000u64,
                "min_staking_time_blocks": 64_000,
                "max_staking_time_blocks": 64_000,
                "slashing": {
                    "slashing_pk_script": "0014f87283ca2ab20a1ca0c2e9a2a0bb6a9d3c5e3dd0",
                    "slashing_rate": 0.1,
                    "min_slashing_tx_fee_sat": 1_000
                }
            }
        ]);

        let registry = ParamsRegistry::from_json_str(&doc.to_string()).unwrap();
        let v0 = registry.by_version(0).unwrap();
        assert!(v0.params.is_observable());
        assert!(v0.params.slashing.is_none());
        assert_eq!(v0.params.covenant_pks[1], xonly(12));

        let v1 = registry.for_height(900_000).unwrap();
        assert_eq!(v1.version, 1);
        let slashing = v1.params.slashing.as_ref().unwrap();
        assert_eq!(slashing.slashing_rate.as_f64(), 0.1);
        assert_eq!(slashing.min_slashing_tx_fee.to_sat(), 1_000);
        assert!(!v1.params.is_observable());
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            ParamsRegistry::from_json_str("{\"version\": 0}"),
            Err(ParamsError::Json(_))
        ));
    }
}
