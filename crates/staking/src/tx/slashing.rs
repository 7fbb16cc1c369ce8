use bitcoin::{
    Amount, Network, OutPoint, Transaction, TxOut,
    absolute::LockTime,
    secp256k1::{Secp256k1, Verification},
};
use btc_staking_params::{DUST_THRESHOLD, SlashingParams};
use tracing::debug;

use super::{TransactionResult, make_txin, spent_output};
use crate::{
    constants::{PRE_SIGNED_SEQUENCE, STAKING_TX_VERSION},
    errors::{FundsError, StakingError, StakingResult, TxKind},
    scripts::StakingScripts,
    taproot::{
        TaprootOutput, derive_slashing_change_output, derive_staking_output,
        derive_unbonding_output,
    },
};

/// Which output a slashing transaction spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashingSource {
    /// The staking output of a staking transaction.
    Staking,
    /// The output of an unbonding transaction.
    Unbonding,
}

impl SlashingSource {
    /// The taproot tree of the spent output.
    pub fn output<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        scripts: &StakingScripts,
        network: Network,
    ) -> StakingResult<TaprootOutput> {
        let output = match self {
            SlashingSource::Staking => derive_staking_output(secp, scripts, network)?,
            SlashingSource::Unbonding => derive_unbonding_output(secp, scripts, network)?,
        };
        Ok(output)
    }
}

/// Builds a slashing transaction spending output `vout` of `source_tx` through the slashing leaf.
///
/// Output 0 sends `floor(value * slashing_rate)` to the slashing script. Output 1 returns
/// `value - slashed - min_slashing_tx_fee` to the staker under the unbonding timelock. Both
/// outputs must be above dust.
pub fn build_slashing_tx<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    scripts: &StakingScripts,
    source: SlashingSource,
    source_tx: &Transaction,
    vout: u32,
    slashing: &SlashingParams,
) -> StakingResult<TransactionResult> {
    slashing.validate()?;

    build(secp, network, scripts, source, source_tx, vout, slashing)
        .map_err(|e| StakingError::build(TxKind::Slashing, e))
}

fn build<C: Verification>(
    secp: &Secp256k1<C>,
    network: Network,
    scripts: &StakingScripts,
    source: SlashingSource,
    source_tx: &Transaction,
    vout: u32,
    slashing: &SlashingParams,
) -> StakingResult<TransactionResult> {
    let spent_tree = source.output(secp, scripts, network)?;
    let spent = spent_output(source_tx, vout, &spent_tree.script_pubkey())?;

    let slashed = slashing.slashing_rate.apply(spent.value);
    if slashed <= DUST_THRESHOLD {
        return Err(FundsError::BelowDust {
            output: "slashing",
            value: slashed,
        }
        .into());
    }

    let change = spent
        .value
        .checked_sub(slashed)
        .and_then(|rest| rest.checked_sub(slashing.min_slashing_tx_fee))
        .unwrap_or(Amount::ZERO);
    if change <= DUST_THRESHOLD {
        return Err(FundsError::BelowDust {
            output: "slashing change",
            value: change,
        }
        .into());
    }

    let change_output = derive_slashing_change_output(secp, scripts, network)?;
    let transaction = Transaction {
        version: STAKING_TX_VERSION,
        lock_time: LockTime::ZERO,
        input: vec![make_txin(
            OutPoint::new(source_tx.compute_txid(), vout),
            PRE_SIGNED_SEQUENCE,
        )],
        output: vec![
            TxOut {
                value: slashed,
                script_pubkey: slashing.slashing_pk_script.clone(),
            },
            TxOut {
                value: change,
                script_pubkey: change_output.script_pubkey(),
            },
        ],
    };
    debug!(
        txid = %transaction.compute_txid(),
        ?source,
        %slashed,
        %change,
        "built slashing transaction"
    );

    Ok(TransactionResult {
        transaction,
        fee: spent.value - slashed - change,
    })
}

#[cfg(test)]
mod tests {
    use bitcoin::ScriptBuf;
    use btc_staking_params::SlashingRate;

    use super::*;
    use crate::{
        test_utils::{NETWORK, sample_scripts, staking_tx},
        tx::build_unbonding_tx,
    };

    fn slashing_params(rate: f64) -> SlashingParams {
        SlashingParams {
            slashing_pk_script: ScriptBuf::from_hex("0014f87283ca2ab20a1ca0c2e9a2a0bb6a9d3c5e3dd0")
                .unwrap(),
            slashing_rate: SlashingRate::new(rate).unwrap(),
            min_slashing_tx_fee: Amount::from_sat(1_000),
        }
    }

    #[test]
    fn test_slash_staking_output() {
        let secp = Secp256k1::verification_only();
        let scripts = sample_scripts();
        let staking_tx = staking_tx(&secp, &scripts, 500_000);
        let params = slashing_params(0.1);

        let result = build_slashing_tx(
            &secp,
            NETWORK,
            &scripts,
            SlashingSource::Staking,
            &staking_tx,
            0,
            &params,
        )
        .unwrap();
        let tx = &result.transaction;

        assert_eq!(tx.input[0].sequence, PRE_SIGNED_SEQUENCE);
        assert_eq!(tx.lock_time, LockTime::ZERO);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
        assert_eq!(tx.output[0].script_pubkey, params.slashing_pk_script);
        assert_eq!(tx.output[1].value, Amount::from_sat(449_000));

        let change = derive_slashing_change_output(&secp, &scripts, NETWORK).unwrap();
        assert_eq!(tx.output[1].script_pubkey, change.script_pubkey());
        assert_eq!(result.fee, Amount::from_sat(1_000));
    }

    #[test]
    fn test_slash_unbonding_output() {
        let secp = Secp256k1::verification_only();
        let scripts = sample_scripts();
        let staking_tx = staking_tx(&secp, &scripts, 500_000);
        let unbonding_tx = build_unbonding_tx(
            &secp,
            NETWORK,
            &scripts,
            &staking_tx,
            0,
            Amount::from_sat(32_000),
        )
        .unwrap()
        .transaction;

        let result = build_slashing_tx(
            &secp,
            NETWORK,
            &scripts,
            SlashingSource::Unbonding,
            &unbonding_tx,
            0,
            &slashing_params(0.1),
        )
        .unwrap();

        assert_eq!(result.transaction.output[0].value, Amount::from_sat(46_800));
        assert_eq!(result.transaction.output[1].value, Amount::from_sat(420_200));
        assert_eq!(
            result.transaction.input[0].previous_output.txid,
            unbonding_tx.compute_txid()
        );
    }

    #[test]
    fn test_source_must_match_tree() {
        let secp = Secp256k1::verification_only();
        let scripts = sample_scripts();
        let staking_tx = staking_tx(&secp, &scripts, 500_000);

        let err = build_slashing_tx(
            &secp,
            NETWORK,
            &scripts,
            SlashingSource::Unbonding,
            &staking_tx,
            0,
            &slashing_params(0.1),
        )
        .unwrap_err();
        assert!(matches!(err.root_cause(), StakingError::InvalidInput(_)));
    }

    #[test]
    fn test_dust_change_rejected() {
        let secp = Secp256k1::verification_only();
        let scripts = sample_scripts();
        let staking_tx = staking_tx(&secp, &scripts, 500_000);

        let err = build_slashing_tx(
            &secp,
            NETWORK,
            &scripts,
            SlashingSource::Staking,
            &staking_tx,
            0,
            &slashing_params(1.0),
        )
        .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            StakingError::InsufficientFunds(FundsError::BelowDust {
                output: "slashing change",
                ..
            })
        ));
    }

    #[test]
    fn test_dust_slash_rejected() {
        let secp = Secp256k1::verification_only();
        let scripts = sample_scripts();
        let staking_tx = staking_tx(&secp, &scripts, 5_000);

        let err = build_slashing_tx(
            &secp,
            NETWORK,
            &scripts,
            SlashingSource::Staking,
            &staking_tx,
            0,
            &slashing_params(0.1),
        )
        .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            StakingError::InsufficientFunds(FundsError::BelowDust {
                output: "slashing",
                ..
            })
        ));
    }
}
