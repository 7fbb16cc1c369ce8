//! The staker-facing entry point tying params, scripts, builders and PSBT assembly together.

use bitcoin::{
    Address, Amount, Network, ScriptBuf, Transaction, XOnlyPublicKey,
    address::NetworkUnchecked,
    secp256k1::{Secp256k1, Verification},
};
use btc_staking_params::{StakingParams, VersionedStakingParams, serde_helpers::serde_amount_sat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    errors::{StakingError, StakingResult, TxKind},
    psbt::{ScriptPathSpend, assemble_psbt},
    scripts::{StakingScriptData, StakingScripts},
    taproot::{TaprootOutput, derive_staking_output, derive_unbonding_output},
    tx::{
        ExpansionRequest, Funding, PsbtResult, SlashingSource, TransactionResult,
        WithdrawalSource, build_expansion_tx, build_slashing_tx, build_staking_tx,
        build_unbonding_tx, build_withdrawal_tx, check_pre_signed_tx, find_output,
    },
    utxo::Utxo,
};

/// The staker's funding address and the key its scripts commit to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerInfo {
    /// Receives change and withdrawals.
    pub address: Address<NetworkUnchecked>,
    pub public_key: XOnlyPublicKey,
}

/// What a staker wants to stake, before params are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingInput {
    pub finality_provider_keys: Vec<XOnlyPublicKey>,
    #[serde(with = "serde_amount_sat", rename = "staking_amount_sat")]
    pub staking_amount: Amount,
    /// Blocks.
    pub staking_timelock: u16,
}

/// A stake being grown by a staking expansion.
#[derive(Debug, Clone, Copy)]
pub struct PreviousStake<'a> {
    pub input: &'a StakingInput,
    /// Params the previous stake was created under.
    pub params: &'a VersionedStakingParams,
    pub transaction: &'a Transaction,
}

/// Builds every transaction and PSBT of a staking position for one staker under one params
/// version.
#[derive(Debug, Clone)]
pub struct Staking<C: Verification> {
    secp: Secp256k1<C>,
    network: Network,
    staker_address: Address,
    staker_key: XOnlyPublicKey,
    params: VersionedStakingParams,
}

impl<C: Verification> Staking<C> {
    /// Fails if the params are invalid or the staker address belongs to another network.
    pub fn new(
        secp: Secp256k1<C>,
        network: Network,
        staker: StakerInfo,
        params: VersionedStakingParams,
    ) -> StakingResult<Self> {
        params.validate()?;
        let staker_address = staker.address.require_network(network).map_err(|e| {
            StakingError::invalid_input(format!("staker address is not for {network}: {e}"))
        })?;

        Ok(Self {
            secp,
            network,
            staker_address,
            staker_key: staker.public_key,
            params,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn params(&self) -> &VersionedStakingParams {
        &self.params
    }

    pub fn staker_address(&self) -> &Address {
        &self.staker_address
    }

    pub fn staker_key(&self) -> XOnlyPublicKey {
        self.staker_key
    }

    pub fn build_scripts(&self, input: &StakingInput) -> StakingResult<StakingScripts> {
        Ok(self.script_data(input)?.build_scripts()?)
    }

    pub fn staking_output(&self, input: &StakingInput) -> StakingResult<TaprootOutput> {
        let scripts = self.build_scripts(input)?;
        Ok(derive_staking_output(&self.secp, &scripts, self.network)?)
    }

    pub fn unbonding_output(&self, input: &StakingInput) -> StakingResult<TaprootOutput> {
        let scripts = self.build_scripts(input)?;
        Ok(derive_unbonding_output(&self.secp, &scripts, self.network)?)
    }

    /// Funds the staking output from `utxos`, returning change to the staker address.
    pub fn create_staking_transaction(
        &self,
        input: &StakingInput,
        utxos: &[Utxo],
        fee_rate: u64,
        lock_height: Option<u32>,
    ) -> StakingResult<TransactionResult> {
        let scripts = self.build_scripts(input)?;
        let change_script = self.staker_address.script_pubkey();

        build_staking_tx(
            &self.secp,
            self.network,
            &scripts,
            input.staking_amount,
            Funding {
                utxos,
                fee_rate,
                change_script: &change_script,
            },
            lock_height,
        )
    }

    pub fn create_staking_psbt(
        &self,
        input: &StakingInput,
        utxos: &[Utxo],
        fee_rate: u64,
        lock_height: Option<u32>,
    ) -> StakingResult<PsbtResult> {
        let result = self.create_staking_transaction(input, utxos, fee_rate, lock_height)?;
        let psbt = assemble_psbt(
            &self.secp,
            result.transaction,
            utxos,
            &[],
            Some(self.staker_key),
        )
        .map_err(|e| StakingError::build(TxKind::Staking, e.into()))?;

        Ok(PsbtResult {
            psbt,
            fee: result.fee,
        })
    }

    /// Unbonds the stake held by `staking_tx`, paying the params' unbonding fee.
    pub fn create_unbonding_transaction(
        &self,
        input: &StakingInput,
        staking_tx: &Transaction,
    ) -> StakingResult<TransactionResult> {
        let scripts = self.build_scripts(input)?;
        let (result, _) = self.unbonding(&scripts, staking_tx)?;
        Ok(result)
    }

    pub fn create_unbonding_psbt(
        &self,
        input: &StakingInput,
        staking_tx: &Transaction,
    ) -> StakingResult<PsbtResult> {
        let scripts = self.build_scripts(input)?;
        let (result, staking_output) = self.unbonding(&scripts, staking_tx)?;
        self.script_path_psbt(
            TxKind::Unbonding,
            result,
            staking_tx,
            &staking_output,
            &scripts.unbonding,
            &[],
        )
    }

    pub fn create_staking_output_slashing_psbt(
        &self,
        input: &StakingInput,
        staking_tx: &Transaction,
    ) -> StakingResult<PsbtResult> {
        self.slashing_psbt(input, SlashingSource::Staking, staking_tx)
    }

    pub fn create_unbonding_output_slashing_psbt(
        &self,
        input: &StakingInput,
        unbonding_tx: &Transaction,
    ) -> StakingResult<PsbtResult> {
        self.slashing_psbt(input, SlashingSource::Unbonding, unbonding_tx)
    }

    pub fn create_withdraw_staking_expired_psbt(
        &self,
        input: &StakingInput,
        staking_tx: &Transaction,
        fee_rate: u64,
    ) -> StakingResult<PsbtResult> {
        self.withdrawal_psbt(input, WithdrawalSource::StakingExpired, staking_tx, fee_rate)
    }

    pub fn create_withdraw_early_unbonded_psbt(
        &self,
        input: &StakingInput,
        unbonding_tx: &Transaction,
        fee_rate: u64,
    ) -> StakingResult<PsbtResult> {
        self.withdrawal_psbt(input, WithdrawalSource::EarlyUnbonded, unbonding_tx, fee_rate)
    }

    pub fn create_withdraw_slashing_psbt(
        &self,
        input: &StakingInput,
        slashing_tx: &Transaction,
        fee_rate: u64,
    ) -> StakingResult<PsbtResult> {
        self.withdrawal_psbt(input, WithdrawalSource::SlashingChange, slashing_tx, fee_rate)
    }

    /// Moves `previous` into a new, larger stake described by `input`, topping it up from
    /// `utxos`.
    pub fn create_staking_expansion_psbt(
        &self,
        input: &StakingInput,
        previous: PreviousStake<'_>,
        utxos: &[Utxo],
        fee_rate: u64,
    ) -> StakingResult<PsbtResult> {
        previous.params.validate()?;
        let next = self.script_data(input)?;
        let previous_data = self.script_data_for(previous.input, &previous.params.params)?;
        let previous_scripts = previous_data.build_scripts()?;
        let previous_output = derive_staking_output(&self.secp, &previous_scripts, self.network)?;
        let previous_vout = find_output(previous.transaction, &previous_output.script_pubkey())?;
        let change_script = self.staker_address.script_pubkey();

        let result = build_expansion_tx(
            &self.secp,
            self.network,
            ExpansionRequest {
                previous: &previous_data,
                previous_tx: previous.transaction,
                previous_vout,
                next: &next,
                amount: input.staking_amount,
                funding: Funding {
                    utxos,
                    fee_rate,
                    change_script: &change_script,
                },
            },
        )?;
        debug!(
            previous_version = previous.params.version,
            version = self.params.version,
            "building staking expansion psbt"
        );

        self.script_path_psbt(
            TxKind::StakingExpansion,
            result,
            previous.transaction,
            &previous_output,
            &previous_scripts.unbonding,
            utxos,
        )
    }

    fn script_data(&self, input: &StakingInput) -> StakingResult<StakingScriptData> {
        let params = &self.params.params;
        if input.staking_amount < params.min_staking_amount
            || input.staking_amount > params.max_staking_amount
        {
            return Err(StakingError::invalid_input(format!(
                "staking amount {} is outside [{}, {}]",
                input.staking_amount, params.min_staking_amount, params.max_staking_amount
            )));
        }
        self.script_data_for(input, params)
    }

    /// Script data of `input` under `params`, checking everything but the amount.
    fn script_data_for(
        &self,
        input: &StakingInput,
        params: &StakingParams,
    ) -> StakingResult<StakingScriptData> {
        if input.staking_timelock < params.min_staking_time_blocks
            || input.staking_timelock > params.max_staking_time_blocks
        {
            return Err(StakingError::invalid_input(format!(
                "staking timelock {} is outside [{}, {}]",
                input.staking_timelock,
                params.min_staking_time_blocks,
                params.max_staking_time_blocks
            )));
        }
        if input.finality_provider_keys.is_empty() {
            return Err(StakingError::invalid_input(
                "at least one finality provider is required",
            ));
        }
        if params.is_observable() && input.finality_provider_keys.len() != 1 {
            return Err(StakingError::invalid_input(
                "observable staking takes exactly one finality provider",
            ));
        }

        Ok(StakingScriptData::from_params(
            self.staker_key,
            &input.finality_provider_keys,
            params,
            input.staking_timelock,
        )?)
    }

    fn unbonding(
        &self,
        scripts: &StakingScripts,
        staking_tx: &Transaction,
    ) -> StakingResult<(TransactionResult, TaprootOutput)> {
        let staking_output = derive_staking_output(&self.secp, scripts, self.network)?;
        let vout = find_output(staking_tx, &staking_output.script_pubkey())?;
        let result = build_unbonding_tx(
            &self.secp,
            self.network,
            scripts,
            staking_tx,
            vout,
            self.params.params.unbonding_fee,
        )?;
        check_pre_signed_tx(&result.transaction, 1, 1)
            .map_err(|e| StakingError::build(TxKind::Unbonding, e.into()))?;

        Ok((result, staking_output))
    }

    fn slashing_psbt(
        &self,
        input: &StakingInput,
        source: SlashingSource,
        source_tx: &Transaction,
    ) -> StakingResult<PsbtResult> {
        let slashing = self
            .params
            .params
            .slashing
            .as_ref()
            .ok_or_else(|| StakingError::invalid_input("params carry no slashing terms"))?;
        let scripts = self.build_scripts(input)?;
        let spent_tree = source.output(&self.secp, &scripts, self.network)?;
        let vout = find_output(source_tx, &spent_tree.script_pubkey())?;

        let result = build_slashing_tx(
            &self.secp,
            self.network,
            &scripts,
            source,
            source_tx,
            vout,
            slashing,
        )?;
        check_pre_signed_tx(&result.transaction, 1, 2)
            .map_err(|e| StakingError::build(TxKind::Slashing, e.into()))?;

        self.script_path_psbt(
            TxKind::Slashing,
            result,
            source_tx,
            &spent_tree,
            &scripts.slashing,
            &[],
        )
    }

    fn withdrawal_psbt(
        &self,
        input: &StakingInput,
        source: WithdrawalSource,
        source_tx: &Transaction,
        fee_rate: u64,
    ) -> StakingResult<PsbtResult> {
        let data = self.script_data(input)?;
        let scripts = data.build_scripts()?;
        let (spent_tree, leaf) = source.spend_path(&self.secp, &scripts, self.network)?;
        let vout = find_output(source_tx, &spent_tree.script_pubkey())?;

        let result = build_withdrawal_tx(
            &self.secp,
            self.network,
            &data,
            source,
            source_tx,
            vout,
            &self.staker_address.script_pubkey(),
            fee_rate,
        )?;

        self.script_path_psbt(
            TxKind::Withdrawal,
            result,
            source_tx,
            &spent_tree,
            &leaf.script,
            &[],
        )
    }

    /// Wraps `result` in a PSBT whose first input spends `source_tx` through `leaf_script` of
    /// `spent_tree`. Further inputs must be in `utxos`.
    fn script_path_psbt(
        &self,
        kind: TxKind,
        result: TransactionResult,
        source_tx: &Transaction,
        spent_tree: &TaprootOutput,
        leaf_script: &ScriptBuf,
        utxos: &[Utxo],
    ) -> StakingResult<PsbtResult> {
        let outpoint = result
            .transaction
            .input
            .first()
            .map(|txin| txin.previous_output)
            .ok_or_else(|| {
                StakingError::invalid_input(format!("{kind} transaction has no inputs"))
            })?;
        let prevout = source_tx
            .output
            .get(outpoint.vout as usize)
            .cloned()
            .ok_or_else(|| {
                StakingError::invalid_input(format!("output {} does not exist", outpoint.vout))
            })?;
        let leaf = spent_tree.leaf_spend(leaf_script)?;

        let psbt = assemble_psbt(
            &self.secp,
            result.transaction,
            utxos,
            &[ScriptPathSpend {
                outpoint,
                prevout,
                leaf,
            }],
            Some(self.staker_key),
        )
        .map_err(|e| StakingError::build(kind, e.into()))?;

        Ok(PsbtResult {
            psbt,
            fee: result.fee,
        })
    }
}
