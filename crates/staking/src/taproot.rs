//! Taproot trees over the staking scripts.
//!
//! All outputs use [`UNSPENDABLE_INTERNAL_KEY`] so they can only be spent through one of their
//! leaves.

use bitcoin::{
    Address, Network, ScriptBuf,
    key::TweakedPublicKey,
    secp256k1::{Secp256k1, Verification},
    taproot::{ControlBlock, LeafVersion, TaprootBuilder, TaprootSpendInfo},
};

use crate::{constants::UNSPENDABLE_INTERNAL_KEY, errors::ScriptError, scripts::StakingScripts};

/// A script-path-only taproot output and the data needed to spend each of its leaves.
#[derive(Debug, Clone)]
pub struct TaprootOutput {
    spend_info: TaprootSpendInfo,
    address: Address,
}

/// The leaf script and control block revealed when spending one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpend {
    pub script: ScriptBuf,
    pub control_block: ControlBlock,
}

impl TaprootOutput {
    /// Builds the tree from `(depth, script)` pairs given in depth-first order.
    fn from_leaves<C: Verification>(
        secp: &Secp256k1<C>,
        leaves: &[(u8, &ScriptBuf)],
        network: Network,
    ) -> Result<Self, ScriptError> {
        let mut builder = TaprootBuilder::new();
        for (depth, script) in leaves {
            builder = builder.add_leaf(*depth, (*script).clone())?;
        }
        let spend_info = builder
            .finalize(secp, *UNSPENDABLE_INTERNAL_KEY)
            .map_err(|_| ScriptError::IncompleteTree)?;
        let address = Address::p2tr_tweaked(spend_info.output_key(), network);

        Ok(Self {
            spend_info,
            address,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    pub fn output_key(&self) -> TweakedPublicKey {
        self.spend_info.output_key()
    }

    pub fn spend_info(&self) -> &TaprootSpendInfo {
        &self.spend_info
    }

    /// Control block for spending through `script`, which must be one of this tree's leaves.
    pub fn leaf_spend(&self, script: &ScriptBuf) -> Result<LeafSpend, ScriptError> {
        let control_block = self
            .spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| ScriptError::MissingLeaf(script.clone()))?;

        Ok(LeafSpend {
            script: script.clone(),
            control_block,
        })
    }
}

/// Staking output tree: `[slashing, [unbonding, timelock]]`.
pub fn derive_staking_output<C: Verification>(
    secp: &Secp256k1<C>,
    scripts: &StakingScripts,
    network: Network,
) -> Result<TaprootOutput, ScriptError> {
    TaprootOutput::from_leaves(
        secp,
        &[
            (1, &scripts.slashing),
            (2, &scripts.unbonding),
            (2, &scripts.timelock),
        ],
        network,
    )
}

/// Unbonding output tree: `[slashing, unbonding_timelock]`.
pub fn derive_unbonding_output<C: Verification>(
    secp: &Secp256k1<C>,
    scripts: &StakingScripts,
    network: Network,
) -> Result<TaprootOutput, ScriptError> {
    TaprootOutput::from_leaves(
        secp,
        &[(1, &scripts.slashing), (1, &scripts.unbonding_timelock)],
        network,
    )
}

/// Change output of a slashing transaction: a single `unbonding_timelock` leaf.
pub fn derive_slashing_change_output<C: Verification>(
    secp: &Secp256k1<C>,
    scripts: &StakingScripts,
    network: Network,
) -> Result<TaprootOutput, ScriptError> {
    TaprootOutput::from_leaves(secp, &[(0, &scripts.unbonding_timelock)], network)
}
