use bitcoin::{
    Amount, Network, ScriptBuf, Transaction, Txid, XOnlyPublicKey,
    hashes::Hash,
    secp256k1::{Secp256k1, Verification},
};
use btc_staking_test_utils::{
    covenant_keys, finality_provider_key, funding_tx_with_output, staker_key,
};

use crate::{
    scripts::{StakingScriptData, StakingScripts},
    taproot::derive_staking_output,
    utxo::Utxo,
};

pub(crate) const NETWORK: Network = Network::Signet;

pub(crate) fn covenant_pks() -> Vec<XOnlyPublicKey> {
    covenant_keys(3).iter().map(|k| k.x_only()).collect()
}

/// 2-of-3 committee, 64,000 block stake, 1,008 block unbonding.
pub(crate) fn sample_script_data() -> StakingScriptData {
    StakingScriptData::new(
        staker_key().x_only(),
        &[finality_provider_key().x_only()],
        &covenant_pks(),
        2,
        64_000,
        1_008,
    )
    .unwrap()
}

pub(crate) fn sample_scripts() -> StakingScripts {
    sample_script_data().build_scripts().unwrap()
}

pub(crate) fn staker_p2tr_script() -> ScriptBuf {
    staker_key().p2tr_address(NETWORK).script_pubkey()
}

pub(crate) fn p2tr_utxo(seed: u8, sats: u64) -> Utxo {
    Utxo::new(
        Txid::from_byte_array([seed; 32]),
        0,
        Amount::from_sat(sats),
        staker_p2tr_script(),
    )
}

/// A transaction paying `sats` to the staking output of `scripts` at index 0.
pub(crate) fn staking_tx<C: Verification>(
    secp: &Secp256k1<C>,
    scripts: &StakingScripts,
    sats: u64,
) -> Transaction {
    let output = derive_staking_output(secp, scripts, NETWORK).unwrap();
    funding_tx_with_output(output.script_pubkey(), Amount::from_sat(sats), 0)
}
