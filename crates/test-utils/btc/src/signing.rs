use bitcoin::{
    ScriptBuf, TapLeafHash, TapSighashType, Transaction, TxOut,
    secp256k1::{Message, Secp256k1, schnorr::Signature},
    sighash::{Prevouts, SighashCache},
    taproot::{LeafVersion, TapTweakHash},
};

use crate::keys::TestKey;

/// Signs a taproot script-path spend of `input_index` under the given leaf.
///
/// No tweak is applied: the signature verifies against the raw key inside the leaf script.
pub fn sign_script_spend(
    tx: &Transaction,
    prevouts: &[TxOut],
    input_index: usize,
    leaf_script: &ScriptBuf,
    key: &TestKey,
) -> Signature {
    let secp = Secp256k1::new();
    let mut sighash_cache = SighashCache::new(tx);
    let sighash = sighash_cache
        .taproot_script_spend_signature_hash(
            input_index,
            &Prevouts::All(prevouts),
            TapLeafHash::from_script(leaf_script, LeafVersion::TapScript),
            TapSighashType::Default,
        )
        .expect("valid sighash inputs");
    let msg = Message::from_digest(*sighash.as_ref());
    secp.sign_schnorr_no_aux_rand(&msg, key.keypair())
}

/// Signs a taproot key-path spend of `input_index` for a key with no script tree.
pub fn sign_key_spend(
    tx: &Transaction,
    prevouts: &[TxOut],
    input_index: usize,
    key: &TestKey,
) -> Signature {
    let secp = Secp256k1::new();

    // BIP341 tweak with an empty merkle root
    let tweak = TapTweakHash::from_key_and_tweak(key.x_only(), None);
    let tweaked = key
        .keypair()
        .add_xonly_tweak(&secp, &tweak.to_scalar())
        .expect("tweak is valid");

    let mut sighash_cache = SighashCache::new(tx);
    let sighash = sighash_cache
        .taproot_key_spend_signature_hash(
            input_index,
            &Prevouts::All(prevouts),
            TapSighashType::Default,
        )
        .expect("valid sighash inputs");
    let msg = Message::from_digest(*sighash.as_ref());
    secp.sign_schnorr_no_aux_rand(&msg, &tweaked)
}
