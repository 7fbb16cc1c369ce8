//! Merges covenant committee signatures into a script-path witness.

use std::collections::HashMap;

use bitcoin::{Witness, XOnlyPublicKey, consensus, secp256k1::schnorr::Signature};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{errors::CovenantError, scripts::sort_keys};

/// A covenant member's signature over an unbonding or slashing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CovenantSignature {
    pub public_key: XOnlyPublicKey,
    pub signature: Signature,
}

/// Prepends covenant signatures to `original`, the staker-signed witness
/// `[staker_sig, leaf_script, control_block]`.
///
/// The leaf checks committee keys in canonical order with the first key's signature on top of
/// the stack, so signatures are pushed in reverse of that order. Members without a signature get
/// an empty element. A composition below `quorum` is returned as-is and only logged; the script
/// will reject it.
pub fn covenant_witness(
    original: &Witness,
    covenant_keys: &[XOnlyPublicKey],
    quorum: u32,
    signatures: &[CovenantSignature],
) -> Result<Witness, CovenantError> {
    let ordered = sort_keys(covenant_keys)?;

    let mut by_key = HashMap::with_capacity(signatures.len());
    for sig in signatures {
        if !ordered.contains(&sig.public_key) {
            return Err(CovenantError::UnknownSigner(sig.public_key));
        }
        if by_key.insert(sig.public_key, sig.signature).is_some() {
            return Err(CovenantError::DuplicateSignature(sig.public_key));
        }
    }
    if by_key.len() < quorum as usize {
        warn!(
            signatures = by_key.len(),
            quorum, "covenant witness is below quorum"
        );
    }

    let empty: &[u8] = &[];
    let mut witness = Witness::new();
    for key in ordered.iter().rev() {
        match by_key.get(key) {
            Some(sig) => witness.push(sig.serialize()),
            None => witness.push(empty),
        }
    }
    for element in original.iter() {
        witness.push(element);
    }
    debug!(
        signatures = by_key.len(),
        committee = ordered.len(),
        elements = witness.len(),
        "composed covenant witness"
    );

    Ok(witness)
}

/// Consensus encoding of `witness`: an element count followed by length-prefixed elements.
pub fn witness_bytes(witness: &Witness) -> Vec<u8> {
    consensus::serialize(witness)
}
