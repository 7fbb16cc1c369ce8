use std::str::FromStr;

use bitcoin::{BlockHash, TxMerkleNode, hashes::Hash};
use serde::{Deserialize, Serialize};

use crate::errors::{StakingError, StakingResult};

/// Merkle inclusion proof of a staking transaction in a Bitcoin block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Position of the transaction in the block.
    pub tx_index: u32,
    pub block_hash: BlockHash,
    /// Concatenated sibling hashes, leaf level first, in internal byte order.
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

/// Builds an inclusion proof from an Electrum-style merkle branch.
///
/// `siblings` and `block_hash` are display-order hex, as returned by
/// `blockchain.transaction.get_merkle`. The proof is not checked against any header.
pub fn build_inclusion_proof(
    tx_index: u32,
    siblings: &[impl AsRef<str>],
    block_hash: &str,
) -> StakingResult<InclusionProof> {
    let block_hash = BlockHash::from_str(block_hash)
        .map_err(|e| StakingError::invalid_input(format!("block hash {block_hash}: {e}")))?;

    let mut proof = Vec::with_capacity(siblings.len() * 32);
    for (idx, sibling) in siblings.iter().enumerate() {
        let node = TxMerkleNode::from_str(sibling.as_ref())
            .map_err(|e| StakingError::invalid_input(format!("merkle sibling {idx}: {e}")))?;
        proof.extend_from_slice(&node.to_byte_array());
    }

    Ok(InclusionProof {
        tx_index,
        block_hash,
        proof,
    })
}
