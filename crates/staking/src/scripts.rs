//! Compiles the tapscript leaves of a staking output.
//!
//! Every script is a pure function of the keys and timelocks held by [`StakingScriptData`];
//! keys are put into one canonical order first so callers may pass committees in any order.

use std::cmp::Reverse;

use bitcoin::{
    ScriptBuf, XOnlyPublicKey,
    opcodes::all::{
        OP_CHECKSIG, OP_CHECKSIGADD, OP_CHECKSIGVERIFY, OP_CSV, OP_NUMEQUAL, OP_NUMEQUALVERIFY,
        OP_RETURN,
    },
    script::{Builder, PushBytesBuf},
};
use btc_staking_params::{StakingParams, StakingTag};

use crate::{
    constants::{DATA_EMBED_PAYLOAD_LEN, DATA_EMBED_VERSION},
    errors::ScriptError,
};

/// The compiled leaves of a staking position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingScripts {
    /// Staker-only path after the staking timelock.
    pub timelock: ScriptBuf,
    /// Staker plus covenant quorum, used for early unbonding.
    pub unbonding: ScriptBuf,
    /// Staker, one finality provider and the covenant quorum.
    pub slashing: ScriptBuf,
    /// Staker-only path after the unbonding time.
    pub unbonding_timelock: ScriptBuf,
    /// `OP_RETURN` output announcing the delegation, only for tagged params.
    pub data_embed: Option<ScriptBuf>,
}

/// Keys and timelocks a staking position commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingScriptData {
    staker_key: XOnlyPublicKey,
    finality_provider_keys: Vec<XOnlyPublicKey>,
    covenant_keys: Vec<XOnlyPublicKey>,
    covenant_quorum: u32,
    staking_timelock: u16,
    unbonding_timelock: u16,
    tag: Option<StakingTag>,
}

impl StakingScriptData {
    /// Validates the key sets and timelocks.
    ///
    /// Fails on an empty finality provider or covenant set, a quorum outside
    /// `1..=covenant_keys.len()`, a zero timelock, or any key appearing twice across the staker,
    /// finality provider and covenant sets.
    pub fn new(
        staker_key: XOnlyPublicKey,
        finality_provider_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: u32,
        staking_timelock: u16,
        unbonding_timelock: u16,
    ) -> Result<Self, ScriptError> {
        if finality_provider_keys.is_empty() {
            return Err(ScriptError::NoFinalityProviders);
        }
        if covenant_keys.is_empty() {
            return Err(ScriptError::EmptyKeySet);
        }
        let quorum = covenant_quorum as usize;
        if quorum == 0 || quorum > covenant_keys.len() {
            return Err(ScriptError::ThresholdOutOfRange {
                threshold: quorum,
                keys: covenant_keys.len(),
            });
        }
        if staking_timelock == 0 {
            return Err(ScriptError::ZeroTimelock("staking"));
        }
        if unbonding_timelock == 0 {
            return Err(ScriptError::ZeroTimelock("unbonding"));
        }

        let mut all_keys = Vec::with_capacity(1 + finality_provider_keys.len() + covenant_keys.len());
        all_keys.push(staker_key);
        all_keys.extend_from_slice(finality_provider_keys);
        all_keys.extend_from_slice(covenant_keys);
        sort_keys(&all_keys)?;

        Ok(Self {
            staker_key,
            finality_provider_keys: finality_provider_keys.to_vec(),
            covenant_keys: covenant_keys.to_vec(),
            covenant_quorum,
            staking_timelock,
            unbonding_timelock,
            tag: None,
        })
    }

    /// Builds the script data for `params`, carrying over its tag when the params are
    /// observable.
    pub fn from_params(
        staker_key: XOnlyPublicKey,
        finality_provider_keys: &[XOnlyPublicKey],
        params: &StakingParams,
        staking_timelock: u16,
    ) -> Result<Self, ScriptError> {
        let data = Self::new(
            staker_key,
            finality_provider_keys,
            &params.covenant_pks,
            params.covenant_quorum,
            staking_timelock,
            params.unbonding_time_blocks,
        )?;
        match params.tag {
            Some(tag) => data.with_tag(tag),
            None => Ok(data),
        }
    }

    /// Enables the data-embed output. Only a single finality provider fits in the payload.
    pub fn with_tag(mut self, tag: StakingTag) -> Result<Self, ScriptError> {
        if self.finality_provider_keys.len() != 1 {
            return Err(ScriptError::DataEmbedFinalityProviders(
                self.finality_provider_keys.len(),
            ));
        }
        self.tag = Some(tag);
        Ok(self)
    }

    /// Key that signs every spending path.
    pub fn staker_key(&self) -> XOnlyPublicKey {
        self.staker_key
    }

    /// Finality provider keys as supplied; scripts sort them on compile.
    pub fn finality_provider_keys(&self) -> &[XOnlyPublicKey] {
        &self.finality_provider_keys
    }

    /// Covenant committee keys as supplied; scripts sort them on compile.
    pub fn covenant_keys(&self) -> &[XOnlyPublicKey] {
        &self.covenant_keys
    }

    pub fn covenant_quorum(&self) -> u32 {
        self.covenant_quorum
    }

    /// Blocks before the staking output can be withdrawn without the committee.
    pub fn staking_timelock(&self) -> u16 {
        self.staking_timelock
    }

    /// Blocks before unbonded or slashed-change outputs can be withdrawn.
    pub fn unbonding_timelock(&self) -> u16 {
        self.unbonding_timelock
    }

    /// Data-embed tag, set only for observable staking.
    pub fn tag(&self) -> Option<StakingTag> {
        self.tag
    }

    /// Compiles the script set: the timelock, unbonding, slashing and unbonding-timelock leaves,
    /// plus the data-embed output when a tag is set.
    pub fn build_scripts(&self) -> Result<StakingScripts, ScriptError> {
        let timelock = timelock_script(&self.staker_key, self.staking_timelock);
        let unbonding_timelock = timelock_script(&self.staker_key, self.unbonding_timelock);

        let unbonding = multisig_script(
            staker_prefix(&self.staker_key),
            &self.covenant_keys,
            self.covenant_quorum as usize,
            false,
        )?
        .into_script();

        let with_fp = multisig_script(
            staker_prefix(&self.staker_key),
            &self.finality_provider_keys,
            1,
            true,
        )?;
        let slashing = multisig_script(
            with_fp,
            &self.covenant_keys,
            self.covenant_quorum as usize,
            false,
        )?
        .into_script();

        let data_embed = self
            .tag
            .as_ref()
            .map(|tag| self.data_embed_script(tag))
            .transpose()?;

        Ok(StakingScripts {
            timelock,
            unbonding,
            slashing,
            unbonding_timelock,
            data_embed,
        })
    }

    /// `OP_RETURN <tag ‖ version ‖ staker ‖ finality provider ‖ timelock (BE)>`
    fn data_embed_script(&self, tag: &StakingTag) -> Result<ScriptBuf, ScriptError> {
        let fp = self
            .finality_provider_keys
            .first()
            .ok_or(ScriptError::NoFinalityProviders)?;

        let mut payload = Vec::with_capacity(DATA_EMBED_PAYLOAD_LEN);
        payload.extend_from_slice(tag.as_bytes());
        payload.push(DATA_EMBED_VERSION);
        payload.extend_from_slice(&self.staker_key.serialize());
        payload.extend_from_slice(&fp.serialize());
        payload.extend_from_slice(&self.staking_timelock.to_be_bytes());

        let payload = PushBytesBuf::try_from(payload)?;
        Ok(Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(payload)
            .into_script())
    }
}

/// `<staker> OP_CHECKSIGVERIFY <blocks> OP_CSV`
fn timelock_script(staker_key: &XOnlyPublicKey, blocks: u16) -> ScriptBuf {
    Builder::new()
        .push_x_only_key(staker_key)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_int(i64::from(blocks))
        .push_opcode(OP_CSV)
        .into_script()
}

fn staker_prefix(staker_key: &XOnlyPublicKey) -> Builder {
    Builder::new()
        .push_x_only_key(staker_key)
        .push_opcode(OP_CHECKSIGVERIFY)
}

/// Appends a `threshold`-of-`keys` check to `builder`.
///
/// A single key compiles to a plain `OP_CHECKSIG[VERIFY]`. Otherwise keys are emitted in
/// canonical order as `<k0> OP_CHECKSIG <k1> OP_CHECKSIGADD ... <threshold> OP_NUMEQUAL[VERIFY]`.
fn multisig_script(
    builder: Builder,
    keys: &[XOnlyPublicKey],
    threshold: usize,
    verify: bool,
) -> Result<Builder, ScriptError> {
    if keys.is_empty() {
        return Err(ScriptError::EmptyKeySet);
    }
    if threshold == 0 || threshold > keys.len() {
        return Err(ScriptError::ThresholdOutOfRange {
            threshold,
            keys: keys.len(),
        });
    }

    let sorted = sort_keys(keys)?;

    if let [key] = sorted.as_slice() {
        let op = if verify { OP_CHECKSIGVERIFY } else { OP_CHECKSIG };
        return Ok(builder.push_x_only_key(key).push_opcode(op));
    }

    let mut builder = builder;
    for (i, key) in sorted.iter().enumerate() {
        let op = if i == 0 { OP_CHECKSIG } else { OP_CHECKSIGADD };
        builder = builder.push_x_only_key(key).push_opcode(op);
    }
    let op = if verify { OP_NUMEQUALVERIFY } else { OP_NUMEQUAL };
    Ok(builder.push_int(threshold as i64).push_opcode(op))
}

/// Returns `keys` in canonical script order: descending by serialized x-only bytes.
///
/// [`XOnlyPublicKey`]'s `Ord` does not follow the serialized bytes, so the comparison is done
/// on [`XOnlyPublicKey::serialize`].
pub(crate) fn sort_keys(keys: &[XOnlyPublicKey]) -> Result<Vec<XOnlyPublicKey>, ScriptError> {
    let mut sorted = keys.to_vec();
    sorted.sort_by_key(|key| Reverse(key.serialize()));
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(ScriptError::DuplicateKey(pair[0]));
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use bitcoin::{
        opcodes::all::OP_PUSHBYTES_32,
        script::Instruction,
        secp256k1::{Keypair, Secp256k1, SecretKey},
    };
    use proptest::prelude::*;

    use super::*;

    fn xonly(seed: u8) -> XOnlyPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        Keypair::from_secret_key(&secp, &sk).x_only_public_key().0
    }

    fn covenants() -> Vec<XOnlyPublicKey> {
        vec![xonly(11), xonly(12), xonly(13)]
    }

    fn sample_data() -> StakingScriptData {
        StakingScriptData::new(xonly(1), &[xonly(2)], &covenants(), 2, 64_000, 1_008).unwrap()
    }

    fn pushed_keys(script: &ScriptBuf) -> Vec<[u8; 32]> {
        script
            .instructions()
            .filter_map(|ins| match ins.unwrap() {
                Instruction::PushBytes(bytes) if bytes.len() == 32 => {
                    Some(bytes.as_bytes().try_into().unwrap())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_timelock_script_layout() {
        let scripts = sample_data().build_scripts().unwrap();
        let expected = Builder::new()
            .push_x_only_key(&xonly(1))
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_int(64_000)
            .push_opcode(OP_CSV)
            .into_script();
        assert_eq!(scripts.timelock, expected);

        let bytes = scripts.timelock.as_bytes();
        assert_eq!(bytes[0], OP_PUSHBYTES_32.to_u8());
        assert_eq!(bytes[33], OP_CHECKSIGVERIFY.to_u8());
        assert_eq!(*bytes.last().unwrap(), OP_CSV.to_u8());
    }

    #[test]
    fn test_unbonding_timelock_uses_unbonding_time() {
        let scripts = sample_data().build_scripts().unwrap();
        let expected = Builder::new()
            .push_x_only_key(&xonly(1))
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_int(1_008)
            .push_opcode(OP_CSV)
            .into_script();
        assert_eq!(scripts.unbonding_timelock, expected);
    }

    #[test]
    fn test_unbonding_script_layout() {
        let scripts = sample_data().build_scripts().unwrap();
        let sorted = sort_keys(&covenants()).unwrap();

        let expected = Builder::new()
            .push_x_only_key(&xonly(1))
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&sorted[0])
            .push_opcode(OP_CHECKSIG)
            .push_x_only_key(&sorted[1])
            .push_opcode(OP_CHECKSIGADD)
            .push_x_only_key(&sorted[2])
            .push_opcode(OP_CHECKSIGADD)
            .push_int(2)
            .push_opcode(OP_NUMEQUAL)
            .into_script();
        assert_eq!(scripts.unbonding, expected);
    }

    #[test]
    fn test_slashing_script_single_fp() {
        let scripts = sample_data().build_scripts().unwrap();
        let bytes = scripts.slashing.as_bytes();

        // staker CHECKSIGVERIFY, fp CHECKSIGVERIFY, then the covenant multisig
        assert_eq!(bytes[33], OP_CHECKSIGVERIFY.to_u8());
        assert_eq!(&bytes[35..67], &xonly(2).serialize());
        assert_eq!(bytes[67], OP_CHECKSIGVERIFY.to_u8());
        assert_eq!(*bytes.last().unwrap(), OP_NUMEQUAL.to_u8());
        assert_eq!(&bytes[68..], &scripts.unbonding.as_bytes()[34..]);
    }

    #[test]
    fn test_slashing_script_multiple_fps() {
        let data =
            StakingScriptData::new(xonly(1), &[xonly(2), xonly(3)], &covenants(), 2, 100, 10)
                .unwrap();
        let scripts = data.build_scripts().unwrap();

        let has_fp_numequalverify = scripts
            .slashing
            .instructions()
            .any(|ins| matches!(ins, Ok(Instruction::Op(op)) if op == OP_NUMEQUALVERIFY));
        assert!(has_fp_numequalverify);
        assert_eq!(pushed_keys(&scripts.slashing).len(), 1 + 2 + 3);
    }

    #[test]
    fn test_keys_compiled_in_descending_order() {
        let scripts = sample_data().build_scripts().unwrap();
        let keys = pushed_keys(&scripts.unbonding);
        let covenant_part = &keys[1..];
        assert!(covenant_part.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_single_covenant_key_compiles_to_checksig() {
        let data = StakingScriptData::new(xonly(1), &[xonly(2)], &[xonly(11)], 1, 10, 10).unwrap();
        let scripts = data.build_scripts().unwrap();
        let expected = Builder::new()
            .push_x_only_key(&xonly(1))
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&xonly(11))
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert_eq!(scripts.unbonding, expected);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let covs = covenants();
        assert_eq!(
            StakingScriptData::new(xonly(1), &[], &covs, 2, 10, 10).unwrap_err(),
            ScriptError::NoFinalityProviders
        );
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(2)], &[], 1, 10, 10).unwrap_err(),
            ScriptError::EmptyKeySet
        );
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(2)], &covs, 4, 10, 10).unwrap_err(),
            ScriptError::ThresholdOutOfRange {
                threshold: 4,
                keys: 3
            }
        );
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(2)], &covs, 0, 10, 10).unwrap_err(),
            ScriptError::ThresholdOutOfRange {
                threshold: 0,
                keys: 3
            }
        );
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(2)], &covs, 2, 0, 10).unwrap_err(),
            ScriptError::ZeroTimelock("staking")
        );
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(2)], &covs, 2, 10, 0).unwrap_err(),
            ScriptError::ZeroTimelock("unbonding")
        );
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let dup_cov = vec![xonly(11), xonly(11)];
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(2)], &dup_cov, 1, 10, 10).unwrap_err(),
            ScriptError::DuplicateKey(xonly(11))
        );

        // staker reused as a finality provider
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(1)], &covenants(), 1, 10, 10).unwrap_err(),
            ScriptError::DuplicateKey(xonly(1))
        );

        // finality provider also on the committee
        assert_eq!(
            StakingScriptData::new(xonly(1), &[xonly(12)], &covenants(), 1, 10, 10).unwrap_err(),
            ScriptError::DuplicateKey(xonly(12))
        );
    }

    #[test]
    fn test_data_embed_payload() {
        let tag = StakingTag::new([0x01, 0x02, 0x03, 0x04]);
        let data = sample_data().with_tag(tag).unwrap();
        let script = data.build_scripts().unwrap().data_embed.unwrap();

        let bytes = script.as_bytes();
        assert_eq!(bytes[0], OP_RETURN.to_u8());
        assert_eq!(bytes[1] as usize, DATA_EMBED_PAYLOAD_LEN);

        let payload = &bytes[2..];
        assert_eq!(payload.len(), DATA_EMBED_PAYLOAD_LEN);
        assert_eq!(&payload[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(payload[4], DATA_EMBED_VERSION);
        assert_eq!(&payload[5..37], &xonly(1).serialize());
        assert_eq!(&payload[37..69], &xonly(2).serialize());
        assert_eq!(&payload[69..], &64_000u16.to_be_bytes());
    }

    #[test]
    fn test_data_embed_requires_single_fp() {
        let data =
            StakingScriptData::new(xonly(1), &[xonly(2), xonly(3)], &covenants(), 2, 10, 10)
                .unwrap();
        assert_eq!(
            data.with_tag(StakingTag::new([0; 4])).unwrap_err(),
            ScriptError::DataEmbedFinalityProviders(2)
        );
    }

    #[test]
    fn test_untagged_has_no_data_embed() {
        assert!(sample_data().build_scripts().unwrap().data_embed.is_none());
    }

    proptest! {
        #[test]
        fn proptest_covenant_order_does_not_change_scripts(
            seeds in prop::collection::btree_set(20u8..200, 1..8),
            rotate in 0usize..8,
        ) {
            let keys: Vec<_> = seeds.iter().map(|s| xonly(*s)).collect();
            let mut shuffled = keys.clone();
            shuffled.rotate_left(rotate % keys.len());
            shuffled.reverse();

            let quorum = keys.len().div_ceil(2) as u32;
            let a = StakingScriptData::new(xonly(1), &[xonly(2)], &keys, quorum, 500, 50)
                .unwrap()
                .build_scripts()
                .unwrap();
            let b = StakingScriptData::new(xonly(1), &[xonly(2)], &shuffled, quorum, 500, 50)
                .unwrap()
                .build_scripts()
                .unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
