//! Consensus and policy constants used by the staking transaction builders.

use std::{str::FromStr, sync::LazyLock};

use bitcoin::{Sequence, XOnlyPublicKey, transaction::Version};

/// BIP-341 "nothing up my sleeve" point, used as the internal key of every staking taproot
/// output so that only the script paths can spend it.
pub static UNSPENDABLE_INTERNAL_KEY: LazyLock<XOnlyPublicKey> = LazyLock::new(|| {
    XOnlyPublicKey::from_str("50929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0")
        .expect("valid x-only public key")
});

/// Version of every transaction built by this crate.
pub const STAKING_TX_VERSION: Version = Version::TWO;

/// Sequence of wallet-funded inputs: replaceable, no relative locktime.
pub const FUNDING_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

/// Sequence of inputs in transactions pre-signed by the covenant committee.
pub const PRE_SIGNED_SEQUENCE: Sequence = Sequence::MAX;

/// Locktimes at or above this value are interpreted as unix timestamps.
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;

/// Format version written into the data-embed payload.
pub const DATA_EMBED_VERSION: u8 = 0;

/// tag(4) + version(1) + staker key(32) + finality provider key(32) + timelock(2).
pub const DATA_EMBED_PAYLOAD_LEN: usize = 71;

/// Virtual size of a taproot script-path input with a timelock leaf, rounded up.
pub const P2TR_SCRIPT_INPUT_VSIZE: u64 = 58;

/// Upper bound on the virtual size of any segwit output.
pub const MAX_NON_LEGACY_OUTPUT_VSIZE: u64 = 43;

/// Version, locktime and the input/output counts.
pub const TX_OVERHEAD_VSIZE: u64 = 11;

/// Extra room for the leaf script and control block revealed by a withdrawal.
pub const WITHDRAW_TX_BUFFER_VSIZE: u64 = 17;

/// Fee rates at or below this many sat/vB get [`LOW_FEE_RATE_BUFFER_SAT`] added.
pub const LOW_FEE_RATE_THRESHOLD: u64 = 2;

/// Flat buffer keeping low-rate withdrawals above the relay minimum.
pub const LOW_FEE_RATE_BUFFER_SAT: u64 = 30;

/// Length of a BIP-340 Schnorr signature with the default sighash type.
pub(crate) const SCHNORR_SIG_LEN: usize = 64;

/// DER signature with sighash byte, worst case.
pub(crate) const ECDSA_SIG_LEN: usize = 72;

pub(crate) const COMPRESSED_PUBKEY_LEN: usize = 33;

/// `push(72-byte sig) push(33-byte key)`.
pub(crate) const P2PKH_SCRIPT_SIG_LEN: usize = 1 + ECDSA_SIG_LEN + 1 + COMPRESSED_PUBKEY_LEN;
