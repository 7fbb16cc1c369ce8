use bitcoin::{
    Address, CompressedPublicKey, Network, PublicKey, XOnlyPublicKey,
    secp256k1::{Keypair, Secp256k1, SecretKey},
};

/// A keypair derived from a fixed seed byte, so every test run sees the same keys.
#[derive(Debug, Clone, Copy)]
pub struct TestKey {
    keypair: Keypair,
}

impl TestKey {
    /// Derives a keypair from the secret `[seed; 32]`. `seed` must be non-zero.
    pub fn from_seed(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).expect("non-zero seed is a valid secret key");
        Self {
            keypair: Keypair::from_secret_key(&secp, &sk),
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn x_only(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.keypair.public_key())
    }

    /// Key-path-only taproot address of this key.
    pub fn p2tr_address(&self, network: Network) -> Address {
        let secp = Secp256k1::verification_only();
        Address::p2tr(&secp, self.x_only(), None, network)
    }

    pub fn p2wpkh_address(&self, network: Network) -> Address {
        Address::p2wpkh(&CompressedPublicKey(self.keypair.public_key()), network)
    }

    pub fn p2pkh_address(&self, network: Network) -> Address {
        Address::p2pkh(self.public_key(), network)
    }
}

pub fn staker_key() -> TestKey {
    TestKey::from_seed(1)
}

pub fn finality_provider_key() -> TestKey {
    TestKey::from_seed(2)
}

/// `n` covenant committee members, seeded from 100 upward.
pub fn covenant_keys(n: u8) -> Vec<TestKey> {
    (0..n).map(|i| TestKey::from_seed(100 + i)).collect()
}
