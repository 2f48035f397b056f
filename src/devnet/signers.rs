use ed25519_dalek::SigningKey;
use rand::{rngs::StdRng, SeedableRng};

use crate::address::Address;

/// A local account: its key never leaves the process and is only used to
/// derive the address.
#[derive(Clone, Debug)]
pub struct Signer {
    key: SigningKey,
    address: Address,
}

impl Signer {
    pub fn from_key(key: SigningKey) -> Self {
        let address = Address::from_verifying_key(&key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignerSet {
    signers: Vec<Signer>,
}

impl SignerSet {
    /// Same `seed` always yields the same accounts in the same order.
    pub fn generate(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let signers = (0..count)
            .map(|_| Signer::from_key(SigningKey::generate(&mut rng)))
            .collect();
        Self { signers }
    }

    pub fn get(&self, index: usize) -> Option<&Signer> {
        self.signers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signer> {
        self.signers.iter()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.signers.iter().map(Signer::address).collect()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.signers.iter().any(|s| &s.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn generation_is_deterministic_and_distinct() {
        let a = SignerSet::generate(10, 7);
        let b = SignerSet::generate(10, 7);
        assert_eq!(a.addresses(), b.addresses());
        let unique: BTreeSet<_> = a.addresses().into_iter().collect();
        assert_eq!(unique.len(), 10);
        assert_ne!(a.addresses(), SignerSet::generate(10, 8).addresses());
    }

    #[test]
    fn lookup_by_index_and_address() {
        let set = SignerSet::generate(2, 1);
        let first = set.get(0).unwrap().address();
        assert!(set.contains(&first));
        assert!(!set.contains(&Address::ZERO));
        assert!(set.get(2).is_none());
        assert_eq!(set.get(0).unwrap().public_key_hex().len(), 64);
    }
}
