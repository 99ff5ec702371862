//! The validator set and its quorum accounting.
//!
//! The set is owned by the checkpoint manager and mutated only during
//! checkpoint submission; everything else reads it through
//! [`ValidatorSetProvider`]. Signer subsets are encoded as a bitmap over
//! validator indices; a zero or absent bit means the validator did not
//! sign and contributes no voting power.

use bridge_bls::PublicKey;
use bridge_merkle::Hash32;

use blake2s_simd::Params;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Personalization for the validator-set commitment hash.
const SET_HASH_PERSONALIZATION: &[u8] = b"brdgvset";

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

#[derive(Debug, Error)]
pub enum ValidatorSetError {
    /// The bitmap marks a signer index at or beyond the set length
    #[error("signer bit {0} is out of range for a set of {1} validators")]
    SignerOutOfRange(usize, usize),
    #[error("could not serialize validator public key")]
    PublicKeySerialization,
}

/// One member of the validator set.
#[derive(Clone, Debug)]
pub struct Validator {
    pub address: Address,
    pub bls_pubkey: PublicKey,
    pub voting_power: u64,
}

/// The ordered validator list plus its commitment hash.
///
/// The hash commits to the full ordered list (address, public key, power),
/// so two sets differing in any member, order or weight hash differently.
#[derive(Clone, Debug)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    total_power: u128,
    hash: Hash32,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Result<Self, ValidatorSetError> {
        let total_power = validators.iter().map(|v| v.voting_power as u128).sum();
        let hash = Self::compute_hash(&validators)?;
        Ok(Self {
            validators,
            total_power,
            hash,
        })
    }

    fn compute_hash(validators: &[Validator]) -> Result<Hash32, ValidatorSetError> {
        let mut encoded = Vec::with_capacity(validators.len() * (20 + 96 + 8));
        for validator in validators {
            encoded.extend_from_slice(validator.address.as_bytes());
            let pubkey_bytes = validator
                .bls_pubkey
                .to_compressed_bytes()
                .map_err(|_| ValidatorSetError::PublicKeySerialization)?;
            encoded.extend_from_slice(&pubkey_bytes);
            encoded.extend_from_slice(&validator.voting_power.to_le_bytes());
        }
        let digest = Params::new()
            .hash_length(32)
            .personal(SET_HASH_PERSONALIZATION)
            .to_state()
            .update(&encoded)
            .finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        Ok(out)
    }

    /// Appends newly admitted validators and recomputes the commitment.
    /// Only the checkpoint manager calls this, from inside `submit`.
    pub(crate) fn append(&mut self, new_validators: Vec<Validator>) -> Result<(), ValidatorSetError> {
        if new_validators.is_empty() {
            return Ok(());
        }
        for validator in &new_validators {
            self.total_power += validator.voting_power as u128;
        }
        self.validators.extend(new_validators);
        self.hash = Self::compute_hash(&self.validators)?;
        Ok(())
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_power(&self) -> u128 {
        self.total_power
    }

    pub fn hash(&self) -> Hash32 {
        self.hash
    }

    /// Resolves a signer bitmap into the signers' combined voting power and
    /// their public keys. Bits at or beyond the set length are a structural
    /// error, not a silent truncation.
    pub fn signer_subset(
        &self,
        bitmap: &SignerBitmap,
    ) -> Result<(u128, Vec<PublicKey>), ValidatorSetError> {
        if let Some(bit) = bitmap.highest_set_bit() {
            if bit >= self.validators.len() {
                return Err(ValidatorSetError::SignerOutOfRange(
                    bit,
                    self.validators.len(),
                ));
            }
        }
        let mut power: u128 = 0;
        let mut keys = Vec::new();
        for (index, validator) in self.validators.iter().enumerate() {
            if bitmap.bit(index) {
                power += validator.voting_power as u128;
                keys.push(validator.bls_pubkey.clone());
            }
        }
        Ok((power, keys))
    }
}

/// Read-only access to the current validator set, the interface every
/// component other than the checkpoint manager consumes.
pub trait ValidatorSetProvider {
    fn validator_set(&self) -> &ValidatorSet;

    fn validator_set_hash(&self) -> Hash32 {
        self.validator_set().hash()
    }
}

impl ValidatorSetProvider for ValidatorSet {
    fn validator_set(&self) -> &ValidatorSet {
        self
    }
}

/// The canonical quorum encoding: bit `i` (little-endian within each byte)
/// is set iff validator `i` signed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignerBitmap(Vec<u8>);

impl SignerBitmap {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        SignerBitmap(bytes)
    }

    /// Builds a bitmap over `len` validators with the given indices set.
    /// Indices beyond `len` are kept; the validator set rejects them later.
    pub fn from_indices(len: usize, indices: &[usize]) -> Self {
        let mut bytes = vec![0u8; (len + 7) / 8];
        for &index in indices {
            if index / 8 >= bytes.len() {
                bytes.resize(index / 8 + 1, 0);
            }
            bytes[index / 8] |= 1 << (index % 8);
        }
        SignerBitmap(bytes)
    }

    pub fn bit(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .map(|byte| byte & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    /// The highest set bit, if any bit is set at all.
    pub fn highest_set_bit(&self) -> Option<usize> {
        for (byte_index, byte) in self.0.iter().enumerate().rev() {
            if *byte != 0 {
                return Some(byte_index * 8 + (7 - byte.leading_zeros() as usize));
            }
        }
        None
    }

    pub fn count_set(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The quorum rule: acceptance iff `signer_power * 3 >= total_power * 2`.
/// Evaluated in `u128`; voting powers are `u64`, so the products cannot
/// overflow.
pub fn has_supermajority(signer_power: u128, total_power: u128) -> bool {
    signer_power * 3 >= total_power * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_bls::test_helpers::keygen_mul;
    use rand::thread_rng;

    fn test_set(powers: &[u64]) -> ValidatorSet {
        let rng = &mut thread_rng();
        let keys = keygen_mul(powers.len(), rng);
        let validators = powers
            .iter()
            .zip(&keys)
            .enumerate()
            .map(|(i, (power, key))| Validator {
                address: Address([i as u8; 20]),
                bls_pubkey: key.to_public(),
                voting_power: *power,
            })
            .collect();
        ValidatorSet::new(validators).unwrap()
    }

    #[test]
    fn set_hash_commits_to_members_and_order() {
        let set = test_set(&[10, 20, 30]);

        let mut reordered = set.validators().to_vec();
        reordered.swap(0, 1);
        let reordered = ValidatorSet::new(reordered).unwrap();
        assert_ne!(set.hash(), reordered.hash());

        let mut reweighted = set.validators().to_vec();
        reweighted[2].voting_power = 31;
        let reweighted = ValidatorSet::new(reweighted).unwrap();
        assert_ne!(set.hash(), reweighted.hash());
    }

    #[test]
    fn subset_power_counts_only_set_bits() {
        let set = test_set(&[10, 20, 30, 40]);
        let bitmap = SignerBitmap::from_indices(4, &[0, 2]);
        let (power, keys) = set.signer_subset(&bitmap).unwrap();
        assert_eq!(power, 40);
        assert_eq!(keys.len(), 2);

        let none = SignerBitmap::from_indices(4, &[]);
        let (power, keys) = set.signer_subset(&none).unwrap();
        assert_eq!(power, 0);
        assert!(keys.is_empty());
    }

    #[test]
    fn out_of_range_signer_bit_is_an_error() {
        let set = test_set(&[10, 20, 30]);
        let bitmap = SignerBitmap::from_indices(3, &[0, 3]);
        assert!(matches!(
            set.signer_subset(&bitmap),
            Err(ValidatorSetError::SignerOutOfRange(3, 3))
        ));
    }

    #[test]
    fn supermajority_boundary() {
        // 10 equal validators: 7 is a supermajority, 6 is not
        assert!(has_supermajority(7, 10));
        assert!(!has_supermajority(6, 10));
        // exact two thirds counts
        assert!(has_supermajority(2, 3));
        assert!(has_supermajority(0, 0));
    }

    #[test]
    fn bitmap_roundtrip() {
        let bitmap = SignerBitmap::from_indices(12, &[0, 3, 11]);
        assert!(bitmap.bit(0));
        assert!(!bitmap.bit(1));
        assert!(bitmap.bit(3));
        assert!(bitmap.bit(11));
        assert!(!bitmap.bit(12));
        assert!(!bitmap.bit(500));
        assert_eq!(bitmap.count_set(), 3);
        assert_eq!(bitmap.highest_set_bit(), Some(11));
        assert_eq!(SignerBitmap::default().highest_set_bit(), None);
    }

    #[test]
    fn registration_pop_is_domain_separated() {
        use crate::{CHECKPOINT_DOMAIN, VALIDATOR_POP_DOMAIN};
        use bridge_bls::{hash_to_curve::wb::HASH_TO_G1, PrivateKey};

        let rng = &mut thread_rng();
        let sk = PrivateKey::generate(rng);
        let pop = sk.sign_pop(VALIDATOR_POP_DOMAIN, &*HASH_TO_G1).unwrap();

        // the proof of possession verifies only under the registration
        // domain, so it cannot double as a checkpoint signature
        sk.to_public()
            .verify_pop(VALIDATOR_POP_DOMAIN, &pop, &*HASH_TO_G1)
            .unwrap();
        sk.to_public()
            .verify_pop(CHECKPOINT_DOMAIN, &pop, &*HASH_TO_G1)
            .unwrap_err();
    }

    #[test]
    fn append_updates_power_and_hash() {
        let mut set = test_set(&[10, 20]);
        let before = set.hash();
        let rng = &mut thread_rng();
        let key = keygen_mul(1, rng).pop().unwrap();
        set.append(vec![Validator {
            address: Address([9; 20]),
            bls_pubkey: key.to_public(),
            voting_power: 5,
        }])
        .unwrap();
        assert_eq!(set.total_power(), 35);
        assert_eq!(set.len(), 3);
        assert_ne!(set.hash(), before);
    }
}
