use super::PublicKey;
use crate::BlsResult;

use ark_bls12_381::G2Projective;
use ark_ff::Zero;

use lru::LruCache;
use std::collections::HashSet;

/// Allows deserializing and aggregation of public keys while holding a
/// cache to improve performance. Aggregation assumes that the aggregated
/// public key changes slowly, which holds for the signer subset of a
/// validator set across consecutive checkpoints.
pub struct PublicKeyCache {
    /// The keys aggregated by the previous call
    keys: HashSet<PublicKey>,
    /// The aggregated public key of the previous call
    combined: PublicKey,
    /// An in-memory mapping of serialized pubkey byte arrays to their
    /// deserialized group element representation
    de: LruCache<Vec<u8>, PublicKey>,
}

impl Default for PublicKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKeyCache {
    /// Initializes an empty cache
    pub fn new() -> Self {
        Self {
            keys: HashSet::new(),
            combined: PublicKey::from(G2Projective::zero()),
            de: LruCache::new(512),
        }
    }

    /// Clears the cached aggregate and the deserialization cache
    pub fn clear_cache(&mut self) {
        self.keys = HashSet::new();
        self.combined = PublicKey::from(G2Projective::zero());
        self.de.clear();
    }

    /// Returns the PublicKey corresponding to the serialized data from the
    /// cache, or deserializes the element, saves it to the cache for later
    /// use and returns it
    pub fn deserialize(&mut self, data: Vec<u8>) -> BlsResult<PublicKey> {
        match self.de.get(&data) {
            // cache hit
            Some(cached_result) => Ok(cached_result.clone()),
            // cache miss
            None => {
                let generated_result = PublicKey::from_compressed_bytes(&data)?;
                self.de.put(data, generated_result.clone());
                Ok(generated_result)
            }
        }
    }

    /// The set of signing keys changes slowly between checkpoints, so for
    /// speed this method computes the difference from the last call and
    /// does an incremental update of the combined key
    pub fn aggregate(&mut self, public_keys: Vec<PublicKey>) -> PublicKey {
        let mut keys: HashSet<PublicKey> = HashSet::with_capacity(public_keys.len());
        for key in public_keys {
            keys.insert(key);
        }

        let mut combined = *self.combined.as_ref();

        // Subtract any keys which are no longer present
        for key in self.keys.difference(&keys) {
            combined -= key.as_ref();
        }

        // Add the new keys
        for key in keys.difference(&self.keys) {
            combined += key.as_ref();
        }

        self.keys = keys;
        self.combined = PublicKey::from(combined);

        self.combined.clone()
    }
}
