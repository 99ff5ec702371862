//! # Merkle trees for the checkpoint bridge
//!
//! Complete binary Merkle trees over 32-byte hashes, with logarithmic
//! inclusion proofs. Both the event trees committed by checkpoints and the
//! message trees committed by state-sync bundles are built with this crate.
//!
//! Leaf hashing and interior-node hashing use Blake2s with distinct
//! personalization strings, so a leaf encoding can never be reinterpreted
//! as an interior node or vice versa.

use blake2s_simd::Params;
use thiserror::Error;

/// 32 byte hash.
pub type Hash32 = [u8; 32];

/// Personalization for hashing leaf payloads.
const LEAF_PERSONALIZATION: &[u8] = b"brdgleaf";

/// Personalization for combining two child hashes.
const NODE_PERSONALIZATION: &[u8] = b"brdgnode";

const ZERO_HASH: Hash32 = [0u8; 32];

#[derive(Debug, Error)]
/// Error raised while constructing a tree
pub enum MerkleError {
    #[error("cannot build a tree with no leaves")]
    NoLeaves,
    #[error("leaf index {0} out of range for {1} leaves")]
    IndexOutOfRange(usize, usize),
}

/// Hashes a leaf payload into its 32-byte leaf hash.
pub fn hash_leaf(payload: &[u8]) -> Hash32 {
    let hash = Params::new()
        .hash_length(32)
        .personal(LEAF_PERSONALIZATION)
        .to_state()
        .update(payload)
        .finalize();
    let mut out = ZERO_HASH;
    out.copy_from_slice(hash.as_ref());
    out
}

/// Combines the left and right child hashes to form the parent hash.
pub fn hash_node(left: &Hash32, right: &Hash32) -> Hash32 {
    let hash = Params::new()
        .hash_length(32)
        .personal(NODE_PERSONALIZATION)
        .to_state()
        .update(left)
        .update(right)
        .finalize();
    let mut out = ZERO_HASH;
    out.copy_from_slice(hash.as_ref());
    out
}

/// Recomputes the root from a leaf hash and its sibling path and compares
/// it against the expected root.
///
/// Wrong proofs, wrong indices and wrong path lengths all produce `false`;
/// this function never panics and never errors, so callers can treat a
/// malicious proof exactly like an invalid one.
pub fn verify_inclusion(root: &Hash32, leaf: &Hash32, index: usize, proof: &[Hash32]) -> bool {
    // an index this deep cannot belong to a tree of the proof's height
    if proof.len() < usize::BITS as usize && (index >> proof.len()) != 0 {
        return false;
    }
    let mut computed = *leaf;
    let mut position = index;
    for sibling in proof {
        computed = if position & 1 == 0 {
            hash_node(&computed, sibling)
        } else {
            hash_node(sibling, &computed)
        };
        position >>= 1;
    }
    computed == *root
}

/// A complete binary Merkle tree.
///
/// The leaf layer is padded with zero hashes up to the next power of two,
/// then every layer is the pairwise hash of the one below.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// layers[0] is the padded leaf layer, the last layer is the root
    layers: Vec<Vec<Hash32>>,
    num_leaves: usize,
}

impl MerkleTree {
    /// Builds a tree over already-hashed leaves.
    pub fn from_leaves(leaves: Vec<Hash32>) -> Result<MerkleTree, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::NoLeaves);
        }
        let num_leaves = leaves.len();

        let mut base = leaves;
        base.resize(num_leaves.next_power_of_two(), ZERO_HASH);

        let mut layers = vec![base];
        while layers.last().expect("at least one layer").len() > 1 {
            let below = layers.last().expect("at least one layer");
            let above = below
                .chunks(2)
                .map(|pair| hash_node(&pair[0], &pair[1]))
                .collect::<Vec<_>>();
            layers.push(above);
        }

        Ok(MerkleTree { layers, num_leaves })
    }

    /// Builds a tree by hashing raw leaf payloads first.
    pub fn from_payloads<P: AsRef<[u8]>>(payloads: &[P]) -> Result<MerkleTree, MerkleError> {
        Self::from_leaves(payloads.iter().map(|p| hash_leaf(p.as_ref())).collect())
    }

    /// Number of real (unpadded) leaves.
    pub fn len(&self) -> usize {
        self.num_leaves
    }

    pub fn is_empty(&self) -> bool {
        self.num_leaves == 0
    }

    /// The tree root.
    pub fn root(&self) -> Hash32 {
        self.layers.last().expect("at least one layer")[0]
    }

    /// The sibling path for the leaf at `index`, bottom-up.
    pub fn proof(&self, index: usize) -> Result<Vec<Hash32>, MerkleError> {
        if index >= self.num_leaves {
            return Err(MerkleError::IndexOutOfRange(index, self.num_leaves));
        }
        let mut path = Vec::with_capacity(self.layers.len() - 1);
        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            path.push(layer[position ^ 1]);
            position >>= 1;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, RngCore};

    fn random_leaves(n: usize) -> Vec<Hash32> {
        let mut rng = thread_rng();
        (0..n)
            .map(|_| {
                let mut leaf = ZERO_HASH;
                rng.fill_bytes(&mut leaf);
                leaf
            })
            .collect()
    }

    #[test]
    fn empty_tree_is_rejected() {
        assert!(matches!(
            MerkleTree::from_leaves(vec![]),
            Err(MerkleError::NoLeaves)
        ));
    }

    #[test]
    fn proofs_verify_for_every_leaf() {
        for n in 1..=16 {
            let leaves = random_leaves(n);
            let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    verify_inclusion(&tree.root(), leaf, i, &proof),
                    "leaf {} of {} failed",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn proof_for_wrong_index_fails() {
        let leaves = random_leaves(8);
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
        let proof = tree.proof(3).unwrap();
        assert!(verify_inclusion(&tree.root(), &leaves[3], 3, &proof));
        assert!(!verify_inclusion(&tree.root(), &leaves[3], 4, &proof));
        assert!(!verify_inclusion(&tree.root(), &leaves[4], 3, &proof));
        // index beyond the tree entirely
        assert!(!verify_inclusion(&tree.root(), &leaves[3], 8 + 3, &proof));
    }

    #[test]
    fn single_bit_flip_in_proof_fails() {
        let leaves = random_leaves(8);
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
        let index = 5;
        let proof = tree.proof(index).unwrap();

        for elem in 0..proof.len() {
            for byte in 0..32 {
                for bit in 0..8 {
                    let mut tampered = proof.clone();
                    tampered[elem][byte] ^= 1 << bit;
                    assert!(
                        !verify_inclusion(&tree.root(), &leaves[index], index, &tampered),
                        "bit flip at proof[{}][{}] bit {} still verified",
                        elem,
                        byte,
                        bit
                    );
                }
            }
        }
    }

    #[test]
    fn truncated_and_extended_proofs_fail() {
        let leaves = random_leaves(8);
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
        let proof = tree.proof(2).unwrap();

        assert!(!verify_inclusion(
            &tree.root(),
            &leaves[2],
            2,
            &proof[..proof.len() - 1]
        ));

        let mut extended = proof;
        extended.push(ZERO_HASH);
        assert!(!verify_inclusion(&tree.root(), &leaves[2], 2, &extended));
    }

    #[test]
    fn leaf_and_node_hashing_are_domain_separated() {
        let mut payload = [0u8; 64];
        thread_rng().fill_bytes(&mut payload);
        let as_leaf = hash_leaf(&payload);

        let mut left = ZERO_HASH;
        let mut right = ZERO_HASH;
        left.copy_from_slice(&payload[..32]);
        right.copy_from_slice(&payload[32..]);
        let as_node = hash_node(&left, &right);

        assert_ne!(as_leaf, as_node);
    }

    #[test]
    fn proof_index_out_of_range_errors() {
        let tree = MerkleTree::from_leaves(random_leaves(5)).unwrap();
        assert!(matches!(
            tree.proof(5),
            Err(MerkleError::IndexOutOfRange(5, 5))
        ));
        // padded slots are not provable leaves
        assert!(matches!(
            tree.proof(7),
            Err(MerkleError::IndexOutOfRange(7, 5))
        ));
    }
}
