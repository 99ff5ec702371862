//! Fixtures for signing with many keys at once, shared by the downstream
//! protocol crates' tests. Enabled with the `test-helpers` feature.

use crate::{HashToCurve, PrivateKey, PublicKey, Signature};

use ark_bls12_381::G1Projective;
use rand::Rng;

/// generate N keypairs
pub fn keygen_mul<R: Rng>(num: usize, rng: &mut R) -> Vec<PrivateKey> {
    (0..num).map(|_| PrivateKey::generate(rng)).collect()
}

/// generate `num_batches` keypair vectors, each `num_per_batch` size
pub fn keygen_batch<R: Rng>(
    num_batches: usize,
    num_per_batch: usize,
    rng: &mut R,
) -> Vec<Vec<PrivateKey>> {
    (0..num_batches)
        .map(|_| keygen_mul(num_per_batch, rng))
        .collect()
}

/// Signs the message with every key and returns the aggregate public key
/// along with the aggregate signature.
pub fn sign_aggregate<H: HashToCurve<Output = G1Projective>>(
    secret_keys: &[PrivateKey],
    domain: &[u8],
    message: &[u8],
    hash_to_g1: &H,
) -> (PublicKey, Signature) {
    let sigs = secret_keys
        .iter()
        .map(|sk| {
            sk.sign(domain, message, hash_to_g1)
                .expect("test signing should not fail")
        })
        .collect::<Vec<_>>();
    let pubkeys = secret_keys.iter().map(|sk| sk.to_public()).collect::<Vec<_>>();
    (PublicKey::aggregate(&pubkeys), Signature::aggregate(&sigs))
}

/// Signs the message with the keys selected by `signers` and returns only
/// the aggregate signature, the way a relayer would hand it over.
pub fn sign_subset<H: HashToCurve<Output = G1Projective>>(
    secret_keys: &[PrivateKey],
    signers: &[usize],
    domain: &[u8],
    message: &[u8],
    hash_to_g1: &H,
) -> Signature {
    let sigs = signers
        .iter()
        .map(|i| {
            secret_keys[*i]
                .sign(domain, message, hash_to_g1)
                .expect("test signing should not fail")
        })
        .collect::<Vec<_>>();
    Signature::aggregate(&sigs)
}
