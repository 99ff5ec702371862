use super::PublicKey;
use crate::{BLSError, BlsResult, HashToCurve};

use ark_bls12_381::{Bls12_381, G1Projective, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup};
use ark_ff::Zero;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use std::borrow::Borrow;

/// A BLS signature on G1.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Signature(G1Projective);

impl From<G1Projective> for Signature {
    fn from(sig: G1Projective) -> Signature {
        Signature(sig)
    }
}

impl AsRef<G1Projective> for Signature {
    fn as_ref(&self) -> &G1Projective {
        &self.0
    }
}

impl Signature {
    /// Sums the provided signatures to produce the aggregate signature.
    pub fn aggregate<S: Borrow<Signature>>(signatures: impl IntoIterator<Item = S>) -> Signature {
        signatures
            .into_iter()
            .map(|s| s.borrow().0)
            .sum::<G1Projective>()
            .into()
    }

    /// Serializes the signature to its compressed affine encoding.
    pub fn to_compressed_bytes(&self) -> BlsResult<Vec<u8>> {
        let mut out = vec![];
        self.serialize_compressed(&mut out)?;
        Ok(out)
    }

    /// Deserializes a compressed affine encoding, enforcing the on-curve
    /// and prime-order-subgroup checks.
    pub fn from_compressed_bytes(data: &[u8]) -> BlsResult<Signature> {
        Ok(Signature::deserialize_compressed(data)?)
    }

    /// Verifies the aggregate signature against a vector of public key &
    /// message tuples, for the provided message domain. Each signer may
    /// have signed a distinct message.
    ///
    /// The verification equation can be found in pg.11 from
    /// https://eprint.iacr.org/2018/483.pdf: "Batch verification"
    pub fn batch_verify<H: HashToCurve<Output = G1Projective>, P: Borrow<PublicKey>>(
        &self,
        pubkeys: &[P],
        domain: &[u8],
        messages: &[&[u8]],
        hash_to_g1: &H,
    ) -> BlsResult<()> {
        if pubkeys.len() != messages.len() {
            return Err(BLSError::UnevenNumKeysMessages);
        }
        let message_hashes = messages
            .iter()
            .map(|message| hash_to_g1.hash(domain, message))
            .collect::<Result<Vec<G1Projective>, _>>()?;

        self.batch_verify_hashes(pubkeys, &message_hashes)
    }

    /// Verifies the aggregate signature against a vector of public key &
    /// message hash tuples. This is a lower level method; if you prefer
    /// hashing to be done internally, consider using the `batch_verify`
    /// method.
    pub fn batch_verify_hashes<P: Borrow<PublicKey>>(
        &self,
        pubkeys: &[P],
        message_hashes: &[G1Projective],
    ) -> BlsResult<()> {
        if pubkeys.len() != message_hashes.len() {
            return Err(BLSError::UnevenNumKeysMessages);
        }
        let mut g1s = Vec::with_capacity(message_hashes.len() + 1);
        let mut g2s = Vec::with_capacity(message_hashes.len() + 1);
        g1s.push(self.as_ref().into_affine());
        g2s.push(-G2Affine::generator());
        for (hash, pubkey) in message_hashes.iter().zip(pubkeys) {
            g1s.push(hash.into_affine());
            g2s.push(pubkey.borrow().as_ref().into_affine());
        }

        let pairing = Bls12_381::multi_pairing(g1s, g2s);
        if pairing.is_zero() {
            Ok(())
        } else {
            Err(BLSError::VerificationFailed)
        }
    }

    /// The zero signature, the starting point for incremental aggregation.
    pub fn zero() -> Signature {
        Signature(G1Projective::zero())
    }
}
