use crate::{BlsResult, HashToCurve, PublicKey, Signature};

use ark_bls12_381::{Fr, G1Projective, G2Projective};
use ark_ec::Group;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::UniformRand;
use rand::Rng;

/// A BLS private key, a scalar of the curve's prime-order subgroup.
#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct PrivateKey {
    sk: Fr,
}

impl PrivateKey {
    pub fn generate<R: Rng>(rng: &mut R) -> PrivateKey {
        PrivateKey { sk: Fr::rand(rng) }
    }

    pub fn from_sk(sk: &Fr) -> PrivateKey {
        PrivateKey { sk: *sk }
    }

    /// Signs the message under the provided domain by hashing it to G1 and
    /// scaling by the secret scalar.
    pub fn sign<H: HashToCurve<Output = G1Projective>>(
        &self,
        domain: &[u8],
        message: &[u8],
        hash_to_g1: &H,
    ) -> BlsResult<Signature> {
        Ok(Signature::from(
            hash_to_g1.hash(domain, message)? * self.sk,
        ))
    }

    /// Signs a proof of possession over the serialized public key. The
    /// domain must be the registration domain, distinct from every message
    /// signing domain.
    pub fn sign_pop<H: HashToCurve<Output = G1Projective>>(
        &self,
        domain: &[u8],
        hash_to_g1: &H,
    ) -> BlsResult<Signature> {
        let pubkey_bytes = self.to_public().to_compressed_bytes()?;
        self.sign(domain, &pubkey_bytes, hash_to_g1)
    }

    pub fn to_public(&self) -> PublicKey {
        PublicKey::from(G2Projective::generator() * self.sk)
    }
}

impl AsRef<Fr> for PrivateKey {
    fn as_ref(&self) -> &Fr {
        &self.sk
    }
}
