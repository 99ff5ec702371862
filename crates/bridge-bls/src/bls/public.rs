use crate::{BLSError, BlsResult, HashToCurve, PrivateKey, Signature};

use ark_bls12_381::{Bls12_381, G1Projective, G2Affine, G2Projective};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup};
use ark_ff::Zero;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use std::hash::{Hash, Hasher};

/// A BLS public key on G2.
#[derive(Clone, Eq, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct PublicKey(G2Projective);

impl From<G2Projective> for PublicKey {
    fn from(pk: G2Projective) -> PublicKey {
        PublicKey(pk)
    }
}

impl From<&PrivateKey> for PublicKey {
    fn from(sk: &PrivateKey) -> PublicKey {
        sk.to_public()
    }
}

impl AsRef<G2Projective> for PublicKey {
    fn as_ref(&self) -> &G2Projective {
        &self.0
    }
}

impl PublicKey {
    /// Sums the provided keys to produce the aggregate public key.
    pub fn aggregate(public_keys: &[PublicKey]) -> PublicKey {
        let mut apk = G2Projective::zero();
        for pk in public_keys.iter() {
            apk += pk.as_ref();
        }
        apk.into()
    }

    /// Serializes the key to its compressed affine encoding.
    pub fn to_compressed_bytes(&self) -> BlsResult<Vec<u8>> {
        let mut out = vec![];
        self.serialize_compressed(&mut out)?;
        Ok(out)
    }

    /// Deserializes a compressed affine encoding, enforcing the on-curve
    /// and prime-order-subgroup checks. A malformed encoding is reported as
    /// a serialization error, never as a failed verification.
    pub fn from_compressed_bytes(data: &[u8]) -> BlsResult<PublicKey> {
        Ok(PublicKey::deserialize_compressed(data)?)
    }

    /// Verifies the signature over the message for the given domain by
    /// evaluating the pairing equality `e(sig, -g2) * e(H(m), pk) == 1`.
    pub fn verify<H: HashToCurve<Output = G1Projective>>(
        &self,
        domain: &[u8],
        message: &[u8],
        signature: &Signature,
        hash_to_g1: &H,
    ) -> BlsResult<()> {
        let message_point = hash_to_g1.hash(domain, message)?;
        self.verify_hashed(&message_point, signature)
    }

    /// Verifies a proof of possession over this key's own serialization,
    /// under the registration domain.
    pub fn verify_pop<H: HashToCurve<Output = G1Projective>>(
        &self,
        domain: &[u8],
        signature: &Signature,
        hash_to_g1: &H,
    ) -> BlsResult<()> {
        let pubkey_bytes = self.to_compressed_bytes()?;
        self.verify(domain, &pubkey_bytes, signature, hash_to_g1)
    }

    /// Verifies the signature against an already-hashed message point.
    ///
    /// Same-message aggregate verification goes through here: aggregate the
    /// signer public keys first, then check the aggregate signature with a
    /// single two-term pairing product.
    pub fn verify_hashed(
        &self,
        message_point: &G1Projective,
        signature: &Signature,
    ) -> BlsResult<()> {
        let pairing = Bls12_381::multi_pairing(
            [
                signature.as_ref().into_affine(),
                message_point.into_affine(),
            ],
            [-G2Affine::generator(), self.0.into_affine()],
        );
        if pairing.is_zero() {
            Ok(())
        } else {
            Err(BLSError::VerificationFailed)
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        // This byte-level equality operator differs from the (much slower)
        // semantic equality operator in G2Projective. We require byte-level
        // equality here for HashSet to work correctly. HashSet requires
        // that item equality implies hash equality.
        let a = self.as_ref();
        let b = other.as_ref();
        a.x == b.x && a.y == b.y && a.z == b.z
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Only hash based on `y` for slight speed improvement
        self.0.y.hash(state);
    }
}
