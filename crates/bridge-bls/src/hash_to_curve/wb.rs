use log::trace;

use super::HashToCurve;
use crate::BLSError;

use ark_bls12_381::{g1, G1Projective};
use ark_ec::{
    hashing::{
        curve_maps::wb::WBMap, map_to_curve_hasher::MapToCurveBasedHasher,
        HashToCurve as ArkHashToCurve,
    },
    AffineRepr,
};
use ark_ff::field_hashers::DefaultFieldHasher;
use sha2::Sha256;

use once_cell::sync::Lazy;

/// Wahby-Boneh hasher to BLS12-381 G1, shared by all protocol domains.
pub static HASH_TO_G1: Lazy<WbHashToG1> = Lazy::new(WbHashToG1::new);

type G1Hasher = MapToCurveBasedHasher<
    G1Projective,
    DefaultFieldHasher<Sha256, 128>,
    WBMap<g1::Config>,
>;

/// Maps (domain, message) pairs to G1 through hash-to-field and the
/// Wahby-Boneh map. The domain is fed to `expand_message_xmd` as the
/// domain separation tag, so the same message hashes to unrelated points
/// under different domains.
#[derive(Clone, Default)]
pub struct WbHashToG1;

impl WbHashToG1 {
    /// Instantiates a new Wahby-Boneh hasher to G1.
    pub fn new() -> Self {
        WbHashToG1
    }
}

impl HashToCurve for WbHashToG1 {
    type Output = G1Projective;

    fn hash(&self, domain: &[u8], message: &[u8]) -> Result<Self::Output, BLSError> {
        let hasher = G1Hasher::new(domain).map_err(|_| BLSError::HashToCurveError)?;
        let point = hasher
            .hash(message)
            .map_err(|_| BLSError::HashToCurveError)?;
        trace!(
            "hashed \"{}\" to curve under domain \"{}\"",
            hex::encode(message),
            hex::encode(domain)
        );
        Ok(point.into_group())
    }
}
