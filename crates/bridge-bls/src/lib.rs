//! # BLS Cryptography
//!
//! This crate implements the signature layer of the checkpoint bridge:
//! BLS signatures over BLS12-381 with signatures in G1 and public keys in
//! G2, supporting compact aggregation across signers.
//!
//! Verification is done through pairing products, so an aggregate signature
//! produced by any subset of signers is checked with a constant number of
//! pairings when all signers signed the same message, and with one pairing
//! per distinct message otherwise. Voting-power accounting over signer
//! subsets is the caller's responsibility, never this crate's.

/// BLS signing
pub(crate) mod bls;
pub use bls::{PrivateKey, PublicKey, PublicKeyCache, Signature};

/// Hashing to curve utilities
pub mod hash_to_curve;
pub use hash_to_curve::HashToCurve;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

use thiserror::Error;

/// Convenience result alias
pub type BlsResult<T> = std::result::Result<T, BLSError>;

#[derive(Debug, Error)]
/// Error type
pub enum BLSError {
    /// The pairing product did not equal the identity. The input was
    /// well-formed and the check itself completed; the signature is simply
    /// not valid for the given key and message.
    #[error("signature verification failed")]
    VerificationFailed,
    /// Number of public keys did not match the number of messages
    #[error("number of keys and messages must match")]
    UnevenNumKeysMessages,
    /// The message could not be mapped onto the curve. Unlike
    /// `VerificationFailed`, the check never ran.
    #[error("could not hash to curve")]
    HashToCurveError,
    /// A point failed deserialization, the on-curve check or the subgroup
    /// check. Unlike `VerificationFailed`, the check never ran.
    #[error("{0}")]
    SerializationError(#[from] ark_serialize::SerializationError),
}

impl BLSError {
    /// True when the input was well-formed but the signature was simply
    /// invalid. Callers use this to separate malicious-but-parseable input
    /// from input the pairing evaluation could not process at all.
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, BLSError::VerificationFailed)
    }
}
