/// Implementation of hash-to-curve via hash-to-field and the Wahby-Boneh
/// map-to-curve, following the `expand_message_xmd` construction.
///
/// The message is expanded into two base-field elements, each is mapped to
/// the curve through the simplified SWU isogeny, the two points are added
/// and the cofactor is cleared. The whole procedure is deterministic and
/// constant cost for a given message length.
///
/// # Examples
///
/// ```rust
/// use bridge_bls::hash_to_curve::{HashToCurve, wb::HASH_TO_G1};
///
/// let hasher = &*HASH_TO_G1;
/// let hash = hasher.hash(b"domain-tag", &b"some_data"[..]).expect("should not fail");
/// ```
pub mod wb;

use crate::BLSError;

/// Trait for hashing arbitrary data to a group element on an elliptic curve
pub trait HashToCurve {
    /// The type of the curve being used.
    type Output;

    /// Given a domain separator and a message, produces a hash of them
    /// which is a curve point. The domain MUST differ between protocol
    /// uses, otherwise a signature produced for one purpose can be
    /// replayed for another.
    fn hash(&self, domain: &[u8], message: &[u8]) -> Result<Self::Output, BLSError>;
}
