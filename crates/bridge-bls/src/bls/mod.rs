/// Implements BLS signatures as specified in https://crypto.stanford.edu/~dabo/pubs/papers/BLSmultisig.html.
mod secret;
pub use secret::PrivateKey;

mod public;
pub use public::PublicKey;

mod signature;
pub use signature::Signature;

mod cache;
pub use cache::PublicKeyCache;
