//! # Bridge core
//!
//! The state machines anchoring a child chain to a root chain:
//!
//! - [`CheckpointManager`] accepts BLS-signed checkpoints once a
//!   supermajority of validator voting power has signed, and answers
//!   membership queries against the checkpointed event roots.
//! - [`StateSender`] is the append-only log of outbound cross-chain
//!   messages on either side of the bridge.
//! - [`StateReceiver`] commits Merkle-rooted message bundles and executes
//!   individual messages exactly once, isolating per-message failure.
//! - [`ExitHelper`] consumes Merkle exit proofs against checkpointed event
//!   roots, exactly once per id, hard-failing on receiver error.
//!
//! Every machine is single-writer and deterministic: sequential-id checks
//! mean exactly one submission per id can ever succeed, and the validator
//! set is mutated only inside [`CheckpointManager::submit`]; every other
//! component reads it through [`ValidatorSetProvider`] snapshots.

pub mod checkpoint;
pub mod config;
pub mod encoding;
pub mod exit_helper;
pub mod state_receiver;
pub mod state_sender;
pub mod validator;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointManager, EventRootProvider, RoundMetadata};
pub use config::BridgeConfig;
pub use encoding::EncodingError;
pub use exit_helper::{ExitError, ExitHandler, ExitHelper, ExitProof};
pub use state_receiver::{
    Commitment, MessageOutcome, StateReceiveHandler, StateReceiver, StateSyncError,
};
pub use state_sender::{EmitError, L2StateSender, StateSender, StateSyncMessage};
pub use validator::{
    has_supermajority, Address, SignerBitmap, Validator, ValidatorSet, ValidatorSetError,
    ValidatorSetProvider,
};

/// Domain separator for checkpoint submission signatures
pub const CHECKPOINT_DOMAIN: &[u8] = b"BRGCHKPT";

/// Domain separator for state-sync bundle signatures
pub const STATE_SYNC_DOMAIN: &[u8] = b"BRGSYNCB";

/// Domain separator for validator registration proofs of possession
pub const VALIDATOR_POP_DOMAIN: &[u8] = b"BRGVLREG";

/// The error type handlers return; the bridge does not interpret it beyond
/// success or failure.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
