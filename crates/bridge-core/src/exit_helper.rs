//! Root-chain consumption of child-chain events.
//!
//! An exit proves, against a checkpointed event root, that a message was
//! finalized on the child chain, then hands it to the receiving component
//! exactly once. Unlike state-sync delivery, a receiver failure here
//! aborts the exit: exits are scarce, high-value, single-shot operations
//! where silent partial failure is unacceptable.

use crate::checkpoint::EventRootProvider;
use crate::encoding::decode_state_sync_message;
use crate::validator::Address;
use crate::HandlerError;

use bridge_merkle::{hash_leaf, verify_inclusion, Hash32};

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::info;

/// A membership proof for one exit leaf against a checkpointed event root.
#[derive(Clone, Debug)]
pub struct ExitProof {
    /// A block inside the checkpoint whose event root the leaf belongs to
    pub checkpoint_block_number: u64,
    /// Position of the leaf in the event tree
    pub leaf_index: usize,
    /// The canonical leaf payload, decoded as `{id, sender, receiver, data}`
    pub unhashed_leaf: Vec<u8>,
    /// Bottom-up sibling path
    pub proof: Vec<Hash32>,
}

#[derive(Debug, Error)]
pub enum ExitError {
    #[error("exit {0} was already processed")]
    AlreadyProcessed(u64),
    #[error("could not decode exit leaf: {0}")]
    LeafDecode(#[from] crate::EncodingError),
    #[error("no checkpoint covers block {0}")]
    NoCheckpointForBlock(u64),
    #[error("invalid exit proof for id {0}")]
    InvalidProof(u64),
    #[error("no exit handler registered for receiver {0}")]
    NoHandler(Address),
    /// The receiver rejected the exit; hard-propagated, the inverse of the
    /// state-sync trade-off.
    #[error("exit handler for id {id} failed: {source}")]
    Handler {
        id: u64,
        #[source]
        source: HandlerError,
    },
}

/// The capability a root-chain component implements to consume finalized
/// child-chain events.
pub trait ExitHandler {
    fn on_l2_state_receive(
        &mut self,
        id: u64,
        sender: Address,
        data: &[u8],
    ) -> Result<(), HandlerError>;
}

/// Tracks which exit ids have been consumed and dispatches decoded exits
/// to their receivers. Event roots are read from the checkpoint manager
/// through [`EventRootProvider`]; this component never mutates checkpoint
/// state.
#[derive(Default)]
pub struct ExitHelper {
    processed: HashSet<u64>,
    handlers: HashMap<Address, Box<dyn ExitHandler>>,
}

impl ExitHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler that consumes exits addressed to `receiver`.
    pub fn register_handler(&mut self, receiver: Address, handler: Box<dyn ExitHandler>) {
        self.handlers.insert(receiver, handler);
    }

    pub fn is_processed(&self, id: u64) -> bool {
        self.processed.contains(&id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Consumes one exit. The id is marked processed before the handler
    /// runs, so a handler cannot replay its own exit; if the handler
    /// fails, the marker is rolled back and the error propagates, leaving
    /// the exit retryable.
    pub fn exit<P: EventRootProvider>(
        &mut self,
        checkpoints: &P,
        exit_proof: &ExitProof,
    ) -> Result<(), ExitError> {
        let message = decode_state_sync_message(&exit_proof.unhashed_leaf)?;
        if self.processed.contains(&message.id) {
            return Err(ExitError::AlreadyProcessed(message.id));
        }

        let event_root = checkpoints
            .event_root_for_block(exit_proof.checkpoint_block_number)
            .ok_or(ExitError::NoCheckpointForBlock(
                exit_proof.checkpoint_block_number,
            ))?;
        let leaf = hash_leaf(&exit_proof.unhashed_leaf);
        if !verify_inclusion(&event_root, &leaf, exit_proof.leaf_index, &exit_proof.proof) {
            return Err(ExitError::InvalidProof(message.id));
        }

        self.processed.insert(message.id);
        let handler = match self.handlers.get_mut(&message.receiver) {
            Some(handler) => handler,
            None => {
                self.processed.remove(&message.id);
                return Err(ExitError::NoHandler(message.receiver));
            }
        };
        if let Err(source) = handler.on_l2_state_receive(message.id, message.sender, &message.data)
        {
            self.processed.remove(&message.id);
            return Err(ExitError::Handler {
                id: message.id,
                source,
            });
        }
        info!(id = message.id, receiver = %message.receiver, "exit processed");
        Ok(())
    }

    /// Consumes a batch of exits, aborting on the first failure. All
    /// structural checks run before any handler does, so an invalid item
    /// cannot leave the batch half-consumed; a failing handler still
    /// aborts the remainder, and the exits already consumed stay consumed.
    pub fn batch_exit<P: EventRootProvider>(
        &mut self,
        checkpoints: &P,
        exit_proofs: &[ExitProof],
    ) -> Result<(), ExitError> {
        for exit_proof in exit_proofs {
            let message = decode_state_sync_message(&exit_proof.unhashed_leaf)?;
            if self.processed.contains(&message.id) {
                return Err(ExitError::AlreadyProcessed(message.id));
            }
            let event_root = checkpoints
                .event_root_for_block(exit_proof.checkpoint_block_number)
                .ok_or(ExitError::NoCheckpointForBlock(
                    exit_proof.checkpoint_block_number,
                ))?;
            let leaf = hash_leaf(&exit_proof.unhashed_leaf);
            if !verify_inclusion(&event_root, &leaf, exit_proof.leaf_index, &exit_proof.proof) {
                return Err(ExitError::InvalidProof(message.id));
            }
        }
        for exit_proof in exit_proofs {
            self.exit(checkpoints, exit_proof)?;
        }
        Ok(())
    }
}
