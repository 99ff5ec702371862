//! Checkpoint submission and event-root membership queries.
//!
//! A checkpoint binds a contiguous child-chain block range to the Merkle
//! root of the events finalized in that range. It is accepted only when
//! validators holding at least two thirds of the voting power have signed
//! it, after which it is immutable: the history is append-only with
//! sequential ids and gapless block ranges.

use crate::config::BridgeConfig;
use crate::encoding::{checkpoint_message_bytes, EncodingError};
use crate::validator::{
    has_supermajority, Address, SignerBitmap, Validator, ValidatorSet, ValidatorSetError,
    ValidatorSetProvider,
};
use crate::CHECKPOINT_DOMAIN;

use bridge_bls::{hash_to_curve::wb::HASH_TO_G1, BLSError, PublicKeyCache, Signature};
use bridge_merkle::{verify_inclusion, Hash32};

use thiserror::Error;
use tracing::{debug, info};

/// A finalized summary of a child-chain block range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub id: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub event_root: Hash32,
}

/// Consensus metadata bound into the signed checkpoint message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundMetadata {
    pub block_hash: Hash32,
    pub block_round: u64,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("only the system caller may submit, got {0}")]
    NotSystemCall(Address),
    #[error("checkpoint id {got} is not sequential, expected {expected}")]
    IdNotSequential { expected: u64, got: u64 },
    #[error("checkpoint {id} ends at block {end_block} before it starts")]
    EmptyCheckpoint { id: u64, end_block: u64 },
    #[error("checkpoint start block {got} does not extend the chain, expected {expected}")]
    InvalidStartBlock { expected: u64, got: u64 },
    #[error("signers hold {signer_power} of {total_power} voting power, short of 2/3")]
    NotEnoughSignatures {
        signer_power: u128,
        total_power: u128,
    },
    /// The aggregate signature is well-formed but does not verify.
    #[error("aggregate signature verification failed")]
    SignatureVerificationFailed,
    /// The pairing evaluation could not be completed at all; kept distinct
    /// from `SignatureVerificationFailed` so a relayer can separate
    /// malicious input from environment faults.
    #[error("pairing evaluation failed: {0}")]
    PairingEvaluation(BLSError),
    #[error("batch arrays have mismatched lengths")]
    LengthMismatch,
    #[error("no checkpoint covers block {0}")]
    NoCheckpointForBlock(u64),
    #[error(transparent)]
    ValidatorSet(#[from] ValidatorSetError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl CheckpointError {
    fn from_bls(err: BLSError) -> Self {
        if err.is_invalid_signature() {
            CheckpointError::SignatureVerificationFailed
        } else {
            CheckpointError::PairingEvaluation(err)
        }
    }
}

/// Read-only access to finalized event roots, the interface the exit path
/// consumes.
pub trait EventRootProvider {
    /// The event root of the checkpoint covering `block`, if any
    /// checkpoint does.
    fn event_root_for_block(&self, block: u64) -> Option<Hash32>;
}

/// The checkpoint state machine. Owns the validator set; every mutation of
/// it happens inside [`CheckpointManager::submit`] and nowhere else.
pub struct CheckpointManager {
    chain_id: u64,
    system_caller: Address,
    checkpoints: Vec<Checkpoint>,
    validator_set: ValidatorSet,
    pubkey_cache: PublicKeyCache,
}

impl CheckpointManager {
    pub fn new(config: &BridgeConfig, initial_validators: Vec<Validator>) -> Result<Self, CheckpointError> {
        Ok(Self {
            chain_id: config.chain_id,
            system_caller: config.system_caller,
            checkpoints: Vec::new(),
            validator_set: ValidatorSet::new(initial_validators)?,
            pubkey_cache: PublicKeyCache::new(),
        })
    }

    /// Id of the latest accepted checkpoint; 0 is the sentinel for an
    /// empty history.
    pub fn last_id(&self) -> u64 {
        self.checkpoints.last().map(|c| c.id).unwrap_or(0)
    }

    /// End block of the latest accepted checkpoint; 0 before the first.
    pub fn last_end_block(&self) -> u64 {
        self.checkpoints.last().map(|c| c.end_block).unwrap_or(0)
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn checkpoint_by_id(&self, id: u64) -> Option<&Checkpoint> {
        // ids are sequential from 1, so the vector is the index
        id.checked_sub(1)
            .and_then(|index| self.checkpoints.get(index as usize))
    }

    /// The checkpoint covering `block`, found by binary search over the
    /// gapless end-block sequence.
    pub fn checkpoint_for_block(&self, block: u64) -> Option<&Checkpoint> {
        let index = self.checkpoints.partition_point(|c| c.end_block < block);
        let checkpoint = self.checkpoints.get(index)?;
        (checkpoint.start_block <= block).then_some(checkpoint)
    }

    /// Validates and persists the next checkpoint, then applies the
    /// validator-set change it carries.
    pub fn submit(
        &mut self,
        origin: Address,
        checkpoint: Checkpoint,
        metadata: RoundMetadata,
        aggregate_signature: &Signature,
        signers: &SignerBitmap,
        new_validators: Vec<Validator>,
    ) -> Result<(), CheckpointError> {
        if origin != self.system_caller {
            return Err(CheckpointError::NotSystemCall(origin));
        }
        self.check_sequence(self.last_id(), self.last_end_block(), &checkpoint)?;

        let message = checkpoint_message_bytes(
            self.chain_id,
            &checkpoint,
            &self.validator_set.hash(),
            &metadata,
        )?;
        self.verify_quorum(&message, aggregate_signature, signers)?;

        info!(
            id = checkpoint.id,
            start_block = checkpoint.start_block,
            end_block = checkpoint.end_block,
            new_validators = new_validators.len(),
            "accepted checkpoint"
        );
        self.checkpoints.push(checkpoint);
        self.validator_set.append(new_validators)?;
        Ok(())
    }

    /// Validates a batch of consecutive checkpoints against one aggregate
    /// signature over the concatenation of the per-item messages. Any
    /// failing item aborts the whole batch before anything is persisted.
    pub fn submit_batch(
        &mut self,
        origin: Address,
        checkpoints: Vec<Checkpoint>,
        metadata: &[RoundMetadata],
        aggregate_signature: &Signature,
        signers: &SignerBitmap,
        new_validators: Vec<Validator>,
    ) -> Result<(), CheckpointError> {
        if origin != self.system_caller {
            return Err(CheckpointError::NotSystemCall(origin));
        }
        if checkpoints.len() != metadata.len() {
            return Err(CheckpointError::LengthMismatch);
        }

        let mut last_id = self.last_id();
        let mut last_end_block = self.last_end_block();
        let mut message = Vec::new();
        for (checkpoint, meta) in checkpoints.iter().zip(metadata) {
            self.check_sequence(last_id, last_end_block, checkpoint)?;
            last_id = checkpoint.id;
            last_end_block = checkpoint.end_block;
            message.extend_from_slice(&checkpoint_message_bytes(
                self.chain_id,
                checkpoint,
                &self.validator_set.hash(),
                meta,
            )?);
        }
        self.verify_quorum(&message, aggregate_signature, signers)?;

        info!(
            count = checkpoints.len(),
            last_id, last_end_block, "accepted checkpoint batch"
        );
        self.checkpoints.extend(checkpoints);
        self.validator_set.append(new_validators)?;
        Ok(())
    }

    /// Recomputes the Merkle path of `leaf` against the event root of the
    /// checkpoint covering `block`. A bad proof is an `Ok(false)`, never an
    /// error; only a block no checkpoint covers is.
    pub fn get_event_membership_by_block_number(
        &self,
        block: u64,
        leaf: &Hash32,
        index: usize,
        proof: &[Hash32],
    ) -> Result<bool, CheckpointError> {
        let checkpoint = self
            .checkpoint_for_block(block)
            .ok_or(CheckpointError::NoCheckpointForBlock(block))?;
        Ok(verify_inclusion(&checkpoint.event_root, leaf, index, proof))
    }

    fn check_sequence(
        &self,
        last_id: u64,
        last_end_block: u64,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        if checkpoint.id != last_id + 1 {
            return Err(CheckpointError::IdNotSequential {
                expected: last_id + 1,
                got: checkpoint.id,
            });
        }
        if checkpoint.end_block < checkpoint.start_block {
            return Err(CheckpointError::EmptyCheckpoint {
                id: checkpoint.id,
                end_block: checkpoint.end_block,
            });
        }
        if checkpoint.start_block != last_end_block + 1 {
            return Err(CheckpointError::InvalidStartBlock {
                expected: last_end_block + 1,
                got: checkpoint.start_block,
            });
        }
        Ok(())
    }

    fn verify_quorum(
        &mut self,
        message: &[u8],
        aggregate_signature: &Signature,
        signers: &SignerBitmap,
    ) -> Result<(), CheckpointError> {
        let (signer_power, signer_keys) = self.validator_set.signer_subset(signers)?;
        let total_power = self.validator_set.total_power();
        if signer_keys.is_empty() || !has_supermajority(signer_power, total_power) {
            return Err(CheckpointError::NotEnoughSignatures {
                signer_power,
                total_power,
            });
        }
        debug!(
            signer_power = %signer_power,
            total_power = %total_power,
            signers = signer_keys.len(),
            "verifying aggregate signature"
        );

        let aggregate_key = self.pubkey_cache.aggregate(signer_keys);
        aggregate_key
            .verify(CHECKPOINT_DOMAIN, message, aggregate_signature, &*HASH_TO_G1)
            .map_err(CheckpointError::from_bls)
    }
}

impl ValidatorSetProvider for CheckpointManager {
    fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }
}

impl EventRootProvider for CheckpointManager {
    fn event_root_for_block(&self, block: u64) -> Option<Hash32> {
        self.checkpoint_for_block(block).map(|c| c.event_root)
    }
}
