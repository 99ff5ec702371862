//! The inbound half of the state-sync relay.
//!
//! Bundles of messages are committed as Merkle roots over contiguous id
//! ranges, then individual messages are executed exactly once each.
//! Delivery is a bulk, best-effort guarantee: a handler failure is
//! recorded as an outcome and never blocks the surrounding call, so one
//! poisoned message cannot stall the queue.

use crate::config::BridgeConfig;
use crate::encoding::commitment_message_bytes;
use crate::state_sender::StateSyncMessage;
use crate::validator::{has_supermajority, Address, SignerBitmap, ValidatorSetProvider};
use crate::{HandlerError, STATE_SYNC_DOMAIN};

use bridge_bls::{hash_to_curve::wb::HASH_TO_G1, BLSError, PublicKey, Signature};
use bridge_merkle::{verify_inclusion, Hash32};

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, warn};

/// A Merkle root over the contiguous message id range
/// `[start_id, end_id]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    pub start_id: u64,
    pub end_id: u64,
    pub root: Hash32,
}

/// What happened to one delivered message. Handler outcomes are data, not
/// control flow; only structural and cryptographic problems are errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The handler accepted the message
    Success,
    /// The handler returned an error; the message still counts as
    /// processed and will not be retried
    HandlerFailed,
    /// No handler is registered for the receiver address
    NoHandler,
    /// Batch execution only: the id was already processed earlier
    Skipped,
}

#[derive(Debug, Error)]
pub enum StateSyncError {
    #[error("only the system caller may commit, got {0}")]
    NotSystemCall(Address),
    #[error("commitment starts at {got}, expected {expected}")]
    InvalidStartId { expected: u64, got: u64 },
    #[error("commitment ends at {end_id} before it starts at {start_id}")]
    InvalidEndId { start_id: u64, end_id: u64 },
    #[error("signers hold {signer_power} of {total_power} voting power, short of 2/3")]
    NotEnoughSignatures {
        signer_power: u128,
        total_power: u128,
    },
    #[error("bundle signature verification failed")]
    SignatureVerificationFailed,
    /// The pairing evaluation could not be completed; distinct from a
    /// plainly invalid signature.
    #[error("pairing evaluation failed: {0}")]
    PairingEvaluation(BLSError),
    #[error("message {0} is not covered by any commitment")]
    IdNotCommitted(u64),
    #[error("invalid proof for message {0}")]
    InvalidProof(u64),
    #[error("message {0} was already processed")]
    AlreadyProcessed(u64),
    #[error("proof and message arrays have mismatched lengths")]
    UnmatchedLengthParameters,
    #[error(transparent)]
    Other(#[from] crate::EncodingError),
}

/// The capability a message-consuming component implements to receive
/// relayed messages.
pub trait StateReceiveHandler {
    fn on_state_receive(
        &mut self,
        id: u64,
        sender: Address,
        data: &[u8],
    ) -> Result<(), HandlerError>;
}

/// The state-sync delivery queue: commitments, processed markers and the
/// handler registry.
pub struct StateReceiver {
    system_caller: Address,
    commitments: Vec<Commitment>,
    last_committed_id: u64,
    processed: HashSet<u64>,
    handlers: HashMap<Address, Box<dyn StateReceiveHandler>>,
}

impl StateReceiver {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            system_caller: config.system_caller,
            commitments: Vec::new(),
            last_committed_id: 0,
            processed: HashSet::new(),
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler that receives messages addressed to `receiver`.
    pub fn register_handler(
        &mut self,
        receiver: Address,
        handler: Box<dyn StateReceiveHandler>,
    ) {
        self.handlers.insert(receiver, handler);
    }

    pub fn last_committed_id(&self) -> u64 {
        self.last_committed_id
    }

    /// Number of message ids marked processed so far.
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn is_processed(&self, id: u64) -> bool {
        self.processed.contains(&id)
    }

    /// The commitment covering `id`, found by binary search over the
    /// gapless id ranges.
    pub fn commitment_for_id(&self, id: u64) -> Option<&Commitment> {
        let index = self.commitments.partition_point(|c| c.end_id < id);
        let commitment = self.commitments.get(index)?;
        (commitment.start_id <= id).then_some(commitment)
    }

    /// Persists the next bundle root. Only the system caller may commit;
    /// when an aggregate signature is supplied it is verified against the
    /// current validator set with the same supermajority rule checkpoints
    /// use.
    pub fn commit<P: ValidatorSetProvider>(
        &mut self,
        origin: Address,
        commitment: Commitment,
        signature: Option<(&Signature, &SignerBitmap)>,
        validators: &P,
    ) -> Result<(), StateSyncError> {
        if origin != self.system_caller {
            return Err(StateSyncError::NotSystemCall(origin));
        }
        if commitment.start_id != self.last_committed_id + 1 {
            return Err(StateSyncError::InvalidStartId {
                expected: self.last_committed_id + 1,
                got: commitment.start_id,
            });
        }
        if commitment.end_id < commitment.start_id {
            return Err(StateSyncError::InvalidEndId {
                start_id: commitment.start_id,
                end_id: commitment.end_id,
            });
        }
        if let Some((aggregate_signature, signers)) = signature {
            self.verify_bundle_signature(&commitment, aggregate_signature, signers, validators)?;
        }

        info!(
            start_id = commitment.start_id,
            end_id = commitment.end_id,
            "committed bundle"
        );
        self.last_committed_id = commitment.end_id;
        self.commitments.push(commitment);
        Ok(())
    }

    /// Verifies membership and delivers one message, marking it processed
    /// first. The handler outcome is returned, never raised.
    pub fn execute(
        &mut self,
        proof: &[Hash32],
        message: &StateSyncMessage,
    ) -> Result<MessageOutcome, StateSyncError> {
        self.check_proof(proof, message)?;
        if self.processed.contains(&message.id) {
            return Err(StateSyncError::AlreadyProcessed(message.id));
        }
        Ok(self.deliver(message))
    }

    /// Executes a batch of messages. Structural failures (length mismatch,
    /// uncommitted ids, bad proofs) abort the whole batch before any
    /// delivery; already-processed ids are skipped; handler failures are
    /// isolated per message.
    pub fn batch_execute(
        &mut self,
        proofs: &[Vec<Hash32>],
        messages: &[StateSyncMessage],
    ) -> Result<Vec<MessageOutcome>, StateSyncError> {
        if proofs.len() != messages.len() {
            return Err(StateSyncError::UnmatchedLengthParameters);
        }
        // validate everything before delivering anything, so a structural
        // failure cannot leave the batch half-applied
        for (proof, message) in proofs.iter().zip(messages) {
            self.check_proof(proof, message)?;
        }

        let outcomes = messages
            .iter()
            .map(|message| {
                if self.processed.contains(&message.id) {
                    MessageOutcome::Skipped
                } else {
                    self.deliver(message)
                }
            })
            .collect();
        Ok(outcomes)
    }

    fn check_proof(
        &self,
        proof: &[Hash32],
        message: &StateSyncMessage,
    ) -> Result<(), StateSyncError> {
        let commitment = self
            .commitment_for_id(message.id)
            .ok_or(StateSyncError::IdNotCommitted(message.id))?;
        let leaf = message.leaf_hash()?;
        let index = (message.id - commitment.start_id) as usize;
        if !verify_inclusion(&commitment.root, &leaf, index, proof) {
            return Err(StateSyncError::InvalidProof(message.id));
        }
        Ok(())
    }

    /// Marks the message processed, then hands it to the registered
    /// handler. Failure is captured as an outcome and the marker stays
    /// either way: the relay's contract is attempted delivery, not
    /// guaranteed success of arbitrary receiver logic.
    fn deliver(&mut self, message: &StateSyncMessage) -> MessageOutcome {
        self.processed.insert(message.id);
        let outcome = match self.handlers.get_mut(&message.receiver) {
            None => MessageOutcome::NoHandler,
            Some(handler) => {
                match handler.on_state_receive(message.id, message.sender, &message.data) {
                    Ok(()) => MessageOutcome::Success,
                    Err(err) => {
                        warn!(id = message.id, error = %err, "message handler failed");
                        MessageOutcome::HandlerFailed
                    }
                }
            }
        };
        info!(id = message.id, outcome = ?outcome, "state sync result");
        outcome
    }

    fn verify_bundle_signature<P: ValidatorSetProvider>(
        &self,
        commitment: &Commitment,
        aggregate_signature: &Signature,
        signers: &SignerBitmap,
        validators: &P,
    ) -> Result<(), StateSyncError> {
        let set = validators.validator_set();
        let (signer_power, signer_keys) = set
            .signer_subset(signers)
            .map_err(|_| StateSyncError::SignatureVerificationFailed)?;
        let total_power = set.total_power();
        if signer_keys.is_empty() || !has_supermajority(signer_power, total_power) {
            return Err(StateSyncError::NotEnoughSignatures {
                signer_power,
                total_power,
            });
        }

        let message = commitment_message_bytes(commitment)?;
        let aggregate_key = PublicKey::aggregate(&signer_keys);
        aggregate_key
            .verify(
                STATE_SYNC_DOMAIN,
                &message,
                aggregate_signature,
                &*HASH_TO_G1,
            )
            .map_err(|err| {
                if err.is_invalid_signature() {
                    StateSyncError::SignatureVerificationFailed
                } else {
                    StateSyncError::PairingEvaluation(err)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{Validator, ValidatorSet};
    use bridge_bls::test_helpers::{keygen_mul, sign_subset};
    use bridge_merkle::MerkleTree;
    use rand::thread_rng;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Collects deliveries, failing on ids it was told to reject.
    struct RecordingHandler {
        seen: Rc<RefCell<Vec<u64>>>,
        fail_ids: Vec<u64>,
    }

    impl StateReceiveHandler for RecordingHandler {
        fn on_state_receive(
            &mut self,
            id: u64,
            _sender: Address,
            _data: &[u8],
        ) -> Result<(), HandlerError> {
            if self.fail_ids.contains(&id) {
                return Err(format!("rejecting message {}", id).into());
            }
            self.seen.borrow_mut().push(id);
            Ok(())
        }
    }

    const RECEIVER: Address = Address([0x22; 20]);

    fn messages(n: u64) -> Vec<StateSyncMessage> {
        (1..=n)
            .map(|id| StateSyncMessage {
                id,
                sender: Address([0x11; 20]),
                receiver: RECEIVER,
                data: vec![id as u8],
            })
            .collect()
    }

    struct Fixture {
        receiver: StateReceiver,
        seen: Rc<RefCell<Vec<u64>>>,
        validators: ValidatorSet,
        config: BridgeConfig,
    }

    fn fixture(fail_ids: Vec<u64>) -> Fixture {
        let config = BridgeConfig::default();
        let mut receiver = StateReceiver::new(&config);
        let seen = Rc::new(RefCell::new(Vec::new()));
        receiver.register_handler(
            RECEIVER,
            Box::new(RecordingHandler {
                seen: seen.clone(),
                fail_ids,
            }),
        );
        let validators = ValidatorSet::new(vec![]).unwrap();
        Fixture {
            receiver,
            seen,
            validators,
            config,
        }
    }

    fn commit_tree(fx: &mut Fixture, msgs: &[StateSyncMessage]) -> MerkleTree {
        let leaves = msgs
            .iter()
            .map(|m| m.leaf_hash().unwrap())
            .collect::<Vec<_>>();
        let tree = MerkleTree::from_leaves(leaves).unwrap();
        fx.receiver
            .commit(
                fx.config.system_caller,
                Commitment {
                    start_id: msgs[0].id,
                    end_id: msgs[msgs.len() - 1].id,
                    root: tree.root(),
                },
                None,
                &fx.validators,
            )
            .unwrap();
        tree
    }

    #[test]
    fn commit_enforces_origin_and_sequence() {
        let mut fx = fixture(vec![]);
        let commitment = Commitment {
            start_id: 1,
            end_id: 4,
            root: [0u8; 32],
        };

        let err = fx
            .receiver
            .commit(
                Address([0xab; 20]),
                commitment.clone(),
                None,
                &fx.validators,
            )
            .unwrap_err();
        assert!(matches!(err, StateSyncError::NotSystemCall(_)));

        let err = fx
            .receiver
            .commit(
                fx.config.system_caller,
                Commitment {
                    start_id: 2,
                    ..commitment.clone()
                },
                None,
                &fx.validators,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StateSyncError::InvalidStartId {
                expected: 1,
                got: 2
            }
        ));

        let err = fx
            .receiver
            .commit(
                fx.config.system_caller,
                Commitment {
                    start_id: 1,
                    end_id: 0,
                    root: [0u8; 32],
                },
                None,
                &fx.validators,
            )
            .unwrap_err();
        assert!(matches!(err, StateSyncError::InvalidEndId { .. }));

        fx.receiver
            .commit(
                fx.config.system_caller,
                commitment,
                None,
                &fx.validators,
            )
            .unwrap();
        assert_eq!(fx.receiver.last_committed_id(), 4);

        // the next bundle must start exactly one past the last
        let err = fx
            .receiver
            .commit(
                fx.config.system_caller,
                Commitment {
                    start_id: 4,
                    end_id: 6,
                    root: [0u8; 32],
                },
                None,
                &fx.validators,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StateSyncError::InvalidStartId {
                expected: 5,
                got: 4
            }
        ));
    }

    #[test]
    fn execute_is_exactly_once() {
        let mut fx = fixture(vec![]);
        let msgs = messages(4);
        let tree = commit_tree(&mut fx, &msgs);

        // the scenario: execute leaf id=2 with a valid proof
        let proof = tree.proof(1).unwrap();
        let outcome = fx.receiver.execute(&proof, &msgs[1]).unwrap();
        assert_eq!(outcome, MessageOutcome::Success);
        assert!(fx.receiver.is_processed(2));
        assert_eq!(fx.receiver.processed_count(), 1);
        assert_eq!(*fx.seen.borrow(), vec![2]);

        // replaying the same (proof, message) is rejected with no state
        // change
        let err = fx.receiver.execute(&proof, &msgs[1]).unwrap_err();
        assert!(matches!(err, StateSyncError::AlreadyProcessed(2)));
        assert_eq!(fx.receiver.processed_count(), 1);
        assert_eq!(*fx.seen.borrow(), vec![2]);
    }

    #[test]
    fn execute_rejects_bad_and_uncovered_proofs() {
        let mut fx = fixture(vec![]);
        let msgs = messages(4);
        let tree = commit_tree(&mut fx, &msgs);

        let mut bad = tree.proof(1).unwrap();
        bad[0][0] ^= 1;
        let err = fx.receiver.execute(&bad, &msgs[1]).unwrap_err();
        assert!(matches!(err, StateSyncError::InvalidProof(2)));
        assert_eq!(fx.receiver.processed_count(), 0);

        let uncommitted = StateSyncMessage {
            id: 9,
            sender: Address([0x11; 20]),
            receiver: RECEIVER,
            data: vec![],
        };
        let err = fx
            .receiver
            .execute(&tree.proof(0).unwrap(), &uncommitted)
            .unwrap_err();
        assert!(matches!(err, StateSyncError::IdNotCommitted(9)));
    }

    #[test]
    fn batch_isolates_handler_failure() {
        // message 3's handler rejects; every other message still succeeds
        // and the processed count advances by the full batch size
        let mut fx = fixture(vec![3]);
        let msgs = messages(5);
        let tree = commit_tree(&mut fx, &msgs);

        let proofs = (0..5).map(|i| tree.proof(i).unwrap()).collect::<Vec<_>>();
        let outcomes = fx.receiver.batch_execute(&proofs, &msgs).unwrap();
        assert_eq!(
            outcomes,
            vec![
                MessageOutcome::Success,
                MessageOutcome::Success,
                MessageOutcome::HandlerFailed,
                MessageOutcome::Success,
                MessageOutcome::Success,
            ]
        );
        assert_eq!(fx.receiver.processed_count(), 5);
        assert_eq!(*fx.seen.borrow(), vec![1, 2, 4, 5]);
        // the failed message is burned, not retried
        assert!(fx.receiver.is_processed(3));
    }

    #[test]
    fn batch_skips_processed_and_checks_lengths() {
        let mut fx = fixture(vec![]);
        let msgs = messages(3);
        let tree = commit_tree(&mut fx, &msgs);
        let proofs = (0..3).map(|i| tree.proof(i).unwrap()).collect::<Vec<_>>();

        let err = fx
            .receiver
            .batch_execute(&proofs[..2], &msgs)
            .unwrap_err();
        assert!(matches!(err, StateSyncError::UnmatchedLengthParameters));

        fx.receiver.execute(&proofs[1], &msgs[1]).unwrap();
        let outcomes = fx.receiver.batch_execute(&proofs, &msgs).unwrap();
        assert_eq!(
            outcomes,
            vec![
                MessageOutcome::Success,
                MessageOutcome::Skipped,
                MessageOutcome::Success,
            ]
        );
        assert_eq!(fx.receiver.processed_count(), 3);
    }

    #[test]
    fn batch_aborts_before_delivery_on_structural_failure() {
        let mut fx = fixture(vec![]);
        let msgs = messages(3);
        let tree = commit_tree(&mut fx, &msgs);
        let mut proofs = (0..3).map(|i| tree.proof(i).unwrap()).collect::<Vec<_>>();
        proofs[2][0][0] ^= 1;

        let err = fx.receiver.batch_execute(&proofs, &msgs).unwrap_err();
        assert!(matches!(err, StateSyncError::InvalidProof(3)));
        // nothing was delivered, not even the messages with valid proofs
        assert_eq!(fx.receiver.processed_count(), 0);
        assert!(fx.seen.borrow().is_empty());
    }

    #[test]
    fn unaddressed_message_is_burned_without_a_handler() {
        let mut fx = fixture(vec![]);
        let mut msgs = messages(2);
        msgs[1].receiver = Address([0x77; 20]);
        let tree = commit_tree(&mut fx, &msgs);

        let outcome = fx
            .receiver
            .execute(&tree.proof(1).unwrap(), &msgs[1])
            .unwrap();
        assert_eq!(outcome, MessageOutcome::NoHandler);
        assert!(fx.receiver.is_processed(2));
    }

    #[test]
    fn signed_commit_follows_the_checkpoint_rules() {
        let rng = &mut thread_rng();
        let keys = keygen_mul(4, rng);
        let validators = ValidatorSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| Validator {
                    address: Address([i as u8; 20]),
                    bls_pubkey: key.to_public(),
                    voting_power: 1,
                })
                .collect(),
        )
        .unwrap();
        let config = BridgeConfig::default();
        let mut receiver = StateReceiver::new(&config);

        let commitment = Commitment {
            start_id: 1,
            end_id: 4,
            root: [9u8; 32],
        };
        let message = commitment_message_bytes(&commitment).unwrap();

        // 2/4 signers is below the supermajority
        let signature = sign_subset(&keys, &[0, 1], STATE_SYNC_DOMAIN, &message, &*HASH_TO_G1);
        let bitmap = SignerBitmap::from_indices(4, &[0, 1]);
        let err = receiver
            .commit(
                config.system_caller,
                commitment.clone(),
                Some((&signature, &bitmap)),
                &validators,
            )
            .unwrap_err();
        assert!(matches!(err, StateSyncError::NotEnoughSignatures { .. }));

        // 3/4 verifies
        let signature = sign_subset(
            &keys,
            &[0, 1, 2],
            STATE_SYNC_DOMAIN,
            &message,
            &*HASH_TO_G1,
        );
        let bitmap = SignerBitmap::from_indices(4, &[0, 1, 2]);
        receiver
            .commit(
                config.system_caller,
                commitment,
                Some((&signature, &bitmap)),
                &validators,
            )
            .unwrap();

        // a signature under the checkpoint domain must not be replayable
        // for bundles
        let commitment2 = Commitment {
            start_id: 5,
            end_id: 6,
            root: [9u8; 32],
        };
        let message2 = commitment_message_bytes(&commitment2).unwrap();
        let wrong_domain = sign_subset(
            &keys,
            &[0, 1, 2],
            crate::CHECKPOINT_DOMAIN,
            &message2,
            &*HASH_TO_G1,
        );
        let err = receiver
            .commit(
                config.system_caller,
                commitment2,
                Some((&wrong_domain, &bitmap)),
                &validators,
            )
            .unwrap_err();
        assert!(matches!(err, StateSyncError::SignatureVerificationFailed));
    }
}
