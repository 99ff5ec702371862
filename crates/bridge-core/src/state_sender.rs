//! Append-only logs of outbound cross-chain messages.
//!
//! An emitter has no verification responsibility: it assigns the next
//! monotonic id and records the message. A relayer later hashes a
//! contiguous id range of these messages into the Merkle trees that
//! `commit` (state sync) and `submit` (checkpoints) anchor on the other
//! side of the bridge.

use crate::config::BridgeConfig;
use crate::encoding::{encode_state_sync_message, EncodingError};
use crate::validator::Address;

use bridge_merkle::{hash_leaf, Hash32};
use thiserror::Error;
use tracing::debug;

/// An outbound cross-chain message. Ids are strictly increasing and
/// globally unique per emitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSyncMessage {
    pub id: u64,
    pub sender: Address,
    pub receiver: Address,
    pub data: Vec<u8>,
}

impl StateSyncMessage {
    /// The canonical leaf payload the Merkle trees are built over.
    pub fn leaf_payload(&self) -> Result<Vec<u8>, EncodingError> {
        encode_state_sync_message(self)
    }

    /// The hashed leaf.
    pub fn leaf_hash(&self) -> Result<Hash32, EncodingError> {
        Ok(hash_leaf(&self.leaf_payload()?))
    }
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("payload of {got} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { got: usize, limit: usize },
}

/// The root-chain-side emitter feeding the state-sync queue.
///
/// The child-chain-side emitter feeding exit proofs behaves identically;
/// instantiate one per direction.
#[derive(Debug)]
pub struct StateSender {
    counter: u64,
    log: Vec<StateSyncMessage>,
    max_payload_size: usize,
}

/// The child-chain-side emitter whose log becomes checkpoint event leaves.
pub type L2StateSender = StateSender;

impl StateSender {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            counter: 0,
            log: Vec::new(),
            max_payload_size: config.max_payload_size,
        }
    }

    /// Assigns the next id and logs the message. The first emitted message
    /// has id 1; id 0 is the sentinel meaning "nothing emitted yet".
    pub fn emit(
        &mut self,
        sender: Address,
        receiver: Address,
        data: Vec<u8>,
    ) -> Result<u64, EmitError> {
        if data.len() > self.max_payload_size {
            return Err(EmitError::PayloadTooLarge {
                got: data.len(),
                limit: self.max_payload_size,
            });
        }
        self.counter += 1;
        let message = StateSyncMessage {
            id: self.counter,
            sender,
            receiver,
            data,
        };
        debug!(id = message.id, %sender, %receiver, "emitted message");
        self.log.push(message);
        Ok(self.counter)
    }

    /// Highest id emitted so far; 0 before the first emit.
    pub fn last_id(&self) -> u64 {
        self.counter
    }

    pub fn messages(&self) -> &[StateSyncMessage] {
        &self.log
    }

    /// The contiguous range `[start_id, end_id]`, the slice a relayer
    /// bundles into one commitment.
    pub fn range(&self, start_id: u64, end_id: u64) -> Option<&[StateSyncMessage]> {
        if start_id == 0 || start_id > end_id || end_id > self.counter {
            return None;
        }
        let start = (start_id - 1) as usize;
        let end = end_id as usize;
        Some(&self.log[start..end])
    }
}
