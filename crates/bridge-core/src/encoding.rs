//! Little-endian wire encoding for the hashed protocol messages.
//!
//! Signers and verifiers must agree on these byte layouts exactly; a
//! one-byte disagreement shows up as a failed signature or a failed proof,
//! not as a decode error, so the layouts here are deliberately rigid:
//! fixed-width integers, length-prefixed payloads, no padding, and strict
//! decoding that rejects trailing bytes.

use crate::checkpoint::{Checkpoint, RoundMetadata};
use crate::state_receiver::Commitment;
use crate::state_sender::StateSyncMessage;
use crate::validator::Address;

use bridge_merkle::Hash32;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
/// Union type for data serialization errors
pub enum EncodingError {
    #[error("I/O Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("payload length {0} does not fit the length prefix")]
    PayloadTooLong(usize),
    #[error("unexpected trailing bytes after decoded message")]
    TrailingBytes,
}

/// Encodes a state-sync message into its canonical leaf payload:
/// `id || sender || receiver || len(data) || data`.
pub fn encode_state_sync_message(message: &StateSyncMessage) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(8 + 20 + 20 + 4 + message.data.len());
    out.write_u64::<LittleEndian>(message.id)?;
    out.extend_from_slice(message.sender.as_bytes());
    out.extend_from_slice(message.receiver.as_bytes());
    let len = u32::try_from(message.data.len())
        .map_err(|_| EncodingError::PayloadTooLong(message.data.len()))?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(&message.data);
    Ok(out)
}

/// Decodes a canonical leaf payload back into a state-sync message.
/// The exit path uses this to interpret unhashed leaves.
pub fn decode_state_sync_message(bytes: &[u8]) -> Result<StateSyncMessage, EncodingError> {
    let mut reader = bytes;
    let id = reader.read_u64::<LittleEndian>()?;
    let mut sender = [0u8; 20];
    reader.read_exact(&mut sender)?;
    let mut receiver = [0u8; 20];
    reader.read_exact(&mut receiver)?;
    let len = reader.read_u32::<LittleEndian>()? as usize;
    // a leaf has exactly one valid encoding: short reads error below,
    // longer ones are rejected here
    if reader.len() > len {
        return Err(EncodingError::TrailingBytes);
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(StateSyncMessage {
        id,
        sender: Address(sender),
        receiver: Address(receiver),
        data,
    })
}

/// The byte string a checkpoint signature commits to:
/// `chain_id || id || start_block || end_block || event_root || block_hash
/// || block_round || validator_set_hash`.
pub fn checkpoint_message_bytes(
    chain_id: u64,
    checkpoint: &Checkpoint,
    validator_set_hash: &Hash32,
    metadata: &RoundMetadata,
) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(8 * 4 + 32 * 3);
    out.write_u64::<LittleEndian>(chain_id)?;
    out.write_u64::<LittleEndian>(checkpoint.id)?;
    out.write_u64::<LittleEndian>(checkpoint.start_block)?;
    out.write_u64::<LittleEndian>(checkpoint.end_block)?;
    out.extend_from_slice(&checkpoint.event_root);
    out.extend_from_slice(&metadata.block_hash);
    out.write_u64::<LittleEndian>(metadata.block_round)?;
    out.extend_from_slice(validator_set_hash);
    Ok(out)
}

/// The byte string a bundle signature commits to:
/// `start_id || end_id || root`.
pub fn commitment_message_bytes(commitment: &Commitment) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(8 * 2 + 32);
    out.write_u64::<LittleEndian>(commitment.start_id)?;
    out.write_u64::<LittleEndian>(commitment.end_id)?;
    out.extend_from_slice(&commitment.root);
    Ok(out)
}
