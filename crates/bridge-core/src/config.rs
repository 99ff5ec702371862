use crate::validator::Address;
use serde::{Deserialize, Serialize};

/// Static configuration shared by the bridge state machines.
///
/// The system caller is the fixed privileged origin representing the
/// chain's own consensus; only it may commit bundles or submit
/// checkpoints. Ordinary user transactions can still execute messages and
/// exits, which carry their own proofs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Chain id bound into every checkpoint message
    pub chain_id: u64,
    /// The privileged system-call origin
    pub system_caller: Address,
    /// Upper bound on an emitted message payload, in bytes
    pub max_payload_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            system_caller: Address([0xff; 20]),
            max_payload_size: 2048,
        }
    }
}
