use rand::RngCore;

use crate::types::NodeId;

/// Computes BLAKE3 and returns the first-class 32-byte digest value.
pub fn blake3_32(input: &[u8]) -> [u8; 32] {
    *blake3::hash(input).as_bytes()
}

/// Derives a node identity: `H("node" || seed)`.
pub fn derive_node_id(seed: &[u8]) -> NodeId {
    let mut buf = Vec::with_capacity(4 + seed.len());
    buf.extend_from_slice(b"node");
    buf.extend_from_slice(seed);
    NodeId(blake3_32(&buf))
}

/// Derives a node identity from a fresh random seed.
pub fn random_node_id() -> NodeId {
    let mut seed = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    derive_node_id(&seed)
}
