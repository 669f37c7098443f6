//! Boundary checks on proof results. The boundary is `2^256 / difficulty`
//! as a big-endian 256-bit value.

use ethereum_types::{H256, U256};
use sha3::{Digest, Keccak256};

use crate::hashimoto_seed;

/// Returns whether `hash <= boundary`, both big-endian.
pub fn check_difficulty(hash: &H256, boundary: &H256) -> bool {
    hash.as_bytes() <= boundary.as_bytes()
}

/// Recompute the final hash from a claimed mix digest, without touching the
/// dataset.
pub fn quick_hash(header_hash: H256, nonce: u64, mix_hash: &H256) -> H256 {
    let seed = hashimoto_seed(header_hash, nonce);
    let mut hasher = Keccak256::new();
    hasher.update(seed);
    hasher.update(mix_hash.as_bytes());
    H256::from_slice(&hasher.finalize())
}

/// Cheap pre-verification: passes when the result implied by `mix_hash`
/// meets `boundary`. A passing check still needs a full evaluation to prove
/// `mix_hash` itself.
pub fn quick_check_difficulty(header_hash: H256, nonce: u64, mix_hash: &H256, boundary: &H256) -> bool {
    check_difficulty(&quick_hash(header_hash, nonce, mix_hash), boundary)
}

pub fn boundary_from_difficulty(difficulty: U256) -> H256 {
    if difficulty.is_zero() {
        return H256::repeat_byte(0xff);
    }
    let boundary = U256::max_value() / difficulty;
    let mut bytes = [0u8; 32];
    boundary.to_big_endian(&mut bytes);
    H256(bytes)
}
