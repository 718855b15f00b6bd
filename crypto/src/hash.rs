//! Blake2b-256, the hash behind block hashes, tx roots and bloom positions.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// Hash of the concatenation of `parts`, without allocating it.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    parts.iter().for_each(|p| hasher.update(p));
    hasher.finalize().into()
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}
