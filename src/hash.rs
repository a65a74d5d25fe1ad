//! Key hashing
//!
//! MurmurHash64A over the raw key bytes. The 8-byte blocks are read in native
//! byte order, so hashes (and therefore bucket placement) are only stable on
//! machines sharing the byte order of the machine that wrote the store.

const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// MurmurHash64A with an explicit seed
pub fn murmur_hash64a(key: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (key.len() as u64).wrapping_mul(M);

    let mut blocks = key.chunks_exact(8);
    for block in &mut blocks {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(block);
        let mut k = u64::from_ne_bytes(buf);

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        for (i, &byte) in tail.iter().enumerate().rev() {
            h ^= (byte as u64) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

/// Hash used to place a key in the index (seed 0)
///
/// A result of exactly 0 collides with the empty-bucket sentinel; such a key
/// can be written but never found again. The empty key always hashes to 0.
#[inline]
pub fn key_hash(key: &[u8]) -> u64 {
    murmur_hash64a(key, 0)
}
