//! Runtime string hash functions
//!
//! ROM strings carry precomputed hashes which must match what the runtime
//! would compute for the same bytes. The runtime picks one of three
//! algorithms at build time so all variants are computed here.

/// Fixed hash seed used for ROM builds.
pub const FIXED_HASH_SEED: u32 = 0xabcd_1234;

const MURMUR_M: u32 = 0x5bd1_e995;
const MURMUR_R: u32 = 24;

/// Strings up to this length are hashed whole by the dense hash; longer
/// ones hash this prefix plus sampled blocks.
const DENSE_SHORT_STRING: usize = 4096;
const DENSE_MEDIUM_STRING: usize = 256 * 1024;
const DENSE_BLOCK_SIZE: usize = 256;

/// Sparse hash skip shift, the runtime default.
const SPARSE_SKIP_SHIFT: u32 = 5;

/// Murmurhash2 over `data`; `big_endian` selects how 32-bit words are read.
fn hash_bytes(data: &[u8], seed: u32, big_endian: bool) -> u32 {
    let mut h = seed ^ (data.len() as u32);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let word = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let mut k = if big_endian {
            u32::from_be_bytes(word)
        } else {
            u32::from_le_bytes(word)
        };
        k = k.wrapping_mul(MURMUR_M);
        k ^= k >> MURMUR_R;
        k = k.wrapping_mul(MURMUR_M);
        h = h.wrapping_mul(MURMUR_M);
        h ^= k;
    }

    let rest = chunks.remainder();
    if rest.len() >= 3 {
        h ^= u32::from(rest[2]) << 16;
    }
    if rest.len() >= 2 {
        h ^= u32::from(rest[1]) << 8;
    }
    if !rest.is_empty() {
        h ^= u32::from(rest[0]);
        h = h.wrapping_mul(MURMUR_M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(MURMUR_M);
    h ^= h >> 15;
    h
}

/// Dense string hash (murmurhash2 with a length-mixed seed).
pub fn dense_hash(data: &[u8], seed: u32, big_endian: bool) -> u32 {
    let len = data.len();
    let str_seed = seed ^ (len as u32);
    if len <= DENSE_SHORT_STRING {
        return hash_bytes(data, str_seed, big_endian);
    }

    let skip = if len <= DENSE_MEDIUM_STRING {
        17 * DENSE_BLOCK_SIZE
    } else {
        257 * DENSE_BLOCK_SIZE
    };
    let mut hash = hash_bytes(&data[..DENSE_SHORT_STRING], str_seed, big_endian);
    let mut off = DENSE_SHORT_STRING + (skip * (hash % 256) as usize) / 256;
    while off < len {
        let end = len.min(off + DENSE_BLOCK_SIZE);
        hash ^= hash_bytes(&data[off..end], hash, big_endian);
        off += skip;
    }
    hash
}

/// Sparse string hash: samples bytes backwards with a length based step.
pub fn sparse_hash(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut hash = seed ^ (len as u32);
    let step = (len >> SPARSE_SKIP_SHIFT) + 1;
    let mut off = len;
    while off >= step {
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(data[off - 1]));
        off -= step;
    }
    hash
}

/// All hash variants of one string, as needed by the ROM string header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringHashes {
    pub dense_le: u32,
    pub dense_be: u32,
    pub sparse: u32,
}

impl StringHashes {
    pub fn compute(data: &[u8], seed: u32) -> Self {
        Self {
            dense_le: dense_hash(data, seed, false),
            dense_be: dense_hash(data, seed, true),
            sparse: sparse_hash(data, seed),
        }
    }

    /// 16-bit variants are the low halves of the 32-bit ones.
    pub fn low16(&self) -> Self {
        Self {
            dense_le: self.dense_le & 0xffff,
            dense_be: self.dense_be & 0xffff,
            sparse: self.sparse & 0xffff,
        }
    }
}
