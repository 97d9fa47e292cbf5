use std::hash::{BuildHasher, Hasher};

use murmurhash3::murmurhash3_x64_128;

/// Streaming adapter exposing murmur3-x64-128 through `std::hash::Hasher`.
///
/// Written bytes are buffered and hashed on `finish`. The result depends only
/// on the byte stream and the seed, so equal keys map to equal fingerprints
/// across processes and across independently built sets. That determinism is
/// what makes set equality (element-wise fingerprint comparison) meaningful.
#[derive(Clone, Debug, Default)]
pub struct Murmur3Hasher {
    seed: u64,
    buffer: Vec<u8>,
}

impl Murmur3Hasher {
    pub fn with_seed(seed: u64) -> Self {
        Murmur3Hasher {
            seed,
            buffer: Vec::new(),
        }
    }
}

impl Hasher for Murmur3Hasher {
    fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        murmurhash3_x64_128(&self.buffer, self.seed).0
    }
}

/// `BuildHasher` for [`Murmur3Hasher`]; the default seed is 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Murmur3BuildHasher {
    seed: u64,
}

impl Murmur3BuildHasher {
    pub fn with_seed(seed: u64) -> Self {
        Murmur3BuildHasher { seed }
    }
}

impl BuildHasher for Murmur3BuildHasher {
    type Hasher = Murmur3Hasher;

    fn build_hasher(&self) -> Murmur3Hasher {
        Murmur3Hasher::with_seed(self.seed)
    }
}
