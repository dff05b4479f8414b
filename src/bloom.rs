use ahash::RandomState;

const NUM_HASHES: usize = 4;

/// Fixed-size bloom filter used to hold back k-mers seen only once in read sets.
///
/// False positives are possible but false negatives are not.
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: usize,
    hasher: RandomState,
}

impl BloomFilter {
    /// Create a filter using at most the given number of bytes.
    pub fn with_memory(bytes: u64, num_hashes: usize) -> Self {
        let num_bits = (bytes.max(8) as usize) * 8;
        let num_bits = ((num_bits + 63) / 64) * 64;

        BloomFilter {
            bits: vec![0u64; num_bits / 64],
            num_bits,
            num_hashes: num_hashes.max(1),
            hasher: RandomState::with_seeds(
                0x517c_c1b7_2722_0a95,
                0x6c62_272e_07bb_0142,
                0x9e37_79b9_7f4a_7c15,
                0xbf58_476d_1ce4_e5b9,
            ),
        }
    }

    pub fn with_memory_default(bytes: u64) -> Self {
        BloomFilter::with_memory(bytes, NUM_HASHES)
    }

    pub fn insert(&mut self, value: u64) {
        let digest = self.hasher.hash_one(value);
        for i in 0..self.num_hashes {
            let (word, mask) = self.bit_position(digest, i);
            self.bits[word] |= mask;
        }
    }

    pub fn may_contain(&self, value: u64) -> bool {
        let digest = self.hasher.hash_one(value);
        (0..self.num_hashes).all(|i| {
            let (word, mask) = self.bit_position(digest, i);
            self.bits[word] & mask != 0
        })
    }

    /// Insert a value, returning true if it may have been present already.
    pub fn check_and_insert(&mut self, value: u64) -> bool {
        let digest = self.hasher.hash_one(value);
        let mut present = true;
        for i in 0..self.num_hashes {
            let (word, mask) = self.bit_position(digest, i);
            if self.bits[word] & mask == 0 {
                present = false;
                self.bits[word] |= mask;
            }
        }

        present
    }

    pub fn memory_bytes(&self) -> usize {
        self.bits.len() * 8
    }

    // double hashing: h1 + i*h2 mod m
    #[inline]
    fn bit_position(&self, digest: u64, i: usize) -> (usize, u64) {
        let h1 = digest as u32 as u64;
        let h2 = (digest >> 32) | 1;
        let bit = (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits as u64) as usize;

        (bit / 64, 1u64 << (bit % 64))
    }
}
