use std::cmp::Ordering;

use murmurhash3::{murmurhash3_x64_128, murmurhash3_x86_32};
use serde::{Deserialize, Serialize};

/// Width of hash values produced for a given alphabet and k-mer size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashWidth {
    Bits32,
    Bits64,
}

impl HashWidth {
    /// Select 64-bit hashes when the k-mer space exceeds what 32 bits can address.
    pub fn for_kmer_space(alphabet_size: u32, kmer_size: u8) -> Self {
        if (alphabet_size as f64).powi(kmer_size as i32) > 2f64.powi(32) {
            HashWidth::Bits64
        } else {
            HashWidth::Bits32
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            HashWidth::Bits32 => 32,
            HashWidth::Bits64 => 64,
        }
    }

    /// Size of the hash space as a float, used for set size extrapolation.
    pub fn space(&self) -> f64 {
        2f64.powi(self.bits() as i32)
    }
}

/// A hash value tagged with its width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashValue {
    Hash32(u32),
    Hash64(u64),
}

impl HashValue {
    pub fn width(&self) -> HashWidth {
        match self {
            HashValue::Hash32(_) => HashWidth::Bits32,
            HashValue::Hash64(_) => HashWidth::Bits64,
        }
    }

    /// Raw value widened to 64 bits. Widening preserves order within a width.
    pub fn raw(&self) -> u64 {
        match *self {
            HashValue::Hash32(h) => h as u64,
            HashValue::Hash64(h) => h,
        }
    }

    /// Rebuild a tagged value from a raw value of known width.
    pub fn from_raw(raw: u64, width: HashWidth) -> Self {
        match width {
            HashWidth::Bits32 => HashValue::Hash32(raw as u32),
            HashWidth::Bits64 => HashValue::Hash64(raw),
        }
    }
}

impl PartialOrd for HashValue {
    /// Values of different widths are incomparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (HashValue::Hash32(a), HashValue::Hash32(b)) => Some(a.cmp(b)),
            (HashValue::Hash64(a), HashValue::Hash64(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Ordering predicate used for every sort and merge over hash values.
#[inline]
pub fn hash_less_than(a: HashValue, b: HashValue) -> bool {
    debug_assert_eq!(a.width(), b.width(), "comparing hashes of different widths");
    a.partial_cmp(&b) == Some(Ordering::Less)
}

/// Seeded MurmurHash3 of a k-mer (or any token) using the requested width.
#[inline]
pub fn hash_kmer(kmer: &[u8], seed: u32, width: HashWidth) -> HashValue {
    match width {
        HashWidth::Bits64 => HashValue::Hash64(murmurhash3_x64_128(kmer, seed as u64).0),
        HashWidth::Bits32 => HashValue::Hash32(murmurhash3_x86_32(kmer, seed)),
    }
}
