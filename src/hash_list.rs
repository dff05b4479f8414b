use serde::{Deserialize, Serialize};

use crate::hashing::{HashValue, HashWidth};

/// Homogeneous list of hash values whose width is fixed at construction.
///
/// Lists backing a finalized reference are always sorted ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashList {
    Hash32(Vec<u32>),
    Hash64(Vec<u64>),
}

impl HashList {
    pub fn new(width: HashWidth) -> Self {
        match width {
            HashWidth::Bits32 => HashList::Hash32(Vec::new()),
            HashWidth::Bits64 => HashList::Hash64(Vec::new()),
        }
    }

    pub fn with_capacity(width: HashWidth, capacity: usize) -> Self {
        match width {
            HashWidth::Bits32 => HashList::Hash32(Vec::with_capacity(capacity)),
            HashWidth::Bits64 => HashList::Hash64(Vec::with_capacity(capacity)),
        }
    }

    pub fn width(&self) -> HashWidth {
        match self {
            HashList::Hash32(_) => HashWidth::Bits32,
            HashList::Hash64(_) => HashWidth::Bits64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HashList::Hash32(v) => v.len(),
            HashList::Hash64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, hash: HashValue) {
        debug_assert_eq!(self.width(), hash.width(), "hash width mismatch");
        match self {
            HashList::Hash32(v) => v.push(hash.raw() as u32),
            HashList::Hash64(v) => v.push(hash.raw()),
        }
    }

    /// Append a raw value interpreted at this list's width.
    pub fn push_raw(&mut self, raw: u64) {
        match self {
            HashList::Hash32(v) => v.push(raw as u32),
            HashList::Hash64(v) => v.push(raw),
        }
    }

    pub fn at(&self, index: usize) -> HashValue {
        match self {
            HashList::Hash32(v) => HashValue::Hash32(v[index]),
            HashList::Hash64(v) => HashValue::Hash64(v[index]),
        }
    }

    pub fn get(&self, index: usize) -> Option<HashValue> {
        match self {
            HashList::Hash32(v) => v.get(index).map(|h| HashValue::Hash32(*h)),
            HashList::Hash64(v) => v.get(index).map(|h| HashValue::Hash64(*h)),
        }
    }

    pub fn raw(&self, index: usize) -> u64 {
        self.at(index).raw()
    }

    pub fn sort(&mut self) {
        match self {
            HashList::Hash32(v) => v.sort_unstable(),
            HashList::Hash64(v) => v.sort_unstable(),
        }
    }

    pub fn is_sorted(&self) -> bool {
        match self {
            HashList::Hash32(v) => v.windows(2).all(|w| w[0] <= w[1]),
            HashList::Hash64(v) => v.windows(2).all(|w| w[0] <= w[1]),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            HashList::Hash32(v) => v.truncate(len),
            HashList::Hash64(v) => v.truncate(len),
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Iterate over raw values, widened to 64 bits.
    pub fn iter_raw(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match self {
            HashList::Hash32(v) => Box::new(v.iter().map(|h| *h as u64)),
            HashList::Hash64(v) => Box::new(v.iter().copied()),
        }
    }
}
