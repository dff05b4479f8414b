use std::collections::BTreeMap;

use crate::bloom::BloomFilter;
use crate::hash_list::HashList;
use crate::hashing::{hash_less_than, HashValue, HashWidth};

/// Bounded accumulator retaining the smallest distinct hashes seen in a stream.
///
/// When a minimum multiplicity is requested, a hash is held in a pending
/// table until it has been observed that many times. With a memory bound
/// the first observation is only recorded in a bloom filter, so k-mers seen
/// once never enter the pending table.
pub struct MinHashHeap {
    width: HashWidth,
    cardinality_max: usize,
    admit_count: u32,
    pending_min: u32,
    hashes: BTreeMap<u64, u32>,
    pending: BTreeMap<u64, u32>,
    bloom: Option<BloomFilter>,
    multiplicity_sum: u64,
}

impl MinHashHeap {
    pub fn new(
        width: HashWidth,
        cardinality_max: usize,
        multiplicity_min: u32,
        memory_bound: u64,
    ) -> Self {
        let multiplicity_min = multiplicity_min.max(1);
        let bloom = if memory_bound > 0 && multiplicity_min > 1 {
            Some(BloomFilter::with_memory_default(memory_bound))
        } else {
            None
        };

        let pending_min = if bloom.is_some() {
            multiplicity_min - 1
        } else {
            multiplicity_min
        };

        MinHashHeap {
            width,
            cardinality_max: cardinality_max.max(1),
            admit_count: multiplicity_min,
            pending_min,
            hashes: BTreeMap::new(),
            pending: BTreeMap::new(),
            bloom,
            multiplicity_sum: 0,
        }
    }

    /// Unfiltered accumulator holding up to `cardinality_max` hashes.
    pub fn bounded(width: HashWidth, cardinality_max: usize) -> Self {
        MinHashHeap::new(width, cardinality_max, 1, 0)
    }

    pub fn width(&self) -> HashWidth {
        self.width
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn is_full(&self) -> bool {
        self.hashes.len() >= self.cardinality_max
    }

    /// Largest retained hash.
    pub fn maximum(&self) -> Option<HashValue> {
        self.hashes
            .keys()
            .next_back()
            .map(|h| HashValue::from_raw(*h, self.width))
    }

    pub fn try_insert(&mut self, hash: HashValue) {
        debug_assert_eq!(hash.width(), self.width, "hash width mismatch");
        if self.is_full() {
            match self.maximum() {
                Some(max) if hash_less_than(max, hash) => return,
                _ => {}
            }
        }

        self.insert_raw(hash.raw(), 1);
    }

    fn insert_raw(&mut self, raw: u64, observations: u32) {
        if let Some(count) = self.hashes.get_mut(&raw) {
            *count += observations;
            self.multiplicity_sum += observations as u64;
            return;
        }

        if self.is_full() {
            match self.hashes.keys().next_back() {
                Some(max) if raw > *max => return,
                _ => {}
            }
        }

        let mut admitted = observations;
        if observations < self.admit_count {
            if let Some(bloom) = &mut self.bloom {
                if !self.pending.contains_key(&raw) && !bloom.check_and_insert(raw) {
                    return;
                }
            }

            if self.pending_min > 1 {
                let count = self.pending.entry(raw).or_insert(0);
                *count += observations;
                if *count < self.pending_min {
                    return;
                }
                self.pending.remove(&raw);
            }

            admitted = self.admit_count;
        }

        self.hashes.insert(raw, admitted);
        self.multiplicity_sum += admitted as u64;

        if self.hashes.len() > self.cardinality_max {
            if let Some((_, count)) = self.hashes.pop_last() {
                self.multiplicity_sum -= count as u64;
            }

            if let Some(max) = self.hashes.keys().next_back() {
                let _ = self.pending.split_off(&max.saturating_add(1));
            }
        }
    }

    /// Fold another accumulator of the same width into this one.
    pub fn merge(&mut self, other: MinHashHeap) {
        debug_assert_eq!(self.width, other.width, "hash width mismatch");
        for (raw, count) in other.hashes {
            self.insert_raw(raw, count.max(self.admit_count));
        }
    }

    /// Mean number of observations across retained hashes.
    pub fn estimate_multiplicity(&self) -> f64 {
        if self.hashes.is_empty() {
            return 0.0;
        }

        self.multiplicity_sum as f64 / self.hashes.len() as f64
    }

    /// Extrapolate the number of distinct values in the stream.
    pub fn estimate_set_size(&self) -> u64 {
        if !self.is_full() {
            return self.hashes.len() as u64;
        }

        match self.hashes.keys().next_back() {
            Some(max) if *max > 0 => {
                (self.width.space() * self.hashes.len() as f64 / *max as f64) as u64
            }
            _ => self.hashes.len() as u64,
        }
    }

    /// Finalize into a sorted hash list and the parallel observation counts.
    pub fn into_hash_list(self) -> (HashList, Vec<u32>) {
        let mut hash_list = HashList::with_capacity(self.width, self.hashes.len());
        let mut counts = Vec::with_capacity(self.hashes.len());
        for (raw, count) in self.hashes {
            hash_list.push_raw(raw);
            counts.push(count);
        }

        (hash_list, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(v: u64) -> HashValue {
        HashValue::Hash64(v)
    }

    #[test]
    fn test_retains_smallest_distinct() {
        let mut heap = MinHashHeap::bounded(HashWidth::Bits64, 3);
        for v in [50, 10, 40, 30, 10, 20, 60] {
            heap.try_insert(h(v));
        }

        assert_eq!(heap.len(), 3);
        assert_eq!(heap.maximum(), Some(h(30)));

        let (hashes, counts) = heap.into_hash_list();
        assert_eq!(hashes, HashList::Hash64(vec![10, 20, 30]));
        assert_eq!(counts, vec![2, 1, 1]);
    }

    #[test]
    fn test_full_heap_ordering() {
        let mut heap = MinHashHeap::bounded(HashWidth::Bits32, 2);
        for v in [7u32, 3] {
            heap.try_insert(HashValue::Hash32(v));
        }

        // larger than the maximum is ignored, equal to it counts again
        heap.try_insert(HashValue::Hash32(9));
        heap.try_insert(HashValue::Hash32(7));
        assert_eq!(heap.maximum(), Some(HashValue::Hash32(7)));

        heap.try_insert(HashValue::Hash32(5));
        let (hashes, counts) = heap.into_hash_list();
        assert_eq!(hashes, HashList::Hash32(vec![3, 5]));
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn test_fewer_than_capacity() {
        let mut heap = MinHashHeap::bounded(HashWidth::Bits32, 10);
        for v in [3u32, 1, 2, 1] {
            heap.try_insert(HashValue::Hash32(v));
        }

        assert_eq!(heap.estimate_set_size(), 3);
        assert!((heap.estimate_multiplicity() - 4.0 / 3.0).abs() < 1e-12);

        let (hashes, _) = heap.into_hash_list();
        assert_eq!(hashes, HashList::Hash32(vec![1, 2, 3]));
    }

    #[test]
    fn test_min_multiplicity() {
        let mut heap = MinHashHeap::new(HashWidth::Bits64, 10, 2, 0);
        heap.try_insert(h(5));
        heap.try_insert(h(7));
        heap.try_insert(h(5));
        assert_eq!(heap.len(), 1);

        heap.try_insert(h(5));
        let (hashes, counts) = heap.into_hash_list();
        assert_eq!(hashes, HashList::Hash64(vec![5]));
        assert_eq!(counts, vec![3]);
    }

    #[test]
    fn test_bloom_filters_singletons() {
        let mut heap = MinHashHeap::new(HashWidth::Bits64, 1000, 2, 1 << 20);

        // solid k-mers seen three times, noise seen once
        for v in 0..100u64 {
            for _ in 0..3 {
                heap.try_insert(h(v * 1000 + 1));
            }
        }
        for v in 0..500u64 {
            heap.try_insert(h(v * 1000 + 7));
        }

        assert_eq!(heap.len(), 100);
        assert_eq!(heap.estimate_set_size(), 100);
        assert!((heap.estimate_multiplicity() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_eviction_prunes_pending() {
        let mut heap = MinHashHeap::new(HashWidth::Bits64, 2, 2, 0);
        heap.try_insert(h(90));
        heap.try_insert(h(1));
        heap.try_insert(h(1));
        heap.try_insert(h(2));
        heap.try_insert(h(2));
        assert_eq!(heap.pending.len(), 1);

        heap.try_insert(h(0));
        heap.try_insert(h(0));

        // 90 was pending and is larger than the retained maximum
        assert!(heap.pending.is_empty());
        assert_eq!(heap.maximum(), Some(h(1)));
    }

    #[test]
    fn test_estimate_set_size_when_full() {
        let mut heap = MinHashHeap::bounded(HashWidth::Bits32, 4);
        let step = u32::MAX / 100;
        for v in 1..=100u32 {
            heap.try_insert(HashValue::Hash32(v * step));
        }

        let estimate = heap.estimate_set_size();
        assert!((90..=110).contains(&estimate), "estimate = {}", estimate);
    }

    #[test]
    fn test_merge() {
        let mut a = MinHashHeap::bounded(HashWidth::Bits64, 3);
        let mut b = MinHashHeap::bounded(HashWidth::Bits64, 3);
        a.try_insert(h(4));
        a.try_insert(h(8));
        b.try_insert(h(4));
        b.try_insert(h(1));
        b.try_insert(h(9));

        a.merge(b);
        let (hashes, counts) = a.into_hash_list();
        assert_eq!(hashes, HashList::Hash64(vec![1, 4, 8]));
        assert_eq!(counts, vec![1, 2, 1]);
    }
}
