use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use log::warn;

use crate::thread_pool::ThreadPool;

/// Upper bound on pairs handled by one unit of work.
pub const MAX_PAIRS_PER_CHUNK: u64 = 0x1000;

/// Failure to compare a single reference/query pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairError {
    OutOfRange {
        ref_index: usize,
        query_index: usize,
    },
    WidthMismatch {
        ref_index: usize,
        query_index: usize,
    },
}

impl fmt::Display for PairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairError::OutOfRange {
                ref_index,
                query_index,
            } => write!(
                f,
                "reference {} or query {} is out of range",
                ref_index, query_index
            ),
            PairError::WidthMismatch {
                ref_index,
                query_index,
            } => write!(
                f,
                "reference {} and query {} use different hash widths",
                ref_index, query_index
            ),
        }
    }
}

impl std::error::Error for PairError {}

/// A run of consecutive pairs in row-major (query, reference) order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairChunk {
    pub query_start: usize,
    pub ref_start: usize,
    pub pair_count: usize,
}

/// Number of pairs given to each unit of work.
pub fn pairs_per_chunk(pair_count: u64, parallelism: usize) -> u64 {
    (pair_count / parallelism.max(1) as u64).clamp(1, MAX_PAIRS_PER_CHUNK)
}

/// Chunks covering every pair of `query_count` x `ref_count` exactly once.
pub struct PairChunks {
    ref_count: u64,
    query_count: u64,
    per_chunk: u64,
    i: u64,
    j: u64,
    started: bool,
}

impl PairChunks {
    pub fn new(ref_count: usize, query_count: usize, parallelism: usize) -> Self {
        let pair_count = ref_count as u64 * query_count as u64;
        PairChunks {
            ref_count: ref_count as u64,
            query_count: query_count as u64,
            per_chunk: pairs_per_chunk(pair_count, parallelism),
            i: 0,
            j: 0,
            started: false,
        }
    }
}

impl Iterator for PairChunks {
    type Item = PairChunk;

    fn next(&mut self) -> Option<PairChunk> {
        if self.ref_count == 0 || self.query_count == 0 {
            return None;
        }

        if self.started {
            self.i += self.per_chunk / self.ref_count;
            self.j += self.per_chunk % self.ref_count;

            if self.j >= self.ref_count {
                if self.i + 1 >= self.query_count {
                    return None;
                }
                self.i += 1;
                self.j -= self.ref_count;
            }
        }
        self.started = true;

        if self.i >= self.query_count {
            return None;
        }

        Some(PairChunk {
            query_start: self.i as usize,
            ref_start: self.j as usize,
            pair_count: self.per_chunk as usize,
        })
    }
}

/// Results for one chunk, in pair order.
pub struct ChunkOutput<T> {
    pub chunk: PairChunk,
    pub results: Vec<std::result::Result<T, PairError>>,
}

/// Compare every (query, reference) pair in parallel.
///
/// `consume` is called once per pair in row-major order with None for
/// pairs whose comparison failed. Failures are logged and do not stop
/// the remaining comparisons.
pub fn distribute<T, F, C>(
    ref_count: usize,
    query_count: usize,
    parallelism: usize,
    compare: F,
    mut consume: C,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(usize, usize) -> std::result::Result<T, PairError> + Send + Sync + 'static,
    C: FnMut(usize, usize, Option<T>) -> Result<()>,
{
    let compare = Arc::new(compare);
    let mut pool = ThreadPool::new(
        move |chunk: PairChunk| {
            let mut results = Vec::with_capacity(chunk.pair_count);
            let (mut i, mut j) = (chunk.query_start, chunk.ref_start);
            for _ in 0..chunk.pair_count {
                if i >= query_count {
                    break;
                }

                results.push(compare(j, i));

                j += 1;
                if j == ref_count {
                    j = 0;
                    i += 1;
                }
            }

            ChunkOutput { chunk, results }
        },
        parallelism,
    )?;

    let mut drain = |output: ChunkOutput<T>| -> Result<()> {
        let (mut i, mut j) = (output.chunk.query_start, output.chunk.ref_start);
        for result in output.results {
            match result {
                Ok(value) => consume(i, j, Some(value))?,
                Err(e) => {
                    warn!("Skipping comparison: {}.", e);
                    consume(i, j, None)?;
                }
            }

            j += 1;
            if j == ref_count {
                j = 0;
                i += 1;
            }
        }

        Ok(())
    };

    for chunk in PairChunks::new(ref_count, query_count, parallelism) {
        pool.run_when_thread_available(chunk);

        while pool.output_available() {
            if let Some(output) = pool.pop_output_when_available() {
                drain(output)?;
            }
        }
    }

    while pool.running() {
        if let Some(output) = pool.pop_output_when_available() {
            drain(output)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_pairs(ref_count: usize, query_count: usize, parallelism: usize) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for chunk in PairChunks::new(ref_count, query_count, parallelism) {
            let (mut i, mut j) = (chunk.query_start, chunk.ref_start);
            for _ in 0..chunk.pair_count {
                if i >= query_count {
                    break;
                }
                pairs.push((i, j));
                j += 1;
                if j == ref_count {
                    j = 0;
                    i += 1;
                }
            }
        }
        pairs
    }

    fn row_major(ref_count: usize, query_count: usize) -> Vec<(usize, usize)> {
        (0..query_count)
            .flat_map(|i| (0..ref_count).map(move |j| (i, j)))
            .collect()
    }

    #[test]
    fn test_pairs_per_chunk() {
        assert_eq!(pairs_per_chunk(0, 4), 1);
        assert_eq!(pairs_per_chunk(3, 4), 1);
        assert_eq!(pairs_per_chunk(100, 4), 25);
        assert_eq!(pairs_per_chunk(1_000_000, 1), MAX_PAIRS_PER_CHUNK);
    }

    #[test]
    fn test_chunks_cover_grid_once() {
        for &(r, q, p) in &[
            (1, 1, 1),
            (3, 5, 2),
            (7, 3, 4),
            (5, 5, 3),
            (10, 1, 3),
            (1, 10, 3),
            (13, 17, 5),
            (100, 90, 1),
        ] {
            assert_eq!(covered_pairs(r, q, p), row_major(r, q), "r={} q={} p={}", r, q, p);
        }
    }

    #[test]
    fn test_empty_grid() {
        assert_eq!(PairChunks::new(0, 5, 2).count(), 0);
        assert_eq!(PairChunks::new(5, 0, 2).count(), 0);
    }

    #[test]
    fn test_distribute_in_order() {
        let mut seen = Vec::new();
        distribute(
            4,
            6,
            3,
            |j, i| Ok(i * 10 + j),
            |i, j, v| {
                assert_eq!(v, Some(i * 10 + j));
                seen.push((i, j));
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(seen, row_major(4, 6));
    }

    #[test]
    fn test_distribute_skips_failed_pairs() {
        let mut values = Vec::new();
        distribute(
            2,
            2,
            2,
            |j, i| {
                if i == 1 && j == 0 {
                    Err(PairError::OutOfRange {
                        ref_index: j,
                        query_index: i,
                    })
                } else {
                    Ok(j + i)
                }
            },
            |_, _, v| {
                values.push(v);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(values, vec![Some(0), Some(1), None, Some(2)]);
    }
}
