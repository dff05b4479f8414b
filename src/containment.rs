use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use csv::Writer;
use log::info;

use crate::hash_list::HashList;
use crate::io_utils::format_float;
use crate::progress::progress_bar;
use crate::sketch::Sketch;
use crate::work_distributor::{distribute, PairError};

/// Fraction of a query's hashes found in a reference along with the
/// standard error of the estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Containment {
    pub score: f64,
    pub error: f64,
}

/// Estimate containment of the query in the reference from sorted lists.
///
/// Only the first min(|reference|, |query|) query positions are examined,
/// so the estimate is restricted to the range both sketches cover.
pub fn contain_sorted<T: Ord>(reference: &[T], query: &[T]) -> Containment {
    let denom = reference.len().min(query.len());

    let (mut i, mut j) = (0, 0);
    let mut common = 0;
    while j < denom && i < reference.len() {
        match reference[i].cmp(&query[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
                common += 1;
            }
        }
    }

    if j == 0 {
        return Containment {
            score: 0.0,
            error: 1.0,
        };
    }

    Containment {
        score: common as f64 / j as f64,
        error: 1.0 / (j as f64).sqrt(),
    }
}

/// Containment for two hash lists, or None if their widths differ.
pub fn contain_sketches(reference: &HashList, query: &HashList) -> Option<Containment> {
    match (reference, query) {
        (HashList::Hash32(r), HashList::Hash32(q)) => Some(contain_sorted(r, q)),
        (HashList::Hash64(r), HashList::Hash64(q)) => Some(contain_sorted(r, q)),
        _ => None,
    }
}

/// Estimate containment of every query in every reference and write the
/// pairs whose error is within `max_error`.
pub fn calc_containment<W: Write>(
    reference: Arc<Sketch>,
    query: Arc<Sketch>,
    max_error: f64,
    threads: usize,
    writer: &mut Writer<W>,
) -> Result<()> {
    info!(
        "Estimating containment of {} queries in {} references:",
        query.len(),
        reference.len()
    );
    let progress_bar = progress_bar(query.len() as u64 * reference.len() as u64);

    let (ref_sketch, query_sketch) = (Arc::clone(&reference), Arc::clone(&query));
    let compare = move |j: usize, i: usize| match (ref_sketch.reference(j), query_sketch.reference(i)) {
        (Some(r), Some(q)) => contain_sketches(&r.hashes, &q.hashes).ok_or(PairError::WidthMismatch {
            ref_index: j,
            query_index: i,
        }),
        _ => Err(PairError::OutOfRange {
            ref_index: j,
            query_index: i,
        }),
    };

    distribute(reference.len(), query.len(), threads, compare, |i, j, result| {
        progress_bar.inc(1);

        if let (Some(c), Some(r), Some(q)) = (result, reference.reference(j), query.reference(i)) {
            if c.error <= max_error {
                writer.write_record([
                    format_float(c.score).as_str(),
                    format_float(c.error).as_str(),
                    r.name.as_str(),
                    q.name.as_str(),
                ])?;
            }
        }

        Ok(())
    })?;

    progress_bar.finish_and_clear();
    writer.flush()?;

    Ok(())
}
