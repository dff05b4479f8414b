use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use csv::Writer;
use log::{info, warn};

use crate::distance::{compare_sketches, DistanceLimits, PairOutput};
use crate::io_utils::format_float;
use crate::progress::progress_bar;
use crate::sketch::{Reference, Sketch};
use crate::thread_pool::ThreadPool;

/// Output settings for the lower triangle of a distance matrix.
#[derive(Clone, Debug)]
pub struct TriangleOptions {
    pub comment_fields: bool,
    pub edge_list: bool,
    pub max_distance: f64,
    pub max_p_value: f64,
    pub threads: usize,
}

struct TriangleRow {
    index: usize,
    pairs: Vec<Option<PairOutput>>,
}

fn label(reference: &Reference, comment_fields: bool) -> &str {
    if comment_fields {
        &reference.comment
    } else {
        &reference.name
    }
}

/// Compare row `index` against every earlier reference.
fn compare_row(sketch: &Sketch, index: usize, limits: &DistanceLimits) -> TriangleRow {
    let sketch_size = sketch.params().sketch_size() as u64;
    let kmer_size = sketch.params().k();
    let kmer_space = sketch.kmer_space();

    let pairs = match sketch.reference(index) {
        Some(query) => sketch.references()[..index]
            .iter()
            .map(|r| compare_sketches(r, query, sketch_size, kmer_size, kmer_space, limits))
            .collect(),
        None => Vec::new(),
    };

    TriangleRow { index, pairs }
}

/// Write the lower triangle of the all-pairs distance matrix, either as a
/// Phylip-style matrix or as an edge list of passing pairs.
///
/// Returns the largest p-value among the reported pairs.
pub fn calc_triangle<W: Write>(
    sketch: Arc<Sketch>,
    options: &TriangleOptions,
    writer: &mut Writer<W>,
) -> Result<f64> {
    let count = sketch.len();
    let limits = if options.edge_list {
        DistanceLimits {
            max_distance: options.max_distance,
            max_p_value: options.max_p_value,
        }
    } else {
        DistanceLimits {
            max_distance: -1.0,
            max_p_value: -1.0,
        }
    };

    if !options.edge_list {
        writer.write_record(["", count.to_string().as_str()])?;
        if let Some(first) = sketch.reference(0) {
            writer.write_record([label(first, options.comment_fields)])?;
        }
    }

    info!("Computing distances between {} sketches:", count);
    let progress_bar = progress_bar(count.saturating_sub(1) as u64);

    let shared = Arc::clone(&sketch);
    let mut pool = ThreadPool::new(
        move |index: usize| compare_row(&shared, index, &limits),
        options.threads,
    )?;

    let mut max_p_value = 0.0f64;
    let mut write_row = |row: TriangleRow| -> Result<()> {
        progress_bar.inc(1);

        let query = match sketch.reference(row.index) {
            Some(query) => query,
            None => return Ok(()),
        };
        let query_label = label(query, options.comment_fields);

        let mut record = Vec::with_capacity(row.pairs.len() + 1);
        if !options.edge_list {
            record.push(query_label.to_string());
        }

        for (j, pair) in row.pairs.iter().enumerate() {
            let pair = match pair {
                Some(pair) => pair,
                None => {
                    warn!(
                        "Skipping comparison of {} and {}: hash widths differ.",
                        query.name,
                        sketch.references()[j].name
                    );
                    record.push(String::new());
                    continue;
                }
            };

            if pair.pass {
                max_p_value = max_p_value.max(pair.p_value);
            }

            if options.edge_list {
                if pair.pass {
                    writer.write_record([
                        query_label,
                        label(&sketch.references()[j], options.comment_fields),
                        format_float(pair.distance).as_str(),
                        format_float(pair.p_value).as_str(),
                        format!("{}/{}", pair.numer, pair.denom).as_str(),
                    ])?;
                }
            } else {
                record.push(format_float(pair.distance));
            }
        }

        if !options.edge_list {
            writer.write_record(&record)?;
        }

        Ok(())
    };

    for index in 1..count {
        pool.run_when_thread_available(index);

        while pool.output_available() {
            if let Some(row) = pool.pop_output_when_available() {
                write_row(row)?;
            }
        }
    }

    while pool.running() {
        if let Some(row) = pool.pop_output_when_available() {
            write_row(row)?;
        }
    }

    progress_bar.finish_and_clear();
    writer.flush()?;

    info!("Max p-value: {}", format_float(max_p_value));

    Ok(max_p_value)
}
