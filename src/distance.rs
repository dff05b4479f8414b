use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use csv::Writer;
use log::info;

use crate::hash_list::HashList;
use crate::io_utils::format_float;
use crate::progress::progress_bar;
use crate::sketch::{Reference, Sketch};
use crate::statistics::binomial_survival;
use crate::work_distributor::{distribute, PairError};

/// Result of comparing a reference and query sketch.
#[derive(Clone, Debug, PartialEq)]
pub struct PairOutput {
    pub numer: u64,
    pub denom: u64,
    pub distance: f64,
    pub p_value: f64,
    pub pass: bool,
}

/// Reporting thresholds, negative values disable a threshold.
#[derive(Clone, Copy, Debug)]
pub struct DistanceLimits {
    pub max_distance: f64,
    pub max_p_value: f64,
}

/// Count shared hashes in the bottom-`sketch_size` union of two sorted lists.
///
/// Returns (shared, union size). When the merge runs out of one list
/// before reaching `sketch_size`, the unmerged tails of both lists are
/// added to the union size.
pub fn count_shared<T: Ord>(reference: &[T], query: &[T], sketch_size: u64) -> (u64, u64) {
    let (mut i, mut j) = (0, 0);
    let mut common = 0;
    let mut denom = 0;

    while denom < sketch_size && i < reference.len() && j < query.len() {
        match reference[i].cmp(&query[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
                common += 1;
            }
        }

        denom += 1;
    }

    if denom < sketch_size {
        denom += (reference.len() - i) as u64;
        denom += (query.len() - j) as u64;
        denom = denom.min(sketch_size);
    }

    (common, denom)
}

/// Shared hash count for two hash lists, or None if their widths differ.
pub fn count_shared_hashes(
    reference: &HashList,
    query: &HashList,
    sketch_size: u64,
) -> Option<(u64, u64)> {
    match (reference, query) {
        (HashList::Hash32(r), HashList::Hash32(q)) => Some(count_shared(r, q, sketch_size)),
        (HashList::Hash64(r), HashList::Hash64(q)) => Some(count_shared(r, q, sketch_size)),
        _ => None,
    }
}

/// Mash distance for the Jaccard estimate `common` / `denom`.
pub fn mash_distance(common: u64, denom: u64, kmer_size: u8) -> f64 {
    if common == denom {
        return 0.0;
    }
    if common == 0 {
        return 1.0;
    }

    let jaccard = common as f64 / denom as f64;
    let distance = -(2.0 * jaccard / (1.0 + jaccard)).ln() / kmer_size as f64;

    distance.min(1.0)
}

/// Probability of sharing at least `x` of `sketch_size` hashes by chance
/// given the lengths of the two sequences.
pub fn p_value(x: u64, length_ref: u64, length_query: u64, kmer_space: f64, sketch_size: u64) -> f64 {
    if x == 0 {
        return 1.0;
    }

    let p_x = 1.0 / (1.0 + kmer_space / length_ref as f64);
    let p_y = 1.0 / (1.0 + kmer_space / length_query as f64);

    let union = p_x + p_y - p_x * p_y;
    let r = if union > 0.0 { p_x * p_y / union } else { 0.0 };

    binomial_survival(x - 1, r, sketch_size)
}

/// Compare two sketches, marking the result as passing if it is within
/// the reporting limits. The p-value is only computed when the distance
/// passes.
pub fn compare_sketches(
    reference: &Reference,
    query: &Reference,
    sketch_size: u64,
    kmer_size: u8,
    kmer_space: f64,
    limits: &DistanceLimits,
) -> Option<PairOutput> {
    let (common, denom) = count_shared_hashes(&reference.hashes, &query.hashes, sketch_size)?;
    let distance = mash_distance(common, denom, kmer_size);

    let mut output = PairOutput {
        numer: common,
        denom,
        distance,
        p_value: 1.0,
        pass: false,
    };

    if limits.max_distance >= 0.0 && distance > limits.max_distance {
        return Some(output);
    }

    output.p_value = p_value(common, reference.length, query.length, kmer_space, denom);
    if limits.max_p_value >= 0.0 && output.p_value > limits.max_p_value {
        return Some(output);
    }

    output.pass = true;

    Some(output)
}

/// Reporting options for pairwise distances.
#[derive(Clone, Debug)]
pub struct DistanceOptions {
    pub table: bool,
    pub comment_fields: bool,
    pub max_distance: f64,
    pub max_p_value: f64,
    pub threads: usize,
}

fn label(reference: &Reference, comment_fields: bool) -> &str {
    if comment_fields {
        &reference.comment
    } else {
        &reference.name
    }
}

/// Compare every query against every reference and write passing pairs.
///
/// In table mode a row is written per query with a column per reference,
/// leaving cells empty for pairs outside the limits.
pub fn calc_sketch_distances<W: Write>(
    reference: Arc<Sketch>,
    query: Arc<Sketch>,
    options: &DistanceOptions,
    writer: &mut Writer<W>,
) -> Result<()> {
    let sketch_size = reference
        .params()
        .sketch_size()
        .min(query.params().sketch_size()) as u64;
    let kmer_size = reference.params().k();
    let kmer_space = reference.kmer_space();
    let limits = DistanceLimits {
        max_distance: options.max_distance,
        max_p_value: options.max_p_value,
    };

    let ref_count = reference.len();
    if options.table {
        let mut header = vec!["#query".to_string()];
        header.extend(
            reference
                .references()
                .iter()
                .map(|r| label(r, options.comment_fields).to_string()),
        );
        writer.write_record(&header)?;
    }

    info!(
        "Comparing {} queries against {} references:",
        query.len(),
        ref_count
    );
    let progress_bar = progress_bar(query.len() as u64 * ref_count as u64);

    let (ref_sketch, query_sketch) = (Arc::clone(&reference), Arc::clone(&query));
    let compare = move |j: usize, i: usize| {
        let error = PairError::OutOfRange {
            ref_index: j,
            query_index: i,
        };
        let (r, q) = match (ref_sketch.reference(j), query_sketch.reference(i)) {
            (Some(r), Some(q)) => (r, q),
            _ => return Err(error),
        };

        compare_sketches(r, q, sketch_size, kmer_size, kmer_space, &limits).ok_or(
            PairError::WidthMismatch {
                ref_index: j,
                query_index: i,
            },
        )
    };

    let mut row: Vec<String> = Vec::with_capacity(ref_count + 1);
    distribute(ref_count, query.len(), options.threads, compare, |i, j, pair| {
        progress_bar.inc(1);

        let (r, q) = match (reference.reference(j), query.reference(i)) {
            (Some(r), Some(q)) => (r, q),
            _ => return Ok(()),
        };

        if options.table {
            if j == 0 {
                row.clear();
                row.push(label(q, options.comment_fields).to_string());
            }

            row.push(match &pair {
                Some(pair) if pair.pass => format_float(pair.distance),
                _ => String::new(),
            });

            if j + 1 == ref_count {
                writer.write_record(&row)?;
            }
        } else if let Some(pair) = pair.filter(|p| p.pass) {
            writer.write_record([
                label(r, options.comment_fields),
                label(q, options.comment_fields),
                format_float(pair.distance).as_str(),
                format_float(pair.p_value).as_str(),
                format!("{}/{}", pair.numer, pair.denom).as_str(),
            ])?;
        }

        Ok(())
    })?;

    progress_bar.finish_and_clear();
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use crate::sketch_params::SketchParams;
    use crate::sketcher::sketch_file;

    use super::*;

    fn reference(name: &str, length: u64, hashes: Vec<u64>) -> Reference {
        Reference {
            name: name.to_string(),
            comment: format!("{} comment", name),
            length,
            hashes: HashList::Hash64(hashes),
            counts: None,
        }
    }

    fn no_limits() -> DistanceLimits {
        DistanceLimits {
            max_distance: 1.0,
            max_p_value: 1.0,
        }
    }

    #[test]
    fn test_count_shared() {
        let a: Vec<u64> = (1..=10).collect();
        assert_eq!(count_shared(&a, &a, 100), (10, 10));
        assert_eq!(count_shared(&a, &a, 5), (5, 5));

        // tails are added to the union once either list is exhausted
        assert_eq!(count_shared(&[1u64, 2, 3], &[10u64], 10), (0, 4));
        assert_eq!(count_shared(&[1u64, 2, 3], &[10u64, 11, 12], 5), (0, 5));

        assert_eq!(count_shared(&[1u64, 3, 5, 7], &[1u64, 2, 3, 4], 4), (2, 4));
        assert_eq!(count_shared::<u64>(&[], &[], 10), (0, 0));
    }

    #[test]
    fn test_count_shared_hashes_width() {
        let a = HashList::Hash32(vec![1, 2]);
        let b = HashList::Hash64(vec![1, 2]);
        assert_eq!(count_shared_hashes(&a, &b, 10), None);
        assert_eq!(count_shared_hashes(&a, &a, 10), Some((2, 2)));
    }

    #[test]
    fn test_mash_distance() {
        assert_eq!(mash_distance(10, 10, 21), 0.0);
        assert_eq!(mash_distance(0, 10, 21), 1.0);
        assert_eq!(mash_distance(0, 0, 21), 0.0);

        let expected = -(2.0f64 / 3.0).ln() / 21.0;
        assert!((mash_distance(1, 2, 21) - expected).abs() < 1e-12);

        // very low identity is capped
        assert_eq!(mash_distance(1, 1_000_000, 1), 1.0);
    }

    #[test]
    fn test_mash_distance_decreases_with_shared_hashes() {
        for k in [9u8, 16, 21, 32] {
            let mut previous = f64::INFINITY;
            for common in 0..=1000 {
                let d = mash_distance(common, 1000, k);
                assert!((0.0..=1.0).contains(&d));
                assert!(d <= previous, "k={} common={}", k, common);
                previous = d;
            }
            assert_eq!(previous, 0.0);
        }
    }

    #[test]
    fn test_same_file_sketched_twice() {
        let mut state: u64 = 7;
        let seq: String = (0..5000)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 33) as usize % 4] as char
            })
            .collect();

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">genome\n{}", seq).unwrap();
        file.flush().unwrap();
        let path = file.path().to_string_lossy().to_string();

        let params = SketchParams::new(21, "ACGT", 1000, 42);
        let a = sketch_file(&[path.clone()], &params, None, false).unwrap();
        let b = sketch_file(&[path], &params, None, false).unwrap();
        assert_eq!(a.hashes.len(), 1000);

        let pair = compare_sketches(&a, &b, 1000, 21, params.kmer_space(), &no_limits()).unwrap();
        assert_eq!((pair.numer, pair.denom), (1000, 1000));
        assert_eq!(pair.distance, 0.0);
        assert!(pair.p_value < 1e-10);
        assert!(pair.pass);
    }

    #[test]
    fn test_p_value() {
        let space = 4f64.powi(21);
        assert_eq!(p_value(0, 1_000_000, 1_000_000, space, 1000), 1.0);

        let low = p_value(1, 5_000_000, 5_000_000, space, 1000);
        let high = p_value(50, 5_000_000, 5_000_000, space, 1000);
        assert!(low > high);
        assert!(high > 0.0 && high < 1e-10);

        assert_eq!(p_value(3, 0, 0, space, 1000), 0.0);
    }

    #[test]
    fn test_compare_sketches() {
        let a = reference("a", 10_000, (0..100).collect());
        let b = reference("b", 10_000, (50..150).collect());
        let space = 4f64.powi(21);

        let pair = compare_sketches(&a, &b, 100, 21, space, &no_limits()).unwrap();
        assert_eq!((pair.numer, pair.denom), (50, 100));
        assert!(pair.pass);
        assert!(pair.p_value < 1e-10);

        let strict = DistanceLimits {
            max_distance: 0.001,
            max_p_value: 1.0,
        };
        let pair = compare_sketches(&a, &b, 100, 21, space, &strict).unwrap();
        assert!(!pair.pass);

        let identical = compare_sketches(&a, &a, 100, 21, space, &no_limits()).unwrap();
        assert_eq!(identical.distance, 0.0);
        assert!(identical.pass);
    }

    fn sketch(references: Vec<Reference>) -> Arc<Sketch> {
        Arc::new(Sketch::from_references(
            SketchParams::new(21, "ACGT", 100, 42),
            references,
        ))
    }

    #[test]
    fn test_calc_sketch_distances_pairs() {
        let refs = sketch(vec![
            reference("r1", 10_000, (0..100).collect()),
            reference("r2", 10_000, (1000..1100).collect()),
        ]);
        let queries = sketch(vec![reference("q1", 10_000, (0..100).collect())]);

        let options = DistanceOptions {
            table: false,
            comment_fields: false,
            max_distance: 0.5,
            max_p_value: 1.0,
            threads: 2,
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(Vec::new());
        calc_sketch_distances(refs, queries, &options, &mut writer).unwrap();

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(output, "r1\tq1\t0\t0\t100/100\n");
    }

    #[test]
    fn test_calc_sketch_distances_table() {
        let refs = sketch(vec![
            reference("r1", 10_000, (0..100).collect()),
            reference("r2", 10_000, (1000..1100).collect()),
        ]);
        let queries = sketch(vec![
            reference("q1", 10_000, (0..100).collect()),
            reference("q2", 10_000, (1000..1100).collect()),
        ]);

        let options = DistanceOptions {
            table: true,
            comment_fields: true,
            max_distance: 0.5,
            max_p_value: 1.0,
            threads: 1,
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(Vec::new());
        calc_sketch_distances(refs, queries, &options, &mut writer).unwrap();

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            output,
            "#query\tr1 comment\tr2 comment\nq1 comment\t0\t\nq2 comment\t\t0\n"
        );
    }
}
