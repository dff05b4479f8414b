use std::io::Write;

use anyhow::Result;
use itertools::Itertools;

use crate::io_utils::format_float;
use crate::statistics::binomial_quantile;

pub const SKETCH_SIZES: [u64; 9] = [
    100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000,
];
pub const DISTANCES: [f64; 8] = [0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4];

/// Distance estimates the error bounds are computed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundKind {
    /// Mash distance from the Jaccard index of two sketches.
    Mash,

    /// Screen distance from the containment of a sketch in a mixture.
    Screen,
}

impl BoundKind {
    fn title(&self) -> &'static str {
        match self {
            BoundKind::Mash => "Mash distance",
            BoundKind::Screen => "Screen distance",
        }
    }

    fn distance_to_jaccard(&self, distance: f64, kmer_size: f64) -> f64 {
        match self {
            BoundKind::Mash => 1.0 / (2.0 * (kmer_size * distance).exp() - 1.0),
            BoundKind::Screen => (1.0 - distance).powf(kmer_size),
        }
    }

    fn jaccard_to_distance(&self, jaccard: f64, kmer_size: f64) -> f64 {
        match self {
            BoundKind::Mash => -1.0 / kmer_size * (2.0 * jaccard / (1.0 + jaccard)).ln(),
            BoundKind::Screen => 1.0 - jaccard.powf(1.0 / kmer_size),
        }
    }
}

/// Difference between the distance implied by the lower `probability`
/// bound on shared hashes and the true distance.
pub fn distance_error_bound(
    kind: BoundKind,
    kmer_size: u8,
    probability: f64,
    sketch_size: u64,
    distance: f64,
) -> f64 {
    let k = kmer_size as f64;
    let jaccard = kind.distance_to_jaccard(distance, k);

    let x = binomial_quantile((1.0 - probability) / 2.0, jaccard, sketch_size);
    let jaccard_estimate = x as f64 / sketch_size as f64;

    kind.jaccard_to_distance(jaccard_estimate, k) - distance
}

/// Write the error bound tables for both kinds of distance.
pub fn write_bounds<W: Write>(kmer_size: u8, probability: f64, writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "Parameters (run with -h for details):")?;
    writeln!(writer, "   k:   {}", kmer_size)?;
    writeln!(writer, "   p:   {}", format_float(probability))?;
    writeln!(writer)?;

    for kind in [BoundKind::Mash, BoundKind::Screen] {
        writeln!(writer, "\t{}", kind.title())?;

        let header = DISTANCES.iter().map(|d| format_float(*d)).join("\t");
        writeln!(writer, "Sketch\t{}", header)?;

        for &sketch_size in SKETCH_SIZES.iter() {
            let row = DISTANCES
                .iter()
                .map(|d| {
                    format_float(distance_error_bound(
                        kind,
                        kmer_size,
                        probability,
                        sketch_size,
                        *d,
                    ))
                })
                .join("\t");
            writeln!(writer, "{}\t{}", sketch_size, row)?;
        }

        writeln!(writer)?;
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_shrinks_with_sketch_size() {
        for kind in [BoundKind::Mash, BoundKind::Screen] {
            let small = distance_error_bound(kind, 21, 0.99, 100, 0.05);
            let large = distance_error_bound(kind, 21, 0.99, 1_000_000, 0.05);

            assert!(small > 0.0, "{:?}", kind);
            assert!(large > 0.0 && large < small, "{:?}", kind);
            assert!(large < 0.001, "{:?}", kind);
        }
    }

    #[test]
    fn test_conversions_invert() {
        for kind in [BoundKind::Mash, BoundKind::Screen] {
            let j = kind.distance_to_jaccard(0.1, 21.0);
            assert!((kind.jaccard_to_distance(j, 21.0) - 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn test_write_bounds_layout() {
        let mut out = Vec::new();
        write_bounds(21, 0.99, &mut out).unwrap();
        let output = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "Parameters (run with -h for details):");
        assert_eq!(lines[2], "   k:   21");
        assert_eq!(lines[3], "   p:   0.99");
        assert_eq!(lines[5], "\tMash distance");
        assert_eq!(lines[6], "Sketch\t0.05\t0.1\t0.15\t0.2\t0.25\t0.3\t0.35\t0.4");
        assert!(lines[7].starts_with("100\t"));
        assert_eq!(lines[7].split('\t').count(), 9);
        assert!(lines[15].starts_with("1000000\t"));
        assert_eq!(lines[17], "\tScreen distance");
    }
}
