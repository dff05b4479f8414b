use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use anyhow::{Context, Result};
use csv::Writer;
use log::{info, warn};
use num_format::ToFormattedString;

use crate::config::LOCALE;
use crate::hashing::hash_kmer;
use crate::io_utils::format_float;
use crate::kmers::{reverse_complement, six_frame_translations, to_uppercase_in_place, CanonicalKmers};
use crate::min_hash_heap::MinHashHeap;
use crate::sketch::Sketch;
use crate::sketch_params::SketchParams;
use crate::sketcher::open_fastx;
use crate::statistics::binomial_survival;
use crate::thread_pool::ThreadPool;

#[derive(Clone, Debug)]
pub struct ScreenOptions {
    /// Assign each observed hash only to the reference it fits best.
    pub winner_takes_all: bool,

    /// Report references at or above this identity. At 0 only references
    /// with a shared hash are reported, below 0 every reference is.
    pub min_identity: f64,

    pub max_p_value: f64,
    pub threads: usize,
}

/// A reference estimated to be present in the mixture.
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenHit {
    pub identity: f64,
    pub shared: u64,
    pub sketch_size: u64,
    pub median_multiplicity: u32,
    pub p_value: f64,
    pub name: String,
    pub comment: String,
}

/// Sequence identity implied by sharing `common` of `denom` hashes.
pub fn estimate_identity(common: u64, denom: u64, kmer_size: u8) -> f64 {
    if common == denom {
        return 1.0;
    }
    if common == 0 {
        return 0.0;
    }

    (common as f64 / denom as f64).powf(1.0 / kmer_size as f64)
}

/// Probability of at least `x` of `sketch_size` hashes appearing in a set
/// of `set_size` random k-mers by chance.
pub fn p_value_within(x: u64, set_size: u64, kmer_space: f64, sketch_size: u64) -> f64 {
    if x == 0 {
        return 1.0;
    }

    let r = (set_size as f64 / kmer_space).clamp(0.0, 1.0);
    binomial_survival(x - 1, r, sketch_size)
}

/// Observation counts for the hashes of the screened sketch.
struct HashCounter {
    params: SketchParams,
    counts: HashMap<u64, AtomicU32>,
}

impl HashCounter {
    fn count(&self, raw: u64) -> u32 {
        self.counts
            .get(&raw)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Count sketch hashes in one mixture record and accumulate the record's
    /// smallest hashes for estimating the mixture size.
    fn count_sequence(&self, mut seq: Vec<u8>) -> MinHashHeap {
        let params = &self.params;
        let mut heap = MinHashHeap::bounded(params.hash_width(), params.sketch_size() as usize);

        if !params.preserve_case() {
            to_uppercase_in_place(&mut seq);
        }

        let k = params.k() as usize;
        let alphabet = params.alphabet();
        let mut observe = |kmer: &[u8]| {
            let hash = hash_kmer(kmer, params.seed(), params.hash_width());
            if let Some(count) = self.counts.get(&hash.raw()) {
                count.fetch_add(1, Ordering::Relaxed);
            }
            heap.try_insert(hash);
        };

        if params.is_protein() {
            let rev = reverse_complement(&seq);
            for frame in six_frame_translations(&seq, &rev) {
                for kmer in CanonicalKmers::new(&frame, None, k, |c| alphabet.contains(c)) {
                    observe(kmer);
                }
            }
        } else {
            let rev = if params.noncanonical() {
                None
            } else {
                Some(reverse_complement(&seq))
            };

            for kmer in CanonicalKmers::new(&seq, rev.as_deref(), k, |c| alphabet.contains(c)) {
                observe(kmer);
            }
        }

        heap
    }
}

/// Estimate which references of `sketch` are contained in the mixture
/// formed by the records of `mixtures`.
pub fn screen(sketch: &Sketch, mixtures: &[String], options: &ScreenOptions) -> Result<Vec<ScreenHit>> {
    let params = sketch.params().clone();

    let mut table: HashMap<u64, Vec<usize>> = HashMap::new();
    for (idx, reference) in sketch.references().iter().enumerate() {
        for raw in reference.hashes.iter_raw() {
            table.entry(raw).or_default().push(idx);
        }
    }

    info!(
        "Loaded {} distinct hashes from {} references.",
        table.len().to_formatted_string(&LOCALE),
        sketch.len().to_formatted_string(&LOCALE)
    );

    let counter = Arc::new(HashCounter {
        params: params.clone(),
        counts: table.keys().map(|raw| (*raw, AtomicU32::new(0))).collect(),
    });

    let worker = Arc::clone(&counter);
    let mut pool = ThreadPool::new(
        move |seq: Vec<u8>| worker.count_sequence(seq),
        options.threads,
    )?;

    let mut mixture_heap =
        MinHashHeap::bounded(params.hash_width(), params.sketch_size() as usize);
    for mixture in mixtures {
        let source = if mixture == "-" { "stdin" } else { mixture.as_str() };
        info!("Streaming from {}...", source);

        let mut reader = open_fastx(mixture)?;
        while let Some(record) = reader.next() {
            let record = record.context(format!("Error reading {}", mixture))?;
            if record.num_bases() < params.k() as usize {
                continue;
            }

            pool.run_when_thread_available(record.seq().into_owned());

            while pool.output_available() {
                if let Some(heap) = pool.pop_output_when_available() {
                    mixture_heap.merge(heap);
                }
            }
        }
    }

    while pool.running() {
        if let Some(heap) = pool.pop_output_when_available() {
            mixture_heap.merge(heap);
        }
    }

    let set_size = mixture_heap.estimate_set_size();
    if set_size == 0 {
        warn!("No k-mers were found in the mixture.");
    }
    info!(
        "Estimated distinct k-mers in mixture: {}",
        set_size.to_formatted_string(&LOCALE)
    );

    Ok(summarize(sketch, &table, &counter, set_size, options))
}

fn summarize(
    sketch: &Sketch,
    table: &HashMap<u64, Vec<usize>>,
    counter: &HashCounter,
    set_size: u64,
    options: &ScreenOptions,
) -> Vec<ScreenHit> {
    let references = sketch.references();
    let kmer_size = sketch.params().k();

    let mut shared = vec![0u64; references.len()];
    let mut depths: Vec<Vec<u32>> = vec![Vec::new(); references.len()];
    for (idx, reference) in references.iter().enumerate() {
        for raw in reference.hashes.iter_raw() {
            let count = counter.count(raw);
            if count > 0 {
                shared[idx] += 1;
                depths[idx].push(count);
            }
        }
    }

    if options.winner_takes_all {
        let scores: Vec<f64> = references
            .iter()
            .enumerate()
            .map(|(idx, r)| estimate_identity(shared[idx], r.hashes.len() as u64, kmer_size))
            .collect();

        shared = vec![0; references.len()];
        depths = vec![Vec::new(); references.len()];
        for (raw, indices) in table {
            let count = counter.count(*raw);
            if count == 0 {
                continue;
            }

            let winner = indices.iter().copied().reduce(|best, idx| {
                let better = scores[idx] > scores[best]
                    || (scores[idx] == scores[best] && references[idx].length > references[best].length);
                if better {
                    idx
                } else {
                    best
                }
            });

            if let Some(winner) = winner {
                shared[winner] += 1;
                depths[winner].push(count);
            }
        }
    }

    let mut hits = Vec::new();
    for (idx, reference) in references.iter().enumerate() {
        if shared[idx] == 0 && options.min_identity >= 0.0 {
            continue;
        }

        let sketch_size = reference.hashes.len() as u64;
        let identity = estimate_identity(shared[idx], sketch_size, kmer_size);
        if identity < options.min_identity {
            continue;
        }

        let p_value = p_value_within(shared[idx], set_size, sketch.kmer_space(), sketch_size);
        if p_value > options.max_p_value {
            continue;
        }

        let depths = &mut depths[idx];
        depths.sort_unstable();
        let median_multiplicity = depths.get(depths.len() / 2).copied().unwrap_or(0);

        hits.push(ScreenHit {
            identity,
            shared: shared[idx],
            sketch_size,
            median_multiplicity,
            p_value,
            name: reference.name.clone(),
            comment: reference.comment.clone(),
        });
    }

    hits
}

/// Write hits as `identity, shared/size, median, p-value, name, comment`.
pub fn write_screen_hits<W: Write>(hits: &[ScreenHit], writer: &mut Writer<W>) -> Result<()> {
    for hit in hits {
        writer.write_record([
            format_float(hit.identity).as_str(),
            format!("{}/{}", hit.shared, hit.sketch_size).as_str(),
            hit.median_multiplicity.to_string().as_str(),
            format_float(hit.p_value).as_str(),
            hit.name.as_str(),
            hit.comment.as_str(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::{tempdir, TempDir};

    use crate::sketcher::sketch_file;

    use super::*;

    fn random_seq(mut state: u64, len: usize) -> String {
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 33) as usize % 4] as char
            })
            .collect()
    }

    fn write_fasta(dir: &TempDir, name: &str, records: &[(&str, &str)]) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for (id, seq) in records {
            writeln!(file, ">{}\n{}", id, seq).unwrap();
        }
        path.to_string_lossy().to_string()
    }

    fn options() -> ScreenOptions {
        ScreenOptions {
            winner_takes_all: false,
            min_identity: 0.0,
            max_p_value: 1.0,
            threads: 2,
        }
    }

    #[test]
    fn test_estimate_identity() {
        assert_eq!(estimate_identity(10, 10, 21), 1.0);
        assert_eq!(estimate_identity(0, 10, 21), 0.0);
        assert!((estimate_identity(1, 2, 2) - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_p_value_within() {
        assert_eq!(p_value_within(0, 1000, 1e9, 100), 1.0);
        assert!(p_value_within(50, 1000, 1e9, 100) < 1e-100);

        // a set larger than the k-mer space saturates
        assert_eq!(p_value_within(100, 10, 4.0, 100), 1.0);
    }

    #[test]
    fn test_screen_finds_present_reference() {
        let dir = tempdir().unwrap();
        let present = random_seq(7, 5000);
        let absent = random_seq(11, 5000);

        let params = SketchParams::new(15, "ACGT", 200, 42);
        let refs = vec![
            sketch_file(&[write_fasta(&dir, "present.fa", &[("p", present.as_str())])], &params, None, false)
                .unwrap(),
            sketch_file(&[write_fasta(&dir, "absent.fa", &[("a", absent.as_str())])], &params, None, false)
                .unwrap(),
        ];
        let sketch = Sketch::from_references(params, refs);

        let mixture = write_fasta(&dir, "mix.fa", &[("m1", &present[..2500]), ("m2", &present[2486..])]);
        let hits = screen(&sketch, &[mixture.clone()], &options()).unwrap();

        assert_eq!(hits.len(), 1);
        assert!(hits[0].name.ends_with("present.fa"));
        assert_eq!(hits[0].identity, 1.0);
        assert_eq!(hits[0].shared, 200);
        assert_eq!(hits[0].median_multiplicity, 1);

        let mut everything = options();
        everything.min_identity = -1.0;
        let hits = screen(&sketch, &[mixture], &everything).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_winner_takes_all() {
        let dir = tempdir().unwrap();
        let seq = random_seq(3, 4000);
        let longer = format!("{}{}", seq, random_seq(5, 1000));

        let params = SketchParams::new(15, "ACGT", 100, 42);
        let refs = vec![
            sketch_file(&[write_fasta(&dir, "a.fa", &[("a", seq.as_str())])], &params, None, false).unwrap(),
            sketch_file(&[write_fasta(&dir, "b.fa", &[("b", seq.as_str())])], &params, None, false).unwrap(),
        ];
        let sketch = Sketch::from_references(params, refs);
        let mixture = write_fasta(&dir, "mix.fa", &[("m", longer.as_str())]);

        let hits = screen(&sketch, &[mixture.clone()], &options()).unwrap();
        assert_eq!(hits.len(), 2);

        let mut wta = options();
        wta.winner_takes_all = true;
        let hits = screen(&sketch, &[mixture], &wta).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].name.ends_with("a.fa"));
        assert_eq!(hits[0].identity, 1.0);
    }

    #[test]
    fn test_write_screen_hits() {
        let hits = vec![ScreenHit {
            identity: 0.95,
            shared: 800,
            sketch_size: 1000,
            median_multiplicity: 3,
            p_value: 0.0,
            name: "genome.fa".to_string(),
            comment: "[2 seqs] chr1 [...]".to_string(),
        }];

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(Vec::new());
        write_screen_hits(&hits, &mut writer).unwrap();

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(output, "0.95\t800/1000\t3\t0\tgenome.fa\t[2 seqs] chr1 [...]\n");
    }
}
