use std::fs::File;
use std::io::stdin;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use needletail::{parse_fastx_reader, FastxReader};

use crate::kmers::{reverse_complement, to_uppercase_in_place, CanonicalKmers};
use crate::min_hash_heap::MinHashHeap;
use crate::sketch::Reference;
use crate::sketch_params::SketchParams;

/// Options for sketching read sets as a single sample.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadsParams {
    /// Minimum copies of a k-mer required for it to be sketched.
    pub min_cov: u32,

    /// Stop reading once the estimated coverage reaches this value (0 disables).
    pub target_cov: f64,

    /// Genome size used in place of the estimated size (0 disables).
    pub genome_size: u64,

    /// Bytes of memory used to filter unique k-mers with a bloom filter (0 disables).
    pub memory_bound: u64,
}

impl Default for ReadsParams {
    fn default() -> Self {
        ReadsParams {
            min_cov: 1,
            target_cov: 0.0,
            genome_size: 0,
            memory_bound: 0,
        }
    }
}

/// A single sequence record waiting to be sketched.
pub struct SequenceInput {
    pub name: String,
    pub comment: String,
    pub seq: Vec<u8>,
}

/// Split a FASTA/Q header into its name and comment.
pub fn split_header(header: &[u8]) -> (String, String) {
    let header = String::from_utf8_lossy(header);
    let header = header.trim_end();
    match header.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((name, comment)) => (name.to_string(), comment.trim_start().to_string()),
        None => (header.to_string(), String::new()),
    }
}

/// Open a FASTA/Q file, or stdin for `-`.
pub fn open_fastx(path: &str) -> Result<Box<dyn FastxReader>> {
    if path == "-" {
        return parse_fastx_reader(stdin()).context("Unable to read sequences from stdin");
    }

    let file = File::open(Path::new(path)).context(format!("Could not open {} for reading", path))?;
    parse_fastx_reader(file).context(format!("Did not find FASTA/Q records in {}", path))
}

/// Hash the k-mers of a sequence into an accumulator.
///
/// The sequence is uppercased in place unless case is preserved. In
/// canonical mode the smaller of each k-mer and its reverse complement is
/// hashed.
pub fn add_min_hashes(heap: &mut MinHashHeap, seq: &mut [u8], params: &SketchParams) {
    if !params.preserve_case() {
        to_uppercase_in_place(seq);
    }

    let rev = if params.noncanonical() {
        None
    } else {
        Some(reverse_complement(seq))
    };

    let alphabet = params.alphabet();
    let kmers = CanonicalKmers::new(seq, rev.as_deref(), params.k() as usize, |c| {
        alphabet.contains(c)
    });

    let seed = params.seed();
    let width = params.hash_width();
    for kmer in kmers {
        heap.try_insert(crate::hashing::hash_kmer(kmer, seed, width));
    }
}

/// Sketch an individual sequence record.
pub fn sketch_sequence(input: SequenceInput, params: &SketchParams, counts: bool) -> Reference {
    let mut seq = input.seq;
    let mut heap = MinHashHeap::bounded(params.hash_width(), params.sketch_size() as usize);
    add_min_hashes(&mut heap, &mut seq, params);

    Reference::from_heap(input.name, input.comment, seq.len() as u64, heap, counts)
}

/// Call `consume` with every record of a file long enough to contain a k-mer.
///
/// Returns the number of records passed on and whether any were too short.
pub fn for_each_sequence<F>(path: &str, kmer_size: u8, mut consume: F) -> Result<(u64, bool)>
where
    F: FnMut(SequenceInput),
{
    let mut reader = open_fastx(path)?;

    let mut count = 0;
    let mut skipped = false;
    while let Some(record) = reader.next() {
        let record = record.context(format!("Error reading {}", path))?;
        if record.num_bases() < kmer_size as usize {
            skipped = true;
            continue;
        }

        let (name, comment) = split_header(record.id());
        consume(SequenceInput {
            name,
            comment,
            seq: record.seq().into_owned(),
        });
        count += 1;
    }

    Ok((count, skipped))
}

/// Sketch all records of one or more files as a single reference.
///
/// Multiple files are read in turn, one record from each, which lets read
/// mode stop early on paired files once the target coverage is reached.
pub fn sketch_file(
    paths: &[String],
    params: &SketchParams,
    reads: Option<&ReadsParams>,
    counts: bool,
) -> Result<Reference> {
    if paths.is_empty() {
        bail!("No input files to sketch.");
    }

    let (min_cov, memory_bound) = reads.map_or((1, 0), |r| (r.min_cov, r.memory_bound));
    let mut heap = MinHashHeap::new(
        params.hash_width(),
        params.sketch_size() as usize,
        min_cov,
        memory_bound,
    );

    let from_stdin = paths[0] == "-";
    let mut name = String::new();
    let mut readers = Vec::with_capacity(paths.len());
    for (idx, path) in paths.iter().enumerate() {
        if path == "-" && idx > 0 {
            bail!("'-' for stdin must be the first input.");
        }

        if path != "-" && name.is_empty() {
            name = path.clone();
        }

        readers.push(open_fastx(path)?);
    }

    let description = if paths.len() > 1 {
        "input files".to_string()
    } else {
        paths[0].clone()
    };

    let mut comment = String::new();
    let mut length: u64 = 0;
    let mut count: u64 = 0;
    let mut skipped = false;
    let mut idx = 0;
    while !readers.is_empty() {
        if idx >= readers.len() {
            idx = 0;
        }

        let record = match readers[idx].next() {
            Some(record) => {
                let record = record.context(format!("Error reading {}", description))?;
                Some((record.id().to_vec(), record.seq().into_owned()))
            }
            None => None,
        };

        let (header, mut seq) = match record {
            Some(record) => record,
            None => {
                readers.remove(idx);
                continue;
            }
        };

        if seq.len() < params.k() as usize {
            skipped = true;
            idx += 1;
            continue;
        }

        if count == 0 {
            let (record_name, record_comment) = split_header(&header);
            if from_stdin {
                name = record_name;
                comment = record_comment;
            } else {
                comment = format!("{} {}", record_name, record_comment);
            }
        }
        count += 1;

        if reads.is_none() {
            length += seq.len() as u64;
        }

        add_min_hashes(&mut heap, &mut seq, params);

        if let Some(reads) = reads {
            if reads.target_cov > 0.0 && heap.estimate_multiplicity() >= reads.target_cov {
                break;
            }
        }

        idx += 1;
    }

    if count == 0 {
        if skipped {
            bail!(
                "All FASTA/Q records in {} were shorter than the k-mer size ({}).",
                description,
                params.k()
            );
        }

        bail!("Did not find FASTA/Q records in \"{}\".", description);
    }

    if let Some(reads) = reads {
        length = if reads.genome_size != 0 {
            reads.genome_size
        } else {
            heap.estimate_set_size()
        };

        info!("Estimated genome size: {}", heap.estimate_set_size());
        info!("Estimated coverage:    {:.3}", heap.estimate_multiplicity());
        if reads.target_cov > 0.0 {
            info!("Reads used:            {}", count);
        }
    }

    if count > 1 {
        comment = format!("[{} seqs] {} [...]", count, comment);
    }

    Ok(Reference::from_heap(name, comment, length, heap, counts))
}
