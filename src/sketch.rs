use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::hash_list::HashList;
use crate::io_utils::is_prebuilt_sketch;
use crate::maybe_gzip_io::maybe_gzip_reader;
use crate::min_hash_heap::MinHashHeap;
use crate::progress::progress_bar;
use crate::sketch_params::SketchParams;
use crate::sketcher::{for_each_sequence, sketch_file, sketch_sequence, ReadsParams, SequenceInput};
use crate::thread_pool::ThreadPool;

pub const SKETCH_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
pub struct SketchHeader {
    pub program: String,
    pub version: String,
    pub date_created: String,
    pub sketch_version: String,
    pub num_references: u64,
    pub params: SketchParams,
}

/// A sketched sequence, file, or read set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub comment: String,
    pub length: u64,
    pub hashes: HashList,
    pub counts: Option<Vec<u32>>,
}

impl Reference {
    pub fn from_heap(
        name: String,
        comment: String,
        length: u64,
        heap: MinHashHeap,
        keep_counts: bool,
    ) -> Self {
        let (hashes, counts) = heap.into_hash_list();

        Reference {
            name,
            comment,
            length,
            hashes,
            counts: if keep_counts { Some(counts) } else { None },
        }
    }

    /// Keep only the `size` smallest hashes.
    pub fn reduce(&mut self, size: usize) {
        self.hashes.truncate(size);
        if let Some(counts) = &mut self.counts {
            counts.truncate(size);
        }
    }
}

/// Advisory raised when references are long enough for random k-mer matches
/// to bias distance estimates.
#[derive(Debug, PartialEq)]
pub struct KmerSizeAdvisory {
    pub kmer_size: u8,
    pub warning: f64,
    pub longest_name: String,
    pub longest_length: u64,
    pub random_chance: f64,
    pub min_kmer_size: u32,
    pub count: usize,
}

impl KmerSizeAdvisory {
    pub fn message(&self) -> String {
        let mut msg = format!(
            "For the k-mer size used ({}), the random match probability ({:.6}) is above the specified warning threshold ({}) for the sequence \"{}\" of size {}",
            self.kmer_size, self.random_chance, self.warning, self.longest_name, self.longest_length
        );

        if self.count > 1 {
            msg += &format!(" (and {} others)", self.count - 1);
        }

        msg += &format!(
            ". Distances to {} may be underestimated as a result. To meet the threshold of {}, a k-mer size of at least {} is required.",
            if self.count == 1 {
                "this sequence"
            } else {
                "these sequences"
            },
            self.warning,
            self.min_kmer_size
        );

        msg
    }
}

/// Options controlling how inputs are turned into a collection.
#[derive(Clone, Debug)]
pub struct SketchLoadOptions {
    pub threads: usize,

    /// Keep the given parameters rather than inheriting them from the first sketch file.
    pub enforce_parameters: bool,

    /// Accept sketch files with a smaller sketch size.
    pub contain: bool,

    /// Keep k-mer counts for sketched sequences.
    pub counts: bool,
}

impl Default for SketchLoadOptions {
    fn default() -> Self {
        SketchLoadOptions {
            threads: 1,
            enforce_parameters: false,
            contain: false,
            counts: false,
        }
    }
}

enum SketchTask {
    Load { path: String },
    File { path: String },
    Sequence(SequenceInput),
}

struct SketchJob {
    task: SketchTask,
    params: Arc<SketchParams>,
    counts: bool,
}

fn run_sketch_job(job: SketchJob) -> Result<Vec<Reference>> {
    let params = job.params.as_ref();
    match job.task {
        SketchTask::Load { path } => {
            let (_, mut references) = read_sketch_file(Path::new(&path))?;
            for reference in references.iter_mut() {
                reference.reduce(params.sketch_size() as usize);
            }
            Ok(references)
        }
        SketchTask::File { path } => Ok(vec![sketch_file(&[path], params, None, job.counts)?]),
        SketchTask::Sequence(input) => Ok(vec![sketch_sequence(input, params, job.counts)]),
    }
}

/// Ordered collection of references sharing one set of parameters.
pub struct Sketch {
    params: SketchParams,
    references: Vec<Reference>,
    reference_indices: HashMap<String, usize>,
    kmer_space: f64,
}

impl Sketch {
    /// Collection built from sketched sequences. Duplicate names are
    /// allowed; lookups by name use the first.
    pub fn from_references(params: SketchParams, references: Vec<Reference>) -> Self {
        let mut sketch = Sketch::unindexed(params, references);
        sketch.warn_duplicates();

        sketch
    }

    /// Collection of references read from sketch files, which must have
    /// unique names.
    pub fn from_loaded_references(params: SketchParams, references: Vec<Reference>) -> Result<Self> {
        let mut sketch = Sketch::unindexed(params, references);
        let duplicates = sketch.create_index();
        if let Some(name) = duplicates.first() {
            bail!(
                "Found {} references with duplicate names, e.g. \"{}\". Reference names in sketch files must be unique.",
                duplicates.len(),
                name
            );
        }

        Ok(sketch)
    }

    fn unindexed(params: SketchParams, references: Vec<Reference>) -> Self {
        Sketch {
            params,
            references,
            reference_indices: HashMap::new(),
            kmer_space: 0.0,
        }
    }

    /// Build a collection from sketch files and sequence files.
    ///
    /// Sketch files with parameters that cannot be compared to the current
    /// parameters are skipped with a warning. Unless parameters are enforced,
    /// a sketch file given first sets the parameters for the collection.
    pub fn init_from_files(
        files: &[String],
        params: SketchParams,
        options: &SketchLoadOptions,
    ) -> Result<Sketch> {
        let mut params = params;
        let mut pool = ThreadPool::new(run_sketch_job, options.threads)?;
        let mut references = Vec::new();
        let mut sketched_sequences = false;

        let progress_bar = progress_bar(files.len() as u64);
        for (idx, file) in files.iter().enumerate() {
            if is_prebuilt_sketch(file) {
                let header = read_sketch_header(Path::new(file))?;

                if idx == 0 && !options.enforce_parameters {
                    params = header.params.clone();
                }

                if let Some(reason) = params.incompatibility(&header.params, options.contain) {
                    warn!("The sketch file {} {}. This file will be skipped.", file, reason);
                    progress_bar.inc(1);
                    continue;
                }

                if header.params.sketch_size() > params.sketch_size() {
                    warn!(
                        "The sketch file {} has a target sketch size ({}) that is larger than the current sketch size ({}). Its sketches will be reduced.",
                        file,
                        header.params.sketch_size(),
                        params.sketch_size()
                    );
                }

                pool.run_when_thread_available(SketchJob {
                    task: SketchTask::Load { path: file.clone() },
                    params: Arc::new(params.clone()),
                    counts: options.counts,
                });
            } else if params.concatenated() {
                sketched_sequences = true;
                info!("Sketching {}...", file);
                pool.run_when_thread_available(SketchJob {
                    task: SketchTask::File { path: file.clone() },
                    params: Arc::new(params.clone()),
                    counts: options.counts,
                });
            } else {
                sketched_sequences = true;
                info!("Sketching {}...", file);
                let shared_params = Arc::new(params.clone());
                let mut drain_error = None;
                let (count, skipped) = for_each_sequence(file, params.k(), |input| {
                    pool.run_when_thread_available(SketchJob {
                        task: SketchTask::Sequence(input),
                        params: Arc::clone(&shared_params),
                        counts: options.counts,
                    });

                    while pool.output_available() {
                        if let Some(output) = pool.pop_output_when_available() {
                            match output {
                                Ok(refs) => references.extend(refs),
                                Err(e) => {
                                    drain_error.get_or_insert(e);
                                }
                            }
                        }
                    }
                })?;

                if let Some(e) = drain_error {
                    return Err(e);
                }

                if count == 0 {
                    if skipped {
                        warn!(
                            "All FASTA/Q records in {} were shorter than the k-mer size ({}).",
                            file,
                            params.k()
                        );
                    } else {
                        bail!("Did not find FASTA/Q records in \"{}\".", file);
                    }
                } else if skipped {
                    warn!(
                        "Some FASTA/Q records in {} were shorter than the k-mer size ({}) and were skipped.",
                        file,
                        params.k()
                    );
                }
            }

            while pool.output_available() {
                if let Some(output) = pool.pop_output_when_available() {
                    references.extend(output?);
                }
            }

            progress_bar.inc(1);
        }

        while pool.running() {
            if let Some(output) = pool.pop_output_when_available() {
                references.extend(output?);
            }
        }

        progress_bar.finish_and_clear();

        if sketched_sequences {
            Ok(Sketch::from_references(params, references))
        } else {
            Sketch::from_loaded_references(params, references)
        }
    }

    /// Sketch a read set, given as one or more files, as a single reference.
    pub fn init_from_reads(
        files: &[String],
        params: SketchParams,
        reads: &ReadsParams,
        counts: bool,
    ) -> Result<Sketch> {
        let reference = sketch_file(files, &params, Some(reads), counts)?;

        Ok(Sketch::from_references(params, vec![reference]))
    }

    /// Rebuild the name index, returning the names that repeat an earlier one.
    fn create_index(&mut self) -> Vec<String> {
        self.reference_indices.clear();

        let mut duplicates = Vec::new();
        for (idx, reference) in self.references.iter().enumerate() {
            if self.reference_indices.contains_key(&reference.name) {
                duplicates.push(reference.name.clone());
            } else {
                self.reference_indices.insert(reference.name.clone(), idx);
            }
        }

        self.kmer_space = self.params.kmer_space();

        duplicates
    }

    fn warn_duplicates(&mut self) {
        let duplicates = self.create_index();
        if !duplicates.is_empty() {
            warn!(
                "Found {} references with duplicate names; lookups by name use the first.",
                duplicates.len()
            );
        }
    }

    /// Number of references sharing a name with an earlier reference.
    pub fn duplicate_names(&self) -> usize {
        self.references.len() - self.reference_indices.len()
    }

    pub fn params(&self) -> &SketchParams {
        &self.params
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn reference(&self, index: usize) -> Option<&Reference> {
        self.references.get(index)
    }

    /// Update the name and comment of a reference, e.g. for read sets.
    pub fn set_reference_name_and_comment(
        &mut self,
        index: usize,
        name: Option<&str>,
        comment: Option<&str>,
    ) {
        if let Some(reference) = self.references.get_mut(index) {
            if let Some(name) = name {
                reference.name = name.to_string();
            }
            if let Some(comment) = comment {
                reference.comment = comment.to_string();
            }
        }
        self.warn_duplicates();
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn reference_index(&self, name: &str) -> Option<usize> {
        self.reference_indices.get(name).copied()
    }

    pub fn kmer_space(&self) -> f64 {
        self.kmer_space
    }

    pub fn has_counts(&self) -> bool {
        self.references.iter().any(|r| r.counts.is_some())
    }

    /// Probability of a random k-mer appearing in a reference.
    pub fn random_kmer_chance(&self, index: usize) -> f64 {
        1.0 / (self.kmer_space / self.references[index].length as f64 + 1.0)
    }

    /// Smallest k-mer size keeping the random match probability below `warning`.
    pub fn min_kmer_size(&self, index: usize, warning: f64) -> u32 {
        let length = self.references[index].length as f64;
        ((length * (1.0 - warning) / warning).ln() / (self.params.alphabet_size() as f64).ln())
            .ceil() as u32
    }

    /// Number of hashes observed each number of times.
    pub fn reference_histogram(&self, index: usize) -> BTreeMap<u32, u64> {
        let mut histogram = BTreeMap::new();
        if let Some(counts) = self.references.get(index).and_then(|r| r.counts.as_ref()) {
            for count in counts {
                *histogram.entry(*count).or_insert(0) += 1;
            }
        }

        histogram
    }

    pub fn kmer_size_advisory(&self, warning: f64) -> Option<KmerSizeAdvisory> {
        let length_threshold = warning * self.kmer_space / (1.0 - warning);

        let mut longest: Option<usize> = None;
        let mut count = 0;
        for (idx, reference) in self.references.iter().enumerate() {
            if reference.length as f64 > length_threshold {
                count += 1;
                if longest.map_or(true, |l| reference.length > self.references[l].length) {
                    longest = Some(idx);
                }
            }
        }

        longest.map(|idx| KmerSizeAdvisory {
            kmer_size: self.params.k(),
            warning,
            longest_name: self.references[idx].name.clone(),
            longest_length: self.references[idx].length,
            random_chance: self.random_kmer_chance(idx),
            min_kmer_size: self.min_kmer_size(idx, warning),
            count,
        })
    }

    /// Log an advisory if the k-mer size is too small for these references.
    pub fn warn_kmer_size(&self, warning: f64) {
        if let Some(advisory) = self.kmer_size_advisory(warning) {
            warn!("{}", advisory.message());
        }
    }

    /// Write all references to a sketch file.
    pub fn write_sketch_file(&self, output_file: &Path) -> Result<()> {
        let fp = File::create(output_file)
            .context(format!("Unable to create: {}", output_file.display()))?;
        let mut writer = BufWriter::new(fp);

        let header = SketchHeader {
            program: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            date_created: chrono::offset::Utc::now().to_string(),
            sketch_version: SKETCH_VERSION.to_string(),
            num_references: self.references.len() as u64,
            params: self.params.clone(),
        };

        bincode::serialize_into(&mut writer, &header)?;
        for reference in &self.references {
            bincode::serialize_into(&mut writer, reference)?;
        }
        writer.flush()?;

        Ok(())
    }

    pub fn into_references(self) -> Vec<Reference> {
        self.references
    }
}

/// Read the header of a sketch file.
pub fn read_sketch_header(sketch_file: &Path) -> Result<SketchHeader> {
    let mut reader = maybe_gzip_reader(sketch_file)
        .context(format!("Unable to read sketch file: {}", sketch_file.display()))?;

    let header: SketchHeader = bincode::deserialize_from(&mut reader)
        .context(format!("Malformed sketch file: {}", sketch_file.display()))?;

    if header.sketch_version != SKETCH_VERSION {
        bail!(
            "Sketch file {} has format version {}, expected {}.",
            sketch_file.display(),
            header.sketch_version,
            SKETCH_VERSION
        );
    }

    Ok(header)
}

/// Read all references from a sketch file.
pub fn read_sketch_file(sketch_file: &Path) -> Result<(SketchHeader, Vec<Reference>)> {
    let mut reader = maybe_gzip_reader(sketch_file)
        .context(format!("Unable to read sketch file: {}", sketch_file.display()))?;

    let header: SketchHeader = bincode::deserialize_from(&mut reader)
        .context(format!("Malformed sketch file: {}", sketch_file.display()))?;

    if header.sketch_version != SKETCH_VERSION {
        bail!(
            "Sketch file {} has format version {}, expected {}.",
            sketch_file.display(),
            header.sketch_version,
            SKETCH_VERSION
        );
    }

    let mut references = Vec::with_capacity(header.num_references as usize);
    for _ in 0..header.num_references {
        let reference: Reference = bincode::deserialize_from(&mut reader)
            .context(format!("Malformed sketch file: {}", sketch_file.display()))?;
        references.push(reference);
    }

    Ok((header, references))
}
