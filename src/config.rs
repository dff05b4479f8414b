use num_format::Locale;

pub const LOCALE: Locale = Locale::en;

pub const DEFAULT_K: u8 = 21;
pub const DEFAULT_PROTEIN_K: u8 = 9;
pub const DEFAULT_SKETCH_SIZE: u32 = 1000;
pub const DEFAULT_SEED: u32 = 42;

/// Probability threshold above which a random k-mer match triggers a k-mer size advisory.
pub const DEFAULT_WARNING: f64 = 0.01;

/// Minimum copies of a k-mer when a bloom filter is used to remove read errors.
pub const DEFAULT_MIN_COV: u32 = 2;

pub const DEFAULT_CONTAIN_ERROR: f64 = 0.05;

pub const NUCLEOTIDE_ALPHABET: &str = "ACGT";
pub const PROTEIN_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWY";

pub const SKETCH_EXT: &str = "msh";
