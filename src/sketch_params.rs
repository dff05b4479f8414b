use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_SEED, DEFAULT_SKETCH_SIZE, NUCLEOTIDE_ALPHABET, PROTEIN_ALPHABET};
use crate::hashing::HashWidth;

/// Table of characters allowed in k-mers.
#[derive(Clone)]
pub struct Alphabet {
    table: [bool; 256],
    size: u32,
}

impl Alphabet {
    pub fn from_chars(characters: &str, preserve_case: bool) -> Self {
        let mut table = [false; 256];
        for c in characters.bytes() {
            let c = if preserve_case { c } else { c.to_ascii_uppercase() };
            table[c as usize] = true;
        }

        let size = table.iter().filter(|v| **v).count() as u32;

        Alphabet { table, size }
    }

    #[inline]
    pub fn contains(&self, c: u8) -> bool {
        self.table[c as usize]
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Characters of the alphabet in byte order.
    pub fn as_string(&self) -> String {
        (0..=255u8)
            .filter(|c| self.table[*c as usize])
            .map(|c| c as char)
            .collect()
    }
}

impl PartialEq for Alphabet {
    fn eq(&self, other: &Self) -> bool {
        self.table[..] == other.table[..]
    }
}

impl fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alphabet({})", self.as_string())
    }
}

/// Persisted form of the sketching parameters.
#[derive(Clone, Serialize, Deserialize)]
struct SketchParamsRecord {
    kmer_size: u8,
    alphabet: String,
    preserve_case: bool,
    noncanonical: bool,
    seed: u32,
    sketch_size: u32,
    concatenated: bool,
}

/// Parameters fixed for the lifetime of a sketch collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "SketchParamsRecord", into = "SketchParamsRecord")]
pub struct SketchParams {
    kmer_size: u8,
    alphabet: Alphabet,
    preserve_case: bool,
    noncanonical: bool,
    seed: u32,
    sketch_size: u32,
    concatenated: bool,
    hash_width: HashWidth,
}

impl From<SketchParamsRecord> for SketchParams {
    fn from(record: SketchParamsRecord) -> Self {
        let alphabet = Alphabet::from_chars(&record.alphabet, record.preserve_case);
        let hash_width = HashWidth::for_kmer_space(alphabet.size(), record.kmer_size);

        SketchParams {
            kmer_size: record.kmer_size,
            alphabet,
            preserve_case: record.preserve_case,
            noncanonical: record.noncanonical,
            seed: record.seed,
            sketch_size: record.sketch_size,
            concatenated: record.concatenated,
            hash_width,
        }
    }
}

impl From<SketchParams> for SketchParamsRecord {
    fn from(params: SketchParams) -> Self {
        SketchParamsRecord {
            kmer_size: params.kmer_size,
            alphabet: params.alphabet.as_string(),
            preserve_case: params.preserve_case,
            noncanonical: params.noncanonical,
            seed: params.seed,
            sketch_size: params.sketch_size,
            concatenated: params.concatenated,
        }
    }
}

impl Default for SketchParams {
    fn default() -> Self {
        SketchParams::new(21, NUCLEOTIDE_ALPHABET, DEFAULT_SKETCH_SIZE, DEFAULT_SEED)
    }
}

impl SketchParams {
    pub fn new(kmer_size: u8, alphabet: &str, sketch_size: u32, seed: u32) -> Self {
        let alphabet = Alphabet::from_chars(alphabet, false);
        let hash_width = HashWidth::for_kmer_space(alphabet.size(), kmer_size);

        SketchParams {
            kmer_size,
            alphabet,
            preserve_case: false,
            noncanonical: false,
            seed,
            sketch_size,
            concatenated: true,
            hash_width,
        }
    }

    pub fn k(&self) -> u8 {
        self.kmer_size
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn alphabet_size(&self) -> u32 {
        self.alphabet.size()
    }

    pub fn preserve_case(&self) -> bool {
        self.preserve_case
    }

    pub fn noncanonical(&self) -> bool {
        self.noncanonical
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn sketch_size(&self) -> u32 {
        self.sketch_size
    }

    pub fn concatenated(&self) -> bool {
        self.concatenated
    }

    pub fn hash_width(&self) -> HashWidth {
        self.hash_width
    }

    pub fn use64(&self) -> bool {
        self.hash_width == HashWidth::Bits64
    }

    /// Alphabet is the amino acid alphabet.
    pub fn is_protein(&self) -> bool {
        self.alphabet.as_string() == PROTEIN_ALPHABET
    }

    pub fn set_kmer_size(&mut self, kmer_size: u8) {
        self.kmer_size = kmer_size;
        self.update_hash_width();
    }

    /// Replace the alphabet, honouring the current case setting.
    pub fn set_alphabet_from_string(&mut self, characters: &str) {
        self.alphabet = Alphabet::from_chars(characters, self.preserve_case);
        self.update_hash_width();
    }

    /// Case must be set before the alphabet so the alphabet is folded correctly.
    pub fn set_preserve_case(&mut self, preserve_case: bool) {
        self.preserve_case = preserve_case;
    }

    pub fn set_noncanonical(&mut self, noncanonical: bool) {
        self.noncanonical = noncanonical;
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.seed = seed;
    }

    pub fn set_sketch_size(&mut self, sketch_size: u32) {
        self.sketch_size = sketch_size;
    }

    pub fn set_concatenated(&mut self, concatenated: bool) {
        self.concatenated = concatenated;
    }

    fn update_hash_width(&mut self) {
        self.hash_width = HashWidth::for_kmer_space(self.alphabet.size(), self.kmer_size);
    }

    /// Size of the k-mer space, alphabet size raised to the k-mer size.
    pub fn kmer_space(&self) -> f64 {
        (self.alphabet.size() as f64).powi(self.kmer_size as i32)
    }

    /// Describe the first parameter preventing sketches from being compared,
    /// or None if they are compatible.
    pub fn incompatibility(&self, other: &SketchParams, contain: bool) -> Option<String> {
        if self.alphabet != other.alphabet {
            return Some(format!(
                "has different alphabet ({}) than the current alphabet ({})",
                other.alphabet.as_string(),
                self.alphabet.as_string()
            ));
        }

        if self.seed != other.seed {
            return Some(format!(
                "has a seed ({}) that does not match the current seed ({})",
                other.seed, self.seed
            ));
        }

        if self.kmer_size != other.kmer_size {
            return Some(format!(
                "has a k-mer size ({}) that does not match the current k-mer size ({})",
                other.kmer_size, self.kmer_size
            ));
        }

        if !contain && other.sketch_size < self.sketch_size {
            return Some(format!(
                "has a target sketch size ({}) that is smaller than the current sketch size ({})",
                other.sketch_size, self.sketch_size
            ));
        }

        if self.noncanonical != other.noncanonical {
            return Some(format!(
                "is {}, which is incompatible with the current setting",
                if other.noncanonical {
                    "noncanonical"
                } else {
                    "canonical"
                }
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet() {
        let alphabet = Alphabet::from_chars("acgt", false);
        assert_eq!(alphabet.size(), 4);
        assert!(alphabet.contains(b'A'));
        assert!(!alphabet.contains(b'a'));
        assert!(!alphabet.contains(b'N'));
        assert_eq!(alphabet.as_string(), "ACGT");

        let alphabet = Alphabet::from_chars("acgtACGT", true);
        assert_eq!(alphabet.size(), 8);
        assert!(alphabet.contains(b'a'));
    }

    #[test]
    fn test_hash_width() {
        let mut params = SketchParams::default();
        assert!(params.use64());

        params.set_kmer_size(16);
        assert!(!params.use64());

        params.set_alphabet_from_string(PROTEIN_ALPHABET);
        assert!(params.use64());
        assert!(params.is_protein());
        assert_eq!(params.kmer_space(), 20f64.powi(16));
    }

    #[test]
    fn test_serde_rebuilds_alphabet() {
        let mut params = SketchParams::new(9, PROTEIN_ALPHABET, 500, 7);
        params.set_noncanonical(true);

        let encoded = bincode::serialize(&params).unwrap();
        let decoded: SketchParams = bincode::deserialize(&encoded).unwrap();

        assert_eq!(decoded, params);
        assert!(decoded.alphabet().contains(b'W'));
        assert_eq!(decoded.hash_width(), params.hash_width());
    }

    #[test]
    fn test_incompatibility() {
        let params = SketchParams::default();

        let mut other = params.clone();
        other.set_seed(1);
        assert!(params.incompatibility(&other, false).is_some());

        let mut other = params.clone();
        other.set_sketch_size(params.sketch_size() - 1);
        assert!(params.incompatibility(&other, false).is_some());
        assert!(params.incompatibility(&other, true).is_none());

        let mut other = params.clone();
        other.set_sketch_size(params.sketch_size() + 1);
        assert!(params.incompatibility(&other, false).is_none());

        let mut other = params.clone();
        other.set_noncanonical(true);
        assert!(params.incompatibility(&other, true).is_some());

        let mut other = params.clone();
        other.set_kmer_size(15);
        assert!(params.incompatibility(&other, true).is_some());
    }
}
