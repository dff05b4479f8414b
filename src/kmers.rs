/// DNA complement of A..Z, including IUPAC ambiguity codes.
const COMPLEMENT: &[u8; 26] = b"TVGHNNCDNNMNKNNNNYSAABWNRN";

/// Standard genetic code in TCAG order.
const CODON_TABLE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

/// Convert ASCII lowercase letters to uppercase in place.
pub fn to_uppercase_in_place(seq: &mut [u8]) {
    for c in seq.iter_mut() {
        if (97..=122).contains(c) {
            *c -= 32;
        }
    }
}

#[inline]
fn complement(c: u8) -> u8 {
    if c.is_ascii_uppercase() {
        COMPLEMENT[(c - b'A') as usize]
    } else {
        b'N'
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|c| complement(*c)).collect()
}

/// Iterator over the valid k-mers of a sequence.
///
/// Windows containing a byte rejected by `is_valid` are never produced. A
/// cursor marks how far the sequence is known to be valid so each byte is
/// checked once. When a reverse complement is supplied the lexicographically
/// smaller orientation of each k-mer is produced, ties going to the forward
/// strand.
pub struct CanonicalKmers<'a, F>
where
    F: Fn(u8) -> bool,
{
    fwd: &'a [u8],
    rev: Option<&'a [u8]>,
    k: usize,
    is_valid: F,
    pos: usize,
    good: usize,
}

impl<'a, F> CanonicalKmers<'a, F>
where
    F: Fn(u8) -> bool,
{
    pub fn new(fwd: &'a [u8], rev: Option<&'a [u8]>, k: usize, is_valid: F) -> Self {
        debug_assert!(rev.map_or(true, |r| r.len() == fwd.len()));

        CanonicalKmers {
            fwd,
            rev,
            k,
            is_valid,
            pos: 0,
            good: 0,
        }
    }
}

impl<'a, F> Iterator for CanonicalKmers<'a, F>
where
    F: Fn(u8) -> bool,
{
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.fwd.len();
        if self.k == 0 {
            return None;
        }

        loop {
            let end = self.pos + self.k;
            if end > len {
                return None;
            }

            if self.good < self.pos {
                self.good = self.pos;
            }

            let mut bad = None;
            while self.good < end {
                if !(self.is_valid)(self.fwd[self.good]) {
                    bad = Some(self.good);
                    break;
                }
                self.good += 1;
            }

            if let Some(b) = bad {
                self.pos = b + 1;
                continue;
            }

            let start = self.pos;
            self.pos += 1;

            let kmer_fwd = &self.fwd[start..end];
            return match self.rev {
                Some(rev) => {
                    let rev_start = len - start - self.k;
                    let kmer_rev = &rev[rev_start..rev_start + self.k];
                    if kmer_fwd <= kmer_rev {
                        Some(kmer_fwd)
                    } else {
                        Some(kmer_rev)
                    }
                }
                None => Some(kmer_fwd),
            };
        }
    }
}

#[inline]
fn nucleotide_index(c: u8) -> Option<usize> {
    match c {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

/// Amino acid for a codon, `X` when the codon holds an unknown base.
pub fn aa_from_codon(codon: &[u8]) -> u8 {
    match (
        nucleotide_index(codon[0]),
        nucleotide_index(codon[1]),
        nucleotide_index(codon[2]),
    ) {
        (Some(a), Some(b), Some(c)) => CODON_TABLE[a * 16 + b * 4 + c],
        _ => b'X',
    }
}

/// Translate complete codons of an uppercase nucleotide sequence.
pub fn translate(seq: &[u8]) -> Vec<u8> {
    seq.chunks_exact(3).map(aa_from_codon).collect()
}

/// Translations of the three forward and three reverse reading frames.
pub fn six_frame_translations(fwd: &[u8], rev: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::with_capacity(6);
    for strand in [fwd, rev] {
        for frame in 0..3 {
            if frame < strand.len() {
                frames.push(translate(&strand[frame..]));
            }
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acgt(c: u8) -> bool {
        matches!(c, b'A' | b'C' | b'G' | b'T')
    }

    #[test]
    fn test_uppercase() {
        let mut seq = b"acgTn-x".to_vec();
        to_uppercase_in_place(&mut seq);
        assert_eq!(seq, b"ACGTN-X");
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGTT"), b"AACGTT");
        assert_eq!(reverse_complement(b"ACCN"), b"NGGT");
        assert_eq!(reverse_complement(b"RYKM"), b"KMRY");
        assert_eq!(reverse_complement(b"a-"), b"NN");
    }

    #[test]
    fn test_forward_kmers() {
        let kmers: Vec<&[u8]> = CanonicalKmers::new(b"ACGTA", None, 3, acgt).collect();
        assert_eq!(kmers, vec![&b"ACG"[..], b"CGT", b"GTA"]);
    }

    #[test]
    fn test_skips_invalid_windows() {
        let seq = b"ACNGTTAC";
        let kmers: Vec<&[u8]> = CanonicalKmers::new(seq, None, 3, acgt).collect();
        assert_eq!(kmers, vec![&b"GTT"[..], b"TTA", b"TAC"]);

        let kmers: Vec<&[u8]> = CanonicalKmers::new(b"ACGNNNAC", None, 3, acgt).collect();
        assert_eq!(kmers, vec![&b"ACG"[..]]);

        assert_eq!(CanonicalKmers::new(b"AC", None, 3, acgt).count(), 0);
        assert_eq!(CanonicalKmers::new(b"ACGT", None, 0, acgt).count(), 0);
    }

    #[test]
    fn test_canonical_choice() {
        let fwd = b"TTTAAA".to_vec();
        let rev = reverse_complement(&fwd);
        let kmers: Vec<&[u8]> = CanonicalKmers::new(&fwd, Some(&rev), 3, acgt).collect();

        // TTT/AAA, TTA/TAA, TAA/TTA, AAA/TTT
        assert_eq!(kmers, vec![&b"AAA"[..], b"TAA", b"TAA", b"AAA"]);
    }

    #[test]
    fn test_canonical_strand_invariance() {
        let fwd = b"GATTACAGATTTACCANNGGCAT".to_vec();
        let rev = reverse_complement(&fwd);

        let mut a: Vec<Vec<u8>> = CanonicalKmers::new(&fwd, Some(&rev), 5, acgt)
            .map(|k| k.to_vec())
            .collect();
        let mut b: Vec<Vec<u8>> = CanonicalKmers::new(&rev, Some(&fwd), 5, acgt)
            .map(|k| k.to_vec())
            .collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_translate() {
        assert_eq!(aa_from_codon(b"ATG"), b'M');
        assert_eq!(aa_from_codon(b"TAA"), b'*');
        assert_eq!(aa_from_codon(b"TGG"), b'W');
        assert_eq!(aa_from_codon(b"GGN"), b'X');
        assert_eq!(translate(b"ATGGCCTAAG"), b"MA*");

        let fwd = b"ATGGCC".to_vec();
        let rev = reverse_complement(&fwd);
        let frames = six_frame_translations(&fwd, &rev);
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[0], b"MA");
        assert_eq!(frames[3], b"GH");
    }
}
