use std::io::Write;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::sketch::Sketch;
use crate::sketch_params::SketchParams;

/// What to report about a sketch file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoMode {
    Full,
    HeaderOnly,
    Tabular,
    Counts,
    Dump,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SketchDump<'a> {
    kmer: u8,
    alphabet: String,
    preserve_case: bool,
    canonical: bool,
    sketch_size: u32,
    hash_type: &'static str,
    hash_bits: u32,
    hash_seed: u32,
    sketches: Vec<ReferenceDump<'a>>,
}

#[derive(Serialize)]
struct ReferenceDump<'a> {
    name: &'a str,
    length: u64,
    comment: &'a str,
    hashes: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<&'a [u32]>,
}

fn hash_function(params: &SketchParams) -> &'static str {
    if params.use64() {
        "MurmurHash3_x64_128"
    } else {
        "MurmurHash3_x86_32"
    }
}

fn write_header<W: Write>(sketch: &Sketch, writer: &mut W) -> Result<()> {
    let params = sketch.params();

    let mut alphabet = params.alphabet().as_string();
    if !params.noncanonical() {
        alphabet += " (canonical)";
    }
    if params.preserve_case() {
        alphabet += " (case-sensitive)";
    }

    let lines = [
        (
            "Hash function (seed):",
            format!("{} ({})", hash_function(params), params.seed()),
        ),
        (
            "K-mer size:",
            format!("{} ({}-bit hashes)", params.k(), params.hash_width().bits()),
        ),
        ("Alphabet:", alphabet),
        ("Target min-hashes per sketch:", params.sketch_size().to_string()),
        ("Sketches:", sketch.len().to_string()),
    ];

    writeln!(writer, "Header:")?;
    for (label, value) in lines.iter() {
        writeln!(writer, "  {:<31}{}", label, value)?;
    }

    Ok(())
}

fn write_table<W: Write>(sketch: &Sketch, writer: &mut W) -> Result<()> {
    let mut rows = vec![[
        "[Hashes]".to_string(),
        "[Length]".to_string(),
        "[ID]".to_string(),
        "[Comment]".to_string(),
    ]];
    for reference in sketch.references() {
        rows.push([
            reference.hashes.len().to_string(),
            reference.length.to_string(),
            reference.name.clone(),
            reference.comment.clone(),
        ]);
    }

    let mut widths = [0; 4];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    writeln!(writer, "Sketches:")?;
    for row in &rows {
        let line = format!(
            "  {:<w0$}  {:<w1$}  {:<w2$}  {}",
            row[0],
            row[1],
            row[2],
            row[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        );
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

/// Write a description of the sketch collection in the requested mode.
pub fn write_info<W: Write>(sketch: &Sketch, mode: InfoMode, writer: &mut W) -> Result<()> {
    match mode {
        InfoMode::Full => {
            write_header(sketch, writer)?;
            writeln!(writer)?;
            write_table(sketch, writer)?;
        }
        InfoMode::HeaderOnly => write_header(sketch, writer)?,
        InfoMode::Tabular => {
            writeln!(writer, "#Hashes\tLength\tID\tComment")?;
            for reference in sketch.references() {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}",
                    reference.hashes.len(),
                    reference.length,
                    reference.name,
                    reference.comment
                )?;
            }
        }
        InfoMode::Counts => {
            if !sketch.has_counts() {
                bail!("The sketch does not contain k-mer counts. Re-sketch with -M.");
            }

            writeln!(writer, "#Sketch\tBin\tFrequency")?;
            for (idx, reference) in sketch.references().iter().enumerate() {
                for (bin, frequency) in sketch.reference_histogram(idx) {
                    writeln!(writer, "{}\t{}\t{}", reference.name, bin, frequency)?;
                }
            }
        }
        InfoMode::Dump => {
            let params = sketch.params();
            let dump = SketchDump {
                kmer: params.k(),
                alphabet: params.alphabet().as_string(),
                preserve_case: params.preserve_case(),
                canonical: !params.noncanonical(),
                sketch_size: params.sketch_size(),
                hash_type: hash_function(params),
                hash_bits: params.hash_width().bits(),
                hash_seed: params.seed(),
                sketches: sketch
                    .references()
                    .iter()
                    .map(|r| ReferenceDump {
                        name: &r.name,
                        length: r.length,
                        comment: &r.comment,
                        hashes: r.hashes.iter_raw().collect(),
                        counts: r.counts.as_deref(),
                    })
                    .collect(),
            };

            serde_json::to_writer_pretty(&mut *writer, &dump)?;
            writeln!(writer)?;
        }
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::hash_list::HashList;
    use crate::sketch::Reference;

    use super::*;

    fn sketch(counts: bool) -> Sketch {
        Sketch::from_references(
            SketchParams::new(21, "ACGT", 1000, 42),
            vec![
                Reference {
                    name: "genome_a.fna".to_string(),
                    comment: "[3 seqs] contig1 [...]".to_string(),
                    length: 5_000,
                    hashes: HashList::Hash64(vec![3, 8, 20]),
                    counts: if counts { Some(vec![1, 2, 2]) } else { None },
                },
                Reference {
                    name: "b".to_string(),
                    comment: String::new(),
                    length: 12,
                    hashes: HashList::Hash64(vec![5]),
                    counts: if counts { Some(vec![4]) } else { None },
                },
            ],
        )
    }

    fn render(sketch: &Sketch, mode: InfoMode) -> String {
        let mut out = Vec::new();
        write_info(sketch, mode, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_full() {
        let output = render(&sketch(false), InfoMode::Full);
        let expected = "\
Header:
  Hash function (seed):          MurmurHash3_x64_128 (42)
  K-mer size:                    21 (64-bit hashes)
  Alphabet:                      ACGT (canonical)
  Target min-hashes per sketch:  1000
  Sketches:                      2

Sketches:
  [Hashes]  [Length]  [ID]          [Comment]
  3         5000      genome_a.fna  [3 seqs] contig1 [...]
  1         12        b
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_header_only() {
        let output = render(&sketch(false), InfoMode::HeaderOnly);
        assert!(output.starts_with("Header:\n"));
        assert!(!output.contains("[Hashes]"));
    }

    #[test]
    fn test_tabular() {
        let output = render(&sketch(false), InfoMode::Tabular);
        assert_eq!(
            output,
            "#Hashes\tLength\tID\tComment\n3\t5000\tgenome_a.fna\t[3 seqs] contig1 [...]\n1\t12\tb\t\n"
        );
    }

    #[test]
    fn test_counts() {
        let output = render(&sketch(true), InfoMode::Counts);
        assert_eq!(
            output,
            "#Sketch\tBin\tFrequency\ngenome_a.fna\t1\t1\ngenome_a.fna\t2\t2\nb\t4\t1\n"
        );

        let mut out = Vec::new();
        assert!(write_info(&sketch(false), InfoMode::Counts, &mut out).is_err());
    }

    #[test]
    fn test_dump() {
        let output = render(&sketch(true), InfoMode::Dump);
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["kmer"], 21);
        assert_eq!(json["alphabet"], "ACGT");
        assert_eq!(json["canonical"], true);
        assert_eq!(json["sketchSize"], 1000);
        assert_eq!(json["hashType"], "MurmurHash3_x64_128");
        assert_eq!(json["hashBits"], 64);
        assert_eq!(json["hashSeed"], 42);
        assert_eq!(json["sketches"][0]["hashes"], serde_json::json!([3, 8, 20]));
        assert_eq!(json["sketches"][1]["counts"], serde_json::json!([4]));
    }
}
