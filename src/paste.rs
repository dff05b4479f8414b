use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use log::info;
use num_format::ToFormattedString;

use crate::config::{LOCALE, SKETCH_EXT};
use crate::io_utils::{append_extension_to_path, is_prebuilt_sketch};
use crate::sketch::{Sketch, SketchLoadOptions};
use crate::sketch_params::SketchParams;

/// Combine sketch files into a single sketch file.
///
/// Parameters are taken from the first input and inputs that cannot be
/// compared with it are skipped. Returns the path written.
pub fn paste_sketches(inputs: &[String], output: &Path, threads: usize) -> Result<PathBuf> {
    if let Some(input) = inputs.iter().find(|f| !is_prebuilt_sketch(f)) {
        bail!(
            "{} does not look like a sketch (.{}); only sketch files can be pasted.",
            input,
            SKETCH_EXT
        );
    }

    let options = SketchLoadOptions {
        threads,
        ..Default::default()
    };
    let sketch = Sketch::init_from_files(inputs, SketchParams::default(), &options)?;
    if sketch.is_empty() {
        bail!("No sketches were loaded from the input files.");
    }

    let out_file = append_extension_to_path(output, SKETCH_EXT);
    if let Some(out_path) = out_file.parent() {
        std::fs::create_dir_all(out_path)?;
    }

    sketch.write_sketch_file(&out_file)?;
    info!(
        "Wrote {} sketches to {}.",
        sketch.len().to_formatted_string(&LOCALE),
        out_file.display()
    );

    Ok(out_file)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::hash_list::HashList;
    use crate::sketch::{read_sketch_file, Reference};

    use super::*;

    fn write_sketch(path: &Path, params: SketchParams, names: &[&str]) {
        let references = names
            .iter()
            .enumerate()
            .map(|(idx, name)| Reference {
                name: name.to_string(),
                comment: String::new(),
                length: 1000,
                hashes: HashList::Hash64(vec![idx as u64, 100 + idx as u64]),
                counts: None,
            })
            .collect();

        Sketch::from_references(params, references)
            .write_sketch_file(path)
            .unwrap();
    }

    #[test]
    fn test_paste() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.msh");
        let b = dir.path().join("b.msh");
        let other_k = dir.path().join("k15.msh");

        write_sketch(&a, SketchParams::default(), &["g1", "g2"]);
        write_sketch(&b, SketchParams::default(), &["g3"]);
        write_sketch(&other_k, SketchParams::new(15, "ACGT", 1000, 42), &["g4"]);

        let inputs: Vec<String> = [&a, &b, &other_k]
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        let out_file = paste_sketches(&inputs, &dir.path().join("merged"), 2).unwrap();
        assert_eq!(out_file, dir.path().join("merged.msh"));

        let (header, references) = read_sketch_file(&out_file).unwrap();
        assert_eq!(header.params, SketchParams::default());
        let names: Vec<&str> = references.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["g1", "g2", "g3"]);
    }

    #[test]
    fn test_paste_rejects_duplicate_names() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.msh");
        let b = dir.path().join("b.msh");

        write_sketch(&a, SketchParams::default(), &["x", "y"]);
        write_sketch(&b, SketchParams::default(), &["x"]);

        let inputs: Vec<String> = [&a, &b]
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        let out = dir.path().join("merged");
        assert!(paste_sketches(&inputs, &out, 1).is_err());
        assert!(!dir.path().join("merged.msh").exists());
    }

    #[test]
    fn test_paste_rejects_sequences() {
        let dir = tempdir().unwrap();
        let inputs = vec!["genome.fna".to_string()];
        assert!(paste_sketches(&inputs, &dir.path().join("out"), 1).is_err());
    }
}
