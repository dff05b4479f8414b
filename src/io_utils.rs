use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::SKETCH_EXT;

/// Append extension to path if it doesn't already end with the extension.
pub fn append_extension_to_path(path: &Path, extension: &str) -> PathBuf {
    let mut path_ext = path.to_path_buf();

    if path.extension() != Some(OsStr::new(extension)) {
        let mut out_file_ext: OsString = path.into();
        out_file_ext.push(".");
        out_file_ext.push(extension);
        path_ext = out_file_ext.into();
    }

    path_ext
}

/// Paths with the reserved sketch suffix are loaded rather than sketched.
pub fn is_prebuilt_sketch(path: &str) -> bool {
    path.len() > SKETCH_EXT.len() + 1
        && path.ends_with(SKETCH_EXT)
        && path[..path.len() - SKETCH_EXT.len()].ends_with('.')
}

/// Read a file listing one path per line, ignoring blank lines.
pub fn read_path_list(list_file: &str) -> Result<Vec<String>> {
    let file = File::open(list_file).context(format!("Unable to open file: {}", list_file))?;

    let mut paths = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.context(format!("Unable to read file: {}", list_file))?;
        let line = line.trim();
        if !line.is_empty() {
            paths.push(line.to_string());
        }
    }

    Ok(paths)
}

/// Expand inputs given as list files when requested.
pub fn expand_inputs(inputs: &[String], list: bool) -> Result<Vec<String>> {
    if !list {
        return Ok(inputs.to_vec());
    }

    let mut paths = Vec::new();
    for list_file in inputs {
        paths.extend(read_path_list(list_file)?);
    }

    Ok(paths)
}

/// Format a value with six significant digits, switching to scientific
/// notation for very small or large magnitudes and dropping trailing zeros.
pub fn format_float(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }

    let sci = format!("{:.5e}", value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
