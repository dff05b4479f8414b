use std::ffi::OsStr;
use std::fs::File;
use std::io::{stdout, BufRead, BufReader};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use gzp::syncz::{SyncZ, SyncZBuilder};
use gzp::{
    deflate,
    par::compress::{ParCompress, ParCompressBuilder},
};

const BUFFER_SIZE: usize = 128 * 1024;

pub struct GzipParams {
    pub level: usize,
    pub threads: usize,
}

pub enum MaybeGzipWriter<T: Write> {
    GzipParallel(ParCompress<deflate::Gzip>),
    Gzip(SyncZ<GzEncoder<T>>),
    Plain(BufWriter<T>),
}

impl<T: Write + Send + 'static> MaybeGzipWriter<T> {
    pub fn new(file: T, gzip_params: Option<GzipParams>) -> Result<Self> {
        let writer = match gzip_params {
            Some(params) if params.threads > 1 => MaybeGzipWriter::GzipParallel(
                ParCompressBuilder::new()
                    .compression_level(flate2::Compression::new(params.level as u32))
                    .num_threads(params.threads)
                    .context("Invalid thread count for compressing output")?
                    .from_writer(file),
            ),
            Some(_) => {
                MaybeGzipWriter::Gzip(SyncZBuilder::<deflate::Gzip, _>::new().from_writer(file))
            }
            None => MaybeGzipWriter::Plain(BufWriter::with_capacity(BUFFER_SIZE, file)),
        };

        Ok(writer)
    }
}

impl<T: Write> MaybeGzipWriter<T> {
    fn as_write(&mut self) -> &mut dyn Write {
        match self {
            MaybeGzipWriter::GzipParallel(gzip) => gzip,
            MaybeGzipWriter::Gzip(gzip) => gzip,
            MaybeGzipWriter::Plain(plain) => plain,
        }
    }
}

impl<T: Write> Write for MaybeGzipWriter<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.as_write().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.as_write().flush()
    }
}

/// Read normal or compressed files based on the absence
/// or presence of a `gz` extension.
pub fn maybe_gzip_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;

    if path.extension() == Some(OsStr::new("gz")) {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

/// Writer for a report, going to stdout when no path is given. Files with
/// a `gz` extension are compressed using multiple threads.
pub fn maybe_gzip_output(output_path: Option<&Path>, threads: usize) -> Result<Box<dyn Write + Send>> {
    let writer: Box<dyn Write + Send> = match output_path {
        Some(output_path) => {
            let out_file = File::create(output_path)
                .context(format!("Unable to create: {}", output_path.display()))?;
            if output_path.extension() == Some(OsStr::new("gz")) {
                let gzip_params = GzipParams { level: 2, threads };
                Box::new(MaybeGzipWriter::new(out_file, Some(gzip_params))?)
            } else {
                Box::new(MaybeGzipWriter::new(out_file, None)?)
            }
        }
        None => Box::new(BufWriter::with_capacity(BUFFER_SIZE, stdout())),
    };

    Ok(writer)
}

/// Tab-separated writer for reports. Fields are never quoted and rows may
/// differ in length.
pub fn maybe_gzip_tsv_writer(
    output_path: Option<&Path>,
    threads: usize,
) -> Result<Writer<Box<dyn Write + Send>>> {
    let writer = maybe_gzip_output(output_path, threads)?;

    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .has_headers(false)
        .from_writer(writer))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_tsv_writer_plain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dist.tsv");

        {
            let mut writer = maybe_gzip_tsv_writer(Some(&path), 1).unwrap();
            writer.write_record(["", "2"]).unwrap();
            writer.write_record(["genome a", "0.5", "1/2"]).unwrap();
            writer.flush().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "\t2\ngenome a\t0.5\t1/2\n");
    }

    #[test]
    fn test_tsv_writer_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dist.tsv.gz");

        {
            let mut writer = maybe_gzip_tsv_writer(Some(&path), 1).unwrap();
            writer.write_record(["a", "b"]).unwrap();
            writer.flush().unwrap();
        }

        let mut contents = String::new();
        maybe_gzip_reader(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "a\tb\n");
    }
}
