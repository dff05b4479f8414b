use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::config::{
    DEFAULT_CONTAIN_ERROR, DEFAULT_K, DEFAULT_PROTEIN_K, DEFAULT_SEED, DEFAULT_SKETCH_SIZE,
    DEFAULT_WARNING,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(styles=get_styles())]
#[command(disable_help_subcommand = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Only report warnings and errors
    #[arg(long, global = true)]
    pub quiet: bool,

    // hidden command used to create CLI markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

#[derive(Subcommand)]
#[command(disable_help_subcommand = true)]
pub enum Commands {
    /// Create MinHash sketches of sequence files
    #[command(arg_required_else_help = true)]
    Sketch(SketchArgs),

    /// Estimate the distance of query sequences to reference sequences
    #[command(arg_required_else_help = true)]
    Dist(DistArgs),

    /// Estimate the containment of query sequences within reference sequences
    #[command(arg_required_else_help = true)]
    Contain(ContainArgs),

    /// Estimate a lower-triangular distance matrix
    #[command(arg_required_else_help = true)]
    Triangle(TriangleArgs),

    /// Determine which references of a sketch are contained in a mixture
    #[command(arg_required_else_help = true)]
    Screen(ScreenArgs),

    /// Display information about a sketch file
    #[command(arg_required_else_help = true)]
    Info(InfoArgs),

    /// Combine multiple sketch files into one
    #[command(arg_required_else_help = true)]
    Paste(PasteArgs),

    /// Print error bounds for a k-mer size and sketch sizes
    Bounds(BoundsArgs),

    /// Generate shell completion
    #[command(arg_required_else_help = true, hide = true)]
    ShellCompletion {
        /// Shell to generate the completions for
        #[arg(long, value_enum)]
        shell: clap_complete_command::Shell,
    },
}

/// Parameters shared by all commands that sketch sequences.
#[derive(Args, Clone, Debug)]
pub struct SketchingArgs {
    /// Length of k-mers to use [default: 21, or 9 with --protein]
    #[arg(short, long, help_heading = "Sketching parameters", value_parser = validate_kmer_length)]
    pub kmer_size: Option<u8>,

    /// Number of min-hashes kept per sketch [default: 1000]
    #[arg(short, long, help_heading = "Sketching parameters", value_parser = clap::value_parser!(u32).range(1..))]
    pub sketch_size: Option<u32>,

    /// Seed for the hash function [default: 42]
    #[arg(short = 'S', long, help_heading = "Sketching parameters")]
    pub seed: Option<u32>,

    /// Probability threshold for warning about low k-mer size
    #[arg(short, long, help_heading = "Sketching parameters", default_value_t = DEFAULT_WARNING, value_parser = validate_probability)]
    pub warning: f64,

    /// Sketch individual sequences, rather than whole files
    #[arg(short, long, help_heading = "Sketching parameters")]
    pub individual: bool,

    /// Do not combine k-mers with their reverse complements
    #[arg(short, long, help_heading = "Alphabet")]
    pub noncanonical: bool,

    /// Use the amino acid alphabet (implies --noncanonical)
    #[arg(short = 'a', long, help_heading = "Alphabet", conflicts_with = "alphabet")]
    pub protein: bool,

    /// Alphabet to sketch with (implies --noncanonical)
    #[arg(short = 'z', long, help_heading = "Alphabet")]
    pub alphabet: Option<String>,

    /// Preserve case in k-mers and the alphabet
    #[arg(short = 'Z', long, help_heading = "Alphabet")]
    pub preserve_case: bool,

    /// Input is a read set; k-mers seen fewer than --min-copies times are ignored
    #[arg(short, long, help_heading = "Read sets")]
    pub reads: bool,

    /// Memory for a bloom filter removing unique k-mers, e.g. 500M (implies --reads)
    #[arg(short = 'b', long, help_heading = "Read sets", value_parser = parse_size)]
    pub memory: Option<u64>,

    /// Minimum copies of each k-mer required to pass noise filtering (requires --reads) [default: 1, or 2 with --memory]
    #[arg(short, long, help_heading = "Read sets", value_parser = clap::value_parser!(u32).range(1..))]
    pub min_copies: Option<u32>,

    /// Stop reading once this coverage is estimated (requires --reads)
    #[arg(short = 'c', long, help_heading = "Read sets")]
    pub target_coverage: Option<f64>,

    /// Genome size used to estimate the length of a read set, e.g. 5M (requires --reads)
    #[arg(short, long, help_heading = "Read sets", value_parser = parse_size)]
    pub genome_size: Option<u64>,
}

#[derive(Parser)]
pub struct SketchArgs {
    /// Sequence files to sketch, `-` for stdin
    #[arg(help_heading = "Inputs", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Inputs are files listing one input path per line
    #[arg(short, long, help_heading = "Inputs")]
    pub list: bool,

    /// Output prefix; `.msh` is appended [default: first input file]
    #[arg(short, long, help_heading = "Output")]
    pub output_prefix: Option<PathBuf>,

    /// ID for the first sketch, instead of its file name
    #[arg(short = 'I', long, help_heading = "Output")]
    pub id: Option<String>,

    /// Comment for the first sketch, instead of its first sequence header
    #[arg(short = 'C', long, help_heading = "Output")]
    pub comment: Option<String>,

    /// Store the number of times each min-hash was observed
    #[arg(short = 'M', long, help_heading = "Output")]
    pub counts: bool,

    #[command(flatten)]
    pub sketching: SketchingArgs,

    /// Number of threads to use
    #[arg(short = 'p', long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

#[derive(Parser)]
pub struct DistArgs {
    /// Reference sketch (.msh) or sequence file
    #[arg(help_heading = "Inputs")]
    pub reference: String,

    /// Query sketches (.msh) or sequence files
    #[arg(help_heading = "Inputs", required = true, num_args = 1..)]
    pub queries: Vec<String>,

    /// Queries are files listing one input path per line
    #[arg(short, long, help_heading = "Inputs")]
    pub list: bool,

    /// Output file [default: stdout]
    #[arg(short, long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Write a table with a row per query and a column per reference
    #[arg(short, long, help_heading = "Output")]
    pub table: bool,

    /// Report comment fields rather than IDs
    #[arg(short = 'C', long, help_heading = "Output")]
    pub comment: bool,

    /// Maximum p-value to report
    #[arg(short = 'v', long, help_heading = "Output", default_value_t = 1.0, value_parser = validate_probability)]
    pub max_p_value: f64,

    /// Maximum distance to report
    #[arg(short = 'd', long, help_heading = "Output", default_value_t = 1.0, value_parser = validate_probability)]
    pub max_distance: f64,

    #[command(flatten)]
    pub sketching: SketchingArgs,

    /// Number of threads to use
    #[arg(short = 'p', long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

#[derive(Parser)]
pub struct ContainArgs {
    /// Reference sketch (.msh) or sequence file
    #[arg(help_heading = "Inputs")]
    pub reference: String,

    /// Query sketches (.msh) or sequence files
    #[arg(help_heading = "Inputs", required = true, num_args = 1..)]
    pub queries: Vec<String>,

    /// Queries are files listing one input path per line
    #[arg(short, long, help_heading = "Inputs")]
    pub list: bool,

    /// Output file [default: stdout]
    #[arg(short, long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Maximum error to report
    #[arg(short = 'e', long, help_heading = "Output", default_value_t = DEFAULT_CONTAIN_ERROR, value_parser = validate_probability)]
    pub max_error: f64,

    #[command(flatten)]
    pub sketching: SketchingArgs,

    /// Number of threads to use
    #[arg(short = 'p', long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

#[derive(Parser)]
pub struct TriangleArgs {
    /// Sketches (.msh) or sequence files to compare
    #[arg(help_heading = "Inputs", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Inputs are files listing one input path per line
    #[arg(short, long, help_heading = "Inputs")]
    pub list: bool,

    /// Output file [default: stdout]
    #[arg(short, long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Use comment fields for sequence names
    #[arg(short = 'C', long, help_heading = "Output")]
    pub comment: bool,

    /// Write an edge list of passing pairs rather than a matrix
    #[arg(short = 'E', long, help_heading = "Output")]
    pub edge_list: bool,

    /// Maximum p-value to report in the edge list (implies --edge-list)
    #[arg(short = 'v', long, help_heading = "Output", value_parser = validate_probability)]
    pub max_p_value: Option<f64>,

    /// Maximum distance to report in the edge list (implies --edge-list)
    #[arg(short = 'd', long, help_heading = "Output", value_parser = validate_probability)]
    pub max_distance: Option<f64>,

    #[command(flatten)]
    pub sketching: SketchingArgs,

    /// Number of threads to use
    #[arg(short = 'p', long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

#[derive(Parser)]
pub struct ScreenArgs {
    /// Sketch (.msh) of the references to screen for
    #[arg(help_heading = "Inputs")]
    pub query: String,

    /// Sequence files of the mixture, `-` for stdin
    #[arg(help_heading = "Inputs", required = true, num_args = 1..)]
    pub mixtures: Vec<String>,

    /// Output file [default: stdout]
    #[arg(short, long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Assign each shared hash only to the reference with the highest identity
    #[arg(short, long, help_heading = "Output")]
    pub winner_takes_all: bool,

    /// Minimum identity to report; 0 requires a shared hash, -1 reports all references
    #[arg(short = 'i', long, help_heading = "Output", default_value_t = 0.0, allow_hyphen_values = true, value_parser = validate_identity)]
    pub min_identity: f64,

    /// Maximum p-value to report
    #[arg(short = 'v', long, help_heading = "Output", default_value_t = 1.0, value_parser = validate_probability)]
    pub max_p_value: f64,

    /// Number of threads to use
    #[arg(short = 'p', long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

#[derive(Parser)]
#[command(group(ArgGroup::new("mode").args(["header_only", "tabular", "counts", "dump"])))]
pub struct InfoArgs {
    /// Sketch file to describe
    #[arg(help_heading = "Inputs")]
    pub sketch_file: PathBuf,

    /// Only show the header
    #[arg(short = 'H', long, help_heading = "Output")]
    pub header_only: bool,

    /// Tabular output without the header
    #[arg(short, long, help_heading = "Output")]
    pub tabular: bool,

    /// Histograms of min-hash counts for each sketch
    #[arg(short, long, help_heading = "Output")]
    pub counts: bool,

    /// Dump the sketches as JSON
    #[arg(short, long, help_heading = "Output")]
    pub dump: bool,
}

#[derive(Parser)]
pub struct PasteArgs {
    /// Output file; `.msh` is appended
    #[arg(help_heading = "Output")]
    pub output: PathBuf,

    /// Sketch files to combine
    #[arg(help_heading = "Inputs", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Inputs are files listing one sketch path per line
    #[arg(short, long, help_heading = "Inputs")]
    pub list: bool,

    /// Number of threads to use
    #[arg(short = 'p', long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,
}

#[derive(Parser)]
pub struct BoundsArgs {
    /// Length of k-mers
    #[arg(short, long, default_value_t = DEFAULT_K, value_parser = validate_kmer_length)]
    pub kmer_size: u8,

    /// Probability that the estimate is within the bound
    #[arg(short = 'p', long, default_value_t = 0.99, value_parser = validate_probability)]
    pub probability: f64,
}

impl SketchingArgs {
    /// K-mer size requested, or the default for the alphabet.
    pub fn kmer_size_or_default(&self) -> u8 {
        match self.kmer_size {
            Some(k) => k,
            None if self.protein => DEFAULT_PROTEIN_K,
            None => DEFAULT_K,
        }
    }

    pub fn sketch_size_or_default(&self) -> u32 {
        self.sketch_size.unwrap_or(DEFAULT_SKETCH_SIZE)
    }

    pub fn seed_or_default(&self) -> u32 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }
}

fn validate_kmer_length(k: &str) -> Result<u8, String> {
    let k: u8 = k
        .parse()
        .map_err(|_| format!("`{k}` isn't a valid k-mer length"))?;

    if !(1..=32).contains(&k) {
        return Err("k-mer length must be in the range [1, 32]".to_string());
    }

    Ok(k)
}

fn validate_threads(threads: &str) -> Result<usize, String> {
    let threads: usize = threads
        .parse()
        .map_err(|_| format!("`{threads}` isn't a valid value"))?;

    if !(1..=1024).contains(&threads) {
        return Err("Threads  must be in the range [1, 1024]".to_string());
    }

    Ok(threads)
}

fn validate_probability(v: &str) -> Result<f64, String> {
    let v: f64 = v
        .parse()
        .map_err(|_| format!("`{v}` isn't a valid value"))?;

    if !(0.0..=1.0).contains(&v) {
        return Err("Value must be in the range [0.0, 1.0]".to_string());
    }

    Ok(v)
}

fn validate_identity(v: &str) -> Result<f64, String> {
    let v: f64 = v
        .parse()
        .map_err(|_| format!("`{v}` isn't a valid identity"))?;

    if !(-1.0..=1.0).contains(&v) {
        return Err("Identity must be in the range [-1.0, 1.0]".to_string());
    }

    Ok(v)
}

/// Parse a size given as a raw number or with a K, M, G or T suffix.
fn parse_size(v: &str) -> Result<u64, String> {
    let v = v.trim();
    let (number, multiplier) = match v.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&v[..v.len() - 1], 1e3),
        Some('M') => (&v[..v.len() - 1], 1e6),
        Some('G') => (&v[..v.len() - 1], 1e9),
        Some('T') => (&v[..v.len() - 1], 1e12),
        _ => (v, 1.0),
    };

    let number: f64 = number
        .parse()
        .map_err(|_| format!("`{v}` isn't a valid size"))?;

    if !number.is_finite() || number <= 0.0 {
        return Err("Size must be greater than zero".to_string());
    }

    Ok((number * multiplier) as u64)
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}
