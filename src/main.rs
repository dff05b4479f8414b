use std::env;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::CommandFactory;
use clap::Parser;
use log::{info, warn};
use num_format::ToFormattedString;

use crate::bounds::write_bounds;
use crate::cli::{Cli, Commands, SketchingArgs};
use crate::config::{DEFAULT_MIN_COV, LOCALE, NUCLEOTIDE_ALPHABET, PROTEIN_ALPHABET, SKETCH_EXT};
use crate::containment::calc_containment;
use crate::distance::{calc_sketch_distances, DistanceOptions};
use crate::info::{write_info, InfoMode};
use crate::io_utils::{append_extension_to_path, expand_inputs, is_prebuilt_sketch};
use crate::logging::{log_level, setup_logger};
use crate::maybe_gzip_io::maybe_gzip_tsv_writer;
use crate::paste::paste_sketches;
use crate::screen::{screen, write_screen_hits, ScreenOptions};
use crate::sketch::{read_sketch_file, read_sketch_header, Sketch, SketchLoadOptions};
use crate::sketch_params::SketchParams;
use crate::sketcher::{sketch_file, ReadsParams};
use crate::triangle::{calc_triangle, TriangleOptions};

mod cli;
pub mod bloom;
pub mod bounds;
pub mod config;
pub mod containment;
pub mod distance;
pub mod hash_list;
pub mod hashing;
pub mod info;
pub mod io_utils;
pub mod kmers;
pub mod logging;
pub mod maybe_gzip_io;
pub mod min_hash_heap;
pub mod paste;
pub mod progress;
pub mod screen;
pub mod sketch;
pub mod sketch_params;
pub mod sketcher;
pub mod statistics;
pub mod thread_pool;
pub mod triangle;
pub mod work_distributor;

/// Common initialization required by all commands.
///
/// Work is spread over dedicated thread pools sized by each command.
fn init(threads: usize) {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    info!("{} v{}", env!("CARGO_PKG_NAME"), VERSION);
    info!("{}", env::args().collect::<Vec<String>>().join(" "));

    info!("Using {} threads.", threads);
}

/// Build sketching parameters, and read set options if reads were requested.
fn sketch_parameter_setup(args: &SketchingArgs) -> Result<(SketchParams, Option<ReadsParams>)> {
    let mut params = SketchParams::new(
        args.kmer_size_or_default(),
        NUCLEOTIDE_ALPHABET,
        args.sketch_size_or_default(),
        args.seed_or_default(),
    );

    // case folding applies when the alphabet is set
    params.set_preserve_case(args.preserve_case);
    if args.protein {
        params.set_alphabet_from_string(PROTEIN_ALPHABET);
        params.set_noncanonical(true);
    } else if let Some(alphabet) = &args.alphabet {
        if alphabet.is_empty() {
            bail!("The alphabet given to -z must contain at least one character.");
        }
        params.set_alphabet_from_string(alphabet);
        params.set_noncanonical(true);
    } else {
        params.set_alphabet_from_string(NUCLEOTIDE_ALPHABET);
        params.set_noncanonical(args.noncanonical);
    }
    params.set_concatenated(!args.individual);

    let reads = args.reads || args.memory.is_some();
    if !reads {
        for (used, flag) in [
            (args.min_copies.is_some(), "-m"),
            (args.target_coverage.is_some(), "-c"),
            (args.genome_size.is_some(), "-g"),
        ] {
            if used {
                bail!("The option {} requires read mode (-r or -b).", flag);
            }
        }

        return Ok((params, None));
    }

    if args.individual {
        bail!("The option -i cannot be used with read mode (-r or -b).");
    }

    let memory_bound = args.memory.unwrap_or(0);
    let default_min_cov = if memory_bound > 0 { DEFAULT_MIN_COV } else { 1 };
    let reads_params = ReadsParams {
        min_cov: args.min_copies.unwrap_or(default_min_cov),
        target_cov: args.target_coverage.unwrap_or(0.0),
        genome_size: args.genome_size.unwrap_or(0),
        memory_bound,
    };

    if memory_bound > 0 && reads_params.min_cov < 2 {
        warn!("The bloom filter (-b) has no effect unless -m is at least 2.");
    }

    Ok((params, Some(reads_params)))
}

/// Options that describe the k-mers and hashes cannot be changed once a
/// sketch file provides them.
fn check_inherited_options(args: &SketchingArgs) -> Result<()> {
    for (used, flag) in [
        (args.kmer_size.is_some(), "-k"),
        (args.seed.is_some(), "-S"),
        (args.protein, "-a"),
        (args.alphabet.is_some(), "-z"),
        (args.noncanonical, "-n"),
        (args.preserve_case, "-Z"),
    ] {
        if used {
            bail!(
                "The option {} cannot be used when a sketch is provided; it is inherited from the sketch.",
                flag
            );
        }
    }

    Ok(())
}

/// Make sure a sketch size given for read sets matches the sketch being compared to.
fn check_read_sketch_size(args: &SketchingArgs, reads: bool, path: &str) -> Result<()> {
    if let Some(sketch_size) = args.sketch_size {
        let header = read_sketch_header(Path::new(path))?;
        let inherited = header.params.sketch_size();
        if reads && sketch_size != inherited {
            bail!(
                "The sketch size must match the reference when using read mode (the sketch size of {} is {}).",
                path,
                inherited
            );
        } else if !reads {
            warn!(
                "The sketch size ({}) is inherited from {}; -s is ignored.",
                inherited, path
            );
        }
    }

    Ok(())
}

/// Load sketch files and sketch sequence files into a single collection.
///
/// In read mode each sequence file is sketched as one read set.
fn load_collection(
    files: &[String],
    params: SketchParams,
    reads: Option<&ReadsParams>,
    options: &SketchLoadOptions,
) -> Result<Sketch> {
    let sketch = match reads {
        None => Sketch::init_from_files(files, params, options)?,
        Some(reads) => {
            let mut params = params;
            if let Some(first) = files.first() {
                if is_prebuilt_sketch(first) && !options.enforce_parameters {
                    params = read_sketch_header(Path::new(first))?.params;
                }
            }

            let enforced = SketchLoadOptions {
                enforce_parameters: true,
                ..options.clone()
            };

            let mut references = Vec::new();
            let mut sketched_reads = false;
            for file in files {
                if is_prebuilt_sketch(file) {
                    let loaded = Sketch::init_from_files(&[file.clone()], params.clone(), &enforced)?;
                    references.extend(loaded.into_references());
                } else {
                    sketched_reads = true;
                    info!("Sketching read set {}...", file);
                    references.push(sketch_file(&[file.clone()], &params, Some(reads), options.counts)?);
                }
            }

            if sketched_reads {
                Sketch::from_references(params, references)
            } else {
                Sketch::from_loaded_references(params, references)?
            }
        }
    };

    Ok(sketch)
}

/// Run the sketch command.
fn run_sketch(args: &cli::SketchArgs) -> Result<()> {
    init(args.threads);

    let inputs = expand_inputs(&args.inputs, args.list)?;
    if let Some(input) = inputs.iter().find(|f| is_prebuilt_sketch(f)) {
        bail!(
            "{} looks like it is already sketched (.{}); use the paste command to combine sketches.",
            input,
            SKETCH_EXT
        );
    }

    let (params, reads) = sketch_parameter_setup(&args.sketching)?;

    if (args.id.is_some() || args.comment.is_some())
        && reads.is_none()
        && (inputs.len() > 1 || args.sketching.individual)
    {
        bail!("The options -I and -C can only be used when creating a single sketch.");
    }

    let output = match &args.output_prefix {
        Some(prefix) => prefix.clone(),
        None if inputs.len() == 1 && inputs[0] != "-" => PathBuf::from(&inputs[0]),
        None => bail!("An output prefix (-o) is required when sketching multiple inputs or stdin."),
    };

    let mut sketch = match &reads {
        Some(reads) => Sketch::init_from_reads(&inputs, params, reads, args.counts)?,
        None => {
            let options = SketchLoadOptions {
                threads: args.threads,
                enforce_parameters: true,
                contain: false,
                counts: args.counts,
            };
            Sketch::init_from_files(&inputs, params, &options)?
        }
    };

    if sketch.is_empty() {
        bail!("No sketches were created from the input files.");
    }

    if args.id.is_some() || args.comment.is_some() {
        sketch.set_reference_name_and_comment(0, args.id.as_deref(), args.comment.as_deref());
    }
    sketch.warn_kmer_size(args.sketching.warning);

    let out_file = append_extension_to_path(&output, SKETCH_EXT);
    if let Some(out_path) = out_file.parent() {
        std::fs::create_dir_all(out_path)?;
    }

    sketch.write_sketch_file(&out_file)?;
    info!(
        "Wrote {} sketches to {}.",
        sketch.len().to_formatted_string(&LOCALE),
        out_file.display()
    );

    Ok(())
}

/// Load the reference and query collections compared by dist and contain.
fn load_reference_and_queries(
    reference: &str,
    queries: &[String],
    list: bool,
    sketching: &SketchingArgs,
    threads: usize,
    contain: bool,
) -> Result<(Sketch, Sketch)> {
    let (params, reads) = sketch_parameter_setup(sketching)?;

    if is_prebuilt_sketch(reference) {
        check_inherited_options(sketching)?;
        check_read_sketch_size(sketching, reads.is_some(), reference)?;
    }

    let options = SketchLoadOptions {
        threads,
        enforce_parameters: false,
        contain,
        counts: false,
    };

    info!("Loading reference {}:", reference);
    let reference_sketch =
        load_collection(&[reference.to_string()], params, reads.as_ref(), &options)?;
    if reference_sketch.is_empty() {
        bail!("No references were loaded from {}.", reference);
    }
    reference_sketch.warn_kmer_size(sketching.warning);

    let queries = expand_inputs(queries, list)?;
    let mut query_params = reference_sketch.params().clone();
    query_params.set_concatenated(!sketching.individual);

    let query_options = SketchLoadOptions {
        enforce_parameters: true,
        ..options
    };

    info!("Loading queries:");
    let query_sketch = load_collection(&queries, query_params, reads.as_ref(), &query_options)?;
    if query_sketch.is_empty() {
        bail!("No queries were loaded.");
    }
    query_sketch.warn_kmer_size(sketching.warning);

    Ok((reference_sketch, query_sketch))
}

/// Run the distance command.
fn run_dist(args: &cli::DistArgs) -> Result<()> {
    init(args.threads);

    let (reference, query) = load_reference_and_queries(
        &args.reference,
        &args.queries,
        args.list,
        &args.sketching,
        args.threads,
        false,
    )?;

    let options = DistanceOptions {
        table: args.table,
        comment_fields: args.comment,
        max_distance: args.max_distance,
        max_p_value: args.max_p_value,
        threads: args.threads,
    };

    let mut writer = maybe_gzip_tsv_writer(args.output_file.as_deref(), args.threads)?;
    calc_sketch_distances(Arc::new(reference), Arc::new(query), &options, &mut writer)?;
    writer.flush()?;

    Ok(())
}

/// Run the containment command.
fn run_contain(args: &cli::ContainArgs) -> Result<()> {
    init(args.threads);

    let (reference, query) = load_reference_and_queries(
        &args.reference,
        &args.queries,
        args.list,
        &args.sketching,
        args.threads,
        true,
    )?;

    let mut writer = maybe_gzip_tsv_writer(args.output_file.as_deref(), args.threads)?;
    calc_containment(
        Arc::new(reference),
        Arc::new(query),
        args.max_error,
        args.threads,
        &mut writer,
    )?;
    writer.flush()?;

    Ok(())
}

/// Run the triangle command.
fn run_triangle(args: &cli::TriangleArgs) -> Result<()> {
    init(args.threads);

    let inputs = expand_inputs(&args.inputs, args.list)?;
    let (params, reads) = sketch_parameter_setup(&args.sketching)?;

    if let Some(first) = inputs.first() {
        if is_prebuilt_sketch(first) {
            check_inherited_options(&args.sketching)?;
            check_read_sketch_size(&args.sketching, reads.is_some(), first)?;
        }
    }

    let options = SketchLoadOptions {
        threads: args.threads,
        ..Default::default()
    };
    let sketch = load_collection(&inputs, params, reads.as_ref(), &options)?;
    if sketch.is_empty() {
        bail!("No sketches were loaded from the input files.");
    }
    sketch.warn_kmer_size(args.sketching.warning);

    let edge_list = args.edge_list || args.max_distance.is_some() || args.max_p_value.is_some();
    let options = TriangleOptions {
        comment_fields: args.comment,
        edge_list,
        max_distance: args.max_distance.unwrap_or(1.0),
        max_p_value: args.max_p_value.unwrap_or(1.0),
        threads: args.threads,
    };

    let mut writer = maybe_gzip_tsv_writer(args.output_file.as_deref(), args.threads)?;
    calc_triangle(Arc::new(sketch), &options, &mut writer)?;
    writer.flush()?;

    Ok(())
}

/// Run the screen command.
fn run_screen(args: &cli::ScreenArgs) -> Result<()> {
    init(args.threads);

    if !is_prebuilt_sketch(&args.query) {
        bail!(
            "{} does not look like a sketch (.{}); screen requires a sketch of the references.",
            args.query,
            SKETCH_EXT
        );
    }

    let options = SketchLoadOptions {
        threads: args.threads,
        ..Default::default()
    };
    let sketch = Sketch::init_from_files(&[args.query.clone()], SketchParams::default(), &options)?;
    if sketch.is_empty() {
        bail!("No sketches were loaded from {}.", args.query);
    }

    let screen_options = ScreenOptions {
        winner_takes_all: args.winner_takes_all,
        min_identity: args.min_identity,
        max_p_value: args.max_p_value,
        threads: args.threads,
    };
    let hits = screen(&sketch, &args.mixtures, &screen_options)?;
    info!(
        "Reporting {} of {} references.",
        hits.len().to_formatted_string(&LOCALE),
        sketch.len().to_formatted_string(&LOCALE)
    );

    let mut writer = maybe_gzip_tsv_writer(args.output_file.as_deref(), args.threads)?;
    write_screen_hits(&hits, &mut writer)?;
    writer.flush()?;

    Ok(())
}

/// Run the sketch info command.
fn run_info(args: &cli::InfoArgs) -> Result<()> {
    init(1);

    let (header, references) = read_sketch_file(&args.sketch_file)?;
    let sketch = Sketch::from_loaded_references(header.params, references)?;

    let mode = if args.header_only {
        InfoMode::HeaderOnly
    } else if args.tabular {
        InfoMode::Tabular
    } else if args.counts {
        InfoMode::Counts
    } else if args.dump {
        InfoMode::Dump
    } else {
        InfoMode::Full
    };

    write_info(&sketch, mode, &mut stdout().lock())?;

    Ok(())
}

/// Run the paste command.
fn run_paste(args: &cli::PasteArgs) -> Result<()> {
    init(args.threads);

    let inputs = expand_inputs(&args.inputs, args.list)?;
    paste_sketches(&inputs, &args.output, args.threads)?;

    Ok(())
}

/// Run the bounds command.
fn run_bounds(args: &cli::BoundsArgs) -> Result<()> {
    init(1);

    write_bounds(args.kmer_size, args.probability, &mut stdout().lock())?;

    Ok(())
}

fn main() -> Result<()> {
    let start = Instant::now();

    let cli = Cli::parse();

    setup_logger(log_level(cli.quiet));

    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
    } else {
        match &cli.command {
            Some(Commands::Sketch(args)) => run_sketch(args)?,
            Some(Commands::Dist(args)) => run_dist(args)?,
            Some(Commands::Contain(args)) => run_contain(args)?,
            Some(Commands::Triangle(args)) => run_triangle(args)?,
            Some(Commands::Screen(args)) => run_screen(args)?,
            Some(Commands::Info(args)) => run_info(args)?,
            Some(Commands::Paste(args)) => run_paste(args)?,
            Some(Commands::Bounds(args)) => run_bounds(args)?,
            Some(Commands::ShellCompletion { shell }) => {
                shell.generate(&mut Cli::command(), &mut std::io::stdout());
            }
            None => {}
        }

        info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
        info!("Done.");
    }

    Ok(())
}
