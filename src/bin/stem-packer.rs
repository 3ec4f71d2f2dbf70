use std::{path::PathBuf, process};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use stem_packer_core::{
    pack_dataset, set_pack_progress_callback, unpack_record, Catalog, ChannelMode,
    DirectoryCatalog, FailurePolicy, PackOptions, PackProgress, PackedRecord, ResampleAlgorithm,
    SourceType,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stem-packer")]
#[command(about = "Pack stem separation datasets into per-track PCM16 records", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PartitionArgs {
    /// Dataset root (contains one directory per subset)
    #[arg(short, long, value_name = "DIR")]
    root: PathBuf,

    #[arg(long)]
    subset: Option<String>,

    /// `all`, or the name of a `<subset>/<split>.txt` track list
    #[arg(long)]
    split: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack every track of a partition
    Pack {
        #[command(flatten)]
        partition: PartitionArgs,

        /// JSON file with pack options; flags override it
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[arg(long)]
        sample_rate: Option<u32>,

        /// Average channels into one before resampling
        #[arg(long)]
        mono: bool,

        /// sinc_best, sinc_medium or sinc_fast
        #[arg(long)]
        resample: Option<ResampleAlgorithm>,

        /// Stems to pack, comma separated (mixture is always packed)
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<SourceType>>,

        /// Stems that may be missing without failing the track
        #[arg(long, value_delimiter = ',')]
        optional: Option<Vec<SourceType>>,

        /// Number of worker threads (defaults to CPU count)
        #[arg(short = 'j', long, value_name = "N")]
        workers: Option<usize>,

        /// Stop starting new tracks after the first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// List the tracks of a partition without packing them
    List {
        #[command(flatten)]
        partition: PartitionArgs,
    },

    /// Print the header of a packed record
    Inspect { record: PathBuf },

    /// Write every array of a packed record as a 16-bit WAV file
    Unpack {
        record: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Pack {
            partition,
            config,
            output,
            sample_rate,
            mono,
            resample,
            sources,
            optional,
            workers,
            fail_fast,
        } => {
            let overrides = Overrides {
                output,
                sample_rate,
                mono,
                resample,
                sources,
                optional,
                workers,
                fail_fast,
            };
            handle_pack(partition, config, overrides, cli.quiet)
        }
        Commands::List { partition } => handle_list(partition),
        Commands::Inspect { record } => handle_inspect(record),
        Commands::Unpack { record, output } => handle_unpack(record, output),
    };

    match result {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = if quiet { "error" } else { filter };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Overrides {
    output: Option<PathBuf>,
    sample_rate: Option<u32>,
    mono: bool,
    resample: Option<ResampleAlgorithm>,
    sources: Option<Vec<SourceType>>,
    optional: Option<Vec<SourceType>>,
    workers: Option<usize>,
    fail_fast: bool,
}

fn build_options(
    partition: &PartitionArgs,
    config: Option<PathBuf>,
    o: Overrides,
) -> anyhow::Result<PackOptions> {
    let mut opts = match config {
        Some(path) => PackOptions::from_json_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PackOptions::default(),
    };

    if let Some(subset) = &partition.subset {
        opts.subset = subset.clone();
    }
    if let Some(split) = &partition.split {
        opts.split = split.clone();
    }
    if let Some(output) = o.output {
        opts.output_dir = output;
    }
    if let Some(rate) = o.sample_rate {
        opts.sample_rate = rate;
    }
    if o.mono {
        opts.channels = ChannelMode::Mono;
    }
    if let Some(resample) = o.resample {
        opts.resample = resample;
    }
    if let Some(sources) = o.sources {
        opts.sources = sources;
    }
    if let Some(optional) = o.optional {
        opts.optional_sources = optional;
    }
    if o.workers.is_some() {
        opts.workers = o.workers;
    }
    if o.fail_fast {
        opts.failure_policy = FailurePolicy::Abort;
    }

    opts.validate()?;
    Ok(opts)
}

fn handle_pack(
    partition: PartitionArgs,
    config: Option<PathBuf>,
    overrides: Overrides,
    quiet: bool,
) -> anyhow::Result<bool> {
    let opts = build_options(&partition, config, overrides)?;
    let catalog = DirectoryCatalog::open(&partition.root, &opts.subset, &opts.split)?;

    if !quiet {
        eprintln!("Root:     {}", partition.root.display());
        eprintln!("Subset:   {} / {}", opts.subset, opts.split);
        eprintln!("Output:   {}", opts.output_dir.display());
        eprintln!(
            "Format:   {} Hz, {:?}, {}",
            opts.sample_rate, opts.channels, opts.resample
        );
        let order: Vec<&str> = opts.packing_order().iter().map(|s| s.as_str()).collect();
        eprintln!("Sources:  {}", order.join(", "));
        eprintln!();
        setup_progress_callback();
    }

    let report = pack_dataset(&catalog, &opts)?;

    if !quiet {
        eprintln!();
        eprintln!(
            "Packed {} of {} tracks in {:.2}s",
            report.packed.len(),
            report.total,
            report.elapsed.as_secs_f64()
        );
    }
    for failure in &report.failures {
        eprintln!("  failed [{}] {}: {}", failure.index, failure.name, failure.reason);
    }

    Ok(report.is_success())
}

fn handle_list(partition: PartitionArgs) -> anyhow::Result<bool> {
    let defaults = PackOptions::default();
    let subset = partition.subset.unwrap_or(defaults.subset);
    let split = partition.split.unwrap_or(defaults.split);
    let catalog = DirectoryCatalog::open(&partition.root, &subset, &split)?;

    let tracks = catalog.list_tracks()?;
    for track in &tracks {
        println!("{:>4}  {}", track.index, track.name());
    }
    eprintln!("{} tracks in {}/{}", tracks.len(), subset, split);
    Ok(true)
}

fn handle_inspect(path: PathBuf) -> anyhow::Result<bool> {
    let record = PackedRecord::open(&path)?;
    println!("audio_name:  {}", record.audio_name());
    println!("sample_rate: {}", record.sample_rate());
    for entry in &record.header().arrays {
        println!(
            "  {:<14} {} {:?} @ {} ({} bytes)",
            entry.name, entry.dtype, entry.shape, entry.offset, entry.length
        );
    }
    Ok(true)
}

fn handle_unpack(path: PathBuf, output: PathBuf) -> anyhow::Result<bool> {
    let record = PackedRecord::open(&path)?;
    for written in unpack_record(&record, &output)? {
        println!("{}", written.display());
    }
    Ok(true)
}

fn setup_progress_callback() {
    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    set_pack_progress_callback(move |event| match event {
        PackProgress::Started { total, .. } => {
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            bar.set_length(*total as u64);
        }
        PackProgress::Track {
            index,
            name,
            path: Some(path),
            mixture_shape,
            error: None,
            ..
        } => {
            let (channels, samples) = mixture_shape.unwrap_or_default();
            bar.println(format!(
                "[{index:>4}] {} ({channels} x {samples})",
                path.display()
            ));
            bar.inc(1);
            bar.set_message(name.clone());
        }
        PackProgress::Track {
            index,
            name,
            error,
            ..
        } => {
            let reason = error.as_deref().unwrap_or("no record written");
            bar.println(format!("[{index:>4}] failed {name}: {reason}"));
            bar.inc(1);
        }
        PackProgress::Finished { .. } => bar.finish_and_clear(),
    });
}
