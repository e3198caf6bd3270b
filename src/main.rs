use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seqstore::{
    dump::{write_reads, write_reads_to, DumpOptions, LibraryFiles, ReadSource},
    Mode, Partition, SeqStore, StoreOptions, Which,
};

#[derive(Parser)]
#[command(name = "seqstore")]
#[command(about = "Inspect and maintain sequence read stores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the store info and libraries
    Info {
        store: PathBuf,

        /// Metadata version to open (default: latest)
        #[arg(long)]
        version: Option<u32>,
    },

    /// Write reads as FASTQ (or FASTA), to stdout or to per-library files
    Dump {
        store: PathBuf,

        /// Metadata version to open (default: latest)
        #[arg(long, conflicts_with = "partition")]
        version: Option<u32>,

        /// Dump only the reads of this partition
        #[arg(short, long)]
        partition: Option<u32>,

        /// Write `PREFIX.LIBNAME.fastq` files instead of stdout
        #[arg(short, long)]
        output_prefix: Option<PathBuf>,

        /// With --output-prefix, write every library to `PREFIX.fastq`
        #[arg(long, requires = "output_prefix")]
        no_lib_name: bool,

        /// Dump raw reads
        #[arg(long, conflicts_with = "corrected")]
        raw: bool,

        /// Dump corrected reads
        #[arg(long)]
        corrected: bool,

        /// Dump trimmed reads
        #[arg(long)]
        trimmed: bool,

        /// Dump homopolymer-compressed reads
        #[arg(long)]
        compressed: bool,

        /// Write FASTA instead of FASTQ
        #[arg(long)]
        fasta: bool,

        /// Only read `id` or the inclusive range `bgn-end`
        #[arg(short, long)]
        range: Option<String>,

        /// Only reads of this library
        #[arg(short, long)]
        library: Option<u32>,

        /// Write the reverse complement
        #[arg(long)]
        reverse: bool,

        /// Name reads `read<ID>` instead of using their names
        #[arg(long)]
        no_read_name: bool,

        /// Also write reads whose selected form is empty or ignored
        #[arg(long)]
        all_reads: bool,

        /// Write trimmed reads whole, with the bases outside the clear range in lower case
        #[arg(long)]
        all_bases: bool,
    },

    /// Mark reads ignored until the store holds the desired coverage
    Filter {
        store: PathBuf,

        /// Genome size in bases
        #[arg(long)]
        genome_size: u64,

        /// Desired coverage
        #[arg(long)]
        coverage: f64,

        /// Length bias: positive keeps longer reads, negative shorter ones
        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        bias: f64,

        /// Random seed (0 draws one from the system)
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Copy reads into partitions
    Partition {
        store: PathBuf,

        /// Tab-separated `readID<TAB>partition` lines; unlisted reads are left out
        #[arg(long)]
        map: PathBuf,
    },

    /// Delete every metadata version above `version`
    Revert {
        store: PathBuf,

        #[arg(long)]
        version: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let fatal = err
                .downcast_ref::<seqstore::Error>()
                .is_some_and(seqstore::Error::is_fatal);
            if fatal {
                eprintln!("integrity error: {err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info { store, version } => cmd_info(&store, version),
        Commands::Dump {
            store,
            version,
            partition,
            output_prefix,
            no_lib_name,
            raw,
            corrected,
            trimmed,
            compressed,
            fasta,
            range,
            library,
            reverse,
            no_read_name,
            all_reads,
            all_bases,
        } => {
            let mut which = Which::UNSET;
            if raw {
                which |= Which::RAW;
            }
            if corrected {
                which |= Which::CORRECTED;
            }
            if trimmed {
                which |= Which::TRIMMED;
            }
            if compressed {
                which |= Which::COMPRESSED;
            }
            let options = DumpOptions {
                which,
                fasta,
                range: range.as_deref().map(parse_range).transpose()?,
                library,
                reverse,
                read_names: !no_read_name,
                all_reads,
                all_bases,
            };
            let output = output_prefix.as_deref().map(|prefix| (prefix, !no_lib_name));
            cmd_dump(&store, version, partition, output, &options)
        }
        Commands::Filter {
            store,
            genome_size,
            coverage,
            bias,
            seed,
        } => {
            let mut store = StoreOptions::new().mode(Mode::Extend).open(&store)?;
            let summary =
                store.filter_to_target_coverage(genome_size, coverage, bias, seed, Which::UNSET)?;
            store.close()?;
            println!(
                "target {} bases: kept {} reads ({} bases), ignored {} reads ({} bases)",
                summary.target_bases,
                summary.reads_kept,
                summary.bases_kept,
                summary.reads_ignored,
                summary.bases_ignored
            );
            Ok(())
        }
        Commands::Partition { store, map } => {
            let mut store = SeqStore::open_read_only(&store)?;
            let assignment = load_assignment(&map, store.last_read_id())?;
            let map = store.build_partitions(&assignment)?;
            for partition in 1..=map.num_partitions() {
                println!("partition {partition:04}\t{} reads", map.len(partition));
            }
            println!("unassigned\t{} reads", map.len(0));
            Ok(())
        }
        Commands::Revert { store, version } => {
            SeqStore::revert_to_version(&store, version)?;
            Ok(())
        }
    }
}

fn open_version(path: &Path, version: Option<u32>) -> Result<SeqStore> {
    let mut options = StoreOptions::new().mode(Mode::ReadOnly);
    if let Some(version) = version {
        options = options.version(version);
    }
    Ok(options.open(path)?)
}

fn cmd_info(path: &Path, version: Option<u32>) -> Result<()> {
    let store = open_version(path, version)?;
    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "store            {}", path.display())?;
    writeln!(
        out,
        "metadata version {} of {}",
        store.version(),
        SeqStore::last_version(path)?
    )?;
    writeln!(out, "default reads    {}", store.default_which())?;
    write!(out, "{}", store.info())?;
    writeln!(out)?;
    writeln!(out, "{:>6}  {:<20} name", "id", "technology")?;
    for id in 1..=store.last_library_id() {
        if let Some(library) = store.library(id) {
            writeln!(
                out,
                "{:>6}  {:<20} {}",
                library.id(),
                library.technology().to_string(),
                library.name()
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

fn cmd_dump(
    path: &Path,
    version: Option<u32>,
    partition: Option<u32>,
    output: Option<(&Path, bool)>,
    options: &DumpOptions,
) -> Result<()> {
    let mut store = open_version(path, version)?;
    let which = store.resolve(options.which);
    if store.num_reads(which) == 0 {
        log::warn!("no {which} reads in store {}", path.display());
    }
    let library_names = (1..=store.last_library_id())
        .filter_map(|id| store.library(id).map(|library| library.name().to_string()))
        .collect();

    let written = if let Some(id) = partition {
        let mut partition = Partition::open(path, id)?;
        log::info!("dumping {} reads of partition {id:04}", partition.len());
        dump_source(&mut partition, options, output, library_names)?
    } else {
        dump_source(&mut store, options, output, library_names)?
    };
    log::info!("dumped {written} reads");
    Ok(())
}

fn dump_source<S: ReadSource>(
    source: &mut S,
    options: &DumpOptions,
    output: Option<(&Path, bool)>,
    library_names: Vec<String>,
) -> Result<u64> {
    let Some((prefix, per_library)) = output else {
        let mut out = BufWriter::new(io::stdout().lock());
        let written = write_reads(source, options, &mut out)?;
        out.flush()?;
        return Ok(written);
    };

    let mut files = if per_library {
        LibraryFiles::per_library(prefix, options.fasta, library_names)
    } else {
        LibraryFiles::merged(prefix, options.fasta)
    };
    let written = write_reads_to(source, options, &mut files)?;
    for path in files.finish()? {
        log::info!("wrote {}", path.display());
    }
    Ok(written)
}

/// Parses `id` or `bgn-end`
fn parse_range(range: &str) -> Result<(u32, u32)> {
    let (bgn, end) = if let Some((bgn, end)) = range.split_once('-') {
        (bgn.parse()?, end.parse()?)
    } else {
        let id = range.parse()?;
        (id, id)
    };
    if end < bgn {
        bail!("reversed read range {bgn}-{end}");
    }
    Ok((bgn, end))
}

/// Reads `readID<TAB>partition` lines into a per-read assignment
fn load_assignment(path: &Path, last_read_id: u32) -> Result<Vec<u32>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read partition map {}", path.display()))?;
    let mut assignment = vec![0; last_read_id as usize + 1];
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(id), Some(partition)) = (fields.next(), fields.next()) else {
            bail!("{}:{}: expected `readID partition`", path.display(), line_no + 1);
        };
        let id: u32 = id
            .parse()
            .with_context(|| format!("{}:{}: bad read ID", path.display(), line_no + 1))?;
        let partition: u32 = partition
            .parse()
            .with_context(|| format!("{}:{}: bad partition", path.display(), line_no + 1))?;
        if id == 0 || id > last_read_id {
            bail!(
                "{}:{}: read {id} is not in the store (last read {last_read_id})",
                path.display(),
                line_no + 1
            );
        }
        assignment[id as usize] = partition;
    }
    Ok(assignment)
}
