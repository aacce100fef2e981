//! pileup-engine CLI entry point
//!
//! Builds, transforms, relocates and exports per-base signal tables.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pileup_engine::core::{
    parse_chain_file, Assembly, CancellationToken, ChromDialect, Element, EngineConfig, Layout, SignalTable, WorkerPool,
};
use pileup_engine::engine::fragsize::{estimate_fragment_size, FragmentSizeCache, FragmentSizeParams};
use pileup_engine::engine::ingest::{
    load_bed, load_bowtie, load_tag_directory, IngestOptions, IngestReport, RegionHandling, StrandlessPolicy,
};
use pileup_engine::engine::liftover::{
    lift_over_chain_file, lift_over_mapping_table, mappability_from_chain, mappability_from_mapping_table, ChainFilter,
    LiftoverReport, MappabilityDirection,
};
use pileup_engine::engine::persist::{self, spill_to_scratch, LoadMode};
use pileup_engine::engine::pipeline::{load_soft_masked, ReadSource, SoftMaskedInputs};
use pileup_engine::engine::transform::{
    fragment_extend, hard_mask, mixdown, soft_mask, HardMaskPolicy, MixdownMode, DEFAULT_HARD_MASK_THRESHOLD,
};
use pileup_engine::formats::bed::export_bed_runs;
use pileup_engine::formats::wig::bigwig::import_bigwig;
use pileup_engine::formats::wig::{export_wig, import_wig, WigFormat};
use pileup_engine::AnySignalTable;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "pileup-engine")]
#[command(about = "Per-base genomic signal pileups")]
#[command(version)]
#[command(author = "pileup-engine Contributors")]
struct Cli {
    /// Number of worker threads (default: number of CPUs)
    #[arg(short = 't', long, global = true)]
    threads: Option<usize>,

    /// Maximum elements handled by one unit of work
    #[arg(long = "max-payload", global = true, default_value_t = pileup_engine::core::config::DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,

    /// Maximum chromosomes loaded memory-mapped
    #[arg(long = "max-mapped", global = true, default_value_t = pileup_engine::core::config::DEFAULT_MAX_MAPPED_CHROMOSOMES)]
    max_mapped: usize,

    /// Directory for scratch memory maps
    #[arg(long = "scratch-dir", global = true)]
    scratch_dir: Option<PathBuf>,

    /// Chromosome naming: a(as-is), s(short), l(long)
    #[arg(long = "chromid", global = true, default_value = "l")]
    dialect: DialectArg,

    /// Save arrays uncompressed
    #[arg(long = "no-compress", global = true)]
    no_compress: bool,

    /// Log ingest progress every N records
    #[arg(long = "report-interval", global = true, default_value_t = pileup_engine::core::config::DEFAULT_REPORT_INTERVAL)]
    report_interval: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    /// Keep chromosome names as-is
    #[value(name = "a")]
    AsIs,
    /// Use short names (1, 2, X)
    #[value(name = "s")]
    Short,
    /// Use long names (chr1, chr2, chrX)
    #[value(name = "l")]
    Long,
}

impl From<DialectArg> for ChromDialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::AsIs => ChromDialect::AsIs,
            DialectArg::Short => ChromDialect::Ensembl,
            DialectArg::Long => ChromDialect::Ucsc,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReadFormatArg {
    /// BED-like intervals (BED, tagAlign)
    Bed,
    /// Bowtie alignment summaries
    Bowtie,
    /// HOMER-style tag directory
    Tags,
}

#[derive(Clone, Copy, ValueEnum)]
enum RegionArg {
    Whole,
    Starts,
    Ends,
}

impl From<RegionArg> for RegionHandling {
    fn from(arg: RegionArg) -> Self {
        match arg {
            RegionArg::Whole => RegionHandling::Whole,
            RegionArg::Starts => RegionHandling::Starts,
            RegionArg::Ends => RegionHandling::Ends,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Stranded,
    Unstranded,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Stranded => Layout::Stranded,
            LayoutArg::Unstranded => Layout::Unstranded,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    From,
    To,
}

impl From<DirectionArg> for MappabilityDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::From => MappabilityDirection::From,
            DirectionArg::To => MappabilityDirection::To,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormatArg {
    /// fixedStep WIG
    Wig,
    /// variableStep WIG
    VariableWig,
    /// BED runs of equal nonzero value
    Bed,
}

/// Reads plus the assembly they are piled onto
#[derive(Args)]
struct ReadArgs {
    /// Aligned reads (file, or directory for tags)
    reads: PathBuf,
    /// Chromosome sizes table
    #[arg(short = 's', long)]
    sizes: PathBuf,
    /// Assembly name (e.g., hg38)
    #[arg(short = 'b', long)]
    build: String,
    /// Read file format
    #[arg(short = 'f', long, default_value = "bed")]
    format: ReadFormatArg,
}

#[derive(Args)]
struct FragmentArgs {
    /// First fragment length considered
    #[arg(long = "search-start", default_value_t = 50)]
    search_start: usize,
    /// One past the last fragment length considered
    #[arg(long = "search-end", default_value_t = 500)]
    search_end: usize,
    /// Gaussian sigma for the derivative of the correlation curve
    #[arg(long = "sigma", default_value_t = 10.0)]
    sigma: f64,
}

impl From<&FragmentArgs> for FragmentSizeParams {
    fn from(args: &FragmentArgs) -> Self {
        FragmentSizeParams {
            search_start: args.search_start,
            search_end: args.search_end,
            smoothing_sigma: args.sigma,
        }
    }
}

#[derive(Args)]
struct ChainFilterArgs {
    /// Ignore chains scoring below this
    #[arg(long = "min-score")]
    min_score: Option<u64>,
    /// Ignore chains spanning less query sequence
    #[arg(long = "min-query-size")]
    min_query_size: Option<u64>,
    /// Ignore chains spanning less reference sequence
    #[arg(long = "min-reference-size")]
    min_reference_size: Option<u64>,
}

impl From<&ChainFilterArgs> for ChainFilter {
    fn from(args: &ChainFilterArgs) -> Self {
        ChainFilter {
            min_score: args.min_score,
            min_query_size: args.min_query_size,
            min_reference_size: args.min_reference_size,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pile reads up into a new table
    Pileup {
        #[command(flatten)]
        input: ReadArgs,
        /// Output table directory
        output: PathBuf,
        /// Table name (default: reads file stem)
        #[arg(short = 'n', long)]
        name: Option<String>,
        /// Positions each read contributes to
        #[arg(long = "region", default_value = "whole")]
        region: RegionArg,
        #[arg(long, default_value = "stranded")]
        layout: LayoutArg,
        /// Unstranded only: move + reads left and - reads right by this much
        #[arg(long = "strand-shift", default_value_t = 0)]
        strand_shift: i64,
        /// Treat reads without a strand as +
        #[arg(long = "assume-plus")]
        assume_plus: bool,
    },
    /// Estimate fragment length from a stranded read-start table
    FragmentSize {
        /// Stranded starts table directory
        input: PathBuf,
        #[command(flatten)]
        params: FragmentArgs,
        /// Append the estimate to this cache file under the table name
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Write the correlation curve (lag<TAB>value) here
        #[arg(long)]
        curve: Option<PathBuf>,
    },
    /// Extend read starts into fragments
    Extend {
        input: PathBuf,
        output: PathBuf,
        /// Fragment length (estimated when omitted)
        #[arg(short = 'l', long = "fragment-length")]
        fragment_length: Option<usize>,
        #[command(flatten)]
        params: FragmentArgs,
    },
    /// Fold a stranded table into one channel
    Mixdown {
        input: PathBuf,
        output: PathBuf,
        #[arg(long = "strand-shift", default_value_t = 0)]
        strand_shift: usize,
        #[arg(long, default_value_t = 0)]
        extend: usize,
    },
    /// Build a soft mask (and optionally a hard mask) from alignable starts
    SoftMask {
        /// BED of alignable read-start regions
        alignable: PathBuf,
        #[arg(short = 's', long)]
        sizes: PathBuf,
        #[arg(short = 'b', long)]
        build: String,
        #[arg(short = 'r', long = "read-length")]
        read_length: usize,
        #[arg(short = 'l', long = "fragment-length")]
        fragment_length: usize,
        /// Soft mask output directory
        output: PathBuf,
        /// Hard mask output directory
        #[arg(long = "hard-mask")]
        hard_mask: Option<PathBuf>,
        /// Keep only positions where both strands are fully alignable
        #[arg(long)]
        conservative: bool,
    },
    /// Lift a table onto another assembly
    Liftover {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "unstranded")]
        layout: LayoutArg,
        /// Destination chromosome sizes
        #[arg(long = "to-sizes")]
        to_sizes: PathBuf,
        /// Destination assembly name
        #[arg(long = "to-build")]
        to_build: String,
        #[arg(long, conflicts_with = "mapping_table", required_unless_present = "mapping_table")]
        chain: Option<PathBuf>,
        #[arg(long = "mapping-table")]
        mapping_table: Option<PathBuf>,
        #[command(flatten)]
        filter: ChainFilterArgs,
    },
    /// Count alignment blocks covering each position
    Mappability {
        output: PathBuf,
        #[arg(short = 's', long)]
        sizes: PathBuf,
        #[arg(short = 'b', long)]
        build: String,
        /// Sizes of the other assembly (chains only)
        #[arg(long = "other-sizes")]
        other_sizes: Option<PathBuf>,
        #[arg(long = "other-build")]
        other_build: Option<String>,
        #[arg(long, default_value = "from")]
        direction: DirectionArg,
        #[arg(long, conflicts_with = "mapping_table", required_unless_present = "mapping_table")]
        chain: Option<PathBuf>,
        #[arg(long = "mapping-table")]
        mapping_table: Option<PathBuf>,
        #[command(flatten)]
        filter: ChainFilterArgs,
    },
    /// Write an unstranded table as WIG or BED
    Export {
        input: PathBuf,
        output: PathBuf,
        #[arg(short = 'f', long, default_value = "wig")]
        format: ExportFormatArg,
        /// Track description (WIG) or feature-name prefix (BED)
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Load WIG or BigWig values into a new unstranded table
    Import {
        /// WIG (fixedStep/variableStep/bedGraph lines) or BigWig file
        input: PathBuf,
        output: PathBuf,
        #[arg(short = 's', long)]
        sizes: PathBuf,
        #[arg(short = 'b', long)]
        build: String,
        /// Table name (default: input file stem)
        #[arg(short = 'n', long)]
        name: Option<String>,
        /// Read the input as BigWig regardless of its extension
        #[arg(long)]
        bigwig: bool,
    },
    /// Soft-masked fragment pileup of one replicate, with caching
    SoftMasked {
        #[command(flatten)]
        input: ReadArgs,
        /// BED of alignable read-start regions
        #[arg(long)]
        alignable: PathBuf,
        /// Cache directory
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(short = 'n', long)]
        name: Option<String>,
        #[command(flatten)]
        params: FragmentArgs,
        #[arg(long)]
        conservative: bool,
        /// Check that no position inside the hard mask exceeds twice the fragment length
        #[arg(long)]
        validate: bool,
    },
    /// Describe a saved table
    Info {
        input: PathBuf,
        #[arg(long, default_value = "unstranded")]
        layout: LayoutArg,
    },
}

fn load_assembly(name: &str, sizes: &Path, dialect: ChromDialect) -> anyhow::Result<Assembly> {
    Assembly::load_sizes(name, sizes, &dialect)
        .with_context(|| format!("Failed to load chromosome sizes from {}", sizes.display()))
}

fn file_stem(path: &Path) -> String {
    ReadSource::Bed(path.to_path_buf()).replicate_name()
}

fn load_stranded(input: &Path, config: &EngineConfig) -> anyhow::Result<SignalTable<f32>> {
    persist::load::<f32, _>(input, Layout::Stranded, LoadMode::MappedReadOnly, config)
        .with_context(|| format!("Failed to load stranded table from {}", input.display()))
}

fn print_ingest(report: &IngestReport) {
    eprintln!("Records:         {}", report.records);
    eprintln!("Skipped:         {}", report.skipped);
    eprintln!("Clamped:         {}", report.clamped);
    eprintln!("Missing chroms:  {}", report.missing_chromosomes.len());
}

fn print_table<T: Element>(table: &SignalTable<T>) {
    let meta = table.meta();
    eprintln!("Name:            {}", meta.name);
    eprintln!("Build:           {}", table.assembly().name);
    eprintln!("Layout:          {}", table.layout().name());
    eprintln!("Element type:    {}", table.dtype());
    eprintln!("Chromosomes:     {}", table.chromosome_count());
    eprintln!("Genome size:     {}", table.genome_size());
    eprintln!("Normalized:      {}", meta.is_normalized);
    if let Some(mode) = meta.mode_read_length {
        eprintln!("Mode read len:   {}", mode);
    }
    eprintln!("Signal sum:      {:.2}", table.sum());
    eprintln!("Signal max:      {:.2}", table.max().unwrap_or(0.0));
}

fn print_liftover<T: Element>(report: &LiftoverReport<T>) {
    eprintln!("Blocks copied:   {}", report.blocks_copied);
    eprintln!("Chains filtered: {}", report.filtered);
    eprintln!("Missing chroms:  {}", report.missing.len());
}

fn lift_and_save<T: Element>(
    source: &SignalTable<T>,
    destination: &Assembly,
    chain: Option<&PathBuf>,
    mapping_table: Option<&PathBuf>,
    filter: &ChainFilter,
    output: &Path,
    pool: &WorkerPool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let report = match (chain, mapping_table) {
        (Some(chain), _) => {
            lift_over_chain_file(source, destination, chain, filter, pool)
                .with_context(|| format!("Failed to lift over with chain file {}", chain.display()))?
        }
        (None, Some(table)) => lift_over_mapping_table(source, destination, table, pool)?,
        (None, None) => anyhow::bail!("either --chain or --mapping-table is required"),
    };
    persist::save(&report.table, output, config.compress)?;
    print_liftover(&report);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    let mut config = EngineConfig::default()
        .with_max_payload(cli.max_payload)
        .with_max_mapped_chromosomes(cli.max_mapped)
        .with_compress(!cli.no_compress)
        .with_report_interval(cli.report_interval);
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }
    if let Some(dir) = &cli.scratch_dir {
        config = config.with_scratch_dir(dir);
    }
    config.validate()?;
    let dialect: ChromDialect = cli.dialect.into();

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            eprintln!("Interrupted, cancelling ...");
            token.cancel();
        })
        .context("Failed to install interrupt handler")?;
    }
    let pool = WorkerPool::from_config(&config, token)?;

    match cli.command {
        Commands::Pileup { input, output, name, region, layout, strand_shift, assume_plus } => {
            let assembly = load_assembly(&input.build, &input.sizes, dialect)?;
            let name = name.unwrap_or_else(|| file_stem(&input.reads));
            let mut table = SignalTable::<f32>::create(&name, &assembly, dialect, layout.into());
            if config.scratch_dir.is_some() {
                spill_to_scratch(&mut table, &config, true)?;
            }
            let mut options = IngestOptions::new(region.into()).with_strand_shift(strand_shift);
            if assume_plus {
                options = options.with_strandless(StrandlessPolicy::AssumePlus);
            }

            eprintln!("Piling up {:?} -> {:?}", input.reads, output);
            let report = match input.format {
                ReadFormatArg::Bed => load_bed(&mut table, &input.reads, &options, &pool, &config)?,
                ReadFormatArg::Bowtie => load_bowtie(&mut table, &input.reads, &options, &pool, &config)?,
                ReadFormatArg::Tags => load_tag_directory(&mut table, &input.reads, &options, &pool, &config)?,
            };
            persist::save(&table, &output, config.compress)?;

            eprintln!("\n=== Pileup Statistics ===");
            print_ingest(&report);
            eprintln!("Coverage:        {:.4}", table.meta().coverage);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::FragmentSize { input, params, cache, curve } => {
            let starts = load_stranded(&input, &config)?;
            let params = FragmentSizeParams::from(&params);
            let estimate = estimate_fragment_size(&starts, &params, &pool, &config)?;
            if let Some(cache) = cache {
                FragmentSizeCache::new(cache).store(starts.name(), estimate.fragment_length)?;
            }
            if let Some(curve) = curve {
                let lines: Vec<String> = estimate
                    .curve
                    .iter()
                    .enumerate()
                    .map(|(i, v)| format!("{}\t{}", params.search_start + i, v))
                    .collect();
                std::fs::write(&curve, lines.join("\n") + "\n")?;
            }
            println!("{}", estimate.fragment_length);

            eprintln!("\n=== Fragment Size Statistics ===");
            eprintln!("Fragment length: {}", estimate.fragment_length);
            eprintln!("Half shift:      {}", estimate.half_shift);
            eprintln!("Candidates:      {:?}", estimate.candidates);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Extend { input, output, fragment_length, params } => {
            let starts = load_stranded(&input, &config)?;
            let fragment_length = match fragment_length {
                Some(length) => length,
                None => {
                    estimate_fragment_size(&starts, &FragmentSizeParams::from(&params), &pool, &config)?.fragment_length
                }
            };
            eprintln!("Extending {:?} to fragments of {} bp -> {:?}", input, fragment_length, output);
            let extended = fragment_extend(&starts, fragment_length, &pool, &config)?;
            persist::save(&extended, &output, config.compress)?;

            eprintln!("\n=== Extension Statistics ===");
            eprintln!("Fragment length: {}", fragment_length);
            eprintln!("Signal sum:      {:.2}", extended.sum());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Mixdown { input, output, strand_shift, extend } => {
            let table = load_stranded(&input, &config)?;
            let mode = MixdownMode::from_params(strand_shift, extend)?;
            eprintln!("Mixing down {:?} -> {:?}", input, output);
            let mixed = mixdown(&table, mode, &pool, &config)?;
            persist::save(&mixed, &output, config.compress)?;

            eprintln!("\n=== Mixdown Statistics ===");
            eprintln!("Input sum:       {:.2}", table.sum());
            eprintln!("Output sum:      {:.2}", mixed.sum());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::SoftMask { alignable, sizes, build, read_length, fragment_length, output, hard_mask: hard_output, conservative } => {
            let assembly = load_assembly(&build, &sizes, dialect)?;
            let mut starts = SignalTable::<f32>::create(
                &format!("{}_{}_soft_mask_starts", build, read_length),
                &assembly,
                dialect,
                Layout::Stranded,
            );
            let options = IngestOptions::new(RegionHandling::Whole).with_strandless(StrandlessPolicy::AssumePlus);
            let report = load_bed(&mut starts, &alignable, &options, &pool, &config)?;
            let soft = soft_mask(&starts, read_length, fragment_length, &pool, &config)?;
            persist::save(&soft, &output, config.compress)?;
            if let Some(hard_output) = hard_output {
                let policy = if conservative {
                    HardMaskPolicy::Conservative { threshold: DEFAULT_HARD_MASK_THRESHOLD }
                } else {
                    HardMaskPolicy::Permissive
                };
                let mask = hard_mask(&soft, policy, &pool, &config)?;
                persist::save(&mask, &hard_output, config.compress)?;
                eprintln!("Hard mask:       {:.0} positions", mask.sum());
            }

            eprintln!("\n=== Soft Mask Statistics ===");
            print_ingest(&report);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Liftover { input, output, layout, to_sizes, to_build, chain, mapping_table, filter } => {
            let destination = load_assembly(&to_build, &to_sizes, dialect)?;
            let filter = ChainFilter::from(&filter);
            let source = persist::load_any(&input, layout.into(), LoadMode::MappedReadOnly, &config)?;
            eprintln!("Lifting {:?} onto {} -> {:?}", input, to_build, output);

            eprintln!("\n=== Liftover Statistics ===");
            let (chain, mapping_table) = (chain.as_ref(), mapping_table.as_ref());
            match &source {
                AnySignalTable::F32(t) => lift_and_save(t, &destination, chain, mapping_table, &filter, &output, &pool, &config)?,
                AnySignalTable::F64(t) => lift_and_save(t, &destination, chain, mapping_table, &filter, &output, &pool, &config)?,
                AnySignalTable::U32(t) => lift_and_save(t, &destination, chain, mapping_table, &filter, &output, &pool, &config)?,
                AnySignalTable::U8(t) => lift_and_save(t, &destination, chain, mapping_table, &filter, &output, &pool, &config)?,
                AnySignalTable::Bool(t) => lift_and_save(t, &destination, chain, mapping_table, &filter, &output, &pool, &config)?,
            }
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Mappability { output, sizes, build, other_sizes, other_build, direction, chain, mapping_table, filter } => {
            let assembly = load_assembly(&build, &sizes, dialect)?;
            let report = match (chain, mapping_table) {
                (Some(chain), _) => {
                    let (Some(other_sizes), Some(other_build)) = (other_sizes, other_build) else {
                        anyhow::bail!("--other-sizes and --other-build are required with --chain");
                    };
                    let other = load_assembly(&other_build, &other_sizes, dialect)?;
                    let chains = parse_chain_file(&chain)
                        .with_context(|| format!("Failed to load chain file {}", chain.display()))?;
                    mappability_from_chain(&assembly, &other, dialect, &chains, &ChainFilter::from(&filter), direction.into(), &pool)?
                }
                (None, Some(table)) => mappability_from_mapping_table(&assembly, dialect, &table, direction.into(), &pool)?,
                (None, None) => anyhow::bail!("either --chain or --mapping-table is required"),
            };
            persist::save(&report.table, &output, config.compress)?;

            eprintln!("\n=== Mappability Statistics ===");
            print_liftover(&report);
            eprintln!("Covered bases:   {}", report.table.nonzero().sum());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Export { input, output, format, description } => {
            let table = persist::load_any(&input, Layout::Unstranded, LoadMode::MappedReadOnly, &config)?.to_f64();
            eprintln!("Exporting {:?} -> {:?}", input, output);
            let written = match format {
                ExportFormatArg::Wig => export_wig(&table, &output, WigFormat::FixedStep, &description, dialect)?,
                ExportFormatArg::VariableWig => export_wig(&table, &output, WigFormat::VariableStep, &description, dialect)?,
                ExportFormatArg::Bed => export_bed_runs(&table, &output, &description)?,
            };

            eprintln!("\n=== Export Statistics ===");
            eprintln!("Lines written:   {}", written);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Import { input, output, sizes, build, name, bigwig } => {
            let assembly = load_assembly(&build, &sizes, dialect)?;
            let name = name.unwrap_or_else(|| file_stem(&input));
            let mut table = SignalTable::<f64>::create(&name, &assembly, dialect, Layout::Unstranded);
            let is_bigwig = bigwig
                || input
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("bw") || e.eq_ignore_ascii_case("bigwig"));
            eprintln!("Importing {:?} -> {:?}", input, output);
            let report = if is_bigwig {
                import_bigwig(&mut table, &input)?
            } else {
                import_wig(&mut table, &input)?
            };
            persist::save(&table, &output, config.compress)?;

            eprintln!("\n=== Import Statistics ===");
            eprintln!("Data points:     {}", report.points);
            eprintln!("Positions:       {}", report.populated);
            eprintln!("Missing chroms:  {}", report.missing_chromosomes.len());
            eprintln!("Signal sum:      {:.2}", table.sum());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::SoftMasked { input, alignable, data_dir, name, params, conservative, validate } => {
            let assembly = load_assembly(&input.build, &input.sizes, dialect)?;
            let reads = match input.format {
                ReadFormatArg::Bed => ReadSource::Bed(input.reads),
                ReadFormatArg::Bowtie => ReadSource::Bowtie(input.reads),
                ReadFormatArg::Tags => ReadSource::TagDirectory(input.reads),
            };
            let name = name.unwrap_or_else(|| reads.replicate_name());
            let mut inputs = SoftMaskedInputs::new(name, assembly, reads, alignable, data_dir);
            inputs.dialect = dialect;
            inputs.fragment_params = FragmentSizeParams::from(&params);
            inputs.validate = validate;
            if conservative {
                inputs.hard_mask_policy = HardMaskPolicy::conservative();
            }
            let result = load_soft_masked(&inputs, &pool, &config)?;

            eprintln!("\n=== Soft-Masked Signal Statistics ===");
            eprintln!("Fragment length: {}", result.fragment_length);
            eprintln!("Read length:     {}", result.read_length);
            eprintln!("Signal sum:      {:.2}", result.signal.sum());
            eprintln!("Masked bases:    {:.0}", result.hard_mask.sum());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Info { input, layout } => {
            let table = persist::load_any(&input, layout.into(), LoadMode::MappedReadOnly, &config)?;
            eprintln!("\n=== Table ===");
            match &table {
                AnySignalTable::F32(t) => print_table(t),
                AnySignalTable::F64(t) => print_table(t),
                AnySignalTable::U32(t) => print_table(t),
                AnySignalTable::U8(t) => print_table(t),
                AnySignalTable::Bool(t) => print_table(t),
            }
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
