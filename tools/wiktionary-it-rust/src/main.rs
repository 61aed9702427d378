use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wiktionary_it::config::{self, ConfigFile, ParserConfig};
use wiktionary_it::dump::{self, PageFilter};
use wiktionary_it::output;
use wiktionary_it::parallel::{self, FailurePolicy, ParallelConfig, RunOptions, Stats, Strategy};
use wiktionary_it::Result;

#[derive(Parser)]
#[command(name = "wiktionary-it-rust")]
#[command(about = "Fast Rust-based Italian Wiktionary XML parser - outputs one record per headword")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a lexicon from a dump
    Extract(ExtractArgs),
    /// Rewrite a compressed lexicon as plain JSON
    Decompress {
        /// Lexicon file (.json or .json.bz2)
        input: PathBuf,
        /// Plain JSON output
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// Input XML file (.xml or .xml.bz2)
    input: PathBuf,

    /// Output JSON file (.bz2 suffix implies --compress)
    output: PathBuf,

    /// Processing strategy
    #[arg(short, long, value_enum, default_value_t = Strategy::ChannelPipeline)]
    strategy: Strategy,

    /// Number of threads (4 = default, 0 = auto-detect)
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Batch size for batch-parallel strategy
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Channel buffer size for channel-pipeline strategy
    #[arg(long, default_value_t = 10000)]
    channel_buffer: usize,

    /// Limit number of pages to scan (for testing with raw dumps)
    #[arg(long)]
    page_limit: Option<usize>,

    /// Write the lexicon bzip2-compressed
    #[arg(long)]
    compress: bool,

    /// Log failed pages and continue instead of aborting
    #[arg(long)]
    keep_going: bool,

    /// Language code table (TSV with header, or YAML map)
    #[arg(long)]
    langs: Option<PathBuf>,

    /// YAML config file with lookup table overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target language code
    #[arg(long)]
    lang: Option<String>,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,
}

impl ExtractArgs {
    fn parallel_config(&self) -> ParallelConfig {
        let mut config = ParallelConfig::default();
        if self.threads > 0 {
            config.num_threads = self.threads;
            config.num_workers = self.threads.saturating_sub(1).max(1);
        }
        config.batch_size = self.batch_size;
        config.channel_buffer = self.channel_buffer;
        config
    }

    /// Lookup tables and title filter: built-ins, then `--config`, then flags.
    fn parser_setup(&self) -> Result<(ParserConfig, PageFilter)> {
        let mut parser_config = ParserConfig::default();
        let mut filter = PageFilter::default();

        if let Some(path) = &self.config {
            let file = ConfigFile::load(path)?;
            parser_config = parser_config.merge_file(&file)?;
            filter = filter.with_extra_titles(file.skip_titles);
        }
        if let Some(path) = &self.langs {
            parser_config = parser_config.with_lang_names(config::load_lang_table(path)?);
        }
        if let Some(lang) = &self.lang {
            parser_config = parser_config.with_target_lang(lang.trim());
        }
        Ok((parser_config, filter))
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_stats(stats: &Stats, strategy: Strategy) {
    println!();
    println!("============================================================");
    println!("Strategy: {:?}", strategy);
    println!("Pages processed: {}", stats.pages_processed);
    println!("Entries extracted: {}", stats.entries_extracted);
    println!("Duplicate titles: {}", stats.duplicates);
    println!("------------------------------------------------------------");
    println!("Special pages: {}", stats.special);
    println!("Pages without text: {}", stats.no_text);
    println!("Pages without target language: {}", stats.no_language);
    println!("Failed pages: {}", stats.failed);
    println!("Time: {}m {}s", stats.elapsed.as_secs() / 60, stats.elapsed.as_secs() % 60);
    println!(
        "Rate: {:.0} pages/sec",
        stats.pages_processed as f64 / stats.elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("============================================================");
}

fn extract(args: &ExtractArgs) -> Result<()> {
    let (parser_config, filter) = args.parser_setup()?;
    let options = RunOptions {
        strategy: args.strategy,
        parallel: args.parallel_config(),
        page_limit: args.page_limit,
        failure_policy: if args.keep_going {
            FailurePolicy::Skip
        } else {
            FailurePolicy::FailFast
        },
        filter,
    };

    if !args.quiet {
        println!("Parsing: {}", args.input.display());
        println!("Output: {}", args.output.display());
        println!("Strategy: {:?}", options.strategy);
        println!("Language: {}", parser_config.target_lang);
        if options.strategy != Strategy::Sequential {
            println!("Threads: {}", options.parallel.num_threads);
        }
        if let Some(limit) = options.page_limit {
            println!("Page limit: {}", limit);
        }
        println!();
    }

    let reader = dump::open_dump(&args.input)?;
    let pb = spinner(args.quiet);
    let extraction = parallel::run(reader, &parser_config, &options, &pb)?;
    pb.finish_and_clear();

    output::write_lexicon(&extraction.lexicon, &args.output, args.compress)?;

    if !args.quiet {
        print_stats(&extraction.stats, options.strategy);
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Extract(args) => extract(args),
        Command::Decompress { input, output: target } => {
            let entries = output::decompress(input, target)?;
            info!(entries, "decompressed");
            println!("Wrote {} entries to {}", entries, target.display());
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
