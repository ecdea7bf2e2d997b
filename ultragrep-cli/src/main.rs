use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::*;
use tracing::debug;
use ultragrep_core::config::load_search_config;
use ultragrep_core::{logging, time, FormatSpec, IndexBackend, SearchConfig};
use ultragrep_engine::{
    search, IndexDump, LogCollector, LogFollower, OutputMode, QueryEngine, RequestFilter,
    RequestPrinter, TailOptions, TimeWindow,
};
use ultragrep_index::{IndexBuilder, IndexCatalog};

mod range;
mod report;

use range::RangeArgs;

#[derive(Parser)]
#[command(name = "ultragrep")]
#[command(about = "Time-indexed search over large, possibly gzip-compressed, request logs", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./.ultragrep.toml, ~/.ultragrep.toml, /etc/ultragrep.toml)
    #[arg(long, global = true, env = "ULTRAGREP_CONFIG")]
    config: Option<PathBuf>,
    /// Be verbose; repeat for debug output
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Directory for index files instead of next to each log
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,
    /// Index storage backend
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,
    /// Never build or refresh indexes implicitly
    #[arg(long, global = true, default_value_t = false)]
    no_auto_index: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Flat,
    Sqlite,
}

impl From<BackendArg> for IndexBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Flat => IndexBackend::Flat,
            BackendArg::Sqlite => IndexBackend::Sqlite,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the indexes of log files
    BuildIndex(BuildIndexArgs),
    /// Print a log from approximately the start of the range
    Cat(CatArgs),
    /// Search one log file, printing `@@<time>` progress markers
    Query(QueryArgs),
    /// Search every log of a configured type and merge the results by time
    Search(SearchArgs),
    /// Show what the indexes of a log hold
    DumpIndex(DumpIndexArgs),
    /// Show version information
    Version,
}

#[derive(Args)]
struct BuildIndexArgs {
    #[arg(short, long, default_value = "app")]
    format: String,
    /// Rebuild from scratch even if the index is fresh
    #[arg(long, default_value_t = false)]
    force: bool,
    #[arg(required = true)]
    logs: Vec<PathBuf>,
}

#[derive(Args)]
struct CatArgs {
    #[arg(short, long, default_value = "app")]
    format: String,
    #[command(flatten)]
    range: RangeArgs,
    log: PathBuf,
}

#[derive(Args)]
struct FilterArgs {
    /// JSON field condition, `field=regex`; may be repeated
    #[arg(short, long = "key", value_name = "FIELD=REGEX")]
    keys: Vec<String>,
    /// Output just performance information
    #[arg(short, long, default_value_t = false)]
    perf: bool,
    #[command(flatten)]
    range: RangeArgs,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(short, long, default_value = "app")]
    format: String,
    #[command(flatten)]
    filter: FilterArgs,
    log: PathBuf,
    /// Every pattern must match some line of a request
    #[arg(required = true)]
    patterns: Vec<String>,
}

#[derive(Args)]
struct SearchArgs {
    /// Log type from the configuration
    #[arg(short = 't', long = "type")]
    log_type: Option<String>,
    /// Override the format configured for the type
    #[arg(short, long)]
    format: Option<String>,
    /// Only search hosts whose name matches this pattern
    #[arg(long)]
    host: Option<String>,
    /// Watch today's logs for requests as they come in; the range is ignored
    #[arg(long, default_value_t = false)]
    tail: bool,
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(required = true)]
    patterns: Vec<String>,
}

#[derive(Args)]
struct DumpIndexArgs {
    /// Emit JSON instead of tab separated rows
    #[arg(long, default_value_t = false)]
    json: bool,
    #[arg(required = true)]
    logs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    if let Err(err) = logging::init_tracing(Some(level)) {
        eprintln!("failed to initialise tracing: {err}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_broken_pipe(&err) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == ErrorKind::BrokenPipe)
    })
}

fn load_config(cli: &Cli) -> anyhow::Result<SearchConfig> {
    let mut config = load_search_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.index_dir {
        config.index.dir = Some(dir.clone());
    }
    if let Some(backend) = cli.backend {
        config.index.backend = backend.into();
    }
    if cli.no_auto_index {
        config.index.auto_build = false;
    }
    debug!(source = ?config.source, index = ?config.index, "configuration loaded");
    Ok(config)
}

fn output_mode(format: &FormatSpec, perf: bool) -> OutputMode {
    if perf {
        OutputMode::Perf
    } else if format.structured {
        OutputMode::Json
    } else {
        OutputMode::Plain
    }
}

fn engine_for(
    config: &SearchConfig,
    format: &str,
    window: TimeWindow,
    patterns: &[String],
    keys: &[String],
) -> anyhow::Result<QueryEngine> {
    let format = FormatSpec::resolve(format, config)?;
    let filter = RequestFilter::compile(window, patterns, keys)?;
    Ok(QueryEngine::new(format, &config.index, filter))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Commands::BuildIndex(args) => build_index(&config, &args)?,
        Commands::Cat(args) => {
            let window = args.range.window()?;
            let engine = engine_for(&config, &args.format, window, &[], &[])?;
            engine
                .cat(&args.log, window.start, &mut out)
                .with_context(|| format!("cat {}", args.log.display()))?;
        }
        Commands::Query(args) => {
            let window = args.filter.range.window()?;
            let engine = engine_for(
                &config,
                &args.format,
                window,
                &args.patterns,
                &args.filter.keys,
            )?;
            let mode = output_mode(engine.format(), args.filter.perf);
            let mut printer = RequestPrinter::new(&mut out, mode)?;
            let stats = engine
                .run(&args.log, &mut printer)
                .with_context(|| format!("query {}", args.log.display()))?;
            if cli.verbose > 0 {
                eprintln!(
                    "{} {} of {} requests matched",
                    "✔".green().bold(),
                    stats.matched,
                    stats.requests
                );
            }
        }
        Commands::Search(args) => run_search(&config, &args, cli.verbose > 0, &mut out)?,
        Commands::DumpIndex(args) => {
            let catalog = IndexCatalog::new(&config.index);
            for log in &args.logs {
                let dump = IndexDump::load(&catalog, log)
                    .with_context(|| format!("dump index of {}", log.display()))?;
                if args.json {
                    dump.write_json(&mut out)?;
                } else {
                    dump.write_text(&mut out)?;
                }
            }
        }
        Commands::Version => {
            writeln!(out, "ultragrep v{}", env!("CARGO_PKG_VERSION"))?;
        }
    }

    out.flush()?;
    Ok(())
}

fn build_index(config: &SearchConfig, args: &BuildIndexArgs) -> anyhow::Result<()> {
    let format = FormatSpec::resolve(&args.format, config)?;
    let catalog = IndexCatalog::new(&config.index);
    let builder = IndexBuilder::new(&catalog, &format, &config.index);

    for log in &args.logs {
        if !log.is_file() {
            bail!("{} is not a file", log.display());
        }
        let report = if args.force {
            Some(builder.build(log, false)?)
        } else {
            builder.ensure_fresh(log)?
        };
        match report {
            Some(report) => report::print_build_report(&report),
            None => report::print_up_to_date(log),
        }
        report::print_status(&catalog.status(log)?);
    }
    Ok(())
}

fn run_search<W: Write>(
    config: &SearchConfig,
    args: &SearchArgs,
    verbose: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let (type_name, log_type) = config.log_type(args.log_type.as_deref())?;
    let format = args.format.as_deref().unwrap_or(&log_type.format);
    let window = if args.tail {
        TimeWindow::new(0, u64::MAX)?
    } else {
        args.filter.range.window()?
    };
    let engine = engine_for(config, format, window, &args.patterns, &args.filter.keys)?;

    let globs: Vec<String> = log_type.glob.iter().map(|glob| expand_home(glob)).collect();
    let collector = LogCollector::new(&globs, args.host.as_deref())?;
    if args.tail {
        return run_tail(&engine, &collector, type_name, args.filter.perf, verbose, out);
    }
    let groups = collector.collect(window)?;
    if groups.is_empty() {
        bail!(ultragrep_engine::QueryError::NoLogs(type_name.to_string()));
    }
    if verbose {
        report::print_plan(&groups);
    }

    let mode = output_mode(engine.format(), args.filter.perf);
    let stats = search(&engine, &groups, mode, out)?;
    if verbose {
        report::print_search_summary(&stats);
    }
    Ok(())
}

fn run_tail<W: Write>(
    engine: &QueryEngine,
    collector: &LogCollector,
    type_name: &str,
    perf: bool,
    verbose: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let live = collector.collect_live(time::day_floor(time::now()))?;
    if live.is_empty() {
        bail!(ultragrep_engine::QueryError::NoLogs(type_name.to_string()));
    }
    if verbose {
        report::print_plan(std::slice::from_ref(&live));
    }

    let paths: Vec<PathBuf> = live.into_iter().map(|file| file.path).collect();
    let follower = LogFollower::new(engine, &paths, TailOptions::default())?;
    let mut printer =
        RequestPrinter::new(out, output_mode(engine.format(), perf))?.with_markers(false);
    let stats = follower.run(&mut printer)?;
    debug!(?stats, "stopped following");
    Ok(())
}

fn expand_home(glob: &str) -> String {
    match (glob.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).display().to_string(),
        _ => glob.to_string(),
    }
}
