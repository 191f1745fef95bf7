use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use env_logger::{Env, Target};
use keiba_crawler::{
    CrawlerConfig, EntityKind, EntityLoader, HttpFetcher, Loader, OnError, RaceIdDiscovery,
    SchemaParser, SiteConfig, YearMonth,
};
use keiba_dataset::{
    build_dataset, clean_dataset, CleaningConfig, DatasetOptions, NetkeibaConfig,
    NetkeibaScraper, DEFAULT_HISTORY_DEPTH,
};

const DEFAULT_LOG_FILTER: &str = "keiba=info,keiba_crawler=info,keiba_dataset=info";

/// Horse racing dataset builder
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "discover")]
    Discover(DiscoverArgs),
    #[command(name = "build")]
    Build(BuildArgs),
    #[command(name = "load")]
    Load(LoadArgs),
    #[command(name = "clean")]
    Clean(CleanArgs),
    #[command(hide = true)]
    Completion,
}

#[derive(Debug, clap::Args)]
pub struct CrawlerArgs {
    /// Optional default crawler yaml configuration file
    #[arg(env = "KEIBA_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Optional site yaml configuration file, netkeiba's by default
    #[arg(env = "KEIBA_SITE_CONFIG", long)]
    pub site_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's page timeout in seconds
    #[arg(long)]
    pub ready_timeout: Option<f32>,
    /// Override crawler's fetch error handling strategy
    #[arg(value_enum, long)]
    pub on_fetch_error: Option<OnError>,
    /// Disable the delay between two requests of a worker
    #[arg(long)]
    pub no_throttle: bool,
}

impl TryFrom<&CrawlerArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlerArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(path) = &args.crawler_config {
            let file = fs_err::File::open(path)?;
            serde_yaml::from_reader(file)
                .with_context(|| format!("Invalid crawler configuration {}", path.display()))?
        } else {
            CrawlerConfig::default()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(ready_timeout) = args.ready_timeout {
            conf.ready_timeout = ready_timeout;
        }
        if let Some(on_fetch_error) = args.on_fetch_error {
            conf.on_fetch_error = on_fetch_error;
        }
        if args.no_throttle {
            conf.throttle = None;
        }
        Ok(conf)
    }
}

impl CrawlerArgs {
    fn site(&self) -> anyhow::Result<SiteConfig> {
        match &self.site_config {
            Some(path) => SiteConfig::from_path(path),
            None => SiteConfig::netkeiba(),
        }
    }
}

/// Discover the race ids run over a period of months
#[derive(Debug, clap::Args)]
pub struct DiscoverArgs {
    /// First month, as YYYY-MM
    #[arg(long)]
    pub start: YearMonth,
    /// Last month included, as YYYY-MM
    #[arg(long)]
    pub end: YearMonth,
    /// File receiving one race id per line, stdout by default
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub crawler: CrawlerArgs,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl DiscoverArgs {
    /// Logs move to stderr when race ids are written to stdout.
    fn log_target(&self) -> Target {
        match self.output {
            Some(_) => Target::Stdout,
            None => Target::Stderr,
        }
    }
}

pub fn discover(args: DiscoverArgs) -> anyhow::Result<()> {
    let crawler_conf = CrawlerConfig::try_from(&args.crawler)?;
    let site = args.crawler.site()?;
    let fetcher = HttpFetcher::new(&crawler_conf)?.with_throttle(site.race_list.throttle);
    let mut discovery = RaceIdDiscovery::new(fetcher, &site.race_list, crawler_conf.on_fetch_error)?;
    let race_ids = discovery.race_ids_in_period(args.start, args.end)?;
    log::info!(
        "Discovered {} races from {} to {}",
        race_ids.len(),
        args.start,
        args.end
    );

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(io::BufWriter::new(fs_err::File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    for race_id in race_ids {
        writeln!(out, "{race_id}")?;
    }
    out.flush()?;
    Ok(())
}

/// Build the training rows of a list of races, resuming any previous run
#[derive(Debug, clap::Args)]
pub struct BuildArgs {
    /// File listing one race id per line
    #[arg(long)]
    pub race_ids: PathBuf,
    /// Newline delimited JSON file receiving the rows
    #[arg(long, short, default_value = "race_data.jsonl")]
    pub output: PathBuf,
    /// File recording the ids of the races already processed
    #[arg(long, default_value = "processed_race_ids.txt")]
    pub progress: PathBuf,
    /// Override crawler's number of workers
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Pages the entrants are read from
    #[arg(value_enum, long, default_value_t = EntityKind::Result)]
    pub source: EntityKind,
    /// Number of past races joined to each entrant
    #[arg(long, default_value_t = DEFAULT_HISTORY_DEPTH)]
    pub history_depth: usize,
    #[command(flatten)]
    pub crawler: CrawlerArgs,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn build(args: BuildArgs) -> anyhow::Result<()> {
    let mut crawler_conf = CrawlerConfig::try_from(&args.crawler)?;
    if let Some(num_workers) = args.num_workers {
        crawler_conf.num_workers = num_workers;
    }
    let opts = DatasetOptions {
        output: args.output,
        processed: args.progress,
        num_workers: crawler_conf.num_workers,
    };
    let race_ids = read_race_ids(&args.race_ids)?;
    let site = args.crawler.site()?;
    let scraper_conf = NetkeibaConfig::new(crawler_conf, site, args.source, args.history_depth)?;

    let summary = build_dataset::<NetkeibaScraper>(&race_ids, &opts, &scraper_conf)?;
    if summary.failed > 0 {
        log::warn!(
            "{} races failed and will be retried on the next run",
            summary.failed
        );
    }
    Ok(())
}

fn read_race_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = fs_err::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Load a single entity and print its records as JSON
#[derive(Debug, clap::Args)]
pub struct LoadArgs {
    #[arg(value_enum, long)]
    pub kind: EntityKind,
    /// Race or horse id
    #[arg(long)]
    pub id: String,
    #[command(flatten)]
    pub crawler: CrawlerArgs,
}

pub fn load(args: LoadArgs) -> anyhow::Result<()> {
    let crawler_conf = CrawlerConfig::try_from(&args.crawler)?;
    let site = args.crawler.site()?;
    let parser = SchemaParser::new(&site)?;
    let fetcher = HttpFetcher::new(&crawler_conf)?.with_throttle(None);
    let mut loader = EntityLoader::new(args.kind, &site, fetcher, parser);

    let loaded = loader.load(&args.id)?;
    let json = serde_json::json!({
        "primary": loaded.primary,
        "details": loaded.details,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Turn the rows built into a cleaned CSV file
#[derive(Debug, clap::Args)]
pub struct CleanArgs {
    /// Newline delimited JSON rows
    #[arg(long, short, default_value = "race_data.jsonl")]
    pub input: PathBuf,
    /// CSV file to write
    #[arg(long, short)]
    pub output: PathBuf,
    /// Optional yaml file listing the columns of each cleaning rule
    #[arg(long)]
    pub cleaning_config: Option<PathBuf>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn clean(args: CleanArgs) -> anyhow::Result<()> {
    let config = match &args.cleaning_config {
        Some(path) => CleaningConfig::from_path(path)?,
        None => CleaningConfig::default(),
    };
    clean_dataset(&args.input, &args.output, &config)?;
    Ok(())
}

fn init_logger(quiet: bool, target: Target) {
    if !quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_LOG_FILTER))
            .target(target)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Discover(args) => {
            init_logger(args.quiet, args.log_target());
            discover(args)
        }
        SubCommand::Build(args) => {
            init_logger(args.quiet, Target::Stdout);
            build(args)
        }
        SubCommand::Load(args) => {
            env_logger::Builder::from_env(Env::default().default_filter_or("keiba_crawler=warn"))
                .target(Target::Stderr)
                .init();
            load(args)
        }
        SubCommand::Clean(args) => {
            init_logger(args.quiet, Target::Stdout);
            clean(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "keiba", &mut io::stdout());
            Ok(())
        }
    }
}
