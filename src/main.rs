use clap::{Parser, Subcommand};
use proxyfleet::pipeline::{build_source, run_fleet, Fleet};
use proxyfleet::providers::file::FileProvider;
use proxyfleet::status::LogSink;
use proxyfleet::{
    DryRunExecutor, EndpointSource, EndpointStore, HttpProber, Settings, StatusAggregator,
    StatusReporter, Vetter,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "proxyfleet", version, about = "Vet proxies and run a staggered worker fleet through them")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "PROXYFLEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape candidate proxies and save them to the raw list
    Scrape,
    /// Vet a list of candidates and save the working ones
    Vet {
        /// Candidate list (defaults to the raw list path)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Time budget in seconds
        #[arg(long)]
        time_limit: Option<u64>,
    },
    /// Prepare proxies and run the worker fleet (default)
    Run {
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        cycles: Option<usize>,
    },
}

fn init_logging() {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|l| l.parse().ok())
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("proxyfleet", level)
        .parse_default_env()
        .init();
}

fn vetter(settings: &Settings, shutdown: CancellationToken) -> Vetter {
    let prober = HttpProber::new(settings.vetting.probe_url.clone(), settings.probe_timeout())
        .allow_private(settings.vetting.allow_private);
    Vetter::new(Arc::new(prober))
        .with_concurrency(settings.vetting.concurrency)
        .with_probe_timeout(settings.probe_timeout())
        .with_shutdown(shutdown)
}

fn spawn_interrupt_handler(shutdown: CancellationToken, status: Arc<StatusAggregator>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, letting running cycles finish");
            status.request_shutdown();
            shutdown.cancel();
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let shutdown = CancellationToken::new();
    let status = Arc::new(StatusAggregator::new());
    spawn_interrupt_handler(shutdown.clone(), status.clone());

    let store = EndpointStore::new(&settings.storage.verified_path);

    match cli.command.unwrap_or(Command::Run {
        workers: None,
        cycles: None,
    }) {
        Command::Scrape => {
            let mut source = build_source(&settings)?;
            let proxies = source.scrape_all_sources().await;
            if proxies.is_empty() {
                log::error!("failed to find any proxies");
            } else {
                source.save_to_file(&settings.storage.raw_path).await?;
            }
        }
        Command::Vet { input, time_limit } => {
            let input = input.unwrap_or_else(|| settings.storage.raw_path.clone());
            let mut source = EndpointSource::with_client(reqwest::Client::new());
            source.add_provider(FileProvider::new(input));
            let candidates = source.scrape_all_sources().await;
            if candidates.is_empty() {
                log::error!("no proxies found to test");
                return Ok(());
            }
            let budget = time_limit.map(Duration::from_secs).unwrap_or(settings.time_budget());
            let (report, _) = vetter(&settings, shutdown)
                .vet_and_persist(&candidates, budget, &store)
                .await?;
            for endpoint in report.verified.top(10) {
                println!("{}", endpoint);
            }
        }
        Command::Run { workers, cycles } => {
            let settings = settings.with_fleet_size(workers, cycles)?;
            let (workers, cycles) = (settings.num_workers, settings.cycles_per_worker);
            let mut fleet = Fleet {
                source: build_source(&settings)?,
                vetter: vetter(&settings, shutdown.clone()),
                store,
                executor: Arc::new(DryRunExecutor::new(settings.cycle_duration())),
                status,
                reporter: StatusReporter::from_interval(Arc::new(LogSink), settings.status_interval()),
                shutdown,
            };
            let summary = run_fleet(&settings, &mut fleet, workers, cycles).await?;
            println!(
                "{} workers, {} cycles completed, {} failed{}",
                summary.launched,
                summary.completed_cycles,
                summary.failed_cycles,
                if summary.drained { " (interrupted)" } else { "" }
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
