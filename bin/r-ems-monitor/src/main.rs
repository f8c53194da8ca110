//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the R-EMS data response monitor."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use r_ems_common::config::MonitorConfig;
use r_ems_common::logging::{init_tracing, LogFormat};
use r_ems_logging::{log_system_event, SystemEventOutcome};
use r_ems_metrics::{new_registry, write_text_file, ExchangeMetrics};
use r_ems_sim::{
    Device, ExchangeTiming, FaultSource, RandomFaults, ReplayLibrary, ReplaySource,
    SimulationController, TracingSink,
};
use tokio::signal;
use tracing::{info, warn};

mod console;

use console::{render_summary, FollowSink};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "R-EMS data response monitor",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override the configured log format")]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Json => LogFormat::StructuredJson,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulated exchange until completion or Ctrl-C")]
    Run(RunArgs),
    #[command(about = "Validate configuration and replay files without running")]
    Check,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[arg(
        long,
        value_name = "DEVICE",
        default_value = "inverter",
        value_parser = parse_device,
        help = "Device whose exchange log is printed (inverter, bms, sensor)"
    )]
    follow: Device,

    #[arg(long, help = "Do not print any device log")]
    quiet: bool,

    #[arg(long, value_name = "N", help = "Seed for drop plans and response delays")]
    seed: Option<u64>,

    #[arg(long, value_name = "FILE", help = "Write the final summary as JSON")]
    summary_json: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Write Prometheus text metrics on exit")]
    metrics_out: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            follow: Device::Inverter,
            quiet: false,
            seed: None,
            summary_json: None,
            metrics_out: None,
        }
    }
}

fn parse_device(raw: &str) -> Result<Device, r_ems_sim::ExchangeError> {
    Device::parse(raw)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/monitor.toml"));
    candidates.push(PathBuf::from("configs/monitor.example.toml"));

    let loaded = MonitorConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    init_tracing("r-ems-monitor", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_monitor(config, args).await?,
        Commands::Check => check_config(&config)?,
    }
    Ok(())
}

fn load_replay(config: &MonitorConfig) -> Result<ReplayLibrary> {
    let files = config.replay.resolved_files();
    ReplayLibrary::from_files(&files).context("failed to load replay files")
}

fn check_config(config: &MonitorConfig) -> Result<()> {
    let timing = ExchangeTiming::try_from(&config.simulation)?;
    let replay = load_replay(config)?;
    println!(
        "timing: cycle {:?}, response delay {:?}..{:?}, {} cycles",
        timing.cycle_interval,
        timing.response_delay_min,
        timing.response_delay_max,
        timing.max_cycles
    );
    for device in Device::ALL {
        let lines = replay.len(device);
        println!("{:<10} {:>6} lines", device.label(), lines);
        if lines == 0 {
            warn!(device = %device, "no replay data; device will not run");
        }
    }
    Ok(())
}

async fn run_monitor(config: MonitorConfig, args: RunArgs) -> Result<()> {
    let timing = ExchangeTiming::try_from(&config.simulation)?;
    let replay = Arc::new(load_replay(&config)?);

    let faults: Arc<dyn FaultSource> = match args.seed.or(config.simulation.random_seed) {
        Some(seed) => {
            info!(seed, "using seeded fault source");
            Arc::new(RandomFaults::seeded(seed))
        }
        None => Arc::new(RandomFaults::new()),
    };

    let registry = new_registry();
    let metrics = ExchangeMetrics::new(registry.clone())?;

    let mut builder = SimulationController::builder(replay)
        .timing(timing)
        .faults(faults)
        .sink(Arc::new(TracingSink))
        .sink(Arc::new(metrics));
    if !args.quiet {
        builder = builder.sink(Arc::new(FollowSink::stdout(args.follow)));
    }
    let controller = builder.build()?;

    controller.start();
    tokio::select! {
        _ = controller.wait_until_stopped() => {
            info!("run finished");
        }
        result = signal::ctrl_c() => match result {
            Ok(()) => {
                info!("ctrl-c received; stopping");
                controller.stop();
            }
            Err(err) => {
                log_system_event(
                    None,
                    "monitor.signal",
                    &format!("ctrl-c listener unavailable ({err}); waiting for completion"),
                    SystemEventOutcome::Fault,
                );
                controller.wait_until_stopped().await;
            }
        },
    }

    let summary = controller.summary();
    print!("{}", render_summary(&summary));

    if let Some(path) = &args.summary_json {
        let body = serde_json::to_string_pretty(&summary)?;
        fs::write(path, body)
            .with_context(|| format!("failed to write summary {}", path.display()))?;
        log_system_event(
            None,
            "monitor.summary",
            &format!("summary written to {}", path.display()),
            SystemEventOutcome::Success,
        );
    }
    if let Some(path) = &args.metrics_out {
        write_text_file(&registry, path)?;
        log_system_event(
            None,
            "monitor.metrics",
            &format!("metrics written to {}", path.display()),
            SystemEventOutcome::Success,
        );
    }
    Ok(())
}
