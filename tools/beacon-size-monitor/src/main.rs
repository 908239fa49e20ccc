//! Beacon Size Monitor
//!
//! Polls the block size API, normalizes what comes back and prints a
//! plain-text (or JSON) report after every poll. Falls back to synthetic
//! data when the API is unreachable.
//!
//! Commands read from stdin while running:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `r` | refresh now |
//! | `a` | toggle auto refresh |
//! | `range <start> <end>` | select a slot window |
//! | `last <n>` | window of the last n slots |
//! | `reset` | close the circuit breaker |
//! | `q` | quit |

mod logging;
mod report;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use beacon_size_engine::{
    last_n_blocks, parse_range, BlockSizeApi, CircuitBreaker, Dashboard, DashboardSnapshot,
    DeterministicSynthetic, EngineConfig, HttpBeaconSizeSource, PollingScheduler, RangeModel,
    ResilientFetchClient, SlotRange, SyntheticDataProvider,
};

/// Default window when neither `--start/--end` nor `--last` is given.
const DEFAULT_LAST_SLOTS: u64 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Beacon Size Monitor: block size and blob fee report
#[derive(Parser, Debug)]
#[command(name = "beacon-size-monitor")]
#[command(about = "Monitor beacon block sizes and blob fees")]
struct Args {
    /// Size API base URL
    #[arg(short, long, env = "BEACON_SIZE_API_URL")]
    endpoint: Option<String>,

    /// First slot of the window
    #[arg(long, requires = "end", conflicts_with = "last")]
    start: Option<String>,

    /// Last slot of the window
    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Show the last N slots up to the chain head
    #[arg(short, long)]
    last: Option<u64>,

    /// Refresh interval in seconds
    #[arg(short, long)]
    refresh: Option<u64>,

    /// Start with auto refresh off
    #[arg(long)]
    no_auto_refresh: bool,

    /// Use synthetic data only (no API connection required)
    #[arg(long)]
    mock: bool,

    /// Dashboard URL; `?mock=true` turns on synthetic data
    #[arg(long)]
    launch_url: Option<String>,

    /// Fetch once, print the report and exit
    #[arg(long)]
    once: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long, env = "BEACON_SIZE_JSON_LOGS")]
    json_logs: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level, args.json_logs)?;

    let config = build_config(&args)?;
    info!(
        endpoint = %config.api_base_url,
        synthetic = config.force_synthetic,
        interval_secs = config.poll_interval_secs,
        "Starting beacon size monitor"
    );

    let breaker = CircuitBreaker::with_threshold(config.failure_threshold);
    breaker.force_synthetic(config.force_synthetic);
    let source = Arc::new(
        HttpBeaconSizeSource::new(config.api_base_url.clone())
            .context("failed to create API client")?,
    );
    let client = ResilientFetchClient::with_breaker(
        source,
        DeterministicSynthetic::new(config.synthetic_seed),
        breaker.clone(),
        &config,
    );

    let initial = initial_range(&args, &client, &config).await?;
    let range = RangeModel::new(initial, config.max_slot_span);
    let api: Arc<dyn BlockSizeApi> = Arc::new(client);

    let (auto_tx, auto_rx) = watch::channel(!args.no_auto_refresh);
    let scheduler = PollingScheduler::new(config.poll_interval(), auto_rx);
    let dashboard =
        Arc::new(Dashboard::new(api, breaker, range).with_countdown(scheduler.countdown()));

    if args.once {
        dashboard.refresh(false).await;
        print_snapshot(&dashboard.snapshot(), args.format)?;
        return Ok(());
    }

    if args.no_auto_refresh {
        dashboard.refresh(false).await;
        print_snapshot(&dashboard.snapshot(), args.format)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut polls = scheduler.subscribe_polls();
    let scheduler_task = tokio::spawn(scheduler.run(dashboard.clone(), shutdown_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = polls.changed() => {
                if changed.is_err() {
                    break;
                }
                print_snapshot(&dashboard.snapshot(), args.format)?;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("failed to read stdin")? else {
                    stdin_open = false;
                    continue;
                };
                match run_command(line.trim(), &dashboard, &auto_tx).await {
                    CommandOutcome::Quit => break,
                    CommandOutcome::Print => print_snapshot(&dashboard.snapshot(), args.format)?,
                    CommandOutcome::Nothing => {}
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    scheduler_task.await.context("scheduler task panicked")?;
    Ok(())
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env();
    if let Some(endpoint) = &args.endpoint {
        config.api_base_url = endpoint.clone();
    }
    if let Some(refresh) = args.refresh {
        config.poll_interval_secs = refresh;
    }
    config.force_synthetic |= args.mock;
    if let Some(url) = &args.launch_url {
        config = config.with_launch_url(url)?;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Window from `--start/--end`, or the last N slots up to the head.
async fn initial_range(
    args: &Args,
    client: &ResilientFetchClient<HttpBeaconSizeSource, DeterministicSynthetic>,
    config: &EngineConfig,
) -> Result<SlotRange> {
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        return parse_range(start, end, config.max_slot_span).context("invalid slot window");
    }

    let head = match client.latest_block().await {
        Ok(latest) => latest.data.slot,
        Err(e) => {
            warn!(error = %e, "Latest block unavailable, using synthetic head");
            client.synthetic().head_slot()
        }
    };
    let count = args.last.unwrap_or(DEFAULT_LAST_SLOTS);
    Ok(last_n_blocks(head, count, config.max_slot_span))
}

enum CommandOutcome {
    Quit,
    Print,
    Nothing,
}

async fn run_command(
    line: &str,
    dashboard: &Dashboard,
    auto_refresh: &watch::Sender<bool>,
) -> CommandOutcome {
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (None, _, _) => CommandOutcome::Nothing,
        (Some("q" | "quit"), _, _) => CommandOutcome::Quit,
        (Some("r" | "refresh"), _, _) => {
            dashboard.refresh(true).await;
            CommandOutcome::Print
        }
        (Some("a" | "auto"), _, _) => {
            auto_refresh.send_modify(|on| *on = !*on);
            info!(enabled = *auto_refresh.borrow(), "Auto refresh toggled");
            CommandOutcome::Nothing
        }
        (Some("reset"), _, _) => {
            dashboard.reset_circuit();
            CommandOutcome::Print
        }
        (Some("range"), Some(start), Some(end)) => match dashboard.select_range(start, end) {
            Ok(_) => {
                dashboard.refresh_range().await;
                CommandOutcome::Print
            }
            Err(e) => {
                eprintln!("{} field: {}", e.field(), e);
                CommandOutcome::Nothing
            }
        },
        (Some("last"), Some(count), _) => {
            let Ok(count) = count.parse::<u64>() else {
                eprintln!("last: expected a slot count, got {:?}", count);
                return CommandOutcome::Nothing;
            };
            if dashboard.select_last(count).is_none() {
                eprintln!("latest slot not known yet");
                return CommandOutcome::Nothing;
            }
            dashboard.refresh_range().await;
            CommandOutcome::Print
        }
        _ => {
            eprintln!("commands: r | a | range <start> <end> | last <n> | reset | q");
            CommandOutcome::Nothing
        }
    }
}

fn print_snapshot(snapshot: &DashboardSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report::render(snapshot)),
        OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_window_flags_go_together() {
        assert!(Args::try_parse_from(["beacon-size-monitor", "--start", "10"]).is_err());
        assert!(Args::try_parse_from([
            "beacon-size-monitor",
            "--start",
            "10",
            "--end",
            "20",
            "--last",
            "5"
        ])
        .is_err());

        let args =
            Args::try_parse_from(["beacon-size-monitor", "--start", "10", "--end", "20"]).unwrap();
        assert_eq!(args.start.as_deref(), Some("10"));
        assert_eq!(args.format, OutputFormat::Text);
    }

    #[test]
    fn test_mock_flags_force_synthetic() {
        let args = Args::try_parse_from([
            "beacon-size-monitor",
            "--endpoint",
            "http://127.0.0.1:5000/api",
            "--launch-url",
            "http://localhost:3000/?mock=true",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();
        assert!(config.force_synthetic);
        assert_eq!(config.api_base_url, "http://127.0.0.1:5000/api");
    }

    #[test]
    fn test_zero_refresh_is_rejected() {
        let args = Args::try_parse_from([
            "beacon-size-monitor",
            "--endpoint",
            "http://127.0.0.1:5000/api",
            "--refresh",
            "0",
        ])
        .unwrap();
        assert!(build_config(&args).is_err());
    }
}
