use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use lan_pulse_rs::config::Config;
use lan_pulse_rs::cycle::JsonCycleStore;
use lan_pulse_rs::prober::PingProber;
use lan_pulse_rs::scheduler::{ScanScheduler, SchedulerConfig, TickOutcome};
use lan_pulse_rs::store::JsonRecordStore;
use lan_pulse_rs::types::ProbeOutcome;
use lan_pulse_rs::{addrparse, logging, netdetect, server};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// lan-pulse-rs: scheduled ICMP liveness and latency tracking for LAN hosts.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-pulse-rs",
    version,
    about = "Scheduled ICMP liveness and latency tracking for LAN hosts.",
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file. Created with defaults if it does not exist.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the record and cycle state files.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Listen address for the admin API.
    #[arg(long)]
    bind: Option<String>,

    /// Seconds between scan cycles.
    #[arg(long = "interval-secs")]
    interval_secs: Option<u64>,

    /// Max concurrent probes.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe timeout in milliseconds.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Register addresses, e.g. `192.168.1.xxx`, `10.0.0.1-50` or `1-10,20`.
    #[arg(long)]
    add: Option<String>,

    /// Prefix for bare last-octet input. Defaults to the local /24.
    #[arg(long)]
    prefix: Option<String>,

    /// Notes attached to newly registered addresses.
    #[arg(long)]
    notes: Option<String>,

    /// Run one full scan cycle now and print the results.
    #[arg(long = "scan-once", default_value_t = false)]
    scan_once: bool,

    /// Write the scan results as pretty JSON to this path (with --scan-once).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run the scan scheduler and the admin API until Ctrl+C.
    #[arg(long, default_value_t = false)]
    serve: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(v) = &self.data_dir {
            cfg.data_dir = v.clone();
        }
        if let Some(v) = &self.bind {
            cfg.bind = v.clone();
        }
        if let Some(v) = self.interval_secs {
            cfg.cycle_interval_secs = v;
        }
        if let Some(v) = self.concurrency {
            cfg.max_concurrency = v;
        }
        if let Some(v) = self.timeout_ms {
            cfg.probe_timeout_ms = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let mut cfg = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut cfg);
    cfg.validate().context("invalid configuration")?;
    print!("{cfg}");

    let records = Arc::new(
        JsonRecordStore::open(cfg.records_path())
            .await
            .context("failed to open record store")?,
    );
    let cycles = Arc::new(JsonCycleStore::open(cfg.cycle_path()));
    let prober = Arc::new(PingProber::new(cfg.probe_timeout()));
    let scheduler = Arc::new(ScanScheduler::new(
        SchedulerConfig::from(&cfg),
        records,
        cycles,
        prober,
    ));

    if let Some(input) = cli.add.as_deref() {
        let prefix = cli.prefix.clone().or_else(netdetect::default_prefix);
        if let Some(p) = &prefix {
            println!("  default prefix        : {p}");
        }
        let addresses =
            addrparse::validated_addresses(input, prefix.as_deref(), cfg.max_addresses_per_request)?;
        let all = scheduler
            .records()
            .upsert_many(&addresses, cli.notes.as_deref())
            .await?;
        println!(
            "Registered {} address(es); {} tracked in total",
            addresses.len(),
            all.len()
        );
    }

    if cli.scan_once {
        match scheduler.run_now().await? {
            TickOutcome::Completed(report) => {
                print_results_table(&report.outcomes);
                if let Some(path) = cli.output.as_deref() {
                    if let Err(e) = write_results_json(path, &report.outcomes) {
                        eprintln!("Failed to write JSON to {}: {}", path.display(), e);
                    } else {
                        println!("Wrote JSON results to {}", path.display());
                    }
                }
            }
            TickOutcome::SkippedEmpty => println!("No addresses registered; nothing to scan."),
            other => bail!("unexpected scan result: {other:?}"),
        }
    }

    if cli.serve {
        let cancel = CancellationToken::new();

        let loop_scheduler = scheduler.clone();
        let loop_cancel = cancel.clone();
        let scheduler_task = tokio::spawn(async move { loop_scheduler.run(loop_cancel).await });

        let bind = cfg.bind.clone();
        let api_scheduler = scheduler.clone();
        let api_cancel = cancel.clone();
        let server_task = tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, api_scheduler, api_cancel).await {
                error!(error = %e, "admin API server error");
            }
        });

        println!("Press Ctrl+C to stop...");
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down; waiting for any running cycle to finish");
        cancel.cancel();
        let _ = scheduler_task.await;
        let _ = server_task.await;
    }

    Ok(())
}

fn print_results_table(outcomes: &[ProbeOutcome]) {
    let ip_w = outcomes
        .iter()
        .map(|o| o.address.len())
        .max()
        .unwrap_or(0)
        .max("ip".len());
    let status_w = "offline".len();
    let lat_w = "latency_ms".len();
    let online = outcomes.iter().filter(|o| o.is_online()).count();

    println!(
        "\nOnline: {} / {} (offline: {})",
        online,
        outcomes.len(),
        outcomes.len() - online
    );
    println!(
        "{:<ip_w$}  {:<status_w$}  {:>lat_w$}",
        "ip",
        "status",
        "latency_ms",
        ip_w = ip_w,
        status_w = status_w,
        lat_w = lat_w
    );
    println!(
        "{:-<ip_w$}  {:-<status_w$}  {:-<lat_w$}",
        "",
        "",
        "",
        ip_w = ip_w,
        status_w = status_w,
        lat_w = lat_w
    );
    for o in outcomes {
        let status = if o.is_online() { "online" } else { "offline" };
        let latency = o.latency_ms.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<ip_w$}  {:<status_w$}  {:>lat_w$}",
            o.address,
            status,
            latency,
            ip_w = ip_w,
            status_w = status_w,
            lat_w = lat_w
        );
    }
}

fn write_results_json(path: &std::path::Path, outcomes: &[ProbeOutcome]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, outcomes)?;
    Ok(())
}
