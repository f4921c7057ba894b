//! GreenArb - Dual-Revenue Admission Gate
//! Mission: every watt either earns spread or earns carbon credit
//!
//! `greenarb run` drives the gate loop against the JSON feed drops.
//! `greenarb summary` prints the session ESG impact from the audit ledger.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use greenarb_gate::actuator::LoggingActuator;
use greenarb_gate::ledger::{read_tail, LedgerSummary};
use greenarb_gate::stats::GateStats;
use greenarb_gate::{Gate, GateConfig};

#[derive(Parser, Debug)]
#[command(name = "greenarb")]
#[command(about = "Carbon-aware arbitrage admission gate")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "GREENARB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gate loop until Ctrl-C or a ledger failure
    Run {
        /// Hardware telemetry JSON drop
        #[arg(long)]
        telemetry: Option<PathBuf>,

        /// Market quote JSON drop
        #[arg(long)]
        market: Option<PathBuf>,

        /// Audit ledger CSV (truncated on start)
        #[arg(long)]
        ledger: Option<PathBuf>,

        #[arg(long)]
        tick_ms: Option<u64>,

        /// Seed for the surge draw
        #[arg(long)]
        seed: Option<u64>,

        /// Emit JSON log lines
        #[arg(long)]
        json: bool,
    },

    /// Summarize the last N ledger rows
    Summary {
        #[arg(long)]
        ledger: Option<PathBuf>,

        #[arg(long, default_value = "50")]
        last: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let cli = Cli::parse();

    let mut config = GateConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            telemetry,
            market,
            ledger,
            tick_ms,
            seed,
            json,
        } => {
            init_tracing(json);

            if let Some(p) = telemetry {
                config.telemetry_path = p;
            }
            if let Some(p) = market {
                config.market_feed_path = p;
            }
            if let Some(p) = ledger {
                config.ledger_path = p;
            }
            if let Some(ms) = tick_ms {
                config.tick_ms = ms;
            }
            if seed.is_some() {
                config.surge_seed = seed;
            }

            run_gate(config).await
        }
        Commands::Summary { ledger, last } => {
            init_tracing(false);
            let path = ledger.unwrap_or(config.ledger_path);
            print_summary(&path, last);
            Ok(())
        }
    }
}

async fn run_gate(config: GateConfig) -> Result<()> {
    info!(
        telemetry = %config.telemetry_path.display(),
        market = %config.market_feed_path.display(),
        ledger = %config.ledger_path.display(),
        tick_ms = config.tick_ms,
        seeded = config.surge_seed.is_some(),
        "🌱 GreenArb gate starting"
    );

    let gate = Gate::from_config(&config, Arc::new(LoggingActuator::new("gpu0")))
        .context("Failed to start gate")?;

    let stats = gate.stats();
    let ledger = gate.ledger();
    let stats_task = tokio::spawn(log_stats(
        stats.clone(),
        Duration::from_secs(config.stats_interval_secs),
    ));

    let outcome = tokio::select! {
        res = gate.run() => res.context("Gate loop stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl-C received, shutting down");
            Ok(())
        }
    };

    stats_task.abort();
    let snapshot = stats.snapshot();
    let ledger = ledger.lock();
    info!(
        cycles = snapshot.cycles,
        decided = snapshot.decided,
        executed = snapshot.executed,
        throttled = snapshot.throttled,
        skipped = snapshot.skipped(),
        rows = ledger.rows_written(),
        ledger = %ledger.path().display(),
        "📒 Gate session closed"
    );
    drop(ledger);

    outcome
}

async fn log_stats(stats: Arc<GateStats>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let s = stats.snapshot();
        if s.actuation_failures > 0 {
            warn!(failures = s.actuation_failures, "⚠️ Actuation failures this session");
        }
        info!(
            cycles = s.cycles,
            decided = s.decided,
            executed = s.executed,
            throttled = s.throttled,
            skipped_hardware = s.skipped_hardware,
            skipped_market = s.skipped_market,
            "📊 Gate stats"
        );
    }
}

fn print_summary(path: &Path, last: usize) {
    let records = read_tail(path, last);
    let s = LedgerSummary::from_records(&records);

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║                GREENARB SESSION ESG IMPACT                     ║");
    println!("╚════════════════════════════════════════════════════════════════╝");
    println!("  Ledger:             {}", path.display());
    println!("  Rows (last {}):     {}", last, s.rows);

    if s.rows == 0 {
        println!("\n  No decisions recorded yet.");
        return;
    }

    println!("  Executed:           {}", s.executed);
    println!("  Throttled:          {}", s.throttled);
    println!("  Saved watts:        {:.1} W", s.total_saved_watts);
    println!("  CO2 avoided:        {:.3} kg", s.co2_avoided_kg);
    println!("  Realized profit:    {:.2}", s.total_realized_profit);
    println!("  Carbon tax paid:    {:.2}", s.total_carbon_tax);
    println!("  Carbon credit:      {:.2}", s.total_carbon_credit);
    println!("  Mean green alpha:   {:.1}", s.mean_green_alpha);

    if let Some(latest) = &s.latest {
        println!(
            "\n  Latest: {} {} @ {:.0} W, spread {:.2}, energy {:.2}",
            latest.time_str,
            latest.action,
            latest.power_watts,
            latest.net_spread,
            latest.energy_cost
        );
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "greenarb_gate=info,greenarb=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
