use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fedigate::clock::{Clock, ManualClock, SystemClock};
use fedigate::config::GateConfig;
use fedigate::ratelimit::{LimitInfo, LimitPlan, RateLimiter};
use fedigate::store::MemoryStore;

#[derive(Parser)]
#[command(name = "fedigate", version, about = "Per-actor request rate limiter")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a configuration file and print how each rule resolves
    CheckConfig {
        /// Path to the YAML configuration
        path: PathBuf,
    },
    /// Replay a sequence of calls against an in-memory store
    Simulate {
        /// Path to the YAML configuration
        #[arg(long)]
        config: PathBuf,
        /// Name of the rule to check
        #[arg(long)]
        rule: String,
        /// Actor making the calls
        #[arg(long, default_value = "simulated")]
        actor: String,
        /// Number of calls
        #[arg(long, default_value_t = 10)]
        calls: u32,
        /// Weight of each call
        #[arg(long, default_value_t = 1.0)]
        factor: f64,
        /// Simulated time between calls
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    call: u32,
    at_ms: u64,
    #[serde(flatten)]
    info: LimitInfo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::CheckConfig { path } => check_config(&path),
        Command::Simulate {
            config,
            rule,
            actor,
            calls,
            factor,
            interval_ms,
        } => simulate(&config, &rule, &actor, calls, factor, interval_ms).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = GateConfig::from_file(path)?;
    let rules = config.rule_set()?;

    info!(
        rules = rules.len(),
        disabled = config.rate_limiting.disabled,
        "Configuration is valid"
    );
    for rule in rules.iter() {
        println!("{}: {}", rule.key, LimitPlan::resolve(rule));
    }
    Ok(())
}

async fn simulate(
    path: &Path,
    rule: &str,
    actor: &str,
    calls: u32,
    factor: f64,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let config = GateConfig::from_file(path)?;
    let rules = config.rule_set()?;

    let clock = Arc::new(ManualClock::new(SystemClock.now_ms()));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let _sweeper = store.spawn_sweeper(config.rate_limiting.sweep_interval());
    let limiter = RateLimiter::from_config(store.clone(), &config.rate_limiting, rules)
        .with_clock(clock.clone());

    info!(rule = %rule, actor = %actor, calls = calls, factor = factor, "Starting simulation");

    let start = clock.now_ms();
    let mut blocked = 0u32;
    for call in 1..=calls {
        let info = limiter.limit_named(rule, actor, factor).await?;
        // Let the detached write land before the next call reads it.
        limiter.flush().await;

        if info.blocked {
            blocked += 1;
        }
        let line = SimulatedCall {
            call,
            at_ms: clock.now_ms() - start,
            info,
        };
        println!("{}", serde_json::to_string(&line)?);

        clock.advance(Duration::from_millis(interval_ms));
    }

    info!(
        calls = calls,
        blocked = blocked,
        live_counters = store.len(),
        "Simulation finished"
    );
    Ok(())
}
