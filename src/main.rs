//! health-tracker diagnostic tool.
//!
//! Loads a configuration, registers its warnables, replays its scripted
//! events against a fresh tracker and prints the resulting state.
//!
//! ```text
//!   config.toml ──▶ loader ──▶ register warnables ──▶ Tracker
//!                                                      │   ▲
//!                                     subscribe() ◀────┘   │ replay [[events]]
//!                                     (log changes)        │
//!                                                      current_state()
//!                                                      debug flags
//!                                                      metrics (optional)
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use health_tracker::config::loader::load_config;
use health_tracker::config::HealthConfig;
use health_tracker::health::{register, Tracker, Warnable};
use health_tracker::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "health-tracker")]
#[command(about = "Replay health events and print the resulting tracker state", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the state as JSON.
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the state.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HealthConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!("health-tracker v{} starting", env!("CARGO_PKG_VERSION"));

    let prometheus = if cli.metrics || config.observability.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let warnables: BTreeMap<String, Arc<Warnable>> = config
        .warnables
        .iter()
        .map(|w| (w.code.clone(), register(w.to_warnable())))
        .collect();

    tracing::info!(
        warnables = warnables.len(),
        events = config.events.len(),
        startup_grace_ms = config.tracker.startup_grace_ms,
        "Configuration loaded"
    );

    let tracker = Tracker::with_config(&config.tracker);
    let (subscription, mut changes) = tracker.subscribe();
    let logger = tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            match &change.state {
                Some(state) => tracing::info!(warnable = %change.warnable.code, text = %state.text, "unhealthy"),
                None => tracing::info!(warnable = %change.warnable.code, "healthy"),
            }
        }
    });

    for event in &config.events {
        event.apply(&tracker, &warnables);
    }

    // Closing the subscription ends the logger once it has drained.
    tracker.unregister_watcher(subscription);
    logger.await?;

    let state = tracker.current_state();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else if state.warnings.is_empty() {
        println!("healthy");
    } else {
        for warning in &state.warnings {
            println!("{}: {}", warning.warnable_code, warning.text);
        }
    }

    let mut flags = Vec::new();
    tracker.append_warnable_debug_flags(&mut flags);
    if !flags.is_empty() {
        println!("debug flags: {}", flags.join(","));
    }

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }

    Ok(())
}
