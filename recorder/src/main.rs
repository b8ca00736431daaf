//! Rollcall recorder
//!
//! Replays presence events (newline-delimited JSON, from a file or stdin)
//! through the recorder into an in-memory ledger document.

use anyhow::{Context, Result};
use clap::Parser;
use rollcall_recorder::{
    metrics,
    source::ReplaySource,
    store::MemoryStore,
    Recorder, RecorderConfig, Sinks,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Records presence events into an attendance ledger", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (TOML, YAML or JSON); ROLLCALL_* variables override it
    #[arg(short, long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Replay file with one presence event per line (default: stdin)
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Print the ledger as JSON after the replay
    #[arg(long)]
    dump_ledger: bool,

    /// Print Prometheus metrics after the replay
    #[arg(long)]
    metrics: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose, args.log_json);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = runtime.block_on(record(args));
    // After an interrupt a stdin read can still hold a blocking thread
    runtime.shutdown_background();
    result
}

async fn record(args: Args) -> Result<()> {
    let config = RecorderConfig::load(args.config.as_deref())?;
    config.validate()?;
    info!(
        space_id = %config.space_id,
        store_id = %config.store_id,
        "Starting Rollcall recorder"
    );

    let store = Arc::new(MemoryStore::new(config.store_id.clone()));
    let (signals_tx, signals_rx) = mpsc::channel(config.queue_capacity);
    let source = Arc::new(ReplaySource::new(signals_tx));

    let recorder = Recorder::spawn(&config, store.clone(), source.clone(), Sinks::default())
        .context("Failed to start recorder")?;

    let cancel = recorder.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            cancel.cancel();
        }
    });

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.events {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let feeder = {
        let source = source.clone();
        let cancel = recorder.cancellation();
        tokio::spawn(async move { source.feed_until(reader, &cancel).await })
    };

    let run_result = recorder.run(signals_rx).await;
    if run_result.is_err() {
        // The feeder may be parked on stdin; nothing will read its events now
        recorder.cancel();
    }
    source.close();
    match feeder.await {
        Ok(Ok(lines)) => info!(lines, "Replay input consumed"),
        Ok(Err(e)) => error!(error = %e, "Replay input failed"),
        Err(e) => error!(error = %e, "Replay task panicked"),
    }

    let drained = recorder.shutdown().await?;
    run_result?;
    info!(
        partitions = drained.append.cursors().len(),
        "Recorder stopped"
    );

    if args.dump_ledger {
        let dump = store.dump()?;
        println!("{}", serde_json::to_string_pretty(&dump)?);
    }
    if args.metrics {
        print!("{}", metrics::encode_metrics());
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
