//! CSI Stream - Main Entry Point

use clap::Parser;
use csi_stream::{init_logging, install_metrics, load_config, run_until_shutdown, BackendChoice, RunOptions};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "csi-stream", version, about = "Capture frames from a CSI camera and report FPS")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use synthetic frames instead of the camera
    #[arg(long)]
    mock: bool,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Log the per-second FPS labels
    #[arg(long)]
    monitor_fps: bool,

    /// Seconds to let the sensor settle before reading
    #[arg(long, default_value_t = 0.0)]
    warmup_secs: f64,

    /// Custom pipeline descriptor, replaces the generated one
    #[arg(long)]
    pipeline: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the run summary as JSON on exit
    #[arg(long)]
    json_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    info!("=== CSI Stream v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(cli.config.as_deref())?;
    if cli.pipeline.is_some() {
        config.pipeline = cli.pipeline;
    }

    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr)?;
    }

    let backend = if cli.mock {
        BackendChoice::Mock
    } else {
        BackendChoice::GStreamer
    };
    let options = RunOptions {
        monitor_fps: cli.monitor_fps,
        max_frames: cli.frames,
        warmup: Duration::try_from_secs_f64(cli.warmup_secs)?,
    };

    let summary = run_until_shutdown(config, backend, options).await?;
    info!(
        "Displayed {} frames ({} dropped) in {} ms",
        summary.frames_displayed, summary.frames_dropped, summary.elapsed_ms
    );

    if cli.json_summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if summary.connection_lost {
        anyhow::bail!("camera connection lost");
    }
    Ok(())
}
