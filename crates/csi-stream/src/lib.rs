//! CSI Stream Runner
//!
//! Loads the stream configuration, opens the camera, and plays the part of
//! the display consumer: reads frames, marks them displayed and reports the
//! per-second FPS labels.

use anyhow::Context;
use camera_capture::overlay::read_with_labels;
use camera_capture::{CameraError, CaptureBackend, MockBackend, StreamConfig, VideoStream};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment prefix for configuration overrides (`CSI_STREAM__ROTATION=180`)
pub const ENV_PREFIX: &str = "CSI_STREAM";

/// How long a single consumer wait lasts before re-checking for shutdown
const READ_POLL: Duration = Duration::from_millis(500);

/// Which capture backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    /// Synthetic frames, no hardware
    Mock,
    /// GStreamer appsink (needs the `gstreamer` feature)
    GStreamer,
}

/// Consumer loop settings
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Log the FPS labels once per statistics interval
    pub monitor_fps: bool,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
    /// Let the sensor settle before reading
    pub warmup: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            monitor_fps: false,
            max_frames: None,
            warmup: Duration::ZERO,
        }
    }
}

/// What happened during a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub frames_displayed: u64,
    pub frames_dropped: u64,
    pub last_frames_read_per_second: u64,
    pub last_frames_displayed_per_second: u64,
    pub reported_fps: Option<f64>,
    pub connection_lost: bool,
    pub elapsed_ms: u64,
}

/// Initialize logging
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

/// Load configuration: defaults, then an optional file, then the environment
pub fn load_config(path: Option<&Path>) -> anyhow::Result<StreamConfig> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&StreamConfig::default())?);

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to load configuration")?
        .try_deserialize::<StreamConfig>()
        .context("Invalid configuration")?;

    // Surface bad rotation / sensor mode before any device is touched
    config.descriptor()?;
    Ok(config)
}

/// Install the Prometheus exporter (must run inside a tokio runtime)
pub fn install_metrics(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}

/// Open the chosen backend and run the consumer loop to completion
pub fn run(
    config: &StreamConfig,
    backend: BackendChoice,
    options: &RunOptions,
    shutdown: &AtomicBool,
) -> anyhow::Result<RunSummary> {
    match backend {
        BackendChoice::Mock => {
            let fps = config
                .profile()
                .map(|profile| f64::from(profile.framerate()))
                .unwrap_or(30.0);
            let mock = MockBackend::synthetic(config.display_width, config.display_height, fps);
            run_stream(config.build_stream(mock)?, options, shutdown)
        }
        #[cfg(feature = "gstreamer")]
        BackendChoice::GStreamer => {
            let gst = camera_capture::gst::GstBackend::new()?;
            run_stream(config.build_stream(gst)?, options, shutdown)
        }
        #[cfg(not(feature = "gstreamer"))]
        BackendChoice::GStreamer => {
            anyhow::bail!("built without GStreamer support; rebuild with `--features gstreamer` or pass --mock")
        }
    }
}

/// Run on a blocking thread until done or Ctrl-C
pub async fn run_until_shutdown(
    config: StreamConfig,
    backend: BackendChoice,
    options: RunOptions,
) -> anyhow::Result<RunSummary> {
    let shutdown = Arc::new(AtomicBool::new(false));

    let signal = shutdown.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal.store(true, Ordering::SeqCst);
        }
    });

    let worker = shutdown.clone();
    let summary =
        tokio::task::spawn_blocking(move || run(&config, backend, &options, &worker)).await?;

    ctrl_c.abort();
    summary
}

/// Start `stream`, consume frames, and stop it on every exit path
pub fn run_stream<B: CaptureBackend>(
    mut stream: VideoStream<B>,
    options: &RunOptions,
    shutdown: &AtomicBool,
) -> anyhow::Result<RunSummary> {
    let started = Instant::now();
    stream.start()?;
    stream.start_counting_fps()?;

    let reported_fps = match stream.fps() {
        Ok(fps) => {
            info!("Camera reports {:.1} fps", fps);
            Some(fps)
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    if !options.warmup.is_zero() {
        info!("Warming up for {:?}", options.warmup);
        std::thread::sleep(options.warmup);
    }

    let mut frames: u64 = 0;
    let mut connection_lost = false;
    let mut last_report = Instant::now();

    while !shutdown.load(Ordering::SeqCst) && options.max_frames.map_or(true, |max| frames < max) {
        let labels = match read_with_labels(&stream, options.monitor_fps, READ_POLL) {
            Ok(Some((_frame, labels))) => {
                frames += 1;
                stream.mark_displayed();
                labels
            }
            Ok(None) => continue,
            Err(CameraError::ConnectionLost) => {
                warn!("Camera connection lost after {} frames", frames);
                connection_lost = true;
                break;
            }
            Err(e) => return Err(e.into()),
        };

        // Labels ride along with every frame; log them once per second
        if !labels.is_empty() && last_report.elapsed() >= Duration::from_secs(1) {
            for label in &labels {
                info!(x = label.position.0, y = label.position.1, "{}", label.text);
            }
            last_report = Instant::now();
        }
    }

    let last_stats = stream.last_stats();
    stream.release_fps_stats()?;
    let frames_dropped = stream.frames_dropped();
    stream.stop();

    Ok(RunSummary {
        frames_displayed: frames,
        frames_dropped,
        last_frames_read_per_second: last_stats.frames_read,
        last_frames_displayed_per_second: last_stats.frames_displayed,
        reported_fps,
        connection_lost,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::StreamOptions;
    use std::io::Write;

    fn mock_stream(fail_after: Option<u64>) -> VideoStream<MockBackend> {
        let mut backend = MockBackend::synthetic(4, 4, 200.0);
        if let Some(frames) = fail_after {
            backend = backend.fail_after(frames);
        }
        let mut stream =
            VideoStream::from_descriptor("mock", camera_capture::CaptureApi::Any, backend);
        stream
            .configure(StreamOptions {
                stats_interval: Duration::from_millis(50),
                ..Default::default()
            })
            .unwrap();
        stream
    }

    #[test]
    fn test_run_stops_after_max_frames() {
        let options = RunOptions {
            max_frames: Some(10),
            monitor_fps: true,
            ..Default::default()
        };
        let summary = run_stream(mock_stream(None), &options, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.frames_displayed, 10);
        assert_eq!(summary.reported_fps, Some(200.0));
        assert!(!summary.connection_lost);
    }

    #[test]
    fn test_monitored_run_reports_last_interval() {
        // 200 fps for a bit over a second, so at least one label report fires
        let options = RunOptions {
            max_frames: Some(260),
            monitor_fps: true,
            ..Default::default()
        };
        let summary = run_stream(mock_stream(None), &options, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.frames_displayed, 260);
        assert!(summary.last_frames_read_per_second > 0);
        assert!(summary.last_frames_displayed_per_second > 0);
    }

    #[test]
    fn test_run_reports_connection_loss() {
        let summary =
            run_stream(mock_stream(Some(5)), &RunOptions::default(), &AtomicBool::new(false))
                .unwrap();

        assert!(summary.connection_lost);
        assert!(summary.frames_displayed <= 5);
    }

    #[test]
    fn test_shutdown_flag_ends_run() {
        let summary =
            run_stream(mock_stream(None), &RunOptions::default(), &AtomicBool::new(true)).unwrap();
        assert_eq!(summary.frames_displayed, 0);
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("csi-stream-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "rotation = 90").unwrap();
        writeln!(file, "sensor_mode = \"IMX477_4032x3040_30_0\"").unwrap();
        writeln!(file, "display_width = 1280").unwrap();
        drop(file);

        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        let profile = config.profile().unwrap();
        assert_eq!(profile.flip_code(), 1);
        assert_eq!(profile.capture_width(), 4032);
        assert_eq!(profile.display_width(), 1280);
        assert_eq!(profile.display_height(), 480);
    }

    #[test]
    fn test_load_config_rejects_bad_rotation() {
        let path = std::env::temp_dir().join(format!("csi-stream-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "rotation = 45\n").unwrap();

        let result = load_config(Some(&path));
        std::fs::remove_file(&path).ok();

        let err = result.err().unwrap();
        assert!(err.downcast_ref::<CameraError>().is_some(), "{err:#}");
    }

    #[tokio::test]
    async fn test_run_until_shutdown_with_mock() {
        let options = RunOptions {
            max_frames: Some(3),
            ..Default::default()
        };
        let summary = run_until_shutdown(StreamConfig::default(), BackendChoice::Mock, options)
            .await
            .unwrap();
        assert_eq!(summary.frames_displayed, 3);
    }
}
