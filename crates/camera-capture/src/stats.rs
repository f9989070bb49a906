//! Per-interval frame statistics
//!
//! The capture thread bumps `frames_read`, the consumer bumps
//! `frames_displayed`. A ticker thread rolls both into the "last interval"
//! snapshot once per interval and zeroes the live pair.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default statistics interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Statistics collector usage errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    #[error("FPS statistics already running")]
    AlreadyRunning,

    #[error("FPS statistics not running")]
    NotRunning,

    #[error("Failed to spawn statistics thread")]
    Spawn,
}

/// Counts for one completed interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FpsSnapshot {
    pub frames_read: u64,
    pub frames_displayed: u64,
}

/// Live and last-interval frame counters
///
/// Each live counter has a single writer; the ticker is the only writer of
/// the snapshot pair and the only resetter of the live pair.
#[derive(Debug, Default)]
pub struct FrameCounters {
    frames_read: AtomicU64,
    frames_displayed: AtomicU64,
    last_frames_read: AtomicU64,
    last_frames_displayed: AtomicU64,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture thread: one frame read from the device
    pub fn record_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Consumer: one frame shown
    pub fn record_displayed(&self) {
        self.frames_displayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts accumulated since the last roll-over
    pub fn live(&self) -> FpsSnapshot {
        FpsSnapshot {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_displayed: self.frames_displayed.load(Ordering::Relaxed),
        }
    }

    /// Counts of the last completed interval
    pub fn last(&self) -> FpsSnapshot {
        FpsSnapshot {
            frames_read: self.last_frames_read.load(Ordering::Acquire),
            frames_displayed: self.last_frames_displayed.load(Ordering::Acquire),
        }
    }

    /// Move the live counts into the snapshot and zero them
    ///
    /// An increment racing with the swap lands in exactly one interval.
    pub fn roll_over(&self) -> FpsSnapshot {
        let snapshot = FpsSnapshot {
            frames_read: self.frames_read.swap(0, Ordering::AcqRel),
            frames_displayed: self.frames_displayed.swap(0, Ordering::AcqRel),
        };
        self.last_frames_read
            .store(snapshot.frames_read, Ordering::Release);
        self.last_frames_displayed
            .store(snapshot.frames_displayed, Ordering::Release);
        snapshot
    }
}

struct Ticker {
    /// `true` once stop was requested
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: JoinHandle<()>,
}

/// Periodic roll-over of [`FrameCounters`]
pub struct StatsCollector {
    counters: Arc<FrameCounters>,
    interval: Duration,
    ticker: Option<Ticker>,
}

impl StatsCollector {
    /// Collector ticking once per second
    pub fn new(counters: Arc<FrameCounters>) -> Self {
        Self::with_interval(counters, DEFAULT_INTERVAL)
    }

    pub fn with_interval(counters: Arc<FrameCounters>, interval: Duration) -> Self {
        Self {
            counters,
            interval: interval.max(Duration::from_millis(1)),
            ticker: None,
        }
    }

    /// Begin ticking
    pub fn start(&mut self) -> Result<(), StatsError> {
        if self.ticker.is_some() {
            return Err(StatsError::AlreadyRunning);
        }

        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let counters = self.counters.clone();
        let interval = self.interval;
        let signal = shutdown.clone();

        let handle = thread::Builder::new()
            .name("fps-stats".into())
            .spawn(move || run_ticker(&counters, interval, &signal))
            .map_err(|e| {
                warn!("Failed to spawn FPS statistics thread: {}", e);
                StatsError::Spawn
            })?;

        info!("FPS statistics started (interval {:?})", self.interval);
        self.ticker = Some(Ticker { shutdown, handle });
        Ok(())
    }

    /// Cancel ticking and wait for an in-flight tick to finish
    pub fn stop(&mut self) -> Result<(), StatsError> {
        let ticker = self.ticker.take().ok_or(StatsError::NotRunning)?;

        let (flag, cvar) = &*ticker.shutdown;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();

        if ticker.handle.join().is_err() {
            warn!("FPS statistics thread panicked");
        }
        info!("FPS statistics stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn counters(&self) -> &Arc<FrameCounters> {
        &self.counters
    }
}

impl Drop for StatsCollector {
    fn drop(&mut self) {
        if self.ticker.is_some() {
            let _ = self.stop();
        }
    }
}

fn run_ticker(counters: &FrameCounters, interval: Duration, shutdown: &(Mutex<bool>, Condvar)) {
    let (flag, cvar) = shutdown;
    let mut deadline = Instant::now() + interval;
    let mut stopped = flag.lock().unwrap_or_else(PoisonError::into_inner);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (guard, _) = cvar
            .wait_timeout_while(stopped, remaining, |stop| !*stop)
            .unwrap_or_else(PoisonError::into_inner);
        stopped = guard;

        if *stopped {
            break;
        }
        if Instant::now() < deadline {
            // Spurious early return
            continue;
        }

        let snapshot = counters.roll_over();
        metrics::gauge!("camera_frames_read_per_second").set(snapshot.frames_read as f64);
        metrics::gauge!("camera_frames_displayed_per_second")
            .set(snapshot.frames_displayed as f64);
        debug!(
            frames_read = snapshot.frames_read,
            frames_displayed = snapshot.frames_displayed,
            "fps tick"
        );

        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            // Fell behind (suspended process); skip missed ticks
            deadline = now + interval;
        }
    }
}
