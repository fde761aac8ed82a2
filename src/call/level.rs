//! Recurring audio level sampling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::media::AudioAnalyser;

/// Shortest sampling interval the monitor will schedule.
pub const MIN_CADENCE: Duration = Duration::from_millis(1);

/// Mean byte magnitude normalized to `[0, 1]`.
pub fn compute_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    (sum as f64 / bins.len() as f64 / 255.0) as f32
}

/// Samples an analyser once per tick and reports the normalized level.
pub struct AudioLevelMonitor {
    analyser: Arc<dyn AudioAnalyser>,
    cadence: Duration,
}

impl AudioLevelMonitor {
    /// A zero cadence is raised to [`MIN_CADENCE`].
    pub fn new(analyser: Arc<dyn AudioAnalyser>, cadence: Duration) -> Self {
        if cadence < MIN_CADENCE {
            tracing::warn!(?cadence, "Level cadence too short, using 1ms");
        }
        Self {
            analyser,
            cadence: cadence.max(MIN_CADENCE),
        }
    }

    /// Start ticking on the current runtime.
    ///
    /// The loop ends when the handle is stopped or dropped, or as soon as the
    /// analyser reports that its context is closed.
    pub fn start<F>(self, on_level: F) -> LevelMonitorHandle
    where
        F: FnMut(f32) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_level_loop(
            self.analyser,
            self.cadence,
            Arc::clone(&active),
            cancel.clone(),
            on_level,
        ));
        LevelMonitorHandle {
            active,
            cancel,
            task: Some(task),
        }
    }
}

async fn run_level_loop<F>(
    analyser: Arc<dyn AudioAnalyser>,
    cadence: Duration,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    mut on_level: F,
) where
    F: FnMut(f32) + Send + 'static,
{
    let mut ticker = time::interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buffer = vec![0u8; analyser.frequency_bin_count()];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // Re-checked every tick: a stop may land between wakeup and sampling.
        if !active.load(Ordering::Acquire) {
            break;
        }
        let Some(written) = analyser.fill_byte_levels(&mut buffer) else {
            tracing::debug!("Analysis context closed, level monitor stopping");
            break;
        };
        on_level(compute_level(&buffer[..written]));
    }

    active.store(false, Ordering::Release);
}

/// Handle to a running level monitor. Dropping it stops the loop.
#[derive(Debug)]
pub struct LevelMonitorHandle {
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LevelMonitorHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop scheduling ticks. Idempotent and non-blocking.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LevelMonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
