//! Audio analysis node feeding the level monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Source of per-bin byte magnitudes for the current audio buffer.
pub trait AudioAnalyser: Send + Sync {
    /// Number of bins a single read yields.
    fn frequency_bin_count(&self) -> usize;

    /// Copy the current magnitudes (0..=255) into `out`.
    ///
    /// Returns the number of bins written, or `None` once the analysis
    /// context has been closed.
    fn fill_byte_levels(&self, out: &mut [u8]) -> Option<usize>;

    /// Release the analysis context. Idempotent.
    fn close(&self);
}

/// Analyser fed with PCM16 frames by a capture backend.
///
/// Each pushed frame is folded into `bins` buckets of mean absolute
/// amplitude, scaled so a full-scale sample maps to 255.
#[derive(Debug)]
pub struct PcmAnalyser {
    bins: usize,
    levels: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl PcmAnalyser {
    /// Matches an analysis node with an FFT size of 256.
    pub const DEFAULT_BINS: usize = 128;

    pub fn new(bins: usize) -> Self {
        let bins = bins.max(1);
        Self {
            bins,
            levels: Mutex::new(vec![0; bins]),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the current buffer with the magnitudes of `frame`.
    pub fn push_pcm(&self, frame: &[i16]) {
        if self.is_closed() {
            return;
        }
        let mut levels = vec![0u8; self.bins];
        if !frame.is_empty() {
            let chunk = frame.len().div_ceil(self.bins);
            for (bin, samples) in levels.iter_mut().zip(frame.chunks(chunk)) {
                let sum: u64 = samples.iter().map(|s| u64::from(s.unsigned_abs())).sum();
                let mean = sum / samples.len() as u64;
                *bin = (mean >> 7).min(255) as u8;
            }
        }
        if let Ok(mut current) = self.levels.lock() {
            *current = levels;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for PcmAnalyser {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BINS)
    }
}

impl AudioAnalyser for PcmAnalyser {
    fn frequency_bin_count(&self) -> usize {
        self.bins
    }

    fn fill_byte_levels(&self, out: &mut [u8]) -> Option<usize> {
        if self.is_closed() {
            return None;
        }
        let levels = self.levels.lock().ok()?;
        let n = out.len().min(levels.len());
        out[..n].copy_from_slice(&levels[..n]);
        Some(n)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
