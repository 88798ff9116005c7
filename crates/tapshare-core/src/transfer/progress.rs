//! Transfer statistics for progress display.

use std::time::{Duration, Instant};

use crate::session::percentage;

/// Progress information for one transfer.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Index of the current file
    pub current_file: usize,
    /// Total number of files
    pub total_files: usize,
    /// Name of the current file
    pub current_file_name: String,
    /// Bytes moved across all files
    pub total_bytes_transferred: u64,
    /// Bytes declared across all files
    pub total_bytes: u64,
    /// When the transfer started
    pub started_at: Instant,
}

impl TransferProgress {
    /// Create a new progress tracker.
    #[must_use]
    pub fn new(total_files: usize, total_bytes: u64) -> Self {
        Self {
            current_file: 0,
            total_files,
            current_file_name: String::new(),
            total_bytes_transferred: 0,
            total_bytes,
            started_at: Instant::now(),
        }
    }

    /// Move on to the file at `index`.
    pub fn start_file(&mut self, index: usize, name: &str) {
        self.current_file = index;
        self.current_file_name = name.to_string();
    }

    /// Record `bytes` moved.
    pub fn record(&mut self, bytes: u64) {
        self.total_bytes_transferred += bytes;
    }

    /// Get progress as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        percentage(self.total_bytes_transferred, self.total_bytes)
    }

    /// Average speed since the start, in bytes per second.
    #[must_use]
    pub fn speed_bps(&self) -> f64 {
        bytes_per_second(self.total_bytes_transferred, self.started_at.elapsed())
    }

    /// Estimated time remaining at the current average speed.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self
            .total_bytes
            .saturating_sub(self.total_bytes_transferred);
        estimate_remaining(remaining, self.speed_bps())
    }
}

/// Bytes per second over `elapsed`, zero when no time has passed.
#[must_use]
pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        bytes as f64 / secs
    }
}

/// Time to move `remaining` bytes at `speed`, if it can be estimated.
#[must_use]
pub fn estimate_remaining(remaining: u64, speed: f64) -> Option<Duration> {
    if remaining == 0 || speed <= 0.0 || !speed.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / speed))
}

/// Format a transfer speed for display.
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{bytes_per_sec:.1} B/s")
    }
}

/// Format a time estimate for display.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "Unknown".to_string();
    };

    let secs = eta.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
