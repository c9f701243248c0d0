//! Shared progress counters and the single-line progress display
//!
//! All lanes report into one [`ProgressAggregator`]. Both counters live behind
//! one mutex so a snapshot is never torn between count and cost. Rendering
//! happens outside the lock; a drawn line may already be stale, which is fine
//! for a display.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;

/// Completed work observed at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub completed_count: u64,
    pub completed_cost: u64,
}

/// Static totals for a run, computed before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTotals {
    pub jobs: u64,
    /// Zero when the job kind does not track cost; rendering then falls back
    /// to job counts.
    pub cost: u64,
    /// Plural noun for the job kind ("files", "frames").
    pub unit: &'static str,
}

impl ProgressTotals {
    pub fn complete(&self) -> ProgressState {
        ProgressState {
            completed_count: self.jobs,
            completed_cost: self.cost,
        }
    }
}

/// Cross-lane counters. Shared by reference for the lifetime of one run.
#[derive(Debug)]
pub struct ProgressAggregator {
    state: Mutex<ProgressState>,
    totals: ProgressTotals,
}

impl ProgressAggregator {
    pub fn new(totals: ProgressTotals) -> Self {
        Self {
            state: Mutex::new(ProgressState::default()),
            totals,
        }
    }

    pub fn totals(&self) -> ProgressTotals {
        self.totals
    }

    /// Add to both counters in one critical section.
    pub fn report(&self, delta_count: u64, delta_cost: u64) {
        let mut state = self.state.lock();
        state.completed_count += delta_count;
        state.completed_cost += delta_cost;
        debug_assert!(state.completed_count <= self.totals.jobs);
        debug_assert!(state.completed_cost <= self.totals.cost);
    }

    pub fn snapshot(&self) -> ProgressState {
        *self.state.lock()
    }
}

/// Turn a snapshot into the progress line.
///
/// Percentage is by cost when the run tracks cost, by job count otherwise.
/// An empty run renders as complete.
pub fn render(snapshot: ProgressState, totals: &ProgressTotals) -> String {
    if totals.jobs == 0 {
        return format!("0000 of 0000 {} (100.00%)", totals.unit);
    }
    let percent = if totals.cost > 0 {
        snapshot.completed_cost as f64 / totals.cost as f64 * 100.0
    } else {
        snapshot.completed_count as f64 / totals.jobs as f64 * 100.0
    };
    let percent = percent.min(100.0);
    let mut line = format!(
        "{:04} of {:04} {} ({:.02}%)",
        snapshot.completed_count, totals.jobs, totals.unit, percent
    );
    if totals.cost > 0 {
        line.push_str(&format!(
            " - {} of {}",
            format_size(snapshot.completed_cost),
            format_size(totals.cost)
        ));
    }
    line
}

/// Compact size with one decimal: `1.5G`, `20.0M`, `0.5K`.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: u64 = 1_048_576;
    const GIB: u64 = 1_073_741_824;
    if bytes > GIB {
        format!("{:.1}G", bytes as f64 / GIB as f64)
    } else if bytes > MIB {
        format!("{:.1}M", bytes as f64 / MIB as f64)
    } else {
        format!("{:.1}K", bytes as f64 / KIB)
    }
}

/// Where progress lines go.
pub trait ProgressSink: Send + Sync {
    /// Replace the current line.
    fn draw(&self, line: &str);
    /// Leave the final line in place and end it with a newline.
    fn finish(&self, line: &str);
    /// Stop drawing without a completion line (cancelled runs).
    fn abandon(&self) {}
}

/// Discards everything.
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn draw(&self, _line: &str) {}
    fn finish(&self, _line: &str) {}
}

/// Single overwritten terminal line on stdout.
pub struct TerminalLine {
    bar: ProgressBar,
}

impl TerminalLine {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }
}

impl Default for TerminalLine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalLine {
    fn draw(&self, line: &str) {
        self.bar.set_message(line.to_string());
    }

    fn finish(&self, line: &str) {
        self.bar.finish_with_message(line.to_string());
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}
