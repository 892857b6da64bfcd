//! Per-phase progress reporting.
//!
//! Each pipeline phase owns a `PhaseProgress`: an indicatif bar plus a
//! shared completion counter, safe to tick from rayon workers. With
//! `--log-only` the bar is hidden and the phase emits a tracing line every
//! `log_every` items instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const BAR_TEMPLATE: &str = "{msg:<28} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg:<28} {spinner} [{elapsed_precise}]";

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// `12.3s` below a minute, `4m05s` above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = d.as_secs();
        format!("{}m{:02}s", whole / 60, whole % 60)
    }
}

/// Whether item `current` of `total` gets a log line.
fn is_log_point(current: u64, total: u64, every: u64) -> bool {
    total > 0 && every > 0 && (current % every == 0 || current == total)
}

fn hidden_or_styled(bar: ProgressBar, style: ProgressStyle) -> ProgressBar {
    if is_log_only() {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        bar.set_style(style);
    }
    bar
}

/// Spinner for the directory walk, whose length is unknown up front.
pub fn spinner(label: &'static str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .expect("static spinner template");
    let bar = hidden_or_styled(ProgressBar::new_spinner(), style);
    if !is_log_only() {
        bar.enable_steady_tick(Duration::from_millis(100));
    }
    bar.set_message(label);
    bar
}

pub struct PhaseProgress {
    label: &'static str,
    bar: ProgressBar,
    done: AtomicU64,
    total: u64,
    log_every: u64,
}

impl PhaseProgress {
    pub fn new(label: &'static str, total: u64, log_every: u64) -> Self {
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .expect("static progress template")
            .progress_chars("=> ");
        let bar = hidden_or_styled(ProgressBar::new(total), style);
        bar.set_message(label);
        Self {
            label,
            bar,
            done: AtomicU64::new(0),
            total,
            log_every,
        }
    }

    /// Mark one item done.
    pub fn tick(&self) {
        self.bar.inc(1);
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if is_log_only() && is_log_point(current, self.total, self.log_every) {
            let pct = 100.0 * current as f64 / self.total as f64;
            tracing::info!("[{}] {}/{} ({:.1}%)", self.label, current, self.total, pct);
        }
    }

    pub fn completed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn finish(&self, summary: impl Into<Cow<'static, str>>) {
        self.bar.finish_with_message(summary);
    }
}
