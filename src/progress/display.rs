//! Rendering of the progress line
//!
//! Everything here is a pure function of a snapshot and an elapsed time, so the
//! display loop only has to read the counters and write the resulting string.

use crate::progress::ProgressSnapshot;
use std::fmt;
use std::time::Duration;

/// Width of the progress bar, in steps
pub const BAR_STEPS: usize = 20;

/// Projected remaining time of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    /// Nothing has completed yet, so there is no rate to project from
    Unknown,
    Remaining(Duration),
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "?"),
            Self::Remaining(d) => write!(f, "{}", format_hms(*d)),
        }
    }
}

/// Severity band of the success ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBand {
    /// More than 75% of completed tasks succeeded
    Healthy,
    /// Between 25% and 75%
    Degraded,
    /// 25% or less
    Critical,
}

impl HealthBand {
    pub fn from_success(success: f64) -> Self {
        if success > 0.75 {
            Self::Healthy
        } else if success > 0.25 {
            Self::Degraded
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Formats a duration as `XdYhZmWs`, dropping the units above the largest one
/// that applies
///
/// # Example
///
/// ```
/// use stagecrawl::progress::format_hms;
/// use std::time::Duration;
///
/// assert_eq!(format_hms(Duration::from_secs(42)), "42s");
/// assert_eq!(format_hms(Duration::from_secs(3725)), "1h2m5s");
/// ```
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    let (mins, s) = (secs / 60, secs % 60);
    let (hours, m) = (mins / 60, mins % 60);
    let (days, h) = (hours / 24, hours % 24);

    if days > 0 {
        format!("{days}d{h}h{m}m{s}s")
    } else if hours > 0 {
        format!("{h}h{m}m{s}s")
    } else if mins > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// Renders the proportional bar for a completion ratio in `[0, 1]`
pub fn render_bar(ratio: f64) -> String {
    if ratio <= 0.0 {
        format!("[{}]", " ".repeat(BAR_STEPS))
    } else if ratio < 1.0 {
        let filled = (ratio * BAR_STEPS as f64) as usize;
        let empty = ((1.0 - ratio) * BAR_STEPS as f64) as usize;
        format!("[{}>{}]", "=".repeat(filled), " ".repeat(empty))
    } else {
        format!("[{}]", "=".repeat(BAR_STEPS))
    }
}

/// Renders one progress line
///
/// `label [bar] done/total pct% eta: ETA rate: N/s @ health% (band)`
pub fn render_line(label: &str, snapshot: &ProgressSnapshot, elapsed: Duration) -> String {
    let success = snapshot.success();
    format!(
        "{} {} {}/{} {:.2}% eta: {} rate: {:.2}/s @ {:.2}% ({})",
        label,
        render_bar(snapshot.ratio()),
        snapshot.done,
        snapshot.total,
        100.0 * snapshot.ratio(),
        snapshot.eta(elapsed),
        snapshot.rate(elapsed),
        100.0 * success,
        HealthBand::from_success(success),
    )
}
