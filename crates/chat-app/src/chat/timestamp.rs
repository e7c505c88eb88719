use chrono::{DateTime, Local, TimeZone, Utc};

/// `M/D/YYYY, h:mm:ss AM`
pub const DISPLAY_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

pub fn format_local(timestamp: DateTime<Utc>) -> String {
    format_in(timestamp, &Local)
}

pub fn format_in<Tz>(timestamp: DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    timestamp
        .with_timezone(zone)
        .format(DISPLAY_FORMAT)
        .to_string()
}

/// Display timestamp derived from a turn's `created_at`.
///
/// The slot starts blank. [`observe`](Self::observe) records the source during
/// sync and reports whether a refresh is due; [`refresh`](Self::refresh) runs
/// once the frame has been presented and is the only place that formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampSlot {
    source: Option<DateTime<Utc>>,
    observed: bool,
    stale: bool,
    text: String,
}

impl TimestampSlot {
    /// Returns true when `source` differs from the last observed value and a
    /// formatted value is still owed.
    pub fn observe(&mut self, source: Option<DateTime<Utc>>) -> bool {
        if self.observed && self.source == source {
            return self.stale;
        }

        self.observed = true;
        self.source = source;
        self.stale = source.is_some();
        if source.is_none() {
            self.text.clear();
        }
        self.stale
    }

    /// Formats the pending source. Returns whether the visible text changed.
    pub fn refresh_with(&mut self, format: impl FnOnce(DateTime<Utc>) -> String) -> bool {
        if !self.stale {
            return false;
        }

        self.stale = false;
        let next = self.source.map(format).unwrap_or_default();
        if next == self.text {
            return false;
        }
        self.text = next;
        true
    }

    pub fn refresh(&mut self) -> bool {
        self.refresh_with(format_local)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
