//! Core domain types for glucose readings.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Readings strictly below this are hypoglycemic (mg/dL).
pub const HYPO_BELOW: i32 = 70;

/// Readings strictly above this are hyperglycemic (mg/dL).
pub const HYPER_ABOVE: i32 = 150;

/// Minimum max-min spread within one clock hour that produces a swing row.
pub const SWING_ALERT_DELTA: i32 = 100;

/// Severity band of a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Hypo,
    Normal,
    Hyper,
}

impl Severity {
    /// Classify a sensor glucose value. Bounds are inclusive on the normal
    /// side: 70 and 150 both classify as `Normal`.
    #[must_use]
    pub fn classify(sgv: i32) -> Self {
        if sgv < HYPO_BELOW {
            Severity::Hypo
        } else if sgv > HYPER_ABOVE {
            Severity::Hyper
        } else {
            Severity::Normal
        }
    }

    /// Chart marker color for this band.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Severity::Hypo => "rgb(230, 230, 0)",
            Severity::Hyper => "rgb(255, 102, 102)",
            Severity::Normal => "rgb(0, 179, 60)",
        }
    }
}

/// One glucose reading, localized and classified at ingestion.
#[derive(Debug, Clone)]
pub struct Reading {
    /// Roster account the reading belongs to.
    pub account: String,
    /// Canonical event time as reported upstream.
    pub taken_at: DateTime<Utc>,
    /// Event time in the display zone. Converted once, here; every calendar
    /// field below derives from this value.
    pub local: DateTime<Tz>,
    /// Sensor glucose value, mg/dL.
    pub sgv: i32,
    pub severity: Severity,
}

impl Reading {
    pub fn new(account: impl Into<String>, taken_at: DateTime<Utc>, tz: Tz, sgv: i32) -> Self {
        Self {
            account: account.into(),
            taken_at,
            local: taken_at.with_timezone(&tz),
            sgv,
            severity: Severity::classify(sgv),
        }
    }

    /// Local calendar date.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.local.date_naive()
    }

    /// `DD/MM/YYYY HH:MM:SS`, the trend point label.
    #[must_use]
    pub fn display_time(&self) -> String {
        self.local.format("%d/%m/%Y %H:%M:%S").to_string()
    }

    /// Zero-padded clock hour, the swing grouping key.
    #[must_use]
    pub fn hour_bucket(&self) -> String {
        self.local.format("%H").to_string()
    }
}

/// Immutable product of one pipeline run, published whole through a watch
/// channel. Consumers clone the `Arc`, never the data.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Every reading in the rolling window, all accounts, ordered by event time.
    pub readings: Vec<Reading>,
    /// Per-account slices of `readings` within 24 hours of the publish cutoff.
    /// Accounts with nothing recent have no key.
    pub recent: HashMap<String, Vec<Reading>>,
    /// Local wall-clock time of the last successful refresh. `None` until the
    /// first tick publishes.
    pub refreshed_at: Option<DateTime<Tz>>,
}

impl Snapshot {
    /// `Last Refresh Time: DD-Mon-YYYY (HH:MM:SS)` label text, or the
    /// placeholder shown before the first publish.
    #[must_use]
    pub fn refresh_label(&self) -> String {
        match self.refreshed_at {
            Some(t) => format!("Last Refresh Time: {}", t.format("%d-%b-%Y (%H:%M:%S)")),
            None => "Last Refresh Time: never".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::reading;

    #[test]
    fn classify_boundaries() {
        assert_eq!(Severity::classify(69), Severity::Hypo);
        assert_eq!(Severity::classify(70), Severity::Normal);
        assert_eq!(Severity::classify(150), Severity::Normal);
        assert_eq!(Severity::classify(151), Severity::Hyper);
    }

    #[test]
    fn band_colors() {
        assert_eq!(Severity::Hypo.color(), "rgb(230, 230, 0)");
        assert_eq!(Severity::Hyper.color(), "rgb(255, 102, 102)");
        assert_eq!(Severity::Normal.color(), "rgb(0, 179, 60)");
    }

    #[test]
    fn calendar_fields_derive_from_local_time() {
        // 21:30 UTC is 00:30 the next day in Jerusalem (UTC+3 in August).
        let r = reading("alice", "2023-08-24T21:30:00Z", 120);
        assert_eq!(r.local_date().to_string(), "2023-08-25");
        assert_eq!(r.hour_bucket(), "00");
        assert_eq!(r.display_time(), "25/08/2023 00:30:00");
    }

    #[test]
    fn refresh_label_formats() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.refresh_label(), "Last Refresh Time: never");

        let refreshed = Snapshot {
            refreshed_at: Some(
                reading("alice", "2023-08-25T07:00:00Z", 100).local,
            ),
            ..Snapshot::default()
        };
        assert_eq!(
            refreshed.refresh_label(),
            "Last Refresh Time: 25-Aug-2023 (10:00:00)"
        );
    }
}
