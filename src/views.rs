//! Dashboard projections.
//!
//! Pure functions from `(snapshot, roster, selection)` to the row sets the
//! frontend renders. Every projection reads one published snapshot; nothing
//! here refetches or recomputes shared state, so any number of consumers can
//! render concurrently from the same tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::roster::Roster;
use crate::types::{Reading, Snapshot, SWING_ALERT_DELTA};

/// One selector option, roster order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccountOption {
    pub id: String,
    pub name: String,
}

#[must_use]
pub fn account_options(roster: &Roster) -> Vec<AccountOption> {
    roster
        .accounts()
        .iter()
        .map(|a| AccountOption {
            id: a.id.clone(),
            name: a.name.clone(),
        })
        .collect()
}

/// One point of the trend chart.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrendPoint {
    /// `DD/MM/YYYY HH:MM:SS` in display-zone local time.
    pub time: String,
    pub sgv: i32,
    /// Marker color for the severity band.
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrendSeries {
    pub account: String,
    /// Chart title, `Last 24 Hours Reading of {name}`.
    pub title: String,
    pub points: Vec<TrendPoint>,
}

/// Trend for one account from its publish-time 24h slice. Unknown or silent
/// accounts produce an empty series, not an error.
#[must_use]
pub fn trend(snapshot: &Snapshot, roster: &Roster, account: &str) -> TrendSeries {
    let name = roster.get(account).map_or(account, |a| a.name.as_str());
    let points = snapshot
        .recent
        .get(account)
        .map(|readings| readings.iter().map(trend_point).collect())
        .unwrap_or_default();
    TrendSeries {
        account: account.to_string(),
        title: format!("Last 24 Hours Reading of {name}"),
        points,
    }
}

fn trend_point(r: &Reading) -> TrendPoint {
    TrendPoint {
        time: r.display_time(),
        sgv: r.sgv,
        color: r.severity.color(),
    }
}

/// One row of the last-reading table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LastReadingRow {
    pub account: String,
    pub name: String,
    /// `DD-Mon-YYYY`.
    pub date: String,
    /// `HH:MM:SS`.
    pub time: String,
    pub sgv: i32,
}

/// Latest reading per account over the whole rolling window, roster order.
/// Accounts with no readings are omitted, never given a blank row.
#[must_use]
pub fn last_readings(snapshot: &Snapshot, roster: &Roster) -> Vec<LastReadingRow> {
    roster
        .accounts()
        .iter()
        .filter_map(|account| {
            let latest = snapshot
                .readings
                .iter()
                .filter(|r| r.account == account.id)
                .max_by_key(|r| r.taken_at)?;
            Some(LastReadingRow {
                account: account.id.clone(),
                name: account.name.clone(),
                date: latest.local.format("%d-%b-%Y").to_string(),
                time: latest.local.format("%H:%M:%S").to_string(),
                sgv: latest.sgv,
            })
        })
        .collect()
}

/// One row of the hourly swing table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SwingRow {
    pub account: String,
    pub name: String,
    /// Local calendar date, ISO.
    pub date: String,
    /// Zero-padded clock hour the swing occurred in.
    pub hour: String,
    /// `max(sgv) - min(sgv)` within the hour.
    pub swing: i32,
}

/// Hour-bucket swings of at least 100 mg/dL over the publish-time 24h
/// slices. Grouped by (account, local date, hour); rows come out in roster
/// order, then chronologically within an account.
#[must_use]
pub fn swing_alerts(snapshot: &Snapshot, roster: &Roster) -> Vec<SwingRow> {
    let mut rows = Vec::new();
    for account in roster.accounts() {
        let Some(readings) = snapshot.recent.get(&account.id) else {
            continue;
        };

        // (date, hour) -> (min, max). BTreeMap keeps buckets chronological.
        let mut buckets: BTreeMap<(NaiveDate, String), (i32, i32)> = BTreeMap::new();
        for r in readings {
            let bucket = buckets
                .entry((r.local_date(), r.hour_bucket()))
                .or_insert((r.sgv, r.sgv));
            bucket.0 = bucket.0.min(r.sgv);
            bucket.1 = bucket.1.max(r.sgv);
        }

        for ((date, hour), (lo, hi)) in buckets {
            let swing = hi - lo;
            if swing >= SWING_ALERT_DELTA {
                rows.push(SwingRow {
                    account: account.id.clone(),
                    name: account.name.clone(),
                    date: date.to_string(),
                    hour,
                    swing,
                });
            }
        }
    }
    rows
}

/// Medical metadata row for one account.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PatientRow {
    pub account: String,
    pub name: String,
    pub fasting_sugar: String,
    pub a1c: String,
    pub medications: String,
}

/// Roster row for the selected account; `None` when the id is unknown.
/// Depends only on the roster, so it renders even before the first publish.
#[must_use]
pub fn patient_info(roster: &Roster, account: &str) -> Option<PatientRow> {
    roster.get(account).map(|a| PatientRow {
        account: a.id.clone(),
        name: a.name.clone(),
        fasting_sugar: a.fasting_sugar.clone(),
        a1c: a.a1c.clone(),
        medications: a.medications.clone(),
    })
}

/// Refresh state served alongside the tables.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Status {
    /// `Last Refresh Time: DD-Mon-YYYY (HH:MM:SS)`, or the placeholder
    /// before the first publish.
    pub refresh_label: String,
    /// True when the snapshot is older than the staleness allowance (or was
    /// never published).
    pub stale: bool,
    pub accounts: usize,
    pub readings: usize,
}

#[must_use]
pub fn status(
    snapshot: &Snapshot,
    roster: &Roster,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Status {
    let stale = match snapshot.refreshed_at {
        Some(refreshed) => now.signed_duration_since(refreshed) > stale_after,
        None => true,
    };
    Status {
        refresh_label: snapshot.refresh_label(),
        stale,
        accounts: roster.len(),
        readings: snapshot.readings.len(),
    }
}
