//! Snapshot assembly.
//!
//! Takes the per-account batches of one pipeline run and produces the
//! [`Snapshot`] consumers render from: entries tagged with their account,
//! localized once, classified, sorted by event time, and sliced into
//! per-account last-24-hour sets anchored at publish time. Pure function of
//! its inputs; the scheduler owns the clock and the channel.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::fetch::SgvEntry;
use crate::types::{Reading, Snapshot};

/// Window for the per-account `recent` slices, in hours.
const RECENT_WINDOW_HOURS: i64 = 24;

/// Build a snapshot from successfully fetched batches.
///
/// `now` is the publish instant: it stamps `refreshed_at` and anchors the
/// 24-hour cutoff, so every consumer of one snapshot sees one cutoff.
/// Entries whose `dateString` does not parse are dropped; the drop total is
/// returned alongside the snapshot.
pub fn build_snapshot(
    batches: Vec<(String, Vec<SgvEntry>)>,
    tz: Tz,
    now: DateTime<Utc>,
) -> (Snapshot, u64) {
    let mut readings = Vec::new();
    let mut dropped = 0u64;

    for (account, entries) in batches {
        for entry in entries {
            match DateTime::parse_from_rfc3339(&entry.date_string) {
                Ok(taken_at) => {
                    readings.push(Reading::new(
                        account.clone(),
                        taken_at.with_timezone(&Utc),
                        tz,
                        entry.sgv,
                    ));
                }
                Err(e) => {
                    dropped += 1;
                    warn!(
                        account = %account,
                        date_string = %entry.date_string,
                        error = %e,
                        "dropping entry with unparseable timestamp"
                    );
                }
            }
        }
    }

    readings.sort_by_key(|r| r.taken_at);

    let cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);
    let mut recent: HashMap<String, Vec<Reading>> = HashMap::new();
    for reading in &readings {
        if reading.taken_at >= cutoff {
            recent
                .entry(reading.account.clone())
                .or_default()
                .push(reading.clone());
        }
    }

    let snapshot = Snapshot {
        readings,
        recent,
        refreshed_at: Some(now.with_timezone(&tz)),
    };
    (snapshot, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{utc, TZ};
    use crate::types::Severity;

    fn entry(date_string: &str, sgv: i32) -> SgvEntry {
        SgvEntry {
            date_string: date_string.to_string(),
            sgv,
        }
    }

    #[test]
    fn merges_and_sorts_across_accounts() {
        let batches = vec![
            (
                "bob".to_string(),
                vec![entry("2023-08-25T06:10:00Z", 140)],
            ),
            (
                "alice".to_string(),
                vec![
                    entry("2023-08-25T06:20:00Z", 90),
                    entry("2023-08-25T06:00:00Z", 110),
                ],
            ),
        ];

        let (snapshot, dropped) = build_snapshot(batches, TZ, utc("2023-08-25T07:00:00Z"));
        assert_eq!(dropped, 0);

        let order: Vec<(&str, i32)> = snapshot
            .readings
            .iter()
            .map(|r| (r.account.as_str(), r.sgv))
            .collect();
        assert_eq!(order, vec![("alice", 110), ("bob", 140), ("alice", 90)]);
    }

    #[test]
    fn classifies_at_ingestion() {
        let batches = vec![(
            "alice".to_string(),
            vec![
                entry("2023-08-25T06:00:00Z", 65),
                entry("2023-08-25T06:10:00Z", 200),
                entry("2023-08-25T06:20:00Z", 140),
            ],
        )];

        let (snapshot, _) = build_snapshot(batches, TZ, utc("2023-08-25T07:00:00Z"));
        let bands: Vec<Severity> = snapshot.readings.iter().map(|r| r.severity).collect();
        assert_eq!(bands, vec![Severity::Hypo, Severity::Hyper, Severity::Normal]);
    }

    #[test]
    fn recent_slices_cut_at_publish_time() {
        let batches = vec![(
            "alice".to_string(),
            vec![
                entry("2023-08-24T06:00:00Z", 100), // 25h before now
                entry("2023-08-24T08:00:00Z", 105), // 23h before now
                entry("2023-08-25T06:00:00Z", 110),
            ],
        )];

        let (snapshot, _) = build_snapshot(batches, TZ, utc("2023-08-25T07:00:00Z"));

        // The unified set keeps the whole fetch window.
        assert_eq!(snapshot.readings.len(), 3);

        // The recent slice drops the 25-hour-old reading.
        let recent = &snapshot.recent["alice"];
        let sgvs: Vec<i32> = recent.iter().map(|r| r.sgv).collect();
        assert_eq!(sgvs, vec![105, 110]);
    }

    #[test]
    fn silent_accounts_get_no_recent_key() {
        let batches = vec![
            (
                "alice".to_string(),
                vec![entry("2023-08-25T06:00:00Z", 100)],
            ),
            ("bob".to_string(), vec![]),
        ];

        let (snapshot, _) = build_snapshot(batches, TZ, utc("2023-08-25T07:00:00Z"));
        assert!(snapshot.recent.contains_key("alice"));
        assert!(!snapshot.recent.contains_key("bob"));
    }

    #[test]
    fn bad_timestamps_drop_without_failing_the_batch() {
        let batches = vec![(
            "alice".to_string(),
            vec![
                entry("yesterday-ish", 100),
                entry("2023-08-25T06:00:00Z", 110),
            ],
        )];

        let (snapshot, dropped) = build_snapshot(batches, TZ, utc("2023-08-25T07:00:00Z"));
        assert_eq!(dropped, 1);
        assert_eq!(snapshot.readings.len(), 1);
        assert_eq!(snapshot.readings[0].sgv, 110);
    }

    #[test]
    fn refreshed_at_is_the_local_publish_time() {
        let (snapshot, _) = build_snapshot(vec![], TZ, utc("2023-08-25T07:00:00Z"));
        let refreshed = snapshot.refreshed_at.unwrap();
        // 07:00 UTC is 10:00 in Jerusalem during August.
        assert_eq!(refreshed.format("%H:%M").to_string(), "10:00");
        assert!(snapshot.readings.is_empty());
    }
}
