//! Lightweight metrics with Prometheus text exposition.
//!
//! Atomic counters rendered directly as Prometheus text format, no metrics
//! crate. Histograms use logarithmic 1-2-5 buckets from 10ms to 60s, sized
//! for HTTP round-trips and full pipeline runs rather than hot-path work.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Prometheus histogram
// ---------------------------------------------------------------------------

const NUM_BUCKETS: usize = 12;

/// Upper bounds in nanoseconds + Prometheus `le` label strings.
/// 1-2.5-5 logarithmic progression from 10ms to 60s.
const BUCKETS: [(u64, &str); NUM_BUCKETS] = [
    (10_000_000, "0.01"),
    (25_000_000, "0.025"),
    (50_000_000, "0.05"),
    (100_000_000, "0.1"),
    (250_000_000, "0.25"),
    (500_000_000, "0.5"),
    (1_000_000_000, "1"),
    (2_500_000_000, "2.5"),
    (5_000_000_000, "5"),
    (10_000_000_000, "10"),
    (30_000_000_000, "30"),
    (60_000_000_000, "60"),
];

pub struct PromHistogram {
    /// Cumulative bucket counters. Index i counts observations <= BUCKETS[i].
    buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of all observed values in nanoseconds.
    sum_ns: AtomicU64,
    /// Total number of observations.
    count: AtomicU64,
}

impl Default for PromHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl PromHistogram {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a duration observation. Increments all cumulative buckets
    /// whose upper bound >= the observed value.
    pub fn record(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        for (i, &(bound_ns, _)) in BUCKETS.iter().enumerate() {
            if nanos <= bound_ns {
                for bucket in &self.buckets[i..] {
                    bucket.fetch_add(1, Relaxed);
                }
                break;
            }
        }

        self.sum_ns.fetch_add(nanos, Relaxed);
        self.count.fetch_add(1, Relaxed);
    }

    /// Render as Prometheus histogram lines.
    fn render(&self, name: &str, out: &mut String) {
        for (i, &(_, le)) in BUCKETS.iter().enumerate() {
            let count = self.buckets[i].load(Relaxed);
            writeln!(out, "{name}_bucket{{le=\"{le}\"}} {count}").unwrap();
        }

        let total = self.count.load(Relaxed);
        writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {total}").unwrap();

        let sum_secs = self.sum_ns.load(Relaxed) as f64 / 1_000_000_000.0;
        writeln!(out, "{name}_sum {sum_secs}").unwrap();
        writeln!(out, "{name}_count {total}").unwrap();
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Per-account fetch counters.
pub struct AccountMetrics {
    pub id: String,
    pub fetches: AtomicU64,
    pub errors: AtomicU64,
}

pub struct Metrics {
    accounts: Vec<AccountMetrics>,

    // Counters
    pub ticks: AtomicU64,
    pub ticks_failed: AtomicU64,
    pub entries_dropped: AtomicU64,

    // Gauges
    /// Unified reading count of the last published snapshot.
    pub readings: AtomicU64,
    /// Unix seconds of the last successful publish (0 before the first).
    pub last_refresh_unix: AtomicU64,
    start_time: Instant,

    // Duration histograms
    pub fetch_duration: PromHistogram,
    pub tick_duration: PromHistogram,
}

impl Metrics {
    /// Register one counter set per roster account. Adding an account is a
    /// roster change, not a code change.
    pub fn register<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accounts: ids
                .into_iter()
                .map(|id| AccountMetrics {
                    id: id.into(),
                    fetches: AtomicU64::new(0),
                    errors: AtomicU64::new(0),
                })
                .collect(),
            ticks: AtomicU64::new(0),
            ticks_failed: AtomicU64::new(0),
            entries_dropped: AtomicU64::new(0),
            readings: AtomicU64::new(0),
            last_refresh_unix: AtomicU64::new(0),
            start_time: Instant::now(),
            fetch_duration: PromHistogram::new(),
            tick_duration: PromHistogram::new(),
        }
    }

    /// Counter set for one account; `None` for ids outside the roster.
    #[must_use]
    pub fn account(&self, id: &str) -> Option<&AccountMetrics> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Render all metrics in Prometheus text exposition format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(4096);

        // -- Counters --
        writeln!(out, "# HELP cgm_fetches_total Successful upstream fetches").unwrap();
        writeln!(out, "# TYPE cgm_fetches_total counter").unwrap();
        for a in &self.accounts {
            writeln!(
                out,
                "cgm_fetches_total{{account=\"{}\"}} {}",
                a.id,
                a.fetches.load(Relaxed)
            )
            .unwrap();
        }

        writeln!(out, "# HELP cgm_fetch_errors_total Failed upstream fetches").unwrap();
        writeln!(out, "# TYPE cgm_fetch_errors_total counter").unwrap();
        for a in &self.accounts {
            writeln!(
                out,
                "cgm_fetch_errors_total{{account=\"{}\"}} {}",
                a.id,
                a.errors.load(Relaxed)
            )
            .unwrap();
        }

        writeln!(out, "# HELP cgm_ticks_total Completed pipeline runs").unwrap();
        writeln!(out, "# TYPE cgm_ticks_total counter").unwrap();
        writeln!(out, "cgm_ticks_total {}", self.ticks.load(Relaxed)).unwrap();

        writeln!(
            out,
            "# HELP cgm_ticks_failed_total Runs where every account fetch failed"
        )
        .unwrap();
        writeln!(out, "# TYPE cgm_ticks_failed_total counter").unwrap();
        writeln!(out, "cgm_ticks_failed_total {}", self.ticks_failed.load(Relaxed)).unwrap();

        writeln!(
            out,
            "# HELP cgm_entries_dropped_total Records dropped by decode or timestamp coercion"
        )
        .unwrap();
        writeln!(out, "# TYPE cgm_entries_dropped_total counter").unwrap();
        writeln!(
            out,
            "cgm_entries_dropped_total {}",
            self.entries_dropped.load(Relaxed)
        )
        .unwrap();

        // -- Gauges --
        writeln!(out, "# HELP cgm_readings Readings in the published snapshot").unwrap();
        writeln!(out, "# TYPE cgm_readings gauge").unwrap();
        writeln!(out, "cgm_readings {}", self.readings.load(Relaxed)).unwrap();

        writeln!(
            out,
            "# HELP cgm_last_refresh_timestamp_seconds Unix time of the last publish"
        )
        .unwrap();
        writeln!(out, "# TYPE cgm_last_refresh_timestamp_seconds gauge").unwrap();
        writeln!(
            out,
            "cgm_last_refresh_timestamp_seconds {}",
            self.last_refresh_unix.load(Relaxed)
        )
        .unwrap();

        writeln!(out, "# HELP cgm_uptime_seconds Seconds since process start").unwrap();
        writeln!(out, "# TYPE cgm_uptime_seconds gauge").unwrap();
        writeln!(out, "cgm_uptime_seconds {}", self.start_time.elapsed().as_secs()).unwrap();

        // -- Histograms --
        writeln!(
            out,
            "# HELP cgm_fetch_duration_seconds One account fetch round-trip"
        )
        .unwrap();
        writeln!(out, "# TYPE cgm_fetch_duration_seconds histogram").unwrap();
        self.fetch_duration.render("cgm_fetch_duration_seconds", &mut out);

        writeln!(
            out,
            "# HELP cgm_tick_duration_seconds Full fetch+aggregate+publish run"
        )
        .unwrap();
        writeln!(out, "# TYPE cgm_tick_duration_seconds histogram").unwrap();
        self.tick_duration.render("cgm_tick_duration_seconds", &mut out);

        out
    }
}
