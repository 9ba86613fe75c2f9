//! Pipeline scheduler.
//!
//! Runs fetch → aggregate → publish on a fixed period. Per-account fetches
//! run concurrently with a bounded limit; the runs themselves never overlap
//! (`MissedTickBehavior::Delay` waits out a slow run instead of stacking
//! ticks). Publishing is one `watch::send` of a fresh `Arc<Snapshot>`, so
//! readers swap snapshots atomically and never observe a partial refresh.
//!
//! A tick where every account fails publishes nothing: the previous snapshot
//! and its timestamp stay visible, which is what lets `/api/status` and
//! `/health` report staleness honestly.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as TimeDelta, Utc};
use chrono_tz::Tz;
use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate;
use crate::fetch::ReadingSource;
use crate::metrics::Metrics;
use crate::roster::Roster;
use crate::types::Snapshot;

pub struct Scheduler<S> {
    source: S,
    roster: Arc<Roster>,
    tz: Tz,
    period: std::time::Duration,
    concurrency: usize,
    metrics: Arc<Metrics>,
}

impl<S: ReadingSource> Scheduler<S> {
    pub fn new(
        source: S,
        roster: Arc<Roster>,
        tz: Tz,
        period: std::time::Duration,
        concurrency: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            roster,
            tz,
            period,
            concurrency: concurrency.max(1),
            metrics,
        }
    }

    /// Run until cancelled. The first tick fires immediately, so the
    /// dashboard has data as soon as the first round of fetches lands.
    pub async fn run(self, snapshot_tx: watch::Sender<Arc<Snapshot>>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            period_secs = self.period.as_secs(),
            accounts = self.roster.len(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let t0 = Instant::now();
            if let Some(snapshot) = self.run_once().await {
                self.metrics.readings.store(snapshot.readings.len() as u64, Relaxed);
                if let Some(refreshed) = snapshot.refreshed_at {
                    self.metrics
                        .last_refresh_unix
                        .store(u64::try_from(refreshed.timestamp()).unwrap_or(0), Relaxed);
                }
                info!(
                    readings = snapshot.readings.len(),
                    recent_accounts = snapshot.recent.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "snapshot published"
                );
                let _ = snapshot_tx.send(Arc::new(snapshot));
            }
            self.metrics.tick_duration.record(t0.elapsed());
        }
    }

    /// One fetch + aggregate pass. `None` when every account failed; the
    /// caller must then leave the previous snapshot in place.
    async fn run_once(&self) -> Option<Snapshot> {
        self.metrics.ticks.fetch_add(1, Relaxed);
        let now = Utc::now();
        let since = (now.with_timezone(&self.tz) - TimeDelta::days(1)).date_naive();

        // Futures are built eagerly: keeping the `&Account` closure inside
        // `stream::iter` trips rustc's higher-ranked `FnOnce` check when the
        // scheduler future is spawned. `buffer_unordered` still bounds how
        // many run at once.
        let fetches: Vec<_> = self
            .roster
            .accounts()
            .iter()
            .map(|account| {
                let id = account.id.clone();
                let metrics = self.metrics.clone();
                let source = &self.source;
                async move {
                    let t0 = Instant::now();
                    let result = source.fetch(&id, since).await;
                    metrics.fetch_duration.record(t0.elapsed());
                    (id, result)
                }
            })
            .collect();
        let results = stream::iter(fetches)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut batches = Vec::with_capacity(results.len());
        let mut failures = 0usize;
        for (account, result) in results {
            match result {
                Ok(batch) => {
                    if let Some(m) = self.metrics.account(&account) {
                        m.fetches.fetch_add(1, Relaxed);
                    }
                    self.metrics.entries_dropped.fetch_add(batch.dropped, Relaxed);
                    batches.push((account, batch.entries));
                }
                Err(e) => {
                    failures += 1;
                    if let Some(m) = self.metrics.account(&account) {
                        m.errors.fetch_add(1, Relaxed);
                    }
                    warn!(account = %account, error = %e, "fetch failed, skipping account");
                }
            }
        }

        if batches.is_empty() {
            self.metrics.ticks_failed.fetch_add(1, Relaxed);
            warn!(failures, "every account fetch failed, keeping previous snapshot");
            return None;
        }

        let (snapshot, dropped) = aggregate::build_snapshot(batches, self.tz, now);
        self.metrics.entries_dropped.fetch_add(dropped, Relaxed);
        Some(snapshot)
    }
}
