//! Dashboard HTTP server.
//!
//! Serves the four projections as JSON, an SSE stream that fires once per
//! published snapshot, and the health/metrics endpoints. Handlers read the
//! current snapshot out of the watch channel (one `Arc` clone); they never
//! wait on the scheduler and the scheduler never waits on them.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::roster::Roster;
use crate::types::Snapshot;
use crate::views;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    pub roster: Arc<Roster>,
    pub metrics: Arc<Metrics>,
    /// Snapshots older than this are reported stale (two poll periods).
    pub stale_after: Duration,
}

impl AppState {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_rx.borrow().clone()
    }
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/accounts", get(accounts))
        .route("/api/trend", get(trend))
        .route("/api/last-readings", get(last_readings))
        .route("/api/swing-alerts", get(swing_alerts))
        .route("/api/patient", get(patient))
        .route("/api/status", get(status))
        .route("/api/refresh", get(refresh_stream))
        .route("/health", get(health))
        .route("/metrics", get(prom_metrics))
        .with_state(state)
}

/// Serve on a pre-bound listener until cancelled.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState, cancel: CancellationToken) {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .ok();
}

#[derive(Deserialize)]
struct AccountQuery {
    account: String,
}

async fn accounts(State(s): State<AppState>) -> Json<Vec<views::AccountOption>> {
    Json(views::account_options(&s.roster))
}

async fn trend(
    State(s): State<AppState>,
    Query(q): Query<AccountQuery>,
) -> Json<views::TrendSeries> {
    Json(views::trend(&s.snapshot(), &s.roster, &q.account))
}

async fn last_readings(State(s): State<AppState>) -> Json<Vec<views::LastReadingRow>> {
    Json(views::last_readings(&s.snapshot(), &s.roster))
}

async fn swing_alerts(State(s): State<AppState>) -> Json<Vec<views::SwingRow>> {
    Json(views::swing_alerts(&s.snapshot(), &s.roster))
}

async fn patient(
    State(s): State<AppState>,
    Query(q): Query<AccountQuery>,
) -> Result<Json<views::PatientRow>, StatusCode> {
    views::patient_info(&s.roster, &q.account)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn status(State(s): State<AppState>) -> Json<views::Status> {
    Json(views::status(
        &s.snapshot(),
        &s.roster,
        Utc::now(),
        s.stale_after,
    ))
}

/// One `refresh` event per published snapshot, carrying the refresh label.
/// The watch channel replays the current value first, so new subscribers
/// render immediately instead of waiting out a poll period.
async fn refresh_stream(
    State(s): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(s.snapshot_rx.clone()).map(|snapshot| {
        Ok(Event::default()
            .event("refresh")
            .data(snapshot.refresh_label()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health(State(s): State<AppState>) -> (StatusCode, &'static str) {
    let snapshot = s.snapshot();
    match snapshot.refreshed_at {
        None => (StatusCode::SERVICE_UNAVAILABLE, "DOWN\n"),
        Some(refreshed) => {
            if Utc::now().signed_duration_since(refreshed) > s.stale_after {
                (StatusCode::OK, "DEGRADED\n")
            } else {
                (StatusCode::OK, "OK\n")
            }
        }
    }
}

async fn prom_metrics(State(s): State<AppState>) -> String {
    s.metrics.to_prometheus()
}
