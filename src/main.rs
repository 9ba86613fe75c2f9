use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cgm_dashboard::config::Config;
use cgm_dashboard::fetch::ReadingsClient;
use cgm_dashboard::metrics::Metrics;
use cgm_dashboard::roster::Roster;
use cgm_dashboard::scheduler::Scheduler;
use cgm_dashboard::server::{self, AppState};
use cgm_dashboard::types::Snapshot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let tz = config.tz()?;
    info!(
        roster = %config.roster.display(),
        period_secs = config.period_secs,
        timezone = %config.timezone,
        port = config.port,
        "starting cgm dashboard"
    );

    // Roster problems are fatal: without accounts there is nothing to poll.
    let roster = Arc::new(Roster::load(&config.roster)?);

    // Bind the listener eagerly -- fail fast if the port is taken, before the
    // first poll round starts.
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "dashboard listening");

    let cancel = CancellationToken::new();

    // Register metrics -- one counter set per roster account.
    let metrics = Arc::new(Metrics::register(
        roster.accounts().iter().map(|a| a.id.clone()),
    ));

    // Watch channel for scheduler → handlers (latest-snapshot semantics).
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));

    let client = ReadingsClient::new(&config.upstream, config.fetch_timeout())?;
    let scheduler = Scheduler::new(
        client,
        roster.clone(),
        tz,
        config.period(),
        config.fetch_concurrency,
        metrics.clone(),
    );

    let scheduler_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(snapshot_tx, cancel).await })
    };

    let state = AppState {
        snapshot_rx,
        roster,
        metrics,
        stale_after: chrono::Duration::from_std(config.period().saturating_mul(2))?,
    };

    // Shutdown signal handler (SIGINT + SIGTERM).
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            )
            .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        #[cfg(not(unix))]
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
        info!("received shutdown signal, draining");
        shutdown_cancel.cancel();
    });

    // Serve (blocks until shutdown).
    server::serve(listener, state, cancel.clone()).await;

    // Wait for the pipeline to finish.
    let _ = tokio::join!(scheduler_handle);

    info!("shutdown complete");
    Ok(())
}
