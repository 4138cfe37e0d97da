//! Playtime Tracker - Main entry point.
//!
//! `playtime-tracker` reads host events as JSON lines from stdin.
//! `playtime-tracker reconcile` repairs drifted totals and exits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playtime_engine::infrastructure::{
    clock::SystemClock,
    config::TrackerConfig,
    host_bridge,
    host_bus::InProcessEventBus,
    persistence::{open_repo, GatewayOptions},
};
use playtime_engine::use_cases::tracking::ReconcileTotals;
use playtime_engine::use_cases::{InitializeSchema, RetryConfig};
use playtime_engine::PlaytimeTracker;

const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    let config = TrackerConfig::from_env().context("loading tracker configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(enabled = config.enabled, "Starting Playtime Tracker");

    let repo = open_repo(&config.database_url, GatewayOptions::default())
        .context("opening playtime database")?;
    let retry_config = RetryConfig::default();
    tracing::info!(
        "Schema initialization configured with retry: max_retries={}, base_delay_ms={}",
        retry_config.max_retries,
        retry_config.base_delay_ms
    );

    // Maintenance pass: runs even when event tracking is disabled.
    if std::env::args().nth(1).as_deref() == Some("reconcile") {
        InitializeSchema::new(repo.clone(), retry_config)
            .execute()
            .await
            .context("initializing playtime schema")?;
        let drifts = ReconcileTotals::new(repo)
            .execute()
            .await
            .context("reconciling totals")?;
        tracing::info!(repaired = drifts.len(), "Totals reconciled");
        return Ok(());
    }

    let tracker = PlaytimeTracker::new(repo, Arc::new(SystemClock), config.enabled, retry_config);
    let bus = InProcessEventBus::new();

    tracker
        .enable(&bus)
        .await
        .context("initializing playtime schema")?;

    // Spawn periodic flush of deferred writes
    let flush_tracker = tracker.clone();
    let flush_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let report = flush_tracker.flush_pending().await;
            if report.written > 0 || report.dropped > 0 {
                tracing::info!(
                    written = report.written,
                    dropped = report.dropped,
                    remaining = report.remaining,
                    "Flushed deferred writes"
                );
            }
        }
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = host_bridge::run_json_lines(stdin, &bus) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Host bridge stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    flush_task.abort();
    let report = tracker.flush_pending().await;
    if report.remaining > 0 {
        tracing::error!(
            remaining = report.remaining,
            "Deferred writes could not be flushed before shutdown; data lost"
        );
    }
    tracker.disable(&bus).await;
    tracing::info!("Playtime Tracker stopped");
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides, then fall back to the working directory.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
    let _ = dotenvy::dotenv();
}
