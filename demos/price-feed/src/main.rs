//! Price feed demo.
//!
//! Submits exchange-rate requests for a handful of dates through the oracle relay,
//! lets a simulated service call back, then prints the resulting history.
//!
//! # Running
//!
//! ```bash
//! cargo run -p price-feed
//! ```
//!
//! Settings are read from `ORACLE_*` environment variables (or a `.env` file).

mod simulated;

use oracle_relay_core::types::Originator;
use oracle_relay_runtime::metrics::install_prometheus_recorder;
use oracle_relay_runtime::{Config, OracleEnvironment, OracleStore, SubmitRequest};
use simulated::{LoggingArchive, SimulatedTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DATES: &[&str] = &["2025-01-13", "2025-01-14", "2025-01-15", "2025-01-16"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "price_feed=info,oracle_relay_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = install_prometheus_recorder()?;

    let config = Config::from_env();
    info!(
        endpoint_id = %config.request.endpoint_id,
        subscription_id = config.request.subscription_id,
        compute_budget = config.request.compute_budget,
        "Configuration loaded"
    );

    let (callbacks, fulfillments) = mpsc::channel(64);
    let transport = Arc::new(SimulatedTransport::new(callbacks, 0.1));
    let env = OracleEnvironment::production(transport).with_archive_sink(Arc::new(LoggingArchive));
    let store = OracleStore::new(&config, env)?;

    let consumer = tokio::spawn({
        let store = store.clone();
        async move { store.consume_fulfillments(fulfillments).await }
    });
    let watchdog = store.spawn_retention_watchdog(config.retention.sweep_interval);

    let mut submitted = Vec::new();
    for date in DATES {
        submitted.push(store.submit(*date).await?);
    }
    submitted.push(
        store
            .submit_as(
                SubmitRequest::new(Originator::new("treasury"), "2025-01-17")
                    .with_secondary_key("USD"),
            )
            .await?,
    );
    // Same date again: the index moves to the new request, the old entry stays.
    submitted.push(store.submit(DATES[0]).await?);

    info!(count = submitted.len(), "Requests submitted, waiting for callbacks");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut waiting = 0;
        for request_id in &submitted {
            if !store.status(request_id).await.fulfilled {
                waiting += 1;
            }
        }
        if waiting == 0 || tokio::time::Instant::now() >= deadline {
            info!(waiting, "Done waiting for callbacks");
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    println!("{}", serde_json::to_string_pretty(&store.history_all().await?)?);

    let latest = store.entry_by_key(DATES[0]).await?;
    info!(date = DATES[0], rate = %latest.data, "Latest rate for date");
    if let Some(view) = store.last_fulfilled().await {
        info!(
            request_id = %view.request_id,
            lookup_key = %view.entry.lookup_key,
            "Most recently fulfilled request"
        );
    }

    println!("{}", metrics.render());

    store.shutdown(Duration::from_secs(5)).await?;
    consumer.abort();
    if let Some(watchdog) = watchdog {
        watchdog.await?;
    }

    Ok(())
}
