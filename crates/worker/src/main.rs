//! AssisText billing sync worker
//!
//! Keeps a billing store warm for one account: loads every resource,
//! polls volatile ones when auto refresh is on, applies pushed events read
//! as JSON lines from stdin when real-time is on, and logs what changes.

mod report;

use std::sync::Arc;

use anyhow::Context;
use assistext_billing::{
    BillingEvent, BillingFacade, BillingOptions, DirectorySink, HttpBillingGateway, StoreEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,assistext_billing=debug"))?;
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    tracing::info!("Starting AssisText billing worker");

    let gateway = HttpBillingGateway::from_env().context("Failed to configure billing gateway")?;
    let options = BillingOptions::from_env();
    let download_dir = std::env::var("BILLING_DOWNLOAD_DIR")
        .map(Into::into)
        .unwrap_or_else(|_| std::env::temp_dir().join("assistext-billing"));

    tracing::info!(
        api_url = %gateway.config().base_url,
        auto_refresh = options.auto_refresh,
        refresh_interval = ?options.refresh_interval,
        real_time = options.enable_real_time,
        download_dir = %download_dir.display(),
        "Configuration loaded"
    );

    let facade = BillingFacade::builder(Arc::new(gateway))
        .downloads(Arc::new(DirectorySink::new(download_dir)))
        .options(options.clone())
        .build();

    let mut events = facade.subscribe();
    let snapshot = facade.load().await;
    log_summary(&snapshot);

    if options.enable_real_time {
        tokio::spawn(read_stdin_events(facade.clone()));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down billing worker");
                break;
            }
            event = events.recv() => match event {
                Ok(StoreEvent::Updated(key)) => {
                    tracing::info!(resource = %key, "Billing resource updated");
                    log_summary(&facade.snapshot());
                }
                Ok(StoreEvent::Failed { key, error }) => {
                    tracing::warn!(resource = %key, error = %error, "Billing resource failed to refresh");
                }
                Ok(StoreEvent::Closed) | Err(RecvError::Closed) => break,
                Ok(other) => tracing::trace!(event = ?other, "Store event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Store observer lagged");
                }
            }
        }
    }

    facade.shutdown();
    facade.store().close();
    Ok(())
}

fn log_summary(snapshot: &assistext_billing::BillingSnapshot) {
    let summary = report::summarize(snapshot);
    match serde_json::to_string(&summary) {
        Ok(json) => tracing::info!(summary = %json, "Billing snapshot"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize billing summary"),
    }
}

/// Apply one [`BillingEvent`] per stdin line until EOF
async fn read_stdin_events(facade: BillingFacade) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match BillingEvent::parse(&line) {
                Ok(event) => {
                    facade.apply_event(event);
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed billing event"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read billing events from stdin");
                break;
            }
        }
    }
    tracing::debug!("Billing event input closed");
}
