//! Walk through a payment return
//!
//! Starts a primary window listening for results, opens a gateway window
//! on the given landing query, lands it and logs the banner the primary
//! window ends up showing.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin cinepay-payment-result -- 'vnp_ResponseCode=00&vnp_TxnRef=CP-77'
//! ```

use anyhow::Context;
use cinepay_core::environment::{Clock, SystemClock};
use cinepay_payment_result::{ResultConfig, ResultListener, SecondaryContext, Site};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SETTLE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinepay_payment_result=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ResultConfig::load();
    let query = std::env::args().nth(1).unwrap_or_default();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let site = Site::new(config.app_origin.clone());
    let primary = site.window("/booking");
    let listener = ResultListener::new(&site, Arc::clone(&primary), config.clone(), Arc::clone(&clock));
    let handle = listener.start().await.context("starting the result listener")?;

    let landing = format!("{}?{}", config.return_path, query.trim_start_matches('?'));
    let popup = listener.open_secondary(landing).await?;
    let report = SecondaryContext::new(&site, Arc::clone(&popup), &config, clock).land().await;
    tracing::info!(
        delivered = ?report.delivered,
        failed = report.failed.len(),
        "Landing window published"
    );

    // The banner timer stays in flight, so wait for the result itself
    tokio::time::timeout(SETTLE, async {
        while listener.store().state(|s| s.processed).await == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .context("no payment result reached the primary window")?;

    if let Some(close) = report.close {
        close.await.context("closing the landing window")?;
    }

    match listener.banner().await {
        Some(banner) => tracing::info!(%banner, "Banner shown"),
        None => tracing::warn!("No banner shown"),
    }
    tracing::info!(
        location = %primary.location(),
        focused = primary.has_focus(),
        popup_closed = popup.is_closed(),
        "Primary window"
    );

    handle.stop();
    listener.store().shutdown(SETTLE).await?;
    Ok(())
}
