//! Checkout from the command line
//!
//! Opens the checkout surface for a screening, selects seats by label,
//! submits and prints the payment link with its QR image.
//!
//! # Usage
//!
//! ```bash
//! CINEPAY_API_BASE=http://localhost:5000 CINEPAY_ACCESS_TOKEN=... \
//!     cargo run --bin cinepay-checkout -- 12 90000 A1 A2
//! ```

use anyhow::{Context, bail};
use cinepay_api::{ApiStack, InMemoryTokenStorage, ResourceId, Tokens};
use cinepay_checkout::{
    CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState, CheckoutStore, Config, LayoutStatus,
    ScreeningRef,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SETTLE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinepay_checkout=debug,cinepay_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load();

    let mut args = std::env::args().skip(1);
    let Some(screening) = args.next() else {
        bail!("usage: cinepay-checkout <screening-id> [base-price] [seat labels...]");
    };
    let screening_id = ResourceId::parse(&screening).context("screening id must not be empty")?;
    let mut rest: Vec<String> = args.collect();
    let base_price = match rest.first().map(|s| s.parse::<u64>()) {
        Some(Ok(price)) => {
            rest.remove(0);
            Some(price)
        },
        _ => None,
    };

    let storage = InMemoryTokenStorage::with_tokens(Tokens {
        access: std::env::var("CINEPAY_ACCESS_TOKEN").ok(),
        refresh: std::env::var("CINEPAY_REFRESH_TOKEN").ok(),
    });
    let (api, _session) = ApiStack::connect(&config.api_base, config.request_timeout(), Arc::new(storage))?;

    let env = CheckoutEnvironment::new(api, config.clone());
    let store = CheckoutStore::new(CheckoutState::new(config.payment_provider), CheckoutReducer::new(), env);

    store
        .send(CheckoutAction::Open {
            screening: ScreeningRef {
                screening_id: Some(screening_id),
                room_id: None,
                base_price,
            },
        })
        .await?;
    store.settled(SETTLE).await?;

    let layout = store.state(|s| s.layout.clone()).await;
    let layout = match layout {
        LayoutStatus::Ready(layout) => layout,
        LayoutStatus::Unavailable(message) => bail!(message),
        LayoutStatus::Idle | LayoutStatus::Loading => bail!("seat map did not load"),
    };
    tracing::info!(seats = layout.seats.len(), rows = layout.rows, cols = layout.cols, "Seat map loaded");

    for label in &rest {
        let Some(seat) = layout.seats.iter().find(|s| s.label.eq_ignore_ascii_case(label)) else {
            tracing::warn!(%label, "No such seat");
            continue;
        };
        store.send(CheckoutAction::ToggleSeat { key: seat.key() }).await?;
    }

    if let Ok(code) = std::env::var("CINEPAY_PROMOTION_CODE") {
        store.send(CheckoutAction::SetPromotionCode { code }).await?;
        store.send(CheckoutAction::ApplyPromotion).await?;
        store.settled(SETTLE).await?;
        if let Some(error) = store.state(|s| s.promotion.error.clone()).await {
            tracing::warn!(%error, "Promotion not applied");
        }
    }

    let (summary, totals) = store.state(|s| (s.selection_summary(), s.client_totals())).await;
    tracing::info!(
        seats = %summary,
        subtotal = totals.subtotal,
        discount = totals.discount,
        total = totals.total,
        "Checking out"
    );

    store.send(CheckoutAction::Checkout).await?;
    store.settled(SETTLE).await?;

    let (link, qr, error, totals) = store
        .state(|s| (s.link.clone(), s.qr_image_url(), s.error.clone(), s.totals()))
        .await;
    if let Some(error) = error {
        bail!(error);
    }
    let link = link.context("no payment link was produced")?;

    tracing::info!(total = totals.total, url = %link.url, "Payment link ready");
    if let Some(qr) = qr {
        tracing::info!(%qr, "QR image");
    }

    store.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
