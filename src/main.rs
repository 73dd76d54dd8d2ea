//! OpenSASE Checkout - carts, coupons and order placement

use anyhow::{Context, Result};
use opensase_checkout::config::AppConfig;
use opensase_checkout::domain::aggregates::{Coupon, Product};
use opensase_checkout::domain::value_objects::{CouponCode, Money};
use opensase_checkout::http::{self, AppState};
use opensase_checkout::messaging::{EventPublisher, NatsPublisher, NoopPublisher};
use opensase_checkout::services::MockGateway;
use opensase_checkout::storage::{MemoryStore, PgStore, Store};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.store_timeout).await.context("connecting to Postgres")?;
            pg.migrate().await.context("running migrations")?;
            tracing::info!("using Postgres store");
            Arc::new(pg)
        }
        None => {
            let memory = MemoryStore::new();
            if config.seed_demo_data { seed_demo_data(&memory)?; }
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(memory)
        }
    };

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will be dropped");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    let state = AppState::new(&config, store, publisher, Arc::new(MockGateway::default()));
    let app = http::router(state);

    tracing::info!("🚀 OpenSASE Checkout listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

fn seed_demo_data(store: &MemoryStore) -> Result<()> {
    store.upsert_product(Product::create("tee-classic", "Classic Tee", Money::from_cents(2500))?.with_stock(100));
    store.upsert_product(Product::create("hoodie-zip", "Zip Hoodie", Money::from_cents(6000))?
        .with_sale_price(Money::from_cents(4800))?.with_stock(25));
    store.upsert_product(Product::create("cap-logo", "Logo Cap", Money::from_cents(1500))?.with_stock(5));
    store.upsert_coupon(Coupon::percentage(CouponCode::new("SAVE10")?, Decimal::TEN).with_max_discount(Money::from_cents(2000)));
    tracing::info!("seeded demo catalog");
    Ok(())
}
