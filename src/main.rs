//! Trendify Commerce server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trendify_commerce::config::Config;
use trendify_commerce::gateway::{PaymentGateway, PaystackClient};
use trendify_commerce::http::{build_router, AppState};
use trendify_commerce::service::{spawn_sweeper, CommerceService, EventPublisher};
use trendify_commerce::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    info!(?config, "configuration loaded");

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url, 10).await.context("connecting to database")?;
            pg.migrate().await.context("running migrations")?;
            Arc::new(pg)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "NATS unavailable; events will not be published");
                None
            }
        },
        None => None,
    };

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(PaystackClient::new_with_base_url(config.paystack_secret_key.clone(), config.paystack_base_url.clone()));
    let service = Arc::new(CommerceService::new(store, gateway, EventPublisher::new(nats), Arc::clone(&config)));
    spawn_sweeper(Arc::clone(&service), Duration::from_secs(config.sweep_interval_secs.max(1)));

    let app = build_router(AppState::new(service, Arc::clone(&config))).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Trendify Commerce listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server crashed")?;
    Ok(())
}
