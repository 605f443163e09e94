//! Entry point for the Pincer egress boundary daemon: parse configuration,
//! set up logging the way `crates/arti/src/app/logging.rs` does, bootstrap
//! process state, and serve until interrupted.

mod auth;
mod cookies;
mod error;
mod routes;
mod state;

use clap::Parser;
use pincer_config::{Global, PincerConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, registry, util::SubscriberInitExt, EnvFilter};

use state::AppState;

fn setup_logging(config: &pincer_config::LoggingConfig) {
    let env_filter = EnvFilter::try_new(&config.trace_filter).unwrap_or_else(|_| {
        eprintln!("problem parsing traceFilter {:?}, falling back to default", config.trace_filter);
        EnvFilter::new("info")
    });
    registry().with(fmt::Layer::default()).with(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let global = Global::parse();
    let config: PincerConfig = global.try_into()?;
    setup_logging(&config.logging);

    let bind_addr = config.bind_addr;
    let state = std::sync::Arc::new(AppState::bootstrap(config)?);
    spawn_rate_limiter_eviction(state.clone());

    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "pincer listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically sweep rate limiter buckets more than a couple minutes old
/// so the per-action counter map doesn't grow without bound across the
/// life of a long-running process.
fn spawn_rate_limiter_eviction(state: std::sync::Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            state.limiter.evict_stale(now_ms);
        }
    });
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutting down gracefully");
}
