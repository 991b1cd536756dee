use axum::ServiceExt;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::normalize_path::NormalizePath;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quota_gate::config::{Config, CorsMode};
use quota_gate::quota::{QuotaTracker, SystemClock};
use quota_gate::{AppState, BUILD_TIME, GIT_HASH, VERSION, routes};

#[derive(Parser)]
#[command(name = "quota-gate")]
#[command(about = "Daily per-identity request quota gate")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "QUOTA_GATE_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "QUOTA_GATE_PORT")]
    port: Option<u16>,
}

/// Periodically evict ledger records idle for longer than the retention window.
fn spawn_retention_sweep(tracker: Arc<QuotaTracker>, every: Duration, retention_days: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; nothing is stale at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = tracker.evict_stale(retention_days);
            if evicted > 0 {
                info!(
                    "Evicted {} idle quota records ({} still tracked)",
                    evicted,
                    tracker.tracked_identities()
                );
            }
        }
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env().expect("Invalid configuration");
    let limits = config.load_limits().expect("Failed to load quota limits");

    info!(
        "Quota plans: {} (default {}), categories: {}",
        limits.rows().keys().copied().collect::<Vec<_>>().join(", "),
        limits.default_plan(),
        limits.categories().join(", ")
    );
    if config.reset_offset.local_minus_utc() != 0 {
        info!("Quota day rolls over at midnight UTC{}", config.reset_offset);
    }
    if config.trust_forwarded_for {
        warn!("Anonymous callers are keyed by x-forwarded-for; only enable behind a trusted proxy");
    }

    let tracker = Arc::new(QuotaTracker::with_clock(
        limits,
        Arc::new(SystemClock::new(config.reset_offset)),
    ));

    if config.sweep_interval_secs > 0 {
        spawn_retention_sweep(
            tracker.clone(),
            Duration::from_secs(config.sweep_interval_secs),
            config.retention_days,
        );
    } else {
        info!("Quota record eviction disabled; the ledger grows with every new identity");
    }

    let state = Arc::new(AppState {
        tracker,
        trust_forwarded_for: config.trust_forwarded_for,
    });

    match &config.cors_mode {
        CorsMode::AllowAll => info!("CORS: Allowing all origins"),
        CorsMode::LocalhostOnly => info!("CORS: Localhost only"),
        CorsMode::AllowList(list) => info!("CORS: Allowing origins: {:?}", list),
    }

    let app = NormalizePath::trim_trailing_slash(
        routes::build_router(state).layer(routes::cors_layer(&config.cors_mode)),
    );

    let host = args.host.unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");
    info!(
        "Starting quota-gate v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service_with_connect_info::<SocketAddr>(
            app,
        ),
    )
    .await
    .expect("Server error");
}
