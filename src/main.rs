use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gatekeeper::api::accounts::UnconfiguredAccounts;
use gatekeeper::api::rate_limit::KeyExtractor;
use gatekeeper::api::{self, auth, AppState, HttpServer};
use gatekeeper::config::GatekeeperConfig;
use gatekeeper::ratelimit::{LimitConfig, RateLimiter, Sweeper};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(about = "Rate-limited HTTP front door", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GatekeeperConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    info!(
        http_addr = %config.server.http_addr,
        window_ms = config.rate_limiting.window_ms,
        max_requests = config.rate_limiting.max_requests,
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(LimitConfig::from(&config.rate_limiting)));
    if !rate_limiter.is_enabled() {
        warn!("rate_limiting.max_requests is 0, rate limiting disabled");
    }
    let sweeper = Sweeper::spawn(rate_limiter.clone(), config.rate_limiting.sweep_interval());

    if config.auth.tokens.is_empty() {
        warn!("No auth tokens configured, protected routes will reject every request");
    }

    let state = AppState::new(
        rate_limiter,
        auth::from_tokens(&config.auth.tokens),
        Arc::new(UnconfiguredAccounts),
    )
    .with_key_extractor(KeyExtractor::new(config.rate_limiting.trust_forwarded_for));

    // User and movie resources are served by their own backends; none are
    // mounted here.
    let app = api::router(state, Router::new());

    let server = HttpServer::bind(config.server.http_addr, app).await?;
    info!("Listening on http://{}", server.local_addr()?);

    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.stop().await;
    info!("Gatekeeper stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gatekeeper=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_thread_ids(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true),
            )
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
