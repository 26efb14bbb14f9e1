//! Wallet - ledger and transfer engine for the ride-hailing backend.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! wallet
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/wallet PENDING_TRANSFER_TTL_SECS=600 wallet
//!
//! # Local development without PostgreSQL
//! wallet --in-memory
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use wallet_core::metrics::init_metrics;
use wallet_core::pin::PinConfig;
use wallet_core::ports::LedgerStore;
use wallet_core::services::{PendingSweeper, PinPolicy, WalletConfig, WalletService};
use wallet_graphql::{ServerConfig, serve_with_shutdown};
use wallet_storage::{Database, DatabaseConfig, MemoryLedgerStore, PgLedgerStore};

/// Wallet CLI - ledger and transfer engine.
#[derive(Parser, Debug)]
#[command(name = "wallet")]
#[command(about = "Wallet ledger and transfer engine")]
#[command(version)]
struct Cli {
    /// PostgreSQL database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/wallet")]
    database_url: String,

    /// GraphQL server port.
    #[arg(long, env = "GRAPHQL_PORT", default_value = "4000")]
    graphql_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Age in seconds after which a pending transfer is cancelled.
    #[arg(long, env = "PENDING_TRANSFER_TTL_SECS", default_value = "900")]
    pending_ttl_secs: u64,

    /// Interval in seconds between expiry sweeps.
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "60")]
    sweep_interval_secs: u64,

    /// Upper bound in milliseconds on the two-wallet transfer commit.
    #[arg(long, env = "TX_TIMEOUT_MS", default_value = "5000")]
    tx_timeout_ms: u64,

    /// Minimum PIN length.
    #[arg(long, env = "MIN_PIN_LENGTH", default_value = "4")]
    min_pin_length: usize,

    /// Maximum PIN length.
    #[arg(long, env = "MAX_PIN_LENGTH", default_value = "12")]
    max_pin_length: usize,

    /// Refuse transfer confirmation until the sender has set a PIN.
    #[arg(long, env = "REQUIRE_PIN")]
    require_pin: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Keep wallets in memory instead of PostgreSQL. Data is lost on exit.
    #[arg(long, env = "IN_MEMORY")]
    in_memory: bool,
}

impl Cli {
    fn wallet_config(&self) -> WalletConfig {
        WalletConfig {
            pending_ttl: Duration::from_secs(self.pending_ttl_secs),
            transaction_timeout: Duration::from_millis(self.tx_timeout_ms),
            pin_policy: if self.require_pin {
                PinPolicy::Always
            } else {
                PinPolicy::RequireWhenSet
            },
            pin: PinConfig {
                min_length: self.min_pin_length,
                max_length: self.max_pin_length,
                ..PinConfig::default()
            },
            ..WalletConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => match PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            Ok(()) => {
                init_metrics();
                true
            }
            Err(e) => {
                warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                false
            }
        },
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Wallet engine");
    let config = cli.wallet_config();
    debug!(
        pending_ttl_secs = cli.pending_ttl_secs,
        tx_timeout_ms = cli.tx_timeout_ms,
        pin_policy = ?config.pin_policy,
        "Wallet configuration"
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ STORAGE
    // ─────────────────────────────────────────────────────────────────────────
    let (store, db): (Arc<dyn LedgerStore>, Option<Database>) = if cli.in_memory {
        if cli.migrate_only {
            info!("🛑 No migrations to run for the in-memory store, exiting");
            return Ok(());
        }
        warn!("⚠️  In-memory store selected, wallets are not persisted");
        (Arc::new(MemoryLedgerStore::new()), None)
    } else {
        debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");
        let db_config = DatabaseConfig::for_service(&cli.database_url, config.transaction_timeout);

        info!("🗄️  Connecting to database...");
        let db = Database::connect(&db_config)
            .await
            .context("Failed to connect to database")?;

        db.migrate().await.context("Failed to run migrations")?;
        info!("🗄️  Database ready (migrations applied)");

        if cli.migrate_only {
            info!("🛑 --migrate-only flag set, exiting");
            db.close().await;
            return Ok(());
        }
        (Arc::new(PgLedgerStore::new(&db)), Some(db))
    };

    let service = Arc::new(
        WalletService::new(config, store).context("Invalid wallet configuration")?,
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut graphql_shutdown_rx = shutdown_tx.subscribe();

    let graphql_config = ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.graphql_port,
        enable_playground: true,
    };

    let graphql_service = service.clone();
    let graphql_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*graphql_shutdown_rx.borrow() {
                    if graphql_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = serve_with_shutdown(graphql_service, graphql_config, shutdown_signal).await {
                error!(error = %e, "❌ Server error");
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("graphql")),
    );

    let sweeper = PendingSweeper::new(
        service.clone(),
        Duration::from_secs(cli.sweep_interval_secs.max(1)),
    );
    let sweeper_handle = tokio::spawn(
        async move { sweeper.run(shutdown_rx).await }.instrument(info_span!("sweeper")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Wallet ready");
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", cli.graphql_port);
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", cli.metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(10), sweeper_handle).await {
        Ok(_) => debug!("Sweeper stopped"),
        Err(_) => warn!("⚠️  Sweeper shutdown timed out"),
    }

    match tokio::time::timeout(Duration::from_secs(10), graphql_handle).await {
        Ok(_) => debug!("GraphQL stopped"),
        Err(_) => warn!("⚠️  GraphQL shutdown timed out"),
    }

    if let Some(db) = db {
        db.close().await;
    }

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "❌ Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "❌ Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
