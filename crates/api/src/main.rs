//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{EventPublisher, LogPublisher, NatsPublisher, OutboxWorker};
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Publishes to NATS when a server is configured, otherwise only logs events.
async fn build_publisher(config: &Config) -> Arc<dyn EventPublisher> {
    match &config.nats_url {
        Some(url) => {
            let publisher = NatsPublisher::connect(url, config.nats_subject.clone())
                .await
                .expect("failed to connect to NATS");
            tracing::info!(subject = %publisher.subject(), "publishing outbox events to NATS");
            Arc::new(publisher)
        }
        None => {
            tracing::info!("NATS_URL not set, outbox events are logged only");
            Arc::new(LogPublisher::new())
        }
    }
}

/// Serves the API over `store` and drains its outbox until shutdown.
async fn serve<S: Store>(config: Config, store: S, metrics_handle: PrometheusHandle) {
    let shutdown = CancellationToken::new();

    let worker = if config.outbox_enabled {
        let publisher = build_publisher(&config).await;
        let worker = OutboxWorker::new(store.clone(), publisher, config.outbox_worker_config());
        Some(worker.start(shutdown.clone()))
    } else {
        tracing::info!("outbox worker disabled");
        None
    };

    let state = api::create_state(store, config.drone_speed_mps);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    shutdown.cancel();
    if let Some(handle) = worker {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "outbox worker terminated abnormally");
        }
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and serve
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&url, config.database_max_connections)
                .await
                .expect("failed to connect to database");
            if config.migrate_on_start {
                store
                    .run_migrations()
                    .await
                    .expect("failed to apply database migrations");
            }
            tracing::info!("using PostgreSQL store");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(config, InMemoryStore::new(), metrics_handle).await;
        }
    }
}
