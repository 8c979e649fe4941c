//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, InMemoryCollaborators};
use checkout::collaborators::Collaborators;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use stock_ledger::{InMemoryStockLedger, PostgresStockLedger, StockLedger};
use sweeper::{AutoReleaser, PromoSweeper, SweepConfig, TaskWorker, WorkerConfig};
use task_queue::{InMemoryTaskQueue, PostgresTaskQueue, TaskQueue};
use tokio::signal;
use tokio::sync::watch;
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
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    // 3. Pick the storage backend
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to database");
            let ledger = PostgresStockLedger::new(pool.clone());
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL ledger and task queue");
            serve(
                Arc::new(ledger),
                Arc::new(PostgresTaskQueue::new(pool)),
                config,
                metrics_handle,
            )
            .await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; stock and tasks are kept in memory");
            serve(
                Arc::new(InMemoryStockLedger::new()),
                Arc::new(InMemoryTaskQueue::new()),
                config,
                metrics_handle,
            )
            .await;
        }
    }
}

async fn serve<L: StockLedger + 'static>(
    ledger: Arc<L>,
    queue: Arc<dyn TaskQueue>,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    // 4. Collaborators, background workers and application state
    let in_memory = InMemoryCollaborators::new();
    let collaborators: Collaborators = in_memory.collaborators();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = TaskWorker::new(
        Arc::clone(&queue),
        AutoReleaser::new(
            Arc::clone(&ledger),
            Arc::clone(&collaborators.orders),
            Arc::clone(&collaborators.notifier),
        ),
        Arc::clone(&collaborators.notifier),
        WorkerConfig {
            poll_interval: config.worker_poll_interval,
            ..WorkerConfig::default()
        },
    );
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    let sweeper = PromoSweeper::new(
        Arc::clone(&collaborators.carts),
        Arc::clone(&collaborators.promotions),
        Arc::new(in_memory.activity.clone()),
        SweepConfig {
            interval: config.promo_sweep_interval,
            ..SweepConfig::default()
        },
    );
    let sweeper_handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let state = Arc::new(AppState::new(
        ledger,
        collaborators,
        queue,
        config.checkout(),
    ));

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop background work after in-flight requests have finished
    let _ = shutdown_tx.send(true);
    for (name, handle) in [("task worker", worker_handle), ("promo sweep", sweeper_handle)] {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, task = name, "background task panicked");
        }
    }

    tracing::info!("server shut down gracefully");
}
