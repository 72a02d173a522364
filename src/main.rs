//! Libris Server - library lending REST API

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    config::{AppConfig, LoggingConfig},
    create_router,
    repository::Repository,
    services::{
        email::EmailService,
        notifications::{NotificationDispatcher, NotificationWorker},
        overdue::OverdueSweep,
        redis::RedisNotificationQueue,
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let queue = RedisNotificationQueue::new(&config.redis.url, &config.redis.queue_prefix)
        .await
        .context("Failed to connect to Redis")?;

    tracing::info!(prefix = %config.redis.queue_prefix, "Connected to Redis");

    let repository = Repository::new(pool, config.database.lock_timeout_ms);
    let services = Services::new(repository, queue.clone(), config.loans.clone());

    // Background jobs
    let mailer = Arc::new(EmailService::new(&config.email).context("Failed to configure SMTP")?);
    let dispatcher = NotificationDispatcher::new(services.loan_store(), mailer);
    let worker = NotificationWorker::new(queue.clone(), dispatcher, config.jobs.clone()).spawn();

    let sweep_interval = Duration::from_secs(config.jobs.overdue_sweep_interval_secs.max(1));
    let sweep = OverdueSweep::new(services.loan_store(), Arc::new(queue)).spawn(sweep_interval);

    tracing::info!(interval_secs = sweep_interval.as_secs(), "Background jobs started");

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    worker.abort();
    sweep.abort();
    tracing::info!("Server stopped");

    Ok(())
}

/// Install the global subscriber; the returned guard flushes the log file on drop
fn init_tracing(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=info", logging.level).into());

    let (pretty, json) = if logging.format == "json" {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    let (file_writer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "libris.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file = file_writer.map(|writer| tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .init();

    guard
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received, stopping server");
}
