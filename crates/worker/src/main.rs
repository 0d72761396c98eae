use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vigil_cache::{CacheManager, RemoteCache};
use vigil_db::{PgCacheTier, PgReportStore, ReportStore};
use vigil_events::{
    BusNotifier, EmailConfig, EmailDelivery, EventBus, NotificationRouter, WebhookDelivery,
};
use vigil_pipeline::{
    Collaborators, DefaultChartGenerator, FileExporter, OfflineNarrativeGenerator, ReportPipeline,
    SnapshotDataCompiler,
};
use vigil_worker::background::cache_cleanup;
use vigil_worker::config::WorkerConfig;
use vigil_worker::dispatcher::ReportDispatcher;

const DEFAULT_LOG_FILTER: &str = "vigil_worker=debug,vigil_pipeline=debug";

/// How long in-flight reports get to finish after a shutdown signal.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        max_concurrent = config.max_concurrent_reports,
        poll_interval_secs = config.dispatch_poll_interval.as_secs(),
        remote_tier = config.cache_remote_tier,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = vigil_db::create_pool(&database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    vigil_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    // --- Cache ---
    let remote_tier = config
        .cache_remote_tier
        .then(|| Arc::new(PgCacheTier::new(pool.clone())));
    let cache = Arc::new(
        CacheManager::new(
            config.cache,
            remote_tier.clone().map(|tier| tier as Arc<dyn RemoteCache>),
        )
        .context("Invalid cache configuration")?,
    );
    tracing::info!("Cache manager created");

    let cancel = CancellationToken::new();

    // --- Event bus and notification routing ---
    let event_bus = Arc::new(EventBus::default());
    let router = build_notification_router(&config)?;
    let router_handle = tokio::spawn(router.run(event_bus.subscribe(), cancel.clone()));

    // --- Pipeline ---
    let store: Arc<dyn ReportStore> = Arc::new(PgReportStore::new(pool.clone()));
    let collaborators = Collaborators {
        compiler: Arc::new(SnapshotDataCompiler::new(config.inventory_snapshot.clone())),
        narrative: Arc::new(OfflineNarrativeGenerator::new()),
        charts: Arc::new(DefaultChartGenerator::new()),
        notifier: Arc::new(BusNotifier::new(Arc::clone(&event_bus))),
        exporter: Arc::new(FileExporter::new(config.export_dir.clone())),
    };
    let pipeline = Arc::new(
        ReportPipeline::new(
            store,
            Arc::clone(&cache),
            collaborators,
            config.pipeline.clone(),
        )
        .with_event_bus(Arc::clone(&event_bus)),
    );

    // --- Background tasks ---
    let dispatcher = ReportDispatcher::new(
        pipeline,
        config.dispatch_poll_interval,
        config.max_concurrent_reports,
    );
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_cancel).await;
    });

    let cleanup_handle = tokio::spawn(cache_cleanup::run(
        Arc::clone(&cache),
        remote_tier,
        config.cache_cleanup_interval,
        cancel.clone(),
    ));

    tracing::info!("Worker started (dispatcher, cache cleanup, notification router)");

    // --- Shutdown ---
    shutdown_signal().await;
    cancel.cancel();

    if tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("Dispatcher did not drain in time, abandoning in-flight reports");
    }
    let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, cleanup_handle).await;

    // The router stops on cancel; dropping the bus also closes its channel.
    drop(event_bus);
    let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, router_handle).await;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// `LOG_FORMAT=json` switches to the JSON formatter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Email when `SMTP_HOST` is set, webhook when `NOTIFICATION_WEBHOOK_URL`
/// is set. With neither, notifications are only logged.
fn build_notification_router(config: &WorkerConfig) -> anyhow::Result<NotificationRouter> {
    let mut router = NotificationRouter::new();

    if let Some(email) = EmailConfig::from_env() {
        tracing::info!(smtp_host = %email.smtp_host, "Email notifications enabled");
        router = router.with_email(EmailDelivery::new(email), config.default_recipient.clone());
    }

    if let Some(url) = &config.webhook_url {
        let webhook = WebhookDelivery::new().context("Failed to build webhook client")?;
        tracing::info!("Webhook notifications enabled");
        router = router.with_webhook(webhook, url.clone());
    }

    if !router.has_channels() {
        tracing::info!("No notification channels configured");
    }
    Ok(router)
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
