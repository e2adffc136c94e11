use std::sync::Arc;

use anyhow::{Context, Result};
use gleaner_core::app::Metrics;
use gleaner_core::cache::ContentCache;
use gleaner_core::impls::{HttpContentGenerator, HttpJobSource, HttpWebhookSender};
use gleaner_core::ports::{Clock, SystemClock};
use gleaner_core::store::JobStore;
use gleaner_core::{AppBuilder, Config};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gleaner_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        query = %config.search_query,
        interval_secs = config.polling_interval.as_secs(),
        threshold = config.high_value_threshold,
        "configuration loaded"
    );

    let profile = std::fs::read_to_string(&config.profile_path).with_context(|| {
        format!(
            "Failed to read freelancer profile at {}",
            config.profile_path.display()
        )
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Metrics::new().context("Failed to create metrics registry")?;

    let store = Arc::new(
        JobStore::open_with_clock(
            config.jobs_path(),
            config.max_generation_attempts,
            Arc::clone(&clock),
        )
        .context("Failed to open job store")?,
    );
    let cache = Arc::new(ContentCache::open(
        config.cache_path(),
        Arc::clone(&clock),
        metrics.clone(),
    ));

    let source = HttpJobSource::new(&config.source_url, config.request_timeout)
        .context("Failed to build listing client")?;
    let generator = HttpContentGenerator::new(&config.generator_url, config.request_timeout)
        .context("Failed to build generator client")?;
    let sender = HttpWebhookSender::new(&config.webhook_url, config.webhook_timeout)
        .context("Failed to build webhook client")?;

    let bind_addr = config.health_bind_addr;
    let app = AppBuilder::new(config)
        .store(store)
        .source(Arc::new(source))
        .generator(Arc::new(generator))
        .sender(Arc::new(sender))
        .cache(cache)
        .clock(clock)
        .metrics(metrics)
        .profile(profile)
        .build()
        .context("Failed to build application")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "health endpoint listening");

    let mut server_shutdown = shutdown_rx.clone();
    let router = app.router();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*server_shutdown.borrow() {
                    if server_shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    });

    let poller = Arc::clone(&app.poller);
    let poller_task = tokio::spawn(async move { poller.run(shutdown_rx).await });

    shutdown_signal().await;
    tracing::info!("shutdown requested, finishing the current tick");
    // ignore send error: receivers may already be dropped
    let _ = shutdown_tx.send(true);

    match poller_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "poller stopped with an error"),
        Err(e) => tracing::error!(error = %e, "poller task failed"),
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "health server stopped with an error"),
        Err(e) => tracing::error!(error = %e, "health server task failed"),
    }

    let counts = app.store.counts();
    tracing::info!(
        seen = counts.seen,
        processed = counts.processed,
        delivered = counts.delivered,
        skipped = counts.skipped,
        failed = counts.failed,
        "stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
