//! Cachelayer host process
//!
//! Runs the caching layer on the in-memory store until interrupted.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachelayer::{spawn_cleanup_task, CacheLayer, Config, InMemoryStore};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the in-memory store and the cache layer on top of it
/// 4. Start the TTL cleanup task and the write-behind failure logger
/// 5. Wait for SIGINT/SIGTERM, then drain write-behind and stop
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachelayer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cachelayer");

    let config = Config::from_env();
    info!(
        "Configuration loaded: prefix={}, default_ttl={}s, cleanup_interval={}s, write_behind_workers={}",
        config.key_prefix, config.default_ttl, config.cleanup_interval, config.write_behind_workers
    );

    let store = Arc::new(InMemoryStore::new());
    let layer = CacheLayer::from_config(&config, store.clone())?;

    let cleanup_handle = spawn_cleanup_task(store, config.cleanup_interval);
    info!("Background cleanup task started");

    let failure_handle = match layer.engine.write_behind() {
        Some(queue) => queue.take_failures().await.map(|mut failures| {
            tokio::spawn(async move {
                while let Some(failure) = failures.recv().await {
                    error!(
                        "Backing write for '{}' lost after {} attempt(s): {}",
                        failure.key, failure.attempts, failure.error
                    );
                }
            })
        }),
        None => None,
    };

    shutdown_signal().await?;

    cleanup_handle.abort();
    warn!("Cleanup task aborted");

    layer.shutdown().await;
    if let Some(handle) = failure_handle {
        handle.abort();
    }

    let stats = layer.stats();
    info!(
        "Shutdown complete: hits={}, misses={}, errors={}, hit_rate={:.3}",
        stats.hits, stats.misses, stats.errors, stats.hit_rate
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
