use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use roomops::catalog::ActivityCatalog;
use roomops::config::Config;
use roomops::property::PropertyManager;
use roomops::sync::Board;

/// One line per board refresh: room count per display status.
fn summarize(board: &Board) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entry in board.iter() {
        *counts.entry(entry.display.label()).or_default() += 1;
    }
    let parts: Vec<String> = counts
        .into_iter()
        .map(|(label, n)| format!("{label}: {n}"))
        .collect();
    format!("{} room(s) [{}]", board.len(), parts.join(", "))
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    roomops::observability::init(config.metrics_port)?;

    let catalog = match &config.catalog_path {
        Some(path) => ActivityCatalog::load(path)?,
        None => ActivityCatalog::default(),
    };

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let manager = PropertyManager::new(
        config.data_dir.clone(),
        Arc::new(catalog),
        config.property_settings(),
    );
    let property = manager.get_or_create(&config.property)?;

    info!("roomops serving property {}", property.name);
    info!("  data_dir: {}", config.data_dir.display());
    info!("  catalog: {}", config.catalog_path.as_ref().map_or("built-in".to_string(), |p| p.display().to_string()));
    info!("  poll interval: {:?}", config.poll_interval);
    info!("  compact threshold: {} commits", config.compact_threshold);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut board = property.board.subscribe();

    loop {
        tokio::select! {
            changed = board.changed() => {
                if changed.is_err() {
                    tracing::warn!("board sync ended unexpectedly");
                    break;
                }
                let latest = board.borrow_and_update().clone();
                info!("board: {}", summarize(&latest));
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!("signal handler failed: {e}");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    // Leave a compact log behind for the next start
    let engine = &property.engine;
    if engine.wal_appends_since_compact().await > 0 {
        let cutoff = engine.now().saturating_sub(config.session_retention_ms);
        match engine.compact_wal(cutoff).await {
            Ok(_) => info!("final compaction done"),
            Err(e) => tracing::warn!("final compaction failed: {e}"),
        }
    }

    info!("roomops stopped");
    Ok(())
}
