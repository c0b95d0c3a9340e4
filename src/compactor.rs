use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::model::Ms;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once the log has grown by `threshold` commits since the last compaction.
/// Returns how many expired sessions were dropped, or `None` if below the threshold.
pub async fn compact_if_due(
    engine: &Engine,
    threshold: u64,
    session_retention_ms: Ms,
) -> Result<Option<usize>, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(None);
    }
    let cutoff = engine.now().saturating_sub(session_retention_ms);
    let dropped = engine.compact_wal(cutoff).await?;
    info!("compacted WAL after {appends} commit(s)");
    Ok(Some(dropped))
}

/// Background task that keeps the WAL bounded.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, session_retention_ms: Ms) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold, session_retention_ms).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ActivityCatalog;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomops_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(
            path,
            Arc::new(NotifyHub::new()),
            Arc::new(ActivityCatalog::default()),
        )
        .unwrap();

        let room = Ulid::new();
        engine.create_room(room, "101", 1).await.unwrap();
        assert_eq!(compact_if_due(&engine, 3, 0).await.unwrap(), None);

        engine
            .set_room_status(room, crate::model::RoomStatus::OutOfOrder)
            .await
            .unwrap();
        engine
            .set_room_status(room, crate::model::RoomStatus::Occupied)
            .await
            .unwrap();
        assert_eq!(compact_if_due(&engine, 3, 0).await.unwrap(), Some(0));
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(
            engine.get_room(room).await.unwrap().status,
            crate::model::RoomStatus::Occupied
        );
    }
}
