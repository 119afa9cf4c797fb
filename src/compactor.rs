use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's WAL once it has grown by
/// `threshold` appends since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = maybe_compact(&engine, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}

/// One compactor pass. Returns whether a compaction ran.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compactor: rewrote WAL after {appends} appends");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("classbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let engine = Engine::new(test_wal_path("threshold.wal")).unwrap();
        for i in 0..3 {
            let id = Ulid::new();
            engine.register_user(id, format!("user{i}"), Role::Student).await.unwrap();
            engine.remove_user(id).await.unwrap();
        }

        assert!(!maybe_compact(&engine, 10).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 6);

        assert!(maybe_compact(&engine, 6).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert!(engine.list_users().await.is_empty());
    }
}
