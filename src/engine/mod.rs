mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::BookingStore;

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock, RwLockReadGuard};

use crate::model::Event;
use crate::wal::Wal;

// ── WAL writer channel ───────────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL. Mutations hold the store's write lock
/// across their append, so appends arrive and are synced one at a time.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let start = Instant::now();
                let result = wal.append(&event);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    tracing::error!("WAL append failed: {e}");
                }
                let _ = response.send(result);
            }
            WalCommand::Compact { events, response } => {
                let result = Wal::write_compact_file(wal.path(), &events)
                    .and_then(|()| wal.swap_compact_file());
                let _ = response.send(result);
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
            }
        }
    }
}

/// The scheduling engine for one tenant.
///
/// All mutations run under the store's write lock from first check to apply,
/// so check-then-insert is serialized. Queries share the read lock.
pub struct Engine {
    pub(super) store: RwLock<BookingStore>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Needs a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut store = BookingStore::new();
        for event in &events {
            store.apply_event(event);
        }
        tracing::debug!("replayed {} events from {}", events.len(), wal_path.display());

        Ok(Self {
            store: RwLock::new(store),
            wal_tx,
        })
    }

    /// Shared view of the booking set for read-only queries.
    pub async fn read(&self) -> RwLockReadGuard<'_, BookingStore> {
        self.store.read().await
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Make `event` durable, then apply it. On WAL failure the store is untouched.
    pub(super) async fn persist_and_apply(
        &self,
        store: &mut BookingStore,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        store.apply_event(event);
        Ok(())
    }
}

/// Count and log a rejected scheduling call before handing it back.
pub(super) fn rejected<T>(op: &'static str, err: EngineError) -> Result<T, EngineError> {
    tracing::debug!(op, kind = err.kind(), "rejected: {err}");
    metrics::counter!(crate::observability::REJECTIONS_TOTAL, "kind" => err.kind()).increment(1);
    Err(err)
}
