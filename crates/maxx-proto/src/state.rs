use crate::catalog::CatalogEntry;
use crate::machine::Phase;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Committed view of the playback state.  Cheap to clone; the entry list is
/// shared.  `rev` is a monotonically increasing counter bumped on every
/// publish, so readers can tell whether anything changed since their last
/// frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub rev: u64,
    pub phase: Phase,
    pub query: Option<String>,
    pub entries: Arc<Vec<CatalogEntry>>,
    /// Always `< entries.len()` when entries is non-empty.
    pub selection: usize,
    /// Title of the entry being played.
    pub playing: Option<String>,
    /// Quality label the playback settled on.
    pub quality: Option<String>,
    /// Sequence marker of the last applied remote command.
    pub last_seq: u64,
    pub last_error: Option<String>,
}

impl Snapshot {
    pub fn selected(&self) -> Option<&CatalogEntry> {
        self.entries.get(self.selection)
    }
}

/// Single-writer publication point for snapshots.
///
/// The owner of the state machine calls `publish`; any number of readers hold
/// a `StateReader` and read the latest snapshot without blocking.
pub struct StateManager {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl StateManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Snapshot::default()));
        Self { tx }
    }

    /// Commit a new snapshot.  Returns the revision it was stored under.
    pub fn publish(&self, mut snapshot: Snapshot) -> u64 {
        let rev = self.tx.borrow().rev + 1;
        snapshot.rev = rev;
        self.tx.send_replace(Arc::new(snapshot));
        rev
    }

    pub fn get_state(&self) -> Arc<Snapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking view onto the latest committed snapshot.
#[derive(Clone)]
pub struct StateReader {
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl StateReader {
    /// Latest snapshot, whether or not it changed.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Latest snapshot if it changed since the last call, otherwise `None`
    /// (the caller keeps drawing what it has).
    pub fn fresh(&mut self) -> Option<Arc<Snapshot>> {
        match self.rx.has_changed() {
            Ok(true) => Some(Arc::clone(&self.rx.borrow_and_update())),
            _ => None,
        }
    }

    /// Wait until a newer snapshot is committed.  Errors when the writer is gone.
    pub async fn changed(&mut self) -> anyhow::Result<Arc<Snapshot>> {
        self.rx.changed().await?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_bumps_revision() {
        let manager = StateManager::new();
        assert_eq!(manager.get_state().rev, 0);
        assert_eq!(manager.publish(Snapshot::default()), 1);
        assert_eq!(manager.publish(Snapshot::default()), 2);
        assert_eq!(manager.get_state().rev, 2);
    }

    #[test]
    fn test_reader_fresh_only_once_per_publish() {
        let manager = StateManager::new();
        let mut reader = manager.reader();
        assert!(reader.fresh().is_none());

        manager.publish(Snapshot {
            selection: 3,
            ..Snapshot::default()
        });
        let snap = reader.fresh().unwrap();
        assert_eq!(snap.selection, 3);
        assert!(reader.fresh().is_none());
        assert_eq!(reader.snapshot().selection, 3);
    }

    #[tokio::test]
    async fn test_reader_waits_for_change() {
        let manager = Arc::new(StateManager::new());
        let mut reader = manager.reader();
        let writer = Arc::clone(&manager);
        tokio::spawn(async move {
            writer.publish(Snapshot {
                last_seq: 9,
                ..Snapshot::default()
            });
        });
        let snap = reader.changed().await.unwrap();
        assert_eq!(snap.last_seq, 9);
    }
}
