//! Debounced background saving.

use std::sync::Arc;
use std::time::Duration;

use intake_spec::FormSnapshot;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::persistence::{SnapshotStore, StoreError};

enum Command {
    Save(FormSnapshot),
    Flush(oneshot::Sender<Result<(), StoreError>>),
    Clear(oneshot::Sender<Result<(), StoreError>>),
}

/// Collapses bursts of changes into one write, no sooner than the quiet
/// interval after the last change. Every command goes through one task, so a
/// `clear` can never be overtaken by an older pending save.
pub struct AutoSaver {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl AutoSaver {
    pub fn spawn(store: Arc<dyn SnapshotStore>, quiet: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(store, quiet, rx));
        Self { tx, task }
    }

    /// Queues `snapshot`, replacing any write that has not happened yet.
    pub fn schedule(&self, snapshot: FormSnapshot) {
        if self.tx.send(Command::Save(snapshot)).is_err() {
            warn!("auto-save task is gone; change not persisted");
        }
    }

    /// Writes the pending snapshot now, if there is one.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.request(Command::Flush).await
    }

    /// Drops the pending snapshot and deletes the saved one.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.request(Command::Clear).await
    }

    async fn request(
        &self,
        command: fn(oneshot::Sender<Result<(), StoreError>>) -> Command,
    ) -> Result<(), StoreError> {
        let (reply, done) = oneshot::channel();
        if self.tx.send(command(reply)).is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }

    /// Flushes and stops the background task.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        let flushed = self.flush().await;
        drop(self.tx);
        if let Err(err) = self.task.await {
            warn!(error = %err, "auto-save task ended abnormally");
        }
        flushed
    }
}

async fn run(
    store: Arc<dyn SnapshotStore>,
    quiet: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<FormSnapshot> = None;
    let timer = sleep(quiet);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Save(snapshot)) => {
                    pending = Some(snapshot);
                    timer.as_mut().reset(Instant::now() + quiet);
                }
                Some(Command::Flush(reply)) => {
                    let result = match pending.take() {
                        Some(snapshot) => store.save(&snapshot).await,
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
                Some(Command::Clear(reply)) => {
                    pending = None;
                    let _ = reply.send(store.clear().await);
                }
                None => break,
            },
            () = &mut timer, if pending.is_some() => {
                if let Some(snapshot) = pending.take() {
                    debug!(fields = snapshot.len(), "auto-saving form");
                    if let Err(err) = store.save(&snapshot).await {
                        warn!(error = %err, "auto-save failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemorySnapshotStore;
    use intake_spec::FieldValue;

    fn snapshot(age: &str) -> FormSnapshot {
        let mut snapshot = FormSnapshot::new();
        snapshot.set("age", FieldValue::one(age));
        snapshot
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_write() {
        let store = Arc::new(MemorySnapshotStore::new());
        let saver = AutoSaver::spawn(store.clone(), Duration::from_millis(1000));

        for age in ["3", "34", "345"] {
            saver.schedule(snapshot(age));
            sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(store.writes(), 0);

        sleep(Duration::from_millis(800)).await;
        assert_eq!(store.writes(), 1);
        assert_eq!(store.current(), Some(snapshot("345")));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_the_pending_write() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot("40")));
        let saver = AutoSaver::spawn(store.clone(), Duration::from_millis(1000));

        saver.schedule(snapshot("41"));
        saver.clear().await.expect("clear");
        sleep(Duration::from_secs(5)).await;

        assert_eq!(store.writes(), 0);
        assert_eq!(store.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_changes() {
        let store = Arc::new(MemorySnapshotStore::new());
        let saver = AutoSaver::spawn(store.clone(), Duration::from_millis(1000));

        saver.schedule(snapshot("52"));
        saver.shutdown().await.expect("shutdown");

        assert_eq!(store.writes(), 1);
        assert_eq!(store.current(), Some(snapshot("52")));
    }
}
