use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shortdeck_engine::private_state::PrivateHandState;
use shortdeck_engine::GameState;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::event_log::{EventLog, EventRecord, MemoryEventLog, PersistenceError};
use crate::secret_store::{MemoryShardBackend, SecretStore, ShardKeyring};
use crate::snapshot::{MemorySnapshotStore, SnapshotOptions, SnapshotPolicy, SnapshotStore};
use crate::TournamentId;

/// The three persistence collaborators, shared by every tournament.
#[derive(Clone)]
pub struct Storage {
    pub event_log: Arc<dyn EventLog>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub secrets: SecretStore,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(
        event_log: Arc<dyn EventLog>,
        snapshots: Arc<dyn SnapshotStore>,
        secrets: SecretStore,
    ) -> Self {
        Self {
            event_log,
            snapshots,
            secrets,
        }
    }

    pub fn in_memory(keyring: ShardKeyring) -> Self {
        Self::new(
            Arc::new(MemoryEventLog::new()),
            Arc::new(MemorySnapshotStore::new()),
            SecretStore::new(Arc::new(MemoryShardBackend::new()), keyring),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per write, at least 1
    pub attempts: u32,
    /// Wait before retry `n` is `n * backoff`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }
}

/// Counters reported by [`PersisterHandle::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub appended: u64,
    pub snapshots: u64,
    pub shard_sets: u64,
    /// Writes that failed after every retry
    pub failures: u64,
    /// Events never written because the log had already failed
    pub dropped: u64,
    /// Set once an event or shard write is lost; later events are not appended
    pub degraded: bool,
}

pub(crate) enum PersistCommand {
    Shards {
        hand_number: u64,
        private: PrivateHandState,
    },
    Events {
        records: Vec<EventRecord>,
        state: Box<GameState>,
    },
    Flush(oneshot::Sender<PersistStats>),
    /// Deletes everything stored for the tournament and stops the task.
    Retire(oneshot::Sender<PersistStats>),
}

/// Sending side of a tournament's persister task.
#[derive(Debug, Clone)]
pub struct PersisterHandle {
    tournament_id: TournamentId,
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersisterHandle {
    pub(crate) fn send(&self, command: PersistCommand) {
        if self.tx.send(command).is_err() {
            tracing::error!(
                tournament_id = %self.tournament_id,
                "persister stopped, write discarded"
            );
        }
    }

    /// Waits until every earlier write has finished or failed.
    pub async fn flush(&self) -> Option<PersistStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(PersistCommand::Flush(reply)).ok()?;
        rx.await.ok()
    }

    pub(crate) async fn retire(&self) -> Option<PersistStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(PersistCommand::Retire(reply)).ok()?;
        rx.await.ok()
    }
}

/// Writes a tournament's events, snapshots and shards off the command path.
///
/// Commands are handled strictly in the order they were sent, so a hand's
/// shards land before its `HandStarted` event. A write that still fails after
/// every retry marks the persister degraded: it stops appending events so the
/// stored log remains a gap-free prefix of what was played.
pub(crate) struct Persister {
    tournament_id: TournamentId,
    storage: Storage,
    policy: SnapshotPolicy,
    retry: RetryPolicy,
    stats: PersistStats,
}

impl Persister {
    pub(crate) fn spawn(
        tournament_id: TournamentId,
        storage: Storage,
        policy: SnapshotPolicy,
        retry: RetryPolicy,
    ) -> (PersisterHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let persister = Self {
            tournament_id: tournament_id.clone(),
            storage,
            policy,
            retry,
            stats: PersistStats::default(),
        };
        let task = tokio::spawn(persister.run(rx));
        (PersisterHandle { tournament_id, tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PersistCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                PersistCommand::Shards {
                    hand_number,
                    private,
                } => self.write_shards(hand_number, &private).await,
                PersistCommand::Events { records, state } => {
                    self.write_events(&records, &state).await
                }
                PersistCommand::Flush(reply) => {
                    let _ = reply.send(self.stats);
                }
                PersistCommand::Retire(reply) => {
                    self.remove_all();
                    let _ = reply.send(self.stats);
                    return;
                }
            }
        }
        tracing::debug!(tournament_id = %self.tournament_id, "persister stopped");
    }

    async fn write_shards(&mut self, hand_number: u64, private: &PrivateHandState) {
        if self.stats.degraded {
            return;
        }
        let secrets = self.storage.secrets.clone();
        let tournament_id = self.tournament_id.clone();
        let result = self
            .with_retry("shard write", || {
                secrets.store(&tournament_id, hand_number, private)
            })
            .await;
        match result {
            Ok(()) => self.stats.shard_sets += 1,
            Err(err) => self.degrade(format!("hand {hand_number} shards: {err}")),
        }
    }

    async fn write_events(&mut self, records: &[EventRecord], state: &GameState) {
        if self.stats.degraded {
            self.stats.dropped += records.len() as u64;
            tracing::debug!(
                tournament_id = %self.tournament_id,
                count = records.len(),
                "persister degraded, events not appended"
            );
            return;
        }
        let log = Arc::clone(&self.storage.event_log);
        for record in records {
            let tournament_id = self.tournament_id.clone();
            let appended = self
                .with_retry("event append", || {
                    log.append(&tournament_id, &record.event, record.timestamp)
                })
                .await;
            let outcome = appended.and_then(|stored| {
                if stored.sequence == record.sequence {
                    Ok(())
                } else {
                    Err(PersistenceError::SequenceConflict {
                        expected: record.sequence,
                        found: stored.sequence,
                    })
                }
            });
            if let Err(err) = outcome {
                self.degrade(format!("event {}: {err}", record.sequence));
                return;
            }
            self.stats.appended += 1;
        }

        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return;
        };
        let opts = SnapshotOptions {
            force: false,
            key_moment: records.iter().any(|r| r.event.is_key_moment()),
        };
        if !self.policy.due(first.sequence, last.sequence, opts) {
            return;
        }
        let store = Arc::clone(&self.storage.snapshots);
        let tournament_id = self.tournament_id.clone();
        let policy = self.policy;
        let forced = SnapshotOptions { force: true, ..opts };
        let saved = self
            .with_retry("snapshot", || {
                policy.maybe_snapshot(store.as_ref(), &tournament_id, state, last.sequence, forced)
            })
            .await;
        match saved {
            Ok(_) => self.stats.snapshots += 1,
            Err(err) => {
                // replay from an older snapshot still works
                self.stats.failures += 1;
                tracing::error!(
                    tournament_id = %self.tournament_id,
                    sequence = last.sequence,
                    error = %err,
                    "snapshot failed after retries"
                );
            }
        }
    }

    fn remove_all(&self) {
        let id = &self.tournament_id;
        self.storage.secrets.retire(id);
        if let Err(err) = self.storage.snapshots.remove(id) {
            tracing::warn!(tournament_id = %id, error = %err, "failed to remove snapshots");
        }
        if let Err(err) = self.storage.event_log.remove(id) {
            tracing::warn!(tournament_id = %id, error = %err, "failed to remove event log");
        }
    }

    fn degrade(&mut self, detail: String) {
        self.stats.failures += 1;
        self.stats.degraded = true;
        tracing::error!(
            tournament_id = %self.tournament_id,
            detail = %detail,
            "persistence failed after retries, further events will not be stored"
        );
    }

    async fn with_retry<T, E, F>(&self, what: &'static str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retry.attempts => {
                    tracing::warn!(
                        tournament_id = %self.tournament_id,
                        operation = what,
                        attempt,
                        error = %err,
                        "persistence write failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
