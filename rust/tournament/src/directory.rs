use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use shortdeck_engine::player::{PlayerAction, PlayerId};
use shortdeck_engine::{GameEvent, GameState, PublicState};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::errors::TournamentError;
use crate::event_log::EventRecord;
use crate::events::{EventBus, EventSubscription};
use crate::persister::{PersistStats, Persister, RetryPolicy, Storage};
use crate::process::{Command, ProcessContext, ProcessHandle, Reply, TournamentProcess};
use crate::recovery::{Recovered, RecoveryCoordinator, RecoveryError};
use crate::settings::EngineSettings;
use crate::snapshot::SnapshotPolicy;
use crate::TournamentId;

/// Outcome of an explicit [`TournamentDirectory::recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub last_sequence: u64,
    pub from_snapshot: Option<u64>,
}

/// Maps tournament ids to their running processes.
///
/// Cheap to clone; every clone shares the same processes. Commands for a
/// tournament whose process is missing or has stopped restart it from storage
/// first.
#[derive(Clone)]
pub struct TournamentDirectory {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    settings: EngineSettings,
    storage: Storage,
    recovery: RecoveryCoordinator,
    bus: EventBus,
    processes: RwLock<HashMap<TournamentId, ProcessHandle>>,
}

impl std::fmt::Debug for TournamentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TournamentDirectory")
            .field("settings", &self.inner.settings)
            .field("running", &self.running().len())
            .finish()
    }
}

impl TournamentDirectory {
    /// Directory over in-memory storage, keyed by the configured shard keys.
    pub fn new(settings: EngineSettings) -> Result<Self, TournamentError> {
        let keyring = settings
            .keyring()
            .map_err(|e| TournamentError::InvalidSetup(e.to_string()))?;
        Self::with_storage(settings, Storage::in_memory(keyring))
    }

    /// Directory over the given storage. Settings are validated first.
    pub fn with_storage(
        settings: EngineSettings,
        storage: Storage,
    ) -> Result<Self, TournamentError> {
        settings
            .validate()
            .map_err(|e| TournamentError::InvalidSetup(e.to_string()))?;
        let bus = EventBus::with_capacity(settings.event_channel_capacity);
        Ok(Self {
            inner: Arc::new(DirectoryInner {
                recovery: RecoveryCoordinator::new(storage.clone()),
                settings,
                storage,
                bus,
                processes: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn event_bus(&self) -> EventBus {
        self.inner.bus.clone()
    }

    /// Seats the players in the given order and starts the tournament process.
    pub async fn create(
        &self,
        players: Vec<(PlayerId, u64)>,
    ) -> Result<TournamentId, TournamentError> {
        let settings = &self.inner.settings;
        if players.len() > settings.max_players {
            return Err(TournamentError::InvalidSetup(format!(
                "at most {} players allowed, got {}",
                settings.max_players,
                players.len()
            )));
        }
        let player_count = players.len();
        let (state, created) =
            GameState::create(players, settings.small_blind, settings.big_blind)?;
        let id = Uuid::new_v4().to_string();

        {
            let mut guard = self
                .inner
                .processes
                .write()
                .map_err(|_| TournamentError::StoragePoisoned)?;
            match guard.entry(id.clone()) {
                Entry::Occupied(_) => return Err(TournamentError::AlreadyExists(id)),
                Entry::Vacant(slot) => {
                    slot.insert(self.spawn(id.clone(), state, 0, vec![created]));
                }
            }
        }

        tracing::info!(
            tournament_id = %id,
            players = player_count,
            small_blind = settings.small_blind,
            big_blind = settings.big_blind,
            "tournament created"
        );
        Ok(id)
    }

    pub async fn start_hand(&self, id: &str) -> Result<Vec<EventRecord>, TournamentError> {
        self.request(id, |reply| Command::StartHand { reply }).await
    }

    pub async fn action(
        &self,
        id: &str,
        player_id: &PlayerId,
        action: PlayerAction,
    ) -> Result<Vec<EventRecord>, TournamentError> {
        self.request(id, |reply| Command::Action {
            player_id: player_id.clone(),
            action,
            reply,
        })
        .await
    }

    /// Public state as `viewer` may see it; `None` sees no hole cards.
    pub async fn public_state(
        &self,
        id: &str,
        viewer: Option<&PlayerId>,
    ) -> Result<PublicState, TournamentError> {
        self.request(id, |reply| Command::PublicState {
            viewer: viewer.cloned(),
            reply,
        })
        .await
    }

    /// Running tournaments plus any with stored history, sorted.
    pub fn list_tournaments(&self) -> Result<Vec<TournamentId>, TournamentError> {
        let mut ids: BTreeSet<TournamentId> = self.running().into_iter().collect();
        ids.extend(self.inner.storage.event_log.tournaments()?);
        Ok(ids.into_iter().collect())
    }

    pub fn subscribe(&self, id: &str) -> EventSubscription {
        self.inner.bus.subscribe(id.to_string())
    }

    /// Waits until everything the tournament has published so far is stored.
    pub async fn flush(&self, id: &str) -> Result<PersistStats, TournamentError> {
        let persister = {
            let guard = self
                .inner
                .processes
                .read()
                .map_err(|_| TournamentError::StoragePoisoned)?;
            guard
                .get(id)
                .map(|handle| handle.persister.clone())
                .ok_or_else(|| TournamentError::NotFound(id.to_string()))?
        };
        persister
            .flush()
            .await
            .ok_or_else(|| TournamentError::Unavailable(id.to_string()))
    }

    /// Stops the tournament and deletes its events, snapshots and shards.
    pub async fn retire(&self, id: &str) -> Result<(), TournamentError> {
        let handle = self.take(id)?;
        match handle {
            Some(handle) => {
                drop(handle.tx);
                if let Err(err) = handle.task.await {
                    tracing::warn!(tournament_id = %id, error = %err, "process ended abnormally");
                }
                handle.persister.retire().await;
            }
            None => {
                if self.inner.storage.event_log.last_sequence(id)? == 0 {
                    return Err(TournamentError::NotFound(id.to_string()));
                }
                self.inner.storage.secrets.retire(id);
                self.inner.storage.snapshots.remove(id)?;
                self.inner.storage.event_log.remove(id)?;
            }
        }
        self.inner.bus.drop_tournament(id);
        tracing::info!(tournament_id = %id, "tournament retired");
        Ok(())
    }

    /// Drops the in-memory process the way a crash would. Writes already
    /// handed to the persister are allowed to finish.
    pub async fn evict(&self, id: &str) -> Result<(), TournamentError> {
        let handle = self
            .take(id)?
            .ok_or_else(|| TournamentError::NotFound(id.to_string()))?;
        Self::shut_down(id, handle).await;
        tracing::info!(tournament_id = %id, "tournament evicted");
        Ok(())
    }

    /// Rebuilds the tournament from storage and replaces any running process.
    pub async fn recover(&self, id: &str) -> Result<RecoveryReport, TournamentError> {
        if let Some(handle) = self.take(id)? {
            Self::shut_down(id, handle).await;
        }
        let recovered = self.recover_state(id)?;
        let report = RecoveryReport {
            last_sequence: recovered.last_sequence,
            from_snapshot: recovered.from_snapshot,
        };
        self.install(id, recovered.state, recovered.last_sequence)?;
        Ok(report)
    }

    fn running(&self) -> Vec<TournamentId> {
        match self.inner.processes.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn spawn(
        &self,
        id: TournamentId,
        state: GameState,
        last_sequence: u64,
        pending: Vec<GameEvent>,
    ) -> ProcessHandle {
        let settings = &self.inner.settings;
        let (persister, _) = Persister::spawn(
            id.clone(),
            self.inner.storage.clone(),
            SnapshotPolicy::new(settings.snapshot_interval),
            RetryPolicy::new(settings.persist_retry_attempts, settings.retry_backoff()),
        );
        TournamentProcess::spawn(
            id,
            state,
            last_sequence,
            pending,
            ProcessContext {
                bus: self.inner.bus.clone(),
                persister,
                shuffle_seed: settings.shuffle_seed,
                inbox_capacity: settings.inbox_capacity,
            },
        )
    }

    /// Inserts a process for recovered state unless a live one appeared meanwhile.
    fn install(
        &self,
        id: &str,
        state: GameState,
        last_sequence: u64,
    ) -> Result<mpsc::Sender<Command>, TournamentError> {
        let mut guard = self
            .inner
            .processes
            .write()
            .map_err(|_| TournamentError::StoragePoisoned)?;
        match guard.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_running() {
                    return Ok(slot.get().tx.clone());
                }
                let handle = self.spawn(id.to_string(), state, last_sequence, Vec::new());
                let tx = handle.tx.clone();
                slot.insert(handle);
                Ok(tx)
            }
            Entry::Vacant(slot) => {
                let handle = self.spawn(id.to_string(), state, last_sequence, Vec::new());
                Ok(slot.insert(handle).tx.clone())
            }
        }
    }

    /// Inbox of a running process, recovering the tournament first if needed.
    async fn sender(&self, id: &str) -> Result<mpsc::Sender<Command>, TournamentError> {
        let stale = {
            let guard = self
                .inner
                .processes
                .read()
                .map_err(|_| TournamentError::StoragePoisoned)?;
            match guard.get(id) {
                Some(handle) if handle.is_running() => return Ok(handle.tx.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if stale {
            tracing::warn!(tournament_id = %id, "tournament process stopped, restarting");
            if let Some(handle) = self.take(id)? {
                Self::shut_down(id, handle).await;
            }
        }
        let recovered = self.recover_state(id)?;
        self.install(id, recovered.state, recovered.last_sequence)
    }

    fn recover_state(&self, id: &str) -> Result<Recovered, TournamentError> {
        self.inner.recovery.recover(id).map_err(|err| match err {
            RecoveryError::NotFound(id) => TournamentError::NotFound(id),
            other => other.into(),
        })
    }

    async fn request<T>(
        &self,
        id: &str,
        make: impl Fn(Reply<T>) -> Command,
    ) -> Result<T, TournamentError> {
        // one retry covers a process that stopped between lookup and send
        for _ in 0..2 {
            let tx = self.sender(id).await?;
            let (reply, rx) = oneshot::channel();
            if tx.send(make(reply)).await.is_err() {
                continue;
            }
            return rx
                .await
                .map_err(|_| TournamentError::Unavailable(id.to_string()))?;
        }
        Err(TournamentError::Unavailable(id.to_string()))
    }

    fn take(&self, id: &str) -> Result<Option<ProcessHandle>, TournamentError> {
        let mut guard = self
            .inner
            .processes
            .write()
            .map_err(|_| TournamentError::StoragePoisoned)?;
        Ok(guard.remove(id))
    }

    async fn shut_down(id: &str, handle: ProcessHandle) {
        handle.task.abort();
        let _ = handle.task.await;
        if let Some(stats) = handle.persister.flush().await {
            tracing::debug!(
                tournament_id = %id,
                appended = stats.appended,
                failures = stats.failures,
                "pending writes settled"
            );
        }
    }
}
