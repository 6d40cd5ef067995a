use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shortdeck_engine::GameState;
use thiserror::Error;

use crate::event_log::PersistenceError;
use crate::TournamentId;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot checksum mismatch at sequence {sequence}")]
    ChecksumMismatch { sequence: u64 },
    #[error("Unsupported snapshot schema version {0}")]
    UnsupportedSchema(u32),
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Public state of a tournament as of one event sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tournament_id: TournamentId,
    pub sequence: u64,
    pub schema_version: u32,
    pub taken_at: DateTime<Utc>,
    pub state: serde_json::Value,
    /// Hex SHA-256 over the canonical JSON of every other field
    pub checksum: String,
}

impl Snapshot {
    pub fn capture(
        tournament_id: &str,
        sequence: u64,
        state: &GameState,
    ) -> Result<Self, SnapshotError> {
        let mut snapshot = Self {
            tournament_id: tournament_id.to_string(),
            sequence,
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            taken_at: Utc::now(),
            state: serde_json::to_value(state)?,
            checksum: String::new(),
        };
        snapshot.checksum = snapshot.digest()?;
        Ok(snapshot)
    }

    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchema(self.schema_version));
        }
        if self.digest()? != self.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                sequence: self.sequence,
            });
        }
        Ok(())
    }

    /// Verifies the snapshot and rebuilds public state from it.
    pub fn restore(&self) -> Result<GameState, SnapshotError> {
        self.verify()?;
        Ok(serde_json::from_value(self.state.clone())?)
    }

    fn digest(&self) -> Result<String, SnapshotError> {
        // serde_json maps keep keys sorted, so this encoding is canonical
        let body = serde_json::json!({
            "tournament_id": self.tournament_id,
            "sequence": self.sequence,
            "schema_version": self.schema_version,
            "taken_at": self.taken_at,
            "state": self.state,
        });
        let bytes = serde_json::to_vec(&body)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Snapshot storage keyed by (tournament id, sequence).
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// Snapshot with the highest sequence, unverified.
    fn latest(&self, tournament_id: &str) -> Result<Option<Snapshot>, PersistenceError>;

    fn remove(&self, tournament_id: &str) -> Result<(), PersistenceError>;
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<TournamentId, BTreeMap<u64, Snapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, tournament_id: &str) -> usize {
        self.snapshots
            .read()
            .map(|guard| guard.get(tournament_id).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let mut guard = self
            .snapshots
            .write()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        guard
            .entry(snapshot.tournament_id.clone())
            .or_default()
            .insert(snapshot.sequence, snapshot.clone());
        Ok(())
    }

    fn latest(&self, tournament_id: &str) -> Result<Option<Snapshot>, PersistenceError> {
        let guard = self
            .snapshots
            .read()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        Ok(guard
            .get(tournament_id)
            .and_then(|by_seq| by_seq.values().next_back())
            .cloned())
    }

    fn remove(&self, tournament_id: &str) -> Result<(), PersistenceError> {
        let mut guard = self
            .snapshots
            .write()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        guard.remove(tournament_id);
        Ok(())
    }
}

/// Why a snapshot is being considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub force: bool,
    /// A hand boundary or tournament start was among the new events
    pub key_moment: bool,
}

/// When to take snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Every this many events; 0 disables interval snapshots
    pub interval: u64,
}

impl SnapshotPolicy {
    pub fn new(interval: u64) -> Self {
        Self { interval }
    }

    /// Whether a batch of events ending at `last` (and starting after `first - 1`)
    /// should be followed by a snapshot.
    pub fn due(&self, first: u64, last: u64, opts: SnapshotOptions) -> bool {
        if opts.force || opts.key_moment {
            return true;
        }
        self.interval > 0 && first <= last && (first..=last).any(|seq| seq % self.interval == 0)
    }

    /// Captures and saves a snapshot of `state` at `sequence` when due.
    pub fn maybe_snapshot(
        &self,
        store: &dyn SnapshotStore,
        tournament_id: &str,
        state: &GameState,
        sequence: u64,
        opts: SnapshotOptions,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        if !self.due(sequence, sequence, opts) {
            return Ok(None);
        }
        let snapshot = Snapshot::capture(tournament_id, sequence, state)?;
        store.save(&snapshot)?;
        tracing::debug!(
            tournament_id = %tournament_id,
            sequence,
            "snapshot saved"
        );
        Ok(Some(snapshot))
    }
}

/// Latest snapshot that passes verification.
///
/// A snapshot that fails its checksum or carries an unknown schema is logged
/// at error level and ignored, which sends recovery back to full replay.
pub fn load_verified(
    store: &dyn SnapshotStore,
    tournament_id: &str,
) -> Result<Option<(Snapshot, GameState)>, PersistenceError> {
    let Some(snapshot) = store.latest(tournament_id)? else {
        return Ok(None);
    };
    match snapshot.restore() {
        Ok(state) => Ok(Some((snapshot, state))),
        Err(err) => {
            tracing::error!(
                tournament_id = %tournament_id,
                sequence = snapshot.sequence,
                error = %err,
                "snapshot failed verification, falling back to full replay"
            );
            Ok(None)
        }
    }
}
