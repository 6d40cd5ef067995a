use shortdeck_engine::errors::GameError;
use shortdeck_engine::GameState;
use thiserror::Error;

use crate::errors::ErrorKind;
use crate::event_log::PersistenceError;
use crate::persister::Storage;
use crate::secret_store::SecretError;
use crate::snapshot::load_verified;
use crate::TournamentId;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("No stored history for tournament {0}")]
    NotFound(TournamentId),
    #[error("Event sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
    #[error("Replay failed at sequence {sequence}: {source}")]
    Replay {
        sequence: u64,
        #[source]
        source: GameError,
    },
    #[error("Cannot reconstruct hand {hand_number}: {source}")]
    Shards {
        hand_number: u64,
        #[source]
        source: SecretError,
    },
    #[error("Recovered private state rejected: {0}")]
    PrivateState(#[source] GameError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RecoveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecoveryError::NotFound(_) => ErrorKind::Protocol,
            RecoveryError::Persistence(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Integrity,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RecoveryError::NotFound(_) => "tournament_not_found",
            RecoveryError::SequenceGap { .. } => "sequence_gap",
            RecoveryError::Replay { .. } => "replay_diverged",
            RecoveryError::Shards {
                source: SecretError::InsufficientShards { .. },
                ..
            } => "insufficient_shards",
            RecoveryError::Shards { .. } => "shard_reconstruction_failed",
            RecoveryError::PrivateState(_) => "private_state_mismatch",
            RecoveryError::Persistence(_) => "persistence_failed",
        }
    }
}

/// Result of rebuilding a tournament from storage.
#[derive(Debug, Clone)]
pub struct Recovered {
    pub state: GameState,
    pub last_sequence: u64,
    /// Sequence of the snapshot replay started from, if one was trusted
    pub from_snapshot: Option<u64>,
}

/// Rebuilds tournament state from the latest trusted snapshot, the events
/// after it and, for a hand in progress, the hand's shards.
#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    storage: Storage,
}

impl RecoveryCoordinator {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn recover(&self, tournament_id: &str) -> Result<Recovered, RecoveryError> {
        let (mut state, base) =
            match load_verified(self.storage.snapshots.as_ref(), tournament_id)? {
                Some((snapshot, state)) => (state, Some(snapshot.sequence)),
                None => (GameState::empty(), None),
            };
        let start = base.unwrap_or(0);

        let records = self.storage.event_log.get_after(tournament_id, start)?;
        if base.is_none() && records.is_empty() {
            return Err(RecoveryError::NotFound(tournament_id.to_string()));
        }

        let mut expected = start + 1;
        for record in &records {
            if record.sequence != expected {
                return Err(self.integrity_failure(
                    tournament_id,
                    RecoveryError::SequenceGap {
                        expected,
                        found: record.sequence,
                    },
                ));
            }
            if let Err(source) = state.apply(&record.event) {
                return Err(self.integrity_failure(
                    tournament_id,
                    RecoveryError::Replay {
                        sequence: record.sequence,
                        source,
                    },
                ));
            }
            expected += 1;
        }
        let last_sequence = expected - 1;

        if state.phase().is_betting() {
            let hand_number = state.hand_number();
            let private = self
                .storage
                .secrets
                .reconstruct(tournament_id, hand_number)
                .map_err(|source| {
                    self.integrity_failure(
                        tournament_id,
                        RecoveryError::Shards {
                            hand_number,
                            source,
                        },
                    )
                })?;
            state
                .restore_private(private)
                .map_err(|e| self.integrity_failure(tournament_id, RecoveryError::PrivateState(e)))?;
        }

        tracing::info!(
            tournament_id = %tournament_id,
            last_sequence,
            from_snapshot = ?base,
            replayed = records.len(),
            hand_number = state.hand_number(),
            phase = %state.phase(),
            "tournament recovered"
        );
        Ok(Recovered {
            state,
            last_sequence,
            from_snapshot: base,
        })
    }

    fn integrity_failure(&self, tournament_id: &str, err: RecoveryError) -> RecoveryError {
        tracing::error!(
            tournament_id = %tournament_id,
            error = %err,
            "recovery aborted"
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret_store::{ShardBackend, ShardKeyring};
    use crate::snapshot::Snapshot;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use shortdeck_engine::player::{PlayerAction, PlayerId};
    use shortdeck_engine::Phase;

    fn players() -> Vec<(PlayerId, u64)> {
        vec![(PlayerId::new("a"), 1000), (PlayerId::new("b"), 1000)]
    }

    /// Plays into the flop of hand 1, storing events and shards like a live table.
    fn played(storage: &Storage) -> GameState {
        let (mut state, created) = GameState::create(players(), 10, 20).unwrap();
        let mut events = vec![created];
        events.extend(state.start_hand(&mut ChaCha20Rng::seed_from_u64(5)).unwrap());
        let private = state.private_state().unwrap();
        storage.secrets.store("t", 1, &private).unwrap();
        events.extend(state.act(&PlayerId::new("a"), PlayerAction::Call).unwrap());
        events.extend(state.act(&PlayerId::new("b"), PlayerAction::Check).unwrap());
        for event in &events {
            storage.event_log.append("t", event, Utc::now()).unwrap();
        }
        assert_eq!(state.phase(), Phase::Flop);
        state
    }

    #[test]
    fn recovers_mid_hand_with_private_state() {
        let storage = Storage::in_memory(ShardKeyring::generate());
        let mut live = played(&storage);
        let recovery = RecoveryCoordinator::new(storage.clone());

        let mut recovered = recovery.recover("t").unwrap();
        assert_eq!(recovered.from_snapshot, None);
        assert_eq!(
            recovered.last_sequence,
            storage.event_log.last_sequence("t").unwrap()
        );
        assert_eq!(recovered.state.private_state(), live.private_state());

        // both copies deal the same turn
        let a = PlayerId::new("a");
        let b = PlayerId::new("b");
        for state in [&mut live, &mut recovered.state] {
            state.act(&b, PlayerAction::Check).unwrap();
            state.act(&a, PlayerAction::Check).unwrap();
        }
        assert_eq!(recovered.state.board(), live.board());
    }

    #[test]
    fn unknown_tournament_is_not_found() {
        let storage = Storage::in_memory(ShardKeyring::generate());
        let recovery = RecoveryCoordinator::new(storage);
        assert!(matches!(
            recovery.recover("nope"),
            Err(RecoveryError::NotFound(_))
        ));
    }

    #[test]
    fn snapshot_then_tail_matches_full_replay() {
        let storage = Storage::in_memory(ShardKeyring::generate());
        let (state, created) = GameState::create(players(), 10, 20).unwrap();
        storage.event_log.append("t", &created, Utc::now()).unwrap();
        let snapshot = Snapshot::capture("t", 1, &state).unwrap();
        storage.snapshots.save(&snapshot).unwrap();

        let recovered = RecoveryCoordinator::new(storage).recover("t").unwrap();
        assert_eq!(recovered.from_snapshot, Some(1));
        assert_eq!(recovered.last_sequence, 1);
        assert_eq!(recovered.state.public_view(None), state.public_view(None));
    }

    #[test]
    fn missing_shards_fail_closed() {
        let backend = std::sync::Arc::new(crate::secret_store::MemoryShardBackend::new());
        let storage = Storage::new(
            std::sync::Arc::new(crate::event_log::MemoryEventLog::new()),
            std::sync::Arc::new(crate::snapshot::MemorySnapshotStore::new()),
            crate::secret_store::SecretStore::new(backend.clone(), ShardKeyring::generate()),
        );
        played(&storage);
        backend.remove_shard("t", 1, 2);
        backend.remove_shard("t", 1, 3);

        let err = RecoveryCoordinator::new(storage).recover("t").unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::Shards {
                hand_number: 1,
                source: SecretError::InsufficientShards { found: 1, required: 2 },
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(err.error_code(), "insufficient_shards");
    }
}
