use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortdeck_engine::GameEvent;
use thiserror::Error;

use crate::snapshot::SnapshotError;
use crate::TournamentId;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage lock poisoned")]
    StoragePoisoned,
    #[error("Invalid tournament id: {0}")]
    InvalidTournamentId(String),
    #[error("Sequence conflict: expected {expected}, log assigned {found}")]
    SequenceConflict { expected: u64, found: u64 },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One persisted event with its per-tournament sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub tournament_id: TournamentId,
    /// 1-based, contiguous per tournament
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: GameEvent,
}

/// Append-only event storage keyed by (tournament id, sequence).
pub trait EventLog: Send + Sync {
    /// Stores `event` under the next sequence number for the tournament.
    fn append(
        &self,
        tournament_id: &str,
        event: &GameEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<EventRecord, PersistenceError>;

    /// Records with a sequence greater than `sequence`, in order.
    fn get_after(
        &self,
        tournament_id: &str,
        sequence: u64,
    ) -> Result<Vec<EventRecord>, PersistenceError>;

    fn get_all(&self, tournament_id: &str) -> Result<Vec<EventRecord>, PersistenceError> {
        self.get_after(tournament_id, 0)
    }

    /// Highest stored sequence, 0 when the tournament has no events.
    fn last_sequence(&self, tournament_id: &str) -> Result<u64, PersistenceError>;

    fn remove(&self, tournament_id: &str) -> Result<(), PersistenceError>;

    fn tournaments(&self) -> Result<Vec<TournamentId>, PersistenceError>;
}

#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: RwLock<HashMap<TournamentId, Vec<EventRecord>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for MemoryEventLog {
    fn append(
        &self,
        tournament_id: &str,
        event: &GameEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<EventRecord, PersistenceError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        let log = guard.entry(tournament_id.to_string()).or_default();
        let record = EventRecord {
            tournament_id: tournament_id.to_string(),
            sequence: log.len() as u64 + 1,
            timestamp,
            event: event.clone(),
        };
        log.push(record.clone());
        Ok(record)
    }

    fn get_after(
        &self,
        tournament_id: &str,
        sequence: u64,
    ) -> Result<Vec<EventRecord>, PersistenceError> {
        let guard = self
            .records
            .read()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        Ok(guard
            .get(tournament_id)
            .map(|log| {
                log.iter()
                    .filter(|r| r.sequence > sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn last_sequence(&self, tournament_id: &str) -> Result<u64, PersistenceError> {
        let guard = self
            .records
            .read()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        Ok(guard
            .get(tournament_id)
            .and_then(|log| log.last())
            .map_or(0, |r| r.sequence))
    }

    fn remove(&self, tournament_id: &str) -> Result<(), PersistenceError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        guard.remove(tournament_id);
        Ok(())
    }

    fn tournaments(&self) -> Result<Vec<TournamentId>, PersistenceError> {
        let guard = self
            .records
            .read()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        Ok(guard.keys().cloned().collect())
    }
}

/// One JSON-lines file per tournament under a directory.
///
/// Each append writes a single line and syncs it before returning. A torn
/// final line left by a crash is ignored on read and cut off before the next
/// append; corruption anywhere else is an error.
#[derive(Debug)]
pub struct JsonlEventLog {
    dir: PathBuf,
    // last sequence per tournament; the lock also serializes appends
    sequences: Mutex<HashMap<TournamentId, u64>>,
}

impl JsonlEventLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sequences: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, tournament_id: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !tournament_id.is_empty()
            && tournament_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(PersistenceError::InvalidTournamentId(
                tournament_id.to_string(),
            ));
        }
        Ok(self.dir.join(format!("{tournament_id}.jsonl")))
    }

    fn read_records(&self, tournament_id: &str) -> Result<Vec<EventRecord>, PersistenceError> {
        let path = self.path_for(tournament_id)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
        let last = lines.len().saturating_sub(1);

        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) if i == last => {
                    tracing::warn!(
                        tournament_id = %tournament_id,
                        error = %err,
                        "ignoring torn final line in event log"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(records)
    }

    /// Truncates the file back to its last complete line.
    fn repair_tail(&self, tournament_id: &str, path: &Path) -> Result<(), PersistenceError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        if keep < bytes.len() {
            tracing::warn!(
                tournament_id = %tournament_id,
                dropped_bytes = bytes.len() - keep,
                "truncating torn final line in event log"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(keep as u64)?;
            file.sync_all()?;
        }
        Ok(())
    }
}

fn write_line(path: &Path, line: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line)?;
    file.flush()?;
    file.sync_data()
}

impl EventLog for JsonlEventLog {
    fn append(
        &self,
        tournament_id: &str,
        event: &GameEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<EventRecord, PersistenceError> {
        let path = self.path_for(tournament_id)?;
        let mut sequences = self
            .sequences
            .lock()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        // first append since open, or since a failed write
        let last = match sequences.get(tournament_id) {
            Some(last) => *last,
            None => {
                self.repair_tail(tournament_id, &path)?;
                self.read_records(tournament_id)?
                    .last()
                    .map_or(0, |r| r.sequence)
            }
        };

        let record = EventRecord {
            tournament_id: tournament_id.to_string(),
            sequence: last + 1,
            timestamp,
            event: event.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        if let Err(err) = write_line(&path, &line) {
            sequences.remove(tournament_id);
            return Err(err.into());
        }
        sequences.insert(tournament_id.to_string(), record.sequence);
        Ok(record)
    }

    fn get_after(
        &self,
        tournament_id: &str,
        sequence: u64,
    ) -> Result<Vec<EventRecord>, PersistenceError> {
        let mut records = self.read_records(tournament_id)?;
        records.retain(|r| r.sequence > sequence);
        Ok(records)
    }

    fn last_sequence(&self, tournament_id: &str) -> Result<u64, PersistenceError> {
        if let Some(last) = self
            .sequences
            .lock()
            .map_err(|_| PersistenceError::StoragePoisoned)?
            .get(tournament_id)
        {
            return Ok(*last);
        }
        Ok(self
            .read_records(tournament_id)?
            .last()
            .map_or(0, |r| r.sequence))
    }

    fn remove(&self, tournament_id: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(tournament_id)?;
        let mut sequences = self
            .sequences
            .lock()
            .map_err(|_| PersistenceError::StoragePoisoned)?;
        sequences.remove(tournament_id);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn tournaments(&self) -> Result<Vec<TournamentId>, PersistenceError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
