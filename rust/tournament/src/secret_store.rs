use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use shortdeck_engine::private_state::PrivateHandState;
use thiserror::Error;

use crate::sharing::{self, Share, SHARE_COUNT, THRESHOLD};
use crate::TournamentId;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("Insufficient shards: found {found}, need {required}")]
    InsufficientShards { found: usize, required: usize },
    #[error("Malformed shard: {0}")]
    MalformedShard(String),
    #[error("Invalid shard key: {0}")]
    InvalidKey(String),
    #[error("Shard encryption failed")]
    Encryption,
    #[error("Private state serialization failed: {0}")]
    Serialization(String),
    #[error("Shard storage failed: {0}")]
    Storage(String),
}

/// One share after encryption, as it sits in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShard {
    pub index: u8,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Three independent keys, one per shard slot.
#[derive(Clone)]
pub struct ShardKeyring {
    keys: [[u8; KEY_LEN]; SHARE_COUNT],
}

impl std::fmt::Debug for ShardKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ShardKeyring { .. }")
    }
}

impl ShardKeyring {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut keys = [[0u8; KEY_LEN]; SHARE_COUNT];
        for key in keys.iter_mut() {
            rng.fill_bytes(key);
        }
        Self { keys }
    }

    pub fn from_hex(keys: &[String]) -> Result<Self, SecretError> {
        if keys.len() != SHARE_COUNT {
            return Err(SecretError::InvalidKey(format!(
                "expected {SHARE_COUNT} keys, got {}",
                keys.len()
            )));
        }
        let mut out = [[0u8; KEY_LEN]; SHARE_COUNT];
        for (slot, key) in out.iter_mut().zip(keys) {
            let bytes = hex::decode(key).map_err(|e| SecretError::InvalidKey(e.to_string()))?;
            *slot = bytes.try_into().map_err(|b: Vec<u8>| {
                SecretError::InvalidKey(format!("key is {} bytes, need {KEY_LEN}", b.len()))
            })?;
        }
        Ok(Self { keys: out })
    }

    fn cipher(&self, index: u8) -> Result<ChaCha20Poly1305, SecretError> {
        let key = self
            .keys
            .get(usize::from(index).wrapping_sub(1))
            .ok_or_else(|| SecretError::MalformedShard(format!("no key for shard {index}")))?;
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| SecretError::InvalidKey("bad length".into()))
    }
}

// binds a ciphertext to its slot so shards cannot be swapped between hands
fn associated_data(tournament_id: &str, hand_number: u64, index: u8) -> Vec<u8> {
    format!("shortdeck-shard:{tournament_id}:{hand_number}:{index}").into_bytes()
}

/// Storage for encrypted shards, keyed by tournament, hand and shard slot.
pub trait ShardBackend: Send + Sync {
    /// Writes all three shards of a hand at once.
    fn put_all(
        &self,
        tournament_id: &str,
        hand_number: u64,
        shards: [EncryptedShard; SHARE_COUNT],
    ) -> Result<(), SecretError>;

    fn get(&self, tournament_id: &str, hand_number: u64, index: u8) -> Option<EncryptedShard>;

    fn remove_shard(&self, tournament_id: &str, hand_number: u64, index: u8);

    fn remove_tournament(&self, tournament_id: &str);
}

type ShardSlots = [Option<EncryptedShard>; SHARE_COUNT];

/// In-memory backend. Each slot stands in for a separate storage node.
#[derive(Debug, Default)]
pub struct MemoryShardBackend {
    shards: Mutex<HashMap<(TournamentId, u64), ShardSlots>>,
}

impl MemoryShardBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites one stored shard; used to simulate a corrupted node.
    pub fn replace(&self, tournament_id: &str, hand_number: u64, shard: EncryptedShard) {
        if let Ok(mut guard) = self.shards.lock() {
            if let Some(slots) = guard.get_mut(&(tournament_id.to_string(), hand_number)) {
                if let Some(slot) = slots.get_mut(usize::from(shard.index).wrapping_sub(1)) {
                    *slot = Some(shard);
                }
            }
        }
    }

    pub fn shard_count(&self, tournament_id: &str) -> usize {
        self.shards
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|((t, _), _)| t == tournament_id)
                    .map(|(_, slots)| slots.iter().flatten().count())
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl ShardBackend for MemoryShardBackend {
    fn put_all(
        &self,
        tournament_id: &str,
        hand_number: u64,
        shards: [EncryptedShard; SHARE_COUNT],
    ) -> Result<(), SecretError> {
        let mut guard = self
            .shards
            .lock()
            .map_err(|_| SecretError::Storage("shard storage poisoned".into()))?;
        guard.insert((tournament_id.to_string(), hand_number), shards.map(Some));
        Ok(())
    }

    fn get(&self, tournament_id: &str, hand_number: u64, index: u8) -> Option<EncryptedShard> {
        let guard = self.shards.lock().ok()?;
        guard
            .get(&(tournament_id.to_string(), hand_number))?
            .get(usize::from(index).wrapping_sub(1))?
            .clone()
    }

    fn remove_shard(&self, tournament_id: &str, hand_number: u64, index: u8) {
        if let Ok(mut guard) = self.shards.lock() {
            if let Some(slots) = guard.get_mut(&(tournament_id.to_string(), hand_number)) {
                if let Some(slot) = slots.get_mut(usize::from(index).wrapping_sub(1)) {
                    *slot = None;
                }
            }
        }
    }

    fn remove_tournament(&self, tournament_id: &str) {
        if let Ok(mut guard) = self.shards.lock() {
            guard.retain(|(t, _), _| t != tournament_id);
        }
    }
}

/// Threshold-split, encrypted storage of each hand's private state.
#[derive(Clone)]
pub struct SecretStore {
    backend: Arc<dyn ShardBackend>,
    keyring: ShardKeyring,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore").finish_non_exhaustive()
    }
}

impl SecretStore {
    pub fn new(backend: Arc<dyn ShardBackend>, keyring: ShardKeyring) -> Self {
        Self { backend, keyring }
    }

    /// Splits, encrypts and stores a hand's private state.
    pub fn store(
        &self,
        tournament_id: &str,
        hand_number: u64,
        private: &PrivateHandState,
    ) -> Result<(), SecretError> {
        let bytes = private
            .to_bytes()
            .map_err(|e| SecretError::Serialization(e.to_string()))?;
        let mut rng = rand::rng();
        let shares = sharing::split(&bytes, &mut rng);

        let mut encrypted = Vec::with_capacity(SHARE_COUNT);
        for share in shares {
            encrypted.push(self.seal(tournament_id, hand_number, &share, &mut rng)?);
        }
        let encrypted: [EncryptedShard; SHARE_COUNT] = encrypted
            .try_into()
            .map_err(|_| SecretError::Encryption)?;
        self.backend.put_all(tournament_id, hand_number, encrypted)
    }

    /// Rebuilds a hand's private state from any two authentic shards.
    ///
    /// Missing shards and shards that fail authentication are skipped; fewer
    /// than two usable shards is [`SecretError::InsufficientShards`].
    pub fn reconstruct(
        &self,
        tournament_id: &str,
        hand_number: u64,
    ) -> Result<PrivateHandState, SecretError> {
        let mut shares: Vec<Share> = Vec::with_capacity(THRESHOLD);
        for index in 1..=SHARE_COUNT as u8 {
            let Some(sealed) = self.backend.get(tournament_id, hand_number, index) else {
                continue;
            };
            match self.open(tournament_id, hand_number, &sealed) {
                Ok(share) => shares.push(share),
                Err(err) => tracing::warn!(
                    tournament_id = %tournament_id,
                    hand_number,
                    shard = index,
                    error = %err,
                    "discarding shard that failed authentication"
                ),
            }
            if shares.len() == THRESHOLD {
                break;
            }
        }
        if shares.len() < THRESHOLD {
            return Err(SecretError::InsufficientShards {
                found: shares.len(),
                required: THRESHOLD,
            });
        }
        let bytes = sharing::combine(&shares)?;
        PrivateHandState::from_bytes(&bytes).map_err(|e| SecretError::Serialization(e.to_string()))
    }

    /// Deletes every shard of a tournament.
    pub fn retire(&self, tournament_id: &str) {
        self.backend.remove_tournament(tournament_id);
    }

    fn seal<R: RngCore + ?Sized>(
        &self,
        tournament_id: &str,
        hand_number: u64,
        share: &Share,
        rng: &mut R,
    ) -> Result<EncryptedShard, SecretError> {
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        let aad = associated_data(tournament_id, hand_number, share.index);
        let ciphertext = self
            .keyring
            .cipher(share.index)?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &share.data,
                    aad: &aad,
                },
            )
            .map_err(|_| SecretError::Encryption)?;
        Ok(EncryptedShard {
            index: share.index,
            nonce,
            ciphertext,
        })
    }

    fn open(
        &self,
        tournament_id: &str,
        hand_number: u64,
        sealed: &EncryptedShard,
    ) -> Result<Share, SecretError> {
        let aad = associated_data(tournament_id, hand_number, sealed.index);
        let data = self
            .keyring
            .cipher(sealed.index)?
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| SecretError::MalformedShard(format!("shard {} failed authentication", sealed.index)))?;
        Ok(Share {
            index: sealed.index,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortdeck_engine::cards::full_deck;
    use shortdeck_engine::player::PlayerId;

    fn private_state() -> PrivateHandState {
        let deck = full_deck();
        PrivateHandState {
            hand_number: 4,
            hole_cards: vec![
                (PlayerId::new("a"), [deck[0], deck[1]]),
                (PlayerId::new("b"), [deck[2], deck[3]]),
            ],
            deck: deck[4..].to_vec(),
        }
    }

    fn store() -> (SecretStore, Arc<MemoryShardBackend>) {
        let backend = Arc::new(MemoryShardBackend::new());
        (
            SecretStore::new(backend.clone(), ShardKeyring::generate()),
            backend,
        )
    }

    #[test]
    fn reconstructs_from_every_pair_of_shards() {
        for missing in 1..=3u8 {
            let (store, backend) = store();
            store.store("t", 4, &private_state()).unwrap();
            backend.remove_shard("t", 4, missing);
            assert_eq!(store.reconstruct("t", 4).unwrap(), private_state());
        }
    }

    #[test]
    fn fails_closed_with_one_shard() {
        let (store, backend) = store();
        store.store("t", 4, &private_state()).unwrap();
        backend.remove_shard("t", 4, 1);
        backend.remove_shard("t", 4, 3);
        assert_eq!(
            store.reconstruct("t", 4),
            Err(SecretError::InsufficientShards {
                found: 1,
                required: 2
            })
        );
        assert_eq!(
            store.reconstruct("t", 5),
            Err(SecretError::InsufficientShards {
                found: 0,
                required: 2
            })
        );
    }

    #[test]
    fn stored_shards_hide_the_plaintext_share() {
        let (store, backend) = store();
        store.store("t", 4, &private_state()).unwrap();
        let plain = private_state().to_bytes().unwrap();
        for index in 1..=3u8 {
            let sealed = backend.get("t", 4, index).unwrap();
            assert_ne!(sealed.ciphertext, plain);
            assert_eq!(sealed.ciphertext.len(), plain.len() + 16);
        }
    }

    #[test]
    fn shard_moved_to_another_hand_fails_authentication() {
        let (store, backend) = store();
        store.store("t", 4, &private_state()).unwrap();
        store.store("t", 5, &private_state()).unwrap();
        let foreign = backend.get("t", 5, 1).unwrap();
        backend.replace("t", 4, foreign);
        backend.remove_shard("t", 4, 2);
        assert!(matches!(
            store.reconstruct("t", 4),
            Err(SecretError::InsufficientShards { found: 1, .. })
        ));
    }

    #[test]
    fn wrong_keyring_cannot_reconstruct() {
        let backend = Arc::new(MemoryShardBackend::new());
        let writer = SecretStore::new(backend.clone(), ShardKeyring::generate());
        writer.store("t", 1, &private_state()).unwrap();
        let reader = SecretStore::new(backend, ShardKeyring::generate());
        assert!(matches!(
            reader.reconstruct("t", 1),
            Err(SecretError::InsufficientShards { found: 0, .. })
        ));
    }

    #[test]
    fn retire_removes_all_shards() {
        let (store, backend) = store();
        store.store("t", 1, &private_state()).unwrap();
        store.store("t", 2, &private_state()).unwrap();
        store.store("other", 1, &private_state()).unwrap();
        assert_eq!(backend.shard_count("t"), 6);
        store.retire("t");
        assert_eq!(backend.shard_count("t"), 0);
        assert_eq!(backend.shard_count("other"), 3);
    }

    #[test]
    fn keyring_parses_hex() {
        let keys = vec!["ab".repeat(32), "cd".repeat(32), "ef".repeat(32)];
        assert!(ShardKeyring::from_hex(&keys).is_ok());
        let short = vec!["ab".repeat(16), "cd".repeat(32), "ef".repeat(32)];
        assert!(matches!(
            ShardKeyring::from_hex(&short),
            Err(SecretError::InvalidKey(_))
        ));
    }
}
