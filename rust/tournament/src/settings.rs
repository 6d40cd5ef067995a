use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shortdeck_engine::MAX_PLAYERS;
use thiserror::Error;

use crate::secret_store::{ShardKeyring, KEY_LEN};

const CONFIG_PATH_VAR: &str = "SHORTDECK_CONFIG";

/// Runtime settings for the tournament engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    pub small_blind: u64,
    pub big_blind: u64,
    /// Largest table `create` accepts, at most 10
    pub max_players: usize,
    /// Snapshot every this many events; 0 keeps only key-moment snapshots
    pub snapshot_interval: u64,
    pub persist_retry_attempts: u32,
    pub persist_retry_backoff_ms: u64,
    /// Buffer per event subscriber
    pub event_channel_capacity: usize,
    /// Buffer of each tournament's command inbox
    pub inbox_capacity: usize,
    /// Deterministic shuffles when set
    pub shuffle_seed: Option<u64>,
    /// Three hex-encoded 32-byte shard keys; empty means generate per process
    pub shard_keys: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            small_blind: 10,
            big_blind: 20,
            max_players: MAX_PLAYERS,
            snapshot_interval: 50,
            persist_retry_attempts: 3,
            persist_retry_backoff_ms: 50,
            event_channel_capacity: 1000,
            inbox_capacity: 64,
            shuffle_seed: None,
            shard_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    File,
    Env,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsSources {
    pub small_blind: ValueSource,
    pub big_blind: ValueSource,
    pub max_players: ValueSource,
    pub snapshot_interval: ValueSource,
    pub persist_retry_attempts: ValueSource,
    pub persist_retry_backoff_ms: ValueSource,
    pub event_channel_capacity: ValueSource,
    pub inbox_capacity: ValueSource,
    pub shuffle_seed: ValueSource,
    pub shard_keys: ValueSource,
}

impl Default for SettingsSources {
    fn default() -> Self {
        Self {
            small_blind: ValueSource::Default,
            big_blind: ValueSource::Default,
            max_players: ValueSource::Default,
            snapshot_interval: ValueSource::Default,
            persist_retry_attempts: ValueSource::Default,
            persist_retry_backoff_ms: ValueSource::Default,
            event_channel_capacity: ValueSource::Default,
            inbox_capacity: ValueSource::Default,
            shuffle_seed: ValueSource::Default,
            shard_keys: ValueSource::Default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsResolved {
    pub settings: EngineSettings,
    pub sources: SettingsSources,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    #[serde(default)]
    small_blind: Option<u64>,
    #[serde(default)]
    big_blind: Option<u64>,
    #[serde(default)]
    max_players: Option<usize>,
    #[serde(default)]
    snapshot_interval: Option<u64>,
    #[serde(default)]
    persist_retry_attempts: Option<u32>,
    #[serde(default)]
    persist_retry_backoff_ms: Option<u64>,
    #[serde(default)]
    event_channel_capacity: Option<usize>,
    #[serde(default)]
    inbox_capacity: Option<usize>,
    #[serde(default)]
    shuffle_seed: Option<u64>,
    #[serde(default)]
    shard_keys: Option<Vec<String>>,
}

impl EngineSettings {
    /// Defaults, then the TOML file named by `SHORTDECK_CONFIG`, then
    /// `SHORTDECK_*` environment variables.
    pub fn load() -> Result<EngineSettings, SettingsError> {
        Self::load_with_sources().map(|resolved| resolved.settings)
    }

    pub fn load_with_sources() -> Result<SettingsResolved, SettingsError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineSettings::load_with_sources`] with a custom variable lookup.
    pub fn load_from<F>(lookup: F) -> Result<SettingsResolved, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = EngineSettings::default();
        let mut sources = SettingsSources::default();

        if let Some(path) = lookup(CONFIG_PATH_VAR).filter(|p| !p.is_empty()) {
            let text = fs::read_to_string(path)?;
            let file: FileSettings = toml::from_str(&text)?;
            settings.apply_file(file, &mut sources);
        }
        settings.apply_env(&lookup, &mut sources)?;

        settings.validate()?;
        Ok(SettingsResolved { settings, sources })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.small_blind == 0 {
            return Err(SettingsError::InvalidValue(
                "small_blind must be greater than 0".to_string(),
            ));
        }
        if self.big_blind < self.small_blind {
            return Err(SettingsError::InvalidValue(
                "big_blind must be at least small_blind".to_string(),
            ));
        }
        if !(2..=MAX_PLAYERS).contains(&self.max_players) {
            return Err(SettingsError::InvalidValue(format!(
                "max_players must be between 2 and {MAX_PLAYERS}"
            )));
        }
        if self.persist_retry_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "persist_retry_attempts must be greater than 0".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 || self.inbox_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "channel capacities must be greater than 0".to_string(),
            ));
        }
        if !self.shard_keys.is_empty() {
            if self.shard_keys.len() != 3 {
                return Err(SettingsError::InvalidValue(format!(
                    "expected 3 shard keys, got {}",
                    self.shard_keys.len()
                )));
            }
            for (i, key) in self.shard_keys.iter().enumerate() {
                let valid = hex::decode(key).is_ok_and(|bytes| bytes.len() == KEY_LEN);
                if !valid {
                    return Err(SettingsError::InvalidValue(format!(
                        "shard key {i} must be {} hex characters",
                        KEY_LEN * 2
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_retry_backoff_ms)
    }

    /// Keyring from the configured keys, or fresh random keys when none are set.
    pub fn keyring(&self) -> Result<ShardKeyring, SettingsError> {
        if self.shard_keys.is_empty() {
            tracing::warn!("no shard keys configured, generating process-local keys");
            return Ok(ShardKeyring::generate());
        }
        ShardKeyring::from_hex(&self.shard_keys)
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))
    }

    fn apply_file(&mut self, file: FileSettings, sources: &mut SettingsSources) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(v) = file.$field {
                    self.$field = v;
                    sources.$field = ValueSource::File;
                }
            };
        }
        take!(small_blind);
        take!(big_blind);
        take!(max_players);
        take!(snapshot_interval);
        take!(persist_retry_attempts);
        take!(persist_retry_backoff_ms);
        take!(event_channel_capacity);
        take!(inbox_capacity);
        take!(shard_keys);
        if let Some(seed) = file.shuffle_seed {
            self.shuffle_seed = Some(seed);
            sources.shuffle_seed = ValueSource::File;
        }
    }

    fn apply_env<F>(&mut self, lookup: &F, sources: &mut SettingsSources) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        macro_rules! parse_env {
            ($name:literal, $field:ident) => {
                if let Some(raw) = var($name) {
                    self.$field = raw.parse().map_err(|_| {
                        SettingsError::InvalidValue(format!("{} is not a valid number: {raw}", $name))
                    })?;
                    sources.$field = ValueSource::Env;
                }
            };
        }
        parse_env!("SHORTDECK_SMALL_BLIND", small_blind);
        parse_env!("SHORTDECK_BIG_BLIND", big_blind);
        parse_env!("SHORTDECK_MAX_PLAYERS", max_players);
        parse_env!("SHORTDECK_SNAPSHOT_INTERVAL", snapshot_interval);
        parse_env!("SHORTDECK_PERSIST_RETRY_ATTEMPTS", persist_retry_attempts);
        parse_env!("SHORTDECK_PERSIST_RETRY_BACKOFF_MS", persist_retry_backoff_ms);
        parse_env!("SHORTDECK_EVENT_CHANNEL_CAPACITY", event_channel_capacity);
        parse_env!("SHORTDECK_INBOX_CAPACITY", inbox_capacity);

        if let Some(raw) = var("SHORTDECK_SHUFFLE_SEED") {
            let seed = raw.parse().map_err(|_| {
                SettingsError::InvalidValue(format!("SHORTDECK_SHUFFLE_SEED is not a valid number: {raw}"))
            })?;
            self.shuffle_seed = Some(seed);
            sources.shuffle_seed = ValueSource::Env;
        }

        let keys: Vec<String> = (0..3)
            .filter_map(|i| var(&format!("SHORTDECK_SHARD_KEY_{i}")))
            .collect();
        if !keys.is_empty() {
            self.shard_keys = keys;
            sources.shard_keys = ValueSource::Env;
        }
        Ok(())
    }
}
