//! # shortdeck-tournament: Tournament Runtime
//!
//! Runs many short-deck tournaments side by side on tokio. Each tournament is
//! owned by one task that applies commands in arrival order; its events are
//! appended to an event log, its public state is snapshotted, and each hand's
//! hole cards and deck are split 2-of-3 into encrypted shards. A stopped or
//! crashed tournament is rebuilt from those pieces on its next command.
//!
//! ## Modules
//!
//! - [`directory`] - Tournament lookup, lifecycle and lazy restart
//! - `process` - The single-writer task behind each tournament
//! - [`persister`] - Background writes with retry
//! - [`event_log`] - Append-only event storage (memory, JSON lines)
//! - [`snapshot`] - Checksummed public-state snapshots
//! - [`secret_store`] / [`sharing`] - Encrypted 2-of-3 shards of private hand state
//! - [`recovery`] - Snapshot plus replay plus shard reconstruction
//! - [`events`] - Live event fan-out
//! - [`errors`] - Error taxonomy and caller-facing responses
//! - [`settings`] - Defaults, TOML file and environment overrides
//! - [`logging`] - `tracing` subscriber setup and test capture
//!
//! ## Example
//!
//! ```rust
//! use shortdeck_tournament::{EngineSettings, TournamentDirectory};
//! use shortdeck_engine::player::{PlayerAction, PlayerId};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let directory = TournamentDirectory::new(EngineSettings::default()).unwrap();
//! let alice = PlayerId::new("alice");
//! let bob = PlayerId::new("bob");
//! let id = directory
//!     .create(vec![(alice.clone(), 1000), (bob.clone(), 1000)])
//!     .await
//!     .unwrap();
//!
//! directory.start_hand(&id).await.unwrap();
//! directory.action(&id, &alice, PlayerAction::Fold).await.unwrap();
//!
//! let state = directory.public_state(&id, Some(&bob)).await.unwrap();
//! assert_eq!(state.hand_number, 1);
//! # });
//! ```

pub mod directory;
pub mod errors;
pub mod event_log;
pub mod events;
pub mod logging;
pub mod persister;
mod process;
pub mod recovery;
pub mod secret_store;
pub mod settings;
pub mod sharing;
pub mod snapshot;

/// Tournament ids are uuid v4 strings.
pub type TournamentId = String;

pub use directory::{RecoveryReport, TournamentDirectory};
pub use errors::{ErrorKind, ErrorResponse, ErrorSeverity, IntoErrorResponse, TournamentError};
pub use event_log::{EventLog, EventRecord, JsonlEventLog, MemoryEventLog, PersistenceError};
pub use events::{EventBus, EventSubscription};
pub use logging::{init_logging, init_test_logging, CaptureLayer, LogEntry, TestLogSubscriber};
pub use persister::{PersistStats, RetryPolicy, Storage};
pub use recovery::{Recovered, RecoveryCoordinator, RecoveryError};
pub use secret_store::{
    EncryptedShard, MemoryShardBackend, SecretError, SecretStore, ShardBackend, ShardKeyring,
};
pub use settings::{EngineSettings, SettingsError, SettingsResolved, ValueSource};
pub use snapshot::{
    MemorySnapshotStore, Snapshot, SnapshotError, SnapshotOptions, SnapshotPolicy, SnapshotStore,
};
