//! # shortdeck-engine: Short-Deck Tournament Rules Core
//!
//! A synchronous, I/O-free engine for short-deck (36-card) hold'em tournaments
//! with 2 to 10 players. It validates every action server-side, keeps chip
//! accounting exact across side pots, and expresses every public change as a
//! [`events::GameEvent`] so the same code drives live play and replay.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank 6..Ace) and the 36-card deck
//! - [`deck`] - Shuffling, dealing and burning
//! - [`hand`] - Short-deck hand evaluation (flush beats full house, A-6-7-8-9 wheel)
//! - [`rules`] - Single action validation against stack and bet sizes
//! - [`betting`] - Betting round state machine with reopen rules
//! - [`pot`] - Side pot layering with dead money
//! - [`events`] - Public domain events
//! - [`game`] - Tournament table state, hand lifecycle and event application
//! - [`private_state`] - Hole cards and deck order kept out of public state
//! - [`view`] - Per-viewer public state
//! - [`errors`] - Error types for game operations
//!
//! ## Quick Start
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//! use shortdeck_engine::game::{GameState, Phase};
//! use shortdeck_engine::player::{PlayerAction, PlayerId};
//!
//! let a = PlayerId::new("alice");
//! let b = PlayerId::new("bob");
//! let (mut game, _created) =
//!     GameState::create(vec![(a.clone(), 1000), (b.clone(), 1000)], 10, 20).unwrap();
//!
//! let mut rng = ChaCha20Rng::seed_from_u64(42);
//! game.start_hand(&mut rng).unwrap();
//! assert_eq!(game.pot(), 30);
//!
//! // heads-up the button posts the small blind and acts first
//! game.act(&a, PlayerAction::Fold).unwrap();
//! assert_eq!(game.phase(), Phase::HandComplete);
//! assert_eq!(game.player(&b).unwrap().chips(), 1010);
//! ```
//!
//! ## Replay
//!
//! Events returned by `create`, `start_hand` and `act` rebuild the same public
//! state when applied to an empty table:
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//! use shortdeck_engine::game::GameState;
//! use shortdeck_engine::player::{PlayerAction, PlayerId};
//!
//! let a = PlayerId::new("a");
//! let b = PlayerId::new("b");
//! let (mut live, created) =
//!     GameState::create(vec![(a.clone(), 500), (b.clone(), 500)], 10, 20).unwrap();
//! let mut log = vec![created];
//! log.extend(live.start_hand(&mut ChaCha20Rng::seed_from_u64(1)).unwrap());
//! log.extend(live.act(&a, PlayerAction::Call).unwrap());
//!
//! let mut replayed = GameState::empty();
//! for event in &log {
//!     replayed.apply(event).unwrap();
//! }
//! assert_eq!(replayed.public_view(None), live.public_view(None));
//! ```

pub mod betting;
pub mod cards;
pub mod deck;
pub mod errors;
pub mod events;
pub mod game;
pub mod hand;
pub mod player;
pub mod pot;
pub mod private_state;
pub mod rules;
pub mod view;

pub use errors::{BettingError, EvalError, GameError};
pub use events::GameEvent;
pub use game::{GameState, Phase, MAX_PLAYERS};
pub use player::{PlayerAction, PlayerId};
pub use view::PublicState;
