use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::PlayerId;

/// Why a betting round refused an action. State is untouched when returned.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum BettingError {
    #[error("It's not player {player}'s turn")]
    NotYourTurn { player: PlayerId },
    #[error("Invalid action: {reason}")]
    InvalidAction { reason: String },
    #[error("Insufficient chips: needs {needed}, has {available}")]
    InsufficientChips { needed: u64, available: u64 },
    #[error("Raise to {amount} is below the minimum raise to {minimum}")]
    BelowMinimumRaise { amount: u64, minimum: u64 },
}

impl BettingError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        BettingError::InvalidAction {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("Hand evaluation needs 5 to 7 cards, got {0}")]
    CardCount(usize),
    #[error("Duplicate card {0} in hand")]
    DuplicateCard(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    #[error(transparent)]
    Betting(#[from] BettingError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("Invalid card code: {0}")]
    InvalidCard(String),
    #[error("Invalid table setup: {0}")]
    InvalidSetup(String),
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("No hand in progress")]
    NoHandInProgress,
    #[error("Hand already in progress")]
    HandInProgress,
    #[error("Tournament is complete")]
    TournamentComplete,
    #[error("Not enough players with chips to start a hand")]
    NotEnoughPlayers,
    #[error("Deck exhausted")]
    DeckExhausted,
    #[error("Event {event} cannot be applied in phase {phase}")]
    UnexpectedEvent { event: &'static str, phase: String },
    #[error("Replay diverged: {0}")]
    ReplayDiverged(String),
    #[error("Private state does not match public state: {0}")]
    PrivateStateMismatch(String),
    #[error("Chip accounting error: {0}")]
    Accounting(String),
}

impl GameError {
    /// Protocol errors are caller mistakes; everything else points at corrupted
    /// input or history.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            GameError::Betting(_)
                | GameError::UnknownPlayer(_)
                | GameError::NoHandInProgress
                | GameError::HandInProgress
                | GameError::TournamentComplete
                | GameError::NotEnoughPlayers
                | GameError::InvalidSetup(_)
        )
    }
}
