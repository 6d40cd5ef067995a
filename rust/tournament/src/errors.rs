//! Error types surfaced by the tournament service.
//!
//! Every caller-facing error classifies itself as a protocol, integrity or
//! infrastructure failure and converts into an [`ErrorResponse`]. Protocol
//! errors are reported verbatim; integrity errors reach the caller only as a
//! generic message, with the detail logged at error level.
use serde::{Deserialize, Serialize};
use shortdeck_engine::errors::{BettingError, GameError};
use std::fmt;
use thiserror::Error;

use crate::event_log::PersistenceError;
use crate::recovery::RecoveryError;
use crate::TournamentId;

/// Standard error payload handed to transport collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "tournament_not_found")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (structured data)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Who has to act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller mistake; state is unchanged
    Protocol,
    /// Stored history or private state cannot be trusted
    Integrity,
    /// Storage or process plumbing failed
    Infrastructure,
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected during normal play
    Client,
    /// Unexpected, needs investigation
    Server,
    /// Fairness of a tournament is at risk
    Critical,
}

const INTEGRITY_MESSAGE: &str = "The tournament cannot be resumed safely";

pub trait IntoErrorResponse: fmt::Display {
    /// Get the error code string (machine-readable)
    fn error_code(&self) -> &'static str;

    fn kind(&self) -> ErrorKind;

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::Protocol => ErrorSeverity::Client,
            ErrorKind::Infrastructure => ErrorSeverity::Server,
            ErrorKind::Integrity => ErrorSeverity::Critical,
        }
    }

    /// Caller-facing response. Integrity details are withheld.
    fn to_error_response(&self) -> ErrorResponse {
        if self.kind() == ErrorKind::Integrity {
            return ErrorResponse::new(self.error_code(), INTEGRITY_MESSAGE);
        }
        match self.error_details() {
            Some(details) => {
                ErrorResponse::with_details(self.error_code(), self.error_message(), details)
            }
            None => ErrorResponse::new(self.error_code(), self.error_message()),
        }
    }

    /// Logs the error at its severity and returns the caller-facing response.
    fn report(&self) -> ErrorResponse {
        let code = self.error_code();
        match self.severity() {
            ErrorSeverity::Client => {
                tracing::debug!(error_code = code, error = %self, "request rejected")
            }
            ErrorSeverity::Server => {
                tracing::warn!(error_code = code, error = %self, "infrastructure failure")
            }
            ErrorSeverity::Critical => {
                tracing::error!(error_code = code, error = %self, "integrity failure")
            }
        }
        self.to_error_response()
    }
}

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Tournament {0} not found")]
    NotFound(TournamentId),
    #[error("Tournament {0} already exists")]
    AlreadyExists(TournamentId),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("Invalid tournament setup: {0}")]
    InvalidSetup(String),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Tournament {0} is not accepting commands")]
    Unavailable(TournamentId),
    #[error("Tournament directory lock poisoned")]
    StoragePoisoned,
}

impl TournamentError {
    pub fn kind(&self) -> ErrorKind {
        IntoErrorResponse::kind(self)
    }
}

impl IntoErrorResponse for TournamentError {
    fn error_code(&self) -> &'static str {
        match self {
            TournamentError::NotFound(_) => "tournament_not_found",
            TournamentError::AlreadyExists(_) => "tournament_exists",
            TournamentError::Game(err) => game_error_code(err),
            TournamentError::InvalidSetup(_) => "invalid_setup",
            TournamentError::Recovery(err) => err.error_code(),
            TournamentError::Persistence(_) => "persistence_failed",
            TournamentError::Unavailable(_) => "tournament_unavailable",
            TournamentError::StoragePoisoned => "storage_error",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            TournamentError::NotFound(_) | TournamentError::InvalidSetup(_) => ErrorKind::Protocol,
            TournamentError::Game(err) if err.is_protocol() => ErrorKind::Protocol,
            TournamentError::Game(_) => ErrorKind::Integrity,
            TournamentError::Recovery(err) => err.kind(),
            TournamentError::AlreadyExists(_)
            | TournamentError::Persistence(_)
            | TournamentError::Unavailable(_)
            | TournamentError::StoragePoisoned => ErrorKind::Infrastructure,
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            TournamentError::Game(GameError::Betting(err)) => serde_json::to_value(err).ok(),
            _ => None,
        }
    }
}

fn game_error_code(err: &GameError) -> &'static str {
    match err {
        GameError::Betting(betting) => match betting {
            BettingError::NotYourTurn { .. } => "not_your_turn",
            BettingError::InvalidAction { .. } => "invalid_action",
            BettingError::InsufficientChips { .. } => "insufficient_chips",
            BettingError::BelowMinimumRaise { .. } => "below_minimum_raise",
        },
        GameError::UnknownPlayer(_) => "unknown_player",
        GameError::NoHandInProgress => "no_hand_in_progress",
        GameError::HandInProgress => "hand_in_progress",
        GameError::TournamentComplete => "tournament_complete",
        GameError::NotEnoughPlayers => "not_enough_players",
        GameError::InvalidSetup(_) => "invalid_setup",
        GameError::Eval(_) | GameError::InvalidCard(_) => "invalid_card",
        GameError::DeckExhausted => "deck_exhausted",
        GameError::UnexpectedEvent { .. } | GameError::ReplayDiverged(_) => "replay_diverged",
        GameError::PrivateStateMismatch(_) => "private_state_mismatch",
        GameError::Accounting(_) => "chip_accounting",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret_store::SecretError;
    use serde_json::json;
    use shortdeck_engine::player::PlayerId;

    #[test]
    fn response_omits_absent_details() {
        let response = TournamentError::NotFound("t-9".into()).to_error_response();
        let json = serde_json::to_value(&response).expect("serialize");

        assert_eq!(json["error"], "tournament_not_found");
        assert!(json["message"].as_str().unwrap().contains("t-9"));
        assert!(json.get("details").is_none());
    }

    #[test]
    fn response_display_and_details() {
        let response = ErrorResponse::with_details(
            "insufficient_chips",
            "Insufficient chips",
            json!({"needed": 40, "available": 20}),
        );
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["details"]["needed"], 40);
        assert_eq!(response.to_string(), "insufficient_chips: Insufficient chips");
    }

    #[test]
    fn protocol_errors_pass_through() {
        let err = TournamentError::from(GameError::Betting(BettingError::NotYourTurn {
            player: PlayerId::new("bob"),
        }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.severity(), ErrorSeverity::Client);

        let response = err.to_error_response();
        assert_eq!(response.error, "not_your_turn");
        assert!(response.message.contains("bob"));
        assert_eq!(response.details.unwrap()["code"], "not_your_turn");
    }

    #[test]
    fn integrity_errors_are_redacted() {
        let err = TournamentError::from(RecoveryError::Shards {
            hand_number: 3,
            source: SecretError::InsufficientShards {
                found: 1,
                required: 2,
            },
        });
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(err.severity(), ErrorSeverity::Critical);

        let response = err.to_error_response();
        assert_eq!(response.error, "insufficient_shards");
        assert_eq!(response.message, INTEGRITY_MESSAGE);
        assert!(response.details.is_none());
        assert!(!response.message.contains("found 1"));
    }

    #[test]
    fn engine_integrity_errors_are_not_protocol() {
        let err = TournamentError::from(GameError::ReplayDiverged("x".into()));
        assert_eq!(err.kind(), ErrorKind::Integrity);
        let err = TournamentError::Unavailable("t".into());
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.report().error, "tournament_unavailable");
    }
}
