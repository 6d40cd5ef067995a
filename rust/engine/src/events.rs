use serde::{Deserialize, Serialize};

use crate::betting::{AppliedAction, Street, ValidatedActionRecord};
use crate::cards::Card;
use crate::hand::{Category, HandStrength};
use crate::player::{PlayerAction, PlayerId};

/// Starting seat and stack of a tournament entrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub player_id: PlayerId,
    pub seat: usize,
    pub chips: u64,
}

/// One pot of a finished hand and who took it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotResult {
    pub amount: u64,
    pub eligible: Vec<PlayerId>,
    pub winners: Vec<PlayerId>,
}

/// Chips credited to a player at the end of a hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub player_id: PlayerId,
    pub amount: u64,
}

/// A hand that reached showdown, by strength only. The hole cards behind it
/// never enter an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowdownHand {
    pub player_id: PlayerId,
    pub category: Category,
    pub strength: HandStrength,
}

/// Summary of a completed hand, kept as public state until the next deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandResult {
    pub hand_number: u64,
    pub pots: Vec<PotResult>,
    pub payouts: Vec<Payout>,
    pub showdown: Vec<ShowdownHand>,
    pub eliminated: Vec<PlayerId>,
}

/// Public domain events. Every change to public game state is one of these;
/// none carries hole cards or undealt cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    TournamentCreated {
        players: Vec<SeatAssignment>,
        small_blind: u64,
        big_blind: u64,
    },
    HandStarted {
        hand_number: u64,
        button_seat: usize,
        small_blind: u64,
        big_blind: u64,
    },
    PlayerFolded {
        player_id: PlayerId,
    },
    PlayerChecked {
        player_id: PlayerId,
    },
    PlayerCalled {
        player_id: PlayerId,
        amount: u64,
    },
    PlayerRaised {
        player_id: PlayerId,
        to: u64,
        amount: u64,
    },
    PlayerAllIn {
        player_id: PlayerId,
        amount: u64,
    },
    BettingRoundCompleted {
        street: Street,
        pot: u64,
    },
    CommunityCardsDealt {
        street: Street,
        cards: Vec<Card>,
    },
    HandCompleted {
        result: HandResult,
    },
    TournamentCompleted {
        winner: PlayerId,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::TournamentCreated { .. } => "tournament_created",
            GameEvent::HandStarted { .. } => "hand_started",
            GameEvent::PlayerFolded { .. } => "player_folded",
            GameEvent::PlayerChecked { .. } => "player_checked",
            GameEvent::PlayerCalled { .. } => "player_called",
            GameEvent::PlayerRaised { .. } => "player_raised",
            GameEvent::PlayerAllIn { .. } => "player_all_in",
            GameEvent::BettingRoundCompleted { .. } => "betting_round_completed",
            GameEvent::CommunityCardsDealt { .. } => "community_cards_dealt",
            GameEvent::HandCompleted { .. } => "hand_completed",
            GameEvent::TournamentCompleted { .. } => "tournament_completed",
        }
    }

    /// Hand boundaries and tournament start are worth a snapshot.
    pub fn is_key_moment(&self) -> bool {
        matches!(
            self,
            GameEvent::TournamentCreated { .. }
                | GameEvent::HandCompleted { .. }
                | GameEvent::TournamentCompleted { .. }
        )
    }

    /// The action an action event records, as it would be requested again.
    pub(crate) fn as_player_action(&self) -> Option<(PlayerId, PlayerAction, ValidatedActionRecord)> {
        let (id, action, record) = match self {
            GameEvent::PlayerFolded { player_id } => {
                (player_id, PlayerAction::Fold, ValidatedActionRecord::Fold)
            }
            GameEvent::PlayerChecked { player_id } => {
                (player_id, PlayerAction::Check, ValidatedActionRecord::Check)
            }
            GameEvent::PlayerCalled { player_id, amount } => (
                player_id,
                PlayerAction::Call,
                ValidatedActionRecord::Call { amount: *amount },
            ),
            GameEvent::PlayerRaised {
                player_id,
                to,
                amount,
            } => (
                player_id,
                PlayerAction::Raise(*to),
                ValidatedActionRecord::Raise {
                    to: *to,
                    amount: *amount,
                },
            ),
            GameEvent::PlayerAllIn { player_id, amount } => (
                player_id,
                PlayerAction::AllIn,
                ValidatedActionRecord::AllIn { amount: *amount },
            ),
            _ => return None,
        };
        Some((id.clone(), action, record))
    }
}

impl From<AppliedAction> for GameEvent {
    fn from(applied: AppliedAction) -> Self {
        let player_id = applied.player_id;
        match applied.action {
            ValidatedActionRecord::Fold => GameEvent::PlayerFolded { player_id },
            ValidatedActionRecord::Check => GameEvent::PlayerChecked { player_id },
            ValidatedActionRecord::Call { amount } => GameEvent::PlayerCalled { player_id, amount },
            ValidatedActionRecord::Raise { to, amount } => GameEvent::PlayerRaised {
                player_id,
                to,
                amount,
            },
            ValidatedActionRecord::AllIn { amount } => GameEvent::PlayerAllIn { player_id, amount },
        }
    }
}
