use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::Card;

/// Tournament-unique player identifier supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An action requested by a player during a betting round.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum PlayerAction {
    /// Fold and forfeit the hand
    Fold,
    /// Check (only valid if nothing to call)
    Check,
    /// Match the current bet
    Call,
    /// Raise so the player's street commitment totals the given amount
    Raise(u64),
    /// Commit every remaining chip
    AllIn,
}

/// Kinds of action a player may be offered, without amounts.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
    AllIn,
}

/// A seated tournament player with their chip stack and hole cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    id: PlayerId,
    chips: u64,
    seat: usize,
    eliminated: bool,
    /// Private; never part of serialized public state.
    #[serde(skip)]
    hole: Option<[Card; 2]>,
}

impl Player {
    pub fn new(id: PlayerId, chips: u64, seat: usize) -> Self {
        Self {
            id,
            chips,
            seat,
            eliminated: false,
            hole: None,
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }
    pub fn chips(&self) -> u64 {
        self.chips
    }
    pub fn seat(&self) -> usize {
        self.seat
    }
    pub fn is_eliminated(&self) -> bool {
        self.eliminated
    }

    pub fn hole_cards(&self) -> Option<[Card; 2]> {
        self.hole
    }

    pub(crate) fn set_hole_cards(&mut self, cards: [Card; 2]) {
        self.hole = Some(cards);
    }

    pub(crate) fn clear_cards(&mut self) {
        self.hole = None;
    }

    pub(crate) fn set_chips(&mut self, chips: u64) {
        self.chips = chips;
    }

    pub(crate) fn add_chips(&mut self, amount: u64) {
        self.chips = self.chips.saturating_add(amount);
    }

    pub(crate) fn eliminate(&mut self) {
        self.eliminated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    #[test]
    fn hole_cards_are_not_serialized() {
        let mut p = Player::new(PlayerId::new("alice"), 1000, 0);
        p.set_hole_cards([
            Card::new(Rank::Ace, Suit::Spades),
            Card::new(Rank::King, Suit::Spades),
        ]);
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("Ace"));
        let back: Player = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hole_cards(), None);
        assert_eq!(back.chips(), 1000);
    }

    #[test]
    fn action_serializes_with_amount() {
        let json = serde_json::to_value(PlayerAction::Raise(60)).unwrap();
        assert_eq!(json["type"], "raise");
        assert_eq!(json["amount"], 60);
    }
}
