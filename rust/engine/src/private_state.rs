use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::player::PlayerId;

/// Everything about a hand that must stay hidden: every player's hole cards
/// and the deck order right after the hole cards were dealt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateHandState {
    pub hand_number: u64,
    pub hole_cards: Vec<(PlayerId, [Card; 2])>,
    pub deck: Vec<Card>,
}

impl PrivateHandState {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn hole_cards_of(&self, player_id: &PlayerId) -> Option<[Card; 2]> {
        self.hole_cards
            .iter()
            .find(|(id, _)| id == player_id)
            .map(|(_, cards)| *cards)
    }
}
