use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::events::HandResult;
use crate::game::{GameState, Phase};
use crate::player::{ActionKind, PlayerId};
use crate::pot::SidePot;

/// A seat as any viewer may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: PlayerId,
    pub seat: usize,
    pub chips: u64,
    pub eliminated: bool,
    pub is_button: bool,
    pub folded: bool,
    pub all_in: bool,
    pub committed_this_street: u64,
    pub hole_cards: Option<[Card; 2]>,
}

/// Betting context of the street in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingView {
    pub acting_player: Option<PlayerId>,
    pub current_bet: u64,
    pub to_call: u64,
    pub min_raise_to: u64,
    pub valid_actions: Vec<ActionKind>,
    pub side_pots: Vec<SidePot>,
}

/// Table state filtered for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicState {
    pub phase: Phase,
    pub hand_number: u64,
    pub button_seat: Option<usize>,
    pub small_blind: u64,
    pub big_blind: u64,
    pub board: Vec<Card>,
    pub pot: u64,
    pub players: Vec<PublicPlayer>,
    pub betting: Option<BettingView>,
    pub last_result: Option<HandResult>,
}

impl GameState {
    /// Public state as `viewer` sees it.
    ///
    /// A player sees their own hole cards while the hand runs. The hands
    /// turned up at the last showdown are shown only to the players who took
    /// part in it. `to_call` and `valid_actions` are those of the acting
    /// player.
    pub fn public_view(&self, viewer: Option<&PlayerId>) -> PublicState {
        let round = self.round();
        let revealed = self.revealed();
        let saw_showdown = viewer.is_some_and(|v| revealed.iter().any(|(id, _)| id == v));

        let players = self
            .players()
            .iter()
            .map(|p| {
                let own = p.hole_cards().filter(|_| viewer == Some(p.id()));
                let shown = revealed
                    .iter()
                    .find(|(id, _)| saw_showdown && id == p.id())
                    .map(|(_, cards)| *cards);
                PublicPlayer {
                    id: p.id().clone(),
                    seat: p.seat(),
                    chips: p.chips(),
                    eliminated: p.is_eliminated(),
                    is_button: self.button_seat() == Some(p.seat()),
                    folded: round.is_some_and(|r| r.is_folded(p.id())),
                    all_in: round.is_some_and(|r| r.is_all_in(p.id())),
                    committed_this_street: round
                        .map(|r| r.committed_this_street(p.id()))
                        .unwrap_or(0),
                    hole_cards: own.or(shown),
                }
            })
            .collect();

        let betting = round.filter(|_| self.phase().is_betting()).map(|r| {
            let acting = r.acting_player().cloned();
            BettingView {
                to_call: acting.as_ref().map(|id| r.to_call(id)).unwrap_or(0),
                acting_player: acting,
                current_bet: r.current_bet(),
                min_raise_to: r.min_raise_to(),
                valid_actions: r.valid_actions(),
                side_pots: r.hand_side_pots(),
            }
        });

        let (small_blind, big_blind) = self.blinds();
        PublicState {
            phase: self.phase(),
            hand_number: self.hand_number(),
            button_seat: self.button_seat(),
            small_blind,
            big_blind,
            board: self.board().to_vec(),
            pot: self.pot(),
            players,
            betting,
            last_result: self.last_result().cloned(),
        }
    }
}
