use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::betting::{AppliedAction, BettingRound, RoundSeat, Street};
use crate::cards::Card;
use crate::deck::Deck;
use crate::errors::GameError;
use crate::events::{GameEvent, HandResult, Payout, PotResult, SeatAssignment, ShowdownHand};
use crate::hand::{best_hand, determine_winners, HandStrength};
use crate::player::{Player, PlayerAction, PlayerId};
use crate::private_state::PrivateHandState;

/// Hard cap on seats; 10 players use 28 of the 36 cards with burns.
pub const MAX_PLAYERS: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    HandComplete,
    TournamentComplete,
}

impl Phase {
    /// True while a hand is being bet.
    pub fn is_betting(self) -> bool {
        matches!(
            self,
            Phase::Preflop | Phase::Flop | Phase::Turn | Phase::River
        )
    }
}

impl From<Street> for Phase {
    fn from(street: Street) -> Self {
        match street {
            Street::Preflop => Phase::Preflop,
            Street::Flop => Phase::Flop,
            Street::Turn => Phase::Turn,
            Street::River => Phase::River,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Waiting => "waiting",
            Phase::Preflop => "preflop",
            Phase::Flop => "flop",
            Phase::Turn => "turn",
            Phase::River => "river",
            Phase::HandComplete => "hand_complete",
            Phase::TournamentComplete => "tournament_complete",
        };
        f.write_str(s)
    }
}

/// State of one tournament table across hands.
///
/// Public state changes only through [`GameState::apply`]. The live commands
/// [`GameState::start_hand`] and [`GameState::act`] use the private deck and
/// hole cards to decide which events happen, apply them, and hand them back
/// for publishing. Applying the same events to [`GameState::empty`] rebuilds
/// the same public state.
///
/// Serializing a `GameState` yields public state only. Hole cards turned up
/// at the last showdown live in memory only, for the players who saw them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameState {
    players: Vec<Player>,
    board: Vec<Card>,
    pot: u64,
    phase: Phase,
    hand_number: u64,
    button_seat: Option<usize>,
    small_blind: u64,
    big_blind: u64,
    round: Option<BettingRound>,
    last_result: Option<HandResult>,
    #[serde(skip)]
    deck: Option<Deck>,
    #[serde(skip)]
    dealt_deck: Option<Vec<Card>>,
    #[serde(skip)]
    revealed: Vec<(PlayerId, [Card; 2])>,
}

impl GameState {
    /// State before any event; the starting point for replay.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seats the entrants in the given order and returns the creation event.
    pub fn create(
        entrants: Vec<(PlayerId, u64)>,
        small_blind: u64,
        big_blind: u64,
    ) -> Result<(Self, GameEvent), GameError> {
        if entrants.len() < 2 || entrants.len() > MAX_PLAYERS {
            return Err(GameError::InvalidSetup(format!(
                "tournament needs 2 to {MAX_PLAYERS} players, got {}",
                entrants.len()
            )));
        }
        let unique: BTreeSet<&PlayerId> = entrants.iter().map(|(id, _)| id).collect();
        if unique.len() != entrants.len() {
            return Err(GameError::InvalidSetup("duplicate player id".into()));
        }
        if let Some((id, _)) = entrants.iter().find(|(_, chips)| *chips == 0) {
            return Err(GameError::InvalidSetup(format!(
                "player {id} has no starting chips"
            )));
        }
        if small_blind == 0 || big_blind < small_blind {
            return Err(GameError::InvalidSetup(format!(
                "invalid blinds {small_blind}/{big_blind}"
            )));
        }

        let event = GameEvent::TournamentCreated {
            players: entrants
                .into_iter()
                .enumerate()
                .map(|(seat, (player_id, chips))| SeatAssignment {
                    player_id,
                    seat,
                    chips,
                })
                .collect(),
            small_blind,
            big_blind,
        };
        let mut state = Self::empty();
        state.apply(&event)?;
        Ok((state, event))
    }

    /// Shuffles, deals hole cards and posts blinds for the next hand.
    pub fn start_hand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<GameEvent>, GameError> {
        match self.phase {
            Phase::Waiting | Phase::HandComplete => {}
            Phase::TournamentComplete => return Err(GameError::TournamentComplete),
            _ => return Err(GameError::HandInProgress),
        }
        let button_seat = self.next_button_seat().ok_or(GameError::NotEnoughPlayers)?;
        if self.players.iter().filter(|p| !p.is_eliminated()).count() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }

        let started = GameEvent::HandStarted {
            hand_number: self.hand_number + 1,
            button_seat,
            small_blind: self.small_blind,
            big_blind: self.big_blind,
        };
        self.apply(&started)?;
        self.deal_hole_cards(Deck::shuffled(rng))?;

        let mut events = vec![started];
        self.advance(&mut events)?;
        Ok(events)
    }

    /// Applies a player's action and whatever follows from it.
    pub fn act(
        &mut self,
        player_id: &PlayerId,
        action: PlayerAction,
    ) -> Result<Vec<GameEvent>, GameError> {
        if self.phase == Phase::TournamentComplete {
            return Err(GameError::TournamentComplete);
        }
        if self.player(player_id).is_none() {
            return Err(GameError::UnknownPlayer(player_id.clone()));
        }
        let applied = self.play(player_id, action)?;
        let mut events = vec![GameEvent::from(applied)];
        self.advance(&mut events)?;
        Ok(events)
    }

    /// Applies one public event.
    pub fn apply(&mut self, event: &GameEvent) -> Result<(), GameError> {
        match event {
            GameEvent::TournamentCreated {
                players,
                small_blind,
                big_blind,
            } => {
                if !self.players.is_empty() {
                    return Err(self.unexpected(event));
                }
                self.players = players
                    .iter()
                    .map(|a| Player::new(a.player_id.clone(), a.chips, a.seat))
                    .collect();
                self.players.sort_by_key(|p| p.seat());
                self.small_blind = *small_blind;
                self.big_blind = *big_blind;
                self.phase = Phase::Waiting;
            }
            GameEvent::HandStarted {
                hand_number,
                button_seat,
                small_blind,
                big_blind,
            } => {
                if !matches!(self.phase, Phase::Waiting | Phase::HandComplete) {
                    return Err(self.unexpected(event));
                }
                if *hand_number != self.hand_number + 1 {
                    return Err(GameError::ReplayDiverged(format!(
                        "hand {hand_number} follows hand {}",
                        self.hand_number
                    )));
                }
                let seats: Vec<RoundSeat> = self
                    .hand_order(*button_seat)?
                    .into_iter()
                    .map(|p| RoundSeat::new(p.id().clone(), p.chips()))
                    .collect();
                let round = BettingRound::new(seats, *small_blind, *big_blind, Street::Preflop)?;

                for p in &mut self.players {
                    p.clear_cards();
                }
                self.board.clear();
                self.last_result = None;
                self.deck = None;
                self.dealt_deck = None;
                self.revealed.clear();
                self.hand_number = *hand_number;
                self.button_seat = Some(*button_seat);
                self.small_blind = *small_blind;
                self.big_blind = *big_blind;
                self.round = Some(round);
                self.phase = Phase::Preflop;
                self.sync_from_round();
            }
            GameEvent::PlayerFolded { .. }
            | GameEvent::PlayerChecked { .. }
            | GameEvent::PlayerCalled { .. }
            | GameEvent::PlayerRaised { .. }
            | GameEvent::PlayerAllIn { .. } => {
                let Some((player_id, action, recorded)) = event.as_player_action() else {
                    return Err(self.unexpected(event));
                };
                let applied = self.play(&player_id, action).map_err(|e| {
                    GameError::ReplayDiverged(format!("{} rejected: {e}", event.kind()))
                })?;
                if applied.action != recorded {
                    return Err(GameError::ReplayDiverged(format!(
                        "{player_id} recorded {recorded:?} but replay produced {:?}",
                        applied.action
                    )));
                }
            }
            GameEvent::BettingRoundCompleted { street, pot } => {
                let round = self.completed_round(event)?;
                if round.street() != *street || round.pot() != *pot {
                    return Err(GameError::ReplayDiverged(format!(
                        "round completed on {street:?} with pot {pot}, state has {:?} with pot {}",
                        round.street(),
                        round.pot()
                    )));
                }
                self.pot = *pot;
            }
            GameEvent::CommunityCardsDealt { street, cards } => {
                let round = self.completed_round(event)?;
                if round.street().next() != Some(*street)
                    || cards.len() != street.cards_dealt()
                    || self.board.len() + cards.len() != street.board_len()
                {
                    return Err(self.unexpected(event));
                }
                if cards.iter().any(|c| self.board.contains(c)) {
                    return Err(GameError::ReplayDiverged("card dealt twice".into()));
                }
                let next = round.next_street(*street);
                self.board.extend_from_slice(cards);
                self.round = Some(next);
                self.phase = Phase::from(*street);
                self.sync_from_round();
            }
            GameEvent::HandCompleted { result } => {
                let round = self.completed_round(event)?;
                let paid: u64 = result.payouts.iter().map(|p| p.amount).sum();
                if paid != round.pot() {
                    return Err(GameError::Accounting(format!(
                        "payouts of {paid} for a pot of {}",
                        round.pot()
                    )));
                }
                for payout in &result.payouts {
                    self.player_mut(&payout.player_id)
                        .ok_or_else(|| GameError::UnknownPlayer(payout.player_id.clone()))?
                        .add_chips(payout.amount);
                }
                let busted: Vec<PlayerId> = self
                    .players
                    .iter()
                    .filter(|p| !p.is_eliminated() && p.chips() == 0)
                    .map(|p| p.id().clone())
                    .collect();
                if busted != result.eliminated {
                    return Err(GameError::ReplayDiverged(format!(
                        "eliminations {:?} differ from recorded {:?}",
                        busted, result.eliminated
                    )));
                }
                // known live only; a replayed hand has no hole cards to show
                let revealed: Vec<(PlayerId, [Card; 2])> = result
                    .showdown
                    .iter()
                    .filter_map(|s| {
                        self.player(&s.player_id)
                            .and_then(|p| p.hole_cards())
                            .map(|cards| (s.player_id.clone(), cards))
                    })
                    .collect();
                for p in &mut self.players {
                    if p.chips() == 0 {
                        p.eliminate();
                    }
                    p.clear_cards();
                }
                self.revealed = revealed;
                self.round = None;
                self.deck = None;
                self.dealt_deck = None;
                self.pot = 0;
                self.phase = Phase::HandComplete;
                self.last_result = Some(result.clone());
            }
            GameEvent::TournamentCompleted { winner } => {
                if self.phase != Phase::HandComplete {
                    return Err(self.unexpected(event));
                }
                if self.sole_survivor().as_ref() != Some(winner) {
                    return Err(GameError::ReplayDiverged(format!(
                        "{winner} is not the last player with chips"
                    )));
                }
                self.phase = Phase::TournamentComplete;
            }
        }
        Ok(())
    }

    /// Hole cards and deck of the hand in progress.
    pub fn private_state(&self) -> Option<PrivateHandState> {
        if !self.phase.is_betting() {
            return None;
        }
        let round = self.round.as_ref()?;
        let deck = self.dealt_deck.clone()?;
        let hole_cards = round
            .seats()
            .iter()
            .map(|s| {
                self.player(&s.player_id)
                    .and_then(|p| p.hole_cards())
                    .map(|cards| (s.player_id.clone(), cards))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(PrivateHandState {
            hand_number: self.hand_number,
            hole_cards,
            deck,
        })
    }

    /// Merges recovered private state into a replayed mid-hand state.
    ///
    /// The deck is advanced past the community cards already on the public
    /// board; a deck whose order disagrees with that board is rejected.
    pub fn restore_private(&mut self, private: PrivateHandState) -> Result<(), GameError> {
        if !self.phase.is_betting() {
            return Err(GameError::NoHandInProgress);
        }
        if private.hand_number != self.hand_number {
            return Err(GameError::PrivateStateMismatch(format!(
                "private state is for hand {}, table is on hand {}",
                private.hand_number, self.hand_number
            )));
        }
        let seated: Vec<PlayerId> = self
            .round
            .as_ref()
            .ok_or(GameError::NoHandInProgress)?
            .seats()
            .iter()
            .map(|s| s.player_id.clone())
            .collect();
        if private.hole_cards.len() != seated.len() {
            return Err(GameError::PrivateStateMismatch(format!(
                "{} hands dealt, {} players in the hand",
                private.hole_cards.len(),
                seated.len()
            )));
        }
        let mut holes = Vec::with_capacity(seated.len());
        for id in &seated {
            let cards = private.hole_cards_of(id).ok_or_else(|| {
                GameError::PrivateStateMismatch(format!("no hole cards for {id}"))
            })?;
            holes.push((id.clone(), cards));
        }

        let mut deck = Deck::from_cards(private.deck.clone());
        for street in [Street::Flop, Street::Turn, Street::River] {
            if self.board.len() < street.board_len() {
                break;
            }
            deck.burn_card().ok_or(GameError::DeckExhausted)?;
            let cards = deck
                .deal_n(street.cards_dealt())
                .ok_or(GameError::DeckExhausted)?;
            let from = street.board_len() - street.cards_dealt();
            if cards[..] != self.board[from..street.board_len()] {
                return Err(GameError::PrivateStateMismatch(format!(
                    "deck order contradicts the {street:?}"
                )));
            }
        }

        for (id, cards) in holes {
            if let Some(p) = self.player_mut(&id) {
                p.set_hole_cards(cards);
            }
        }
        self.deck = Some(deck);
        self.dealt_deck = Some(private.deck);
        Ok(())
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }
    pub fn board(&self) -> &[Card] {
        &self.board
    }
    pub fn pot(&self) -> u64 {
        self.pot
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn hand_number(&self) -> u64 {
        self.hand_number
    }
    pub fn button_seat(&self) -> Option<usize> {
        self.button_seat
    }
    pub fn blinds(&self) -> (u64, u64) {
        (self.small_blind, self.big_blind)
    }
    pub fn round(&self) -> Option<&BettingRound> {
        self.round.as_ref()
    }
    pub fn last_result(&self) -> Option<&HandResult> {
        self.last_result.as_ref()
    }

    /// Hole cards shown at the last showdown, in showdown order.
    pub fn revealed(&self) -> &[(PlayerId, [Card; 2])] {
        &self.revealed
    }

    /// Chips behind plus chips in the pot.
    pub fn total_chips(&self) -> u64 {
        self.players.iter().map(|p| p.chips()).sum::<u64>() + self.pot
    }

    /// The only player left with chips, once a hand has finished.
    pub fn sole_survivor(&self) -> Option<PlayerId> {
        if !matches!(self.phase, Phase::HandComplete | Phase::TournamentComplete) {
            return None;
        }
        let mut alive = self.players.iter().filter(|p| !p.is_eliminated());
        match (alive.next(), alive.next()) {
            (Some(p), None) => Some(p.id().clone()),
            _ => None,
        }
    }

    fn play(&mut self, player_id: &PlayerId, action: PlayerAction) -> Result<AppliedAction, GameError> {
        if !self.phase.is_betting() {
            return Err(GameError::NoHandInProgress);
        }
        let round = self.round.as_mut().ok_or(GameError::NoHandInProgress)?;
        let applied = round.process_action(player_id, action)?;
        self.sync_from_round();
        Ok(applied)
    }

    // Emits the events that follow once a betting round closes: the next
    // street, a run-out when nobody can bet, the showdown, or a fold win.
    fn advance(&mut self, events: &mut Vec<GameEvent>) -> Result<(), GameError> {
        loop {
            let (street, pot, live) = match &self.round {
                Some(round) if round.is_complete() => {
                    (round.street(), round.pot(), round.live_count())
                }
                _ => return Ok(()),
            };
            self.emit(events, GameEvent::BettingRoundCompleted { street, pot })?;

            if live <= 1 {
                let result = self.uncontested_result()?;
                self.emit(events, GameEvent::HandCompleted { result })?;
                break;
            }
            match street.next() {
                Some(next) => {
                    let cards = self.deal_street(next)?;
                    self.emit(events, GameEvent::CommunityCardsDealt { street: next, cards })?;
                }
                None => {
                    let result = self.showdown_result()?;
                    self.emit(events, GameEvent::HandCompleted { result })?;
                    break;
                }
            }
        }
        if let Some(winner) = self.sole_survivor() {
            self.emit(events, GameEvent::TournamentCompleted { winner })?;
        }
        Ok(())
    }

    fn emit(&mut self, events: &mut Vec<GameEvent>, event: GameEvent) -> Result<(), GameError> {
        self.apply(&event)?;
        events.push(event);
        Ok(())
    }

    // Two passes round the table starting left of the button.
    fn deal_hole_cards(&mut self, mut deck: Deck) -> Result<(), GameError> {
        let order: Vec<PlayerId> = self
            .round
            .as_ref()
            .ok_or(GameError::NoHandInProgress)?
            .seats()
            .iter()
            .map(|s| s.player_id.clone())
            .collect();
        let n = order.len();
        let mut dealt: BTreeMap<PlayerId, Vec<Card>> = BTreeMap::new();
        for _ in 0..2 {
            for i in 1..=n {
                let card = deck.deal_card().ok_or(GameError::DeckExhausted)?;
                dealt.entry(order[i % n].clone()).or_default().push(card);
            }
        }
        for (id, cards) in dealt {
            if let (Some(p), [a, b]) = (self.player_mut(&id), cards.as_slice()) {
                p.set_hole_cards([*a, *b]);
            }
        }
        self.dealt_deck = Some(deck.undealt().to_vec());
        self.deck = Some(deck);
        Ok(())
    }

    fn deal_street(&mut self, street: Street) -> Result<Vec<Card>, GameError> {
        let deck = self
            .deck
            .as_mut()
            .ok_or_else(|| GameError::PrivateStateMismatch("deck unavailable".into()))?;
        deck.burn_card().ok_or(GameError::DeckExhausted)?;
        deck.deal_n(street.cards_dealt())
            .ok_or(GameError::DeckExhausted)
    }

    fn uncontested_result(&self) -> Result<HandResult, GameError> {
        let round = self.round.as_ref().ok_or(GameError::NoHandInProgress)?;
        let winner = round
            .live_players()
            .into_iter()
            .next()
            .ok_or_else(|| GameError::Accounting("hand ended with no live player".into()))?;
        let payouts = vec![Payout {
            player_id: winner.clone(),
            amount: round.pot(),
        }];
        Ok(HandResult {
            hand_number: self.hand_number,
            pots: vec![PotResult {
                amount: round.pot(),
                eligible: vec![winner.clone()],
                winners: vec![winner],
            }],
            eliminated: self.busted_after(&payouts),
            payouts,
            showdown: Vec::new(),
        })
    }

    fn showdown_result(&self) -> Result<HandResult, GameError> {
        let round = self.round.as_ref().ok_or(GameError::NoHandInProgress)?;

        let mut strengths: Vec<(PlayerId, HandStrength)> = Vec::new();
        let mut showdown = Vec::new();
        for id in round.live_players() {
            let hole = self
                .player(&id)
                .and_then(|p| p.hole_cards())
                .ok_or_else(|| GameError::PrivateStateMismatch(format!("no hole cards for {id}")))?;
            let mut cards = hole.to_vec();
            cards.extend_from_slice(&self.board);
            let best = best_hand(&cards)?;
            strengths.push((id.clone(), best.strength));
            showdown.push(ShowdownHand {
                player_id: id,
                category: best.strength.category,
                strength: best.strength,
            });
        }

        // odd chips go clockwise starting with the first seat after the button
        let seats = round.seats();
        let odd_chip_order: Vec<&PlayerId> = seats[1..]
            .iter()
            .chain(seats.iter().take(1))
            .map(|s| &s.player_id)
            .collect();
        let position = |id: &PlayerId| odd_chip_order.iter().position(|o| *o == id);

        let mut credited: BTreeMap<PlayerId, u64> = BTreeMap::new();
        let mut pots = Vec::new();
        for pot in round.hand_side_pots() {
            let contenders: Vec<(PlayerId, HandStrength)> = strengths
                .iter()
                .filter(|(id, _)| pot.eligible.contains(id))
                .cloned()
                .collect();
            let mut winners = determine_winners(&contenders);
            if winners.is_empty() {
                return Err(GameError::Accounting(format!(
                    "pot of {} has no eligible winner",
                    pot.amount
                )));
            }
            winners.sort_by_key(|w| position(w));
            let share = pot.amount / winners.len() as u64;
            let mut remainder = pot.amount % winners.len() as u64;
            for w in &winners {
                let odd = u64::from(remainder > 0);
                remainder -= odd;
                *credited.entry(w.clone()).or_insert(0) += share + odd;
            }
            pots.push(PotResult {
                amount: pot.amount,
                eligible: pot.eligible,
                winners,
            });
        }

        let payouts: Vec<Payout> = seats
            .iter()
            .filter_map(|s| {
                credited.get(&s.player_id).map(|amount| Payout {
                    player_id: s.player_id.clone(),
                    amount: *amount,
                })
            })
            .collect();
        Ok(HandResult {
            hand_number: self.hand_number,
            pots,
            eliminated: self.busted_after(&payouts),
            payouts,
            showdown,
        })
    }

    fn busted_after(&self, payouts: &[Payout]) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| !p.is_eliminated())
            .filter(|p| {
                let won: u64 = payouts
                    .iter()
                    .filter(|w| &w.player_id == p.id())
                    .map(|w| w.amount)
                    .sum();
                p.chips() + won == 0
            })
            .map(|p| p.id().clone())
            .collect()
    }

    /// First hand: lowest occupied seat. Afterwards: next seat clockwise from
    /// the previous button that still has a player, skipping eliminations.
    fn next_button_seat(&self) -> Option<usize> {
        let seats: Vec<usize> = self
            .players
            .iter()
            .filter(|p| !p.is_eliminated())
            .map(|p| p.seat())
            .collect();
        match self.button_seat {
            None => seats.first().copied(),
            Some(prev) => seats
                .iter()
                .copied()
                .find(|&s| s > prev)
                .or_else(|| seats.first().copied()),
        }
    }

    // Players still in the tournament, clockwise starting at the button.
    fn hand_order(&self, button_seat: usize) -> Result<Vec<&Player>, GameError> {
        let active: Vec<&Player> = self.players.iter().filter(|p| !p.is_eliminated()).collect();
        let start = active
            .iter()
            .position(|p| p.seat() == button_seat)
            .ok_or_else(|| {
                GameError::ReplayDiverged(format!("button on empty seat {button_seat}"))
            })?;
        if active.len() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }
        let mut ordered = active[start..].to_vec();
        ordered.extend_from_slice(&active[..start]);
        Ok(ordered)
    }

    fn completed_round(&self, event: &GameEvent) -> Result<&BettingRound, GameError> {
        match &self.round {
            Some(round) if self.phase.is_betting() && round.is_complete() => Ok(round),
            _ => Err(self.unexpected(event)),
        }
    }

    fn sync_from_round(&mut self) {
        let Some(round) = &self.round else {
            return;
        };
        for seat in round.seats() {
            if let Some(p) = self.players.iter_mut().find(|p| p.id() == &seat.player_id) {
                p.set_chips(seat.stack);
            }
        }
        self.pot = round.pot();
    }

    fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == id)
    }

    fn unexpected(&self, event: &GameEvent) -> GameError {
        GameError::UnexpectedEvent {
            event: event.kind(),
            phase: self.phase.to_string(),
        }
    }
}
