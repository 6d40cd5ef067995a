use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{BettingError, GameError};
use crate::player::{ActionKind, PlayerAction, PlayerId};
use crate::pot::{compute_side_pots, SidePot};
use crate::rules::{available_actions, validate_action, ValidatedAction};

/// One betting round of a hand.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    pub fn next(self) -> Option<Street> {
        match self {
            Street::Preflop => Some(Street::Flop),
            Street::Flop => Some(Street::Turn),
            Street::Turn => Some(Street::River),
            Street::River => None,
        }
    }

    /// Community cards dealt when this street opens.
    pub fn cards_dealt(self) -> usize {
        match self {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn | Street::River => 1,
        }
    }

    /// Board size once this street is open.
    pub fn board_len(self) -> usize {
        match self {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River => 5,
        }
    }
}

/// A player's seat in a betting round with the chips behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSeat {
    pub player_id: PlayerId,
    pub stack: u64,
}

impl RoundSeat {
    pub fn new(player_id: PlayerId, stack: u64) -> Self {
        Self { player_id, stack }
    }
}

/// What a processed action did, with the chips it moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAction {
    pub player_id: PlayerId,
    pub action: ValidatedActionRecord,
}

/// Serializable mirror of [`ValidatedAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidatedActionRecord {
    Fold,
    Check,
    Call { amount: u64 },
    Raise { to: u64, amount: u64 },
    AllIn { amount: u64 },
}

impl From<ValidatedAction> for ValidatedActionRecord {
    fn from(a: ValidatedAction) -> Self {
        match a {
            ValidatedAction::Fold => ValidatedActionRecord::Fold,
            ValidatedAction::Check => ValidatedActionRecord::Check,
            ValidatedAction::Call(amount) => ValidatedActionRecord::Call { amount },
            ValidatedAction::Raise { to, amount } => ValidatedActionRecord::Raise { to, amount },
            ValidatedAction::AllIn(amount) => ValidatedActionRecord::AllIn { amount },
        }
    }
}

/// State machine for a single street.
///
/// Seats are ordered clockwise starting with the button. Heads-up the button
/// posts the small blind and acts first preflop; with three or more players
/// the seat after the big blind opens preflop. Postflop the first live seat
/// after the button opens.
///
/// Rejected actions leave the round untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingRound {
    street: Street,
    small_blind: u64,
    big_blind: u64,
    seats: Vec<RoundSeat>,
    pot: u64,
    current_bet: u64,
    street_committed: BTreeMap<PlayerId, u64>,
    hand_committed: BTreeMap<PlayerId, u64>,
    acting: Option<usize>,
    folded: BTreeSet<PlayerId>,
    all_in: BTreeSet<PlayerId>,
    owes_action: BTreeSet<PlayerId>,
    last_raise: u64,
    last_raiser: Option<PlayerId>,
    // acted since the last full raise and then faced a short all-in: call or fold only
    #[serde(default)]
    raise_closed: BTreeSet<PlayerId>,
}

impl BettingRound {
    /// Opens a round. On the preflop street the blinds are posted; a stack
    /// smaller than its blind posts everything and goes all-in.
    pub fn new(
        players: Vec<RoundSeat>,
        small_blind: u64,
        big_blind: u64,
        street: Street,
    ) -> Result<Self, GameError> {
        if players.len() < 2 {
            return Err(GameError::InvalidSetup(
                "a betting round needs at least two players".into(),
            ));
        }
        let unique: BTreeSet<&PlayerId> = players.iter().map(|s| &s.player_id).collect();
        if unique.len() != players.len() {
            return Err(GameError::InvalidSetup("duplicate player in round".into()));
        }
        if small_blind == 0 || big_blind < small_blind {
            return Err(GameError::InvalidSetup(format!(
                "invalid blinds {small_blind}/{big_blind}"
            )));
        }

        let all_in = players
            .iter()
            .filter(|s| s.stack == 0)
            .map(|s| s.player_id.clone())
            .collect();
        let mut round = Self {
            street,
            small_blind,
            big_blind,
            seats: players,
            pot: 0,
            current_bet: 0,
            street_committed: BTreeMap::new(),
            hand_committed: BTreeMap::new(),
            acting: None,
            folded: BTreeSet::new(),
            all_in,
            owes_action: BTreeSet::new(),
            last_raise: big_blind,
            last_raiser: None,
            raise_closed: BTreeSet::new(),
        };

        let n = round.seats.len();
        let first_to_act = if street == Street::Preflop {
            let (sb, bb) = if n == 2 { (0, 1) } else { (1, 2) };
            round.commit(sb, small_blind);
            round.commit(bb, big_blind);
            round.current_bet = round.street_committed.values().copied().max().unwrap_or(0);
            if n == 2 {
                0
            } else {
                3 % n
            }
        } else {
            1 % n
        };
        round.open_action(first_to_act);
        Ok(round)
    }

    /// The next street's round, carrying stacks, pot, folds and all-ins.
    pub fn next_street(&self, street: Street) -> Self {
        let mut round = Self {
            street,
            small_blind: self.small_blind,
            big_blind: self.big_blind,
            seats: self.seats.clone(),
            pot: self.pot,
            current_bet: 0,
            street_committed: BTreeMap::new(),
            hand_committed: self.hand_committed.clone(),
            acting: None,
            folded: self.folded.clone(),
            all_in: self.all_in.clone(),
            owes_action: BTreeSet::new(),
            last_raise: self.big_blind,
            last_raiser: None,
            raise_closed: BTreeSet::new(),
        };
        round.open_action(1 % round.seats.len());
        round
    }

    /// Validates and applies an action from the acting player.
    pub fn process_action(
        &mut self,
        player_id: &PlayerId,
        action: PlayerAction,
    ) -> Result<AppliedAction, BettingError> {
        if self.is_complete() {
            return Err(BettingError::invalid("betting round is complete"));
        }
        let idx = match self.acting {
            Some(idx) if &self.seats[idx].player_id == player_id => idx,
            _ => {
                return Err(BettingError::NotYourTurn {
                    player: player_id.clone(),
                })
            }
        };

        let stack = self.seats[idx].stack;
        let committed = self.committed_this_street(player_id);
        let validated = validate_action(
            stack,
            committed,
            self.current_bet,
            self.min_raise_to(),
            action,
        )?;
        if self.raise_closed.contains(player_id) {
            let raises = match validated {
                ValidatedAction::Raise { .. } => true,
                ValidatedAction::AllIn(amount) => committed + amount > self.current_bet,
                _ => false,
            };
            if raises {
                return Err(BettingError::invalid(
                    "raising is closed after a short all-in",
                ));
            }
        }

        match validated {
            ValidatedAction::Fold => {
                self.folded.insert(player_id.clone());
                self.owes_action.remove(player_id);
            }
            ValidatedAction::Check => {
                self.owes_action.remove(player_id);
            }
            ValidatedAction::Call(amount) => {
                self.commit(idx, amount);
                self.owes_action.remove(player_id);
            }
            ValidatedAction::Raise { to, amount } => {
                self.commit(idx, amount);
                self.last_raise = to - self.current_bet;
                self.current_bet = to;
                self.last_raiser = Some(player_id.clone());
                self.raise_closed.clear();
                self.reopen_action(player_id);
            }
            ValidatedAction::AllIn(amount) => {
                self.commit(idx, amount);
                self.owes_action.remove(player_id);
                let total = committed + amount;
                if total > self.current_bet {
                    let increment = total - self.current_bet;
                    if increment >= self.last_raise {
                        self.last_raise = increment;
                        self.last_raiser = Some(player_id.clone());
                        self.raise_closed.clear();
                    } else {
                        let acted: Vec<PlayerId> = self
                            .seats
                            .iter()
                            .map(|s| &s.player_id)
                            .filter(|id| *id != player_id && self.can_act(id))
                            .filter(|id| !self.owes_action.contains(*id))
                            .cloned()
                            .collect();
                        self.raise_closed.extend(acted);
                    }
                    self.current_bet = total;
                    self.reopen_action(player_id);
                }
            }
        }

        self.settle_owed();
        self.acting = self.next_owed_from(idx + 1);
        Ok(AppliedAction {
            player_id: player_id.clone(),
            action: validated.into(),
        })
    }

    /// Actions open to the acting player; empty once the round is complete.
    pub fn valid_actions(&self) -> Vec<ActionKind> {
        let Some(idx) = self.acting else {
            return Vec::new();
        };
        let seat = &self.seats[idx];
        let mut actions = available_actions(
            seat.stack,
            self.committed_this_street(&seat.player_id),
            self.current_bet,
            self.min_raise_to(),
        );
        if self.raise_closed.contains(&seat.player_id) {
            let to_call = self.to_call(&seat.player_id);
            actions.retain(|a| match a {
                ActionKind::Raise => false,
                ActionKind::AllIn => seat.stack <= to_call,
                _ => true,
            });
        }
        actions
    }

    pub fn is_complete(&self) -> bool {
        self.live_count() <= 1 || self.owes_action.is_empty()
    }

    /// Layered pots from this street's commitments.
    pub fn side_pots(&self) -> Vec<SidePot> {
        compute_side_pots(&self.ordered(&self.street_committed), &self.folded)
    }

    /// Layered pots from the whole hand's commitments.
    pub fn hand_side_pots(&self) -> Vec<SidePot> {
        compute_side_pots(&self.ordered(&self.hand_committed), &self.folded)
    }

    pub fn min_raise_to(&self) -> u64 {
        self.current_bet + self.last_raise
    }

    pub fn to_call(&self, player_id: &PlayerId) -> u64 {
        self.current_bet
            .saturating_sub(self.committed_this_street(player_id))
    }

    pub fn committed_this_street(&self, player_id: &PlayerId) -> u64 {
        self.street_committed.get(player_id).copied().unwrap_or(0)
    }

    pub fn committed_this_hand(&self, player_id: &PlayerId) -> u64 {
        self.hand_committed.get(player_id).copied().unwrap_or(0)
    }

    pub fn acting_player(&self) -> Option<&PlayerId> {
        self.acting.map(|idx| &self.seats[idx].player_id)
    }

    pub fn stack(&self, player_id: &PlayerId) -> Option<u64> {
        self.seats
            .iter()
            .find(|s| &s.player_id == player_id)
            .map(|s| s.stack)
    }

    pub fn live_count(&self) -> usize {
        self.seats.len() - self.folded.len()
    }

    /// Non-folded players in seat order.
    pub fn live_players(&self) -> Vec<PlayerId> {
        self.seats
            .iter()
            .filter(|s| !self.folded.contains(&s.player_id))
            .map(|s| s.player_id.clone())
            .collect()
    }

    pub fn street(&self) -> Street {
        self.street
    }
    pub fn seats(&self) -> &[RoundSeat] {
        &self.seats
    }
    pub fn pot(&self) -> u64 {
        self.pot
    }
    pub fn current_bet(&self) -> u64 {
        self.current_bet
    }
    pub fn small_blind(&self) -> u64 {
        self.small_blind
    }
    pub fn big_blind(&self) -> u64 {
        self.big_blind
    }
    pub fn last_raise(&self) -> u64 {
        self.last_raise
    }
    pub fn last_raiser(&self) -> Option<&PlayerId> {
        self.last_raiser.as_ref()
    }
    pub fn is_folded(&self, player_id: &PlayerId) -> bool {
        self.folded.contains(player_id)
    }
    pub fn is_all_in(&self, player_id: &PlayerId) -> bool {
        self.all_in.contains(player_id)
    }
    pub fn owes_action(&self, player_id: &PlayerId) -> bool {
        self.owes_action.contains(player_id)
    }

    fn commit(&mut self, idx: usize, amount: u64) {
        let seat = &mut self.seats[idx];
        let amount = amount.min(seat.stack);
        seat.stack -= amount;
        let id = seat.player_id.clone();
        if seat.stack == 0 {
            self.all_in.insert(id.clone());
        }
        *self.street_committed.entry(id.clone()).or_insert(0) += amount;
        *self.hand_committed.entry(id).or_insert(0) += amount;
        self.pot += amount;
    }

    fn can_act(&self, player_id: &PlayerId) -> bool {
        !self.folded.contains(player_id) && !self.all_in.contains(player_id)
    }

    fn open_action(&mut self, first_to_act: usize) {
        self.owes_action = self
            .seats
            .iter()
            .filter(|s| self.can_act(&s.player_id))
            .map(|s| s.player_id.clone())
            .collect();
        self.settle_owed();
        self.acting = self.next_owed_from(first_to_act);
    }

    fn reopen_action(&mut self, raiser: &PlayerId) {
        self.owes_action = self
            .seats
            .iter()
            .filter(|s| &s.player_id != raiser && self.can_act(&s.player_id))
            .map(|s| s.player_id.clone())
            .collect();
    }

    // With one player left able to act and nothing to call there is no one
    // to bet against.
    fn settle_owed(&mut self) {
        if self.live_count() <= 1 {
            self.owes_action.clear();
            return;
        }
        let actors: Vec<&PlayerId> = self
            .seats
            .iter()
            .map(|s| &s.player_id)
            .filter(|id| self.can_act(id))
            .collect();
        if let [only] = actors.as_slice() {
            if self.to_call(only) == 0 {
                let only = (*only).clone();
                self.owes_action.remove(&only);
            }
        }
    }

    fn next_owed_from(&self, start: usize) -> Option<usize> {
        if self.is_complete() {
            return None;
        }
        let n = self.seats.len();
        (0..n)
            .map(|offset| (start + offset) % n)
            .find(|&idx| self.owes_action.contains(&self.seats[idx].player_id))
    }

    fn ordered(&self, amounts: &BTreeMap<PlayerId, u64>) -> Vec<(PlayerId, u64)> {
        self.seats
            .iter()
            .map(|s| {
                (
                    s.player_id.clone(),
                    amounts.get(&s.player_id).copied().unwrap_or(0),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(stacks: &[(&str, u64)]) -> Vec<RoundSeat> {
        stacks
            .iter()
            .map(|(id, s)| RoundSeat::new(PlayerId::new(*id), *s))
            .collect()
    }

    fn id(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    #[test]
    fn heads_up_blinds_and_order() {
        let round =
            BettingRound::new(seats(&[("a", 1000), ("b", 1000)]), 10, 20, Street::Preflop).unwrap();
        assert_eq!(round.pot(), 30);
        assert_eq!(round.stack(&id("a")), Some(990));
        assert_eq!(round.stack(&id("b")), Some(980));
        assert_eq!(round.acting_player(), Some(&id("a")));
        assert_eq!(round.min_raise_to(), 40);

        let flop = round.next_street(Street::Flop);
        assert_eq!(flop.acting_player(), Some(&id("b")));
    }

    #[test]
    fn three_handed_preflop_starts_after_big_blind() {
        let round = BettingRound::new(
            seats(&[("btn", 500), ("sb", 500), ("bb", 500)]),
            10,
            20,
            Street::Preflop,
        )
        .unwrap();
        assert_eq!(round.acting_player(), Some(&id("btn")));
        let flop = round.next_street(Street::Flop);
        assert_eq!(flop.acting_player(), Some(&id("sb")));
    }

    #[test]
    fn rejection_leaves_state_unchanged() {
        let mut round =
            BettingRound::new(seats(&[("a", 1000), ("b", 1000)]), 10, 20, Street::Preflop).unwrap();
        let before = round.clone();
        assert!(matches!(
            round.process_action(&id("b"), PlayerAction::Call),
            Err(BettingError::NotYourTurn { .. })
        ));
        assert!(matches!(
            round.process_action(&id("a"), PlayerAction::Raise(30)),
            Err(BettingError::BelowMinimumRaise { .. })
        ));
        assert_eq!(round, before);
    }

    #[test]
    fn big_blind_keeps_option_after_limp() {
        let mut round =
            BettingRound::new(seats(&[("a", 1000), ("b", 1000)]), 10, 20, Street::Preflop).unwrap();
        round.process_action(&id("a"), PlayerAction::Call).unwrap();
        assert!(!round.is_complete());
        assert_eq!(round.acting_player(), Some(&id("b")));
        assert!(round.valid_actions().contains(&ActionKind::Check));
        round.process_action(&id("b"), PlayerAction::Check).unwrap();
        assert!(round.is_complete());
        assert_eq!(round.pot(), 40);
    }

    #[test]
    fn everyone_all_in_on_blinds_completes_immediately() {
        let round =
            BettingRound::new(seats(&[("a", 5), ("b", 15)]), 10, 20, Street::Preflop).unwrap();
        assert!(round.is_complete());
        assert_eq!(round.pot(), 20);
        assert!(round.is_all_in(&id("a")));
        assert!(round.is_all_in(&id("b")));
        assert_eq!(round.acting_player(), None);
    }
}
