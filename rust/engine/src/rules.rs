use crate::errors::BettingError;
use crate::player::{ActionKind, PlayerAction as A};

/// An action after validation, with the chips it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatedAction {
    Fold,
    Check,
    /// Chips added to match the current bet
    Call(u64),
    /// New street commitment `to`, moving `amount` chips from the stack
    Raise { to: u64, amount: u64 },
    /// Whole remaining stack
    AllIn(u64),
}

/// Validates a player action according to betting rules and stack size.
///
/// Converts a [`crate::player::PlayerAction`] into a [`ValidatedAction`],
/// enforcing the minimum raise and turning stack-sized calls and raises
/// into all-ins.
///
/// # Arguments
///
/// * `stack` - Player's remaining chips
/// * `committed` - What the player already put in this street
/// * `current_bet` - Highest street commitment so far
/// * `min_raise_to` - Smallest legal total for a raise
/// * `action` - The action the player wishes to perform
///
/// # Errors
///
/// - [`BettingError::InvalidAction`] - check facing a bet, call with nothing to call
/// - [`BettingError::InsufficientChips`] - raise beyond the stack
/// - [`BettingError::BelowMinimumRaise`] - raise smaller than a full raise
///
/// # Examples
///
/// ```
/// use shortdeck_engine::rules::{validate_action, ValidatedAction};
/// use shortdeck_engine::player::PlayerAction;
///
/// // facing 20 with 10 in: calling costs 10
/// let result = validate_action(990, 10, 20, 40, PlayerAction::Call);
/// assert_eq!(result, Ok(ValidatedAction::Call(10)));
///
/// // raising to the whole stack is an all-in
/// let result = validate_action(990, 10, 20, 40, PlayerAction::Raise(1000));
/// assert_eq!(result, Ok(ValidatedAction::AllIn(990)));
/// ```
pub fn validate_action(
    stack: u64,
    committed: u64,
    current_bet: u64,
    min_raise_to: u64,
    action: A,
) -> Result<ValidatedAction, BettingError> {
    let to_call = current_bet.saturating_sub(committed);
    match action {
        A::Fold => Ok(ValidatedAction::Fold),
        A::Check => {
            if to_call == 0 {
                Ok(ValidatedAction::Check)
            } else {
                Err(BettingError::invalid(format!(
                    "cannot check facing a bet of {to_call}"
                )))
            }
        }
        A::Call => {
            if to_call == 0 {
                Err(BettingError::invalid("nothing to call"))
            } else if stack <= to_call {
                Ok(ValidatedAction::AllIn(stack))
            } else {
                Ok(ValidatedAction::Call(to_call))
            }
        }
        A::Raise(to) => {
            let max_to = committed + stack;
            if to > max_to {
                Err(BettingError::InsufficientChips {
                    needed: to.saturating_sub(committed),
                    available: stack,
                })
            } else if to == max_to {
                Ok(ValidatedAction::AllIn(stack))
            } else if to < min_raise_to {
                Err(BettingError::BelowMinimumRaise {
                    amount: to,
                    minimum: min_raise_to,
                })
            } else {
                Ok(ValidatedAction::Raise {
                    to,
                    amount: to - committed,
                })
            }
        }
        A::AllIn => {
            if stack == 0 {
                Err(BettingError::InsufficientChips {
                    needed: 1,
                    available: 0,
                })
            } else {
                Ok(ValidatedAction::AllIn(stack))
            }
        }
    }
}

/// Actions open to a player in the given spot.
pub fn available_actions(
    stack: u64,
    committed: u64,
    current_bet: u64,
    min_raise_to: u64,
) -> Vec<ActionKind> {
    let to_call = current_bet.saturating_sub(committed);
    let mut actions = vec![ActionKind::Fold];
    if to_call == 0 {
        actions.push(ActionKind::Check);
    } else if stack > to_call {
        actions.push(ActionKind::Call);
    }
    if committed + stack > min_raise_to {
        actions.push(ActionKind::Raise);
    }
    if stack > 0 {
        actions.push(ActionKind::AllIn);
    }
    actions
}
