use shortdeck_engine::betting::{BettingRound, RoundSeat, Street};
use shortdeck_engine::errors::BettingError;
use shortdeck_engine::player::{ActionKind, PlayerAction, PlayerId};

fn id(s: &str) -> PlayerId {
    PlayerId::new(s)
}

fn round(stacks: &[(&str, u64)], street: Street) -> BettingRound {
    let seats = stacks
        .iter()
        .map(|(name, stack)| RoundSeat::new(id(name), *stack))
        .collect();
    BettingRound::new(seats, 10, 20, street).expect("round")
}

fn chips_in_play(r: &BettingRound) -> u64 {
    r.seats().iter().map(|s| s.stack).sum::<u64>() + r.pot()
}

#[test]
fn blinds_larger_than_stacks_are_short_posted() {
    let mut r = round(&[("btn", 1000), ("sb", 5), ("bb", 15)], Street::Preflop);

    assert_eq!(r.stack(&id("sb")), Some(0));
    assert_eq!(r.stack(&id("bb")), Some(0));
    assert!(r.is_all_in(&id("sb")));
    assert!(r.is_all_in(&id("bb")));
    assert_eq!(r.pot(), 20);
    assert_eq!(r.current_bet(), 15);
    assert_eq!((r.small_blind(), r.big_blind()), (10, 20));
    assert_eq!(r.committed_this_hand(&id("sb")), 5);
    assert_eq!(chips_in_play(&r), 1020);

    assert_eq!(r.acting_player(), Some(&id("btn")));
    r.process_action(&id("btn"), PlayerAction::Call).unwrap();
    assert!(r.is_complete());
    assert_eq!(r.pot(), 35);
    assert_eq!(chips_in_play(&r), 1020);

    let pots = r.hand_side_pots();
    assert_eq!(pots.len(), 2);
    assert_eq!(pots[0].amount, 15);
    assert_eq!(pots[0].eligible, vec![id("btn"), id("sb"), id("bb")]);
    assert_eq!(pots[1].amount, 20);
    assert_eq!(pots[1].eligible, vec![id("btn"), id("bb")]);
}

#[test]
fn full_raise_reopens_action_for_everyone_else() {
    let mut r = round(&[("btn", 1000), ("sb", 1000), ("bb", 1000)], Street::Preflop);
    r.process_action(&id("btn"), PlayerAction::Call).unwrap();
    r.process_action(&id("sb"), PlayerAction::Call).unwrap();
    r.process_action(&id("bb"), PlayerAction::Raise(60)).unwrap();

    assert!(r.owes_action(&id("btn")));
    assert!(r.owes_action(&id("sb")));
    assert!(!r.owes_action(&id("bb")));
    assert_eq!(r.last_raise(), 40);
    assert_eq!(r.min_raise_to(), 100);
    assert_eq!(r.acting_player(), Some(&id("btn")));

    r.process_action(&id("btn"), PlayerAction::Call).unwrap();
    r.process_action(&id("sb"), PlayerAction::Call).unwrap();
    assert!(r.is_complete());
    assert_eq!(r.pot(), 180);

    let flop = r.next_street(Street::Flop);
    assert_eq!(flop.pot(), 180);
    assert_eq!(flop.current_bet(), 0);
    assert_eq!(flop.last_raise(), 20);
    assert_eq!(flop.committed_this_street(&id("bb")), 0);
    assert_eq!(flop.committed_this_hand(&id("bb")), 60);
    assert_eq!(flop.acting_player(), Some(&id("sb")));
}

#[test]
fn short_all_in_call_does_not_reopen_action() {
    let mut r = round(&[("btn", 1000), ("p1", 1000), ("p2", 50)], Street::Flop);
    assert_eq!(r.acting_player(), Some(&id("p1")));

    r.process_action(&id("p1"), PlayerAction::Raise(100)).unwrap();
    let applied = r.process_action(&id("p2"), PlayerAction::Call).unwrap();
    assert_eq!(
        applied.action,
        shortdeck_engine::betting::ValidatedActionRecord::AllIn { amount: 50 }
    );
    assert!(!r.owes_action(&id("p1")));
    assert_eq!(r.acting_player(), Some(&id("btn")));

    r.process_action(&id("btn"), PlayerAction::Call).unwrap();
    assert!(r.is_complete());

    let pots = r.side_pots();
    assert_eq!(pots[0].amount, 150);
    assert_eq!(pots[0].eligible, vec![id("btn"), id("p1"), id("p2")]);
    assert_eq!(pots[1].amount, 100);
    assert_eq!(pots[1].eligible, vec![id("btn"), id("p1")]);
}

#[test]
fn short_all_in_raise_forces_a_response_but_keeps_the_increment() {
    let mut r = round(&[("btn", 1000), ("p1", 1000), ("p2", 130)], Street::Flop);
    r.process_action(&id("p1"), PlayerAction::Raise(100)).unwrap();
    assert_eq!(r.min_raise_to(), 200);

    r.process_action(&id("p2"), PlayerAction::AllIn).unwrap();
    assert_eq!(r.current_bet(), 130);
    assert_eq!(r.min_raise_to(), 230);
    assert_eq!(r.last_raiser(), Some(&id("p1")));
    assert!(r.owes_action(&id("btn")));
    assert!(r.owes_action(&id("p1")));

    // btn had not acted yet, so the short all-in leaves it every option
    assert!(r.valid_actions().contains(&ActionKind::Raise));
    r.process_action(&id("btn"), PlayerAction::Call).unwrap();

    // p1 already acted and may only call or fold
    assert_eq!(r.acting_player(), Some(&id("p1")));
    assert_eq!(r.to_call(&id("p1")), 30);
    assert_eq!(r.valid_actions(), vec![ActionKind::Fold, ActionKind::Call]);
    assert!(matches!(
        r.process_action(&id("p1"), PlayerAction::Raise(300)),
        Err(BettingError::InvalidAction { .. })
    ));
    assert!(matches!(
        r.process_action(&id("p1"), PlayerAction::AllIn),
        Err(BettingError::InvalidAction { .. })
    ));
    assert_eq!(r.acting_player(), Some(&id("p1")));
    r.process_action(&id("p1"), PlayerAction::Call).unwrap();
    assert!(r.is_complete());
    assert_eq!(r.pot(), 390);
}

#[test]
fn full_raise_after_short_all_in_reopens_raising() {
    let mut r = round(
        &[("btn", 1000), ("p1", 1000), ("p2", 130), ("p3", 1000)],
        Street::Flop,
    );
    r.process_action(&id("p1"), PlayerAction::Raise(100)).unwrap();
    r.process_action(&id("p2"), PlayerAction::AllIn).unwrap();

    assert_eq!(r.acting_player(), Some(&id("p3")));
    assert!(r.valid_actions().contains(&ActionKind::Raise));
    r.process_action(&id("p3"), PlayerAction::Raise(300)).unwrap();
    assert_eq!(r.min_raise_to(), 470);

    r.process_action(&id("btn"), PlayerAction::Fold).unwrap();
    assert_eq!(r.acting_player(), Some(&id("p1")));
    assert!(r.valid_actions().contains(&ActionKind::Raise));
    r.process_action(&id("p1"), PlayerAction::Raise(600)).unwrap();
    assert_eq!(r.current_bet(), 600);
}

#[test]
fn rejected_actions_report_the_reason() {
    let mut r = round(&[("a", 1000), ("b", 1000)], Street::Preflop);
    assert_eq!(
        r.process_action(&id("b"), PlayerAction::Check),
        Err(BettingError::NotYourTurn { player: id("b") })
    );
    assert!(matches!(
        r.process_action(&id("a"), PlayerAction::Check),
        Err(BettingError::InvalidAction { .. })
    ));
    assert_eq!(
        r.process_action(&id("a"), PlayerAction::Raise(5000)),
        Err(BettingError::InsufficientChips {
            needed: 4990,
            available: 990
        })
    );
    assert_eq!(
        r.process_action(&id("a"), PlayerAction::Raise(35)),
        Err(BettingError::BelowMinimumRaise {
            amount: 35,
            minimum: 40
        })
    );
    assert_eq!(r.pot(), 30);
    assert_eq!(r.acting_player(), Some(&id("a")));
}

#[test]
fn last_player_able_to_act_with_nothing_to_call_is_done() {
    let mut r = round(&[("a", 1000), ("b", 1000)], Street::Preflop);
    r.process_action(&id("a"), PlayerAction::AllIn).unwrap();
    assert_eq!(r.valid_actions(), vec![ActionKind::Fold, ActionKind::AllIn]);
    r.process_action(&id("b"), PlayerAction::Call).unwrap();
    assert!(r.is_complete());

    let flop = r.next_street(Street::Flop);
    assert!(flop.is_complete());
    assert_eq!(flop.acting_player(), None);
    assert_eq!(flop.pot(), 2000);
}
