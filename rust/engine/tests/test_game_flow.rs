use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use shortdeck_engine::betting::Street;
use shortdeck_engine::cards::{full_deck, Card};
use shortdeck_engine::errors::{BettingError, GameError};
use shortdeck_engine::events::GameEvent;
use shortdeck_engine::game::{GameState, Phase};
use shortdeck_engine::hand::evaluate_hand;
use shortdeck_engine::player::{PlayerAction, PlayerId};
use shortdeck_engine::private_state::PrivateHandState;

fn id(s: &str) -> PlayerId {
    PlayerId::new(s)
}

fn cards(codes: &[&str]) -> Vec<Card> {
    codes.iter().map(|c| c.parse().expect("card code")).collect()
}

fn hole(a: &str, b: &str) -> [Card; 2] {
    [a.parse().unwrap(), b.parse().unwrap()]
}

/// Private state with fixed hole cards and a deck that opens with `top`
/// followed by every remaining card.
fn rigged(hand_number: u64, holes: &[(&str, [Card; 2])], top: &[&str]) -> PrivateHandState {
    let top = cards(top);
    let used: Vec<Card> = holes.iter().flat_map(|(_, h)| h.iter().copied()).collect();
    let mut deck = top.clone();
    deck.extend(
        full_deck()
            .into_iter()
            .filter(|c| !top.contains(c) && !used.contains(c)),
    );
    PrivateHandState {
        hand_number,
        hole_cards: holes.iter().map(|(p, h)| (id(p), *h)).collect(),
        deck,
    }
}

fn check_down(game: &mut GameState, first: &PlayerId, second: &PlayerId) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for _ in 0..3 {
        events.extend(game.act(first, PlayerAction::Check).unwrap());
        events.extend(game.act(second, PlayerAction::Check).unwrap());
    }
    events
}

#[test]
fn heads_up_hand_checked_down_to_showdown() {
    let (a, b) = (id("a"), id("b"));
    let (mut game, _) =
        GameState::create(vec![(a.clone(), 1000), (b.clone(), 1000)], 10, 20).unwrap();

    let started = game.start_hand(&mut ChaCha20Rng::seed_from_u64(99)).unwrap();
    assert_eq!(
        started,
        vec![GameEvent::HandStarted {
            hand_number: 1,
            button_seat: 0,
            small_blind: 10,
            big_blind: 20,
        }]
    );
    assert_eq!(game.player(&a).unwrap().chips(), 990);
    assert_eq!(game.player(&b).unwrap().chips(), 980);
    assert_eq!(game.pot(), 30);

    let called = game.act(&a, PlayerAction::Call).unwrap();
    assert_eq!(
        called,
        vec![GameEvent::PlayerCalled {
            player_id: a.clone(),
            amount: 10
        }]
    );
    assert_eq!(game.pot(), 40);
    assert_eq!(game.player(&a).unwrap().chips(), 980);

    let closed = game.act(&b, PlayerAction::Check).unwrap();
    assert_eq!(closed.len(), 3);
    assert_eq!(
        closed[1],
        GameEvent::BettingRoundCompleted {
            street: Street::Preflop,
            pot: 40
        }
    );
    assert!(matches!(
        &closed[2],
        GameEvent::CommunityCardsDealt { street: Street::Flop, cards } if cards.len() == 3
    ));
    assert_eq!(game.phase(), Phase::Flop);

    let hole_a = game.player(&a).unwrap().hole_cards().unwrap();
    let hole_b = game.player(&b).unwrap().hole_cards().unwrap();

    // big blind acts first after the flop
    check_down(&mut game, &b, &a);
    assert_eq!(game.phase(), Phase::HandComplete);
    assert_eq!(game.board().len(), 5);

    let strength = |h: [Card; 2]| {
        let mut all = h.to_vec();
        all.extend_from_slice(game.board());
        evaluate_hand(&all).unwrap()
    };
    let (sa, sb) = (strength(hole_a), strength(hole_b));
    let (chips_a, chips_b) = (
        game.player(&a).unwrap().chips(),
        game.player(&b).unwrap().chips(),
    );
    match sa.cmp(&sb) {
        std::cmp::Ordering::Greater => assert_eq!((chips_a, chips_b), (1020, 980)),
        std::cmp::Ordering::Less => assert_eq!((chips_a, chips_b), (980, 1020)),
        std::cmp::Ordering::Equal => assert_eq!((chips_a, chips_b), (1000, 1000)),
    }
    assert_eq!(game.total_chips(), 2000);
    assert_eq!(game.last_result().unwrap().showdown.len(), 2);
}

#[test]
fn split_pot_remainder_goes_to_first_seat_after_button() {
    let (p0, p1, p2) = (id("p0"), id("p1"), id("p2"));
    let (mut game, _) = GameState::create(
        vec![(p0.clone(), 1000), (p1.clone(), 1000), (p2.clone(), 1000)],
        10,
        25,
    )
    .unwrap();
    game.start_hand(&mut ChaCha20Rng::seed_from_u64(1)).unwrap();
    game.restore_private(rigged(
        1,
        &[
            ("p0", hole("6c", "6d")),
            ("p1", hole("Ts", "7c")),
            ("p2", hole("Td", "7d")),
        ],
        &["8c", "Ah", "Kd", "Qc", "8d", "Jh", "8h", "6s"],
    ))
    .unwrap();

    game.act(&p0, PlayerAction::Call).unwrap();
    game.act(&p1, PlayerAction::Call).unwrap();
    game.act(&p2, PlayerAction::Check).unwrap();
    for _ in 0..3 {
        for p in [&p1, &p2, &p0] {
            game.act(p, PlayerAction::Check).unwrap();
        }
    }

    assert_eq!(game.board(), cards(&["Ah", "Kd", "Qc", "Jh", "6s"]).as_slice());
    let result = game.last_result().unwrap();
    assert_eq!(result.pots[0].amount, 75);
    assert_eq!(result.pots[0].winners, vec![p1.clone(), p2.clone()]);
    assert_eq!(game.player(&p0).unwrap().chips(), 975);
    assert_eq!(game.player(&p1).unwrap().chips(), 1013);
    assert_eq!(game.player(&p2).unwrap().chips(), 1012);
}

#[test]
fn elimination_moves_button_past_busted_seat() {
    let (p0, p1, p2) = (id("p0"), id("p1"), id("p2"));
    let (mut game, _) = GameState::create(
        vec![(p0.clone(), 1000), (p1.clone(), 30), (p2.clone(), 1000)],
        10,
        20,
    )
    .unwrap();
    game.start_hand(&mut ChaCha20Rng::seed_from_u64(5)).unwrap();
    game.restore_private(rigged(
        1,
        &[
            ("p0", hole("As", "Ad")),
            ("p1", hole("6c", "7d")),
            ("p2", hole("Ts", "9s")),
        ],
        &["7h", "Kh", "Qd", "9c", "7s", "8h", "6h", "Jc"],
    ))
    .unwrap();

    game.act(&p0, PlayerAction::AllIn).unwrap();
    game.act(&p1, PlayerAction::Call).unwrap();
    let events = game.act(&p2, PlayerAction::Fold).unwrap();

    // both remaining players are all-in, so the board runs out unbet
    let dealt = events
        .iter()
        .filter(|e| matches!(e, GameEvent::CommunityCardsDealt { .. }))
        .count();
    assert_eq!(dealt, 3);
    assert_eq!(game.phase(), Phase::HandComplete);

    let result = game.last_result().unwrap();
    assert_eq!(result.eliminated, vec![p1.clone()]);
    assert_eq!(result.pots.len(), 2);
    assert_eq!(result.pots[0].amount, 80);
    assert_eq!(result.pots[1].amount, 970);
    assert_eq!(game.player(&p0).unwrap().chips(), 1050);
    assert_eq!(game.player(&p2).unwrap().chips(), 980);
    assert!(game.player(&p1).unwrap().is_eliminated());
    assert_eq!(game.total_chips(), 2030);

    let next = game.start_hand(&mut ChaCha20Rng::seed_from_u64(6)).unwrap();
    assert!(matches!(
        next[0],
        GameEvent::HandStarted {
            hand_number: 2,
            button_seat: 2,
            ..
        }
    ));
    // heads-up now: the button posts the small blind
    assert_eq!(game.player(&p2).unwrap().chips(), 970);
    assert_eq!(game.player(&p0).unwrap().chips(), 1030);
}

#[test]
fn last_player_standing_completes_the_tournament() {
    let (a, b) = (id("a"), id("b"));
    let (mut game, _) = GameState::create(vec![(a.clone(), 500), (b.clone(), 500)], 10, 20).unwrap();
    game.start_hand(&mut ChaCha20Rng::seed_from_u64(3)).unwrap();
    game.restore_private(rigged(
        1,
        &[("a", hole("As", "Ah")), ("b", hole("6c", "7d"))],
        &["8s", "Kd", "Qc", "9h", "8d", "Jd", "8h", "Tc"],
    ))
    .unwrap();

    game.act(&a, PlayerAction::AllIn).unwrap();
    let events = game.act(&b, PlayerAction::Call).unwrap();

    assert_eq!(
        events.last(),
        Some(&GameEvent::TournamentCompleted { winner: a.clone() })
    );
    assert_eq!(game.phase(), Phase::TournamentComplete);
    assert_eq!(game.player(&a).unwrap().chips(), 1000);
    assert_eq!(
        game.start_hand(&mut ChaCha20Rng::seed_from_u64(4)),
        Err(GameError::TournamentComplete)
    );
}

#[test]
fn protocol_errors_leave_the_table_unchanged() {
    let (a, b) = (id("a"), id("b"));
    let (mut game, _) =
        GameState::create(vec![(a.clone(), 1000), (b.clone(), 1000)], 10, 20).unwrap();
    assert_eq!(
        game.act(&a, PlayerAction::Call),
        Err(GameError::NoHandInProgress)
    );
    game.start_hand(&mut ChaCha20Rng::seed_from_u64(8)).unwrap();
    let before = serde_json::to_value(&game).unwrap();

    let err = game.act(&b, PlayerAction::Check).unwrap_err();
    assert_eq!(err, GameError::Betting(BettingError::NotYourTurn { player: b.clone() }));
    assert!(err.is_protocol());
    assert_eq!(
        game.act(&id("mallory"), PlayerAction::Fold),
        Err(GameError::UnknownPlayer(id("mallory")))
    );
    assert_eq!(
        game.start_hand(&mut ChaCha20Rng::seed_from_u64(9)),
        Err(GameError::HandInProgress)
    );
    assert_eq!(serde_json::to_value(&game).unwrap(), before);
}

#[test]
fn create_validates_entrants_and_blinds() {
    let too_few = GameState::create(vec![(id("a"), 100)], 10, 20);
    assert!(matches!(too_few, Err(GameError::InvalidSetup(_))));

    let too_many = GameState::create(
        (0..11).map(|i| (id(&format!("p{i}")), 100)).collect(),
        10,
        20,
    );
    assert!(matches!(too_many, Err(GameError::InvalidSetup(_))));

    let duplicate = GameState::create(vec![(id("a"), 100), (id("a"), 100)], 10, 20);
    assert!(matches!(duplicate, Err(GameError::InvalidSetup(_))));

    let broke = GameState::create(vec![(id("a"), 100), (id("b"), 0)], 10, 20);
    assert!(matches!(broke, Err(GameError::InvalidSetup(_))));

    let inverted = GameState::create(vec![(id("a"), 100), (id("b"), 100)], 20, 10);
    assert!(matches!(inverted, Err(GameError::InvalidSetup(_))));

    let ten = GameState::create(
        (0..10).map(|i| (id(&format!("p{i}")), 100)).collect(),
        10,
        20,
    );
    assert!(ten.is_ok());
}

#[test]
fn played_hand_events_never_carry_hole_cards() {
    let (a, b, c) = (id("a"), id("b"), id("c"));
    let (mut game, created) = GameState::create(
        vec![(a.clone(), 1000), (b.clone(), 1000), (c.clone(), 1000)],
        10,
        20,
    )
    .unwrap();
    let mut events = vec![created];
    events.extend(game.start_hand(&mut ChaCha20Rng::seed_from_u64(2)).unwrap());
    game.restore_private(rigged(
        1,
        &[
            ("a", hole("As", "Ad")),
            ("b", hole("Kc", "Td")),
            ("c", hole("9s", "9h")),
        ],
        &["7h", "Qh", "Jd", "8c", "6s", "8h", "7c", "6d"],
    ))
    .unwrap();

    events.extend(game.act(&a, PlayerAction::Fold).unwrap());
    events.extend(game.act(&b, PlayerAction::Call).unwrap());
    events.extend(game.act(&c, PlayerAction::Check).unwrap());
    events.extend(check_down(&mut game, &b, &c));
    assert_eq!(game.phase(), Phase::HandComplete);
    assert!(matches!(events.last(), Some(GameEvent::HandCompleted { .. })));
    assert_eq!(game.last_result().unwrap().showdown.len(), 2);

    let hidden: Vec<String> = cards(&["As", "Ad", "Kc", "Td", "9s", "9h"])
        .iter()
        .map(|card| serde_json::to_string(card).unwrap())
        .collect();
    for event in &events {
        let json = serde_json::to_string(event).unwrap();
        for card in &hidden {
            assert!(!json.contains(card.as_str()), "{event:?} exposes {card}");
        }
    }
    let state = serde_json::to_string(&game).unwrap();
    assert!(hidden.iter().all(|card| !state.contains(card.as_str())));

    // the cards stay in memory for the players who reached showdown
    assert_eq!(
        game.revealed(),
        &[(b.clone(), hole("Kc", "Td")), (c.clone(), hole("9s", "9h"))]
    );
}
