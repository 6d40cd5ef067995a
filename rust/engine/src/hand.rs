use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Rank};
use crate::errors::EvalError;

/// Hand categories, weakest first.
///
/// Flush sits above full house: with 36 cards a flush is the rarer hand.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    FullHouse = 5,
    Flush = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

/// Category plus the ordered rank sequence used for tiebreaks.
///
/// Field order matters: the derived `Ord` compares category first, then ranks.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct HandStrength {
    pub category: Category,
    // primary ranks then kickers, high -> low, zero padded
    pub ranks: [u8; 5],
}

/// The winning five cards together with their strength.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct BestHand {
    pub strength: HandStrength,
    pub cards: [Card; 5],
}

/// Best five-card hand out of 5 to 7 cards.
///
/// Every 5-card subset is ranked and the strongest kept, so the result does
/// not depend on input order.
///
/// # Examples
///
/// ```
/// use shortdeck_engine::cards::Card;
/// use shortdeck_engine::hand::{evaluate_hand, Category};
///
/// let cards: Vec<Card> = ["As", "6d", "7c", "8h", "9s", "Kd", "Kc"]
///     .iter()
///     .map(|c| c.parse().unwrap())
///     .collect();
/// let strength = evaluate_hand(&cards).unwrap();
/// assert_eq!(strength.category, Category::Straight);
/// assert_eq!(strength.ranks[0], 9);
/// ```
pub fn evaluate_hand(cards: &[Card]) -> Result<HandStrength, EvalError> {
    best_hand(cards).map(|best| best.strength)
}

pub fn best_hand(cards: &[Card]) -> Result<BestHand, EvalError> {
    if !(5..=7).contains(&cards.len()) {
        return Err(EvalError::CardCount(cards.len()));
    }
    let mut seen = HashSet::with_capacity(cards.len());
    for c in cards {
        if !seen.insert(*c) {
            return Err(EvalError::DuplicateCard(c.to_string()));
        }
    }

    let n = cards.len();
    let mut best: Option<BestHand> = None;
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                for d in c + 1..n {
                    for e in d + 1..n {
                        let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let strength = evaluate_five(&five);
                        if best.map_or(true, |cur| strength > cur.strength) {
                            best = Some(BestHand {
                                strength,
                                cards: five,
                            });
                        }
                    }
                }
            }
        }
    }
    best.ok_or(EvalError::CardCount(n))
}

/// Ranks exactly five cards.
pub fn evaluate_five(cards: &[Card; 5]) -> HandStrength {
    let flush = cards.iter().all(|c| c.suit == cards[0].suit);

    let mut counts = [0u8; 15];
    for c in cards {
        counts[c.rank.value() as usize] += 1;
    }
    // (count, rank) pairs, larger groups first, higher ranks first
    let mut groups: Vec<(u8, u8)> = (6..=14u8)
        .rev()
        .filter(|&r| counts[r as usize] > 0)
        .map(|r| (counts[r as usize], r))
        .collect();
    groups.sort_unstable_by(|a, b| b.cmp(a));

    let straight_high = if groups.len() == 5 {
        straight_high(&groups.iter().map(|&(_, r)| r).collect::<Vec<_>>())
    } else {
        None
    };

    if let Some(high) = straight_high {
        let category = if flush {
            Category::StraightFlush
        } else {
            Category::Straight
        };
        return HandStrength {
            category,
            ranks: [high, 0, 0, 0, 0],
        };
    }

    let mut ranks = [0u8; 5];
    for (slot, &(_, r)) in ranks.iter_mut().zip(groups.iter()) {
        *slot = r;
    }

    let category = if flush {
        Category::Flush
    } else {
        match (groups[0].0, groups.get(1).map(|g| g.0)) {
            (4, _) => Category::FourOfAKind,
            (3, Some(2)) => Category::FullHouse,
            (3, _) => Category::ThreeOfAKind,
            (2, Some(2)) => Category::TwoPair,
            (2, _) => Category::OnePair,
            _ => Category::HighCard,
        }
    };
    HandStrength { category, ranks }
}

/// High card of a five-rank straight, given distinct ranks sorted high -> low.
///
/// The wheel A-6-7-8-9 plays the ace low and ranks as a 9-high straight.
fn straight_high(desc: &[u8]) -> Option<u8> {
    if desc.len() != 5 {
        return None;
    }
    if desc[0] - desc[4] == 4 {
        return Some(desc[0]);
    }
    let ace = Rank::Ace.value();
    let nine = Rank::Nine.value();
    if desc[0] == ace && desc[1] == nine && desc[1] - desc[4] == 3 {
        return Some(nine);
    }
    None
}

/// Every key whose hand ties for the best strength, in input order.
pub fn determine_winners<K: Clone>(hands: &[(K, HandStrength)]) -> Vec<K> {
    let Some(best) = hands.iter().map(|(_, s)| *s).max() else {
        return Vec::new();
    };
    hands
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(k, _)| k.clone())
        .collect()
}
