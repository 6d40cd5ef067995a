use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GameError;

/// Number of cards in a short deck (ranks 6 through Ace, four suits).
pub const DECK_SIZE: usize = 36;

/// Represents one of the four suits of the short deck.
/// Used as a component of [`Card`] to fully define a playing card.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Suit {
    /// Clubs suit (♣)
    Clubs,
    /// Diamonds suit (♦)
    Diamonds,
    /// Hearts suit (♥)
    Hearts,
    /// Spades suit (♠)
    Spades,
}

impl Suit {
    fn symbol(self) -> char {
        match self {
            Suit::Clubs => 'c',
            Suit::Diamonds => 'd',
            Suit::Hearts => 'h',
            Suit::Spades => 's',
        }
    }
}

/// Represents the rank of a short-deck card from Six through Ace.
/// Twos through Fives are removed; numeric values are kept for comparison.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Rank {
    /// Rank 6, the bottom connector of the wheel straight
    Six = 6,
    /// Rank 7
    Seven,
    /// Rank 8
    Eight,
    /// Rank 9
    Nine,
    /// Rank 10
    Ten,
    /// Jack (11)
    Jack,
    /// Queen (12)
    Queen,
    /// King (13)
    King,
    /// Ace (14)
    Ace,
}

impl Rank {
    pub fn value(self) -> u8 {
        self as u8
    }

    fn symbol(self) -> char {
        match self {
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
        }
    }
}

/// A single playing card with a suit and rank.
/// Cards are the unit of hole cards, the board, and the deck.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Card {
    /// The suit of the card (Clubs, Diamonds, Hearts, or Spades)
    pub suit: Suit,
    /// The rank of the card (Six through Ace)
    pub rank: Rank,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.symbol(), self.suit.symbol())
    }
}

impl FromStr for Card {
    type Err = GameError;

    /// Parses two-character codes such as `As`, `Td` or `6c`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(r), Some(su), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(GameError::InvalidCard(s.to_string()));
        };
        let rank = all_ranks()
            .into_iter()
            .find(|rank| rank.symbol() == r.to_ascii_uppercase())
            .ok_or_else(|| GameError::InvalidCard(s.to_string()))?;
        let suit = all_suits()
            .into_iter()
            .find(|suit| suit.symbol() == su.to_ascii_lowercase())
            .ok_or_else(|| GameError::InvalidCard(s.to_string()))?;
        Ok(Card { suit, rank })
    }
}

pub fn all_suits() -> [Suit; 4] {
    [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades]
}

pub fn all_ranks() -> [Rank; 9] {
    [
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ]
}

pub fn full_deck() -> Vec<Card> {
    let mut v = Vec::with_capacity(DECK_SIZE);
    for &s in &all_suits() {
        for &r in &all_ranks() {
            v.push(Card { suit: s, rank: r });
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_deck_has_36_unique_cards() {
        let deck = full_deck();
        assert_eq!(deck.len(), DECK_SIZE);
        let unique: HashSet<_> = deck.iter().copied().collect();
        assert_eq!(unique.len(), DECK_SIZE);
        for rank in all_ranks() {
            assert_eq!(deck.iter().filter(|c| c.rank == rank).count(), 4);
        }
        for suit in all_suits() {
            assert_eq!(deck.iter().filter(|c| c.suit == suit).count(), 9);
        }
    }

    #[test]
    fn card_codes_parse_and_print() {
        let card: Card = "Td".parse().unwrap();
        assert_eq!(card, Card::new(Rank::Ten, Suit::Diamonds));
        assert_eq!(card.to_string(), "Td");
        assert!("5c".parse::<Card>().is_err());
        assert!("Asx".parse::<Card>().is_err());
    }
}
