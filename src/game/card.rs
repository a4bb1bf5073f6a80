//! Cards and the Card Arena
//!
//! A match owns exactly one `CardArena` holding every card record. The deck,
//! market, hands and herds only ever hold `CardId`s pointing into it, so a
//! card's kind can never drift between containers.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Stable card identifier, unique within a match and never reused.
pub type CardId = u32;

/// Kind of card. Six goods plus the camel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CardKind {
    /// Precious goods
    Diamond = 0,
    /// Precious goods
    Gold = 1,
    /// Precious goods
    Silver = 2,
    /// Common goods
    Cloth = 3,
    /// Common goods
    Spice = 4,
    /// Common goods
    Leather = 5,
    /// Not sellable; collected into the herd
    Camel = 6,
}

impl CardKind {
    /// The six sellable kinds, in token-stack order.
    pub const GOODS: [CardKind; 6] = [
        CardKind::Diamond,
        CardKind::Gold,
        CardKind::Silver,
        CardKind::Cloth,
        CardKind::Spice,
        CardKind::Leather,
    ];

    /// Whether this is a camel.
    #[inline]
    pub fn is_camel(self) -> bool {
        self == CardKind::Camel
    }

    /// Diamond, gold and silver must be sold at least in pairs.
    #[inline]
    pub fn is_precious(self) -> bool {
        matches!(self, CardKind::Diamond | CardKind::Gold | CardKind::Silver)
    }

    /// Minimum number of cards in a single sale of this kind.
    #[inline]
    pub fn min_sale(self) -> usize {
        if self.is_precious() { 2 } else { 1 }
    }

    /// Number of cards of this kind in a full deck.
    pub fn deck_count(self) -> usize {
        match self {
            CardKind::Leather => 8,
            CardKind::Camel => 11,
            _ => 6,
        }
    }

    /// Display label ("Diamond", "Camel", ...).
    pub fn label(self) -> &'static str {
        match self {
            CardKind::Diamond => "Diamond",
            CardKind::Gold => "Gold",
            CardKind::Silver => "Silver",
            CardKind::Cloth => "Cloth",
            CardKind::Spice => "Spice",
            CardKind::Leather => "Leather",
            CardKind::Camel => "Camel",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An immutable card record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Stable identifier
    pub id: CardId,
    /// Card kind
    #[serde(alias = "type")]
    pub kind: CardKind,
}

/// Every card of a match, indexed by `CardId`.
#[derive(Clone, Debug)]
pub struct CardArena {
    cards: Vec<Card>,
}

impl CardArena {
    /// Build the fixed 49-card composition with ids assigned in order:
    /// six rounds of diamond/gold/silver/cloth/spice, then leather, then camels.
    pub fn standard() -> Self {
        let mut kinds = Vec::with_capacity(49);
        for _ in 0..6 {
            kinds.extend_from_slice(&[
                CardKind::Diamond,
                CardKind::Gold,
                CardKind::Silver,
                CardKind::Cloth,
                CardKind::Spice,
            ]);
        }
        kinds.extend(std::iter::repeat(CardKind::Leather).take(CardKind::Leather.deck_count()));
        kinds.extend(std::iter::repeat(CardKind::Camel).take(CardKind::Camel.deck_count()));

        let cards = kinds
            .into_iter()
            .enumerate()
            .map(|(id, kind)| Card { id: id as CardId, kind })
            .collect();

        Self { cards }
    }

    /// Number of cards in the arena.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// All ids, in arena order.
    pub fn ids(&self) -> Vec<CardId> {
        self.cards.iter().map(|c| c.id).collect()
    }

    /// Look up a card record.
    #[inline]
    pub fn get(&self, id: CardId) -> Option<Card> {
        self.cards.get(id as usize).copied()
    }

    /// Look up a card's kind.
    #[inline]
    pub fn kind(&self, id: CardId) -> Option<CardKind> {
        self.get(id).map(|c| c.kind)
    }

    /// Whether the id refers to a camel.
    #[inline]
    pub fn is_camel(&self, id: CardId) -> bool {
        self.kind(id).is_some_and(CardKind::is_camel)
    }

    /// Resolve a container of ids into card records, skipping unknown ids.
    pub fn resolve(&self, ids: &[CardId]) -> Vec<Card> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }
}

impl Default for CardArena {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_composition() {
        let arena = CardArena::standard();
        assert_eq!(arena.len(), 49);

        for kind in CardKind::GOODS.iter().copied().chain([CardKind::Camel]) {
            let count = arena.ids().iter().filter(|id| arena.kind(**id) == Some(kind)).count();
            assert_eq!(count, kind.deck_count(), "{kind}");
        }
    }

    #[test]
    fn test_ids_match_positions() {
        let arena = CardArena::standard();
        for (index, id) in arena.ids().into_iter().enumerate() {
            assert_eq!(id as usize, index);
        }
        assert_eq!(arena.kind(0), Some(CardKind::Diamond));
        assert_eq!(arena.kind(48), Some(CardKind::Camel));
        assert_eq!(arena.get(49), None);
    }

    #[test]
    fn test_minimum_sale() {
        assert_eq!(CardKind::Diamond.min_sale(), 2);
        assert_eq!(CardKind::Silver.min_sale(), 2);
        assert_eq!(CardKind::Leather.min_sale(), 1);
        assert!(!CardKind::Cloth.is_precious());
    }

    #[test]
    fn test_card_wire_format() {
        let card = Card { id: 3, kind: CardKind::Spice };
        let json = serde_json::to_string(&card).unwrap();
        assert_eq!(json, r#"{"id":3,"kind":"spice"}"#);

        let legacy: Card = serde_json::from_str(r#"{"id":3,"type":"spice"}"#).unwrap();
        assert_eq!(legacy, card);
    }
}
