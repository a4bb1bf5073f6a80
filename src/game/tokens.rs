//! Goods and Bonus Tokens
//!
//! Token stacks are consumed front-first, highest value first.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::card::CardKind;

/// Initial token values for a goods kind.
pub fn initial_token_values(kind: CardKind) -> &'static [u32] {
    match kind {
        CardKind::Diamond => &[7, 7, 5, 5, 5],
        CardKind::Gold => &[6, 6, 5, 5, 5],
        CardKind::Silver => &[5, 5, 5, 5, 5],
        CardKind::Cloth => &[5, 3, 3, 2, 2, 1, 1],
        CardKind::Spice => &[5, 3, 3, 2, 2, 1, 1],
        CardKind::Leather => &[4, 3, 2, 1, 1, 1, 1],
        CardKind::Camel => &[],
    }
}

/// Per-kind token stacks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenStacks {
    stacks: BTreeMap<CardKind, Vec<u32>>,
}

impl TokenStacks {
    /// Fresh stacks for a new round.
    pub fn initial() -> Self {
        let stacks = CardKind::GOODS
            .iter()
            .map(|kind| (*kind, initial_token_values(*kind).to_vec()))
            .collect();
        Self { stacks }
    }

    /// Stacks with explicit contents; kinds not given are empty.
    pub fn from_values(values: impl IntoIterator<Item = (CardKind, Vec<u32>)>) -> Self {
        let mut stacks: BTreeMap<CardKind, Vec<u32>> =
            CardKind::GOODS.iter().map(|kind| (*kind, Vec::new())).collect();
        stacks.extend(values);
        Self { stacks }
    }

    /// Remaining tokens of a kind, front first.
    pub fn stack(&self, kind: CardKind) -> &[u32] {
        self.stacks.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of remaining tokens of a kind.
    pub fn remaining(&self, kind: CardKind) -> usize {
        self.stack(kind).len()
    }

    /// Number of goods kinds whose stack is empty.
    pub fn depleted_count(&self) -> usize {
        CardKind::GOODS
            .iter()
            .filter(|kind| self.remaining(**kind) == 0)
            .count()
    }

    /// Take `count` tokens off the front of a stack.
    ///
    /// Returns `None` and leaves the stack untouched if fewer remain.
    pub fn take_front(&mut self, kind: CardKind, count: usize) -> Option<Vec<u32>> {
        let stack = self.stacks.get_mut(&kind)?;
        if stack.len() < count {
            return None;
        }
        Some(stack.drain(..count).collect())
    }

    /// Iterate kinds and their stacks in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (CardKind, &[u32])> {
        self.stacks.iter().map(|(kind, stack)| (*kind, stack.as_slice()))
    }
}

impl Default for TokenStacks {
    fn default() -> Self {
        Self::initial()
    }
}

/// Sale size that earns a bonus token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusTier {
    /// Exactly three cards
    Three,
    /// Exactly four cards
    Four,
    /// Five or more cards
    Five,
}

impl BonusTier {
    /// Tier earned by selling `count` cards at once, if any.
    pub fn for_count(count: usize) -> Option<Self> {
        match count {
            3 => Some(BonusTier::Three),
            4 => Some(BonusTier::Four),
            n if n >= 5 => Some(BonusTier::Five),
            _ => None,
        }
    }

    /// Initial stack for this tier.
    pub fn initial_values(self) -> &'static [u32] {
        match self {
            BonusTier::Three => &[3, 2, 1],
            BonusTier::Four => &[6, 5, 4],
            BonusTier::Five => &[10, 9, 8],
        }
    }
}

/// The three bonus stacks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusStacks {
    /// Bonus for selling exactly three
    pub three: Vec<u32>,
    /// Bonus for selling exactly four
    pub four: Vec<u32>,
    /// Bonus for selling five or more
    pub five: Vec<u32>,
}

impl BonusStacks {
    /// Fresh bonus stacks for a new round.
    pub fn initial() -> Self {
        Self {
            three: BonusTier::Three.initial_values().to_vec(),
            four: BonusTier::Four.initial_values().to_vec(),
            five: BonusTier::Five.initial_values().to_vec(),
        }
    }

    /// Remaining bonus values of a tier, front first.
    pub fn stack(&self, tier: BonusTier) -> &[u32] {
        match tier {
            BonusTier::Three => &self.three,
            BonusTier::Four => &self.four,
            BonusTier::Five => &self.five,
        }
    }

    /// Pop the front value of a tier, if any remain.
    pub fn take_front(&mut self, tier: BonusTier) -> Option<u32> {
        let stack = match tier {
            BonusTier::Three => &mut self.three,
            BonusTier::Four => &mut self.four,
            BonusTier::Five => &mut self.five,
        };
        if stack.is_empty() {
            None
        } else {
            Some(stack.remove(0))
        }
    }
}

impl Default for BonusStacks {
    fn default() -> Self {
        Self::initial()
    }
}

/// Where an awarded token came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenSource {
    /// A goods token of this kind
    Goods(CardKind),
    /// A bonus token of this tier
    Bonus(BonusTier),
}

impl TokenSource {
    /// Stable tag for state hashing.
    pub fn hash_tag(self) -> u8 {
        match self {
            TokenSource::Goods(kind) => kind as u8,
            TokenSource::Bonus(BonusTier::Three) => 0x13,
            TokenSource::Bonus(BonusTier::Four) => 0x14,
            TokenSource::Bonus(BonusTier::Five) => 0x15,
        }
    }
}

/// A token a player has won.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardedToken {
    /// Goods kind or bonus tier
    #[serde(rename = "type")]
    pub source: TokenSource,
    /// Point value
    pub value: u32,
}

impl AwardedToken {
    /// Goods token.
    pub fn goods(kind: CardKind, value: u32) -> Self {
        Self { source: TokenSource::Goods(kind), value }
    }

    /// Bonus token.
    pub fn bonus(tier: BonusTier, value: u32) -> Self {
        Self { source: TokenSource::Bonus(tier), value }
    }
}
