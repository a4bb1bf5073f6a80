//! Rules Engine
//!
//! Pure validation and resolution of the three turn actions plus round-end
//! scoring. Every function reads its inputs and returns an outcome holding the
//! updated containers; on error nothing has been modified.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::card::{Card, CardArena, CardId, CardKind};
use crate::game::deck::MARKET_SIZE;
use crate::game::tokens::{AwardedToken, BonusStacks, BonusTier, TokenStacks};

/// Maximum goods cards in a hand.
pub const HAND_LIMIT: usize = 7;

/// Points for the larger camel herd at round end.
pub const CAMEL_BONUS: u32 = 5;

/// Empty token stacks that end the round.
pub const DEPLETED_STACKS_TO_END: usize = 3;

/// Why an action was rejected by the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Market index out of range.
    #[error("Invalid market index {index}")]
    InvalidIndex {
        /// Requested index
        index: i64,
    },

    /// Camels are taken with the take-camels action.
    #[error("Camels cannot be taken one at a time")]
    CamelNotTakeable,

    /// Hand already at the limit.
    #[error("Hand already holds {limit} goods")]
    HandLimitExceeded {
        /// Hand limit
        limit: usize,
    },

    /// Market has no camels.
    #[error("There are no camels in the market")]
    NoCamelsAvailable,

    /// Nothing selected to sell.
    #[error("Select the goods to sell first")]
    EmptySelection,

    /// Selection contains a camel.
    #[error("Camels cannot be sold")]
    CannotSellCamels,

    /// Selection mixes goods kinds.
    #[error("All sold goods must be the same kind")]
    MixedKinds,

    /// Precious goods sold below the pair minimum.
    #[error("Sell at least {required} {kind} at once")]
    BelowMinimum {
        /// Goods kind
        kind: CardKind,
        /// Minimum count
        required: usize,
    },

    /// Token stack too small for the sale.
    #[error("Only {available} {kind} tokens left, cannot sell {requested}")]
    InsufficientTokens {
        /// Goods kind
        kind: CardKind,
        /// Cards offered
        requested: usize,
        /// Tokens remaining
        available: usize,
    },

    /// An id that is not in the match's card arena.
    #[error("Unknown card {0}")]
    UnknownCard(CardId),
}

/// Result of taking one goods card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TakeGoodsOutcome {
    /// Market after the refill
    pub market: Vec<CardId>,
    /// Deck after the refill
    pub deck: Vec<CardId>,
    /// Hand with the card appended
    pub hand: Vec<CardId>,
    /// The card taken
    pub taken: Card,
}

/// Take the goods card at `market_index` into the hand.
///
/// The vacated slot is refilled in place from the deck tail; with an empty
/// deck the market shrinks by one.
pub fn take_goods_card(
    market_index: i64,
    market: &[CardId],
    deck: &[CardId],
    hand: &[CardId],
    hand_limit: usize,
    arena: &CardArena,
) -> Result<TakeGoodsOutcome, RuleError> {
    let index = usize::try_from(market_index)
        .ok()
        .filter(|i| *i < market.len())
        .ok_or(RuleError::InvalidIndex { index: market_index })?;

    let id = market[index];
    let taken = arena.get(id).ok_or(RuleError::UnknownCard(id))?;
    if taken.kind.is_camel() {
        return Err(RuleError::CamelNotTakeable);
    }
    if hand.len() >= hand_limit {
        return Err(RuleError::HandLimitExceeded { limit: hand_limit });
    }

    let mut market = market.to_vec();
    let mut deck = deck.to_vec();
    match deck.pop() {
        Some(replacement) => market[index] = replacement,
        None => {
            market.remove(index);
        }
    }

    let mut hand = hand.to_vec();
    hand.push(id);

    Ok(TakeGoodsOutcome { market, deck, hand, taken })
}

/// Result of taking every camel in the market.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TakeCamelsOutcome {
    /// Market after the refill
    pub market: Vec<CardId>,
    /// Deck after the refill
    pub deck: Vec<CardId>,
    /// Herd with the camels appended
    pub camel_herd: Vec<CardId>,
    /// Camels moved, in market order
    pub taken: Vec<CardId>,
}

/// Take all camels from the market in one action.
///
/// Vacated slots are refilled in place from the deck tail, up to
/// `MARKET_SIZE` cards; slots the deck cannot fill are closed up.
pub fn take_camels(
    market: &[CardId],
    deck: &[CardId],
    camel_herd: &[CardId],
    arena: &CardArena,
) -> Result<TakeCamelsOutcome, RuleError> {
    if let Some(unknown) = market.iter().find(|id| arena.get(**id).is_none()) {
        return Err(RuleError::UnknownCard(*unknown));
    }

    let taken: Vec<CardId> = market.iter().copied().filter(|id| arena.is_camel(*id)).collect();
    if taken.is_empty() {
        return Err(RuleError::NoCamelsAvailable);
    }

    let kept = market.len() - taken.len();
    let mut draws = taken.len().min(MARKET_SIZE.saturating_sub(kept));
    let mut deck = deck.to_vec();

    let market = market
        .iter()
        .filter_map(|id| {
            if !arena.is_camel(*id) {
                return Some(*id);
            }
            if draws == 0 {
                return None;
            }
            let replacement = deck.pop()?;
            draws -= 1;
            Some(replacement)
        })
        .collect();

    let mut camel_herd = camel_herd.to_vec();
    camel_herd.extend_from_slice(&taken);

    Ok(TakeCamelsOutcome { market, deck, camel_herd, taken })
}

/// Result of a sale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleOutcome {
    /// Kind sold
    pub kind: CardKind,
    /// Number of cards sold
    pub count: usize,
    /// Goods tokens awarded, in the order popped
    pub tokens: Vec<AwardedToken>,
    /// Bonus token, if the sale earned one and the stack had one left
    pub bonus: Option<AwardedToken>,
    /// Sum of every awarded value
    pub score: u32,
    /// Token stacks after the sale
    pub token_stacks: TokenStacks,
    /// Bonus stacks after the sale
    pub bonus_stacks: BonusStacks,
}

impl SaleOutcome {
    /// Goods tokens followed by the bonus token, if any.
    pub fn awarded(&self) -> impl Iterator<Item = AwardedToken> + '_ {
        self.tokens.iter().copied().chain(self.bonus)
    }
}

/// Sell the selected cards.
///
/// Pops one goods token per card from the kind's stack, plus one bonus token
/// when exactly 3, exactly 4 or 5+ cards are sold and that bonus stack is not
/// empty.
pub fn sell_goods(
    selected: &[CardId],
    token_stacks: &TokenStacks,
    bonus_stacks: &BonusStacks,
    arena: &CardArena,
) -> Result<SaleOutcome, RuleError> {
    if selected.is_empty() {
        return Err(RuleError::EmptySelection);
    }

    let kinds = selected
        .iter()
        .map(|id| arena.kind(*id).ok_or(RuleError::UnknownCard(*id)))
        .collect::<Result<Vec<_>, _>>()?;

    if kinds.iter().any(|k| k.is_camel()) {
        return Err(RuleError::CannotSellCamels);
    }
    let kind = kinds[0];
    if kinds.iter().any(|k| *k != kind) {
        return Err(RuleError::MixedKinds);
    }

    let count = selected.len();
    if count < kind.min_sale() {
        return Err(RuleError::BelowMinimum { kind, required: kind.min_sale() });
    }

    let mut token_stacks = token_stacks.clone();
    let values = token_stacks
        .take_front(kind, count)
        .ok_or(RuleError::InsufficientTokens {
            kind,
            requested: count,
            available: token_stacks.remaining(kind),
        })?;

    let mut bonus_stacks = bonus_stacks.clone();
    let bonus = BonusTier::for_count(count).and_then(|tier| {
        bonus_stacks
            .take_front(tier)
            .map(|value| AwardedToken::bonus(tier, value))
    });

    let tokens: Vec<AwardedToken> = values
        .into_iter()
        .map(|value| AwardedToken::goods(kind, value))
        .collect();
    let score = tokens.iter().chain(bonus.iter()).map(|t| t.value).sum();

    Ok(SaleOutcome {
        kind,
        count,
        tokens,
        bonus,
        score,
        token_stacks,
        bonus_stacks,
    })
}

/// The round ends when the deck is empty or three token stacks are.
pub fn is_round_over(deck: &[CardId], token_stacks: &TokenStacks) -> bool {
    deck.is_empty() || token_stacks.depleted_count() >= DEPLETED_STACKS_TO_END
}

/// Camel majority bonus per seat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CamelBonus {
    /// Bonus for seat 1
    pub player1: u32,
    /// Bonus for seat 2
    pub player2: u32,
}

/// Award `CAMEL_BONUS` to the strictly larger herd; nobody on a tie.
pub fn calculate_camel_bonus(herd_one: &[CardId], herd_two: &[CardId]) -> CamelBonus {
    use std::cmp::Ordering;

    match herd_one.len().cmp(&herd_two.len()) {
        Ordering::Greater => CamelBonus { player1: CAMEL_BONUS, player2: 0 },
        Ordering::Less => CamelBonus { player1: 0, player2: CAMEL_BONUS },
        Ordering::Equal => CamelBonus::default(),
    }
}
