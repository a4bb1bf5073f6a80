//! Game Events
//!
//! Events emitted by the match state machine for each resolved action.

use serde::{Serialize, Deserialize};
use crate::game::card::{CardId, CardKind};
use crate::game::rules::CamelBonus;
use crate::game::state::{Seat, SeatPair, Winner};
use crate::game::tokens::AwardedToken;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A round was dealt
    RoundStarted {
        /// Seat on turn first
        starting_seat: Seat,
        /// Cards left in the deck after the deal
        deck_remaining: usize,
    },

    /// A goods card was taken from the market
    GoodsTaken {
        /// Acting seat
        seat: Seat,
        /// Card taken
        card_id: CardId,
        /// Kind of the card taken
        kind: CardKind,
        /// Market slot it came from
        market_index: usize,
    },

    /// Every camel was taken from the market
    CamelsTaken {
        /// Acting seat
        seat: Seat,
        /// Camels taken
        count: usize,
        /// Herd size afterwards
        herd_size: usize,
    },

    /// Goods were sold for tokens
    GoodsSold {
        /// Acting seat
        seat: Seat,
        /// Kind sold
        kind: CardKind,
        /// Cards sold
        count: usize,
        /// Goods and bonus tokens awarded
        tokens: Vec<AwardedToken>,
        /// Points earned by this sale
        score: u32,
        /// Seat score afterwards
        new_score: u32,
    },

    /// The round finished
    RoundEnded {
        /// Camel majority bonus
        camel_bonus: CamelBonus,
        /// Scores including the camel bonus
        final_scores: SeatPair<u32>,
        /// Round winner
        winner: Winner,
    },
}

/// A game event stamped with the message sequence that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Sequence number of the inbound message
    pub seq: u64,

    /// Seat that acted, if any
    pub seat: Option<Seat>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(seq: u64, data: GameEventData) -> Self {
        let seat = match &data {
            GameEventData::GoodsTaken { seat, .. } => Some(*seat),
            GameEventData::CamelsTaken { seat, .. } => Some(*seat),
            GameEventData::GoodsSold { seat, .. } => Some(*seat),
            GameEventData::RoundStarted { starting_seat, .. } => Some(*starting_seat),
            GameEventData::RoundEnded { .. } => None,
        };

        Self { seq, seat, data }
    }

    /// Create round started event.
    pub fn round_started(seq: u64, starting_seat: Seat, deck_remaining: usize) -> Self {
        Self::new(
            seq,
            GameEventData::RoundStarted {
                starting_seat,
                deck_remaining,
            },
        )
    }

    /// Create goods taken event.
    pub fn goods_taken(
        seq: u64,
        seat: Seat,
        card_id: CardId,
        kind: CardKind,
        market_index: usize,
    ) -> Self {
        Self::new(
            seq,
            GameEventData::GoodsTaken {
                seat,
                card_id,
                kind,
                market_index,
            },
        )
    }

    /// Create camels taken event.
    pub fn camels_taken(seq: u64, seat: Seat, count: usize, herd_size: usize) -> Self {
        Self::new(seq, GameEventData::CamelsTaken { seat, count, herd_size })
    }

    /// Create goods sold event.
    pub fn goods_sold(
        seq: u64,
        seat: Seat,
        kind: CardKind,
        tokens: Vec<AwardedToken>,
        score: u32,
        new_score: u32,
    ) -> Self {
        let count = tokens
            .iter()
            .filter(|t| matches!(t.source, crate::game::tokens::TokenSource::Goods(_)))
            .count();
        Self::new(
            seq,
            GameEventData::GoodsSold {
                seat,
                kind,
                count,
                tokens,
                score,
                new_score,
            },
        )
    }

    /// Create round ended event.
    pub fn round_ended(
        seq: u64,
        camel_bonus: CamelBonus,
        final_scores: SeatPair<u32>,
        winner: Winner,
    ) -> Self {
        Self::new(
            seq,
            GameEventData::RoundEnded {
                camel_bonus,
                final_scores,
                winner,
            },
        )
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self.data {
            GameEventData::RoundStarted { .. } => "round_started",
            GameEventData::GoodsTaken { .. } => "goods_taken",
            GameEventData::CamelsTaken { .. } => "camels_taken",
            GameEventData::GoodsSold { .. } => "goods_sold",
            GameEventData::RoundEnded { .. } => "round_ended",
        }
    }
}
