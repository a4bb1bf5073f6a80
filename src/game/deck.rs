//! Deck Engine
//!
//! Builds and shuffles the deck, deals the opening hands and lays out the
//! opening market. The deck is drawn from its tail.

use crate::core::rng::DeterministicRng;
use crate::game::card::{CardArena, CardId};

/// Cards in a full deck.
pub const DECK_SIZE: usize = 49;

/// Goods cards dealt to each hand at round start.
pub const STARTING_HAND_SIZE: usize = 5;

/// Market size maintained while the deck can refill it.
pub const MARKET_SIZE: usize = 5;

/// Camels forced into the opening market.
pub const STARTING_CAMELS_IN_MARKET: usize = 3;

/// One seat's opening cards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DealtSeat {
    /// Goods only, never a camel
    pub hand: Vec<CardId>,
    /// Camels drawn while dealing
    pub camel_herd: Vec<CardId>,
}

/// Result of dealing both seats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deal {
    /// Remaining deck
    pub deck: Vec<CardId>,
    /// Seat 1 then seat 2
    pub seats: [DealtSeat; 2],
}

/// Result of laying out the opening market.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    /// Remaining deck
    pub deck: Vec<CardId>,
    /// Market, at most `MARKET_SIZE` cards
    pub market: Vec<CardId>,
}

/// Build a full deck in a uniformly random order.
pub fn build(arena: &CardArena, rng: &mut DeterministicRng) -> Vec<CardId> {
    let mut deck = arena.ids();
    rng.shuffle(&mut deck);
    deck
}

/// Deal both seats, seat 1 first.
///
/// Each seat draws from the tail until it holds `STARTING_HAND_SIZE` goods or
/// the deck runs out. Camels drawn along the way go to the seat's herd and do
/// not count toward the hand.
pub fn deal(mut deck: Vec<CardId>, arena: &CardArena) -> Deal {
    let first = deal_seat(&mut deck, arena);
    let second = deal_seat(&mut deck, arena);
    Deal {
        deck,
        seats: [first, second],
    }
}

fn deal_seat(deck: &mut Vec<CardId>, arena: &CardArena) -> DealtSeat {
    let mut seat = DealtSeat::default();
    while seat.hand.len() < STARTING_HAND_SIZE {
        let Some(id) = deck.pop() else { break };
        if arena.is_camel(id) {
            seat.camel_herd.push(id);
        } else {
            seat.hand.push(id);
        }
    }
    seat
}

/// Lay out the opening market.
///
/// Up to `STARTING_CAMELS_IN_MARKET` camels are pulled out of the deck wherever
/// they sit, then the remaining slots are filled from the tail.
pub fn build_starting_market(mut deck: Vec<CardId>, arena: &CardArena) -> Opening {
    let mut market = Vec::with_capacity(MARKET_SIZE);

    for _ in 0..STARTING_CAMELS_IN_MARKET {
        match deck.iter().position(|id| arena.is_camel(*id)) {
            Some(index) => market.push(deck.remove(index)),
            None => break,
        }
    }

    while market.len() < MARKET_SIZE {
        match deck.pop() {
            Some(id) => market.push(id),
            None => break,
        }
    }

    Opening { deck, market }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::CardKind;

    fn kinds(arena: &CardArena, ids: &[CardId]) -> Vec<CardKind> {
        ids.iter().filter_map(|id| arena.kind(*id)).collect()
    }

    #[test]
    fn test_build_is_full_permutation() {
        let arena = CardArena::standard();
        let mut rng = DeterministicRng::new(9);
        let deck = build(&arena, &mut rng);

        assert_eq!(deck.len(), DECK_SIZE);
        let mut sorted = deck.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, arena.ids());
    }

    #[test]
    fn test_build_depends_on_seed() {
        let arena = CardArena::standard();
        let a = build(&arena, &mut DeterministicRng::new(1));
        let b = build(&arena, &mut DeterministicRng::new(1));
        let c = build(&arena, &mut DeterministicRng::new(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deal_diverts_camels() {
        let arena = CardArena::standard();
        // Ids 38..=48 are camels. Seat 1 draws 41, 0, 45, 1, 2, 3, 4 from the tail.
        let deck: Vec<CardId> = vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 45, 0, 41];

        let result = deal(deck, &arena);
        for seat in &result.seats {
            assert!(kinds(&arena, &seat.hand).iter().all(|k| !k.is_camel()));
            assert!(kinds(&arena, &seat.camel_herd).iter().all(|k| k.is_camel()));
        }
        assert_eq!(result.seats[0].hand, vec![0, 1, 2, 3, 4]);
        assert_eq!(result.seats[0].camel_herd, vec![41, 45]);
        assert_eq!(result.seats[1].hand, vec![5, 6, 7, 8, 9]);
        assert!(result.seats[1].camel_herd.is_empty());
        assert!(result.deck.is_empty());
    }

    #[test]
    fn test_deal_stops_when_deck_runs_out() {
        let arena = CardArena::standard();
        // Only three goods in total.
        let result = deal(vec![0, 1, 2], &arena);
        assert_eq!(result.seats[0].hand, vec![2, 1, 0]);
        assert!(result.seats[1].hand.is_empty());
        assert!(result.deck.is_empty());
    }

    #[test]
    fn test_starting_market_forces_camels() {
        let arena = CardArena::standard();
        let mut rng = DeterministicRng::new(3);
        let dealt = deal(build(&arena, &mut rng), &arena);
        let opening = build_starting_market(dealt.deck.clone(), &arena);

        assert_eq!(opening.market.len(), MARKET_SIZE);
        let camels_left_before = dealt.deck.iter().filter(|id| arena.is_camel(**id)).count();
        let forced = camels_left_before.min(STARTING_CAMELS_IN_MARKET);
        assert!(opening.market[..forced].iter().all(|id| arena.is_camel(*id)));
        assert_eq!(opening.deck.len() + opening.market.len(), dealt.deck.len());
    }

    #[test]
    fn test_starting_market_without_camels() {
        let arena = CardArena::standard();
        let opening = build_starting_market(vec![0, 1, 2, 3, 4, 5, 6], &arena);
        assert_eq!(opening.market, vec![6, 5, 4, 3, 2]);
        assert_eq!(opening.deck, vec![0, 1]);
    }

    #[test]
    fn test_starting_market_short_deck() {
        let arena = CardArena::standard();
        let opening = build_starting_market(vec![0, 48], &arena);
        assert_eq!(opening.market, vec![48, 0]);
        assert!(opening.deck.is_empty());
    }
}
