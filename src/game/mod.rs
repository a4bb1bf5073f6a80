//! Game Logic Module
//!
//! Card model, deck engine, rules engine and the match state machine.
//! Nothing here touches the network; randomness comes from the match's seeded RNG.
//!
//! ## Module Structure
//!
//! - `card`: Card kinds, card records and the per-match card arena
//! - `deck`: Shuffle, opening deal and opening market
//! - `tokens`: Goods and bonus token stacks
//! - `rules`: Pure validation and resolution of each action
//! - `state`: Match state machine, seats, phases, round result
//! - `events`: Events emitted per resolved action

pub mod card;
pub mod deck;
pub mod tokens;
pub mod rules;
pub mod state;
pub mod events;

// Re-export key types
pub use card::{Card, CardArena, CardId, CardKind};
pub use tokens::{AwardedToken, BonusStacks, BonusTier, TokenStacks};
pub use rules::{CamelBonus, RuleError, HAND_LIMIT};
pub use state::{
    ActionMode, MatchError, MatchPhase, MatchState, PlayerAction, PlayerState, RoundResult,
    Seat, SeatPair, Winner,
};
pub use events::{GameEvent, GameEventData};
