//! Match State Machine
//!
//! Owns one match's canonical state, sequences turns and runs each inbound
//! action through the rules engine. Phases go `loading -> playing -> roundOver`,
//! and `start-round` from `roundOver` begins a rematch.

use std::fmt;
use serde::{Serialize, Deserialize, Serializer, Deserializer};
use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::card::{CardArena, CardId};
use crate::game::deck::{self, DealtSeat};
use crate::game::events::GameEvent;
use crate::game::rules::{self, CamelBonus, RuleError, HAND_LIMIT};
use crate::game::tokens::{AwardedToken, BonusStacks, TokenStacks};

// =============================================================================
// SEAT
// =============================================================================

/// Turn-order position within a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Seat {
    /// Seat 1
    One = 1,
    /// Seat 2
    Two = 2,
}

impl Seat {
    /// Both seats in turn order.
    pub const ALL: [Seat; 2] = [Seat::One, Seat::Two];

    /// Seat number (1 or 2).
    #[inline]
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Index into per-seat arrays (0 or 1).
    #[inline]
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// The opposing seat.
    #[inline]
    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Seat from its number.
    pub fn from_number(number: u8) -> Option<Seat> {
        match number {
            1 => Some(Seat::One),
            2 => Some(Seat::Two),
            _ => None,
        }
    }

    /// Default display label, "Player N".
    pub fn label(self) -> String {
        format!("Player {}", self.number())
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Seat::from_number(value).ok_or_else(|| format!("invalid seat {value}"))
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        seat.number()
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// One value per seat, keyed `"1"` and `"2"` on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatPair<T> {
    /// Seat 1 value
    #[serde(rename = "1")]
    pub one: T,
    /// Seat 2 value
    #[serde(rename = "2")]
    pub two: T,
}

impl<T> SeatPair<T> {
    /// Pair from both values.
    pub fn new(one: T, two: T) -> Self {
        Self { one, two }
    }

    /// Value for a seat.
    pub fn get(&self, seat: Seat) -> &T {
        match seat {
            Seat::One => &self.one,
            Seat::Two => &self.two,
        }
    }

    /// Apply `f` to both values.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> SeatPair<U> {
        SeatPair::new(f(self.one), f(self.two))
    }
}

// =============================================================================
// PHASE AND MODE
// =============================================================================

/// Current phase of the match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum MatchPhase {
    /// Created, waiting for start-round
    #[default]
    Loading = 0,
    /// Round in progress
    Playing = 1,
    /// Round finished, result recorded
    RoundOver = 2,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchPhase::Loading => "loading",
            MatchPhase::Playing => "playing",
            MatchPhase::RoundOver => "roundOver",
        })
    }
}

/// Which action the acting player is preparing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionMode {
    /// Taking from the market
    TakeCard,
    /// Selecting goods to sell
    SellGoods,
}

impl ActionMode {
    fn hash_tag(mode: Option<ActionMode>) -> u8 {
        match mode {
            None => 0,
            Some(ActionMode::TakeCard) => 1,
            Some(ActionMode::SellGoods) => 2,
        }
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// One seat's cards and winnings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerState {
    /// Goods cards, never a camel
    pub hand: Vec<CardId>,

    /// Camels collected this round
    pub camel_herd: Vec<CardId>,

    /// Tokens won, in award order
    pub tokens: Vec<AwardedToken>,

    /// Score; only grows during a round
    pub score: u32,
}

impl PlayerState {
    /// Player holding an opening deal.
    pub fn dealt(seat: DealtSeat) -> Self {
        Self {
            hand: seat.hand,
            camel_herd: seat.camel_herd,
            tokens: Vec::new(),
            score: 0,
        }
    }

    /// Hash player state.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32_list(&self.hand);
        hasher.update_u32_list(&self.camel_herd);
        hasher.update_u32(self.tokens.len() as u32);
        for token in &self.tokens {
            hasher.update_u8(token.source.hash_tag());
            hasher.update_u32(token.value);
        }
        hasher.update_u32(self.score);
    }
}

/// Hand cards staged for a sale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Staged card ids, in selection order
    pub hand: Vec<CardId>,
}

impl Selection {
    /// Add the card if absent, remove it if present. Returns whether it is now staged.
    pub fn toggle(&mut self, id: CardId) -> bool {
        if let Some(pos) = self.hand.iter().position(|staged| *staged == id) {
            self.hand.remove(pos);
            false
        } else {
            self.hand.push(id);
            true
        }
    }

    /// Drop every staged card.
    pub fn clear(&mut self) {
        self.hand.clear();
    }
}

// =============================================================================
// ROUND RESULT
// =============================================================================

/// Round winner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winner {
    /// Higher final score
    Seat(Seat),
    /// Equal final scores
    Tie,
}

impl Winner {
    /// Winner from final scores.
    pub fn from_scores(scores: &SeatPair<u32>) -> Self {
        use std::cmp::Ordering;

        match scores.one.cmp(&scores.two) {
            Ordering::Greater => Winner::Seat(Seat::One),
            Ordering::Less => Winner::Seat(Seat::Two),
            Ordering::Equal => Winner::Tie,
        }
    }
}

// Serialized as the seat number, or the string "tie".
impl Serialize for Winner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Winner::Seat(seat) => serializer.serialize_u8(seat.number()),
            Winner::Tie => serializer.serialize_str("tie"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WinnerRepr {
    Seat(Seat),
    Text(String),
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WinnerRepr::deserialize(deserializer)? {
            WinnerRepr::Seat(seat) => Ok(Winner::Seat(seat)),
            WinnerRepr::Text(text) if text == "tie" => Ok(Winner::Tie),
            WinnerRepr::Text(text) => {
                Err(serde::de::Error::custom(format!("unknown winner {text:?}")))
            }
        }
    }
}

/// Recorded once when a round ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    /// Camel majority bonus per seat
    pub camel_bonus: CamelBonus,
    /// Scores including the camel bonus
    pub final_scores: SeatPair<u32>,
    /// Seat with the higher final score, or a tie
    pub winner: Winner,
}

// =============================================================================
// ACTIONS AND ERRORS
// =============================================================================

/// A validated action submitted by a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    /// Ask for a fresh snapshot; no state change
    Join,
    /// Deal a new round
    StartRound {
        /// Seat that moves first; falls back to the matchmaking seat, then a coin flip
        starting_seat: Option<Seat>,
        /// Label used in the opening message
        seat_label: Option<String>,
    },
    /// Toggle the action mode; `None` clears it
    ChangeActionMode(Option<ActionMode>),
    /// Take the goods card at a market slot
    SelectMarketCard {
        /// Market slot, unchecked
        index: i64,
    },
    /// Take every camel in the market
    TakeCamels,
    /// Sell the staged selection
    SellGoods,
    /// Toggle a hand card in the staged selection
    SelectHandCard {
        /// Card to toggle
        card_id: CardId,
    },
}

/// Why the state machine rejected an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Rules engine rejection
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Submitted by the seat that is not on turn
    #[error("It is not your turn")]
    NotYourTurn,

    /// Submitted by a spectator
    #[error("Spectators cannot act")]
    NotSeated,

    /// Action not valid in the current phase
    #[error("Not allowed while the match is {0}")]
    WrongPhase(MatchPhase),

    /// start-round while a round is being played
    #[error("A round is already in progress")]
    RoundInProgress,

    /// Selected card is not in the acting seat's hand
    #[error("Card {0} is not in your hand")]
    CardNotInHand(CardId),
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one match.
#[derive(Clone, Debug)]
pub struct MatchState {
    /// Match identifier
    pub match_id: String,

    /// Current phase
    pub phase: MatchPhase,

    /// Seat on turn
    pub current_seat: Seat,

    /// Per-seat state, indexed by `Seat::index`
    pub players: [PlayerState; 2],

    /// Face-up market
    pub market: Vec<CardId>,

    /// Draw pile, drawn from the tail
    pub deck: Vec<CardId>,

    /// Goods token stacks
    pub token_stacks: TokenStacks,

    /// Bonus token stacks
    pub bonus_stacks: BonusStacks,

    /// Presentation hint for the acting seat
    pub action_mode: Option<ActionMode>,

    /// Cards staged for sale
    pub selection: Selection,

    /// Last status line
    pub message: String,

    /// Set when the round ends
    pub round_result: Option<RoundResult>,

    /// Inbound messages processed so far
    pub seq: u64,

    /// RNG seed (for reproduction)
    pub rng_seed: u64,

    /// Starting seat handed over by matchmaking
    pub default_starting_seat: Option<Seat>,

    arena: CardArena,
    rng: DeterministicRng,
    pending_events: Vec<GameEvent>,
}

impl MatchState {
    /// Create a match in the loading phase.
    pub fn new(match_id: impl Into<String>, rng_seed: u64) -> Self {
        Self {
            match_id: match_id.into(),
            phase: MatchPhase::Loading,
            current_seat: Seat::One,
            players: Default::default(),
            market: Vec::new(),
            deck: Vec::new(),
            token_stacks: TokenStacks::initial(),
            bonus_stacks: BonusStacks::initial(),
            action_mode: None,
            selection: Selection::default(),
            message: "Waiting for the round to start".to_string(),
            round_result: None,
            seq: 0,
            rng_seed,
            default_starting_seat: None,
            arena: CardArena::standard(),
            rng: DeterministicRng::new(rng_seed),
            pending_events: Vec::new(),
        }
    }

    /// Card records for this match.
    pub fn arena(&self) -> &CardArena {
        &self.arena
    }

    /// State of a seat.
    pub fn player(&self, seat: Seat) -> &PlayerState {
        &self.players[seat.index()]
    }

    /// Mutable state of a seat.
    pub fn player_mut(&mut self, seat: Seat) -> &mut PlayerState {
        &mut self.players[seat.index()]
    }

    /// Apply one inbound action.
    ///
    /// Every call advances `seq`. On error the state is unchanged apart from
    /// the status message (and, for a rejected sale, the staged selection).
    pub fn apply(&mut self, submitter: Option<Seat>, action: PlayerAction) -> Result<(), MatchError> {
        self.seq += 1;

        if let Err(err) = self.dispatch(submitter, action) {
            self.message = err.to_string();
            return Err(err);
        }

        if self.phase == MatchPhase::Playing && rules::is_round_over(&self.deck, &self.token_stacks) {
            self.finalize_round();
        }
        Ok(())
    }

    fn dispatch(&mut self, submitter: Option<Seat>, action: PlayerAction) -> Result<(), MatchError> {
        match action {
            PlayerAction::Join => Ok(()),
            PlayerAction::StartRound { starting_seat, seat_label } => {
                submitter.ok_or(MatchError::NotSeated)?;
                if self.phase == MatchPhase::Playing {
                    return Err(MatchError::RoundInProgress);
                }
                self.start_round(starting_seat, seat_label);
                Ok(())
            }
            PlayerAction::ChangeActionMode(mode) => {
                self.require_turn(submitter)?;
                self.action_mode = if self.action_mode == mode { None } else { mode };
                self.selection.clear();
                Ok(())
            }
            PlayerAction::SelectMarketCard { index } => {
                self.require_turn(submitter)?;
                self.take_goods(index)
            }
            PlayerAction::TakeCamels => {
                self.require_turn(submitter)?;
                self.take_camels()
            }
            PlayerAction::SellGoods => {
                self.require_turn(submitter)?;
                self.sell_selection()
            }
            PlayerAction::SelectHandCard { card_id } => {
                let seat = self.require_turn(submitter)?;
                if !self.player(seat).hand.contains(&card_id) {
                    return Err(MatchError::CardNotInHand(card_id));
                }
                self.selection.toggle(card_id);
                Ok(())
            }
        }
    }

    fn require_turn(&self, submitter: Option<Seat>) -> Result<Seat, MatchError> {
        let seat = submitter.ok_or(MatchError::NotSeated)?;
        if self.phase != MatchPhase::Playing {
            return Err(MatchError::WrongPhase(self.phase));
        }
        if seat != self.current_seat {
            return Err(MatchError::NotYourTurn);
        }
        Ok(seat)
    }

    fn start_round(&mut self, starting_seat: Option<Seat>, seat_label: Option<String>) {
        let starting = match starting_seat.or(self.default_starting_seat) {
            Some(seat) => seat,
            None if self.rng.coin_flip() => Seat::One,
            None => Seat::Two,
        };

        let shuffled = deck::build(&self.arena, &mut self.rng);
        let dealt = deck::deal(shuffled, &self.arena);
        let [first, second] = dealt.seats;
        let opening = deck::build_starting_market(dealt.deck, &self.arena);

        self.players = [PlayerState::dealt(first), PlayerState::dealt(second)];
        self.market = opening.market;
        self.deck = opening.deck;
        self.token_stacks = TokenStacks::initial();
        self.bonus_stacks = BonusStacks::initial();
        self.action_mode = None;
        self.selection.clear();
        self.round_result = None;
        self.current_seat = starting;
        self.phase = MatchPhase::Playing;

        let label = seat_label
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| starting.label());
        self.message = format!("{label}'s turn");

        self.push_event(GameEvent::round_started(self.seq, starting, self.deck.len()));
    }

    fn take_goods(&mut self, index: i64) -> Result<(), MatchError> {
        let seat = self.current_seat;
        let outcome = rules::take_goods_card(
            index,
            &self.market,
            &self.deck,
            &self.player(seat).hand,
            HAND_LIMIT,
            &self.arena,
        )?;

        self.market = outcome.market;
        self.deck = outcome.deck;
        self.player_mut(seat).hand = outcome.hand;

        self.push_event(GameEvent::goods_taken(
            self.seq,
            seat,
            outcome.taken.id,
            outcome.taken.kind,
            index as usize,
        ));
        self.advance_turn(format!("{} took {}", seat.label(), outcome.taken.kind));
        Ok(())
    }

    fn take_camels(&mut self) -> Result<(), MatchError> {
        let seat = self.current_seat;
        let outcome = rules::take_camels(
            &self.market,
            &self.deck,
            &self.player(seat).camel_herd,
            &self.arena,
        )?;

        let count = outcome.taken.len();
        self.market = outcome.market;
        self.deck = outcome.deck;
        self.player_mut(seat).camel_herd = outcome.camel_herd;

        let herd_size = self.player(seat).camel_herd.len();
        self.push_event(GameEvent::camels_taken(self.seq, seat, count, herd_size));

        let noun = if count == 1 { "camel" } else { "camels" };
        self.advance_turn(format!("{} took {count} {noun}", seat.label()));
        Ok(())
    }

    fn sell_selection(&mut self) -> Result<(), MatchError> {
        let seat = self.current_seat;
        // The staged selection is consumed whether or not the sale goes through.
        let selected = std::mem::take(&mut self.selection.hand);

        let outcome = rules::sell_goods(
            &selected,
            &self.token_stacks,
            &self.bonus_stacks,
            &self.arena,
        )?;

        let awarded: Vec<AwardedToken> = outcome.awarded().collect();
        let player = self.player_mut(seat);
        player.hand.retain(|id| !selected.contains(id));
        player.tokens.extend_from_slice(&awarded);
        player.score += outcome.score;
        let new_score = player.score;

        self.token_stacks = outcome.token_stacks;
        self.bonus_stacks = outcome.bonus_stacks;

        self.push_event(GameEvent::goods_sold(
            self.seq,
            seat,
            outcome.kind,
            awarded,
            outcome.score,
            new_score,
        ));
        self.advance_turn(format!(
            "{} sold {} {} for {} points",
            seat.label(),
            outcome.count,
            outcome.kind,
            outcome.score
        ));
        Ok(())
    }

    fn advance_turn(&mut self, result_text: String) {
        self.selection.clear();
        self.action_mode = None;
        self.current_seat = self.current_seat.other();
        self.message = format!("{result_text} • {}'s turn", self.current_seat.label());
    }

    fn finalize_round(&mut self) {
        self.phase = MatchPhase::RoundOver;

        let camel_bonus = rules::calculate_camel_bonus(
            &self.players[0].camel_herd,
            &self.players[1].camel_herd,
        );
        let final_scores = SeatPair::new(
            self.players[0].score + camel_bonus.player1,
            self.players[1].score + camel_bonus.player2,
        );
        let winner = Winner::from_scores(&final_scores);

        self.players[0].score = final_scores.one;
        self.players[1].score = final_scores.two;
        self.round_result = Some(RoundResult {
            camel_bonus,
            final_scores,
            winner,
        });
        self.message = match winner {
            Winner::Seat(seat) => format!("Round over • {} wins!", seat.label()),
            Winner::Tie => "Round over • It's a tie!".to_string(),
        };

        self.push_event(GameEvent::round_ended(self.seq, camel_bonus, final_scores, winner));
    }

    /// Compute hash of current state for divergence checks.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.seq, |hasher| {
            hasher.update_str(&self.match_id);
            hasher.update_u8(self.phase as u8);
            hasher.update_u8(self.current_seat.number());

            for player in &self.players {
                player.hash_into(hasher);
            }

            hasher.update_u32_list(&self.market);
            hasher.update_u32_list(&self.deck);

            for (kind, stack) in self.token_stacks.iter() {
                hasher.update_u8(kind as u8);
                hasher.update_u32_list(stack);
            }
            hasher.update_u32_list(&self.bonus_stacks.three);
            hasher.update_u32_list(&self.bonus_stacks.four);
            hasher.update_u32_list(&self.bonus_stacks.five);

            hasher.update_u8(ActionMode::hash_tag(self.action_mode));
            hasher.update_u32_list(&self.selection.hand);
            hasher.update_str(&self.message);

            match &self.round_result {
                None => hasher.update_u8(0),
                Some(result) => {
                    hasher.update_u8(1);
                    hasher.update_u32(result.camel_bonus.player1);
                    hasher.update_u32(result.camel_bonus.player2);
                    hasher.update_u32(result.final_scores.one);
                    hasher.update_u32(result.final_scores.two);
                    hasher.update_u8(match result.winner {
                        Winner::Seat(seat) => seat.number(),
                        Winner::Tie => 0,
                    });
                }
            }
        })
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================
