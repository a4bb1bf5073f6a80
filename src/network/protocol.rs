//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`.

use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

use crate::game::card::{Card, CardId, CardKind};
use crate::game::state::{
    ActionMode, MatchPhase, MatchState, PlayerAction, PlayerState, RoundResult, Seat, SeatPair,
};
use crate::game::tokens::{AwardedToken, BonusStacks, TokenStacks};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// Parsed with [`ClientMessage::from_json`], which accepts a missing or null
/// payload for the variants that carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request the current snapshot.
    Join,

    /// Deal a new round.
    StartRound(StartRoundPayload),

    /// Toggle the action mode.
    ChangeActionMode(ChangeActionModePayload),

    /// Take a goods card from the market.
    SelectMarketCard(SelectMarketCardPayload),

    /// Take every camel in the market.
    TakeCamels,

    /// Sell the staged hand selection.
    SellGoods,

    /// Toggle a hand card in the staged selection.
    SelectHandCard(SelectHandCardPayload),
}

/// start-round payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRoundPayload {
    /// Seat that moves first.
    #[serde(default)]
    pub starting_seat: Option<Seat>,
    /// Label for the starting seat.
    #[serde(default)]
    pub seat_label: Option<String>,
}

/// change-action-mode payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeActionModePayload {
    /// Requested mode; null clears it.
    #[serde(default)]
    pub mode: Option<ActionMode>,
}

/// select-market-card payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectMarketCardPayload {
    /// Market slot.
    pub index: i64,
}

/// select-hand-card payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectHandCardPayload {
    /// The card to toggle.
    pub card: CardRef,
}

/// Card reference sent by a client. Only the id is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    /// Card id.
    pub id: CardId,
    /// Kind as the client saw it.
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<CardKind>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl ClientMessage {
    /// Wire name of this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Join => "join",
            ClientMessage::StartRound(_) => "start-round",
            ClientMessage::ChangeActionMode(_) => "change-action-mode",
            ClientMessage::SelectMarketCard(_) => "select-market-card",
            ClientMessage::TakeCamels => "take-camels",
            ClientMessage::SellGoods => "sell-goods",
            ClientMessage::SelectHandCard(_) => "select-hand-card",
        }
    }

    /// Convert into the action the state machine applies.
    pub fn into_action(self) -> PlayerAction {
        match self {
            ClientMessage::Join => PlayerAction::Join,
            ClientMessage::StartRound(p) => PlayerAction::StartRound {
                starting_seat: p.starting_seat,
                seat_label: p.seat_label,
            },
            ClientMessage::ChangeActionMode(p) => PlayerAction::ChangeActionMode(p.mode),
            ClientMessage::SelectMarketCard(p) => PlayerAction::SelectMarketCard { index: p.index },
            ClientMessage::TakeCamels => PlayerAction::TakeCamels,
            ClientMessage::SellGoods => PlayerAction::SellGoods,
            ClientMessage::SelectHandCard(p) => PlayerAction::SelectHandCard { card_id: p.card.id },
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a client frame.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(s)?;
        let payload = match envelope.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        fn parse<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> Result<T, ProtocolError> {
            serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload {
                kind: kind.to_string(),
                source,
            })
        }

        let kind = envelope.kind.as_str();
        let message = match kind {
            "join" => ClientMessage::Join,
            "start-round" => ClientMessage::StartRound(parse(kind, payload)?),
            "change-action-mode" => ClientMessage::ChangeActionMode(parse(kind, payload)?),
            "select-market-card" => ClientMessage::SelectMarketCard(parse(kind, payload)?),
            "take-camels" => ClientMessage::TakeCamels,
            "sell-goods" => ClientMessage::SellGoods,
            "select-hand-card" => ClientMessage::SelectHandCard(parse(kind, payload)?),
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(message)
    }
}

/// Frames the server could not turn into a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or no `type` field.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Unrecognised `type`.
    #[error("unknown message type {0:?}")]
    UnknownType(String),

    /// Payload does not fit the message type.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Message type
        kind: String,
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full match snapshot, sent after every processed message.
    GameState(GameSnapshot),
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Full match state as clients see it. Card ids are resolved to records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Match id.
    pub match_id: String,
    /// Messages processed so far.
    pub seq: u64,
    /// Current phase.
    pub phase: MatchPhase,
    /// Seat on turn.
    pub current_player: Seat,
    /// Per-seat state.
    pub players: SeatPair<PlayerSnapshot>,
    /// Market, slot order.
    pub market: Vec<Card>,
    /// Remaining deck, drawn from the end.
    pub deck: Vec<Card>,
    /// Goods token stacks.
    pub token_stacks: TokenStacks,
    /// Bonus token stacks.
    pub bonus_stacks: BonusStacks,
    /// Action mode of the seat on turn.
    pub action_mode: Option<ActionMode>,
    /// Status line.
    pub message: String,
    /// Staged selection.
    pub selection: SelectionSnapshot,
    /// Set once the round is over.
    pub round_result: Option<RoundResult>,
    /// Hex SHA-256 of the canonical state.
    pub state_hash: String,
}

/// One seat as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Goods in hand.
    pub hand: Vec<Card>,
    /// Camels collected.
    pub camel_herd: Vec<Card>,
    /// Tokens won.
    pub tokens: Vec<AwardedToken>,
    /// Current score.
    pub score: u32,
}

/// Staged selection as clients see it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    /// Cards staged for sale.
    pub hand: Vec<Card>,
}

impl GameSnapshot {
    /// Build the snapshot of a match.
    pub fn from_state(state: &MatchState) -> Self {
        let arena = state.arena();
        let player = |p: &PlayerState| PlayerSnapshot {
            hand: arena.resolve(&p.hand),
            camel_herd: arena.resolve(&p.camel_herd),
            tokens: p.tokens.clone(),
            score: p.score,
        };

        Self {
            match_id: state.match_id.clone(),
            seq: state.seq,
            phase: state.phase,
            current_player: state.current_seat,
            players: SeatPair::new(player(state.player(Seat::One)), player(state.player(Seat::Two))),
            market: arena.resolve(&state.market),
            deck: arena.resolve(&state.deck),
            token_stacks: state.token_stacks.clone(),
            bonus_stacks: state.bonus_stacks.clone(),
            action_mode: state.action_mode,
            message: state.message.clone(),
            selection: SelectionSnapshot {
                hand: arena.resolve(&state.selection.hand),
            },
            round_result: state.round_result,
            state_hash: hex::encode(state.compute_hash()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
