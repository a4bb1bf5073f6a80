//! Network Layer
//!
//! WebSocket server, wire protocol and match sessions.
//! All game rules run through `game/`; this layer only routes and relays.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, GameSnapshot, PlayerSnapshot, ProtocolError};
pub use session::{ConnectionId, MatchSession, MatchRegistry};
pub use server::{GameServer, GameServerError, Route};
