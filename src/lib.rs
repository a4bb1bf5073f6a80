//! # Jaipur Match Server
//!
//! Authoritative match engine for a two-player Jaipur-style goods trading game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    JAIPUR MATCH SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── rng.rs      - Seedable Xorshift128+ PRNG                │
//! │  └── hash.rs     - Snapshot state hashing                    │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── card.rs     - Card kinds and the card arena             │
//! │  ├── deck.rs     - Shuffle, deal, opening market             │
//! │  ├── tokens.rs   - Goods and bonus token stacks              │
//! │  ├── rules.rs    - Action validation and scoring             │
//! │  ├── state.rs    - Match state machine                       │
//! │  └── events.rs   - Events per resolved action                │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server and routing              │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - Match sessions and registry               │
//! │                                                              │
//! │  config.rs       - Server configuration                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Each match lives behind its own lock. Actions for one match are applied
//! one at a time and every resulting snapshot is queued to all of the match's
//! connections before the next action is taken, so clients see snapshots in
//! `seq` order. Different matches never share a lock.
//!
//! Given the same seed and the same actions, a match deals and plays out
//! identically.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::ServerConfig;
pub use core::rng::DeterministicRng;
pub use game::state::{MatchState, PlayerAction, Seat};
pub use network::server::GameServer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
