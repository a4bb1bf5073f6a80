//! Core primitives.
//!
//! Seedable randomness and state hashing shared by the game and network layers.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, derive_match_seed};
pub use hash::{StateHash, StateHasher, compute_state_hash};
