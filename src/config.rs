//! Server configuration.
//!
//! Defaults suit local play; every field can be overridden from the
//! environment with a `JAIPUR_` variable.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue depth per connection.
    pub outbound_buffer: usize,
    /// How long a match with no connections survives.
    pub abandon_grace: Duration,
    /// How often abandoned matches are swept.
    pub cleanup_interval: Duration,
    /// Server seed for reproducible decks; random per match when unset.
    pub rng_seed: Option<u64>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_buffer: 64,
            abandon_grace: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            rng_seed: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `JAIPUR_BIND_ADDR`, `JAIPUR_MAX_CONNECTIONS`,
    /// `JAIPUR_OUTBOUND_BUFFER`, `JAIPUR_ABANDON_GRACE_SECS`,
    /// `JAIPUR_CLEANUP_INTERVAL_SECS` and `JAIPUR_RNG_SEED`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: parse_or(&lookup, "JAIPUR_BIND_ADDR", defaults.bind_addr),
            max_connections: parse_or(&lookup, "JAIPUR_MAX_CONNECTIONS", defaults.max_connections),
            outbound_buffer: parse_or(&lookup, "JAIPUR_OUTBOUND_BUFFER", defaults.outbound_buffer)
                .max(1),
            abandon_grace: Duration::from_secs(parse_or(
                &lookup,
                "JAIPUR_ABANDON_GRACE_SECS",
                defaults.abandon_grace.as_secs(),
            )),
            cleanup_interval: Duration::from_secs(
                parse_or(
                    &lookup,
                    "JAIPUR_CLEANUP_INTERVAL_SECS",
                    defaults.cleanup_interval.as_secs(),
                )
                .max(1),
            ),
            rng_seed: lookup("JAIPUR_RNG_SEED").and_then(|raw| match raw.parse() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    warn!(value = %raw, "Ignoring invalid JAIPUR_RNG_SEED");
                    None
                }
            }),
            version: defaults.version,
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Invalid config value, using default");
                default
            }
        },
        None => default,
    }
}
