//! Merit-order electricity market clearing engine.
//!
//! Teams bid generation and storage capacity into each period of a round;
//! the engine clears every period at a single uniform price and settles
//! revenue, cost and profit per team.
//!
//! # Architecture
//!
//! - `market`: availability, bid normalization, clearing, settlement and the
//!   per-period perturbation pipeline
//! - `engine`: session facade that runs rounds and records them
//! - `leaderboard`: append-only ledger of round profits
//! - `config`: market parameters from JSON and environment
//! - `bus`: in-process event bus for progress consumers

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod market;

pub use config::{load_market_config, BalancingConfig, ConfigError, MarketConfig};
pub use engine::MarketEngine;
pub use error::MarketError;
pub use leaderboard::{Leaderboard, LedgerEntry, Standing};

const DEFAULT_LOG_FILTER: &str = "meritorder_lib=debug,round_replay=debug,info";

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        tracing::debug!("tracing subscriber already installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_tracing_tolerates_repeat_calls() {
        super::init_tracing();
        super::init_tracing();
        tracing::debug!("subscriber still usable");
    }
}
