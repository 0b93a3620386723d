//! Market configuration.
//!
//! Values come from (in order of precedence) environment variables, an
//! optional JSON config file, then built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::market::scenario::ScenarioEvent;

/// Administrative price cap applied when supply cannot meet demand ($/MWh).
pub const DEFAULT_PRICE_CAP: f64 = 1_000.0;

pub const DEFAULT_MAX_BANDS_PER_BID: usize = 5;

/// Forced outages take the whole unit offline.
pub const DEFAULT_FORCED_OUTAGE_DERATE: f64 = 1.0;

pub const DEFAULT_BALANCING_DERATE: f64 = 0.7;

pub const DEFAULT_BALANCING_PROBABILITY: f64 = 0.5;

pub const ENV_PRICE_CAP: &str = "MERIT_PRICE_CAP";
pub const ENV_MAX_BANDS: &str = "MERIT_MAX_BANDS";
pub const ENV_BALANCING_DERATE: &str = "MERIT_BALANCING_DERATE";
pub const ENV_BALANCING_PROBABILITY: &str = "MERIT_BALANCING_PROBABILITY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse market config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
    #[error("invalid market config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingConfig {
    /// Fraction of the selected asset's availability removed.
    #[serde(default = "default_balancing_derate")]
    pub derate_fraction: f64,
    /// Chance that a balancing event fires in a round where it is enabled.
    #[serde(default = "default_balancing_probability")]
    pub trigger_probability: f64,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            derate_fraction: default_balancing_derate(),
            trigger_probability: default_balancing_probability(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_price_cap")]
    pub price_cap: f64,
    #[serde(default = "default_max_bands_per_bid")]
    pub max_bands_per_bid: usize,
    #[serde(default = "default_forced_outage_derate")]
    pub forced_outage_derate: f64,
    #[serde(default)]
    pub balancing: BalancingConfig,
    /// Extra scenario events merged over the built-in catalogue.
    #[serde(default)]
    pub scenarios: Vec<ScenarioEvent>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_cap: default_price_cap(),
            max_bands_per_bid: default_max_bands_per_bid(),
            forced_outage_derate: default_forced_outage_derate(),
            balancing: BalancingConfig::default(),
            scenarios: Vec::new(),
        }
    }
}

impl MarketConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: MarketConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `MERIT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_PRICE_CAP) {
            self.price_cap = parse_env(ENV_PRICE_CAP, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_BANDS) {
            self.max_bands_per_bid = parse_env(ENV_MAX_BANDS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BALANCING_DERATE) {
            self.balancing.derate_fraction = parse_env(ENV_BALANCING_DERATE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BALANCING_PROBABILITY) {
            self.balancing.trigger_probability = parse_env(ENV_BALANCING_PROBABILITY, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.price_cap.is_finite() || self.price_cap <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "price_cap must be positive, got {}",
                self.price_cap
            )));
        }
        if self.max_bands_per_bid == 0 {
            return Err(ConfigError::Invalid(
                "max_bands_per_bid must be at least 1".to_string(),
            ));
        }
        check_fraction("forced_outage_derate", self.forced_outage_derate)?;
        check_fraction("balancing.derate_fraction", self.balancing.derate_fraction)?;
        check_fraction(
            "balancing.trigger_probability",
            self.balancing.trigger_probability,
        )?;
        Ok(())
    }
}

/// Load the effective market config: defaults, then `path` if given, then
/// environment overrides (a `.env` file is honoured).
pub fn load_market_config(path: Option<&Path>) -> Result<MarketConfig, ConfigError> {
    load_dotenv();

    let mut config = match path {
        Some(path) => MarketConfig::from_path(path)?,
        None => MarketConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    tracing::debug!(
        "market config loaded: price_cap={} max_bands={} balancing_derate={}",
        config.price_cap,
        config.max_bands_per_bid,
        config.balancing.derate_fraction
    );
    Ok(config)
}

/// A missing `.env` is normal; any other failure leaves the process
/// environment as it was and is logged.
fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("ignoring unreadable .env file: {e}"),
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Env {
        key,
        value: raw.to_string(),
    })
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn default_price_cap() -> f64 {
    DEFAULT_PRICE_CAP
}

fn default_max_bands_per_bid() -> usize {
    DEFAULT_MAX_BANDS_PER_BID
}

fn default_forced_outage_derate() -> f64 {
    DEFAULT_FORCED_OUTAGE_DERATE
}

fn default_balancing_derate() -> f64 {
    DEFAULT_BALANCING_DERATE
}

fn default_balancing_probability() -> f64 {
    DEFAULT_BALANCING_PROBABILITY
}
