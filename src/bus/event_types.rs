//! Market event categories, type names and the typed event payloads
//! published on the bus.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::market::types::{PriceFormation, TeamId};

pub const CATEGORY_MARKET: &str = "market";

pub const EVENT_SCENARIO_APPLIED: &str = "scenario_applied";
pub const EVENT_BALANCING_APPLIED: &str = "balancing_applied";
pub const EVENT_PERIOD_CLEARED: &str = "period_cleared";
pub const EVENT_ROUND_SETTLED: &str = "round_settled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Scenario effects were activated for a round.
    ScenarioApplied {
        round: u32,
        scenario_ids: Vec<String>,
    },

    /// A catch-up derate was drawn against a leader's asset.
    BalancingApplied {
        round: u32,
        team_id: String,
        asset_id: String,
        derate_fraction: f64,
    },

    PeriodCleared {
        round: u32,
        period: String,
        clearing_price: f64,
        price_formation: PriceFormation,
        effective_demand_mw: f64,
        total_dispatched_mw: f64,
        shortfall_mw: f64,
    },

    /// Round profits were appended to the leaderboard.
    RoundSettled {
        round: u32,
        team_profits: BTreeMap<TeamId, f64>,
        digest: String,
    },
}

impl MarketEvent {
    pub fn category(&self) -> &'static str {
        CATEGORY_MARKET
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::ScenarioApplied { .. } => EVENT_SCENARIO_APPLIED,
            MarketEvent::BalancingApplied { .. } => EVENT_BALANCING_APPLIED,
            MarketEvent::PeriodCleared { .. } => EVENT_PERIOD_CLEARED,
            MarketEvent::RoundSettled { .. } => EVENT_ROUND_SETTLED,
        }
    }

    /// Convert to a JSON payload for the event bus.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            tracing::warn!("failed to encode {} payload: {e}", self.event_type());
            serde_json::json!({})
        })
    }
}
