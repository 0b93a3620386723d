//! Per-period perturbation pipeline.
//!
//! A period moves one way through
//! `Idle → ScenarioApplied → BalancingApplied → Frozen → Cleared`.
//! Bids are accepted until the period is frozen; freezing resolves
//! availability and normalizes the bids into the snapshot the clearer sees.

use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::market::availability::{resolve_period, PeriodConditions};
use crate::market::bids::{normalize_bids, NormalizedBids};
use crate::market::clearing::{clear_period, ClearingInput};
use crate::market::settlement::settle_period;
use crate::market::types::{
    AssetBid, AssetInstance, BalancingEvent, ClearingResult, RoundPeriod, ScenarioEffect, TeamId,
    TeamPeriodFinancials,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    ScenarioApplied,
    BalancingApplied,
    Frozen,
    Cleared,
}

/// Immutable inputs to clearing, captured at freeze time.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenPeriod {
    pub conditions: PeriodConditions,
    pub bids: NormalizedBids,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodOutcome {
    pub clearing: ClearingResult,
    pub financials: Vec<TeamPeriodFinancials>,
}

pub struct PeriodPipeline<'a> {
    period: RoundPeriod,
    assets: &'a [AssetInstance],
    config: &'a MarketConfig,
    stage: PipelineStage,
    scenario_applied: bool,
    effects: Vec<ScenarioEffect>,
    balancing: Option<BalancingEvent>,
    bids: Vec<AssetBid>,
    frozen: Option<FrozenPeriod>,
}

impl<'a> PeriodPipeline<'a> {
    pub fn new(period: RoundPeriod, assets: &'a [AssetInstance], config: &'a MarketConfig) -> Self {
        Self {
            period,
            assets,
            config,
            stage: PipelineStage::Idle,
            scenario_applied: false,
            effects: Vec::new(),
            balancing: None,
            bids: Vec::new(),
            frozen: None,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    fn transition(&self, to: PipelineStage) -> MarketError {
        MarketError::InvalidTransition {
            period: self.period.id.clone(),
            from: self.stage,
            to,
        }
    }

    pub fn submit_bid(&mut self, bid: AssetBid) -> Result<(), MarketError> {
        if self.stage >= PipelineStage::Frozen {
            return Err(MarketError::PeriodFrozen {
                period: self.period.id.clone(),
                team_id: bid.team_id,
                asset_id: bid.asset_id,
            });
        }
        if bid.period != self.period.id {
            return Err(MarketError::WrongPeriod {
                period: self.period.id.clone(),
                bid_period: bid.period,
            });
        }
        self.bids.push(bid);
        Ok(())
    }

    /// Apply the round's scenario effects. Returns `Ok(false)` if they were
    /// already applied; the second application changes nothing.
    pub fn apply_scenario(&mut self, effects: Vec<ScenarioEffect>) -> Result<bool, MarketError> {
        if self.scenario_applied {
            tracing::debug!(
                "scenario effects already applied to period {}, skipping",
                self.period.id
            );
            return Ok(false);
        }
        if self.stage != PipelineStage::Idle {
            return Err(self.transition(PipelineStage::ScenarioApplied));
        }

        tracing::debug!(
            "period {}: {} scenario effect(s) applied",
            self.period.id,
            effects.len()
        );
        self.effects = effects;
        self.scenario_applied = true;
        self.stage = PipelineStage::ScenarioApplied;
        Ok(true)
    }

    pub fn apply_balancing(&mut self, event: Option<BalancingEvent>) -> Result<(), MarketError> {
        if self.stage != PipelineStage::ScenarioApplied {
            return Err(self.transition(PipelineStage::BalancingApplied));
        }
        self.balancing = event;
        self.stage = PipelineStage::BalancingApplied;
        Ok(())
    }

    pub fn freeze(&mut self) -> Result<&FrozenPeriod, MarketError> {
        if self.stage != PipelineStage::BalancingApplied {
            return Err(self.transition(PipelineStage::Frozen));
        }

        let conditions = resolve_period(
            self.assets,
            &self.effects,
            self.balancing.as_ref(),
            &self.period.id,
            self.config,
        );
        let bids = normalize_bids(&self.bids, &conditions, self.config.max_bands_per_bid);
        tracing::debug!(
            "period {} frozen: {} offer(s), {} charge load(s), {:.2} MW available",
            self.period.id,
            bids.offers.len(),
            bids.loads.len(),
            conditions.total_available_mw()
        );

        self.stage = PipelineStage::Frozen;
        Ok(&*self.frozen.insert(FrozenPeriod { conditions, bids }))
    }

    /// Clear the frozen snapshot and settle every team in `teams`.
    pub fn clear(&mut self, teams: &[TeamId]) -> Result<PeriodOutcome, MarketError> {
        let Some(frozen) = self.frozen.as_ref().filter(|_| self.stage == PipelineStage::Frozen) else {
            return Err(self.transition(PipelineStage::Cleared));
        };

        let clearing = clear_period(&ClearingInput {
            period: &self.period.id,
            base_demand_mw: self.period.base_demand_mw,
            demand_multiplier: frozen.conditions.demand_multiplier,
            offers: &frozen.bids.offers,
            loads: &frozen.bids.loads,
            price_cap: self.config.price_cap,
        });
        let financials = settle_period(&clearing, &frozen.conditions, teams);

        self.stage = PipelineStage::Cleared;
        Ok(PeriodOutcome { clearing, financials })
    }
}
