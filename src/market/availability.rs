//! Effective availability and marginal cost per asset for one period.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::market::types::{
    AssetId, AssetInstance, AssetKind, BalancingEvent, PeriodId, ScenarioEffect, TeamId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAsset {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    pub kind: AssetKind,
    pub nameplate_mw: f64,
    pub available_mw: f64,
    /// SRMC after scenario adjustments.
    pub srmc: f64,
    pub forced_outage: bool,
    pub balancing_derated: bool,
}

/// Frozen per-period view of the roster after all perturbations.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodConditions {
    pub period: PeriodId,
    pub demand_multiplier: f64,
    assets: BTreeMap<(TeamId, AssetId), ResolvedAsset>,
}

impl PeriodConditions {
    pub fn asset(&self, team_id: &str, asset_id: &str) -> Option<&ResolvedAsset> {
        self.assets.get(&(team_id.to_string(), asset_id.to_string()))
    }

    pub fn assets(&self) -> impl Iterator<Item = &ResolvedAsset> {
        self.assets.values()
    }

    pub fn total_available_mw(&self) -> f64 {
        self.assets.values().map(|asset| asset.available_mw).sum()
    }
}

/// Product of every demand multiplier that targets `period`, in declaration order.
pub fn demand_multiplier(effects: &[ScenarioEffect], period: &str) -> f64 {
    effects
        .iter()
        .filter_map(|effect| match effect {
            ScenarioEffect::DemandMultiplier { target, factor } if target.matches_period(period) => {
                Some(*factor)
            }
            _ => None,
        })
        .fold(1.0, |acc, factor| acc * factor)
}

pub fn resolve_asset(
    asset: &AssetInstance,
    effects: &[ScenarioEffect],
    balancing: Option<&BalancingEvent>,
    period: &str,
    config: &MarketConfig,
) -> ResolvedAsset {
    let mut available = asset.nameplate_mw.max(0.0) * asset.capacity_factor(period);
    let mut srmc = asset.srmc;
    let mut forced_outage = asset.forced_outage;

    for effect in effects {
        if !effect.target().matches(asset.kind, period) {
            continue;
        }
        match effect {
            ScenarioEffect::AvailabilityMultiplier { factor, .. } => available *= factor.max(0.0),
            ScenarioEffect::SrmcMultiplier { factor, .. } => srmc *= factor,
            ScenarioEffect::SrmcAdditive { amount, .. } => srmc += amount,
            ScenarioEffect::ForcedOutage { .. } => forced_outage = true,
            ScenarioEffect::DemandMultiplier { .. } => {}
        }
    }

    if forced_outage {
        available *= 1.0 - config.forced_outage_derate;
    }

    let balancing_derated = balancing.map_or(false, |event| {
        event.team_id == asset.team_id && event.asset_id == asset.asset_id
    });
    if let Some(event) = balancing.filter(|_| balancing_derated) {
        available *= 1.0 - event.derate_fraction.clamp(0.0, 1.0);
    }

    ResolvedAsset {
        team_id: asset.team_id.clone(),
        asset_id: asset.asset_id.clone(),
        kind: asset.kind,
        nameplate_mw: asset.nameplate_mw,
        available_mw: available.max(0.0),
        srmc,
        forced_outage,
        balancing_derated,
    }
}

/// Resolve every asset in the roster for `period`.
///
/// `effects` must already be filtered to ones that reference known kinds and
/// periods; see [`crate::market::scenario::validate_effects`].
pub fn resolve_period(
    assets: &[AssetInstance],
    effects: &[ScenarioEffect],
    balancing: Option<&BalancingEvent>,
    period: &str,
    config: &MarketConfig,
) -> PeriodConditions {
    let mut resolved = BTreeMap::new();
    for asset in assets {
        let key = (asset.team_id.clone(), asset.asset_id.clone());
        if resolved.contains_key(&key) {
            tracing::warn!(
                "duplicate asset {}/{} in roster, keeping the first",
                asset.team_id,
                asset.asset_id
            );
            continue;
        }
        resolved.insert(key, resolve_asset(asset, effects, balancing, period, config));
    }

    PeriodConditions {
        period: period.to_string(),
        demand_multiplier: demand_multiplier(effects, period).max(0.0),
        assets: resolved,
    }
}
