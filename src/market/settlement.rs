//! Pay-as-cleared settlement of a period's clearing result.

use std::collections::BTreeMap;

use crate::market::availability::PeriodConditions;
use crate::market::types::{
    AssetFinancials, AssetId, ClearingResult, OperatingMode, TeamId, TeamPeriodFinancials,
};

#[derive(Debug, Default)]
struct AssetTally {
    mode: Option<OperatingMode>,
    volume_mw: f64,
    srmc: f64,
    revenue: f64,
    cost: f64,
}

/// Settle every team in `teams` against one period's clearing result.
///
/// Supply earns `dispatched × price` and pays `dispatched × SRMC`; storage
/// charging pays `charged × price`. Teams with nothing dispatched still get a
/// zeroed record so the output always covers the full roster.
pub fn settle_period(
    result: &ClearingResult,
    conditions: &PeriodConditions,
    teams: &[TeamId],
) -> Vec<TeamPeriodFinancials> {
    let price = result.clearing_price;
    let mut tallies: BTreeMap<(TeamId, AssetId), AssetTally> = BTreeMap::new();

    for entry in result.dispatched_entries() {
        let Some(asset) = conditions.asset(&entry.team_id, &entry.asset_id) else {
            tracing::warn!(
                "dispatched entry for unknown asset {}/{}, not settled",
                entry.team_id,
                entry.asset_id
            );
            continue;
        };
        let tally = tallies
            .entry((entry.team_id.clone(), entry.asset_id.clone()))
            .or_default();
        tally.mode = Some(if asset.kind.is_storage() {
            OperatingMode::Discharge
        } else {
            OperatingMode::Generate
        });
        tally.srmc = asset.srmc;
        tally.volume_mw += entry.dispatched_mw;
        tally.revenue += entry.dispatched_mw * price;
        tally.cost += entry.dispatched_mw * asset.srmc;
    }

    for load in &result.loads {
        let tally = tallies
            .entry((load.team_id.clone(), load.asset_id.clone()))
            .or_default();
        tally.mode = Some(OperatingMode::Charge);
        tally.volume_mw += load.served_mw;
        tally.cost += load.served_mw * price;
    }

    let mut by_team: BTreeMap<TeamId, TeamPeriodFinancials> = teams
        .iter()
        .map(|team_id| {
            (
                team_id.clone(),
                TeamPeriodFinancials {
                    team_id: team_id.clone(),
                    period: result.period.clone(),
                    revenue: 0.0,
                    cost: 0.0,
                    profit: 0.0,
                    assets: Vec::new(),
                },
            )
        })
        .collect();

    for ((team_id, asset_id), tally) in tallies {
        let team = by_team.entry(team_id.clone()).or_insert_with(|| TeamPeriodFinancials {
            team_id,
            period: result.period.clone(),
            revenue: 0.0,
            cost: 0.0,
            profit: 0.0,
            assets: Vec::new(),
        });
        let profit = tally.revenue - tally.cost;
        team.revenue += tally.revenue;
        team.cost += tally.cost;
        team.profit += profit;
        team.assets.push(AssetFinancials {
            asset_id,
            mode: tally.mode.unwrap_or(OperatingMode::Idle),
            volume_mw: tally.volume_mw,
            srmc: tally.srmc,
            revenue: tally.revenue,
            cost: tally.cost,
            profit,
        });
    }

    by_team.into_values().collect()
}

/// Sum each team's profit across all periods of a round.
pub fn round_profits<'a, I>(financials: I) -> BTreeMap<TeamId, f64>
where
    I: IntoIterator<Item = &'a TeamPeriodFinancials>,
{
    let mut totals = BTreeMap::new();
    for period in financials {
        *totals.entry(period.team_id.clone()).or_insert(0.0) += period.profit;
    }
    totals
}
