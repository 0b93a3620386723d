//! Catch-up balancing: a random derate against one of the profit leader's
//! committed assets.
//!
//! Selection is separate from clearing. All randomness comes from the
//! caller's `Rng`, so clearing stays deterministic and a seeded or mock
//! generator reproduces a selection exactly.

use std::collections::BTreeMap;

use rand::Rng;

use crate::config::BalancingConfig;
use crate::leaderboard::Standing;
use crate::market::types::{AssetId, BalancingEvent, RoundInput, TeamId};

/// Teams tied for the highest cumulative profit. Empty when there is no
/// standing or when every team is level.
pub fn profit_leaders(standings: &[Standing]) -> Vec<TeamId> {
    let Some(best) = standings
        .iter()
        .map(|s| s.cumulative_profit)
        .max_by(|a, b| a.total_cmp(b))
    else {
        return Vec::new();
    };

    let mut leaders: Vec<TeamId> = standings
        .iter()
        .filter(|s| s.cumulative_profit == best)
        .map(|s| s.team_id.clone())
        .collect();
    if leaders.len() == standings.len() {
        return Vec::new();
    }
    leaders.sort();
    leaders
}

/// Assets each team offered supply from in any period of the round.
///
/// Only bids that survive normalization count: the asset must be on the
/// team's roster, the mode must suit its kind and the bid must target one of
/// the round's periods.
pub fn committed_assets(input: &RoundInput) -> BTreeMap<TeamId, Vec<AssetId>> {
    let periods = input.period_ids();
    let mut committed: BTreeMap<TeamId, Vec<AssetId>> = BTreeMap::new();
    for submission in &input.submissions {
        for bid in &submission.bids {
            let Some(asset) = input
                .assets
                .iter()
                .find(|a| a.team_id == bid.team_id && a.asset_id == bid.asset_id)
            else {
                continue;
            };
            if bid.mode.is_supply()
                && bid.mode.allowed_for(asset.kind)
                && periods.contains(&bid.period)
                && bid.total_offered() > 0.0
            {
                committed
                    .entry(bid.team_id.clone())
                    .or_default()
                    .push(bid.asset_id.clone());
            }
        }
    }
    for assets in committed.values_mut() {
        assets.sort();
        assets.dedup();
    }
    committed
}

/// Roll for a balancing event. On a hit, one leader is drawn, then one of
/// that leader's committed assets; both draws are uniform over sorted lists.
pub fn select_balancing<R: Rng + ?Sized>(
    leaders: &[TeamId],
    committed: &BTreeMap<TeamId, Vec<AssetId>>,
    config: &BalancingConfig,
    rng: &mut R,
) -> Option<BalancingEvent> {
    let eligible: Vec<(&TeamId, &Vec<AssetId>)> = leaders
        .iter()
        .filter_map(|team| committed.get(team).map(|assets| (team, assets)))
        .filter(|(_, assets)| !assets.is_empty())
        .collect();
    if eligible.is_empty() || config.trigger_probability <= 0.0 {
        return None;
    }

    let roll: f64 = rng.gen();
    if roll >= config.trigger_probability {
        tracing::debug!(
            "balancing roll {roll:.3} missed (p={})",
            config.trigger_probability
        );
        return None;
    }

    let (team_id, assets) = eligible[rng.gen_range(0..eligible.len())];
    let asset_id = &assets[rng.gen_range(0..assets.len())];

    tracing::info!(
        "catch-up balancing derates {team_id}/{asset_id} by {:.0}%",
        config.derate_fraction * 100.0
    );
    Some(BalancingEvent {
        team_id: team_id.clone(),
        asset_id: asset_id.clone(),
        derate_fraction: config.derate_fraction,
    })
}
