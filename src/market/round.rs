//! Whole-round orchestration: scenario resolution, catch-up balancing
//! selection, then one pipeline per period.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::leaderboard::Standing;
use crate::market::balancing::{committed_assets, profit_leaders, select_balancing};
use crate::market::pipeline::PeriodPipeline;
use crate::market::scenario::{validate_effects, ScenarioCatalog};
use crate::market::settlement::round_profits;
use crate::market::types::{ClearingResult, RoundDispatchResult, RoundInput, TeamPeriodFinancials};

/// Clear and settle every period of a round.
///
/// `standings` are the cumulative standings *before* this round; they only
/// matter when `input.catch_up_balancing` is set. The balancing draw happens
/// once per round and the same event applies to every period. `rng` is
/// consulted for nothing else.
pub fn run_round<R: Rng + ?Sized>(
    input: &RoundInput,
    config: &MarketConfig,
    catalog: &ScenarioCatalog,
    standings: &[Standing],
    rng: &mut R,
) -> Result<RoundDispatchResult, MarketError> {
    let period_ids = input.period_ids();
    let effects = validate_effects(catalog.resolve(&input.scenario_ids), &period_ids);

    let balancing = if input.catch_up_balancing {
        select_balancing(
            &profit_leaders(standings),
            &committed_assets(input),
            &config.balancing,
            rng,
        )
    } else {
        None
    };

    let teams = input.team_ids();
    let mut clearing_results = Vec::with_capacity(input.periods.len());
    let mut financials = Vec::new();

    for period in &input.periods {
        let mut pipeline = PeriodPipeline::new(period.clone(), &input.assets, config);
        for bid in input.bids_for_period(&period.id) {
            pipeline.submit_bid(bid.clone())?;
        }
        pipeline.apply_scenario(effects.clone())?;
        pipeline.apply_balancing(balancing.clone())?;
        pipeline.freeze()?;
        let outcome = pipeline.clear(&teams)?;

        clearing_results.push(outcome.clearing);
        financials.extend(outcome.financials);
    }

    let team_profits = round_profits(&financials);
    let digest = result_digest(&clearing_results, &financials)?;

    tracing::info!(
        "round {} settled: {} period(s), {} team(s)",
        input.round,
        clearing_results.len(),
        team_profits.len()
    );

    Ok(RoundDispatchResult {
        round: input.round,
        clearing_results,
        financials,
        team_profits,
        balancing,
        digest,
    })
}

/// Hex SHA-256 of the serialized clearing results and financials.
pub fn result_digest(
    clearing_results: &[ClearingResult],
    financials: &[TeamPeriodFinancials],
) -> Result<String, MarketError> {
    let bytes = serde_json::to_vec(&(clearing_results, financials))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
