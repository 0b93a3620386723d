//! Session-level facade over the clearing pipeline.
//!
//! A [`MarketEngine`] owns the configuration, scenario catalogue and a handle
//! to the shared leaderboard ledger. Each round number can be activated once
//! per engine; the resulting profits are appended to the ledger under the
//! engine's session id and progress is published on the optional event bus.

use std::sync::Arc;

use dashmap::DashSet;
use rand::Rng;
use uuid::Uuid;

use crate::bus::{EventBus, MarketEvent};
use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::leaderboard::{Leaderboard, Standing};
use crate::market::round::run_round;
use crate::market::scenario::ScenarioCatalog;
use crate::market::types::{RoundDispatchResult, RoundInput};

pub struct MarketEngine {
    config: MarketConfig,
    catalog: ScenarioCatalog,
    leaderboard: Arc<Leaderboard>,
    bus: Option<Arc<EventBus>>,
    session_id: String,
    activated_rounds: DashSet<u32>,
}

impl MarketEngine {
    /// Engine with a fresh ledger and the built-in scenario catalogue
    /// overlaid with any scenarios from `config`.
    pub fn new(config: MarketConfig) -> Self {
        let catalog = ScenarioCatalog::with_overrides(&config.scenarios);
        Self {
            config,
            catalog,
            leaderboard: Arc::new(Leaderboard::new()),
            bus: None,
            session_id: Uuid::new_v4().to_string(),
            activated_rounds: DashSet::new(),
        }
    }

    pub fn with_leaderboard(mut self, leaderboard: Arc<Leaderboard>) -> Self {
        self.leaderboard = leaderboard;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn leaderboard(&self) -> &Arc<Leaderboard> {
        &self.leaderboard
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Standings for this session only; other sessions sharing the ledger
    /// are not included.
    pub fn standings(&self) -> Vec<Standing> {
        self.leaderboard.standings(&self.session_id)
    }

    /// Clear, settle and record one round.
    ///
    /// Fails with [`MarketError::DuplicateRound`] if this engine has already
    /// run `input.round`. A round that fails before reaching the ledger can
    /// be retried.
    pub fn run_round<R: Rng + ?Sized>(
        &self,
        input: &RoundInput,
        rng: &mut R,
    ) -> Result<RoundDispatchResult, MarketError> {
        if !self.activated_rounds.insert(input.round) {
            return Err(MarketError::DuplicateRound(input.round));
        }

        let standings = self.standings();
        let result = run_round(input, &self.config, &self.catalog, &standings, rng)
            .and_then(|result| {
                self.leaderboard
                    .record_round(&self.session_id, result.round, &result.team_profits)
                    .map(|()| result)
            });
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("session {} round {} failed: {e}", self.session_id, input.round);
                self.activated_rounds.remove(&input.round);
                return Err(e);
            }
        };

        self.publish_round(input, &result);
        Ok(result)
    }

    fn publish_round(&self, input: &RoundInput, result: &RoundDispatchResult) {
        let Some(bus) = self.bus.as_ref() else {
            return;
        };
        let session = Some(self.session_id.clone());

        if !input.scenario_ids.is_empty() {
            bus.emit(
                &MarketEvent::ScenarioApplied {
                    round: result.round,
                    scenario_ids: input.scenario_ids.clone(),
                },
                session.clone(),
            );
        }
        if let Some(event) = &result.balancing {
            bus.emit(
                &MarketEvent::BalancingApplied {
                    round: result.round,
                    team_id: event.team_id.clone(),
                    asset_id: event.asset_id.clone(),
                    derate_fraction: event.derate_fraction,
                },
                session.clone(),
            );
        }
        for clearing in &result.clearing_results {
            bus.emit(
                &MarketEvent::PeriodCleared {
                    round: result.round,
                    period: clearing.period.clone(),
                    clearing_price: clearing.clearing_price,
                    price_formation: clearing.price_formation,
                    effective_demand_mw: clearing.effective_demand_mw,
                    total_dispatched_mw: clearing.total_dispatched_mw,
                    shortfall_mw: clearing.shortfall_mw,
                },
                session.clone(),
            );
        }
        bus.emit(
            &MarketEvent::RoundSettled {
                round: result.round,
                team_profits: result.team_profits.clone(),
                digest: result.digest.clone(),
            },
            session,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::bus::{EVENT_BALANCING_APPLIED, EVENT_PERIOD_CLEARED, EVENT_ROUND_SETTLED, EVENT_SCENARIO_APPLIED};
    use crate::market::types::{
        AssetBid, AssetInstance, AssetKind, BidBand, OperatingMode, RoundPeriod, TeamBidSubmission,
    };

    fn round(number: u32) -> RoundInput {
        let assets = vec![
            AssetInstance {
                team_id: "alpha".to_string(),
                asset_id: "coal".to_string(),
                name: "Coal".to_string(),
                kind: AssetKind::Coal,
                nameplate_mw: 100.0,
                srmc: 20.0,
                capacity_factors: BTreeMap::new(),
                forced_outage: false,
            },
            AssetInstance {
                team_id: "beta".to_string(),
                asset_id: "gas".to_string(),
                name: "Gas".to_string(),
                kind: AssetKind::Gas,
                nameplate_mw: 100.0,
                srmc: 40.0,
                capacity_factors: BTreeMap::new(),
                forced_outage: false,
            },
        ];
        let bid = |team: &str, asset: &str, price: f64| TeamBidSubmission {
            team_id: team.to_string(),
            bids: vec![AssetBid {
                team_id: team.to_string(),
                asset_id: asset.to_string(),
                period: "day".to_string(),
                mode: OperatingMode::Generate,
                bands: vec![BidBand::new(price, 50.0)],
            }],
        };

        RoundInput {
            round: number,
            periods: vec![RoundPeriod {
                id: "day".to_string(),
                base_demand_mw: 80.0,
            }],
            scenario_ids: Vec::new(),
            catch_up_balancing: false,
            assets,
            submissions: vec![bid("alpha", "coal", 25.0), bid("beta", "gas", 45.0)],
        }
    }

    #[test]
    fn rounds_are_recorded_on_the_ledger() {
        let engine = MarketEngine::new(MarketConfig::default());
        let mut rng = StepRng::new(0, 0);

        let first = engine.run_round(&round(1), &mut rng).unwrap();
        engine.run_round(&round(2), &mut rng).unwrap();

        // alpha: 50 MW at $45 against $20 SRMC; beta: 30 MW at $45 against $40.
        assert_eq!(first.team_profits["alpha"], 1_250.0);
        assert_eq!(first.team_profits["beta"], 150.0);
        assert_eq!(engine.leaderboard().cumulative_profit(engine.session_id(), "alpha"), 2_500.0);

        let standings = engine.standings();
        assert_eq!(standings[0].team_id, "alpha");
        assert_eq!(standings[0].rounds_recorded, 2);
    }

    #[test]
    fn a_round_cannot_be_activated_twice() {
        let engine = MarketEngine::new(MarketConfig::default());
        let mut rng = StepRng::new(0, 0);

        engine.run_round(&round(1), &mut rng).unwrap();
        let err = engine.run_round(&round(1), &mut rng).unwrap_err();

        assert!(matches!(err, MarketError::DuplicateRound(1)));
        assert_eq!(engine.leaderboard().cumulative_profit(engine.session_id(), "alpha"), 1_250.0);
    }

    #[test]
    fn ledger_conflicts_release_the_round() {
        let ledger = Arc::new(Leaderboard::new());
        ledger.append("game-1", "alpha", 1, 0.0).unwrap();
        let engine = MarketEngine::new(MarketConfig::default())
            .with_leaderboard(ledger.clone())
            .with_session_id("game-1");
        let mut rng = StepRng::new(0, 0);

        let err = engine.run_round(&round(1), &mut rng).unwrap_err();
        assert!(matches!(err, MarketError::LedgerConflict { round: 1, .. }));
        assert_eq!(ledger.round_profit("game-1", "beta", 1), None);

        // A different round still runs.
        engine.run_round(&round(2), &mut rng).unwrap();
        assert_eq!(ledger.round_profit("game-1", "beta", 2), Some(150.0));
    }

    #[test]
    fn sessions_sharing_a_ledger_run_the_same_round() {
        let ledger = Arc::new(Leaderboard::new());
        let first = MarketEngine::new(MarketConfig::default())
            .with_leaderboard(ledger.clone())
            .with_session_id("game-1");
        let second = MarketEngine::new(MarketConfig::default())
            .with_leaderboard(ledger.clone())
            .with_session_id("game-2");
        let mut rng = StepRng::new(0, 0);

        first.run_round(&round(1), &mut rng).unwrap();
        second.run_round(&round(1), &mut rng).unwrap();

        assert_eq!(ledger.cumulative_profit("game-1", "alpha"), 1_250.0);
        assert_eq!(ledger.cumulative_profit("game-2", "alpha"), 1_250.0);
        assert_eq!(second.standings()[0].rounds_recorded, 1);
    }

    #[test]
    fn balancing_targets_this_sessions_leader() {
        let ledger = Arc::new(Leaderboard::new());
        // In another game beta is far ahead.
        ledger.append("game-2", "alpha", 1, 0.0).unwrap();
        ledger.append("game-2", "beta", 1, 1_000_000.0).unwrap();

        let engine = MarketEngine::new(MarketConfig::default())
            .with_leaderboard(ledger)
            .with_session_id("game-1");
        let mut rng = StepRng::new(0, 0);
        engine.run_round(&round(1), &mut rng).unwrap();

        let mut second = round(2);
        second.catch_up_balancing = true;
        let result = engine.run_round(&second, &mut rng).unwrap();

        let event = result.balancing.expect("zero roll fires");
        assert_eq!(event.team_id, "alpha");
        assert_eq!(event.asset_id, "coal");
    }

    #[tokio::test]
    async fn progress_is_published_on_the_bus() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let engine = MarketEngine::new(MarketConfig::default())
            .with_event_bus(bus.clone())
            .with_session_id("game-7");
        let mut rng = StepRng::new(0, 0);

        engine.run_round(&round(1), &mut rng).unwrap();
        let mut second = round(2);
        second.scenario_ids = vec!["mild-weather".to_string()];
        second.catch_up_balancing = true;
        engine.run_round(&second, &mut rng).unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.session_id.as_deref(), Some("game-7"));
            seen.push(event.event_type);
        }
        assert_eq!(
            seen,
            vec![
                EVENT_PERIOD_CLEARED,
                EVENT_ROUND_SETTLED,
                EVENT_SCENARIO_APPLIED,
                EVENT_BALANCING_APPLIED,
                EVENT_PERIOD_CLEARED,
                EVENT_ROUND_SETTLED,
            ]
        );
    }
}
