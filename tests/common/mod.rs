//! Shared fixtures for the market integration tests.
//!
//! Three teams over a day and a night period:
//! - alpha: coal (200 MW, $30) and solar (80 MW, dark at night)
//! - beta: gas (150 MW, $55) and a 50 MW battery
//! - gamma: hydro (100 MW, $10) and a gas peaker (60 MW, $120)

#![allow(dead_code)]

use std::collections::BTreeMap;

use meritorder_lib::market::types::{
    AssetBid, AssetInstance, AssetKind, BidBand, OperatingMode, RoundInput, RoundPeriod,
    TeamBidSubmission,
};

pub const EPS: f64 = 1e-6;

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPS,
        "expected {expected}, got {actual}"
    );
}

fn asset(team: &str, id: &str, kind: AssetKind, nameplate_mw: f64, srmc: f64) -> AssetInstance {
    AssetInstance {
        team_id: team.to_string(),
        asset_id: id.to_string(),
        name: id.to_string(),
        kind,
        nameplate_mw,
        srmc,
        capacity_factors: BTreeMap::new(),
        forced_outage: false,
    }
}

pub fn roster() -> Vec<AssetInstance> {
    let mut solar = asset("alpha", "solar", AssetKind::Solar, 80.0, 0.0);
    solar.capacity_factors.insert("day".to_string(), 0.8);
    solar.capacity_factors.insert("night".to_string(), 0.0);

    vec![
        asset("alpha", "coal", AssetKind::Coal, 200.0, 30.0),
        solar,
        asset("beta", "gas", AssetKind::Gas, 150.0, 55.0),
        asset("beta", "battery", AssetKind::Battery, 50.0, 0.0),
        asset("gamma", "hydro", AssetKind::Hydro, 100.0, 10.0),
        asset("gamma", "peaker", AssetKind::GasPeaker, 60.0, 120.0),
    ]
}

pub fn periods() -> Vec<RoundPeriod> {
    vec![
        RoundPeriod {
            id: "day".to_string(),
            base_demand_mw: 250.0,
        },
        RoundPeriod {
            id: "night".to_string(),
            base_demand_mw: 180.0,
        },
    ]
}

/// `bands` are `(MW, $/MWh)` pairs.
pub fn bid(
    team: &str,
    asset: &str,
    period: &str,
    mode: OperatingMode,
    bands: &[(f64, f64)],
) -> AssetBid {
    AssetBid {
        team_id: team.to_string(),
        asset_id: asset.to_string(),
        period: period.to_string(),
        mode,
        bands: bands
            .iter()
            .map(|(quantity, price)| BidBand::new(*price, *quantity))
            .collect(),
    }
}

pub fn submissions() -> Vec<TeamBidSubmission> {
    use OperatingMode::{Charge, Discharge, Generate, Idle};

    vec![
        TeamBidSubmission {
            team_id: "alpha".to_string(),
            bids: vec![
                bid("alpha", "coal", "day", Generate, &[(150.0, 35.0), (50.0, 60.0)]),
                bid("alpha", "coal", "night", Generate, &[(200.0, 35.0)]),
                bid("alpha", "solar", "day", Generate, &[(64.0, 0.0)]),
                bid("alpha", "solar", "night", Idle, &[]),
            ],
        },
        TeamBidSubmission {
            team_id: "beta".to_string(),
            bids: vec![
                bid("beta", "gas", "day", Generate, &[(100.0, 60.0), (50.0, 90.0)]),
                bid("beta", "gas", "night", Generate, &[(100.0, 60.0)]),
                bid("beta", "battery", "day", Charge, &[(40.0, 50.0)]),
                bid("beta", "battery", "night", Discharge, &[(40.0, 150.0)]),
            ],
        },
        TeamBidSubmission {
            team_id: "gamma".to_string(),
            bids: vec![
                bid("gamma", "hydro", "day", Generate, &[(100.0, 40.0)]),
                bid("gamma", "hydro", "night", Generate, &[(100.0, 20.0)]),
                bid("gamma", "peaker", "day", Generate, &[(60.0, 200.0)]),
                bid("gamma", "peaker", "night", Generate, &[(60.0, 200.0)]),
            ],
        },
    ]
}

pub fn round_input(round: u32) -> RoundInput {
    RoundInput {
        round,
        periods: periods(),
        scenario_ids: Vec::new(),
        catch_up_balancing: false,
        assets: roster(),
        submissions: submissions(),
    }
}
