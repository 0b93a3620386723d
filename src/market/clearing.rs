//! Uniform-price merit-order clearing.
//!
//! Supply bands are ranked by price, then team id, asset id and band index
//! (all ascending). That ordering is part of the contract: identical inputs
//! always produce the same ranking and the same marginal band.
//!
//! Clearing is a pure function of its inputs and never fails; malformed
//! offers are dropped before ranking.

use std::cmp::Ordering;

use crate::market::bids::{LoadRequest, SupplyOffer};
use crate::market::types::{ClearingResult, LoadEntry, MeritOrderEntry, PriceFormation};

/// Tolerance for comparing accumulated MW against demand.
pub(crate) const MW_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ClearingInput<'a> {
    pub period: &'a str,
    /// Demand before scenario multipliers and storage charging.
    pub base_demand_mw: f64,
    pub demand_multiplier: f64,
    pub offers: &'a [SupplyOffer],
    pub loads: &'a [LoadRequest],
    pub price_cap: f64,
}

pub fn merit_order_cmp(a: &SupplyOffer, b: &SupplyOffer) -> Ordering {
    a.price
        .total_cmp(&b.price)
        .then_with(|| a.team_id.cmp(&b.team_id))
        .then_with(|| a.asset_id.cmp(&b.asset_id))
        .then_with(|| a.band_index.cmp(&b.band_index))
}

/// Well-formed offers sorted into merit order.
pub fn merit_order(offers: &[SupplyOffer]) -> Vec<&SupplyOffer> {
    let mut ranked: Vec<&SupplyOffer> = offers
        .iter()
        .filter(|offer| {
            let valid = offer.price.is_finite()
                && offer.quantity.is_finite()
                && offer.price >= 0.0
                && offer.quantity > 0.0;
            if !valid {
                tracing::warn!(
                    "dropping malformed offer {}/{} band {} ({} MW @ ${})",
                    offer.team_id,
                    offer.asset_id,
                    offer.band_index,
                    offer.quantity,
                    offer.price
                );
            }
            valid
        })
        .collect();
    ranked.sort_by(|a, b| merit_order_cmp(a, b));
    ranked
}

/// `max(0, base × multiplier) + Σ charge MW`.
pub fn effective_demand(base_demand_mw: f64, demand_multiplier: f64, loads: &[LoadRequest]) -> (f64, f64) {
    let scaled = (base_demand_mw * demand_multiplier).max(0.0);
    let scaled = if scaled.is_finite() { scaled } else { 0.0 };
    let charge: f64 = loads
        .iter()
        .map(|load| load.requested_mw)
        .filter(|mw| mw.is_finite() && *mw > 0.0)
        .sum();
    (scaled, charge)
}

pub fn clear_period(input: &ClearingInput<'_>) -> ClearingResult {
    let ranked = merit_order(input.offers);
    let (base_demand_mw, charge_load_mw) =
        effective_demand(input.base_demand_mw, input.demand_multiplier, input.loads);
    let demand = base_demand_mw + charge_load_mw;

    let mut entries = Vec::with_capacity(ranked.len());
    let mut cumulative = 0.0;
    for (position, offer) in ranked.iter().enumerate() {
        let before = cumulative;
        let dispatched = if demand <= 0.0 || before >= demand - MW_EPSILON {
            0.0
        } else if before + offer.quantity <= demand + MW_EPSILON {
            offer.quantity
        } else {
            demand - before
        };
        cumulative += offer.quantity;

        entries.push(MeritOrderEntry {
            rank: position + 1,
            team_id: offer.team_id.clone(),
            asset_id: offer.asset_id.clone(),
            band_index: offer.band_index,
            price: offer.price,
            offered_mw: offer.quantity,
            cumulative_before_mw: before,
            dispatched_mw: dispatched,
            is_marginal: false,
        });
    }

    let total_offered_mw = cumulative;
    let total_dispatched_mw: f64 = entries.iter().map(|entry| entry.dispatched_mw).sum();

    let (clearing_price, price_formation, shortfall_mw) = if demand <= 0.0 {
        (0.0, PriceFormation::NoDemand, 0.0)
    } else if total_offered_mw + MW_EPSILON < demand {
        (input.price_cap, PriceFormation::PriceCap, demand - total_offered_mw)
    } else {
        // The last dispatched band sets the price, whether it was split or
        // exactly exhausted demand.
        match entries.iter_mut().rev().find(|entry| entry.dispatched_mw > 0.0) {
            Some(marginal) => {
                marginal.is_marginal = true;
                (marginal.price, PriceFormation::Marginal, 0.0)
            }
            None => (0.0, PriceFormation::NoDemand, 0.0),
        }
    };

    let reserve_margin_percent = if demand > 0.0 {
        (total_offered_mw - demand) / demand * 100.0
    } else {
        0.0
    };

    let mut loads: Vec<LoadEntry> = input
        .loads
        .iter()
        .filter(|load| load.requested_mw.is_finite() && load.requested_mw > 0.0)
        .map(|load| LoadEntry {
            team_id: load.team_id.clone(),
            asset_id: load.asset_id.clone(),
            requested_mw: load.requested_mw,
            served_mw: load.requested_mw,
            willingness_to_pay: load.willingness_to_pay,
        })
        .collect();
    loads.sort_by(|a, b| (&a.team_id, &a.asset_id).cmp(&(&b.team_id, &b.asset_id)));

    tracing::debug!(
        "cleared period {}: demand={:.2} MW offered={:.2} MW dispatched={:.2} MW price=${:.2} ({:?})",
        input.period,
        demand,
        total_offered_mw,
        total_dispatched_mw,
        clearing_price,
        price_formation
    );

    ClearingResult {
        period: input.period.to_string(),
        clearing_price,
        price_formation,
        base_demand_mw,
        charge_load_mw,
        effective_demand_mw: demand,
        total_offered_mw,
        total_dispatched_mw,
        shortfall_mw,
        reserve_margin_percent,
        entries,
        loads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(team: &str, asset: &str, band_index: usize, price: f64, quantity: f64) -> SupplyOffer {
        SupplyOffer {
            team_id: team.to_string(),
            asset_id: asset.to_string(),
            band_index,
            price,
            quantity,
        }
    }

    fn input<'a>(offers: &'a [SupplyOffer], loads: &'a [LoadRequest], demand: f64) -> ClearingInput<'a> {
        ClearingInput {
            period: "peak",
            base_demand_mw: demand,
            demand_multiplier: 1.0,
            offers,
            loads,
            price_cap: 1_000.0,
        }
    }

    #[test]
    fn ties_break_by_team_then_asset_then_band() {
        let offers = vec![
            offer("b", "x", 0, 40.0, 10.0),
            offer("a", "y", 1, 40.0, 10.0),
            offer("a", "y", 0, 40.0, 10.0),
            offer("a", "x", 2, 40.0, 10.0),
            offer("c", "a", 0, 10.0, 10.0),
        ];

        let ranked: Vec<(&str, &str, usize)> = merit_order(&offers)
            .into_iter()
            .map(|o| (o.team_id.as_str(), o.asset_id.as_str(), o.band_index))
            .collect();

        assert_eq!(
            ranked,
            vec![("c", "a", 0), ("a", "x", 2), ("a", "y", 0), ("a", "y", 1), ("b", "x", 0)]
        );
    }

    #[test]
    fn tied_marginal_price_splits_in_tie_order() {
        let offers = vec![offer("b", "gas", 0, 50.0, 20.0), offer("a", "gas", 0, 50.0, 20.0)];

        let result = clear_period(&input(&offers, &[], 30.0));

        assert_eq!(result.entries[0].team_id, "a");
        assert_eq!(result.entries[0].dispatched_mw, 20.0);
        assert!(!result.entries[0].is_marginal);
        assert_eq!(result.entries[1].team_id, "b");
        assert_eq!(result.entries[1].dispatched_mw, 10.0);
        assert!(result.entries[1].is_marginal);
        assert_eq!(result.clearing_price, 50.0);
    }

    #[test]
    fn exact_fill_marks_last_full_band_marginal() {
        let offers = vec![offer("a", "coal", 0, 20.0, 10.0), offer("a", "gas", 0, 40.0, 20.0)];

        let result = clear_period(&input(&offers, &[], 10.0));

        assert_eq!(result.entries[0].dispatched_mw, 10.0);
        assert!(result.entries[0].is_marginal);
        assert_eq!(result.entries[1].dispatched_mw, 0.0);
        assert_eq!(result.clearing_price, 20.0);
        assert_eq!(result.price_formation, PriceFormation::Marginal);
    }

    #[test]
    fn malformed_offers_are_dropped() {
        let offers = vec![
            offer("a", "coal", 0, -10.0, 10.0),
            offer("a", "gas", 0, 40.0, -5.0),
            offer("a", "wind", 0, f64::INFINITY, 5.0),
            offer("a", "hydro", 0, 15.0, 10.0),
        ];

        let result = clear_period(&input(&offers, &[], 5.0));

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].asset_id, "hydro");
        assert_eq!(result.clearing_price, 15.0);
    }

    #[test]
    fn zero_price_market_clears_at_zero() {
        let offers = vec![offer("a", "wind", 0, 0.0, 50.0), offer("b", "solar", 0, 0.0, 50.0)];

        let result = clear_period(&input(&offers, &[], 60.0));

        assert_eq!(result.clearing_price, 0.0);
        assert_eq!(result.price_formation, PriceFormation::Marginal);
        assert_eq!(result.total_dispatched_mw, 60.0);
    }

    #[test]
    fn no_supply_with_demand_is_a_shortage() {
        let result = clear_period(&input(&[], &[], 25.0));

        assert_eq!(result.price_formation, PriceFormation::PriceCap);
        assert_eq!(result.clearing_price, 1_000.0);
        assert_eq!(result.shortfall_mw, 25.0);
        assert_eq!(result.reserve_margin_percent, -100.0);
    }

    #[test]
    fn demand_multiplier_scales_base_demand_only() {
        let offers = vec![offer("a", "coal", 0, 20.0, 100.0)];
        let loads = vec![LoadRequest {
            team_id: "b".to_string(),
            asset_id: "battery".to_string(),
            requested_mw: 10.0,
            willingness_to_pay: 5.0,
        }];
        let mut clearing = input(&offers, &loads, 40.0);
        clearing.demand_multiplier = 1.5;

        let result = clear_period(&clearing);

        assert_eq!(result.base_demand_mw, 60.0);
        assert_eq!(result.charge_load_mw, 10.0);
        assert_eq!(result.effective_demand_mw, 70.0);
        assert_eq!(result.total_dispatched_mw, 70.0);
        assert!((result.reserve_margin_percent - 300.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn negative_base_demand_is_floored() {
        let (base, charge) = effective_demand(-50.0, 1.0, &[]);
        assert_eq!(base, 0.0);
        assert_eq!(charge, 0.0);
    }
}
