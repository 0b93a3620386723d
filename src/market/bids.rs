//! Bid normalization: clamp submitted bands to what an asset can actually
//! deliver this period and split supply offers from storage charge loads.
//!
//! Clamping policy: bands are ordered by price (cheapest first, submission
//! order breaking ties) and capacity is handed out in that order, so a derate
//! removes the most expensive bands first. Bands left with zero quantity are
//! dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::market::availability::PeriodConditions;
use crate::market::clearing::MW_EPSILON;
use crate::market::types::{AssetBid, AssetId, BidBand, OperatingMode, TeamId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyOffer {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    /// Index of the band in the bid as submitted.
    pub band_index: usize,
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub team_id: TeamId,
    pub asset_id: AssetId,
    pub requested_mw: f64,
    /// Highest stated price; informational only, loads never set the price.
    pub willingness_to_pay: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBids {
    pub offers: Vec<SupplyOffer>,
    pub loads: Vec<LoadRequest>,
}

impl NormalizedBids {
    pub fn total_offered_mw(&self) -> f64 {
        self.offers.iter().map(|offer| offer.quantity).sum()
    }

    pub fn total_charge_mw(&self) -> f64 {
        self.loads.iter().map(|load| load.requested_mw).sum()
    }
}

/// Clamp `bands` to `available_mw`, returning `(submitted_index, band)` pairs
/// in price order. At most `max_bands` bands (in submission order) are
/// considered.
pub fn clamp_bands(bands: &[BidBand], available_mw: f64, max_bands: usize) -> Vec<(usize, BidBand)> {
    let mut indexed: Vec<(usize, BidBand)> = bands
        .iter()
        .copied()
        .enumerate()
        .take(max_bands)
        .filter(|(_, band)| band.is_well_formed() && band.quantity > 0.0)
        .collect();
    indexed.sort_by(|(ia, a), (ib, b)| a.price.total_cmp(&b.price).then_with(|| ia.cmp(ib)));

    let mut remaining = available_mw.max(0.0);
    let mut clamped = Vec::with_capacity(indexed.len());
    for (index, band) in indexed {
        let quantity = band.quantity.min(remaining);
        if quantity <= MW_EPSILON {
            continue;
        }
        remaining -= quantity;
        clamped.push((index, BidBand::new(band.price, quantity)));
    }
    clamped
}

pub fn normalize_bids<'a, I>(bids: I, conditions: &PeriodConditions, max_bands: usize) -> NormalizedBids
where
    I: IntoIterator<Item = &'a AssetBid>,
{
    let mut normalized = NormalizedBids::default();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for bid in bids {
        if bid.period != conditions.period {
            continue;
        }
        if !seen.insert((bid.team_id.as_str(), bid.asset_id.as_str())) {
            tracing::warn!(
                "duplicate bid for {}/{} in period {}, keeping the first",
                bid.team_id,
                bid.asset_id,
                bid.period
            );
            continue;
        }

        let Some(asset) = conditions.asset(&bid.team_id, &bid.asset_id) else {
            tracing::warn!(
                "bid references unknown asset {}/{}, ignoring",
                bid.team_id,
                bid.asset_id
            );
            continue;
        };

        if !bid.mode.allowed_for(asset.kind) {
            tracing::warn!(
                "{} mode not allowed for {} asset {}/{}, ignoring",
                bid.mode,
                asset.kind,
                bid.team_id,
                bid.asset_id
            );
            continue;
        }

        let dropped = bid.bands.iter().filter(|band| !band.is_well_formed()).count();
        if dropped > 0 {
            tracing::warn!(
                "dropping {dropped} malformed band(s) from {}/{}",
                bid.team_id,
                bid.asset_id
            );
        }

        match bid.mode {
            OperatingMode::Idle => {}
            OperatingMode::Generate | OperatingMode::Discharge => {
                for (band_index, band) in clamp_bands(&bid.bands, asset.available_mw, max_bands) {
                    normalized.offers.push(SupplyOffer {
                        team_id: bid.team_id.clone(),
                        asset_id: bid.asset_id.clone(),
                        band_index,
                        price: band.price,
                        quantity: band.quantity,
                    });
                }
            }
            OperatingMode::Charge => {
                let bands = clamp_bands(&bid.bands, asset.available_mw, max_bands);
                let requested_mw: f64 = bands.iter().map(|(_, band)| band.quantity).sum();
                if requested_mw <= 0.0 {
                    continue;
                }
                let willingness_to_pay = bands
                    .iter()
                    .map(|(_, band)| band.price)
                    .fold(0.0_f64, f64::max);
                normalized.loads.push(LoadRequest {
                    team_id: bid.team_id.clone(),
                    asset_id: bid.asset_id.clone(),
                    requested_mw,
                    willingness_to_pay,
                });
            }
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::MarketConfig;
    use crate::market::availability::resolve_period;
    use crate::market::types::{AssetInstance, AssetKind};

    fn roster() -> Vec<AssetInstance> {
        vec![
            AssetInstance {
                team_id: "alpha".to_string(),
                asset_id: "coal".to_string(),
                name: "Coal 1".to_string(),
                kind: AssetKind::Coal,
                nameplate_mw: 100.0,
                srmc: 30.0,
                capacity_factors: BTreeMap::new(),
                forced_outage: false,
            },
            AssetInstance {
                team_id: "alpha".to_string(),
                asset_id: "battery".to_string(),
                name: "Battery".to_string(),
                kind: AssetKind::Battery,
                nameplate_mw: 50.0,
                srmc: 0.0,
                capacity_factors: BTreeMap::new(),
                forced_outage: false,
            },
        ]
    }

    fn bid(asset_id: &str, mode: OperatingMode, bands: Vec<BidBand>) -> AssetBid {
        AssetBid {
            team_id: "alpha".to_string(),
            asset_id: asset_id.to_string(),
            period: "peak".to_string(),
            mode,
            bands,
        }
    }

    fn conditions() -> PeriodConditions {
        resolve_period(&roster(), &[], None, "peak", &MarketConfig::default())
    }

    #[test]
    fn clamp_truncates_most_expensive_bands_first() {
        let bands = vec![
            BidBand::new(80.0, 40.0),
            BidBand::new(20.0, 50.0),
            BidBand::new(50.0, 30.0),
        ];

        let clamped = clamp_bands(&bands, 70.0, 5);

        assert_eq!(
            clamped,
            vec![(1, BidBand::new(20.0, 50.0)), (2, BidBand::new(50.0, 20.0))]
        );
    }

    #[test]
    fn clamp_respects_band_limit_and_drops_malformed() {
        let bands = vec![
            BidBand::new(10.0, 10.0),
            BidBand::new(-5.0, 10.0),
            BidBand::new(15.0, 0.0),
            BidBand::new(f64::NAN, 10.0),
            BidBand::new(20.0, 10.0),
            BidBand::new(25.0, 10.0),
        ];

        let clamped = clamp_bands(&bands, 1_000.0, 5);
        assert_eq!(
            clamped,
            vec![(0, BidBand::new(10.0, 10.0)), (4, BidBand::new(20.0, 10.0))]
        );
    }

    #[test]
    fn supply_bids_become_offers_keeping_submitted_band_indices() {
        let bids = vec![bid(
            "coal",
            OperatingMode::Generate,
            vec![BidBand::new(60.0, 30.0), BidBand::new(35.0, 90.0)],
        )];

        let normalized = normalize_bids(&bids, &conditions(), 5);

        assert!(normalized.loads.is_empty());
        assert_eq!(normalized.offers.len(), 2);
        assert_eq!(normalized.offers[0].band_index, 1);
        assert_eq!(normalized.offers[0].quantity, 90.0);
        assert_eq!(normalized.offers[1].band_index, 0);
        assert_eq!(normalized.offers[1].quantity, 10.0);
        assert_eq!(normalized.total_offered_mw(), 100.0);
    }

    #[test]
    fn charge_bids_become_loads() {
        let bids = vec![bid(
            "battery",
            OperatingMode::Charge,
            vec![BidBand::new(30.0, 20.0), BidBand::new(45.0, 40.0)],
        )];

        let normalized = normalize_bids(&bids, &conditions(), 5);

        assert!(normalized.offers.is_empty());
        assert_eq!(normalized.loads.len(), 1);
        assert_eq!(normalized.loads[0].requested_mw, 50.0);
        assert_eq!(normalized.loads[0].willingness_to_pay, 45.0);
        assert_eq!(normalized.total_charge_mw(), 50.0);
    }

    #[test]
    fn idle_and_mismatched_modes_contribute_nothing() {
        let bids = vec![
            bid("battery", OperatingMode::Idle, vec![BidBand::new(10.0, 10.0)]),
            bid("coal", OperatingMode::Charge, vec![BidBand::new(10.0, 10.0)]),
            bid("battery", OperatingMode::Generate, vec![BidBand::new(10.0, 10.0)]),
        ];

        let normalized = normalize_bids(&bids, &conditions(), 5);
        assert_eq!(normalized, NormalizedBids::default());
    }

    #[test]
    fn unknown_assets_and_duplicates_are_ignored() {
        let bids = vec![
            bid("coal", OperatingMode::Generate, vec![BidBand::new(30.0, 10.0)]),
            bid("coal", OperatingMode::Generate, vec![BidBand::new(5.0, 90.0)]),
            bid("hydro", OperatingMode::Generate, vec![BidBand::new(1.0, 10.0)]),
        ];

        let normalized = normalize_bids(&bids, &conditions(), 5);
        assert_eq!(normalized.offers.len(), 1);
        assert_eq!(normalized.offers[0].price, 30.0);
    }
}
