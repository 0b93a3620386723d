//! Submission-boundary validation for team bids.
//!
//! The game server calls [`validate_submission`] when a team submits; the
//! clearing path itself never rejects a round and only drops residual bad
//! bands.

use std::collections::HashSet;

use crate::config::MarketConfig;
use crate::market::types::{AssetInstance, OperatingMode, PeriodId, TeamBidSubmission};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BidViolation {
    #[error("bid from {team_id} references asset {asset_id} it does not own")]
    UnknownAsset { team_id: String, asset_id: String },
    #[error("bid for {asset_id} targets unknown period {period}")]
    UnknownPeriod { asset_id: String, period: String },
    #[error("duplicate bid for {asset_id} in period {period}")]
    DuplicateBid { asset_id: String, period: String },
    #[error("{mode} mode is not available to {asset_id}")]
    ModeNotAllowed { asset_id: String, mode: OperatingMode },
    #[error("bid for {asset_id} in {period} has {count} bands (max {max})")]
    TooManyBands {
        asset_id: String,
        period: String,
        count: usize,
        max: usize,
    },
    #[error("band {band_index} of {asset_id} has an invalid price {price}")]
    InvalidPrice {
        asset_id: String,
        band_index: usize,
        price: f64,
    },
    #[error("band {band_index} of {asset_id} has an invalid quantity {quantity}")]
    InvalidQuantity {
        asset_id: String,
        band_index: usize,
        quantity: f64,
    },
    #[error("band {band_index} of {asset_id} is priced at {price}, above the cap {cap}")]
    AboveCap {
        asset_id: String,
        band_index: usize,
        price: f64,
        cap: f64,
    },
    #[error("bid for {asset_id} offers {offered} MW, above nameplate {nameplate} MW")]
    ExceedsNameplate {
        asset_id: String,
        offered: f64,
        nameplate: f64,
    },
}

/// Collect every problem with a team's submission. An empty result means
/// the submission may be accepted as-is.
pub fn validate_submission(
    submission: &TeamBidSubmission,
    roster: &[AssetInstance],
    periods: &[PeriodId],
    config: &MarketConfig,
) -> Vec<BidViolation> {
    let mut violations = Vec::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for bid in &submission.bids {
        let asset_id = bid.asset_id.clone();

        let owned = roster
            .iter()
            .find(|asset| asset.team_id == submission.team_id && asset.asset_id == bid.asset_id);
        let Some(asset) = owned.filter(|_| bid.team_id == submission.team_id) else {
            violations.push(BidViolation::UnknownAsset {
                team_id: submission.team_id.clone(),
                asset_id,
            });
            continue;
        };

        if !periods.iter().any(|period| *period == bid.period) {
            violations.push(BidViolation::UnknownPeriod {
                asset_id: asset_id.clone(),
                period: bid.period.clone(),
            });
        }
        if !seen.insert((bid.asset_id.as_str(), bid.period.as_str())) {
            violations.push(BidViolation::DuplicateBid {
                asset_id: asset_id.clone(),
                period: bid.period.clone(),
            });
        }
        if !bid.mode.allowed_for(asset.kind) {
            violations.push(BidViolation::ModeNotAllowed {
                asset_id: asset_id.clone(),
                mode: bid.mode,
            });
        }
        if bid.mode == OperatingMode::Idle {
            continue;
        }
        if bid.bands.len() > config.max_bands_per_bid {
            violations.push(BidViolation::TooManyBands {
                asset_id: asset_id.clone(),
                period: bid.period.clone(),
                count: bid.bands.len(),
                max: config.max_bands_per_bid,
            });
        }

        for (band_index, band) in bid.bands.iter().enumerate() {
            if !band.price.is_finite() || band.price < 0.0 {
                violations.push(BidViolation::InvalidPrice {
                    asset_id: asset_id.clone(),
                    band_index,
                    price: band.price,
                });
            } else if band.price > config.price_cap {
                violations.push(BidViolation::AboveCap {
                    asset_id: asset_id.clone(),
                    band_index,
                    price: band.price,
                    cap: config.price_cap,
                });
            }
            if !band.quantity.is_finite() || band.quantity < 0.0 {
                violations.push(BidViolation::InvalidQuantity {
                    asset_id: asset_id.clone(),
                    band_index,
                    quantity: band.quantity,
                });
            }
        }

        let offered = bid.total_offered();
        if offered > asset.nameplate_mw {
            violations.push(BidViolation::ExceedsNameplate {
                asset_id,
                offered,
                nameplate: asset.nameplate_mw,
            });
        }
    }

    violations
}
