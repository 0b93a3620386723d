pub mod availability;
pub mod balancing;
pub mod bids;
pub mod clearing;
pub mod pipeline;
pub mod round;
pub mod scenario;
pub mod settlement;
pub mod submission;
pub mod types;

pub use availability::{resolve_period, PeriodConditions, ResolvedAsset};
pub use balancing::{committed_assets, profit_leaders, select_balancing};
pub use bids::{normalize_bids, LoadRequest, NormalizedBids, SupplyOffer};
pub use clearing::{clear_period, merit_order, ClearingInput};
pub use pipeline::{FrozenPeriod, PeriodOutcome, PeriodPipeline, PipelineStage};
pub use round::{result_digest, run_round};
pub use scenario::{validate_effects, ScenarioCatalog, ScenarioEvent};
pub use settlement::{round_profits, settle_period};
pub use submission::{validate_submission, BidViolation};
pub use types::{
    AssetBid, AssetFinancials, AssetId, AssetInstance, AssetKind, BalancingEvent, BidBand,
    ClearingResult, EffectTarget, LoadEntry, MeritOrderEntry, OperatingMode, PeriodId,
    PriceFormation, RoundDispatchResult, RoundInput, RoundPeriod, ScenarioEffect, TeamBidSubmission,
    TeamId, TeamPeriodFinancials,
};
