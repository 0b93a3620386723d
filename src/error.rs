use serde::Serialize;

use crate::market::pipeline::PipelineStage;

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("period {period}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        period: String,
        from: PipelineStage,
        to: PipelineStage,
    },
    #[error("period {period} is frozen; bid for {team_id}/{asset_id} rejected")]
    PeriodFrozen {
        period: String,
        team_id: String,
        asset_id: String,
    },
    #[error("bid for period {bid_period} sent to the pipeline for period {period}")]
    WrongPeriod { period: String, bid_period: String },
    #[error("round {0} has already been activated")]
    DuplicateRound(u32),
    #[error("ledger already holds round {round} for team {team_id} in session {session_id}")]
    LedgerConflict {
        session_id: String,
        team_id: String,
        round: u32,
    },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Serialize for MarketError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
