//! Cumulative leaderboard kept as an append-only ledger of round profits.
//!
//! One ledger is shared by every concurrent game session. Entries are keyed
//! by (session, team, round) and each key can be written exactly once.
//! Totals are always summed forward from the ledger, never stored, so
//! sessions appending concurrently cannot lose each other's updates.

use std::collections::BTreeMap;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::market::types::TeamId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub session_id: String,
    pub team_id: TeamId,
    pub round: u32,
    pub profit: f64,
    pub recorded_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub team_id: TeamId,
    pub cumulative_profit: f64,
    pub rounds_recorded: usize,
}

type LedgerKey = (String, TeamId, u32);

fn key(session_id: &str, team_id: &str, round: u32) -> LedgerKey {
    (session_id.to_string(), team_id.to_string(), round)
}

#[derive(Debug, Default)]
pub struct Leaderboard {
    entries: DashMap<LedgerKey, LedgerEntry>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &self,
        session_id: &str,
        team_id: &str,
        round: u32,
        profit: f64,
    ) -> Result<(), MarketError> {
        match self.entries.entry(key(session_id, team_id, round)) {
            Entry::Occupied(_) => Err(MarketError::LedgerConflict {
                session_id: session_id.to_string(),
                team_id: team_id.to_string(),
                round,
            }),
            Entry::Vacant(slot) => {
                slot.insert(LedgerEntry {
                    session_id: session_id.to_string(),
                    team_id: team_id.to_string(),
                    round,
                    profit,
                    recorded_at: Utc::now().to_rfc3339(),
                });
                Ok(())
            }
        }
    }

    /// Append one round's profits for every team of a session. Fails without
    /// writing anything if any team already has an entry for `round`.
    pub fn record_round(
        &self,
        session_id: &str,
        round: u32,
        profits: &BTreeMap<TeamId, f64>,
    ) -> Result<(), MarketError> {
        if let Some(team_id) = profits
            .keys()
            .find(|team_id| self.entries.contains_key(&key(session_id, team_id, round)))
        {
            return Err(MarketError::LedgerConflict {
                session_id: session_id.to_string(),
                team_id: team_id.clone(),
                round,
            });
        }
        for (team_id, profit) in profits {
            self.append(session_id, team_id, round, *profit)?;
        }
        tracing::info!(
            "leaderboard recorded session {session_id} round {round} for {} team(s)",
            profits.len()
        );
        Ok(())
    }

    pub fn round_profit(&self, session_id: &str, team_id: &str, round: u32) -> Option<f64> {
        self.entries
            .get(&key(session_id, team_id, round))
            .map(|entry| entry.profit)
    }

    pub fn cumulative_profit(&self, session_id: &str, team_id: &str) -> f64 {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == session_id && entry.key().1 == team_id)
            .map(|entry| entry.value().profit)
            .sum()
    }

    /// Ledger entries for one team of a session, ordered by round.
    pub fn history(&self, session_id: &str, team_id: &str) -> Vec<LedgerEntry> {
        let mut rows: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == session_id && entry.key().1 == team_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.round);
        rows
    }

    /// A session's teams ordered by cumulative profit (highest first, team id
    /// breaking ties).
    pub fn standings(&self, session_id: &str) -> Vec<Standing> {
        let mut totals: BTreeMap<TeamId, (f64, usize)> = BTreeMap::new();
        for entry in self.entries.iter().filter(|entry| entry.key().0 == session_id) {
            let slot = totals.entry(entry.key().1.clone()).or_insert((0.0, 0));
            slot.0 += entry.value().profit;
            slot.1 += 1;
        }

        let mut standings: Vec<Standing> = totals
            .into_iter()
            .map(|(team_id, (cumulative_profit, rounds_recorded))| Standing {
                team_id,
                cumulative_profit,
                rounds_recorded,
            })
            .collect();
        standings.sort_by(|a, b| {
            b.cumulative_profit
                .total_cmp(&a.cumulative_profit)
                .then_with(|| a.team_id.cmp(&b.team_id))
        });
        standings
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const GAME: &str = "game-1";

    #[test]
    fn totals_are_summed_forward() {
        let board = Leaderboard::new();
        board.append(GAME, "alpha", 1, 100.0).unwrap();
        board.append(GAME, "alpha", 2, -30.0).unwrap();
        board.append(GAME, "beta", 1, 50.0).unwrap();

        assert_eq!(board.cumulative_profit(GAME, "alpha"), 70.0);
        assert_eq!(board.cumulative_profit(GAME, "beta"), 50.0);
        assert_eq!(board.cumulative_profit(GAME, "gamma"), 0.0);
        assert_eq!(board.round_profit(GAME, "alpha", 2), Some(-30.0));
        assert_eq!(
            board.history(GAME, "alpha").iter().map(|e| e.round).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn rounds_cannot_be_rewritten() {
        let board = Leaderboard::new();
        board.append(GAME, "alpha", 1, 100.0).unwrap();

        let err = board.append(GAME, "alpha", 1, 999.0).unwrap_err();
        assert!(matches!(err, MarketError::LedgerConflict { round: 1, .. }));
        assert_eq!(board.cumulative_profit(GAME, "alpha"), 100.0);
    }

    #[test]
    fn record_round_is_all_or_nothing() {
        let board = Leaderboard::new();
        board.append(GAME, "beta", 3, 10.0).unwrap();

        let profits: BTreeMap<TeamId, f64> =
            [("alpha".to_string(), 5.0), ("beta".to_string(), 7.0)].into_iter().collect();
        assert!(board.record_round(GAME, 3, &profits).is_err());
        assert_eq!(board.round_profit(GAME, "alpha", 3), None);
        assert_eq!(board.round_profit(GAME, "beta", 3), Some(10.0));
    }

    #[test]
    fn standings_order_by_total_then_team() {
        let board = Leaderboard::new();
        board.append(GAME, "charlie", 1, 40.0).unwrap();
        board.append(GAME, "bravo", 1, 80.0).unwrap();
        board.append(GAME, "alpha", 1, 40.0).unwrap();

        let order: Vec<String> = board.standings(GAME).into_iter().map(|s| s.team_id).collect();
        assert_eq!(order, vec!["bravo", "alpha", "charlie"]);
    }

    #[test]
    fn sessions_keep_separate_books() {
        let board = Leaderboard::new();
        let profits: BTreeMap<TeamId, f64> =
            [("alpha".to_string(), 900.0), ("beta".to_string(), 10.0)].into_iter().collect();
        board.record_round("game-1", 1, &profits).unwrap();

        let reversed: BTreeMap<TeamId, f64> =
            [("alpha".to_string(), 10.0), ("beta".to_string(), 900.0)].into_iter().collect();
        board.record_round("game-2", 1, &reversed).unwrap();

        assert_eq!(board.cumulative_profit("game-1", "alpha"), 900.0);
        assert_eq!(board.cumulative_profit("game-2", "alpha"), 10.0);
        assert_eq!(board.standings("game-1")[0].team_id, "alpha");
        assert_eq!(board.standings("game-2")[0].team_id, "beta");
        assert!(board.standings("game-3").is_empty());
    }

    #[test]
    fn concurrent_sessions_do_not_lose_appends() {
        let board = Arc::new(Leaderboard::new());
        let handles: Vec<_> = (0..8u32)
            .map(|round| {
                let board = board.clone();
                std::thread::spawn(move || {
                    for team in ["alpha", "beta"] {
                        board.append(GAME, team, round, 1.0).unwrap();
                        board.append("game-2", team, round, 2.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(board.cumulative_profit(GAME, "alpha"), 8.0);
        assert_eq!(board.cumulative_profit(GAME, "beta"), 8.0);
        assert_eq!(board.cumulative_profit("game-2", "beta"), 16.0);
    }
}
