use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DataSet};
use crate::session::SessionSummary;

/// Best-of aggregate for one user, derived from their finalized sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_identity: String,
    pub best_average_reaction_time_ms: f64,
    pub overall_average_reaction_time_ms: f64,
    pub session_count: usize,
    pub best_correct_count: u32,
    #[serde(default)]
    pub age: Option<u32>,
}

impl LeaderboardEntry {
    pub fn new(user: impl Into<String>, best: f64, overall: f64, session_count: usize) -> Self {
        Self {
            user_identity: user.into(),
            best_average_reaction_time_ms: best,
            overall_average_reaction_time_ms: overall,
            session_count,
            best_correct_count: 0,
            age: None,
        }
    }

    pub fn with_age(self, age: Option<u32>) -> Self {
        Self { age, ..self }
    }

    /// Sessions without a correct round still count, but their zero average would
    /// otherwise win, so only scoring sessions feed the averages. `None` if the user
    /// has no scoring session at all.
    pub fn from_summaries(user: impl Into<String>, summaries: &[SessionSummary]) -> Option<Self> {
        let averages: Vec<f64> = summaries
            .iter()
            .filter(|s| s.has_scored_rounds())
            .map(|s| s.average_reaction_time_ms)
            .collect();
        if averages.is_empty() {
            return None;
        }

        let best = averages.iter().copied().fold(f64::INFINITY, f64::min);
        let overall = averages.iter().sum::<f64>() / averages.len() as f64;

        Some(Self {
            user_identity: user.into(),
            best_average_reaction_time_ms: best,
            overall_average_reaction_time_ms: overall,
            session_count: summaries.len(),
            best_correct_count: summaries.iter().map(|s| s.correct_count).max().unwrap_or(0),
            age: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
    Ordinal(usize),
}

impl Medal {
    pub fn for_rank(rank: usize) -> Self {
        match rank {
            1 => Medal::Gold,
            2 => Medal::Silver,
            3 => Medal::Bronze,
            n => Medal::Ordinal(n),
        }
    }
}

impl fmt::Display for Medal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medal::Gold => f.write_str("Gold"),
            Medal::Silver => f.write_str("Silver"),
            Medal::Bronze => f.write_str("Bronze"),
            Medal::Ordinal(n) => write!(f, "{n}."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub medal: Medal,
    pub entry: LeaderboardEntry,
}

fn leaderboard_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    a.best_average_reaction_time_ms
        .total_cmp(&b.best_average_reaction_time_ms)
        .then_with(|| {
            a.overall_average_reaction_time_ms
                .total_cmp(&b.overall_average_reaction_time_ms)
        })
        .then_with(|| a.user_identity.cmp(&b.user_identity))
}

/// Fastest first. Ranks are 1-based and unique even when the sort keys tie.
pub fn rank(mut entries: Vec<LeaderboardEntry>) -> Result<Vec<RankedEntry>, CoreError> {
    if entries.is_empty() {
        return Err(CoreError::InsufficientData(DataSet::LeaderboardEntries));
    }
    entries.sort_by(leaderboard_order);

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| RankedEntry {
            rank: idx + 1,
            medal: Medal::for_rank(idx + 1),
            entry,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn summary(correct: u32, avg: f64) -> SessionSummary {
        SessionSummary {
            total_rounds: 15,
            correct_count: correct,
            average_reaction_time_ms: avg,
            best_reaction_time_ms: (correct > 0).then_some(avg as u32),
        }
    }

    #[test]
    fn tie_on_best_broken_by_overall_average() {
        let ranked = rank(vec![
            LeaderboardEntry::new("A", 320.0, 340.0, 3),
            LeaderboardEntry::new("B", 310.0, 310.0, 2),
            LeaderboardEntry::new("C", 310.0, 305.0, 5),
        ])
        .unwrap();

        let order: Vec<_> = ranked.iter().map(|r| r.entry.user_identity.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
        let medals: Vec<_> = ranked.iter().map(|r| r.medal).collect();
        assert_eq!(medals, vec![Medal::Gold, Medal::Silver, Medal::Bronze]);
        assert_eq!(ranked.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn full_tie_falls_back_to_user_identity() {
        let ranked = rank(vec![
            LeaderboardEntry::new("zoe", 300.0, 300.0, 1),
            LeaderboardEntry::new("amy", 300.0, 300.0, 1),
        ])
        .unwrap();
        assert_eq!(ranked[0].entry.user_identity, "amy");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn ranks_beyond_podium_are_ordinals() {
        let entries = (0..5)
            .map(|i| LeaderboardEntry::new(format!("u{i}"), 250.0 + i as f64, 260.0, 1))
            .collect();
        let ranked = rank(entries).unwrap();
        assert_eq!(ranked[3].medal, Medal::Ordinal(4));
        assert_eq!(ranked[4].medal.to_string(), "5.");
    }

    #[test]
    fn empty_leaderboard_is_insufficient_data() {
        assert_matches!(
            rank(Vec::new()),
            Err(CoreError::InsufficientData(DataSet::LeaderboardEntries))
        );
    }

    #[test]
    fn entry_from_summaries_ignores_unscored_sessions() {
        let entry = LeaderboardEntry::from_summaries(
            "alice",
            &[summary(10, 300.0), summary(0, 0.0), summary(12, 260.0)],
        )
        .unwrap();
        assert_eq!(entry.best_average_reaction_time_ms, 260.0);
        assert_eq!(entry.overall_average_reaction_time_ms, 280.0);
        assert_eq!(entry.session_count, 3);
        assert_eq!(entry.best_correct_count, 12);
        assert_eq!(entry.age, None);
        assert_eq!(entry.with_age(Some(27)).age, Some(27));
    }

    #[test]
    fn user_without_scoring_session_has_no_entry() {
        assert!(LeaderboardEntry::from_summaries("bob", &[summary(0, 0.0)]).is_none());
        assert!(LeaderboardEntry::from_summaries("bob", &[]).is_none());
    }
}
