use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;
use crate::round::{self, RawRoundEvent, Round, TrialRules};

/// Aggregates computed once, when a session is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_rounds: u32,
    pub correct_count: u32,
    /// Mean over correct rounds; `0.0` when there are none.
    pub average_reaction_time_ms: f64,
    pub best_reaction_time_ms: Option<u32>,
}

impl SessionSummary {
    fn compute(rounds: &[Round]) -> Self {
        let scored: Vec<u32> = rounds.iter().filter_map(Round::scored_time_ms).collect();
        let average_reaction_time_ms = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|&ms| f64::from(ms)).sum::<f64>() / scored.len() as f64
        };

        Self {
            total_rounds: rounds.len() as u32,
            correct_count: rounds.iter().filter(|r| r.is_correct).count() as u32,
            average_reaction_time_ms,
            best_reaction_time_ms: scored.iter().copied().min(),
        }
    }

    /// Correct responses as a percentage of all rounds.
    pub fn accuracy_pct(&self) -> f64 {
        if self.total_rounds == 0 {
            0.0
        } else {
            f64::from(self.correct_count) / f64::from(self.total_rounds) * 100.0
        }
    }

    pub fn has_scored_rounds(&self) -> bool {
        self.correct_count > 0 && self.best_reaction_time_ms.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Active,
    Finalized {
        summary: SessionSummary,
        finished_at: DateTime<Local>,
    },
}

/// One continuous test attempt by one user.
#[derive(Debug, Clone)]
pub struct Session {
    owner: String,
    started_at: DateTime<Local>,
    rounds: Vec<Round>,
    state: SessionState,
}

impl Session {
    pub fn start(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            started_at: Local::now(),
            rounds: Vec::new(),
            state: SessionState::Active,
        }
    }

    /// Rebuild a session from stored parts. A stored summary is kept as-is rather than
    /// recomputed from `rounds`.
    pub fn restore(
        owner: impl Into<String>,
        started_at: DateTime<Local>,
        rounds: Vec<Round>,
        finalized: Option<(SessionSummary, DateTime<Local>)>,
    ) -> Self {
        let state = match finalized {
            Some((summary, finished_at)) => SessionState::Finalized {
                summary,
                finished_at,
            },
            None => SessionState::Active,
        };
        Self {
            owner: owner.into(),
            started_at,
            rounds,
            state,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        match self.state {
            SessionState::Finalized { finished_at, .. } => Some(finished_at),
            SessionState::Active => None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        match &self.state {
            SessionState::Finalized { summary, .. } => Some(summary),
            SessionState::Active => None,
        }
    }

    /// Rounds are kept in ascending order, so a binary search is enough.
    pub fn contains_round(&self, round_number: u32) -> bool {
        self.rounds
            .binary_search_by_key(&round_number, |r| r.round_number)
            .is_ok()
    }

    pub fn last_round_number(&self) -> Option<u32> {
        self.rounds.last().map(|r| r.round_number)
    }

    /// Append an already validated round.
    pub fn record(&mut self, round: Round) -> Result<(), RejectionReason> {
        if !self.is_active() {
            return Err(RejectionReason::SessionNotActive);
        }
        round::check_sequence(self, round.round_number)?;
        self.rounds.push(round);
        Ok(())
    }

    /// Validate a raw event against this session and append it.
    pub fn submit(&mut self, raw: &RawRoundEvent) -> Result<&Round, RejectionReason> {
        self.submit_with(raw, &TrialRules::default())
    }

    pub fn submit_with(
        &mut self,
        raw: &RawRoundEvent,
        rules: &TrialRules,
    ) -> Result<&Round, RejectionReason> {
        let round = round::validate_with(raw, self, rules)?;
        self.rounds.push(round);
        Ok(&self.rounds[self.rounds.len() - 1])
    }

    /// Close the session. Calling this again returns the stored summary untouched.
    pub fn finalize(&mut self) -> SessionSummary {
        if let SessionState::Finalized { summary, .. } = &self.state {
            return *summary;
        }
        let summary = SessionSummary::compute(&self.rounds);
        self.state = SessionState::Finalized {
            summary,
            finished_at: Local::now(),
        };
        summary
    }
}
