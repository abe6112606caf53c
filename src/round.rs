use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;
use crate::session::Session;

/// One trial as reported by the client, before any checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRoundEvent {
    pub round_number: i64,
    /// Values above `u32::MAX` (about 49 days) are stored as `u32::MAX`.
    #[serde(default)]
    pub reaction_time_ms: Option<i64>,
    pub stimulus_token: String,
    #[serde(default)]
    pub response_token: Option<String>,
}

/// A validated stimulus-response trial. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u32,
    pub reaction_time_ms: Option<u32>,
    pub is_correct: bool,
    pub stimulus_token: String,
    pub response_token: Option<String>,
}

impl Round {
    /// Reaction time of a correct response, the only kind that feeds aggregates.
    pub fn scored_time_ms(&self) -> Option<u32> {
        if self.is_correct {
            self.reaction_time_ms
        } else {
            None
        }
    }
}

/// Per-trial scoring rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrialRules {
    /// Responses slower than this are recorded but never count as correct.
    pub response_window_ms: Option<u32>,
}

pub fn validate(raw: &RawRoundEvent, session: &Session) -> Result<Round, RejectionReason> {
    validate_with(raw, session, &TrialRules::default())
}

pub fn validate_with(
    raw: &RawRoundEvent,
    session: &Session,
    rules: &TrialRules,
) -> Result<Round, RejectionReason> {
    if !session.is_active() {
        return Err(RejectionReason::SessionNotActive);
    }

    let round_number = match u32::try_from(raw.round_number) {
        Ok(n) if n > 0 => n,
        _ => return Err(RejectionReason::InvalidRoundNumber),
    };
    check_sequence(session, round_number)?;

    let reaction_time_ms = match raw.reaction_time_ms {
        Some(ms) if ms < 0 => return Err(RejectionReason::NegativeReactionTime),
        Some(ms) => Some(u32::try_from(ms).unwrap_or(u32::MAX)), // saturate
        None => None,
    };

    let is_correct = is_correct_response(
        &raw.stimulus_token,
        raw.response_token.as_deref(),
        reaction_time_ms,
        rules,
    );

    Ok(Round {
        round_number,
        reaction_time_ms,
        is_correct,
        stimulus_token: raw.stimulus_token.clone(),
        response_token: raw.response_token.clone(),
    })
}

pub(crate) fn check_sequence(session: &Session, round_number: u32) -> Result<(), RejectionReason> {
    if session.contains_round(round_number) {
        return Err(RejectionReason::DuplicateRound);
    }
    match session.last_round_number() {
        Some(last) if round_number < last => Err(RejectionReason::OutOfOrderRound),
        _ => Ok(()),
    }
}

fn is_correct_response(
    stimulus: &str,
    response: Option<&str>,
    reaction_time_ms: Option<u32>,
    rules: &TrialRules,
) -> bool {
    let (Some(response), Some(ms)) = (response, reaction_time_ms) else {
        return false;
    };
    let in_window = rules.response_window_ms.map_or(true, |window| ms <= window);
    in_window && response.trim().eq_ignore_ascii_case(stimulus.trim())
}
