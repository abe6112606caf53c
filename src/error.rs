use std::fmt;

/// Why a raw round event was not accepted into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    InvalidRoundNumber,
    DuplicateRound,
    OutOfOrderRound,
    NegativeReactionTime,
    SessionNotActive,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectionReason::InvalidRoundNumber => "round number must be a positive integer",
            RejectionReason::DuplicateRound => "round number already recorded in this session",
            RejectionReason::OutOfOrderRound => {
                "round number is lower than the last recorded round"
            }
            RejectionReason::NegativeReactionTime => "reaction time must not be negative",
            RejectionReason::SessionNotActive => "session is already finalized",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for RejectionReason {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// A mutating operation reached a finalized session.
    SessionFinalized,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::SessionFinalized => f.write_str("operation not allowed on a finalized session"),
        }
    }
}

impl std::error::Error for StateError {}

/// The collection that turned out to be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSet {
    ReferenceSample,
    LeaderboardEntries,
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSet::ReferenceSample => f.write_str("reference sample"),
            DataSet::LeaderboardEntries => f.write_str("leaderboard entries"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    Validation(RejectionReason),
    State(StateError),
    InsufficientData(DataSet),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Validation(reason) => write!(f, "round rejected: {reason}"),
            CoreError::State(err) => fmt::Display::fmt(err, f),
            CoreError::InsufficientData(set) => write!(f, "not enough data: {set} is empty"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<RejectionReason> for CoreError {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::SessionNotActive => CoreError::State(StateError::SessionFinalized),
            other => CoreError::Validation(other),
        }
    }
}

impl From<StateError> for CoreError {
    fn from(err: StateError) -> Self {
        CoreError::State(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_active_maps_to_state_error() {
        assert_eq!(
            CoreError::from(RejectionReason::SessionNotActive),
            CoreError::State(StateError::SessionFinalized)
        );
    }

    #[test]
    fn other_rejections_stay_validation_errors() {
        assert_eq!(
            CoreError::from(RejectionReason::DuplicateRound),
            CoreError::Validation(RejectionReason::DuplicateRound)
        );
    }

    #[test]
    fn display_messages() {
        let err = CoreError::InsufficientData(DataSet::ReferenceSample);
        assert_eq!(err.to_string(), "not enough data: reference sample is empty");
        assert_eq!(
            CoreError::Validation(RejectionReason::NegativeReactionTime).to_string(),
            "round rejected: reaction time must not be negative"
        );
    }
}
