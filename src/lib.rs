// Library surface for the CLI and integration tests.
pub mod analysis;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod population;
pub mod round;
pub mod score;
pub mod session;
pub mod simulate;
pub mod store;
pub mod tier;
pub mod util;

pub use error::{CoreError, DataSet, RejectionReason, StateError};
pub use round::{RawRoundEvent, Round, TrialRules};
pub use session::{Session, SessionState, SessionSummary};
pub use store::{ResultsDb, SessionId, StoreError};
