use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, RejectionReason};
use crate::leaderboard::LeaderboardEntry;
use crate::round::{RawRoundEvent, Round, TrialRules};
use crate::session::{Session, SessionSummary};

/// Bumped whenever the table layout changes.
pub const SCHEMA_VERSION: i64 = 1;

/// How long a writer waits for another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    age INTEGER,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    started_at TEXT NOT NULL,
    finished_at TEXT,
    total_rounds INTEGER,
    correct_count INTEGER,
    average_reaction_time_ms REAL,
    best_reaction_time_ms INTEGER
);

CREATE TABLE IF NOT EXISTS rounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    round_number INTEGER NOT NULL,
    stimulus_token TEXT NOT NULL,
    response_token TEXT,
    reaction_time_ms INTEGER,
    is_correct BOOLEAN NOT NULL,
    UNIQUE (session_id, round_number)
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_rounds_session ON rounds(session_id);
"#;

pub type SessionId = i64;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Csv(csv::Error),
    Io(std::io::Error),
    Core(CoreError),
    UnknownUser(String),
    UserExists(String),
    SessionNotFound(SessionId),
    UnsupportedSchema(i64),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "database error: {e}"),
            StoreError::Csv(e) => write!(f, "csv error: {e}"),
            StoreError::Io(e) => write!(f, "io error: {e}"),
            StoreError::Core(e) => fmt::Display::fmt(e, f),
            StoreError::UnknownUser(name) => write!(f, "no user named '{name}'"),
            StoreError::UserExists(name) => write!(f, "user '{name}' already exists"),
            StoreError::SessionNotFound(id) => write!(f, "session {id} not found"),
            StoreError::UnsupportedSchema(v) => write!(
                f,
                "database schema version {v} is newer than supported version {SCHEMA_VERSION}"
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Csv(e) => Some(e),
            StoreError::Io(e) => Some(e),
            StoreError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Csv(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::Core(e)
    }
}

impl From<RejectionReason> for StoreError {
    fn from(reason: RejectionReason) -> Self {
        StoreError::Core(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Aggregates over finalized sessions shown at the top of the global report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Overview {
    pub users: usize,
    pub finalized_sessions: usize,
    pub rounds: usize,
    pub correct_rounds: usize,
    /// Mean of the per-session averages, counting only sessions with a correct round.
    pub mean_session_average_ms: Option<f64>,
}

impl Overview {
    pub fn average_rounds_per_session(&self) -> Option<f64> {
        (self.finalized_sessions > 0).then(|| self.rounds as f64 / self.finalized_sessions as f64)
    }

    /// Correct rounds over all rounds, pooled across sessions.
    pub fn accuracy_pct(&self) -> Option<f64> {
        (self.rounds > 0).then(|| self.correct_rounds as f64 / self.rounds as f64 * 100.0)
    }

    /// Average rounds per session against the planned session length.
    pub fn completion_rate_pct(&self, target_rounds: u32) -> Option<f64> {
        if target_rounds == 0 {
            return None;
        }
        self.average_rounds_per_session()
            .map(|avg| avg / f64::from(target_rounds) * 100.0)
    }
}

/// A user's finalized sessions, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct UserHistory {
    pub username: String,
    pub age: Option<u32>,
    pub summaries: Vec<SessionSummary>,
}

/// One exported CSV row.
#[derive(Debug, Serialize)]
struct RoundRecord<'a> {
    session_id: SessionId,
    username: &'a str,
    round_number: u32,
    stimulus_token: &'a str,
    response_token: Option<&'a str>,
    reaction_time_ms: Option<u32>,
    is_correct: bool,
}

/// SQLite-backed history of users, sessions and rounds
#[derive(Debug)]
pub struct ResultsDb {
    conn: Connection,
}

impl ResultsDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        log::debug!("opening results database at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema(version));
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    /// Takes the write lock up front, so a session read inside the transaction cannot be
    /// changed by another connection before this one writes.
    fn write_transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    pub fn register_user(&self, username: &str, age: Option<u32>) -> Result<i64> {
        if self.user_id(username)?.is_some() {
            return Err(StoreError::UserExists(username.to_string()));
        }
        self.conn.execute(
            "INSERT INTO users (username, age, created_at) VALUES (?1, ?2, ?3)",
            params![username, age, Local::now().to_rfc3339()],
        )?;
        log::info!("registered user '{username}'");
        Ok(self.conn.last_insert_rowid())
    }

    pub fn user_id(&self, username: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn start_session(&self, username: &str) -> Result<SessionId> {
        let user_id = self
            .user_id(username)?
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))?;
        let session = Session::start(username);
        self.conn.execute(
            "INSERT INTO sessions (user_id, started_at) VALUES (?1, ?2)",
            params![user_id, session.started_at().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        log::info!("started session {id} for '{username}'");
        Ok(id)
    }

    pub fn load_session(&self, id: SessionId) -> Result<Session> {
        load_session(&self.conn, id)
    }

    /// Validate `raw` against the stored session and persist the resulting round.
    pub fn record_round(
        &mut self,
        id: SessionId,
        raw: &RawRoundEvent,
        rules: &TrialRules,
    ) -> Result<Round> {
        let tx = self.write_transaction()?;
        let mut session = load_session(&tx, id)?;
        let round = match session.submit_with(raw, rules) {
            Ok(round) => round.clone(),
            Err(reason) => {
                log::warn!("session {id}: rejected round {}: {reason}", raw.round_number);
                return Err(reason.into());
            }
        };

        let inserted = tx.execute(
            r#"
            INSERT INTO rounds
            (session_id, round_number, stimulus_token, response_token, reaction_time_ms, is_correct)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id,
                round.round_number,
                round.stimulus_token,
                round.response_token,
                round.reaction_time_ms,
                round.is_correct,
            ],
        );
        inserted.map_err(insert_error)?;
        tx.commit()?;
        log::debug!(
            "session {id}: recorded round {} (correct: {})",
            round.round_number,
            round.is_correct
        );
        Ok(round)
    }

    /// Finalize a session. A session that is already finalized, including one closed
    /// by a concurrent caller, returns the stored summary.
    pub fn finalize_session(&mut self, id: SessionId) -> Result<SessionSummary> {
        let tx = self.write_transaction()?;
        let mut session = load_session(&tx, id)?;
        if let Some(summary) = session.summary() {
            log::debug!("session {id} already finalized");
            return Ok(*summary);
        }

        let summary = session.finalize();
        let finished_at = session.finished_at().unwrap_or_else(Local::now);
        let updated = tx.execute(
            r#"
            UPDATE sessions
            SET finished_at = ?2, total_rounds = ?3, correct_count = ?4,
                average_reaction_time_ms = ?5, best_reaction_time_ms = ?6
            WHERE id = ?1 AND finished_at IS NULL
            "#,
            params![
                id,
                finished_at.to_rfc3339(),
                summary.total_rounds,
                summary.correct_count,
                summary.average_reaction_time_ms,
                summary.best_reaction_time_ms,
            ],
        )?;
        if updated == 0 {
            let stored = load_session(&tx, id)?;
            return stored.summary().copied().ok_or(StoreError::SessionNotFound(id));
        }
        tx.commit()?;
        log::info!(
            "finalized session {id}: {}/{} correct, avg {:.1}ms",
            summary.correct_count,
            summary.total_rounds,
            summary.average_reaction_time_ms
        );
        Ok(summary)
    }

    /// Correct reaction times across all finalized sessions.
    pub fn reference_sample(&self) -> Result<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.reaction_time_ms
            FROM rounds r
            JOIN sessions s ON r.session_id = s.id
            WHERE s.finished_at IS NOT NULL
              AND r.is_correct = 1
              AND r.reaction_time_ms IS NOT NULL
            "#,
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, f64>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Finalized summaries grouped by user, users in name order.
    pub fn summaries_by_user(&self) -> Result<Vec<UserHistory>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.username, u.age, s.total_rounds, s.correct_count,
                   s.average_reaction_time_ms, s.best_reaction_time_ms
            FROM sessions s
            JOIN users u ON s.user_id = u.id
            WHERE s.finished_at IS NOT NULL
            ORDER BY u.username, s.id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<u32>>(1)?,
                summary_from_row(row, 2)?,
            ))
        })?;

        let mut grouped: Vec<UserHistory> = Vec::new();
        for row in rows {
            let (username, age, summary) = row?;
            match grouped.last_mut() {
                Some(last) if last.username == username => last.summaries.push(summary),
                _ => grouped.push(UserHistory {
                    username,
                    age,
                    summaries: vec![summary],
                }),
            }
        }
        Ok(grouped)
    }

    pub fn leaderboard_entries(&self) -> Result<Vec<LeaderboardEntry>> {
        Ok(self
            .summaries_by_user()?
            .into_iter()
            .filter_map(|h| {
                LeaderboardEntry::from_summaries(h.username, &h.summaries).map(|e| e.with_age(h.age))
            })
            .collect())
    }

    /// Averages of finalized sessions that had at least one correct round.
    pub fn session_averages(&self, username: Option<&str>) -> Result<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.average_reaction_time_ms
            FROM sessions s
            JOIN users u ON s.user_id = u.id
            WHERE s.finished_at IS NOT NULL
              AND s.correct_count > 0
              AND (?1 IS NULL OR u.username = ?1)
            ORDER BY s.id
            "#,
        )?;
        let rows = stmt.query_map([username], |row| row.get::<_, f64>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every round belonging to a finalized session.
    pub fn finalized_rounds(&self) -> Result<Vec<Round>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.round_number, r.reaction_time_ms, r.is_correct, r.stimulus_token, r.response_token
            FROM rounds r
            JOIN sessions s ON r.session_id = s.id
            WHERE s.finished_at IS NOT NULL
            ORDER BY r.session_id, r.round_number
            "#,
        )?;
        let rows = stmt.query_map([], round_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn finalized_session_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT started_at FROM sessions WHERE finished_at IS NOT NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok(timestamp_from_row(row, 0)?.date_naive()))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn overview(&self) -> Result<Overview> {
        let users: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let overview = self.conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(total_rounds), 0),
                   COALESCE(SUM(correct_count), 0),
                   AVG(CASE WHEN correct_count > 0 THEN average_reaction_time_ms END)
            FROM sessions
            WHERE finished_at IS NOT NULL
            "#,
            [],
            |row| {
                Ok(Overview {
                    users: users as usize,
                    finalized_sessions: row.get::<_, i64>(0)? as usize,
                    rounds: row.get::<_, i64>(1)? as usize,
                    correct_rounds: row.get::<_, i64>(2)? as usize,
                    mean_session_average_ms: row.get(3)?,
                })
            },
        )?;
        Ok(overview)
    }

    /// Write every stored round as CSV. Returns the number of rows written.
    pub fn export_rounds_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.session_id, u.username, r.round_number, r.reaction_time_ms,
                   r.is_correct, r.stimulus_token, r.response_token
            FROM rounds r
            JOIN sessions s ON r.session_id = s.id
            JOIN users u ON s.user_id = u.id
            ORDER BY r.session_id, r.round_number
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, SessionId>(0)?,
                row.get::<_, String>(1)?,
                round_from_row_at(row, 2)?,
            ))
        })?;

        let mut writer = csv::Writer::from_path(path)?;
        let mut written = 0;
        for row in rows {
            let (session_id, username, round) = row?;
            writer.serialize(RoundRecord {
                session_id,
                username: &username,
                round_number: round.round_number,
                stimulus_token: &round.stimulus_token,
                response_token: round.response_token.as_deref(),
                reaction_time_ms: round.reaction_time_ms,
                is_correct: round.is_correct,
            })?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }
}

/// Only the `(session_id, round_number)` unique key means a repeated round.
fn insert_error(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RejectionReason::DuplicateRound.into()
        }
        other => other.into(),
    }
}

fn load_session(conn: &Connection, id: SessionId) -> Result<Session> {
    let header = conn
        .query_row(
            r#"
            SELECT u.username, s.started_at, s.finished_at, s.total_rounds, s.correct_count,
                   s.average_reaction_time_ms, s.best_reaction_time_ms
            FROM sessions s
            JOIN users u ON s.user_id = u.id
            WHERE s.id = ?1
            "#,
            [id],
            |row| {
                let owner: String = row.get(0)?;
                let started_at = timestamp_from_row(row, 1)?;
                let finished_at: Option<String> = row.get(2)?;
                let finalized = match finished_at {
                    Some(text) => Some((summary_from_row(row, 3)?, parse_timestamp(&text, 2)?)),
                    None => None,
                };
                Ok((owner, started_at, finalized))
            },
        )
        .optional()?;
    let (owner, started_at, finalized) = header.ok_or(StoreError::SessionNotFound(id))?;

    let mut stmt = conn.prepare(
        r#"
        SELECT round_number, reaction_time_ms, is_correct, stimulus_token, response_token
        FROM rounds
        WHERE session_id = ?1
        ORDER BY round_number
        "#,
    )?;
    let rounds = stmt
        .query_map([id], round_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Session::restore(owner, started_at, rounds, finalized))
}

fn round_from_row(row: &Row<'_>) -> rusqlite::Result<Round> {
    round_from_row_at(row, 0)
}

/// Reads `round_number, reaction_time_ms, is_correct, stimulus_token, response_token`
/// starting at column `at`.
fn round_from_row_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Round> {
    Ok(Round {
        round_number: row.get(at)?,
        reaction_time_ms: row.get(at + 1)?,
        is_correct: row.get(at + 2)?,
        stimulus_token: row.get(at + 3)?,
        response_token: row.get(at + 4)?,
    })
}

fn summary_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        total_rounds: row.get(at)?,
        correct_count: row.get(at + 1)?,
        average_reaction_time_ms: row.get(at + 2)?,
        best_reaction_time_ms: row.get(at + 3)?,
    })
}

fn timestamp_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text, idx)
}

fn parse_timestamp(text: &str, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn raw(n: i64, rt: Option<i64>, response: Option<&str>) -> RawRoundEvent {
        RawRoundEvent {
            round_number: n,
            reaction_time_ms: rt,
            stimulus_token: "red".to_string(),
            response_token: response.map(str::to_string),
        }
    }

    fn play(db: &mut ResultsDb, user: &str, times: &[Option<i64>]) -> SessionSummary {
        let id = db.start_session(user).unwrap();
        for (i, rt) in times.iter().enumerate() {
            let response = rt.map(|_| "red");
            db.record_round(id, &raw(i as i64 + 1, *rt, response), &TrialRules::default())
                .unwrap();
        }
        db.finalize_session(id).unwrap()
    }

    #[test]
    fn register_and_lookup_user() {
        let db = ResultsDb::open_in_memory().unwrap();
        let id = db.register_user("alice", Some(30)).unwrap();
        assert_eq!(db.user_id("alice").unwrap(), Some(id));
        assert_eq!(db.user_id("bob").unwrap(), None);
        assert_matches!(db.register_user("alice", None), Err(StoreError::UserExists(_)));
    }

    #[test]
    fn start_session_requires_known_user() {
        let db = ResultsDb::open_in_memory().unwrap();
        assert_matches!(db.start_session("ghost"), Err(StoreError::UnknownUser(_)));
    }

    #[test]
    fn record_and_finalize_round_trip() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        let summary = play(&mut db, "alice", &[Some(200), Some(300), None]);
        assert_eq!(summary.total_rounds, 3);
        assert_eq!(summary.correct_count, 2);
        assert_eq!(summary.average_reaction_time_ms, 250.0);
        assert_eq!(summary.best_reaction_time_ms, Some(200));
    }

    #[test]
    fn loaded_session_matches_stored_state() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        let id = db.start_session("alice").unwrap();
        db.record_round(id, &raw(1, Some(240), Some("red")), &TrialRules::default())
            .unwrap();
        db.record_round(id, &raw(2, Some(260), Some("blue")), &TrialRules::default())
            .unwrap();

        let session = db.load_session(id).unwrap();
        assert!(session.is_active());
        assert_eq!(session.owner(), "alice");
        assert_eq!(session.rounds().len(), 2);
        assert!(session.rounds()[0].is_correct);
        assert!(!session.rounds()[1].is_correct);

        let summary = db.finalize_session(id).unwrap();
        let reloaded = db.load_session(id).unwrap();
        assert_eq!(reloaded.summary(), Some(&summary));
    }

    #[test]
    fn duplicate_round_is_rejected_and_not_stored() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        let id = db.start_session("alice").unwrap();
        db.record_round(id, &raw(1, Some(240), Some("red")), &TrialRules::default())
            .unwrap();
        assert_matches!(
            db.record_round(id, &raw(1, Some(200), Some("red")), &TrialRules::default()),
            Err(StoreError::Core(CoreError::Validation(RejectionReason::DuplicateRound)))
        );
        assert_eq!(db.load_session(id).unwrap().rounds().len(), 1);
    }

    #[test]
    fn finalize_is_idempotent_and_blocks_recording() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        let id = db.start_session("alice").unwrap();
        db.record_round(id, &raw(1, Some(321), Some("red")), &TrialRules::default())
            .unwrap();

        let first = db.finalize_session(id).unwrap();
        let second = db.finalize_session(id).unwrap();
        assert_eq!(first, second);
        assert_matches!(
            db.record_round(id, &raw(2, Some(300), Some("red")), &TrialRules::default()),
            Err(StoreError::Core(CoreError::State(_)))
        );
    }

    #[test]
    fn unknown_session_is_reported() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        assert_matches!(db.finalize_session(42), Err(StoreError::SessionNotFound(42)));
    }

    #[test]
    fn reference_sample_only_uses_finalized_correct_rounds() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        play(&mut db, "alice", &[Some(200), None, Some(400)]);

        let open = db.start_session("alice").unwrap();
        db.record_round(open, &raw(1, Some(100), Some("red")), &TrialRules::default())
            .unwrap();

        let mut sample = db.reference_sample().unwrap();
        sample.sort_by(f64::total_cmp);
        assert_eq!(sample, vec![200.0, 400.0]);
    }

    #[test]
    fn leaderboard_entries_per_user() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", Some(34)).unwrap();
        db.register_user("bob", None).unwrap();
        db.register_user("carol", None).unwrap();
        play(&mut db, "alice", &[Some(300), Some(320)]);
        play(&mut db, "alice", &[Some(280)]);
        play(&mut db, "bob", &[Some(250)]);
        play(&mut db, "carol", &[None, None]);

        let entries = db.leaderboard_entries().unwrap();
        assert_eq!(entries.len(), 2);
        let alice = entries.iter().find(|e| e.user_identity == "alice").unwrap();
        assert_eq!(alice.best_average_reaction_time_ms, 280.0);
        assert_eq!(alice.overall_average_reaction_time_ms, 295.0);
        assert_eq!(alice.session_count, 2);
        assert_eq!(alice.best_correct_count, 2);
        assert_eq!(alice.age, Some(34));
        let bob = entries.iter().find(|e| e.user_identity == "bob").unwrap();
        assert_eq!(bob.age, None);

        assert_eq!(db.session_averages(Some("alice")).unwrap(), vec![310.0, 280.0]);
        assert_eq!(db.session_averages(None).unwrap().len(), 3);
    }

    #[test]
    fn overview_dates_and_rounds() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        play(&mut db, "alice", &[Some(300), None]);
        db.start_session("alice").unwrap();

        let overview = db.overview().unwrap();
        assert_eq!(
            overview,
            Overview {
                users: 1,
                finalized_sessions: 1,
                rounds: 2,
                correct_rounds: 1,
                mean_session_average_ms: Some(300.0),
            }
        );
        assert_eq!(db.finalized_rounds().unwrap().len(), 2);
        assert_eq!(
            db.finalized_session_dates().unwrap(),
            vec![Local::now().date_naive()]
        );
    }

    #[test]
    fn persists_across_reopen_and_exports_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("results.db");
        {
            let mut db = ResultsDb::open(&path).unwrap();
            db.register_user("alice", None).unwrap();
            play(&mut db, "alice", &[Some(210), None]);
        }
        let db = ResultsDb::open(&path).unwrap();
        assert_eq!(db.overview().unwrap().finalized_sessions, 1);

        let csv_path = dir.path().join("rounds.csv");
        assert_eq!(db.export_rounds_csv(&csv_path).unwrap(), 2);
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("session_id,username,round_number,stimulus_token,response_token,reaction_time_ms,is_correct")
        );
        assert_eq!(lines.next(), Some("1,alice,1,red,red,210,true"));
        assert_eq!(lines.next(), Some("1,alice,2,red,,,false"));
    }

    #[test]
    fn only_unique_violations_count_as_duplicates() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        let id = db.start_session("alice").unwrap();
        db.record_round(id, &raw(1, Some(240), Some("red")), &TrialRules::default())
            .unwrap();

        let insert = |session_id: SessionId| {
            db.conn.execute(
                "INSERT INTO rounds (session_id, round_number, stimulus_token, is_correct)
                 VALUES (?1, 1, 'red', 0)",
                [session_id],
            )
        };
        let duplicate = insert(id).unwrap_err();
        assert_matches!(
            insert_error(duplicate),
            StoreError::Core(CoreError::Validation(RejectionReason::DuplicateRound))
        );
        let orphan = insert(999).unwrap_err();
        assert_matches!(insert_error(orphan), StoreError::Sqlite(_));
    }

    #[test]
    fn concurrent_finalize_from_two_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let ids: Vec<SessionId> = {
            let mut db = ResultsDb::open(&path).unwrap();
            db.register_user("alice", None).unwrap();
            (0..100)
                .map(|_| {
                    let id = db.start_session("alice").unwrap();
                    db.record_round(id, &raw(1, Some(250), Some("red")), &TrialRules::default())
                        .unwrap();
                    db.record_round(id, &raw(2, Some(310), Some("red")), &TrialRules::default())
                        .unwrap();
                    id
                })
                .collect()
        };

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                let ids = ids.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut db = ResultsDb::open(&path).unwrap();
                    ids.iter()
                        .map(|&id| {
                            barrier.wait();
                            db.finalize_session(id).map_err(|e| e.to_string())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<_>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        for (a, b) in results[0].iter().zip(&results[1]) {
            let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
            assert_eq!(a, b);
            assert_eq!(a.correct_count, 2);
            assert_eq!(a.average_reaction_time_ms, 280.0);
        }
        let db = ResultsDb::open(&path).unwrap();
        assert_eq!(db.overview().unwrap().finalized_sessions, 100);
    }

    #[test]
    fn overview_without_sessions_has_no_ratios() {
        let db = ResultsDb::open_in_memory().unwrap();
        let overview = db.overview().unwrap();
        assert_eq!(overview.finalized_sessions, 0);
        assert_eq!(overview.rounds, 0);
        assert_eq!(overview.average_rounds_per_session(), None);
        assert_eq!(overview.accuracy_pct(), None);
        assert_eq!(overview.completion_rate_pct(15), None);
        assert_eq!(overview.mean_session_average_ms, None);
    }

    #[test]
    fn overview_pools_finalized_sessions() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.register_user("alice", None).unwrap();
        play(&mut db, "alice", &[Some(200), Some(300), None, None]);
        play(&mut db, "alice", &[Some(400), Some(400)]);
        play(&mut db, "alice", &[None, None, None, None, None, None]);

        let overview = db.overview().unwrap();
        assert_eq!(overview.rounds, 12);
        assert_eq!(overview.correct_rounds, 4);
        assert_eq!(overview.average_rounds_per_session(), Some(4.0));
        assert_eq!(overview.completion_rate_pct(8), Some(50.0));
        assert_eq!(overview.completion_rate_pct(0), None);
        let accuracy = overview.accuracy_pct().unwrap();
        assert!((accuracy - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(overview.mean_session_average_ms, Some(325.0));
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
                .unwrap();
        }
        assert_matches!(ResultsDb::open(&path), Err(StoreError::UnsupportedSchema(_)));
    }
}
