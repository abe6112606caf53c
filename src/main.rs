use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::{error::Error, path::PathBuf, process::ExitCode};

use reflex::{
    analysis::{self, Consistency, Feedback, Heatmap, LearningEffect, ReactionStats},
    config::{Config, ConfigStore, FileConfigStore},
    leaderboard,
    population::{self, PopulationComparison},
    score::RadarScores,
    simulate::{SimulationConfig, TrialGenerator},
    store::Overview,
    tier::TierHistogram,
    util::mean,
    CoreError, RawRoundEvent, ResultsDb, SessionId, SessionSummary, StoreError,
};

/// reaction-time sessions with scoring, rankings and population statistics
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// results database, overrides the config file
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// register a new user
    Register {
        username: String,
        #[clap(long)]
        age: Option<u32>,
    },
    /// start a session and print its id
    Start { username: String },
    /// record one round of an active session
    Record {
        session: SessionId,
        #[clap(long, allow_hyphen_values = true)]
        round: i64,
        #[clap(long)]
        stimulus: String,
        #[clap(long)]
        response: Option<String>,
        /// reaction time in milliseconds, omitted for a timeout
        #[clap(long, allow_hyphen_values = true)]
        rt: Option<i64>,
    },
    /// finalize a session and print its summary
    Finish { session: SessionId },
    /// show the results page of a finalized session
    Results {
        session: SessionId,
        #[clap(long)]
        json: bool,
    },
    /// rank users by their best session average
    Leaderboard,
    /// statistics across every finalized session
    Report {
        /// restrict the consistency rating to one user
        #[clap(long)]
        user: Option<String>,
    },
    /// write every recorded round to a CSV file
    Export { path: PathBuf },
    /// play a synthetic session for a user
    Simulate {
        #[clap(long)]
        user: String,
        #[clap(long)]
        rounds: Option<u32>,
        #[clap(long)]
        seed: Option<u64>,
    },
}

impl Cli {
    fn load_config(&self) -> Config {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path).load(),
            None => FileConfigStore::new().load(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultsPage {
    session_id: SessionId,
    owner: String,
    summary: SessionSummary,
    accuracy_pct: f64,
    tiers: TierHistogram,
    radar: RadarScores,
    comparison: Option<PopulationComparison>,
    stats: Option<ReactionStats>,
    learning: Option<LearningEffect>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = cli.load_config();
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.resolved_database_path());
    let mut db = ResultsDb::open(&db_path)?;

    match cli.command {
        Command::Register { username, age } => {
            db.register_user(&username, age)?;
            println!("registered {username}");
        }
        Command::Start { username } => {
            let id = db.start_session(&username)?;
            println!("{id}");
        }
        Command::Record {
            session,
            round,
            stimulus,
            response,
            rt,
        } => {
            let raw = RawRoundEvent {
                round_number: round,
                reaction_time_ms: rt,
                stimulus_token: stimulus,
                response_token: response,
            };
            let recorded = db.record_round(session, &raw, &config.rules)?;
            let verdict = if recorded.is_correct { "correct" } else { "incorrect" };
            println!("round {}: {verdict}", recorded.round_number);
        }
        Command::Finish { session } => {
            let summary = db.finalize_session(session)?;
            print_summary(&summary);
        }
        Command::Results { session, json } => {
            let page = results_page(&db, &config, session)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                let rounds = db.load_session(session)?.rounds().to_vec();
                let heatmap = Heatmap::build(&rounds, config.heatmap_rows, config.heatmap_cols);
                print_results(&page, &heatmap);
            }
        }
        Command::Leaderboard => print_leaderboard(&db)?,
        Command::Report { user } => print_report(&db, &config, user.as_deref())?,
        Command::Export { path } => {
            let written = db.export_rounds_csv(&path)?;
            println!("exported {written} rounds to {}", path.display());
        }
        Command::Simulate { user, rounds, seed } => {
            let summary = simulate(&mut db, &config, &user, rounds, seed)?;
            print_summary(&summary);
        }
    }
    Ok(())
}

fn results_page(db: &ResultsDb, config: &Config, id: SessionId) -> Result<ResultsPage, Box<dyn Error>> {
    let session = db.load_session(id)?;
    let summary = *session
        .summary()
        .ok_or_else(|| format!("session {id} is still active, finish it first"))?;

    let comparison = if summary.has_scored_rounds() {
        let sample = db.reference_sample()?;
        Some(population::compare(summary.average_reaction_time_ms, &sample))
    } else {
        None
    };

    Ok(ResultsPage {
        session_id: id,
        owner: session.owner().to_string(),
        summary,
        accuracy_pct: summary.accuracy_pct(),
        tiers: TierHistogram::from_rounds(session.rounds()),
        radar: RadarScores::from_summary(&summary, &config.radar)?,
        comparison,
        stats: ReactionStats::from_rounds(session.rounds()),
        learning: LearningEffect::from_rounds(session.rounds()),
    })
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "rounds: {}  correct: {} ({:.1}%)",
        summary.total_rounds,
        summary.correct_count,
        summary.accuracy_pct()
    );
    println!("average: {:.1}ms", summary.average_reaction_time_ms);
    match summary.best_reaction_time_ms {
        Some(best) => println!("best: {best}ms"),
        None => println!("best: -"),
    }
}

fn print_results(page: &ResultsPage, heatmap: &Heatmap) {
    println!("session {} ({})", page.session_id, page.owner);
    print_summary(&page.summary);

    println!("\ntiers");
    for (tier, count) in page.tiers.non_empty() {
        println!(
            "  {:<10} {:<12} {count:>3} ({:.0}%)",
            tier.to_string(),
            tier.range_label(),
            page.tiers.fraction(tier) * 100.0
        );
    }

    println!("\nradar");
    for (axis, value) in page.radar.axes() {
        println!("  {axis:<14} {value:>5.1}");
    }

    println!("\npopulation");
    match page.comparison.map(PopulationComparison::ensure_sufficient) {
        Some(Ok(cmp)) => {
            println!(
                "  faster than {:.1}% of {} results (mean {:.1}ms, sd {:.1}ms)",
                cmp.above_pct, cmp.sample_size, cmp.mean, cmp.stddev
            );
            if let Some(level) = cmp.performance_level() {
                println!("  {level}");
            }
        }
        Some(Err(e)) => println!("  {e}"),
        None => println!("  no correct rounds to compare"),
    }

    println!("\nheatmap\n{}", heatmap.render());

    if let Some(stats) = page.stats {
        println!(
            "\nmedian {:.1}ms  sd {:.1}ms  range {:.0}-{:.0}ms",
            stats.median, stats.stddev, stats.min, stats.max
        );
    }
    if let Some(learning) = page.learning {
        println!(
            "first half {:.1}ms, second half {:.1}ms ({:+.1}%)",
            learning.first_half_mean, learning.second_half_mean, learning.improvement_pct
        );
    }
    if page.summary.has_scored_rounds() {
        println!(
            "\n{}",
            Feedback::from_average(page.summary.average_reaction_time_ms).message()
        );
    }
}

fn print_leaderboard(db: &ResultsDb) -> Result<(), StoreError> {
    let ranked = match leaderboard::rank(db.leaderboard_entries()?) {
        Ok(ranked) => ranked,
        Err(CoreError::InsufficientData(_)) => {
            println!("no finalized sessions yet");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    for r in ranked {
        let age = r.entry.age.map(|a| format!("({a})")).unwrap_or_default();
        println!(
            "{:>7} {:<16} {age:<5} best {:>6.1}ms  avg {:>6.1}ms  most correct {:>2}  sessions {}",
            r.medal.to_string(),
            r.entry.user_identity,
            r.entry.best_average_reaction_time_ms,
            r.entry.overall_average_reaction_time_ms,
            r.entry.best_correct_count,
            r.entry.session_count
        );
    }
    Ok(())
}

fn print_report(db: &ResultsDb, config: &Config, user: Option<&str>) -> Result<(), StoreError> {
    let overview = db.overview()?;
    println!(
        "users: {}  sessions: {}  rounds: {}",
        overview.users, overview.finalized_sessions, overview.rounds
    );
    for line in overview_lines(&overview, config.rounds_per_session) {
        println!("{line}");
    }

    let rounds = db.finalized_rounds()?;
    let tiers = TierHistogram::from_rounds(&rounds);
    if tiers.total() > 0 {
        println!("\ntiers");
        for (tier, count) in tiers.non_empty() {
            println!("  {:<10} {count:>5} ({:.0}%)", tier.to_string(), tiers.fraction(tier) * 100.0);
        }
    }

    match Consistency::from_session_averages(&db.session_averages(user)?) {
        Some(c) => println!("\nconsistency: {} (sd {:.1}ms)", c.rating, c.stddev_ms),
        None => println!("\nconsistency: needs at least two sessions"),
    }

    if let Some(avg) = mean(&db.reference_sample()?) {
        println!("overall average {avg:.1}ms: {}", Feedback::from_average(avg).message());
    }

    let progression = analysis::round_progression(&rounds);
    if !progression.is_empty() {
        println!("\nround progression");
        for (round_number, avg) in progression {
            println!("  {round_number:>3} {avg:>7.1}ms");
        }
    }

    let activity = analysis::daily_activity(db.finalized_session_dates()?);
    if !activity.is_empty() {
        println!("\ndaily activity");
        for (day, sessions) in activity {
            println!("  {day} {sessions}");
        }
    }
    Ok(())
}

fn overview_lines(overview: &Overview, target_rounds: u32) -> Vec<String> {
    let show = |value: Option<f64>, unit: &str| match value {
        Some(v) => format!("{v:.1}{unit}"),
        None => "-".to_string(),
    };
    vec![
        format!(
            "rounds per session: {}  completion: {}",
            show(overview.average_rounds_per_session(), ""),
            show(overview.completion_rate_pct(target_rounds), "%")
        ),
        format!(
            "accuracy: {}  mean session average: {}",
            show(overview.accuracy_pct(), "%"),
            show(overview.mean_session_average_ms, "ms")
        ),
    ]
}

fn simulate(
    db: &mut ResultsDb,
    config: &Config,
    user: &str,
    rounds: Option<u32>,
    seed: Option<u64>,
) -> Result<SessionSummary, StoreError> {
    if db.user_id(user)?.is_none() {
        db.register_user(user, None)?;
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let generator = TrialGenerator::new(SimulationConfig {
        rounds: rounds.unwrap_or(config.rounds_per_session),
        stimulus_tokens: config.stimulus_tokens.clone(),
        ..SimulationConfig::default()
    });

    let id = db.start_session(user)?;
    for event in generator.generate(&mut rng) {
        db.record_round(id, &event, &config.rules)?;
    }
    db.finalize_session(id)
}
