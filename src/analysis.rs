//! Descriptive statistics used by the results page and the global report.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::round::Round;
use crate::util::{mean, median, min_max, std_dev};

fn scored_times(rounds: &[Round]) -> Vec<f64> {
    rounds
        .iter()
        .filter_map(Round::scored_time_ms)
        .map(f64::from)
        .collect()
}

/// Distribution of the correct reaction times in a set of rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactionStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

impl ReactionStats {
    pub fn from_times(times: &[f64]) -> Option<Self> {
        let (min, max) = min_max(times)?;
        Some(Self {
            count: times.len(),
            mean: mean(times)?,
            median: median(times)?,
            stddev: std_dev(times)?,
            min,
            max,
        })
    }

    pub fn from_rounds(rounds: &[Round]) -> Option<Self> {
        Self::from_times(&scored_times(rounds))
    }
}

/// First half vs second half of a session, split on the highest round number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningEffect {
    pub first_half_mean: f64,
    pub second_half_mean: f64,
    /// Positive when the second half was faster.
    pub improvement_ms: f64,
    pub improvement_pct: f64,
}

impl LearningEffect {
    pub fn from_rounds(rounds: &[Round]) -> Option<Self> {
        let last = rounds.iter().map(|r| r.round_number).max()?;
        let midpoint = f64::from(last) / 2.0;
        let (first, second): (Vec<&Round>, Vec<&Round>) = rounds
            .iter()
            .partition(|r| f64::from(r.round_number) <= midpoint);

        let half_mean = |half: &[&Round]| {
            let times: Vec<f64> = half
                .iter()
                .filter_map(|r| r.scored_time_ms())
                .map(f64::from)
                .collect();
            mean(&times)
        };
        let first_half_mean = half_mean(&first)?;
        let second_half_mean = half_mean(&second)?;
        let improvement_ms = first_half_mean - second_half_mean;

        Some(Self {
            first_half_mean,
            second_half_mean,
            improvement_ms,
            improvement_pct: improvement_ms / first_half_mean * 100.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum ConsistencyRating {
    #[strum(to_string = "very consistent")]
    VeryConsistent,
    #[strum(to_string = "fairly consistent")]
    Consistent,
    #[strum(to_string = "highly variable")]
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Consistency {
    pub stddev_ms: f64,
    pub rating: ConsistencyRating,
}

impl Consistency {
    /// Spread of per-session averages; needs at least two sessions.
    pub fn from_session_averages(averages: &[f64]) -> Option<Self> {
        if averages.len() < 2 {
            return None;
        }
        let stddev_ms = std_dev(averages)?;
        let rating = match stddev_ms {
            sd if sd < 50.0 => ConsistencyRating::VeryConsistent,
            sd if sd < 100.0 => ConsistencyRating::Consistent,
            _ => ConsistencyRating::Variable,
        };
        Some(Self { stddev_ms, rating })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    Outstanding,
    Good,
    KeepPracticing,
}

impl Feedback {
    pub fn from_average(average_ms: f64) -> Self {
        match average_ms {
            avg if avg < 250.0 => Feedback::Outstanding,
            avg if avg < 350.0 => Feedback::Good,
            _ => Feedback::KeepPracticing,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Feedback::Outstanding => "Outstanding reaction speed!",
            Feedback::Good => "Good reaction speed, with room to improve.",
            Feedback::KeepPracticing => {
                "Regular practice helps; aim for an average below 250ms."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatCell {
    Hit(u32),
    Miss,
}

/// Rounds laid out row-major on a fixed grid, round 1 top-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Vec<Option<HeatCell>>>,
}

impl Heatmap {
    pub fn build(rounds: &[Round], rows: usize, cols: usize) -> Self {
        let mut cells = vec![vec![None; cols]; rows];
        for round in rounds {
            let Some(idx) = (round.round_number as usize).checked_sub(1) else {
                continue;
            };
            if cols == 0 || idx >= rows * cols {
                continue;
            }
            cells[idx / cols][idx % cols] = Some(match round.scored_time_ms() {
                Some(ms) => HeatCell::Hit(ms),
                None => HeatCell::Miss,
            });
        }
        Self { rows, cols, cells }
    }

    pub fn render(&self) -> String {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Some(HeatCell::Hit(ms)) => format!("{:>6}", format!("{ms}ms")),
                        Some(HeatCell::Miss) => format!("{:>6}", "MISS"),
                        None => format!("{:>6}", "-"),
                    })
                    .join(" ")
            })
            .join("\n")
    }
}

/// Mean correct reaction time for each round number across many sessions.
pub fn round_progression(rounds: &[Round]) -> Vec<(u32, f64)> {
    rounds
        .iter()
        .filter_map(|r| r.scored_time_ms().map(|ms| (r.round_number, f64::from(ms))))
        .into_group_map()
        .into_iter()
        .filter_map(|(round_number, times)| mean(&times).map(|m| (round_number, m)))
        .sorted_by_key(|&(round_number, _)| round_number)
        .collect()
}

/// Sessions per calendar day, oldest first.
pub fn daily_activity<I>(dates: I) -> BTreeMap<NaiveDate, usize>
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates.into_iter().counts().into_iter().collect()
}
