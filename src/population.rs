use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DataSet};
use crate::util::{mean, min_max, std_dev};

/// Where a subject value sits relative to a reference sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationComparison {
    /// Percentage of the sample strictly below the subject. For reaction times that is
    /// the share of faster results. `0` for an empty sample, which means "unknown".
    pub percentile: f64,
    pub mean: f64,
    /// Sample standard deviation, `0` when the sample has fewer than two values.
    pub stddev: f64,
    pub sample_size: usize,
    /// Percentage of the sample strictly above the subject.
    pub above_pct: f64,
}

impl PopulationComparison {
    pub fn is_sufficient(&self) -> bool {
        self.sample_size > 0
    }

    pub fn ensure_sufficient(self) -> Result<Self, CoreError> {
        if self.is_sufficient() {
            Ok(self)
        } else {
            Err(CoreError::InsufficientData(DataSet::ReferenceSample))
        }
    }

    pub fn gaussian(&self) -> GaussianFit {
        GaussianFit {
            mean: self.mean,
            stddev: self.stddev,
        }
    }

    /// Level for a reaction-time subject, where being slower than most is bad.
    pub fn performance_level(&self) -> Option<PerformanceLevel> {
        self.is_sufficient()
            .then(|| PerformanceLevel::from_slower_share(self.above_pct))
    }
}

pub fn compare(subject: f64, sample: &[f64]) -> PopulationComparison {
    if sample.is_empty() {
        return PopulationComparison {
            percentile: 0.0,
            mean: 0.0,
            stddev: 0.0,
            sample_size: 0,
            above_pct: 0.0,
        };
    }

    let n = sample.len() as f64;
    let below = sample.iter().filter(|&&x| x < subject).count() as f64;
    let above = sample.iter().filter(|&&x| x > subject).count() as f64;

    PopulationComparison {
        percentile: below / n * 100.0,
        mean: mean(sample).unwrap_or(0.0),
        stddev: std_dev(sample).unwrap_or(0.0),
        sample_size: sample.len(),
        above_pct: above / n * 100.0,
    }
}

/// Normal curve parameterised from a sample, for overlay plots only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFit {
    pub mean: f64,
    pub stddev: f64,
}

impl GaussianFit {
    pub fn pdf(&self, x: f64) -> Option<f64> {
        if self.stddev <= 0.0 {
            return None;
        }
        let z = (x - self.mean) / self.stddev;
        Some((-0.5 * z * z).exp() / (self.stddev * (2.0 * PI).sqrt()))
    }

    /// `points` evenly spaced `(x, density)` pairs spanning the sample range.
    pub fn curve(&self, sample: &[f64], points: usize) -> Vec<(f64, f64)> {
        let Some((lo, hi)) = min_max(sample) else {
            return Vec::new();
        };
        if self.stddev <= 0.0 || points < 2 {
            return Vec::new();
        }
        let step = (hi - lo) / (points - 1) as f64;
        (0..points)
            .filter_map(|i| {
                let x = lo + step * i as f64;
                self.pdf(x).map(|y| (x, y))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum PerformanceLevel {
    #[strum(to_string = "Top performance")]
    Top,
    #[strum(to_string = "Excellent performance")]
    Excellent,
    #[strum(to_string = "Good performance")]
    Good,
    #[strum(to_string = "Fair performance")]
    Fair,
    #[strum(to_string = "Room to improve")]
    RoomToImprove,
}

impl PerformanceLevel {
    /// `slower_pct` is the share of the population the subject beat.
    pub fn from_slower_share(slower_pct: f64) -> Self {
        match slower_pct {
            p if p >= 90.0 => PerformanceLevel::Top,
            p if p >= 75.0 => PerformanceLevel::Excellent,
            p if p >= 50.0 => PerformanceLevel::Good,
            p if p >= 25.0 => PerformanceLevel::Fair,
            _ => PerformanceLevel::RoomToImprove,
        }
    }
}
