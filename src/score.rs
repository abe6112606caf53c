use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::SessionSummary;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Map a time onto `[0, 100]` where faster is higher. `max_ms` is the axis ceiling:
/// values at or past it score 0 and values at or below 0 score 100.
pub fn normalize(value_ms: f64, max_ms: f64) -> f64 {
    if max_ms <= 0.0 {
        return 0.0;
    }
    ((max_ms - value_ms) / max_ms * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightError {
    pub total: f64,
}

impl fmt::Display for WeightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composite weights must sum to 1.0, got {}", self.total)
    }
}

impl std::error::Error for WeightError {}

/// Weighted sum of already normalized scores.
pub fn composite(parts: &[(f64, f64)]) -> Result<f64, WeightError> {
    let total: f64 = parts.iter().map(|&(_, weight)| weight).sum();
    if parts.is_empty() || (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(WeightError { total });
    }
    Ok(parts.iter().map(|&(score, weight)| score * weight).sum())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub speed_ceiling_ms: f64,
    pub stability_ceiling_ms: f64,
    pub focus_accuracy_weight: f64,
    pub focus_speed_weight: f64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            speed_ceiling_ms: 600.0,
            stability_ceiling_ms: 500.0,
            focus_accuracy_weight: 0.8,
            focus_speed_weight: 0.2,
        }
    }
}

/// The five radar axes shown on a results page, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarScores {
    pub average_speed: f64,
    pub accuracy: f64,
    pub best_speed: f64,
    pub stability: f64,
    pub focus: f64,
}

impl RadarScores {
    pub fn from_summary(summary: &SessionSummary, config: &RadarConfig) -> Result<Self, WeightError> {
        // A zero average from a session without correct rounds must not read as fast.
        let (average_speed, best_speed, stability) = match summary.best_reaction_time_ms {
            Some(best) if summary.has_scored_rounds() => {
                let average = summary.average_reaction_time_ms;
                (
                    normalize(average, config.speed_ceiling_ms),
                    normalize(f64::from(best), config.speed_ceiling_ms),
                    normalize(average, config.stability_ceiling_ms),
                )
            }
            _ => (0.0, 0.0, 0.0),
        };
        let accuracy = summary.accuracy_pct();
        let focus = composite(&[
            (accuracy, config.focus_accuracy_weight),
            (average_speed, config.focus_speed_weight),
        ])?;

        Ok(Self {
            average_speed,
            accuracy,
            best_speed,
            stability,
            focus,
        })
    }

    pub fn axes(&self) -> [(&'static str, f64); 5] {
        [
            ("average speed", self.average_speed),
            ("accuracy", self.accuracy),
            ("best speed", self.best_speed),
            ("stability", self.stability),
            ("focus", self.focus),
        ]
    }
}
