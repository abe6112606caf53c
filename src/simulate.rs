use rand::seq::SliceRandom;
use rand::Rng;

use crate::round::RawRoundEvent;

/// Parameters for generating a plausible synthetic player.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub rounds: u32,
    pub stimulus_tokens: Vec<String>,
    pub mean_ms: u32,
    pub spread_ms: u32,
    /// Chance that a round times out with no response.
    pub miss_rate: f64,
    /// Chance that a response picks the wrong token.
    pub error_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: 15,
            stimulus_tokens: vec!["red".into(), "green".into(), "blue".into(), "yellow".into()],
            mean_ms: 320,
            spread_ms: 120,
            miss_rate: 0.05,
            error_rate: 0.1,
        }
    }
}

/// Produces raw round events as a client would send them
pub struct TrialGenerator {
    config: SimulationConfig,
}

impl TrialGenerator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<RawRoundEvent> {
        (1..=self.config.rounds)
            .filter_map(|n| self.trial(rng, n))
            .collect()
    }

    fn trial<R: Rng + ?Sized>(&self, rng: &mut R, round_number: u32) -> Option<RawRoundEvent> {
        let stimulus = self.config.stimulus_tokens.choose(rng)?.clone();

        if rng.gen_bool(self.config.miss_rate.clamp(0.0, 1.0)) {
            return Some(RawRoundEvent {
                round_number: i64::from(round_number),
                reaction_time_ms: None,
                stimulus_token: stimulus,
                response_token: None,
            });
        }

        let lo = self.config.mean_ms.saturating_sub(self.config.spread_ms);
        let hi = self.config.mean_ms + self.config.spread_ms;
        let reaction_time_ms = rng.gen_range(lo..=hi);

        let response = if rng.gen_bool(self.config.error_rate.clamp(0.0, 1.0)) {
            self.config
                .stimulus_tokens
                .iter()
                .filter(|t| **t != stimulus)
                .collect::<Vec<_>>()
                .choose(rng)
                .map(|t| (*t).clone())
                .unwrap_or_else(|| stimulus.clone())
        } else {
            stimulus.clone()
        };

        Some(RawRoundEvent {
            round_number: i64::from(round_number),
            reaction_time_ms: Some(i64::from(reaction_time_ms)),
            stimulus_token: stimulus,
            response_token: Some(response),
        })
    }
}
