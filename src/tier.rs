use serde::{Deserialize, Serialize};

use crate::round::Round;

/// Speed bucket for a single reaction time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum Tier {
    Lightning,
    Excellent,
    Good,
    Average,
    Slow,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Lightning,
        Tier::Excellent,
        Tier::Good,
        Tier::Average,
        Tier::Slow,
    ];

    /// Half-open `[lower, upper)` bounds in milliseconds; `Slow` is unbounded above.
    pub fn bounds_ms(self) -> (u32, Option<u32>) {
        match self {
            Tier::Lightning => (0, Some(200)),
            Tier::Excellent => (200, Some(300)),
            Tier::Good => (300, Some(400)),
            Tier::Average => (400, Some(500)),
            Tier::Slow => (500, None),
        }
    }

    pub fn range_label(self) -> String {
        match self.bounds_ms() {
            (0, Some(upper)) => format!("<{upper}ms"),
            (lower, Some(upper)) => format!("{lower}-{}ms", upper - 1),
            (lower, None) => format!(">={lower}ms"),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

pub fn classify(reaction_time_ms: u32) -> Tier {
    match reaction_time_ms {
        0..=199 => Tier::Lightning,
        200..=299 => Tier::Excellent,
        300..=399 => Tier::Good,
        400..=499 => Tier::Average,
        _ => Tier::Slow,
    }
}

/// Tier counts over a set of correct reaction times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierHistogram {
    counts: [usize; 5],
}

impl TierHistogram {
    pub fn from_times<I>(times: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut histogram = Self::default();
        for ms in times {
            histogram.counts[classify(ms).index()] += 1;
        }
        histogram
    }

    /// Only correct rounds with a recorded time are counted.
    pub fn from_rounds(rounds: &[Round]) -> Self {
        Self::from_times(rounds.iter().filter_map(Round::scored_time_ms))
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.counts[tier.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Share of `tier` in `[0, 1]`; `0.0` for an empty histogram.
    pub fn fraction(&self, tier: Tier) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(tier) as f64 / total as f64,
        }
    }

    /// Tiers with at least one entry, fastest first.
    pub fn non_empty(&self) -> impl Iterator<Item = (Tier, usize)> + '_ {
        Tier::ALL
            .into_iter()
            .map(|tier| (tier, self.count(tier)))
            .filter(|&(_, count)| count > 0)
    }
}
