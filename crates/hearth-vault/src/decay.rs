//! Time decay and reinforcement of fact relevance.
//!
//! Pure functions over fact metadata. `relevance` is the only scoring function
//! used to rank facts; confidence only goes up through [`reinforced_confidence`],
//! which the vault applies after a completed model turn used the fact.

use chrono::{DateTime, Utc};

use crate::types::{Fact, clamp_unit};

/// Default decay constant in days.
pub const DEFAULT_HALFLIFE_DAYS: f64 = 90.0;

/// Default confidence gained per successful use.
pub const DEFAULT_REINFORCE_STEP: f32 = 0.1;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Tunable decay parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    pub halflife_days: f64,
    pub reinforce_step: f32,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            halflife_days: DEFAULT_HALFLIFE_DAYS,
            reinforce_step: DEFAULT_REINFORCE_STEP,
        }
    }
}

impl DecayParams {
    pub fn with_halflife_days(mut self, days: f64) -> Self {
        self.halflife_days = days;
        self
    }

    pub fn with_reinforce_step(mut self, step: f32) -> Self {
        self.reinforce_step = step;
        self
    }
}

/// Days elapsed since the fact's decay anchor. Never negative.
pub fn age_days(fact: &Fact, now: DateTime<Utc>) -> f64 {
    let elapsed = now.signed_duration_since(fact.decay_anchor());
    let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
    (seconds / SECONDS_PER_DAY).max(0.0)
}

/// `confidence * exp(-age_days / halflife_days)`.
pub fn relevance(fact: &Fact, now: DateTime<Utc>, params: &DecayParams) -> f64 {
    let confidence = f64::from(clamp_unit(fact.confidence));
    if params.halflife_days <= 0.0 {
        return confidence;
    }
    confidence * (-age_days(fact, now) / params.halflife_days).exp()
}

/// Confidence after one successful use, capped at 1.0.
pub fn reinforced_confidence(confidence: f32, step: f32) -> f32 {
    clamp_unit(clamp_unit(confidence) + step.max(0.0))
}
