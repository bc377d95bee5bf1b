use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::Modifiers;
use crate::types::{Act, InstrumentId, RoundNumber, Tier};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Constants that shape a round's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// No event fires in the first `early_buffer` seconds.
    pub early_buffer: f64,
    /// No event fires in the last `late_buffer` seconds.
    pub late_buffer: f64,
    /// Inclusive base event-count range before the late-act threshold.
    pub early_act_events: (u32, u32),
    /// Inclusive base event-count range from the late-act threshold on.
    pub late_act_events: (u32, u32),
    pub late_act_threshold: u32,
    pub max_rare_per_round: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            early_buffer: 5.0,
            late_buffer: 5.0,
            early_act_events: (2, 4),
            late_act_events: (3, 6),
            late_act_threshold: 3,
            max_rare_per_round: 1,
        }
    }
}

/// Baseline random-walk parameters. `drift` and `volatility` are per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceWalkConfig {
    pub starting_price: f64,
    pub drift: f64,
    pub volatility: f64,
    /// Relative noise around the event anchor while events are active.
    pub event_jitter: f64,
    pub min_price: f64,
}

impl Default for PriceWalkConfig {
    fn default() -> Self {
        PriceWalkConfig {
            starting_price: 10.0,
            drift: 0.0,
            volatility: 0.04,
            event_jitter: 0.002,
            min_price: 0.01,
        }
    }
}

/// Independent seeds for the three random streams of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSeeds {
    /// Schedule planning.
    pub events: u64,
    /// Baseline price walk.
    pub prices: u64,
    /// Ad-hoc force-fire triggers.
    pub triggers: u64,
}

impl RoundSeeds {
    /// Derive all three streams from one seed.
    pub fn from_seed(seed: u64) -> Self {
        RoundSeeds {
            events: seed,
            prices: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1),
            triggers: seed.wrapping_mul(0xC2B2_AE3D_27D4_EB4F).wrapping_add(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundConfig {
    pub seeds: RoundSeeds,
    pub round: RoundNumber,
    pub act: Act,
    pub tier: Tier,
    pub instrument: InstrumentId,
    /// Seconds.
    pub duration: f64,
    /// Fixed simulation step in seconds.
    pub fixed_step: f64,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub walk: PriceWalkConfig,
}

impl RoundConfig {
    pub fn canonical() -> Self {
        RoundConfig {
            seeds: RoundSeeds::from_seed(42),
            round: RoundNumber(1),
            act: Act(1),
            tier: Tier::Penny,
            instrument: InstrumentId(1),
            duration: 60.0,
            fixed_step: 1.0 / 60.0,
            modifiers: Modifiers::default(),
            scheduler: SchedulerConfig::default(),
            walk: PriceWalkConfig::default(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RoundConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of fixed steps in the round.
    pub fn total_steps(&self) -> u64 {
        (self.duration / self.fixed_step).round() as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.duration > 0.0 && self.duration.is_finite()) {
            return invalid(format!("duration must be positive and finite, got {}", self.duration));
        }
        if !(self.fixed_step > 0.0) || self.fixed_step > self.duration {
            return invalid(format!(
                "fixed_step must be in (0, duration], got {}",
                self.fixed_step
            ));
        }
        let s = &self.scheduler;
        if !(s.early_buffer >= 0.0 && s.late_buffer >= 0.0) {
            return invalid("scheduling buffers must be non-negative numbers".to_string());
        }
        for (name, (lo, hi)) in [("early_act_events", s.early_act_events), ("late_act_events", s.late_act_events)] {
            if lo > hi {
                return invalid(format!("{name} range is inverted: ({lo}, {hi})"));
            }
        }
        let m = &self.modifiers;
        for (name, v) in [
            ("event_count", m.event_count),
            ("impact", m.impact),
            ("positive_impact", m.positive_impact),
        ] {
            if !(v >= 0.0 && v.is_finite()) {
                return invalid(format!("modifier {name} must be finite and non-negative, got {v}"));
            }
        }
        let w = &self.walk;
        let finite = [w.starting_price, w.drift, w.volatility, w.event_jitter, w.min_price]
            .iter()
            .all(|v| v.is_finite());
        if !finite || !(w.starting_price > 0.0) || w.min_price < 0.0 || w.volatility < 0.0 {
            return invalid("price walk needs a positive starting price and non-negative floor and volatility".to_string());
        }
        Ok(())
    }
}
