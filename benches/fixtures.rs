use marketquake::catalog::{EventKind, default_catalog};
use marketquake::config::{RoundConfig, RoundSeeds};
use marketquake::effects::EventEffects;
use marketquake::market_event::MarketEvent;
use marketquake::phases::synthesize_phases;
use marketquake::types::{EventTarget, InstrumentId, Tier};

pub const ID: InstrumentId = InstrumentId(1);

pub struct Scenario {
    pub tier: Tier,
    pub duration: f64,
    pub fixed_step: f64,
}

pub const SHORT: Scenario = Scenario { tier: Tier::BlueChip, duration: 30.0, fixed_step: 1.0 / 30.0 };

pub const STANDARD: Scenario = Scenario { tier: Tier::Penny, duration: 60.0, fixed_step: 1.0 / 60.0 };

pub const LONG: Scenario = Scenario { tier: Tier::Penny, duration: 300.0, fixed_step: 1.0 / 120.0 };

pub fn round_config(scenario: &Scenario, seed: u64) -> RoundConfig {
    RoundConfig {
        seeds: RoundSeeds::from_seed(seed),
        tier: scenario.tier,
        duration: scenario.duration,
        fixed_step: scenario.fixed_step,
        ..RoundConfig::canonical()
    }
}

/// A ledger holding `n` long-lived events, cycling through every catalog
/// kind so single- and multi-phase lookups are both exercised.
pub fn populated_ledger(n: usize) -> EventEffects {
    let catalog = default_catalog();
    let kinds: Vec<EventKind> = catalog.entries.iter().map(|d| d.kind).collect();
    let mut effects = EventEffects::new();
    for i in 0..n {
        let kind = kinds[i % kinds.len()];
        let effect = if i % 2 == 0 { 0.1 } else { -0.1 };
        let duration = 1_000.0;
        let target = if kind.is_market_wide() { EventTarget::All } else { EventTarget::Instrument(ID) };
        effects.add(MarketEvent::new(kind, target, effect, duration, synthesize_phases(kind, effect, duration)));
    }
    // Past the attack ramp of every event so every query has non-zero force.
    effects.advance(1.0);
    effects.drain_notices();
    effects
}
