//! Round scheduler: decides every event of a round before the round starts,
//! then fires them as elapsed time crosses their fire times.
//!
//! Random draws happen only in [`EventScheduler::initialize_round`], in this
//! order: event count, then per slot (in slot order) fire time, kind,
//! magnitude, sign. Phase synthesis draws nothing. [`EventScheduler::update`]
//! draws nothing, so any cadence that reaches the same elapsed times fires
//! the same events.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Catalog, EventDefinition, EventKind};
use crate::config::SchedulerConfig;
use crate::effects::EventEffects;
use crate::market_event::MarketEvent;
use crate::phases::{EventPhase, synthesize_phases};
use crate::types::{Act, EventTarget, InstrumentId, RoundNumber, SlotId, Tier};

/// Gameplay multipliers, set before `initialize_round`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub event_count: f64,
    pub impact: f64,
    pub positive_impact: f64,
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers { event_count: 1.0, impact: 1.0, positive_impact: 1.0 }
    }
}

/// A fully resolved event, decided at round start and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedEvent {
    /// Seconds into the round.
    pub fire_time: f64,
    pub kind: EventKind,
    /// Signed fractional move.
    pub effect: f64,
    pub positive: bool,
    pub duration: f64,
    /// Copied from the catalog entry at planning time.
    pub rare: bool,
    pub phases: Option<Vec<EventPhase>>,
}

impl PlannedEvent {
    pub fn end_time(&self) -> f64 {
        self.fire_time + self.duration
    }
}

/// The half-open interval fire times are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: f64,
    pub end: f64,
}

impl ScheduleWindow {
    /// `[early, duration - late]`, or the whole round if the buffers leave
    /// no room.
    pub fn for_round(duration: f64, config: &SchedulerConfig) -> Self {
        let start = config.early_buffer;
        let end = duration - config.late_buffer;
        if end > start {
            ScheduleWindow { start, end }
        } else {
            ScheduleWindow { start: 0.0, end: duration }
        }
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// Equal-length contiguous segment `index` of `count`.
    pub fn segment(&self, index: usize, count: usize) -> (f64, f64) {
        let width = self.len() / count as f64;
        let lo = self.start + width * index as f64;
        let hi = if index + 1 == count { self.end } else { lo + width };
        (lo, hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RoundState {
    round: RoundNumber,
    act: Act,
    tier: Tier,
    instrument: InstrumentId,
    duration: f64,
    window: ScheduleWindow,
}

/// Inclusive base range for `act`.
pub fn base_event_range(act: Act, config: &SchedulerConfig) -> (u32, u32) {
    if act.is_late(config.late_act_threshold) {
        config.late_act_events
    } else {
        config.early_act_events
    }
}

/// Scale a rolled base count by tier and gameplay multipliers; never below 1,
/// including for a NaN multiplier.
pub fn scaled_event_count(base: u32, tier: Tier, event_count_multiplier: f64) -> usize {
    let scaled = (base as f64 * tier.event_frequency_modifier() * event_count_multiplier).round();
    scaled.max(1.0) as usize
}

/// Rarity-weighted pick from `available`.
///
/// Rare entries are excluded once `rare_fired` reaches `max_rare`, unless
/// that would leave nothing to pick. Returns the chosen definition; the
/// caller bumps its rare counter.
pub fn select_event<'a>(
    available: &[&'a EventDefinition],
    rare_fired: u32,
    max_rare: u32,
    rng: &mut impl Rng,
) -> &'a EventDefinition {
    assert!(!available.is_empty(), "tier has no available events");

    let mut candidates: Vec<&'a EventDefinition> = if rare_fired >= max_rare {
        available.iter().copied().filter(|d| !d.is_rare()).collect()
    } else {
        available.to_vec()
    };
    if candidates.is_empty() {
        candidates = available.to_vec();
    }

    let total_weight: f64 = candidates.iter().map(|d| d.rarity).sum();
    let r = rng.random_range(0.0..total_weight);
    let mut cumulative = 0.0;
    for &def in &candidates {
        cumulative += def.rarity;
        if cumulative >= r {
            return def;
        }
    }
    candidates[candidates.len() - 1]
}

/// Roll a signed effect for `def`. Draws the magnitude, then for
/// directional kinds a fair-coin sign.
pub fn resolve_effect(def: &EventDefinition, modifiers: &Modifiers, rng: &mut impl Rng) -> f64 {
    if def.kind.is_directional() {
        let lo = def.min_effect.abs().min(def.max_effect.abs());
        let hi = def.min_effect.abs().max(def.max_effect.abs());
        let magnitude = rng.random_range(lo..=hi) * modifiers.impact;
        if rng.random_bool(0.5) { magnitude } else { -magnitude }
    } else {
        let effect = rng.random_range(def.min_effect..=def.max_effect) * modifiers.impact;
        if effect > 0.0 { effect * modifiers.positive_impact } else { effect }
    }
}

pub struct EventScheduler {
    config: SchedulerConfig,
    catalog: Catalog,
    rng: ChaCha20Rng,
    trigger_rng: ChaCha20Rng,
    modifiers: Modifiers,
    plans: Vec<PlannedEvent>,
    fired: Vec<bool>,
    rare_fired: u32,
    effects: EventEffects,
    state: Option<RoundState>,
}

impl EventScheduler {
    /// `rng` drives planning; `trigger_rng` drives ad-hoc force-fires so
    /// those never disturb the planning stream.
    ///
    /// Panics if `catalog` fails [`Catalog::validate`], so planning and
    /// force-fire can always draw for every tier.
    pub fn new(config: SchedulerConfig, catalog: Catalog, rng: ChaCha20Rng, trigger_rng: ChaCha20Rng) -> Self {
        if let Err(e) = catalog.validate() {
            panic!("invalid catalog: {e}");
        }
        EventScheduler {
            config,
            catalog,
            rng,
            trigger_rng,
            modifiers: Modifiers::default(),
            plans: Vec::new(),
            fired: Vec::new(),
            rare_fired: 0,
            effects: EventEffects::new(),
            state: None,
        }
    }

    pub fn from_seeds(config: SchedulerConfig, catalog: Catalog, events_seed: u64, triggers_seed: u64) -> Self {
        Self::new(
            config,
            catalog,
            ChaCha20Rng::seed_from_u64(events_seed),
            ChaCha20Rng::seed_from_u64(triggers_seed),
        )
    }

    pub fn set_event_count_multiplier(&mut self, m: f64) {
        self.modifiers.event_count = m;
    }

    pub fn set_impact_multiplier(&mut self, m: f64) {
        self.modifiers.impact = m;
    }

    pub fn set_positive_impact_multiplier(&mut self, m: f64) {
        self.modifiers.positive_impact = m;
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Resolved plans for the current round, indexed by segment.
    pub fn plans(&self) -> &[PlannedEvent] {
        &self.plans
    }

    pub fn event_count(&self) -> usize {
        self.plans.len()
    }

    pub fn is_fired(&self, index: usize) -> bool {
        self.fired.get(index).copied().unwrap_or(false)
    }

    pub fn rare_fired(&self) -> u32 {
        self.rare_fired
    }

    pub fn window(&self) -> Option<ScheduleWindow> {
        self.state.map(|s| s.window)
    }

    pub fn round(&self) -> Option<(RoundNumber, Act, Tier)> {
        self.state.map(|s| (s.round, s.act, s.tier))
    }

    pub fn instrument(&self) -> Option<InstrumentId> {
        self.state.map(|s| s.instrument)
    }

    pub fn round_duration(&self) -> Option<f64> {
        self.state.map(|s| s.duration)
    }

    pub fn effects(&self) -> &EventEffects {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EventEffects {
        &mut self.effects
    }

    /// Plan the whole round. Call once per round, before any `update`.
    pub fn initialize_round(
        &mut self,
        round: RoundNumber,
        act: Act,
        tier: Tier,
        instrument: InstrumentId,
        duration: f64,
    ) {
        assert!(duration > 0.0, "round duration must be positive, got {duration}");

        self.effects.clear();
        self.rare_fired = 0;

        let (min_events, max_events) = base_event_range(act, &self.config);
        let base = self.rng.random_range(min_events..=max_events);
        let count = scaled_event_count(base, tier, self.modifiers.event_count);

        let window = ScheduleWindow::for_round(duration, &self.config);
        let available = self.catalog.available_for(tier);

        let mut plans = Vec::with_capacity(count);
        for index in 0..count {
            let (lo, hi) = window.segment(index, count);
            let fire_time = if hi > lo { self.rng.random_range(lo..hi) } else { lo };

            let def = select_event(&available, self.rare_fired, self.config.max_rare_per_round, &mut self.rng);
            if def.is_rare() {
                self.rare_fired += 1;
            }
            let effect = resolve_effect(def, &self.modifiers, &mut self.rng);
            let phases = synthesize_phases(def.kind, effect, def.duration);

            plans.push(PlannedEvent {
                fire_time,
                kind: def.kind,
                effect,
                positive: effect > 0.0,
                duration: def.duration,
                rare: def.is_rare(),
                phases,
            });
        }

        info!(
            round = round.0,
            act = act.0,
            tier = ?tier,
            base,
            event_count = count,
            window_start = window.start,
            window_end = window.end,
            "round planned"
        );
        for (i, p) in plans.iter().enumerate() {
            debug!(index = i, fire_time = p.fire_time, kind = p.kind.label(), effect = p.effect, "planned event");
        }

        self.fired = vec![false; count];
        self.plans = plans;
        self.state = Some(RoundState { round, act, tier, instrument, duration, window });
    }

    /// Fire every unfired plan whose time has come, then advance the ledger
    /// by `dt`. `instrument` is `None` when nothing is tradeable; due fires
    /// are then consumed without effect.
    pub fn update(&mut self, elapsed: f64, dt: f64, instrument: Option<InstrumentId>, tier: Tier) {
        let state = self.state.expect("update called before initialize_round");
        debug_assert_eq!(tier, state.tier, "tier changed mid-round");

        for index in 0..self.plans.len() {
            if self.fired[index] || self.plans[index].fire_time > elapsed {
                continue;
            }
            self.fired[index] = true;
            let Some(id) = instrument else {
                debug!(index, "no instrument; planned event dropped");
                continue;
            };
            let event = Self::instantiate(&self.plans[index], id);
            self.effects.add(event);
        }

        self.effects.advance(dt);
    }

    /// Fire one random event at `elapsed`, outside the plan. Uses the
    /// trigger stream for every draw. `None` when no instrument is tradeable.
    pub fn force_fire_random(
        &mut self,
        elapsed: f64,
        instrument: Option<InstrumentId>,
        tier: Tier,
    ) -> Option<(SlotId, PlannedEvent)> {
        let state = self.state.expect("force_fire_random called before initialize_round");
        let id = instrument?;
        let available = self.catalog.available_for(tier);

        let def = select_event(&available, self.rare_fired, self.config.max_rare_per_round, &mut self.trigger_rng);
        if def.is_rare() {
            self.rare_fired += 1;
        }
        let effect = resolve_effect(def, &self.modifiers, &mut self.trigger_rng);
        let plan = PlannedEvent {
            fire_time: elapsed,
            kind: def.kind,
            effect,
            positive: effect > 0.0,
            duration: def.duration,
            rare: def.is_rare(),
            phases: synthesize_phases(def.kind, effect, def.duration),
        };
        debug!(round = state.round.0, elapsed, kind = plan.kind.label(), effect, "forced fire");
        let slot = self.effects.add(Self::instantiate(&plan, id));
        Some((slot, plan))
    }

    fn instantiate(plan: &PlannedEvent, instrument: InstrumentId) -> MarketEvent {
        let target = if plan.kind.is_market_wide() {
            EventTarget::All
        } else {
            EventTarget::Instrument(instrument)
        };
        MarketEvent::new(plan.kind, target, plan.effect, plan.duration, plan.phases.clone())
    }
}
