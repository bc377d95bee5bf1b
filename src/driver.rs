use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::catalog::{Catalog, EventKind};
use crate::config::RoundConfig;
use crate::events::{EventLog, LoggedEvent, RoundEvent};
use crate::instrument::{Instrument, PriceModel, RandomWalk};
use crate::scheduler::{EventScheduler, PlannedEvent};
use crate::types::Tier;

/// Instrument price after a fixed step. Tick 0 is the opening price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub tick: u64,
    pub elapsed: f64,
    pub price: f64,
}

/// Everything a finished round produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub config: RoundConfig,
    pub plans: Vec<PlannedEvent>,
    pub samples: Vec<PriceSample>,
    pub log: EventLog,
}

impl RoundOutcome {
    pub fn terminal_price(&self) -> f64 {
        self.samples.last().map(|s| s.price).unwrap_or(self.config.walk.starting_price)
    }

    /// Price recorded at `tick`, clamped to the last sample.
    pub fn price_at_tick(&self, tick: u64) -> Option<f64> {
        let last = self.samples.len().checked_sub(1)?;
        Some(self.samples[(tick as usize).min(last)].price)
    }
}

/// Steps a round at a fixed cadence.
///
/// Frame time is only accumulated; the scheduler and price model see whole
/// fixed steps, and elapsed time is `tick × step` from an integer counter,
/// so the frame rate never influences which draws happen or in what order.
pub struct RoundDriver<M: PriceModel = RandomWalk> {
    config: RoundConfig,
    scheduler: EventScheduler,
    model: M,
    instrument: Instrument,
    total_steps: u64,
    tick: u64,
    accumulator: f64,
    samples: Vec<PriceSample>,
    log: EventLog,
}

impl RoundDriver<RandomWalk> {
    pub fn new(config: &RoundConfig) -> Self {
        let model = RandomWalk::new(config.walk.clone(), config.seeds.prices);
        Self::with_model(config, Catalog::default(), model)
    }
}

impl<M: PriceModel> RoundDriver<M> {
    /// Build the scheduler from `config`, apply its modifiers and plan the
    /// round.
    pub fn with_model(config: &RoundConfig, catalog: Catalog, model: M) -> Self {
        let mut scheduler = EventScheduler::from_seeds(
            config.scheduler.clone(),
            catalog,
            config.seeds.events,
            config.seeds.triggers,
        );
        scheduler.set_modifiers(config.modifiers);
        scheduler.initialize_round(config.round, config.act, config.tier, config.instrument, config.duration);

        let instrument = Instrument { id: config.instrument, price: config.walk.starting_price };

        let mut log = vec![LoggedEvent {
            elapsed: 0.0,
            event: RoundEvent::RoundStarted {
                round: config.round,
                act: config.act,
                tier: config.tier,
                event_count: scheduler.event_count(),
            },
        }];
        log.extend(scheduler.plans().iter().enumerate().map(|(index, plan)| LoggedEvent {
            elapsed: 0.0,
            event: RoundEvent::EventPlanned { index, plan: plan.clone() },
        }));

        RoundDriver {
            config: config.clone(),
            scheduler,
            model,
            instrument,
            total_steps: config.total_steps(),
            tick: 0,
            accumulator: 0.0,
            samples: vec![PriceSample { tick: 0, elapsed: 0.0, price: instrument.price }],
            log,
        }
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn tier(&self) -> Tier {
        self.config.tier
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> f64 {
        self.tick as f64 * self.config.fixed_step
    }

    pub fn is_finished(&self) -> bool {
        self.tick >= self.total_steps
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Feed one variable-length frame. Runs as many fixed steps as the
    /// accumulated time covers and returns how many ran.
    pub fn advance_frame(&mut self, frame_dt: f64) -> usize {
        self.accumulator += frame_dt.max(0.0);
        let mut ran = 0;
        while self.accumulator >= self.config.fixed_step && !self.is_finished() {
            self.accumulator -= self.config.fixed_step;
            self.step();
            ran += 1;
        }
        if self.is_finished() {
            self.accumulator = 0.0;
        }
        ran
    }

    /// One fixed step: fire due events, advance the ledger, then move the
    /// price. Firing first lets a new event shape this step's price.
    pub fn step(&mut self) {
        if self.is_finished() {
            return;
        }
        self.tick += 1;
        let dt = self.config.fixed_step;
        let elapsed = self.elapsed();

        self.scheduler.update(elapsed, dt, Some(self.instrument.id), self.config.tier);
        self.collect_notices(elapsed);
        self.model.update_price(&mut self.instrument, dt, self.scheduler.effects_mut());

        trace!(tick = self.tick, elapsed, price = self.instrument.price, "step");
        self.samples.push(PriceSample { tick: self.tick, elapsed, price: self.instrument.price });

        if self.is_finished() {
            info!(
                round = self.config.round.0,
                terminal_price = self.instrument.price,
                "round complete"
            );
            self.log.push(LoggedEvent {
                elapsed,
                event: RoundEvent::RoundEnded { terminal_price: self.instrument.price },
            });
        }
    }

    pub fn run_to_completion(&mut self) {
        while !self.is_finished() {
            self.step();
        }
    }

    /// Gameplay hook: fire one unplanned event now. It starts moving the
    /// price from the next step.
    pub fn force_fire_random(&mut self) -> Option<EventKind> {
        let elapsed = self.elapsed();
        let (_, plan) = self
            .scheduler
            .force_fire_random(elapsed, Some(self.instrument.id), self.config.tier)?;
        self.log.push(LoggedEvent { elapsed, event: RoundEvent::ForcedFire { kind: plan.kind } });
        self.collect_notices(elapsed);
        Some(plan.kind)
    }

    pub fn finish(self) -> RoundOutcome {
        RoundOutcome {
            plans: self.scheduler.plans().to_vec(),
            config: self.config,
            samples: self.samples,
            log: self.log,
        }
    }

    fn collect_notices(&mut self, elapsed: f64) {
        for event in self.scheduler.effects_mut().drain_notices() {
            self.log.push(LoggedEvent { elapsed, event });
        }
    }
}
