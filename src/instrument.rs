use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

use crate::config::PriceWalkConfig;
use crate::effects::EventEffects;
use crate::types::InstrumentId;

/// The round's tradeable instrument. The price generator writes `price`;
/// the effect ledger only reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instrument {
    pub id: InstrumentId,
    pub price: f64,
}

/// Baseline price generator contract: advance one instrument by `dt`,
/// consulting the effect ledger for event targets before committing the
/// stochastic step.
pub trait PriceModel {
    fn update_price(&mut self, instrument: &mut Instrument, dt: f64, effects: &mut EventEffects);
}

/// Geometric random walk with event anchoring.
///
/// Exactly one Normal draw per call whether or not events are active, so
/// the price stream's consumption never depends on event timing.
pub struct RandomWalk {
    config: PriceWalkConfig,
    rng: ChaCha20Rng,
    normal: Normal<f64>,
}

impl RandomWalk {
    pub fn new(config: PriceWalkConfig, seed: u64) -> Self {
        RandomWalk {
            config,
            rng: ChaCha20Rng::seed_from_u64(seed),
            normal: Normal::new(0.0, 1.0).expect("standard normal"),
        }
    }
}

impl PriceModel for RandomWalk {
    fn update_price(&mut self, instrument: &mut Instrument, dt: f64, effects: &mut EventEffects) {
        let z = self.normal.sample(&mut self.rng);
        let targets = effects.event_targets(instrument);

        let next = if targets.is_empty() {
            let sigma = self.config.volatility;
            let log_step = (self.config.drift - 0.5 * sigma * sigma) * dt + sigma * dt.sqrt() * z;
            instrument.price * log_step.exp()
        } else {
            // Sequential sum keeps the float order fixed.
            let mut sum = 0.0;
            for t in &targets {
                sum += t;
            }
            let anchor = sum / targets.len() as f64;
            anchor * (1.0 + self.config.event_jitter * z)
        };

        instrument.price = next.max(self.config.min_price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EventKind;
    use crate::market_event::MarketEvent;
    use crate::types::EventTarget;

    fn walk(seed: u64) -> RandomWalk {
        RandomWalk::new(PriceWalkConfig::default(), seed)
    }

    fn instrument() -> Instrument {
        Instrument { id: InstrumentId(1), price: 10.0 }
    }

    #[test]
    fn same_seed_same_path() {
        let run = || {
            let mut w = walk(7);
            let mut fx = EventEffects::new();
            let mut inst = instrument();
            (0..600)
                .map(|_| {
                    w.update_price(&mut inst, 1.0 / 60.0, &mut fx);
                    inst.price
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn price_never_drops_below_floor() {
        let config = PriceWalkConfig { volatility: 5.0, ..PriceWalkConfig::default() };
        let mut w = RandomWalk::new(config.clone(), 3);
        let mut fx = EventEffects::new();
        let mut inst = Instrument { id: InstrumentId(1), price: config.min_price };
        for _ in 0..1_000 {
            w.update_price(&mut inst, 0.1, &mut fx);
            assert!(inst.price >= config.min_price);
        }
    }

    #[test]
    fn active_event_pulls_price_to_target() {
        let config = PriceWalkConfig { event_jitter: 0.0, ..PriceWalkConfig::default() };
        let mut w = RandomWalk::new(config, 1);
        let mut fx = EventEffects::new();
        fx.add(MarketEvent::new(
            EventKind::FlashCrash,
            EventTarget::Instrument(InstrumentId(1)),
            -0.3,
            10.0,
            None,
        ));
        fx.advance(5.0);
        let mut inst = instrument();
        w.update_price(&mut inst, 1.0 / 60.0, &mut fx);
        assert!((inst.price - 7.0).abs() < 1e-9, "got {}", inst.price);
    }

    #[test]
    fn event_does_not_shift_the_random_stream() {
        // Identical draws with and without an event: after the event retires
        // both walks continue from their own price with the same increments.
        let mut quiet = walk(11);
        let mut busy = walk(11);
        let mut fx_quiet = EventEffects::new();
        let mut fx_busy = EventEffects::new();
        fx_busy.add(MarketEvent::new(
            EventKind::Rumor,
            EventTarget::Instrument(InstrumentId(1)),
            0.05,
            0.5,
            None,
        ));
        let mut a = instrument();
        let mut b = instrument();
        for _ in 0..60 {
            fx_busy.advance(1.0 / 60.0);
            quiet.update_price(&mut a, 1.0 / 60.0, &mut fx_quiet);
            busy.update_price(&mut b, 1.0 / 60.0, &mut fx_busy);
        }
        let za = quiet.normal.sample(&mut quiet.rng);
        let zb = busy.normal.sample(&mut busy.rng);
        assert_eq!(za, zb);
    }
}
