//! Offline re-evaluation of a round and the "insider tips" derived from it.
//!
//! A replay builds a fresh driver from the same config and steps it at the
//! same fixed cadence, so its plans and price samples are bit-identical to
//! the live round's.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::EventKind;
use crate::config::RoundConfig;
use crate::driver::{RoundDriver, RoundOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

/// What a planned event will do to the price, known before the round plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTip {
    pub index: usize,
    pub kind: EventKind,
    pub fire_time: f64,
    /// Last price before the event's firing step.
    pub price_before: f64,
    /// Price at the first step at or after the event's end.
    pub price_after: f64,
    pub change: f64,
    pub direction: Direction,
}

#[derive(Debug, Error, PartialEq)]
pub enum ReplayDivergence {
    #[error("plan count differs: live {live}, replay {replay}")]
    PlanCount { live: usize, replay: usize },
    #[error("plan {index} differs between live and replay")]
    Plan { index: usize },
    #[error("sample count differs: live {live}, replay {replay}")]
    SampleCount { live: usize, replay: usize },
    #[error("price diverges at tick {tick}: live {live}, replay {replay}")]
    Price { tick: u64, live: f64, replay: f64 },
}

/// Run `config` to completion at its fixed step with no frame input.
pub fn replay_round(config: &RoundConfig) -> RoundOutcome {
    let mut driver = RoundDriver::new(config);
    driver.run_to_completion();
    driver.finish()
}

/// One tip per planned event, read off a finished (usually replayed) round.
pub fn insider_tips(outcome: &RoundOutcome) -> Vec<InsiderTip> {
    let step = outcome.config.fixed_step;
    outcome
        .plans
        .iter()
        .enumerate()
        .filter_map(|(index, plan)| {
            let fire_tick = (plan.fire_time / step).ceil() as u64;
            let end_tick = (plan.end_time() / step).ceil() as u64;
            let price_before = outcome.price_at_tick(fire_tick.saturating_sub(1))?;
            let price_after = outcome.price_at_tick(end_tick)?;
            let change = price_after / price_before - 1.0;
            let direction = if change > 1e-9 {
                Direction::Up
            } else if change < -1e-9 {
                Direction::Down
            } else {
                Direction::Flat
            };
            Some(InsiderTip {
                index,
                kind: plan.kind,
                fire_time: plan.fire_time,
                price_before,
                price_after,
                change,
                direction,
            })
        })
        .collect()
}

/// Replay `config` and derive its tips.
pub fn predict_round(config: &RoundConfig) -> Vec<InsiderTip> {
    insider_tips(&replay_round(config))
}

/// Check a live round against its replay: same plans, same samples,
/// bit for bit.
pub fn verify_replay(live: &RoundOutcome, replay: &RoundOutcome) -> Result<(), ReplayDivergence> {
    if live.plans.len() != replay.plans.len() {
        return Err(ReplayDivergence::PlanCount { live: live.plans.len(), replay: replay.plans.len() });
    }
    if let Some(index) = live.plans.iter().zip(&replay.plans).position(|(a, b)| a != b) {
        return Err(ReplayDivergence::Plan { index });
    }
    if live.samples.len() != replay.samples.len() {
        return Err(ReplayDivergence::SampleCount {
            live: live.samples.len(),
            replay: replay.samples.len(),
        });
    }
    for (a, b) in live.samples.iter().zip(&replay.samples) {
        if a.price.to_bits() != b.price.to_bits() {
            return Err(ReplayDivergence::Price { tick: a.tick, live: a.price, replay: b.price });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RoundConfig {
        RoundConfig { duration: 30.0, fixed_step: 0.05, ..RoundConfig::canonical() }
    }

    #[test]
    fn replay_is_bit_identical() {
        let c = config();
        assert_eq!(verify_replay(&replay_round(&c), &replay_round(&c)), Ok(()));
    }

    #[test]
    fn different_seed_is_detected() {
        let a = replay_round(&config());
        let mut other = config();
        other.seeds.prices += 1;
        let b = replay_round(&other);
        assert!(matches!(verify_replay(&a, &b), Err(ReplayDivergence::Price { .. })));
    }

    #[test]
    fn different_plan_seed_is_detected() {
        let a = replay_round(&config());
        let mut found = false;
        for bump in 1..20 {
            let mut other = config();
            other.seeds.events += bump;
            let b = replay_round(&other);
            match verify_replay(&a, &b) {
                Err(ReplayDivergence::PlanCount { .. }) | Err(ReplayDivergence::Plan { .. }) => {
                    found = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(found, "changing the event seed must change the plans");
    }

    #[test]
    fn one_tip_per_plan() {
        let outcome = replay_round(&config());
        let tips = insider_tips(&outcome);
        assert_eq!(tips.len(), outcome.plans.len());
        for (tip, plan) in tips.iter().zip(&outcome.plans) {
            assert_eq!(tip.kind, plan.kind);
            assert!(tip.price_before > 0.0 && tip.price_after > 0.0);
        }
    }

    #[test]
    fn tips_follow_two_act_final_ratio() {
        // Quiet walk so the event dominates.
        for seed in 0..300 {
            let mut c = RoundConfig { duration: 60.0, fixed_step: 0.05, ..RoundConfig::canonical() };
            c.seeds = crate::config::RoundSeeds::from_seed(seed);
            c.walk.volatility = 0.0;
            c.walk.event_jitter = 0.0;
            let outcome = replay_round(&c);
            let tips = insider_tips(&outcome);
            for (tip, plan) in tips.iter().zip(&outcome.plans) {
                let overlaps = outcome
                    .plans
                    .iter()
                    .any(|o| o != plan && o.fire_time < plan.end_time() && o.end_time() > plan.fire_time);
                if plan.kind == EventKind::CrashAndRecover && !overlaps && plan.end_time() < c.duration {
                    assert!((tip.change - (0.95 - 1.0)).abs() < 0.02, "change {}", tip.change);
                    assert_eq!(tip.direction, Direction::Down);
                    return;
                }
            }
        }
        panic!("no isolated crash-and-recover in 300 seeds");
    }

    #[test]
    fn predict_matches_live_tips() {
        let c = config();
        let mut live = RoundDriver::new(&c);
        while !live.is_finished() {
            live.advance_frame(1.0 / 144.0);
        }
        let live = live.finish();
        assert_eq!(insider_tips(&live), predict_round(&c));
    }
}
