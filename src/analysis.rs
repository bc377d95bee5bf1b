use std::collections::BTreeMap;

use crate::catalog::EventKind;
use crate::driver::RoundOutcome;
use crate::events::RoundEvent;
use crate::phases::total_duration;
use crate::scheduler::ScheduleWindow;
use crate::types::SlotId;

/// Per-round summary derived from a finished round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundStats {
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    /// Largest peak-to-trough fall, as a fraction of the peak.
    pub max_drawdown: f64,
    /// close / open - 1.
    pub terminal_return: f64,
    pub planned: u32,
    /// EventStarted count, planned and forced.
    pub started: u32,
    pub forced: u32,
    pub rare_planned: u32,
    pub started_by_kind: BTreeMap<EventKind, u32>,
}

pub fn analyse_round(outcome: &RoundOutcome) -> RoundStats {
    let prices: Vec<f64> = outcome.samples.iter().map(|s| s.price).collect();
    let open = prices.first().copied().unwrap_or(outcome.config.walk.starting_price);
    let close = prices.last().copied().unwrap_or(open);

    let mut low = open;
    let mut high = open;
    let mut peak = open;
    let mut max_drawdown = 0.0_f64;
    for &p in &prices {
        low = low.min(p);
        high = high.max(p);
        peak = peak.max(p);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max(1.0 - p / peak);
        }
    }

    let mut started = 0;
    let mut forced = 0;
    let mut started_by_kind = BTreeMap::new();
    for e in &outcome.log {
        match &e.event {
            RoundEvent::EventStarted { kind, .. } => {
                started += 1;
                *started_by_kind.entry(*kind).or_insert(0) += 1;
            }
            RoundEvent::ForcedFire { .. } => forced += 1,
            _ => {}
        }
    }

    RoundStats {
        open,
        close,
        low,
        high,
        max_drawdown,
        terminal_return: if open > 0.0 { close / open - 1.0 } else { 0.0 },
        planned: outcome.plans.len() as u32,
        started,
        forced,
        rare_planned: outcome.plans.iter().filter(|p| p.rare).count() as u32,
        started_by_kind,
    }
}

// ── Round invariants ──────────────────────────────────────────────────────────

/// A scheduling invariant broken by a finished round.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundViolation {
    /// A plan's fire time lies outside the scheduling window.
    FireOutsideWindow { index: usize, fire_time: f64, window: ScheduleWindow },
    /// More rare plans than the per-round cap.
    RareCapExceeded { rare: u32, cap: u32 },
    /// A planned event started before its fire time or more than one step after it.
    FireTiming { index: usize, fire_time: f64, started_at: f64 },
    /// A plan due before the round ended never started.
    NeverFired { index: usize, fire_time: f64 },
    /// EventEnded for a slot that never started.
    EndWithoutStart { slot: usize },
    /// Phase durations do not add up to the event duration.
    PhaseDurationMismatch { index: usize, phases: f64, duration: f64 },
}

impl std::fmt::Display for RoundViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FireOutsideWindow { index, fire_time, window } => {
                write!(f, "FireOutsideWindow plan={index}: fire_time={fire_time:.3} window=[{:.3}, {:.3})", window.start, window.end)
            }
            Self::RareCapExceeded { rare, cap } => {
                write!(f, "RareCapExceeded: rare={rare} cap={cap}")
            }
            Self::FireTiming { index, fire_time, started_at } => {
                write!(f, "FireTiming plan={index}: fire_time={fire_time:.3} started_at={started_at:.3}")
            }
            Self::NeverFired { index, fire_time } => {
                write!(f, "NeverFired plan={index}: fire_time={fire_time:.3}")
            }
            Self::EndWithoutStart { slot } => {
                write!(f, "EndWithoutStart slot={slot}")
            }
            Self::PhaseDurationMismatch { index, phases, duration } => {
                write!(f, "PhaseDurationMismatch plan={index}: phases={phases:.6} duration={duration:.6}")
            }
        }
    }
}

/// Check a finished round against its own plan. Returns one item per
/// violation found.
pub fn verify_round(outcome: &RoundOutcome) -> Vec<RoundViolation> {
    let mut violations = Vec::new();
    let config = &outcome.config;
    let window = ScheduleWindow::for_round(config.duration, &config.scheduler);

    let mut rare = 0;
    for (index, plan) in outcome.plans.iter().enumerate() {
        if plan.fire_time < window.start || plan.fire_time >= window.end {
            violations.push(RoundViolation::FireOutsideWindow { index, fire_time: plan.fire_time, window });
        }
        if plan.rare {
            rare += 1;
        }
        if let Some(phases) = &plan.phases {
            let total = total_duration(phases);
            if (total - plan.duration).abs() > 1e-9 {
                violations.push(RoundViolation::PhaseDurationMismatch { index, phases: total, duration: plan.duration });
            }
        }
    }
    if rare > config.scheduler.max_rare_per_round {
        violations.push(RoundViolation::RareCapExceeded { rare, cap: config.scheduler.max_rare_per_round });
    }

    // Planned events start in plan order; an EventStarted right after a
    // ForcedFire belongs to the hook, not the plan.
    let mut next_plan = 0;
    let mut after_forced = false;
    let mut started: Vec<SlotId> = Vec::new();
    for e in &outcome.log {
        match &e.event {
            RoundEvent::ForcedFire { .. } => after_forced = true,
            RoundEvent::EventStarted { slot, .. } => {
                started.push(*slot);
                if after_forced {
                    after_forced = false;
                    continue;
                }
                if let Some(plan) = outcome.plans.get(next_plan) {
                    let late = e.elapsed >= plan.fire_time + config.fixed_step + 1e-9;
                    if e.elapsed < plan.fire_time || late {
                        violations.push(RoundViolation::FireTiming {
                            index: next_plan,
                            fire_time: plan.fire_time,
                            started_at: e.elapsed,
                        });
                    }
                }
                next_plan += 1;
            }
            RoundEvent::EventEnded { slot, .. } => {
                if !started.contains(slot) {
                    violations.push(RoundViolation::EndWithoutStart { slot: slot.0 });
                }
            }
            _ => {}
        }
    }
    for (index, plan) in outcome.plans.iter().enumerate().skip(next_plan) {
        if plan.fire_time <= config.duration {
            violations.push(RoundViolation::NeverFired { index, fire_time: plan.fire_time });
        }
    }

    violations
}

// ── Cross-run distributions ───────────────────────────────────────────────────

/// Distribution statistics for a continuous metric across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Distribution statistics for an integer count (p50 + max are sufficient).
#[derive(Debug, Clone, PartialEq)]
pub struct CountDist {
    pub n: usize,
    pub p50: u32,
    pub max: u32,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunDist {
    pub terminal_return: DistStats,
    pub max_drawdown: DistStats,
    pub planned: CountDist,
    pub rare_planned: CountDist,
}

/// Linear interpolation between closest ranks of an ascending slice.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn percentile_stats(values: &mut [f64]) -> Option<DistStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    // Sample variance; a single run has no spread.
    let variance = match n {
        1 => 0.0,
        _ => values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64,
    };

    Some(DistStats {
        n,
        min: values[0],
        p5: quantile(values, 0.05),
        p25: quantile(values, 0.25),
        p50: quantile(values, 0.50),
        p75: quantile(values, 0.75),
        p95: quantile(values, 0.95),
        max: values[n - 1],
        mean,
        std_dev: variance.sqrt(),
    })
}

fn count_dist(values: &[u32]) -> Option<CountDist> {
    let mut sorted: Vec<f64> = values.iter().map(|&x| x as f64).collect();
    sorted.sort_by(f64::total_cmp);
    let max = *values.iter().max()?;
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    Some(CountDist { n: sorted.len(), p50: quantile(&sorted, 0.5).round() as u32, max, mean })
}

/// Cross-run distributions. `None` when `runs` is empty.
pub fn analyse_distributions(runs: &[RoundStats]) -> Option<RunDist> {
    let mut returns: Vec<f64> = runs.iter().map(|r| r.terminal_return).collect();
    let mut drawdowns: Vec<f64> = runs.iter().map(|r| r.max_drawdown).collect();
    let planned: Vec<u32> = runs.iter().map(|r| r.planned).collect();
    let rare: Vec<u32> = runs.iter().map(|r| r.rare_planned).collect();
    Some(RunDist {
        terminal_return: percentile_stats(&mut returns)?,
        max_drawdown: percentile_stats(&mut drawdowns)?,
        planned: count_dist(&planned)?,
        rare_planned: count_dist(&rare)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RoundConfig, RoundSeeds};
    use crate::driver::{PriceSample, RoundDriver};
    use crate::events::LoggedEvent;
    use crate::replay::replay_round;
    use crate::types::EventTarget;

    fn outcome() -> RoundOutcome {
        replay_round(&RoundConfig { duration: 30.0, fixed_step: 0.05, ..RoundConfig::canonical() })
    }

    #[test]
    fn clean_round_has_no_violations() {
        let violations = verify_round(&outcome());
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn round_with_forced_fires_has_no_violations() {
        let config = RoundConfig { duration: 30.0, fixed_step: 0.05, ..RoundConfig::canonical() };
        let mut driver = RoundDriver::new(&config);
        driver.advance_frame(2.0);
        driver.force_fire_random();
        driver.advance_frame(10.0);
        driver.force_fire_random();
        driver.run_to_completion();
        let outcome = driver.finish();
        let violations = verify_round(&outcome);
        assert!(violations.is_empty(), "{violations:?}");
        assert_eq!(analyse_round(&outcome).forced, 2);
    }

    #[test]
    fn detects_tampered_fire_time() {
        let mut o = outcome();
        o.plans[0].fire_time = o.config.duration + 1.0;
        let violations = verify_round(&o);
        assert!(violations.iter().any(|v| matches!(v, RoundViolation::FireOutsideWindow { index: 0, .. })));
        assert!(violations.iter().any(|v| matches!(v, RoundViolation::FireTiming { index: 0, .. })));
    }

    #[test]
    fn detects_phase_mismatch_and_rare_cap() {
        let mut o = outcome();
        o.plans[0].phases = Some(vec![crate::phases::EventPhase { target_percent: -0.1, phase_duration: 1.0 }]);
        for p in &mut o.plans {
            p.rare = true;
        }
        let violations = verify_round(&o);
        assert!(violations.iter().any(|v| matches!(v, RoundViolation::PhaseDurationMismatch { index: 0, .. })));
        if o.plans.len() > 1 {
            assert!(violations.iter().any(|v| matches!(v, RoundViolation::RareCapExceeded { .. })));
        }
    }

    #[test]
    fn detects_orphan_end() {
        let mut o = outcome();
        o.log.push(LoggedEvent {
            elapsed: 1.0,
            event: RoundEvent::EventEnded { slot: SlotId(999), kind: EventKind::Rumor, target: EventTarget::All },
        });
        let violations = verify_round(&o);
        assert!(violations.contains(&RoundViolation::EndWithoutStart { slot: 999 }));
        assert!(violations.iter().any(|v| v.to_string().starts_with("EndWithoutStart")));
    }

    #[test]
    fn stats_track_drawdown_and_return() {
        let mut o = outcome();
        o.samples = [10.0, 12.0, 9.0, 11.0]
            .iter()
            .enumerate()
            .map(|(i, &price)| PriceSample { tick: i as u64, elapsed: i as f64, price })
            .collect();
        let stats = analyse_round(&o);
        assert_eq!(stats.open, 10.0);
        assert_eq!(stats.close, 11.0);
        assert_eq!(stats.low, 9.0);
        assert_eq!(stats.high, 12.0);
        assert!((stats.max_drawdown - 0.25).abs() < 1e-12);
        assert!((stats.terminal_return - 0.1).abs() < 1e-12);
    }

    #[test]
    fn started_counts_match_plans_without_hooks() {
        let o = outcome();
        let stats = analyse_round(&o);
        assert_eq!(stats.started, stats.planned);
        assert_eq!(stats.started_by_kind.values().sum::<u32>(), stats.started);
    }

    #[test]
    fn quantile_interpolates_between_ranks() {
        let sorted = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(quantile(&sorted, 0.0), 0.0);
        assert_eq!(quantile(&sorted, 1.0), 30.0);
        assert!((quantile(&sorted, 0.5) - 15.0).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.95), 7.0);
    }

    #[test]
    fn single_run_has_no_spread() {
        let mut values = vec![-0.12];
        let ds = percentile_stats(&mut values).unwrap();
        assert_eq!((ds.min, ds.p50, ds.max), (-0.12, -0.12, -0.12));
        assert_eq!(ds.std_dev, 0.0);
    }

    #[test]
    fn empty_runs_have_no_distribution() {
        assert!(percentile_stats(&mut []).is_none());
        assert!(count_dist(&[]).is_none());
        assert!(analyse_distributions(&[]).is_none());
    }

    #[test]
    fn planned_count_median_rounds_half_up() {
        let cd = count_dist(&[6, 3]).unwrap();
        assert_eq!((cd.p50, cd.max), (5, 6));
        assert!((cd.mean - 4.5).abs() < 1e-12);
    }

    #[test]
    fn distributions_over_replayed_rounds() {
        let stats: Vec<RoundStats> = (0..8u64)
            .map(|seed| {
                let config = RoundConfig {
                    seeds: RoundSeeds::from_seed(seed),
                    duration: 30.0,
                    fixed_step: 0.05,
                    ..RoundConfig::canonical()
                };
                analyse_round(&replay_round(&config))
            })
            .collect();
        let dist = analyse_distributions(&stats).unwrap();

        let r = &dist.terminal_return;
        assert_eq!(r.n, stats.len());
        assert!(r.min <= r.p5 && r.p5 <= r.p25 && r.p25 <= r.p50);
        assert!(r.p50 <= r.p75 && r.p75 <= r.p95 && r.p95 <= r.max);
        let lowest = stats.iter().map(|s| s.terminal_return).fold(f64::INFINITY, f64::min);
        assert_eq!(r.min, lowest);
        assert!(r.std_dev > 0.0, "distinct seeds should not all close at the same price");

        let dd = &dist.max_drawdown;
        assert!(dd.min >= 0.0 && dd.max <= 1.0);

        // Penny act 1: base roll 2..=4 scaled by 1.5.
        let p = &dist.planned;
        assert_eq!(p.n, stats.len());
        assert!(p.max <= 6 && p.p50 >= 3, "planned p50 {} max {}", p.p50, p.max);
        assert_eq!(p.max, stats.iter().map(|s| s.planned).max().unwrap());
        assert!(dist.rare_planned.max <= 1);
    }
}
