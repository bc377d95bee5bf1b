use std::collections::BTreeMap;
use std::env;

use marketquake::catalog::default_catalog;
use marketquake::config::{RoundConfig, RoundSeeds};
use marketquake::scheduler::EventScheduler;
use marketquake::types::Tier;
use serde::Serialize;

#[derive(Serialize)]
struct PlanRow<'a> {
    seed: u64,
    index: usize,
    #[serde(flatten)]
    plan: &'a marketquake::scheduler::PlannedEvent,
}

/// Usage: plan_catalog [N] [tier]
fn main() {
    let config = RoundConfig::canonical();

    let n_seeds: u64 = env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let tier = env::args().nth(2).and_then(|s| Tier::parse(&s)).unwrap_or(config.tier);
    let start_seed = config.seeds.events;

    let mut kind_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut kind_sum_effect: BTreeMap<&str, f64> = BTreeMap::new();
    let mut kind_max_abs: BTreeMap<&str, f64> = BTreeMap::new();
    let mut total = 0;
    let mut rare = 0;

    for seed in start_seed..start_seed + n_seeds {
        let seeds = RoundSeeds::from_seed(seed);
        let mut scheduler =
            EventScheduler::from_seeds(config.scheduler.clone(), default_catalog(), seeds.events, seeds.triggers);
        scheduler.set_modifiers(config.modifiers);
        scheduler.initialize_round(config.round, config.act, tier, config.instrument, config.duration);

        // Write NDJSON to stdout.
        for (index, plan) in scheduler.plans().iter().enumerate() {
            let row = PlanRow { seed, index, plan };
            println!("{}", serde_json::to_string(&row).expect("serialisation failed"));

            let k = plan.kind.label();
            *kind_counts.entry(k).or_insert(0) += 1;
            *kind_sum_effect.entry(k).or_insert(0.0) += plan.effect;
            let cur = kind_max_abs.entry(k).or_insert(0.0);
            if plan.effect.abs() > *cur {
                *cur = plan.effect.abs();
            }
            if plan.rare {
                rare += 1;
            }
            total += 1;
        }
    }

    eprintln!(
        "plan_catalog: {n_seeds} seeds, tier={tier:?}, act={}, {total} events ({:.2}/round), {rare} rare",
        config.act.0,
        total as f64 / n_seeds.max(1) as f64,
    );
    for (k, n) in &kind_counts {
        let mean = kind_sum_effect[k] / *n as f64;
        let max = kind_max_abs[k];
        eprintln!("  kind={k:<18}  events={n:>5}  mean_effect={mean:+.4}  max_abs={max:.4}");
    }
}
