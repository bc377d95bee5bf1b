use std::fs::File;
use std::io::{BufWriter, Write};

use marketquake::analysis::{self, RoundStats, RoundViolation};
use marketquake::config::{RoundConfig, RoundSeeds};
use marketquake::driver::{RoundDriver, RoundOutcome};
use marketquake::replay::{self, Direction};
use marketquake::types::{Act, RoundNumber, Tier};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketquake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut seed_override: Option<u64> = None;
    let mut act_override: Option<u32> = None;
    let mut round_override: Option<u32> = None;
    let mut tier_override: Option<Tier> = None;
    let mut duration_override: Option<f64> = None;
    let mut config_path: Option<String> = None;
    let mut output_path = "events.ndjson".to_string();
    let mut prices_path: Option<String> = None;
    let mut frame_seed: Option<u64> = None;
    let mut runs: Option<u64> = None;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                i += 1;
                seed_override = Some(args[i].parse().expect("--seed requires a u64"));
            }
            "--act" => {
                i += 1;
                act_override = Some(args[i].parse().expect("--act requires a u32"));
            }
            "--round" => {
                i += 1;
                round_override = Some(args[i].parse().expect("--round requires a u32"));
            }
            "--tier" => {
                i += 1;
                tier_override = Some(
                    Tier::parse(&args[i])
                        .unwrap_or_else(|| panic!("--tier must be penny, small-cap, mid-cap or blue-chip, got {}", args[i])),
                );
            }
            "--duration" => {
                i += 1;
                duration_override = Some(args[i].parse().expect("--duration requires seconds"));
            }
            "--config" => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--output" => {
                i += 1;
                output_path = args[i].clone();
            }
            "--prices" => {
                i += 1;
                prices_path = Some(args[i].clone());
            }
            "--frame-jitter" => {
                i += 1;
                frame_seed = Some(args[i].parse().expect("--frame-jitter requires a u64 seed"));
            }
            "--runs" => {
                i += 1;
                runs = Some(args[i].parse().expect("--runs requires a positive integer"));
            }
            "--quiet" => quiet = true,
            other => warn!(arg = other, "ignoring unknown argument"),
        }
        i += 1;
    }

    let mut base_config = match &config_path {
        Some(path) => RoundConfig::from_json_file(path).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        }),
        None => RoundConfig::canonical(),
    };
    let start_seed = seed_override.unwrap_or(base_config.seeds.events);
    if seed_override.is_some() {
        base_config.seeds = RoundSeeds::from_seed(start_seed);
    }
    if let Some(a) = act_override {
        base_config.act = Act(a);
    }
    if let Some(r) = round_override {
        base_config.round = RoundNumber(r);
    }
    if let Some(t) = tier_override {
        base_config.tier = t;
    }
    if let Some(d) = duration_override {
        base_config.duration = d;
    }
    if let Err(e) = base_config.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    if let Some(n) = runs {
        use rayon::prelude::*;

        let all_stats: Vec<RoundStats> = (0u64..n)
            .into_par_iter()
            .map(|i| {
                let mut config = base_config.clone();
                config.seeds = RoundSeeds::from_seed(start_seed + i);
                let outcome = replay::replay_round(&config);
                let violations = analysis::verify_round(&outcome);
                if !violations.is_empty() {
                    warn!(seed = start_seed + i, violations = violations.len(), "round violates invariants");
                }
                analysis::analyse_round(&outcome)
            })
            .collect();

        if !quiet {
            print_all_runs(&all_stats, start_seed);
            if n < 2 {
                eprintln!("Warning: Distribution requires >= 2 runs");
            } else if let Some(dist) = analysis::analyse_distributions(&all_stats) {
                print_distributions(&dist, n);
            }
        }
    } else {
        let config = base_config;
        let live = play_live(&config, frame_seed.unwrap_or(start_seed));

        let file = File::create(&output_path).expect("failed to create output file");
        let mut writer = BufWriter::new(file);
        for e in &live.log {
            serde_json::to_writer(&mut writer, e).expect("failed to serialize event");
            writeln!(writer).expect("failed to write newline");
        }

        if let Some(ref path) = prices_path {
            write_prices_csv(&live, path);
        }

        let replayed = replay::replay_round(&config);
        match replay::verify_replay(&live, &replayed) {
            Ok(()) => info!(samples = live.samples.len(), "replay matches live round"),
            Err(e) => {
                eprintln!("error: replay diverged: {e}");
                std::process::exit(2);
            }
        }

        if !quiet {
            println!("Events logged: {}", live.log.len());
            println!("Terminal price: {:.4}", live.terminal_price());
            print_tips(&replayed);
            print_analysis(&live);
        }
    }
}

/// Drive a round with variable frame lengths, as a game loop would.
fn play_live(config: &RoundConfig, frame_seed: u64) -> RoundOutcome {
    let mut frames = ChaCha20Rng::seed_from_u64(frame_seed);
    let step = config.fixed_step;
    let mut driver = RoundDriver::new(config);
    while !driver.is_finished() {
        driver.advance_frame(frames.random_range(step * 0.25..step * 4.0));
    }
    driver.finish()
}

fn write_prices_csv(outcome: &RoundOutcome, path: &str) {
    let file = File::create(path).unwrap_or_else(|e| panic!("failed to create {path}: {e}"));
    let mut w = BufWriter::new(file);
    writeln!(w, "tick,elapsed,price").expect("write");
    for s in &outcome.samples {
        writeln!(w, "{},{:.6},{:.6}", s.tick, s.elapsed, s.price).expect("write");
    }
}

fn print_tips(outcome: &RoundOutcome) {
    let tips = replay::insider_tips(outcome);
    println!("\n=== Insider tips ===");
    println!(
        "{:>3} | {:>17} | {:>8} | {:>9} | {:>9} | {:>8} | {:>4}",
        "#", "Kind", "Fire(s)", "Before", "After", "Move%", "Dir"
    );
    println!("{}", "-".repeat(3 + 3 + 17 + 3 + 8 + 3 + 9 + 3 + 9 + 3 + 8 + 3 + 4));
    for t in &tips {
        let dir = match t.direction {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Flat => "flat",
        };
        println!(
            "{:>3} | {:>17} | {:>8.2} | {:>9.4} | {:>9.4} | {:>7.1}% | {:>4}",
            t.index,
            t.kind.label(),
            t.fire_time,
            t.price_before,
            t.price_after,
            t.change * 100.0,
            dir,
        );
    }
}

fn print_analysis(outcome: &RoundOutcome) {
    let violations = analysis::verify_round(outcome);

    let inv = |variant: fn(&RoundViolation) -> bool| {
        if violations.iter().any(variant) { "FAIL" } else { "PASS" }
    };

    println!("\n=== Round invariants ===");
    println!("  [1] Fire times inside window:   {}", inv(|v| matches!(v, RoundViolation::FireOutsideWindow { .. })));
    println!("  [2] Rare cap respected:         {}", inv(|v| matches!(v, RoundViolation::RareCapExceeded { .. })));
    println!("  [3] Fired on the due step:      {}", inv(|v| matches!(v, RoundViolation::FireTiming { .. })));
    println!("  [4] Every due plan fired:       {}", inv(|v| matches!(v, RoundViolation::NeverFired { .. })));
    println!("  [5] Ends match starts:          {}", inv(|v| matches!(v, RoundViolation::EndWithoutStart { .. })));
    println!("  [6] Phases span the duration:   {}", inv(|v| matches!(v, RoundViolation::PhaseDurationMismatch { .. })));

    if violations.is_empty() {
        println!("  All round invariants: PASS");
    } else {
        println!("\n  {} violation(s):", violations.len());
        for v in &violations {
            println!("    {v}");
        }
    }

    let s = analysis::analyse_round(outcome);
    println!("\n=== Round summary ===");
    println!("  Open / close:     {:.4} / {:.4} ({:+.2}%)", s.open, s.close, s.terminal_return * 100.0);
    println!("  Low / high:       {:.4} / {:.4}", s.low, s.high);
    println!("  Max drawdown:     {:.2}%", s.max_drawdown * 100.0);
    println!("  Planned / rare:   {} / {}", s.planned, s.rare_planned);
    println!("  Started / forced: {} / {}", s.started, s.forced);
    for (kind, n) in &s.started_by_kind {
        println!("    {:<17} {n}", kind.label());
    }
}

fn print_all_runs(all_stats: &[RoundStats], start_seed: u64) {
    println!("\n=== Per-Run Data ===");
    println!(
        "{:>6} | {:>8} | {:>8} | {:>8} | {:>7} | {:>5} | {:>5}",
        "Seed", "Open", "Close", "Return%", "MaxDD%", "Plan#", "Rare#"
    );
    println!("{}", "-".repeat(66));
    for (i, s) in all_stats.iter().enumerate() {
        println!(
            "{:>6} | {:>8.4} | {:>8.4} | {:>7.2}% | {:>6.2}% | {:>5} | {:>5}",
            start_seed + i as u64,
            s.open,
            s.close,
            s.terminal_return * 100.0,
            s.max_drawdown * 100.0,
            s.planned,
            s.rare_planned,
        );
    }
}

fn print_dist_row(name: &str, ds: &analysis::DistStats, scale: f64) {
    println!(
        "{:>8} | {:>7.2} | {:>7.2} | {:>7.2} | {:>7.2} | {:>7.2} | {:>7.2} | {:>7.2} | {:>7.2} | {:>7.2}",
        name,
        ds.min * scale,
        ds.p5 * scale,
        ds.p25 * scale,
        ds.p50 * scale,
        ds.p75 * scale,
        ds.p95 * scale,
        ds.max * scale,
        ds.mean * scale,
        ds.std_dev * scale,
    );
}

fn print_distributions(dist: &analysis::RunDist, n_runs: u64) {
    println!("\n=== Multi-Run Distribution (N={n_runs} runs) ===");
    println!(
        "{:>8} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7}",
        "", "min", "p5", "p25", "p50", "p75", "p95", "max", "mean", "stddev"
    );
    print_dist_row("Return%", &dist.terminal_return, 100.0);
    print_dist_row("MaxDD%", &dist.max_drawdown, 100.0);

    println!("\n--- Discrete Counts (p50 | max | mean) ---");
    println!("  Planned: {:>3} | {:>3} | {:.2}", dist.planned.p50, dist.planned.max, dist.planned.mean);
    println!("  Rare:    {:>3} | {:>3} | {:.2}", dist.rare_planned.p50, dist.rare_planned.max, dist.rare_planned.mean);
}
