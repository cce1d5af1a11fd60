//! Dry-run the allocation engine against a synthetic roster
//!
//! Runs one pass per selection strategy with fixed balances and totals,
//! printing the plans. No network, no CMS - purely the engine.

use std::collections::HashMap;

use taixiu::allocation::{build_plan, EngineOptions, PlanOutcome, RoundInputs};
use taixiu::cms::BetTotals;
use taixiu::config::{BetRange, Policy, PriorityTiers};
use taixiu::init_tracing;

fn roster() -> RoundInputs {
    let online: Vec<String> = [
        "trautuankiet",
        "mayman892",
        "taimom64",
        "t0569881312",
        "trandang64",
        "bichlua79",
        "caothu1888",
        "vuanohu247",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    let mut balances = HashMap::new();
    let mut totals = HashMap::new();
    for (i, user) in online.iter().enumerate() {
        balances.insert(user.clone(), 150_000 + 75_000 * i as i64);
        totals.insert(
            user.clone(),
            BetTotals {
                total_day: 20_000 * i as i64,
                total_week: 180_000 - 15_000 * i as i64,
                total_month: 400_000 + 10_000 * i as i64,
            },
        );
    }

    RoundInputs {
        online,
        balances,
        totals,
    }
}

fn main() {
    init_tracing();

    let inputs = roster();
    let opts = EngineOptions::default();
    let mut rng = rand::thread_rng();

    for strategy_id in 1..=11u8 {
        let policy = Policy {
            pause: false,
            bet_range: BetRange { start: 50, stop: 71, step: 10 },
            player_count: 8,
            strategy_id,
            tiers: PriorityTiers {
                tier1: vec!["mayman892".into()],
                tier2: vec!["taimom64".into(), "trandang64".into()],
                tier3: vec!["bichlua79".into()],
            },
        };

        println!("=== strategy {strategy_id} ===");
        match build_plan(&policy, &inputs, &mut rng, &opts) {
            PlanOutcome::Plan(plan) => {
                for a in &plan {
                    println!(
                        "  {:<14} {} {:>7}  (+{}s)",
                        a.username,
                        a.outcome,
                        a.amount,
                        a.delay.as_secs()
                    );
                }
            }
            PlanOutcome::Skipped(reason) => println!("  skipped: {reason}"),
            PlanOutcome::Infeasible { outcome, amount } => {
                println!("  infeasible at {outcome} {amount}")
            }
        }
    }
}
