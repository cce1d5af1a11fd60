//! The allocation pass
//!
//! Binds a round's sized chunks to accounts, largest chunk first, under
//! the policy-selected strategy. Balances are a private working copy:
//! each binding debits it so later chunks of the same round see the
//! money as spent, and nothing leaks across rounds.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::{Rng, RngCore};
use tracing::{info, warn};

use crate::cms::BetTotals;
use crate::config::Policy;

use super::split::draw_round_stakes;
use super::strategy::{selector_for, SelectionContext};
use super::{Assignment, EngineOptions, PlanOutcome, SkipReason};

/// Leftovers under this floor are swept into the bet itself
pub const DUST_FLOOR: i64 = 10_000;

/// Everything the pass needs, gathered before it starts
#[derive(Debug, Default)]
pub struct RoundInputs {
    /// Currently connected accounts, in registry order
    pub online: Vec<String>,
    /// Fresh balances fetched at round start
    pub balances: HashMap<String, i64>,
    /// Cumulative stake totals; empty when the strategy ignores them
    pub totals: HashMap<String, BetTotals>,
}

/// Run one full allocation pass
pub fn build_plan(
    policy: &Policy,
    inputs: &RoundInputs,
    rng: &mut dyn RngCore,
    opts: &EngineOptions,
) -> PlanOutcome {
    if policy.pause {
        return PlanOutcome::Skipped(SkipReason::Paused);
    }

    let mut stakes = match draw_round_stakes(policy, rng, opts.resample_cap) {
        Ok(stakes) => stakes,
        Err(reason) => return PlanOutcome::Skipped(reason),
    };

    if stakes.len() > inputs.online.len() {
        warn!(
            "{} chunks for {} online accounts, skipping round",
            stakes.len(),
            inputs.online.len()
        );
        return PlanOutcome::Skipped(SkipReason::TooFewAccounts);
    }

    // Largest chunks claim accounts first
    stakes.sort_by_key(|s| Reverse(s.amount));

    let selector = selector_for(policy.strategy_id);
    let mut balances = inputs.balances.clone();
    let mut used: HashSet<String> = HashSet::new();
    let mut plan = Vec::with_capacity(stakes.len());

    for stake in &stakes {
        let ctx = SelectionContext {
            online: &inputs.online,
            balances: &balances,
            used: &used,
            tiers: &policy.tiers,
            totals: &inputs.totals,
        };
        let Some(username) = selector.select(stake.amount, &ctx, rng) else {
            warn!(
                "no account can cover {} {}, discarding the round's plan",
                stake.outcome, stake.amount
            );
            return PlanOutcome::Infeasible {
                outcome: stake.outcome,
                amount: stake.amount,
            };
        };

        let before = balances.get(&username).copied().unwrap_or(0);
        let mut amount = stake.amount;
        if before - amount < DUST_FLOOR {
            // Dust sweep: never strand a sub-floor remainder
            amount = before;
        }
        let after = before - amount;

        used.insert(username.clone());
        balances.insert(username.clone(), after);

        let delay = Duration::from_secs(rng.gen_range(opts.delay_range.clone()));
        info!(
            "{username}: {} {amount} ({before} -> {after}), delivery in {}s",
            stake.outcome,
            delay.as_secs()
        );
        plan.push(Assignment {
            username,
            amount,
            outcome: stake.outcome,
            delay,
        });
    }

    PlanOutcome::Plan(plan)
}
