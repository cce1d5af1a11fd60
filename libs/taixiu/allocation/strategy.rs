//! Account selection strategies
//!
//! Eleven policies decide which online account takes a given chunk.
//! Each is a small `Selector` implementation; the active one is resolved
//! from configuration by id. They differ only in how the candidate
//! ordering is built; the contract is shared:
//!
//! - only online, not-yet-used accounts are ever returned;
//! - the chosen account's balance covers the chunk;
//! - returning `None` aborts the whole round's plan upstream.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::cms::BetTotals;
use crate::config::PriorityTiers;

/// Read-only view of the round state a selector may consult
pub struct SelectionContext<'a> {
    /// Online accounts, in registry order
    pub online: &'a [String],
    /// Working balances, already debited by earlier chunks of this round
    pub balances: &'a HashMap<String, i64>,
    /// Accounts already bound to a chunk this round
    pub used: &'a HashSet<String>,
    pub tiers: &'a PriorityTiers,
    /// Cumulative stake totals (day/week/month), keyed by username
    pub totals: &'a HashMap<String, BetTotals>,
}

impl<'a> SelectionContext<'a> {
    pub fn balance(&self, user: &str) -> i64 {
        self.balances.get(user).copied().unwrap_or(0)
    }

    fn daily(&self, user: &str) -> i64 {
        self.totals.get(user).map(|t| t.total_day).unwrap_or(0)
    }

    fn weekly(&self, user: &str) -> i64 {
        self.totals.get(user).map(|t| t.total_week).unwrap_or(0)
    }

    fn monthly(&self, user: &str) -> i64 {
        self.totals.get(user).map(|t| t.total_month).unwrap_or(0)
    }

    fn available(&self, user: &str) -> bool {
        !self.used.contains(user) && self.online.iter().any(|o| o == user)
    }

    /// Every account that could take this chunk, in registry order
    pub fn candidates(&self, amount: i64) -> Vec<&'a str> {
        self.online
            .iter()
            .filter(|u| !self.used.contains(*u) && self.balance(u) >= amount)
            .map(String::as_str)
            .collect()
    }

    /// Tier members that are online and unused, in configured order
    fn tier_members(&self, tier: &'a [String]) -> Vec<&'a str> {
        tier.iter()
            .filter(|u| self.available(u))
            .map(String::as_str)
            .collect()
    }

    /// Online, unused accounts outside both tier 2 and tier 3
    fn untiered_online(&self) -> Vec<&'a str> {
        self.online
            .iter()
            .filter(|u| {
                !self.used.contains(*u)
                    && !self.tiers.in_tier2(u)
                    && !self.tiers.in_tier3(u)
            })
            .map(String::as_str)
            .collect()
    }

    /// Online, unused accounts outside tier 2
    fn non_tier2_online(&self) -> Vec<&'a str> {
        self.online
            .iter()
            .filter(|u| !self.used.contains(*u) && !self.tiers.in_tier2(u))
            .map(String::as_str)
            .collect()
    }

    /// First account in `order` whose balance covers the chunk
    fn first_funded<I>(&self, order: I, amount: i64) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        order
            .into_iter()
            .find(|u| self.balance(u) >= amount)
            .map(str::to_string)
    }
}

/// One selection policy
pub trait Selector: Send + Sync {
    fn select(
        &self,
        amount: i64,
        ctx: &SelectionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<String>;
}

/// 1: smallest leftover after the bet wins
struct MinLeftover;

impl Selector for MinLeftover {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        ctx.candidates(amount)
            .into_iter()
            .min_by_key(|u| ctx.balance(u) - amount)
            .map(str::to_string)
    }
}

/// 2: uniform random among funded candidates
struct UniformRandom;

impl Selector for UniformRandom {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, rng: &mut dyn RngCore) -> Option<String> {
        ctx.candidates(amount).choose(rng).map(|u| u.to_string())
    }
}

/// 3: tier 1 in configured order, else fall back to smallest leftover
struct TierOneFirst;

impl Selector for TierOneFirst {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, rng: &mut dyn RngCore) -> Option<String> {
        ctx.first_funded(ctx.tier_members(&ctx.tiers.tier1), amount)
            .or_else(|| MinLeftover.select(amount, ctx, rng))
    }
}

/// 4: untiered accounts richest first, then tier 2, then tier 3
struct RichestUntieredFirst;

impl Selector for RichestUntieredFirst {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let mut others = ctx.untiered_online();
        others.sort_by_key(|u| Reverse(ctx.balance(u)));
        let mut tier2 = ctx.tier_members(&ctx.tiers.tier2);
        tier2.sort_by_key(|u| Reverse(ctx.balance(u)));
        let mut tier3 = ctx.tier_members(&ctx.tiers.tier3);
        tier3.sort_by_key(|u| Reverse(ctx.balance(u)));

        ctx.first_funded(others.into_iter().chain(tier2).chain(tier3), amount)
    }
}

/// 5: tier 1 first, else lowest monthly stake (balance breaks ties)
struct TierOneThenMonthlyLow;

impl Selector for TierOneThenMonthlyLow {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        ctx.first_funded(ctx.tier_members(&ctx.tiers.tier1), amount)
            .or_else(|| {
                let mut candidates = ctx.candidates(amount);
                candidates.sort_by_key(|u| (ctx.monthly(u), ctx.balance(u)));
                candidates.first().map(|u| u.to_string())
            })
    }
}

/// 6: tier 1 first, else lowest weekly stake (balance breaks ties)
struct TierOneThenWeeklyLow;

impl Selector for TierOneThenWeeklyLow {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        ctx.first_funded(ctx.tier_members(&ctx.tiers.tier1), amount)
            .or_else(|| {
                let mut candidates = ctx.candidates(amount);
                candidates.sort_by_key(|u| (ctx.weekly(u), ctx.balance(u)));
                candidates.first().map(|u| u.to_string())
            })
    }
}

/// Shared head of strategies 7 and 8: tier 2 then tier 3, each by
/// lowest daily stake
fn daily_tier_head<'a>(ctx: &SelectionContext<'a>) -> Vec<&'a str> {
    let mut tier2 = ctx.tier_members(&ctx.tiers.tier2);
    tier2.sort_by_key(|u| (ctx.daily(u), ctx.balance(u)));
    let mut tier3 = ctx.tier_members(&ctx.tiers.tier3);
    tier3.sort_by_key(|u| (ctx.daily(u), ctx.balance(u)));
    tier2.into_iter().chain(tier3).collect()
}

/// 7: daily-low tiers first, remaining accounts by highest weekly stake
struct DailyTiersThenWeeklyHigh;

impl Selector for DailyTiersThenWeeklyHigh {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let mut others = ctx.untiered_online();
        others.sort_by_key(|u| (Reverse(ctx.weekly(u)), Reverse(ctx.balance(u))));
        ctx.first_funded(daily_tier_head(ctx).into_iter().chain(others), amount)
    }
}

/// 8: daily-low tiers first, remaining accounts by lowest weekly stake
struct DailyTiersThenWeeklyLow;

impl Selector for DailyTiersThenWeeklyLow {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let mut others = ctx.untiered_online();
        others.sort_by_key(|u| (ctx.weekly(u), ctx.balance(u)));
        ctx.first_funded(daily_tier_head(ctx).into_iter().chain(others), amount)
    }
}

/// 9: tier 2 by lowest daily stake, then everyone else by lowest balance
struct TierTwoThenLeanBalance;

impl Selector for TierTwoThenLeanBalance {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let mut tier2 = ctx.tier_members(&ctx.tiers.tier2);
        tier2.sort_by_key(|u| (ctx.daily(u), ctx.balance(u)));
        let mut others = ctx.non_tier2_online();
        others.sort_by_key(|u| ctx.balance(u));
        ctx.first_funded(tier2.into_iter().chain(others), amount)
    }
}

/// 10: non-tier-2 accounts by lowest balance, then tier 2 by lowest
/// daily stake
struct LeanBalanceThenTierTwo;

impl Selector for LeanBalanceThenTierTwo {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let mut others = ctx.non_tier2_online();
        others.sort_by_key(|u| ctx.balance(u));
        let mut tier2 = ctx.tier_members(&ctx.tiers.tier2);
        tier2.sort_by_key(|u| (ctx.daily(u), ctx.balance(u)));
        ctx.first_funded(others.into_iter().chain(tier2), amount)
    }
}

/// 11: untiered accounts by lowest balance, then tier 2, then tier 3,
/// each by lowest daily stake
struct LeanBalanceThenDailyTiers;

impl Selector for LeanBalanceThenDailyTiers {
    fn select(&self, amount: i64, ctx: &SelectionContext<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let mut others = ctx.untiered_online();
        others.sort_by_key(|u| ctx.balance(u));
        ctx.first_funded(others.into_iter().chain(daily_tier_head(ctx)), amount)
    }
}

/// Resolve a configured strategy id
///
/// Ids are validated at the config layer; anything out of range falls
/// back to the default smallest-leftover policy.
pub fn selector_for(id: u8) -> Box<dyn Selector> {
    match id {
        2 => Box::new(UniformRandom),
        3 => Box::new(TierOneFirst),
        4 => Box::new(RichestUntieredFirst),
        5 => Box::new(TierOneThenMonthlyLow),
        6 => Box::new(TierOneThenWeeklyLow),
        7 => Box::new(DailyTiersThenWeeklyHigh),
        8 => Box::new(DailyTiersThenWeeklyLow),
        9 => Box::new(TierTwoThenLeanBalance),
        10 => Box::new(LeanBalanceThenTierTwo),
        11 => Box::new(LeanBalanceThenDailyTiers),
        _ => Box::new(MinLeftover),
    }
}
