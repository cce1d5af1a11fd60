//! Round stake allocation
//!
//! Each round the engine draws a total stake for both doors, carves the
//! totals into per-account chunks, and binds every chunk to exactly one
//! online account under the configured selection strategy. A plan is
//! all-or-nothing: any infeasibility discards the whole round rather
//! than placing a partial spread.

pub mod engine;
pub mod split;
pub mod strategy;

use std::ops::RangeInclusive;
use std::time::Duration;

pub use engine::{build_plan, RoundInputs, DUST_FLOOR};
pub use split::{draw_round_stakes, BET_CEILING, STAKE_MULTIPLIER};
pub use strategy::{selector_for, SelectionContext, Selector};

/// One of the two doors of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Tai,
    Xiu,
}

impl Outcome {
    /// Wire token the game server expects
    pub fn as_wire(&self) -> &'static str {
        match self {
            Outcome::Tai => "TAI",
            Outcome::Xiu => "XIU",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "TAI" => Some(Outcome::Tai),
            "XIU" => Some(Outcome::Xiu),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A sized chunk awaiting an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stake {
    pub amount: i64,
    pub outcome: Outcome,
}

/// One bound entry of a finished plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub username: String,
    pub amount: i64,
    pub outcome: Outcome,
    /// Stagger before the bet command is enqueued for delivery
    pub delay: Duration,
}

/// Why a round produced no plan without being an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The active policy window pauses play
    Paused,
    /// Configured stake range cannot produce a draw
    InvalidBetRange,
    /// Player count too small to populate both doors
    TooFewPlayers,
    /// More chunks than online accounts
    TooFewAccounts,
    /// Sizing kept breaching the single-bet ceiling
    SizingRetriesExhausted,
    /// Settings file unreadable at the decision point
    ConfigUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::Paused => "policy window paused",
            SkipReason::InvalidBetRange => "stake range is empty or invalid",
            SkipReason::TooFewPlayers => "player count cannot fill both doors",
            SkipReason::TooFewAccounts => "more chunks than online accounts",
            SkipReason::SizingRetriesExhausted => "stake sizing retries exhausted",
            SkipReason::ConfigUnavailable => "settings unavailable",
        };
        f.write_str(text)
    }
}

/// Outcome of one allocation pass
#[derive(Debug)]
pub enum PlanOutcome {
    /// A complete plan, one entry per chunk
    Plan(Vec<Assignment>),
    /// Nothing to allocate this round
    Skipped(SkipReason),
    /// A chunk found no funded account; operators should hear about it
    Infeasible { outcome: Outcome, amount: i64 },
}

impl PlanOutcome {
    /// Collapse to the assignment list; non-plans are empty
    pub fn assignments(self) -> Vec<Assignment> {
        match self {
            PlanOutcome::Plan(plan) => plan,
            _ => Vec::new(),
        }
    }
}

/// Tunables for one allocation pass
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Resample attempts before giving up on stake sizing
    pub resample_cap: usize,
    /// Uniform range, in seconds, for delivery staggering
    pub delay_range: RangeInclusive<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            resample_cap: 8,
            delay_range: 5..=25,
        }
    }
}
